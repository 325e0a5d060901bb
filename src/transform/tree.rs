//! Find-first / find-all by element path over a parsed document.
//!
//! Paths are a small subset of the usual element-path syntax: `A/B/C` walks
//! child elements from the context node, and a leading `.//` makes the first
//! step match any descendant instead of only children. Results come in
//! document order.

use roxmltree::Node;

struct ElementPath<'p> {
    descendant_first: bool,
    steps: Vec<&'p str>,
}

impl<'p> ElementPath<'p> {
    fn parse(path: &'p str) -> Self {
        let (descendant_first, rest) = match path.strip_prefix(".//") {
            Some(rest) => (true, rest),
            None => (false, path.strip_prefix("./").unwrap_or(path)),
        };
        Self {
            descendant_first,
            steps: rest.split('/').filter(|step| !step.is_empty()).collect(),
        }
    }
}

fn named(node: &Node<'_, '_>, tag: &str) -> bool {
    node.is_element() && node.tag_name().name() == tag
}

/// All elements matching `path` under `context`.
#[must_use]
pub fn find_all<'a, 'input>(context: Node<'a, 'input>, path: &str) -> Vec<Node<'a, 'input>> {
    let path = ElementPath::parse(path);
    let Some((first, rest)) = path.steps.split_first() else {
        return Vec::new();
    };

    let mut current: Vec<Node<'a, 'input>> = if path.descendant_first {
        context
            .descendants()
            .skip(1)
            .filter(|node| named(node, first))
            .collect()
    } else {
        context.children().filter(|node| named(node, first)).collect()
    };

    for &step in rest {
        current = current
            .into_iter()
            .flat_map(move |node| node.children().filter(move |child| named(child, step)))
            .collect();
    }
    current
}

/// First element matching `path` under `context`.
#[must_use]
pub fn find<'a, 'input>(context: Node<'a, 'input>, path: &str) -> Option<Node<'a, 'input>> {
    find_all(context, path).into_iter().next()
}

/// Text of `node` with inline markup flattened, trimmed; `None` when empty.
#[must_use]
pub fn text_of(node: Node<'_, '_>) -> Option<String> {
    let text: String = node
        .descendants()
        .filter(Node::is_text)
        .filter_map(|text| text.text())
        .collect();
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Flattened text of the first element matching `path`.
#[must_use]
pub fn find_text(context: Node<'_, '_>, path: &str) -> Option<String> {
    find(context, path).and_then(text_of)
}
