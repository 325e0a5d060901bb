//! MD5 verification against the published `.md5` sidecars.

use std::path::Path;

use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;

const HASH_CHUNK_BYTES: usize = 64 * 1024;

/// Computes the lowercase hex MD5 digest of a local file.
///
/// # Errors
///
/// Returns the underlying I/O error if the file cannot be read.
pub async fn compute_md5(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0_u8; HASH_CHUNK_BYTES];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Extracts the digest from a checksum sidecar.
///
/// The corpus publishes `MD5(pubmed25n0001.xml.gz)= <digest>`; the
/// coreutils layout `<digest>  <name>` is accepted too. The first
/// whitespace-separated token that is exactly 32 hex digits wins, returned
/// lowercase.
#[must_use]
pub fn parse_published_checksum(contents: &str) -> Option<String> {
    contents
        .split_whitespace()
        .find(|token| token.len() == 32 && token.bytes().all(|b| b.is_ascii_hexdigit()))
        .map(str::to_ascii_lowercase)
}
