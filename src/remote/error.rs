//! Error types for remote listing and transfer operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while talking to the remote corpus server.
///
/// Variants carry the context (target, command, path) the underlying error
/// lacks, so they are built through the helper constructors rather than
/// `From` conversions.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Could not establish the control/HTTP connection.
    #[error("cannot connect to {target}: {source}")]
    Connect {
        /// Host (and port) that refused or timed out.
        target: String,
        /// The underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// An established connection broke mid-exchange.
    #[error("connection lost: {source}")]
    ConnectionLost {
        /// The underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// The FTP server answered a command with an unexpected reply.
    #[error("{command} rejected with {code}: {message}")]
    Protocol {
        /// Command verb (arguments are omitted so credentials never leak).
        command: String,
        /// Reply code returned by the server.
        code: u16,
        /// Reply text returned by the server.
        message: String,
    },

    /// The HTTP mirror answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Requested URL.
        url: String,
        /// Status code returned.
        status: u16,
    },

    /// HTTP transport failure.
    #[error("network error requesting {url}: {source}")]
    Network {
        /// Requested URL.
        url: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The mirror base URL or a joined path is not a valid URL.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The offending URL text.
        url: String,
    },

    /// The server's timestamp text could not be parsed.
    #[error("unparseable timestamp for {name}: '{value}'")]
    Timestamp {
        /// Remote file name.
        name: String,
        /// Raw timestamp text.
        value: String,
    },

    /// Local filesystem failure while writing a transferred file.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// Local file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The transferred content does not match the published checksum.
    #[error("checksum mismatch for {name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Archive name.
        name: String,
        /// Published digest.
        expected: String,
        /// Digest of the received bytes.
        actual: String,
    },

    /// The published checksum sidecar holds no recognizable digest.
    #[error("no MD5 digest found in checksum file for {name}")]
    ChecksumUnreadable {
        /// Archive name.
        name: String,
    },
}

impl TransferError {
    /// Creates a connection error.
    pub fn connect(target: impl Into<String>, source: std::io::Error) -> Self {
        Self::Connect {
            target: target.into(),
            source,
        }
    }

    /// Creates a lost-connection error.
    #[must_use]
    pub fn connection_lost(source: std::io::Error) -> Self {
        Self::ConnectionLost { source }
    }

    /// Creates a protocol error, keeping only the command verb.
    pub fn protocol(command: &str, code: u16, message: impl Into<String>) -> Self {
        let verb = command.split_whitespace().next().unwrap_or(command);
        Self::Protocol {
            command: verb.to_string(),
            code,
            message: message.into(),
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an HTTP transport error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a timestamp parse error.
    pub fn timestamp(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Timestamp {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Creates a local IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this failure leaves the transport in an unknown state, so the
    /// next operation must start from a fresh connection.
    ///
    /// A local write failure mid-transfer counts: the data channel is
    /// abandoned while the server still owes a completion reply.
    #[must_use]
    pub fn invalidates_session(&self) -> bool {
        match self {
            Self::Connect { .. } | Self::ConnectionLost { .. } | Self::Network { .. } => true,
            // 421: service closing control connection
            Self::Protocol { code, .. } => *code == 421,
            Self::Io { .. } => true,
            Self::HttpStatus { .. }
            | Self::InvalidUrl { .. }
            | Self::Timestamp { .. }
            | Self::ChecksumMismatch { .. }
            | Self::ChecksumUnreadable { .. } => false,
        }
    }

    /// Whether this failure means the content itself failed verification.
    #[must_use]
    pub fn is_checksum_failure(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. } | Self::ChecksumUnreadable { .. }
        )
    }
}

/// Errors raised while building a catalog snapshot.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The remote directory could not be listed. Fatal for the run.
    #[error("catalog unavailable for {target}{directory}: {source}")]
    Unavailable {
        /// Source description (host or base URL).
        target: String,
        /// Remote directory that failed to list.
        directory: String,
        /// The transport failure.
        #[source]
        source: TransferError,
    },

    /// The last-modified time of a listed archive could not be resolved.
    #[error("cannot resolve metadata for {name}: {source}")]
    Metadata {
        /// Archive name.
        name: String,
        /// The transport failure.
        #[source]
        source: TransferError,
    },
}
