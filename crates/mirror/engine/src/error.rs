//! Error types for mirror-engine.
//!
//! Unknown entity references and malformed feed payloads are not errors:
//! they are logged and processing continues. Only setup mistakes and
//! transport failures surface here.

use mirror_types::{Block, ProjectId, UnknownBlock};
use thiserror::Error;

/// Failures reported by the remote tracker API adapter.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// A story listing could not be decoded.
    #[error("invalid response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Errors that can occur while building or loading the mirror.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Configuration rejected at setup.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A configured block name is not a supported partition.
    #[error(transparent)]
    UnknownBlock(#[from] UnknownBlock),

    /// A bulk-load fetch failed.
    #[error("loading {block} stories for {project_id} failed: {source}")]
    LoadFailed {
        project_id: ProjectId,
        block: Block,
        #[source]
        source: ApiError,
    },

    /// Remote API error outside the bulk load.
    #[error("api error: {0}")]
    Api(#[from] ApiError),
}

/// Result type for remote API calls.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Result type for mirror operations.
pub type Result<T> = std::result::Result<T, MirrorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_failed_message_names_block_and_project() {
        let err = MirrorError::LoadFailed {
            project_id: ProjectId::new(4),
            block: Block::Backlog,
            source: ApiError::Status {
                status: 503,
                url: "https://tracker.example/projects/4".into(),
            },
        };
        let message = err.to_string();
        assert!(message.contains("backlog"));
        assert!(message.contains("project:4"));
        assert!(message.contains("503"));
    }

    #[test]
    fn test_unknown_block_converts() {
        let err: MirrorError = "someday".parse::<Block>().unwrap_err().into();
        assert!(matches!(err, MirrorError::UnknownBlock(_)));
    }
}
