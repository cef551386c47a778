//! Error types for svcregen-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from registry document operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Underlying I/O failure, annotated with the path being touched.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse registry at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// YAML serialization error (stage path).
    #[error("YAML serialization error: {0}")]
    Serialize(#[from] serde_yaml::Error),

    /// The document parsed but is not a mapping of service names to entries.
    #[error("invalid registry document at {path}: {reason}")]
    InvalidDocument { path: PathBuf, reason: String },

    /// The registry was put back but a transient file could not be removed.
    #[error("failed to remove leftover {path}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The registry YAML file did not exist at the expected path.
    #[error("registry not found at {path}")]
    NotFound { path: PathBuf },
}

impl RegistryError {
    /// `true` for failures reading a current or baseline document.
    pub fn is_read_error(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. } | Self::InvalidDocument { .. } | Self::NotFound { .. }
        )
    }

    /// `true` for failures encoding or swapping in a new document.
    pub fn is_write_error(&self) -> bool {
        matches!(
            self,
            Self::Serialize(_) | Self::Io { .. } | Self::Cleanup { .. }
        )
    }
}

/// Convenience constructor for [`RegistryError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RegistryError {
    RegistryError::Io {
        path: path.into(),
        source,
    }
}
