//! Error types for svcregen-reconcile.

use std::path::PathBuf;

use thiserror::Error;

use svcregen_core::RegistryError;

/// All errors a hook invocation can end with.
#[derive(Debug, Error)]
pub enum HookError {
    /// `init` needs root; nothing was touched.
    #[error("you must be root to run the init stage")]
    Privilege,

    /// Unrecognized lifecycle stage; nothing was touched.
    #[error("hook called with unknown argument `{stage}'")]
    Usage { stage: String },

    /// `pre` was invoked without its pending directory argument.
    #[error("the pre stage requires a pending directory argument")]
    MissingPendingDir,

    /// A registry operation failed outside of a reconciliation attempt
    /// (first-run install, init).
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Reconciliation failed; the current registry was restored from the
    /// snapshot and is unchanged.
    #[error("reconciliation failed, registry restored from backup: {source}")]
    RolledBack {
        #[source]
        source: RegistryError,
    },

    /// Reconciliation failed; the registry was restored but a transient
    /// file could not be removed afterwards.
    #[error("reconciliation failed, registry restored from backup: {source}; cleanup failed: {cleanup}")]
    CleanupFailed {
        #[source]
        source: RegistryError,
        cleanup: RegistryError,
    },

    /// Reconciliation failed and putting the snapshot back failed too.
    #[error("reconciliation failed ({source}) and restoring the backup failed: {restore}")]
    RestoreFailed {
        #[source]
        source: RegistryError,
        restore: RegistryError,
    },

    /// I/O failure while creating defaults or staging the auxiliary file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HookError {
    /// Registry error behind a reconciliation failure, if any.
    pub fn registry_error(&self) -> Option<&RegistryError> {
        match self {
            HookError::Registry(e)
            | HookError::RolledBack { source: e }
            | HookError::CleanupFailed { source: e, .. }
            | HookError::RestoreFailed { source: e, .. } => Some(e),
            _ => None,
        }
    }
}

/// Convenience constructor for [`HookError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> HookError {
    HookError::Io {
        path: path.into(),
        source,
    }
}
