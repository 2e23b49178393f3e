//! Failures surfaced by facade operations and their HTTP mapping.

use thiserror::Error;
use trellis_plugins::{ExecutionError, InstallError, PluginId};

/// Errors returned by [`PluginManager`](super::PluginManager) operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The id is not in the current catalog.
    #[error("plugin {id} is not in the catalog")]
    NotFound {
        /// Requested plugin.
        id: PluginId,
    },
    /// The request body lacked a field or carried the wrong type.
    #[error("bad request: {message}")]
    BadRequest {
        /// Message returned to the caller.
        message: String,
    },
    /// Activation was requested for a plugin that is not installed.
    #[error("plugin {id} is not installed")]
    NotInstalled {
        /// Requested plugin.
        id: PluginId,
    },
    /// Fetching or provisioning failed; partial state was rolled back.
    #[error(transparent)]
    Install(#[from] InstallError),
    /// The execution manager refused or failed the operation.
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    /// A response body could not be encoded.
    #[error("failed to encode response: {message}")]
    Encode {
        /// Encoder message.
        message: String,
    },
}

impl ManagerError {
    /// HTTP status reported for this error.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Execution(ExecutionError::Store(_)) | Self::Encode { .. } => 500,
            Self::BadRequest { .. }
            | Self::NotInstalled { .. }
            | Self::Install(_)
            | Self::Execution(_) => 400,
        }
    }

    /// Short message placed in the `error` field of the response body.
    ///
    /// Diagnostic detail stays in the log.
    #[must_use]
    pub fn public_message(&self) -> String {
        let message = match self {
            Self::NotFound { .. } => "Not found.",
            Self::BadRequest { message } => return message.clone(),
            Self::NotInstalled { .. } => "Plugin is not installed.",
            Self::Install(_) => "Failed to install library.",
            Self::Execution(ExecutionError::NotEnabled { .. }) => "Plugin is not enabled.",
            Self::Execution(ExecutionError::StartFailed { .. }) => "Failed to start plugin.",
            Self::Execution(ExecutionError::NotActive { .. }) => "Plugin is not active.",
            Self::Execution(ExecutionError::InvalidToken { .. }) => "Invalid token.",
            Self::Execution(ExecutionError::Store(_)) | Self::Encode { .. } => "Internal error.",
        };
        message.to_owned()
    }

    pub(crate) fn missing_field(field: &str) -> Self {
        Self::BadRequest {
            message: format!("Missing or invalid field '{field}'."),
        }
    }
}
