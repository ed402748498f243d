use devcfg_core::{RegistryError, WriteError};
use thiserror::Error;

use crate::query::DecodeError;

/// Errors raised while serving a portal request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortalError {
    /// The page did not fit the response buffer.
    #[error("response composition failed: {0}")]
    Failure(#[from] WriteError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
