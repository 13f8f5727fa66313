//! Errors raised by the collaborators consulted during inbox processing.

use crate::client::ApClientError;

/// An authentication, authorization or delivery collaborator failed.
///
/// This is always an infrastructure failure. A collaborator that reaches a
/// negative answer (unknown key, blocked party) reports it as a value, not
/// as an error.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// A remote server could not be reached or answered with an error.
    #[error(transparent)]
    Client(#[from] ApClientError),
    /// A local backend failed.
    #[error("{0}")]
    Backend(String),
}
