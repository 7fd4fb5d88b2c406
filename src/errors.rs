// Typed error taxonomy for the matching core.
//
// `TransientSkip` from the design notes is not a variant here: it is an
// internal control-flow branch inside the matcher (log at debug, move on to
// the next candidate), never something the adapter layer needs to render.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
