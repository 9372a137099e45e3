use thiserror::Error;

/// Invariant violations caught during emission. Valid IR produced by
/// `upyc-builder` should never trigger these; they exist so emission is
/// fallible rather than panicking on a future builder bug.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("internal emitter error: {0}")]
    Internal(String),
}
