//! The public error taxonomy (§7). Kept as one `thiserror` enum so callers
//! match on kind rather than parsing messages, the same split
//! `nauto_engine::JobEngineError` draws between a typed library error and
//! the `anyhow` wrapping application code does at its own boundary.

use nc_schema::SchemaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NcError {
    #[error("invalid argument: {0}")]
    Arg(String),

    #[error("internal invariant violated: {0}")]
    Internal(String),

    #[error("timed out waiting for {0}")]
    WouldBlock(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("{loaded} of {requested} capability modules failed to load; session usable with partial schema")]
    PartialSchema { loaded: usize, requested: usize },
}

impl NcError {
    pub fn is_would_block(&self) -> bool {
        matches!(self, NcError::WouldBlock(_))
    }
}

pub type NcResult<T> = Result<T, NcError>;

/// The coarse classification a synchronous caller receives at the wire
/// boundary (§6, §7): `{Rpc, Reply, Notif, Hello, WouldBlock, Error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireKind {
    Hello,
    Rpc,
    Reply,
    Notif,
}
