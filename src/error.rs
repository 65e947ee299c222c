//! Error types for the trace session lifecycle.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by [`TraceSession`](crate::TraceSession) lifecycle operations.
///
/// Only `start`, `flush`, and `end` return errors. Emit calls absorb their
/// failures (a degraded event or a logged write error) so that instrumentation
/// can stay in place on code paths where tracing happens to be disabled.
#[derive(Debug, Error)]
pub enum TraceError {
    /// The output file could not be opened; the session stays inactive.
    #[error("unable to open trace output file {path:?}")]
    SinkOpen {
        /// The path that was passed to `start`.
        path: PathBuf,
        /// The underlying open failure.
        #[source]
        source: io::Error,
    },

    /// `start` was called while the session was already active.
    #[error("trace session is already active")]
    AlreadyActive,

    /// `flush` or `end` was called on an inactive session.
    #[error("trace session is not active")]
    NotActive,

    /// Writing to or repairing the sink failed.
    #[error("trace sink I/O failed")]
    Io(#[from] io::Error),
}
