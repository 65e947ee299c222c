//! An in-process event tracer that writes Trace Event Format (TEF) files.
//!
//! Instrumented code emits timestamped begin/end/instant/object-lifecycle/
//! counter events; the session buffers them in memory and serializes them to
//! one JSON document that Chrome (`chrome://tracing`), Perfetto, and Catapult
//! can open. Originally created for Chromium, the TEF format is a JSON-based
//! legacy format that is simple to emit and still widely supported.
//!
//! ref: <https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU>.
//!
//! # Usage
//!
//! ```no_run
//! use teftrace::TraceSession;
//!
//! # fn main() -> Result<(), teftrace::TraceError> {
//! let mut session = TraceSession::new();
//! session.start("trace.json")?;
//! session.emit_duration_begin("parse", "core", None);
//! session.emit_instant_global("checkpoint", None);
//! session.emit_duration_end(None);
//! session.end()?;
//! # Ok(())
//! # }
//! ```
//!
//! Emit calls on an inactive session are silent no-ops, so instrumentation can
//! be left in place and only activated when a trace is wanted. For tracing
//! from multiple threads, see [`SharedSession`].
#![warn(missing_docs)]

mod error;
mod event;
mod session;

pub use error::TraceError;
pub use event::ArgValue;
pub use session::{
    SharedSession, SpanGuard, TraceSession, DEFAULT_PID, DEFAULT_TID, MAX_BUFFERED,
};
