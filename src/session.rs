//! The trace session: buffering, flushing, and JSON array framing.
//!
//! A [`TraceSession`] owns the event buffer and the output sink and walks a
//! strict lifecycle: `start → {emit}* → end`. Rendered events accumulate in
//! memory and are written out when the buffer reaches capacity, on an explicit
//! [`TraceSession::flush`], and at [`TraceSession::end`].

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use lazy_static::lazy_static;
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::error::TraceError;
use crate::event::{self, ArgValue, SEPARATOR};

/// Default maximum number of buffered records before an implicit flush.
pub const MAX_BUFFERED: usize = 10000;
/// The process id stamped on events unless overridden at construction.
pub const DEFAULT_PID: u32 = 1;
/// The thread id stamped on events unless overridden per call.
pub const DEFAULT_TID: u32 = 1;

lazy_static! {
    // Captured on the first successful `start` in the process and never reset,
    // so `ts` values stay comparable across start/end cycles and sessions.
    static ref CLOCK_ORIGIN: Instant = Instant::now();
}

/// An in-process tracer writing one Chrome Trace Event Format JSON file.
///
/// Events are rendered eagerly into JSON text and buffered; the buffer is
/// flushed to the file when it reaches capacity and at session end. The
/// produced file always parses as a JSON array of event objects, even though
/// it is written incrementally: every record carries a trailing `",\n"`
/// separator which [`end`](Self::end) strips from the last record only.
///
/// A session is a plain owned value. Emit calls on an inactive session are
/// silent no-ops, so instrumentation can stay in code paths where tracing is
/// conditionally disabled. For use from multiple threads, wrap the session in
/// a [`SharedSession`].
pub struct TraceSession {
    buffer: Vec<String>,
    sink: Option<BufWriter<File>>,
    capacity: usize,
    pid: u32,
    default_tid: u32,
    wrote_records: bool,
}

impl TraceSession {
    /// Creates an inactive session with the default buffer capacity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            sink: None,
            capacity: MAX_BUFFERED,
            pid: DEFAULT_PID,
            default_tid: DEFAULT_TID,
            wrote_records: false,
        }
    }

    /// Sets the buffer capacity (the implicit-flush threshold).
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Sets the process id and default thread id stamped on every event.
    #[must_use]
    pub fn with_ids(mut self, pid: u32, default_tid: u32) -> Self {
        self.pid = pid;
        self.default_tid = default_tid;
        self
    }

    /// Returns true between a successful [`start`](Self::start) and
    /// [`end`](Self::end).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.sink.is_some()
    }

    /// Number of rendered records currently buffered in memory.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Starts tracing to the file at `path` (created or truncated).
    ///
    /// Writes the opening `[` of the JSON array. On the first successful start
    /// in the process the clock origin is captured; later sessions reuse it.
    ///
    /// # Errors
    ///
    /// [`TraceError::AlreadyActive`] if the session is active — a second
    /// `start` is a caller bug, not a reset. [`TraceError::SinkOpen`] if the
    /// file cannot be created; the session stays inactive and usable.
    pub fn start(&mut self, path: impl AsRef<Path>) -> Result<(), TraceError> {
        if self.is_active() {
            return Err(TraceError::AlreadyActive);
        }
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| TraceError::SinkOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let mut sink = BufWriter::new(file);
        sink.write_all(b"[\n")?;

        lazy_static::initialize(&CLOCK_ORIGIN);
        self.buffer.clear();
        self.buffer.reserve(self.capacity);
        self.wrote_records = false;
        self.sink = Some(sink);
        debug!(?path, "trace session started");
        Ok(())
    }

    /// Writes every buffered record to the sink in insertion order and clears
    /// the buffer (allocation retained). Idempotent on an empty buffer.
    ///
    /// # Errors
    ///
    /// [`TraceError::NotActive`] when no session is running, or the underlying
    /// I/O error. Records drained before a write failure are lost.
    pub fn flush(&mut self) -> Result<(), TraceError> {
        let Some(sink) = self.sink.as_mut() else {
            return Err(TraceError::NotActive);
        };
        for record in self.buffer.drain(..) {
            sink.write_all(record.as_bytes())?;
            self.wrote_records = true;
        }
        Ok(())
    }

    /// Finalizes the trace: repairs the trailing separator, flushes the
    /// remaining buffer, writes the closing `]`, and closes the file.
    ///
    /// Separator repair: the last buffered record loses its trailing `",\n"`;
    /// if the buffer is already empty but records were written, the two
    /// separator bytes at the end of the file are overwritten in place
    /// (`",\n"` and `"\n]"` have equal length, so a seek suffices). A session
    /// that emitted nothing produces the empty array `[\n\n]`.
    ///
    /// # Errors
    ///
    /// [`TraceError::NotActive`] when no session is running, or the underlying
    /// I/O error. The sink is released either way.
    pub fn end(&mut self) -> Result<(), TraceError> {
        let Some(mut sink) = self.sink.take() else {
            return Err(TraceError::NotActive);
        };
        if let Some(last) = self.buffer.last_mut() {
            last.truncate(last.len() - SEPARATOR.len());
        } else if self.wrote_records {
            sink.seek(SeekFrom::End(-(SEPARATOR.len() as i64)))?;
        }
        for record in self.buffer.drain(..) {
            sink.write_all(record.as_bytes())?;
        }
        sink.write_all(b"\n]")?;
        sink.flush()?;
        self.wrote_records = false;
        debug!("trace session ended");
        Ok(())
    }

    /// Emits a duration-begin (`ph = "B"`) event.
    pub fn emit_duration_begin(&mut self, name: &str, category: &str, tid: Option<u32>) {
        if !self.is_active() {
            return;
        }
        let record = event::duration_begin(
            name,
            category,
            self.pid,
            self.resolve_tid(tid),
            Self::timestamp_us(),
            None,
        );
        self.push_record(record);
    }

    /// Emits a duration-begin event with typed arguments.
    ///
    /// If `keys` and `values` differ in length the event is degraded: an error
    /// is logged and the event is emitted without its `args` object.
    pub fn emit_duration_begin_with_args(
        &mut self,
        name: &str,
        category: &str,
        keys: &[&str],
        values: &[ArgValue],
        tid: Option<u32>,
    ) {
        if !self.is_active() {
            return;
        }
        let args = checked_args(name, keys, values);
        let record = event::duration_begin(
            name,
            category,
            self.pid,
            self.resolve_tid(tid),
            Self::timestamp_us(),
            args,
        );
        self.push_record(record);
    }

    /// Emits a duration-end (`ph = "E"`) event closing the most recent begin
    /// on the same thread lane.
    pub fn emit_duration_end(&mut self, tid: Option<u32>) {
        if !self.is_active() {
            return;
        }
        let record =
            event::duration_end(self.pid, self.resolve_tid(tid), Self::timestamp_us(), None);
        self.push_record(record);
    }

    /// Emits a duration-end event with typed arguments. Mismatched argument
    /// lists degrade the event as in
    /// [`emit_duration_begin_with_args`](Self::emit_duration_begin_with_args).
    pub fn emit_duration_end_with_args(
        &mut self,
        keys: &[&str],
        values: &[ArgValue],
        tid: Option<u32>,
    ) {
        if !self.is_active() {
            return;
        }
        let args = checked_args("duration_end", keys, values);
        let record =
            event::duration_end(self.pid, self.resolve_tid(tid), Self::timestamp_us(), args);
        self.push_record(record);
    }

    /// Emits an object-created (`ph = "N"`) event. `identity` is an opaque
    /// stable handle (an id counter or a pointer value), rendered as an
    /// unsigned decimal.
    pub fn emit_object_created(&mut self, name: &str, identity: usize, tid: Option<u32>) {
        if !self.is_active() {
            return;
        }
        let record = event::object_created(
            name,
            identity,
            self.pid,
            self.resolve_tid(tid),
            Self::timestamp_us(),
        );
        self.push_record(record);
    }

    /// Emits an object-destroyed (`ph = "D"`) event matching an earlier
    /// created event with the same `identity`.
    pub fn emit_object_destroyed(&mut self, name: &str, identity: usize, tid: Option<u32>) {
        if !self.is_active() {
            return;
        }
        let record = event::object_destroyed(
            name,
            identity,
            self.pid,
            self.resolve_tid(tid),
            Self::timestamp_us(),
        );
        self.push_record(record);
    }

    /// Emits a global-scope instant (`ph = "i"`, `s = "g"`) event.
    pub fn emit_instant_global(&mut self, name: &str, tid: Option<u32>) {
        if !self.is_active() {
            return;
        }
        let record = event::instant_global(
            name,
            self.pid,
            self.resolve_tid(tid),
            Self::timestamp_us(),
        );
        self.push_record(record);
    }

    /// Emits a counter (`ph = "C"`) event sampling the given key/value pairs.
    /// Mismatched lists degrade the event rather than dropping it.
    pub fn emit_counter(
        &mut self,
        name: &str,
        keys: &[&str],
        values: &[ArgValue],
        tid: Option<u32>,
    ) {
        if !self.is_active() {
            return;
        }
        let args = checked_args(name, keys, values);
        let record = event::counter(
            name,
            self.pid,
            self.resolve_tid(tid),
            Self::timestamp_us(),
            args,
        );
        self.push_record(record);
    }

    /// Emits a duration-begin now and the matching end when the returned guard
    /// drops.
    pub fn span(&mut self, name: &str, category: &str, tid: Option<u32>) -> SpanGuard<'_> {
        self.emit_duration_begin(name, category, tid);
        SpanGuard { session: self, tid }
    }

    fn resolve_tid(&self, tid: Option<u32>) -> u32 {
        tid.unwrap_or(self.default_tid)
    }

    fn timestamp_us() -> u64 {
        CLOCK_ORIGIN.elapsed().as_micros() as u64
    }

    fn push_record(&mut self, record: String) {
        if self.buffer.len() >= self.capacity {
            // The sole backpressure: the emitting call blocks on the file
            // write. Emit-time I/O failures are absorbed, per the error
            // contract.
            if let Err(err) = self.flush() {
                error!(%err, "implicit flush failed; buffered records were lost");
            }
        }
        self.buffer.push(record);
    }
}

impl Default for TraceSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TraceSession {
    /// Finalizes a still-active session so the file is valid JSON and the
    /// sink is released on every exit path.
    fn drop(&mut self) {
        if self.is_active() {
            if let Err(err) = self.end() {
                warn!(%err, "trace session dropped while active; finalize failed");
            }
        }
    }
}

fn checked_args<'a>(
    context: &str,
    keys: &'a [&'a str],
    values: &'a [ArgValue],
) -> Option<(&'a [&'a str], &'a [ArgValue])> {
    if keys.len() == values.len() {
        Some((keys, values))
    } else {
        error!(
            event = context,
            keys = keys.len(),
            values = values.len(),
            "argument name/value lists differ in length; emitting the event without args"
        );
        None
    }
}

/// Ends a duration event when dropped. Created by [`TraceSession::span`].
pub struct SpanGuard<'a> {
    session: &'a mut TraceSession,
    tid: Option<u32>,
}

impl SpanGuard<'_> {
    /// Access to the underlying session, e.g. for nested spans.
    pub fn session(&mut self) -> &mut TraceSession {
        self.session
    }
}

impl Drop for SpanGuard<'_> {
    fn drop(&mut self) {
        self.session.emit_duration_end(self.tid);
    }
}

/// A cloneable, thread-safe handle to a [`TraceSession`].
///
/// One mutex serializes all tracing operations. Tracing is not on any
/// correctness-critical path, so contention here is an accepted trade for a
/// simple model; per-call `tid` values only label events for the viewer's
/// per-thread lanes and carry no synchronization meaning.
#[derive(Clone)]
pub struct SharedSession {
    inner: Arc<Mutex<TraceSession>>,
}

impl SharedSession {
    /// Wraps a session in a shared handle.
    #[must_use]
    pub fn new(session: TraceSession) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// See [`TraceSession::start`].
    pub fn start(&self, path: impl AsRef<Path>) -> Result<(), TraceError> {
        self.inner.lock().start(path)
    }

    /// See [`TraceSession::flush`].
    pub fn flush(&self) -> Result<(), TraceError> {
        self.inner.lock().flush()
    }

    /// See [`TraceSession::end`].
    pub fn end(&self) -> Result<(), TraceError> {
        self.inner.lock().end()
    }

    /// See [`TraceSession::is_active`].
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.lock().is_active()
    }

    /// See [`TraceSession::emit_duration_begin`].
    pub fn emit_duration_begin(&self, name: &str, category: &str, tid: Option<u32>) {
        self.inner.lock().emit_duration_begin(name, category, tid);
    }

    /// See [`TraceSession::emit_duration_begin_with_args`].
    pub fn emit_duration_begin_with_args(
        &self,
        name: &str,
        category: &str,
        keys: &[&str],
        values: &[ArgValue],
        tid: Option<u32>,
    ) {
        self.inner
            .lock()
            .emit_duration_begin_with_args(name, category, keys, values, tid);
    }

    /// See [`TraceSession::emit_duration_end`].
    pub fn emit_duration_end(&self, tid: Option<u32>) {
        self.inner.lock().emit_duration_end(tid);
    }

    /// See [`TraceSession::emit_duration_end_with_args`].
    pub fn emit_duration_end_with_args(
        &self,
        keys: &[&str],
        values: &[ArgValue],
        tid: Option<u32>,
    ) {
        self.inner
            .lock()
            .emit_duration_end_with_args(keys, values, tid);
    }

    /// See [`TraceSession::emit_object_created`].
    pub fn emit_object_created(&self, name: &str, identity: usize, tid: Option<u32>) {
        self.inner.lock().emit_object_created(name, identity, tid);
    }

    /// See [`TraceSession::emit_object_destroyed`].
    pub fn emit_object_destroyed(&self, name: &str, identity: usize, tid: Option<u32>) {
        self.inner.lock().emit_object_destroyed(name, identity, tid);
    }

    /// See [`TraceSession::emit_instant_global`].
    pub fn emit_instant_global(&self, name: &str, tid: Option<u32>) {
        self.inner.lock().emit_instant_global(name, tid);
    }

    /// See [`TraceSession::emit_counter`].
    pub fn emit_counter(&self, name: &str, keys: &[&str], values: &[ArgValue], tid: Option<u32>) {
        self.inner.lock().emit_counter(name, keys, values, tid);
    }

    /// Locks the underlying session for operations without a forwarding
    /// method, e.g. [`TraceSession::span`].
    pub fn lock(&self) -> parking_lot::MutexGuard<'_, TraceSession> {
        self.inner.lock()
    }
}
