use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use super::Role;
use crate::control::{ControlMessage, ControlSender};
use crate::metrics::Metrics;

// ============================================================================
// Output Capture
// ============================================================================
//
// Turns a process's textual output into a stream of `CapturedLine` events
// and forwards each one to the control channel the moment it is complete.
//
// Nothing process-wide is substituted. The sink is handed explicitly to
// whatever produces output:
// - a child's stdout/stderr pipes are `attach`ed to a scope
// - in-process code writes into the scope through `std::io::Write`
//
// A scope flushes any trailing partial line and stops its pipe readers when
// it is dropped, on every exit path. A line longer than `MAX_LINE_BYTES` is
// forwarded in chunks of that size.
//
// ============================================================================

pub const MAX_LINE_BYTES: usize = 64 * 1024;
const READ_CHUNK_BYTES: usize = 8 * 1024;

/// One line of output, tagged with the role that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedLine {
    pub role: Role,
    pub text: String,
}

impl CapturedLine {
    fn from_bytes(role: Role, bytes: &[u8]) -> Self {
        let mut end = bytes.len();
        while end > 0 && matches!(bytes[end - 1], b'\n' | b'\r') {
            end -= 1;
        }

        Self {
            role,
            text: String::from_utf8_lossy(&bytes[..end]).into_owned(),
        }
    }
}

impl From<CapturedLine> for ControlMessage {
    fn from(line: CapturedLine) -> Self {
        ControlMessage::output(line.role, line.text)
    }
}

/// Where captured lines go: the outbound side of the control channel
#[derive(Clone)]
pub struct OutputSink {
    sender: ControlSender,
    metrics: Option<Arc<Metrics>>,
}

impl OutputSink {
    pub fn new(sender: ControlSender) -> Self {
        Self { sender, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn emit(&self, line: CapturedLine) {
        if let Some(ref metrics) = self.metrics {
            metrics.record_output_line(line.role);
        }

        let role = line.role;
        if let Err(e) = self.sender.send(&ControlMessage::from(line)) {
            tracing::trace!(role = %role, error = %e, "Dropping captured line, no observer");
        }
    }
}

/// Splits a byte stream into lines for one role. Bytes past the last
/// newline are held until the next write, or emitted when dropped.
pub struct LineBuffer {
    role: Role,
    sink: OutputSink,
    pending: Vec<u8>,
    max_line: usize,
}

impl LineBuffer {
    pub fn new(role: Role, sink: OutputSink, max_line: usize) -> Self {
        Self {
            role,
            sink,
            pending: Vec::new(),
            max_line: max_line.max(1),
        }
    }

    fn push(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            let room = self.max_line - self.pending.len();
            let take = match bytes.iter().position(|b| *b == b'\n') {
                Some(pos) if pos <= room => pos + 1,
                _ => room.min(bytes.len()),
            };

            self.pending.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];

            if self.pending.last() == Some(&b'\n') || self.pending.len() >= self.max_line {
                self.emit_pending();
            }
        }
    }

    fn emit_pending(&mut self) {
        let line = std::mem::take(&mut self.pending);
        self.sink.emit(CapturedLine::from_bytes(self.role, &line));
    }
}

impl Write for LineBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.push(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LineBuffer {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            self.emit_pending();
        }
    }
}

#[derive(Clone)]
pub struct OutputCapture {
    role: Role,
    sink: OutputSink,
}

impl OutputCapture {
    pub fn new(role: Role, sink: OutputSink) -> Self {
        Self { role, sink }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Begin capturing. Capture ends when the returned scope is dropped.
    pub fn activate(&self) -> CaptureScope {
        CaptureScope {
            role: self.role,
            sink: self.sink.clone(),
            lines: LineBuffer::new(self.role, self.sink.clone(), MAX_LINE_BYTES),
            readers: Vec::new(),
        }
    }
}

pub struct CaptureScope {
    role: Role,
    sink: OutputSink,
    lines: LineBuffer,
    readers: Vec<JoinHandle<()>>,
}

impl CaptureScope {
    /// Forward every line read from `reader` until it reaches end of file.
    pub fn attach<R>(&mut self, mut reader: R)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let role = self.role;
        let mut lines = LineBuffer::new(role, self.sink.clone(), MAX_LINE_BYTES);

        self.readers.push(tokio::spawn(async move {
            let mut chunk = vec![0u8; READ_CHUNK_BYTES];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => lines.push(&chunk[..n]),
                    Err(e) => {
                        tracing::warn!(role = %role, error = %e, "Output capture read failed");
                        break;
                    }
                }
            }
        }));
    }

    /// Give attached readers `grace` to drain what is left in their pipes,
    /// then end the scope.
    pub async fn close(mut self, grace: Duration) {
        for mut reader in std::mem::take(&mut self.readers) {
            if tokio::time::timeout(grace, &mut reader).await.is_err() {
                tracing::warn!(
                    role = %self.role,
                    grace_ms = grace.as_millis() as u64,
                    "Output pipe still open after exit, abandoning reader"
                );
                reader.abort();
            }
        }
    }
}

impl Write for CaptureScope {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lines.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lines.flush()
    }
}

impl Drop for CaptureScope {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}
