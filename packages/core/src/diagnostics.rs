//! Optional diagnostic sink.
//!
//! A dispatcher reports recovered panics and, when debugging is enabled, per-job
//! lifecycle lines to a caller-supplied writer. Lines are formatted into a reusable
//! buffer, so once the buffer has grown to the longest line no further allocation
//! happens per line.

use std::fmt::Write as _;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

use bytes::BytesMut;
use tracing::Level;

struct Sink {
    out: Box<dyn Write + Send>,
    line: BytesMut,
}

/// Leveled writer for dispatcher diagnostics.
pub struct Diagnostics {
    sink: Option<Mutex<Sink>>,
    debug: bool,
}

impl Diagnostics {
    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self {
            sink: None,
            debug: false,
        }
    }

    /// Write diagnostics to `out`. Info and debug lines are only written when `debug` is set.
    pub fn new(out: impl Write + Send + 'static, debug: bool) -> Self {
        Self {
            sink: Some(Mutex::new(Sink {
                out: Box::new(out),
                line: BytesMut::with_capacity(256),
            })),
            debug,
        }
    }

    /// Enable or disable info and debug lines.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Check if a line at `level` would be written.
    pub fn enabled(&self, level: Level) -> bool {
        self.sink.is_some() && (self.debug || level <= Level::WARN)
    }

    /// Write a single line. Write failures are ignored.
    pub fn emit(&self, level: Level, scope: &str, message: &str) {
        if !self.enabled(level) {
            return;
        }
        let Some(sink) = &self.sink else {
            return;
        };
        let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
        let Sink { out, line } = &mut *sink;
        line.clear();
        if writeln!(line, "{} [{}] {}", level, scope, message).is_err() {
            return;
        }
        let _ = out.write_all(&line[..]);
        let _ = out.flush();
    }

    pub fn debug(&self, scope: &str, message: &str) {
        self.emit(Level::DEBUG, scope, message);
    }

    pub fn error(&self, scope: &str, message: &str) {
        self.emit(Level::ERROR, scope, message);
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::disabled()
    }
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("enabled", &self.sink.is_some())
            .field("debug", &self.debug)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn errors_are_always_written() {
        let capture = Capture::default();
        let diagnostics = Diagnostics::new(capture.clone(), false);
        diagnostics.error("ingest", "job job-1 panicked in run: boom");
        diagnostics.debug("ingest", "job job-2 accepted");

        assert_eq!(
            capture.text(),
            "ERROR [ingest] job job-1 panicked in run: boom\n"
        );
    }

    #[test]
    fn debug_lines_need_debug_flag() {
        let capture = Capture::default();
        let diagnostics = Diagnostics::new(capture.clone(), true);
        diagnostics.debug("d", "first");
        diagnostics.debug("d", "second");

        assert_eq!(capture.text(), "DEBUG [d] first\nDEBUG [d] second\n");
    }

    #[test]
    fn disabled_sink_writes_nothing() {
        let diagnostics = Diagnostics::disabled().with_debug(true);
        assert!(!diagnostics.enabled(Level::ERROR));
        diagnostics.error("d", "ignored");
    }
}
