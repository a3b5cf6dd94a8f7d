//! Log capture for tests.
//!
//! Installs a thread-local `tracing` subscriber writing into a shared
//! buffer with an explicit filter, so tests can assert on emitted events
//! without touching the environment or the global subscriber.

use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, fmt};

/// Shared in-memory log sink.
#[derive(Clone, Default)]
pub struct Buffer(Arc<Mutex<Vec<u8>>>);

impl Buffer {
    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().map(|b| b.clone()).unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(mut inner) = self.0.lock() {
            inner.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Buffer {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Captured logs; capture stops when this value is dropped.
pub struct CapturedLogs {
    buffer: Buffer,
    _guard: DefaultGuard,
}

impl CapturedLogs {
    /// Everything logged so far.
    pub fn contents(&self) -> String {
        self.buffer.contents()
    }
}

/// Capture events on the current thread matching `filter`.
///
/// Works with the default current-thread runtime of `#[tokio::test]`, where
/// spawned tasks share the test thread.
pub fn capture(filter: &str) -> CapturedLogs {
    let buffer = Buffer::default();
    let subscriber = fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(buffer.clone())
        .with_ansi(false)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    CapturedLogs {
        buffer,
        _guard: guard,
    }
}
