//! Utility helpers for asynchronous tests.
//!
//! Provides functions to synchronize with background tasks and child
//! processes in tests.

use std::path::Path;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Wait for a file to appear within the given number of tries.
///
/// # Examples
///
/// ```rust,ignore
/// use std::path::Path;
/// use std::time::Duration;
/// use test_support::wait_for_file;
///
/// let path = Path::new("/tmp/launches.log");
/// let found = wait_for_file(path, 5, Duration::from_millis(10)).await;
/// assert!(found);
/// ```
pub async fn wait_for_file(path: &Path, tries: u32, delay: Duration) -> bool {
    for _ in 0..tries {
        if path.exists() {
            return true;
        }
        sleep(delay).await;
    }
    path.exists()
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses.
///
/// Returns the final evaluation of `condition`.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}
