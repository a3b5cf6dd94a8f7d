//! Test support utilities.

pub mod daemon;
pub mod env_guard;
pub mod logging;
pub mod scripts;
pub mod status;
pub mod util;

pub use daemon::{TestConfig, temp_config};
pub use util::wait_for_file;
pub use util::wait_until;
