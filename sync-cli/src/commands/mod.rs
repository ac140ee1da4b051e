//! CLI command implementations.

pub mod device;
pub mod preferences;
pub mod session;
pub mod status;
pub mod watch;
