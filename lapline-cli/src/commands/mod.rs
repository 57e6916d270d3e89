//! CLI command implementations.

pub mod capture;
pub mod init;
pub mod sessions;
pub mod standings;
pub mod status;
pub mod sync;
pub mod watch;
