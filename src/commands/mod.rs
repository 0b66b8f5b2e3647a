pub mod daemon;
pub mod decode;
pub mod endpoint;
pub mod io;

// Re-export command functions
pub use daemon::cmd_daemon;
pub use decode::cmd_decode;
pub use endpoint::cmd_endpoint;
pub use io::cmd_io;
