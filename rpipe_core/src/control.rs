//! Per-service control channel.
//!
//! Each running service exposes a well-known FIFO at `<base>/<service-name>`
//! through which external tools can signal the instance. The supervisor only
//! guarantees the object's existence, path, and permissions; the message
//! protocol over it belongs to the external controller. The channel is never
//! deleted by the supervisor and survives across runs.

use nix::errno::Errno;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory under which control channels are created by default.
pub const DEFAULT_CHANNEL_DIR: &str = "/tmp";

/// Permission bits for a control channel: world readable and writable so an
/// unprivileged operator tool can reach a root-owned service.
pub const CHANNEL_MODE: u32 = 0o666;

/// Errors from control-channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Failed to create control channel at {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: Errno,
    },
}

/// Handle to a service's control channel.
#[derive(Debug, Clone)]
pub struct ControlChannel {
    path: PathBuf,
}

impl ControlChannel {
    /// Create the FIFO at `<base>/<name>` if it does not already exist.
    /// Idempotent: an existing object at the path is left untouched and is
    /// not an error. Genuine creation failures (e.g. permission denied on
    /// the parent directory) surface as `ChannelError`.
    pub fn ensure(base: &Path, name: &str, mode: u32) -> Result<Self, ChannelError> {
        let path = base.join(name);
        match mkfifo(&path, Mode::from_bits_truncate(mode as nix::sys::stat::mode_t)) {
            Ok(()) | Err(Errno::EEXIST) => Ok(ControlChannel { path }),
            Err(source) => Err(ChannelError::Create { path, source }),
        }
    }

    /// Filesystem path of the channel object.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
