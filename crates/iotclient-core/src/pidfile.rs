//! PID file for the detached worker.
//!
//! The worker writes its pid after detaching and removes the file on
//! orderly shutdown. `stop` and `status` read it back. A file whose pid is
//! no longer alive is stale and gets replaced.

#![allow(unsafe_code)]

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// Errors from PID file handling.
#[derive(Debug, thiserror::Error)]
pub enum PidFileError {
    #[error("daemon already running with pid {pid} (pid file {})", path.display())]
    AlreadyRunning { pid: u32, path: PathBuf },

    #[error("pid file {} does not contain a pid", path.display())]
    Invalid { path: PathBuf },

    #[error("pid file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A PID file owned by this process. Call [`remove`](Self::remove) on
/// orderly shutdown.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write `pid` to `path`, replacing a stale file.
    pub fn create(path: &Path, pid: u32) -> Result<Self, PidFileError> {
        ensure_not_running(path)?;

        let io_err = |source| PidFileError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o644)
            .open(path)
            .map_err(io_err)?;
        writeln!(file, "{pid}").map_err(io_err)?;

        info!(path = %path.display(), pid, "pid file written");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file. Failures are logged, not returned: this runs on
    /// the way out.
    pub fn remove(self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove pid file");
        }
    }
}

/// Read the pid recorded at `path`, if the file exists.
pub fn read_pid(path: &Path) -> Result<Option<u32>, PidFileError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PidFileError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    contents
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|pid| *pid > 0)
        .map(Some)
        .ok_or_else(|| PidFileError::Invalid {
            path: path.to_path_buf(),
        })
}

/// The pid of a live daemon recorded at `path`, if any.
///
/// Unreadable or stale files count as "not running".
pub fn running_pid(path: &Path) -> Option<u32> {
    match read_pid(path) {
        Ok(Some(pid)) if pid_alive(pid) => Some(pid),
        _ => None,
    }
}

/// Fail if `path` names a live process.
pub fn ensure_not_running(path: &Path) -> Result<(), PidFileError> {
    match running_pid(path) {
        Some(pid) => Err(PidFileError::AlreadyRunning {
            pid,
            path: path.to_path_buf(),
        }),
        None => Ok(()),
    }
}

/// Check if a process with the given PID is alive.
pub fn pid_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: kill with signal 0 checks existence without sending a signal.
    let delivered = unsafe { libc::kill(pid, 0) } == 0;
    // EPERM means the process exists but belongs to someone else.
    delivered || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Send SIGTERM to `pid`.
pub fn terminate(pid: u32) -> std::io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| std::io::Error::from(ErrorKind::InvalidInput))?;
    // SAFETY: plain kill(2); the pid is positive so no process group is hit.
    if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}
