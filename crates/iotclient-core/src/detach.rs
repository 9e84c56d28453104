//! Detach the process from its controlling terminal.
//!
//! [`daemonize`] forks. The parent gets [`Detached::Parent`] and should
//! report the child's pid and exit. The child continues as the worker: it
//! leads a new session, has a zero umask, sits in `/`, and has its standard
//! streams on `/dev/null`.
//!
//! Must run before any thread is spawned, which in practice means before
//! the tokio runtime is built.

#![allow(unsafe_code)]

use std::fs::OpenOptions;
use std::io;
use std::os::fd::IntoRawFd;

use tracing::debug;

/// Errors from detaching. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum DetachError {
    #[error("fork failed: {0}")]
    ForkFailed(#[source] io::Error),

    #[error("setsid failed: {0}")]
    SessionCreateFailed(#[source] io::Error),

    #[error("failed to change directory to /: {0}")]
    ChdirFailed(#[source] io::Error),

    #[error("failed to redirect standard streams to /dev/null: {0}")]
    StdioRedirectFailed(#[source] io::Error),
}

/// Which side of the fork the caller is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detached {
    /// The invoking process. `child` is the worker's pid.
    Parent { child: u32 },
    /// The detached worker.
    Worker(ProcessIdentity),
}

/// Pid and session id of the worker, fixed once detached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub pid: u32,
    pub sid: u32,
}

/// Fork and detach the child from the invoking session.
pub fn daemonize() -> Result<Detached, DetachError> {
    // SAFETY: the caller guarantees the process is single-threaded, so the
    // child does not inherit locks held by threads that no longer exist.
    match unsafe { libc::fork() } {
        -1 => return Err(DetachError::ForkFailed(io::Error::last_os_error())),
        0 => {}
        child => return Ok(Detached::Parent { child: child as u32 }),
    }

    // SAFETY: setsid has no memory-safety preconditions.
    let sid = unsafe { libc::setsid() };
    if sid < 0 {
        return Err(DetachError::SessionCreateFailed(io::Error::last_os_error()));
    }

    // SAFETY: umask only swaps the process file-creation mask.
    unsafe { libc::umask(0) };

    std::env::set_current_dir("/").map_err(DetachError::ChdirFailed)?;

    let identity = ProcessIdentity {
        pid: std::process::id(),
        sid: sid as u32,
    };
    debug!(pid = identity.pid, sid = identity.sid, "new session created");

    redirect_stdio()?;
    Ok(Detached::Worker(identity))
}

/// Point stdin, stdout and stderr at `/dev/null`.
///
/// The descriptors stay open so nothing else can be allocated fd 0-2 and
/// receive stray writes.
fn redirect_stdio() -> Result<(), DetachError> {
    let devnull = OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
        .map_err(DetachError::StdioRedirectFailed)?;
    let fd = devnull.into_raw_fd();

    for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        // SAFETY: both descriptors are valid; dup2 closes `target` first.
        if unsafe { libc::dup2(fd, target) } < 0 {
            return Err(DetachError::StdioRedirectFailed(io::Error::last_os_error()));
        }
    }

    if fd > libc::STDERR_FILENO {
        // SAFETY: `fd` came from into_raw_fd and is not used afterwards.
        unsafe { libc::close(fd) };
    }
    Ok(())
}
