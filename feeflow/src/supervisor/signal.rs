//! Signals sent to child process groups.

use std::io;

/// Asks the group led by `pgid` to exit.
#[cfg(unix)]
pub fn terminate_group(pgid: u32) -> io::Result<()> {
    send(pgid, nix::sys::signal::Signal::SIGTERM)
}

/// Kills the group led by `pgid` outright.
#[cfg(unix)]
pub fn kill_group(pgid: u32) -> io::Result<()> {
    send(pgid, nix::sys::signal::Signal::SIGKILL)
}

/// Whether a process with `pid` still exists.
#[cfg(unix)]
#[must_use]
pub fn is_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(raw), None).is_ok()
}

#[cfg(unix)]
fn send(pgid: u32, signal: nix::sys::signal::Signal) -> io::Result<()> {
    let raw = i32::try_from(pgid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    nix::sys::signal::killpg(nix::unistd::Pid::from_raw(raw), signal).map_err(io::Error::from)
}

/// Unsupported off unix.
#[cfg(not(unix))]
pub fn terminate_group(_pgid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "graceful termination needs unix signals",
    ))
}

/// Unsupported off unix.
#[cfg(not(unix))]
pub fn kill_group(_pgid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "process groups need unix",
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_own_process_is_alive() {
        assert!(is_alive(std::process::id()));
    }

    #[test]
    fn test_signalling_missing_group_fails() {
        assert!(terminate_group(i32::MAX as u32).is_err());
    }
}
