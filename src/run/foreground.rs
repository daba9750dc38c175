use nix::errno::Errno;
use nix::sys::signal::{SigHandler, Signal, signal};

/// If stderr is a terminal, optionally move the calling process into a new
/// process group and make its group the terminal's foreground group, so
/// that only it receives keyboard signals.
///
/// This runs between fork and exec, so it sticks to plain syscalls.
pub fn make_foreground_process(new_process_group: bool) -> std::io::Result<()> {
    if unsafe { libc::isatty(libc::STDERR_FILENO) } != 1 {
        return Ok(());
    }

    if new_process_group && unsafe { libc::setpgid(0, 0) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // tcsetpgrp from a background group raises SIGTTOU
    let old = unsafe { signal(Signal::SIGTTOU, SigHandler::SigIgn) }?;
    let result = unsafe { libc::tcsetpgrp(libc::STDERR_FILENO, libc::getpgrp()) };
    let errno = Errno::last();
    unsafe { signal(Signal::SIGTTOU, old) }?;

    if result != 0 && errno != Errno::ENOTTY {
        return Err(errno.into());
    }

    Ok(())
}

/// Hands the terminal back to our own process group when dropped.
pub struct ForegroundGuard {
    _private: (),
}

impl ForegroundGuard {
    pub fn new() -> Self {
        ForegroundGuard { _private: () }
    }
}

impl Default for ForegroundGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ForegroundGuard {
    fn drop(&mut self) {
        if let Err(e) = make_foreground_process(false) {
            log::debug!("Failed to restore foreground process group: {}", e);
        }
    }
}
