use anyhow::{Result, anyhow};
use log::debug;
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::Pid;

use super::signals::interrupted;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOutcome {
    /// Exit code, or the negated signal number if the child was killed.
    pub returncode: i32,
    /// We were interrupted while waiting and sent the child a signal.
    pub interrupted: bool,
}

pub fn returncode_from_status(status: WaitStatus) -> Option<i32> {
    match status {
        WaitStatus::Exited(_, code) => Some(code),
        WaitStatus::Signaled(_, signal, _) => Some(-(signal as i32)),
        _ => None,
    }
}

/**
 * Waits for `pid` to terminate. If we have been interrupted, before or
 * while waiting, the child is sent `on_interrupt` once and we keep waiting
 * until it is really gone, so no zombie is left behind.
 */
pub fn wait_for_exit(pid: Pid, on_interrupt: Signal) -> Result<WaitOutcome> {
    let mut signalled = false;
    loop {
        if interrupted() && !signalled {
            debug!(
                "Interrupted, sending {} to process {}",
                on_interrupt.as_str(),
                pid
            );
            if let Err(e) = kill(pid, on_interrupt) {
                debug!("Failed to signal process {}: {}", pid, e);
            }
            signalled = true;
        }

        match waitpid(pid, None) {
            Ok(status) => {
                if let Some(returncode) = returncode_from_status(status) {
                    return Ok(WaitOutcome {
                        returncode,
                        interrupted: signalled,
                    });
                }
            }
            Err(Errno::EINTR) => {}
            Err(e) => {
                return Err(anyhow!("Failed to wait for process {}: {}", pid, e));
            }
        }
    }
}
