use anyhow::{Context, Result};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use crate::error::RootstrapError;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static TERMINATION_SIGNAL: AtomicI32 = AtomicI32::new(libc::SIGKILL);

extern "C" fn on_interrupt(_signo: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Turns SIGINT and SIGTERM into a flag instead of killing us outright.
/// The handlers are installed without SA_RESTART so blocking waits return
/// EINTR and get a chance to clean up their children.
pub fn install_interrupt_handlers() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_interrupt),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTERM] {
        unsafe { sigaction(signal, &action) }
            .context(format!("failed to install {} handler", signal.as_str()))?;
    }
    Ok(())
}

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Fails with [`RootstrapError::Interrupted`] once SIGINT or SIGTERM has
/// been received. Called before starting anything new, so an interrupt that
/// arrived during in-process work still stops the build.
pub fn check_interrupted() -> Result<()> {
    if interrupted() {
        return Err(RootstrapError::Interrupted.into());
    }
    Ok(())
}

/// Keeps interrupt signals away from helper threads so they are delivered to
/// the thread doing the waiting.
pub fn block_interrupts_on_this_thread() {
    let mut set = SigSet::empty();
    set.add(Signal::SIGINT);
    set.add(Signal::SIGTERM);
    let _ = set.thread_block();
}

/// The signal used when we have to take a child down during cleanup.
pub fn termination_signal() -> Signal {
    Signal::try_from(TERMINATION_SIGNAL.load(Ordering::SeqCst))
        .unwrap_or(Signal::SIGKILL)
}

pub struct SigkillToSigterm {
    previous: i32,
}

/// While the guard lives, children we tear down get SIGTERM rather than
/// SIGKILL so they can clean up after themselves.
pub fn sigkill_to_sigterm() -> SigkillToSigterm {
    SigkillToSigterm {
        previous: TERMINATION_SIGNAL.swap(libc::SIGTERM, Ordering::SeqCst),
    }
}

impl Drop for SigkillToSigterm {
    fn drop(&mut self) {
        TERMINATION_SIGNAL.store(self.previous, Ordering::SeqCst);
    }
}
