use anyhow::{Context, Result};
use nix::sys::signal::Signal;
use nix::unistd::{ForkResult, fork};

use super::foreground::{ForegroundGuard, make_foreground_process};
use super::signals::check_interrupted;
use super::uncaught::uncaught_error_handler;
use super::wait::wait_for_exit;
use crate::error::RootstrapError;

/**
 * Runs `target` in a forked child and waits for it. The child reports its
 * own errors; here a non-zero exit becomes a process failure with argv
 * `["self"]`. Once we have been interrupted, the child gets SIGTERM and we
 * still wait for it to really exit.
 *
 * Must be called while the process is single threaded.
 */
pub fn fork_and_wait<F>(target: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    check_interrupted()?;
    match unsafe { fork() }.context("failed to fork")? {
        ForkResult::Child => {
            let code = uncaught_error_handler(|| {
                make_foreground_process(true)
                    .context("failed to become the foreground process")?;
                target()
            });
            unsafe { libc::_exit(code) }
        }
        ForkResult::Parent { child } => {
            let _foreground = ForegroundGuard::new();
            let outcome = wait_for_exit(child, Signal::SIGTERM)?;
            if outcome.returncode != 0 {
                return Err(RootstrapError::process_failure(
                    &["self".to_string()],
                    outcome.returncode,
                )
                .into());
            }
            if outcome.interrupted {
                return Err(RootstrapError::Interrupted.into());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::find_rootstrap_error;
    use anyhow::anyhow;

    #[test]
    fn test_fork_and_wait_success() {
        assert!(fork_and_wait(|| Ok(())).is_ok());
    }

    #[test]
    fn test_fork_and_wait_failure_is_self() {
        let err = fork_and_wait(|| Err(anyhow!("child failed"))).unwrap_err();
        match find_rootstrap_error(&err) {
            Some(RootstrapError::ProcessFailure { argv, returncode }) => {
                assert_eq!(argv, &vec!["self".to_string()]);
                assert_eq!(*returncode, 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_fork_and_wait_propagates_child_exit_code() {
        let err = fork_and_wait(|| {
            Err(RootstrapError::process_failure(&["false".to_string()], 5).into())
        })
        .unwrap_err();
        assert!(matches!(
            find_rootstrap_error(&err),
            Some(RootstrapError::ProcessFailure { returncode: 5, .. })
        ));
    }
}
