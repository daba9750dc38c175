use log::error;
use std::io::Write;

use crate::error::{RootstrapError, find_rootstrap_error};
use crate::logger::debug_enabled;

/**
 * The outermost error boundary, shared by `main` and by the forked child
 * of [`super::fork_and_wait`]. Reports the failure once and returns the
 * exit code to leave with.
 */
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    let debug = debug_enabled();
    let code = match find_rootstrap_error(err) {
        Some(e) => {
            match e {
                // Logged where it was detected. Failures of "self" come from
                // a forked child which has already reported everything.
                RootstrapError::ProcessFailure { argv, .. } => {
                    if debug && argv.first().map(String::as_str) != Some("self") {
                        error!("{:?}", err);
                    }
                }
                _ if debug => error!("{:?}", err),
                _ => error!("{}", e),
            }
            e.exit_code()
        }
        None => {
            if debug {
                error!("{:?}", err);
            } else {
                error!("{:#}", err);
            }
            1
        }
    };

    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
    log::logger().flush();
    code
}

/// Runs `f`, converting its outcome to an exit code.
pub fn uncaught_error_handler<F>(f: F) -> i32
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match f() {
        Ok(()) => {
            log::logger().flush();
            0
        }
        Err(e) => exit_code_for(&e),
    }
}
