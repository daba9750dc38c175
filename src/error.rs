use crate::util::shell_join;
use nix::sys::signal::Signal;

/// Failures that the outermost boundary reports specially. Everything else
/// travels as a plain `anyhow::Error`.
#[derive(Debug, thiserror::Error)]
pub enum RootstrapError {
    #[error("{0} not found.")]
    BinaryNotFound(String),

    /// A negative `returncode` means the child was killed by that signal.
    #[error("\"{}\" returned non-zero exit code {returncode}.", shell_join(argv))]
    ProcessFailure { argv: Vec<String>, returncode: i32 },

    #[error("{0}")]
    PrivilegeSetup(String),

    #[error("Interrupted")]
    Interrupted,
}

impl RootstrapError {
    pub fn process_failure(argv: &[String], returncode: i32) -> Self {
        RootstrapError::ProcessFailure {
            argv: argv.to_vec(),
            returncode,
        }
    }

    /// Exit code to hand back to our own caller for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            RootstrapError::ProcessFailure { returncode, .. } => {
                if *returncode < 0 {
                    128 - returncode
                } else {
                    *returncode
                }
            }
            _ => 1,
        }
    }
}

/// Finds the first `RootstrapError` in an error chain, looking through any
/// context that was attached on the way up.
pub fn find_rootstrap_error(err: &anyhow::Error) -> Option<&RootstrapError> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<RootstrapError>())
}

pub fn signal_name(signo: i32) -> String {
    match Signal::try_from(signo) {
        Ok(signal) => signal.as_str().to_string(),
        Err(_) => format!("signal {}", signo),
    }
}
