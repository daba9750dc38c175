use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use log::trace;
use nix::fcntl::{Flock, FlockArg};

use anyhow::{Result, anyhow};

/// An exclusive advisory lock on an existing file. Held until [`Lock::release`]
/// or drop.
pub struct Lock {
    path: PathBuf,
    lock: Option<Flock<File>>,
}

impl Lock {
    /** Block until we hold an exclusive flock on `path`. */
    pub fn exclusive(path: &Path) -> Result<Lock> {
        trace!("Acquiring lock {}", path.display());
        let file = match OpenOptions::new().read(true).open(path) {
            Ok(file) => file,
            Err(e) => {
                return Err(anyhow!(
                    "Failed to open {} for locking: {}",
                    path.display(),
                    e
                ));
            }
        };

        let lock = Flock::lock(file, FlockArg::LockExclusive).map_err(
            |(_, e)| anyhow!("Failed to lock {}: {}", path.display(), e),
        )?;

        trace!("Acquired lock {}", path.display());
        Ok(Lock {
            path: path.to_path_buf(),
            lock: Some(lock),
        })
    }

    /** Unlock now rather than at drop, reporting failure. */
    pub fn release(mut self) -> Result<()> {
        if let Some(lock) = self.lock.take() {
            trace!("Unlocking {}", self.path.display());
            lock.unlock().map_err(|(_, e)| {
                anyhow!("Failed to unlock {}: {}", self.path.display(), e)
            })?;
        }
        Ok(())
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        if self.lock.is_some() {
            trace!("Unlocking lock {}", self.path.display());
        }
    }
}
