use anyhow::{Context, Result};
use log::{trace, warn};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::util::mkdir;

const POLICY_RC_D: &str = "usr/sbin/policy-rc.d";

/// Vetoes daemon starts by maintainer scripts inside a root for as long as
/// the guard lives.
pub struct PolicyRcd {
    path: PathBuf,
}

impl PolicyRcd {
    pub fn install(root: &Path) -> Result<PolicyRcd> {
        let path = root.join(POLICY_RC_D);
        if let Some(parent) = path.parent() {
            mkdir(parent, None)?;
        }
        std::fs::write(&path, "#!/bin/sh\nexit 101\n")
            .context(format!("Failed to write {}", path.display()))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .context(format!("Failed to chmod {}", path.display()))?;
        trace!("Installed {}", path.display());
        Ok(PolicyRcd { path })
    }
}

impl Drop for PolicyRcd {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_rcd_lifecycle() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join(POLICY_RC_D);
        {
            let _policy = PolicyRcd::install(root.path()).unwrap();
            assert_eq!(
                std::fs::read_to_string(&path).unwrap(),
                "#!/bin/sh\nexit 101\n"
            );
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
        assert!(!path.exists());
    }
}
