use anyhow::{Context, Result, anyhow};
use nix::unistd::{Gid, Uid, chown};
use std::path::Path;

/* Makes the directory (and parents) if it doesn't exist. An existing path
 * must be a directory or a symlink to one. When an owner is given the
 * directory is chowned to it.
 */
pub fn mkdir(path: &Path, owner: Option<(Uid, Gid)>) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            return Err(anyhow!(
                "{} already exists but is not a directory",
                path.display()
            ));
        }
    } else {
        std::fs::create_dir_all(path).context(format!(
            "Failed to create directory {}",
            path.display()
        ))?;
    }

    if let Some((uid, gid)) = owner {
        chown(path, Some(uid), Some(gid)).map_err(|e| {
            anyhow!("Failed to chown directory {}: {}", path.display(), e)
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::{getgid, getuid};

    #[test]
    fn test_mkdir_creates_parents() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("a/b/c");
        mkdir(&path, Some((getuid(), getgid())))?;
        assert!(path.is_dir());
        // Existing directories are fine
        mkdir(&path, None)?;
        Ok(())
    }

    #[test]
    fn test_mkdir_rejects_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("file");
        std::fs::write(&path, "test")?;
        assert!(mkdir(&path, None).is_err());
        Ok(())
    }

    #[test]
    fn test_mkdir_accepts_symlink_to_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("target");
        std::fs::create_dir(&target)?;
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link)?;
        mkdir(&link, None)?;

        let dangling = dir.path().join("dangling");
        std::os::unix::fs::symlink(dir.path().join("missing"), &dangling)?;
        assert!(mkdir(&dangling, None).is_err());
        Ok(())
    }

    #[test]
    fn test_mkdir_foreign_owner() -> Result<()> {
        if getuid().is_root() {
            return Ok(());
        }
        let dir = tempfile::tempdir()?;
        // can't chown since we don't run the test binary as root
        assert!(
            mkdir(&dir.path().join("x"), Some((Uid::from_raw(123456), getgid())))
                .is_err()
        );
        Ok(())
    }
}
