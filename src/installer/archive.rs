use anyhow::{Context, Result};
use log::trace;
use nix::unistd::geteuid;
use std::fs::File;
use std::path::Path;

/**
 * Unpacks the tarball at `src` into `dest`, keeping permissions. Ownership
 * is only kept when we are root, in the namespace or otherwise, since
 * nobody else can chown to arbitrary ids.
 */
pub fn extract_tar(src: &Path, dest: &Path) -> Result<()> {
    unpack(src, dest, geteuid().is_root())
}

fn unpack(src: &Path, dest: &Path, preserve_ownerships: bool) -> Result<()> {
    trace!("Extracting {} to {}", src.display(), dest.display());
    let file =
        File::open(src).context(format!("Failed to open {}", src.display()))?;
    let mut archive = tar::Archive::new(file);
    archive.set_preserve_permissions(true);
    archive.set_preserve_ownerships(preserve_ownerships);
    archive.set_overwrite(true);
    archive.unpack(dest).context(format!(
        "Failed to extract {} to {}",
        src.display(),
        dest.display()
    ))
}
