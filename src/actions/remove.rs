use crate::installer::BuildState;
use crate::logger::complete_step;
use anyhow::{Result, anyhow};

/// Removes the configured packages and `extra` from an installed root.
pub fn remove(state: &BuildState, extra: Option<Vec<String>>) -> Result<()> {
    let mut packages = state.config.remove_packages.clone();
    packages.extend(extra.unwrap_or_default());
    if packages.is_empty() {
        return Err(anyhow!("No packages to remove"));
    }
    if !state.root.join("usr").is_dir() {
        return Err(anyhow!(
            "{} does not contain an installed system",
            state.root.display()
        ));
    }

    let distribution = state.config.distribution;
    let step = complete_step(
        &format!("Removing {}", packages.join(", ")),
        Some("Packages removed"),
    );
    distribution.setup(state)?;
    distribution.remove_packages(state, &packages)?;
    step.finish();
    Ok(())
}
