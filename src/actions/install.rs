use crate::distributions::Repositories;
use crate::installer::BuildState;
use crate::logger::complete_step;
use anyhow::{Context, Result};
use log::debug;

fn log_repositories(repositories: &Repositories) {
    match repositories {
        Repositories::Apt(lines) | Repositories::Pacman(lines) => {
            for line in lines {
                debug!("Repository: {}", line);
            }
        }
        Repositories::Rpm(repos) => {
            for repo in repos.iter().filter(|repo| repo.enabled) {
                debug!("Repository: {} ({})", repo.id, repo.url);
            }
        }
    }
}

/// Sets up the package manager, installs the base system and then the
/// configured packages, and finally removes the packages configured for
/// removal.
pub fn install(state: &BuildState) -> Result<()> {
    let config = &state.config;
    let distribution = config.distribution;
    let step = complete_step(
        &format!(
            "Installing {} {} into {}",
            distribution.pretty_name(),
            config.release,
            state.root.display()
        ),
        Some("Installation complete"),
    );

    log_repositories(&distribution.repositories(state, true));
    distribution
        .setup(state)
        .context("Setting up the package manager")?;
    distribution.install(state).context("Installing the base system")?;

    if !config.packages.is_empty() {
        let packages = complete_step("Installing packages", None);
        distribution.install_packages(state, &config.packages, true)?;
        packages.finish();
    }

    if !config.remove_packages.is_empty() {
        let removal = complete_step("Removing packages", None);
        distribution.remove_packages(state, &config.remove_packages)?;
        removal.finish();
    }

    step.finish();
    Ok(())
}
