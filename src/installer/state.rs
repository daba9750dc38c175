use anyhow::{Context, Result};
use chrono::Local;
use log::{debug, trace, warn};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::types::InvokingUser;
use crate::util::mkdir;

/**
 * Everything an install step works with: the resolved configuration, the
 * directories it operates on and the identity of the invoking user as seen
 * from inside the user namespace.
 *
 * The workspace is private to one build and is removed when the state is
 * dropped. The workspace and cache directories belong to the invoking user
 * so they can be cleaned up from outside the namespace. A pkgmngr directory given in the configuration is left alone,
 * the default one lives inside the workspace.
 */
#[derive(Debug)]
pub struct BuildState {
    pub config: Config,
    pub root: PathBuf,
    pub pkgmngr: PathBuf,
    pub cache_dir: PathBuf,
    pub workspace: PathBuf,
    pub invoking: InvokingUser,
}

impl BuildState {
    pub fn new(config: Config, invoking: InvokingUser) -> Result<BuildState> {
        let owner = Some((invoking.uid, invoking.gid));
        mkdir(&config.workspace_dir, owner)?;
        let workspace = new_workspace_path(&config.workspace_dir);
        std::fs::create_dir(&workspace).context(format!(
            "Failed to create workspace {}",
            workspace.display()
        ))?;
        trace!("Workspace: {}", workspace.display());

        let pkgmngr = config
            .pkgmngr
            .clone()
            .unwrap_or_else(|| workspace.join("pkgmngr"));

        let state = BuildState {
            root: config.root.clone(),
            cache_dir: config.cache_dir.clone(),
            pkgmngr,
            workspace,
            config,
            invoking,
        };

        mkdir(&state.root, None)?;
        mkdir(&state.pkgmngr, None)?;
        mkdir(&state.cache_dir, owner)?;

        Ok(state)
    }
}

impl Drop for BuildState {
    fn drop(&mut self) {
        debug!("Removing workspace {}", self.workspace.display());
        if let Err(e) = std::fs::remove_dir_all(&self.workspace) {
            warn!(
                "Failed to remove workspace {}: {}",
                self.workspace.display(),
                e
            );
        }
    }
}

fn new_workspace_path(workspace_dir: &Path) -> PathBuf {
    let now = Local::now();
    let base_name = format!("rootstrap-{}", now.format("%Y-%m-%d_%H:%M:%S"));
    let path = workspace_dir.join(&base_name);
    if !path.exists() {
        return path;
    }

    let with_ms = format!("{}.{:03}", base_name, now.timestamp_subsec_millis());
    let path = workspace_dir.join(&with_ms);
    if !path.exists() {
        return path;
    }

    workspace_dir.join(format!("{}-{}", with_ms, uuid::Uuid::new_v4().simple()))
}
