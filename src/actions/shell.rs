use crate::config::Config;
use crate::run::Redirect;
use crate::sandbox::{BwrapOptions, bwrap, chroot_cmd};
use crate::types::InvokingUser;
use anyhow::{Result, anyhow};
use log::trace;
use std::ffi::OsString;

/// Runs `command`, by default `sh`, with the root as its filesystem root.
/// The root only gets network access and the host's DNS configuration
/// when networking is enabled. The scratch `/work` directory belongs to
/// `invoking`, as seen from inside the user namespace.
pub fn shell(
    config: &Config,
    invoking: &InvokingUser,
    command: Option<Vec<String>>,
) -> Result<()> {
    if !config.root.join("usr").is_dir() {
        return Err(anyhow!(
            "{} does not contain an installed system, run install first",
            config.root.display()
        ));
    }

    let command = command.unwrap_or_else(|| vec!["sh".to_string()]);
    trace!("Running {} in {}", command.join(" "), config.root.display());

    let mut cmdline = chroot_cmd(&config.root, invoking, config.network, &[])?;
    cmdline.extend(command.into_iter().map(OsString::from));

    bwrap(
        &cmdline,
        BwrapOptions::new()
            .network(config.network)
            .envs(&config.environment)
            .stdin(Redirect::Inherit)
            .stdout(Redirect::Inherit)
            .debug_shell(config.debug_shell),
    )?;
    Ok(())
}
