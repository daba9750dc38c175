#![deny(clippy::panic, clippy::print_stdout, clippy::unwrap_used)]

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser};
use clap_complete::CompleteEnv;
use log::Log;
use serde_json::Value;

use rootstrap::actions;
use rootstrap::config::cli::{Action, Args};
use rootstrap::config::{Config, resolve_config};
use rootstrap::installer::BuildState;
use rootstrap::logger::RootstrapLogger;
use rootstrap::privilege::{become_root, init_mount_namespace};
use rootstrap::run::{fork_and_wait, install_interrupt_handlers, uncaught_error_handler};
use rootstrap::types::InvokingUser;
use rootstrap::util::{print_json_output, set_json_output, set_should_print_output};

pub fn main() {
    std::process::exit(uncaught_error_handler(rootstrap_main));
}

fn rootstrap_main() -> Result<()> {
    // Does not return when shell completion was requested
    CompleteEnv::with_factory(Args::command).complete();

    let logger = RootstrapLogger::new(log::LevelFilter::Trace)
        .init()
        .map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;
    let cli = Args::parse();

    logger.set_level(cli.log_level.unwrap_or(log::LevelFilter::Info));

    install_interrupt_handlers()?;

    let json = cli.json;
    let action = cli.action.clone();
    let config = resolve_config(cli)
        .inspect_err(|_| logger.print_deferred())
        .context("Resolving config")?;

    // Now that the final log level is known, print out what was logged while
    // loading the config.
    logger.set_level(config.log_level);
    logger.print_deferred();

    set_should_print_output(!json);

    let result = match action {
        Action::Config { keys } => actions::config(&config, keys),
        action => run_in_namespace(config, action),
    };

    if json {
        match &result {
            Ok(()) => set_json_output("status", &Value::String("success".to_string())),
            Err(e) => {
                set_json_output("status", &Value::String("error".to_string()));
                set_json_output("error", &Value::String(format!("{:#}", e)));
            }
        }
        print_json_output()?;
    }
    logger.flush();
    result
}

/* Everything that touches the root runs as root in a user namespace, in a
 * forked child with its own mount namespace. */
fn run_in_namespace(config: Config, action: Action) -> Result<()> {
    let invoking = InvokingUser::current()?;
    let invoking = become_root(&invoking).context("Becoming root in a user namespace")?;

    fork_and_wait(move || {
        init_mount_namespace()?;
        match action {
            Action::Install => actions::install(&BuildState::new(config, invoking)?),
            Action::Remove { packages } => {
                actions::remove(&BuildState::new(config, invoking)?, packages)
            }
            Action::Shell { command } => actions::shell(&config, &invoking, command),
            Action::Config { keys } => actions::config(&config, keys),
        }
    })
}
