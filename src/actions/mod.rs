mod config;
mod install;
mod remove;
mod shell;

pub use config::*;
pub use install::*;
pub use remove::*;
pub use shell::*;
