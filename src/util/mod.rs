mod capability;
mod find_binary;
mod lock;
mod mkdir;
mod output;
mod shell;
pub mod umask;

pub use capability::*;
pub use find_binary::*;
pub use lock::*;
pub use mkdir::*;
pub use output::*;
pub use shell::*;
