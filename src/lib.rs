#![allow(
    clippy::collapsible_else_if,
    clippy::collapsible_if,
    clippy::module_inception,
    clippy::new_without_default,
    clippy::result_map_unit_fn,
    clippy::useless_format
)]
#![deny(
    clippy::get_unwrap,
    clippy::panic,
    clippy::print_stdout,
    clippy::unwrap_used,
    clippy::used_underscore_binding,
    clippy::used_underscore_items
)]

pub mod actions;
pub mod config;
pub mod distributions;
pub mod error;
pub mod installer;
pub mod logger;
pub mod privilege;
pub mod run;
pub mod sandbox;
pub mod types;
pub mod util;
