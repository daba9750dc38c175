#![allow(clippy::print_stdout)]

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Action output: either plain lines on stdout, or one JSON object
/// assembled while the action runs and printed at the end.
struct OutputState {
    print_lines: bool,
    json: BTreeMap<String, Value>,
}

static OUTPUT: Mutex<OutputState> = Mutex::new(OutputState {
    print_lines: true,
    json: BTreeMap::new(),
});

fn state() -> MutexGuard<'static, OutputState> {
    OUTPUT.lock().expect("Failed to lock OUTPUT")
}

pub fn set_should_print_output(should_print: bool) {
    state().print_lines = should_print;
}

pub fn print_output(line: &str) {
    if state().print_lines {
        println!("{}", line);
    }
}

pub fn set_json_output(key: &str, value: &Value) {
    state().json.insert(key.to_string(), value.clone());
}

#[macro_export]
macro_rules! outln {
    ( $fmt:expr $(, $args:expr)*) => {
        $crate::util::print_output(&format!($fmt $(, $args)*))
    };
}

/// The JSON object collected so far, keys sorted.
pub fn render_json_output() -> Result<String> {
    let map: serde_json::Map<String, Value> = state()
        .json
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    serde_json::to_string_pretty(&Value::Object(map)).context("Error serializing JSON")
}

pub fn print_json_output() -> Result<()> {
    println!("{}", render_json_output()?);
    Ok(())
}
