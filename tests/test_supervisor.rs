use anyhow::Result;
use log::{Level, Log, Metadata, Record};
use rootstrap::error::{RootstrapError, find_rootstrap_error};
use rootstrap::run::{Redirect, RunOptions, exit_code_for, run};
use rstest::*;
use std::cell::Cell;
use std::sync::Once;

thread_local! {
    static ERRORS: Cell<usize> = const { Cell::new(0) };
}

/* Counts error records per thread, so tests running in parallel do not see
 * each other's failures. */
struct CountingLogger;

impl Log for CountingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if record.level() == Level::Error {
            ERRORS.with(|errors| errors.set(errors.get() + 1));
        }
    }

    fn flush(&self) {}
}

static LOGGER: CountingLogger = CountingLogger;
static INIT: Once = Once::new();

#[fixture]
fn errors() -> fn() -> usize {
    INIT.call_once(|| {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Info);
    });
    ERRORS.with(|errors| errors.set(0));
    || ERRORS.with(Cell::get)
}

#[rstest]
fn test_failure_logged_exactly_once(errors: fn() -> usize) {
    let err = run(&["sh", "-c", "exit 3"], RunOptions::new()).unwrap_err();
    assert_eq!(errors(), 1);

    // The outermost boundary does not report it a second time
    assert_eq!(exit_code_for(&err.context("installing packages")), 3);
    assert_eq!(errors(), 1);
}

#[rstest]
fn test_failure_not_logged_when_disabled(errors: fn() -> usize) {
    let err = run(&["sh", "-c", "exit 3"], RunOptions::new().log(false)).unwrap_err();
    assert!(matches!(
        find_rootstrap_error(&err),
        Some(RootstrapError::ProcessFailure { returncode: 3, .. })
    ));
    assert_eq!(errors(), 0);
}

#[rstest]
fn test_unchecked_failure_is_returned(errors: fn() -> usize) -> Result<()> {
    let completed = run(&["sh", "-c", "exit 3"], RunOptions::new().check(false))?;
    assert_eq!(completed.returncode, 3);
    assert!(!completed.success());
    assert_eq!(errors(), 0);
    Ok(())
}

#[rstest]
fn test_missing_binary(errors: fn() -> usize) {
    let err = run(&["rootstrap-no-such-binary"], RunOptions::new()).unwrap_err();
    assert!(matches!(
        find_rootstrap_error(&err),
        Some(RootstrapError::BinaryNotFound(_))
    ));
    assert_eq!(exit_code_for(&err), 1);
    assert_eq!(errors(), 1);
}

#[rstest]
#[case(&[], "")]
#[case(&[("ROOTSTRAP_TEST_VALUE", "overlay")], "overlay")]
fn test_environment_overlay(
    #[case] env: &[(&str, &str)],
    #[case] expected: &str,
) -> Result<()> {
    let mut options = RunOptions::new().stdout(Redirect::Pipe);
    for (key, value) in env {
        options = options.env(key, value);
    }
    let completed = run(&["sh", "-c", "printf %s \"$ROOTSTRAP_TEST_VALUE\""], options)?;
    assert_eq!(completed.stdout.as_deref(), Some(expected));
    Ok(())
}

#[rstest]
fn test_input_is_fed_to_stdin() -> Result<()> {
    let completed = run(
        &["cat"],
        RunOptions::new().input("bootstrap\n").stdout(Redirect::Pipe),
    )?;
    assert_eq!(completed.stdout.as_deref(), Some("bootstrap\n"));
    Ok(())
}
