use colored::{ColoredString, Colorize};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io::{self, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

static STEP_DEPTH: AtomicUsize = AtomicUsize::new(0);

/**
 * Logger for the whole process. Until [`RootstrapLogger::print_deferred`]
 * is called, records are held back, since the level the user asked for is
 * only known once the configuration has been resolved.
 */
pub struct RootstrapLogger {
    level: Mutex<LevelFilter>,
    output: Mutex<Box<dyn Write + Send>>,
    /// `None` once held back records have been printed.
    deferred: Mutex<Option<Vec<(Level, ColoredString)>>>,
}

impl RootstrapLogger {
    pub fn new(level: LevelFilter) -> &'static Self {
        Self::with_output(level, Box::new(io::stderr()))
    }

    pub fn with_output(level: LevelFilter, output: Box<dyn Write + Send>) -> &'static Self {
        Box::leak(Box::new(Self {
            level: Mutex::new(level),
            output: Mutex::new(output),
            deferred: Mutex::new(Some(Vec::new())),
        }))
    }

    pub fn init(&'static self) -> Result<&'static Self, log::SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(LevelFilter::Trace);
        Ok(self)
    }

    pub fn set_level(&self, level: LevelFilter) {
        *self.level.lock().expect("Failed to lock level") = level;
    }

    fn level(&self) -> LevelFilter {
        *self.level.lock().expect("Failed to lock level")
    }

    /// Prints what was held back at the current level and stops deferring.
    /// Calling it again does nothing.
    pub fn print_deferred(&self) {
        let Some(deferred) = self.deferred.lock().expect("Failed to lock deferred").take()
        else {
            return;
        };
        let level_filter = self.level();
        let mut output = self.output.lock().expect("Failed to lock output");
        for (_, message) in deferred.iter().filter(|(level, _)| *level <= level_filter) {
            let _ = writeln!(output, "{}", message);
        }
    }

    fn format(record: &Record) -> ColoredString {
        let indent = "  ".repeat(STEP_DEPTH.load(Ordering::Relaxed));
        match record.level() {
            Level::Error => format!("{}{}", indent, record.args()).red().bold(),
            Level::Warn => format!("{}{}", indent, record.args()).yellow(),
            Level::Info => format!("{}{}", indent, record.args()).normal(),
            Level::Debug => {
                format!("{}[{}] {}", indent, record.target(), record.args())
                    .blue()
            }
            Level::Trace => {
                format!("{}[{}] {}", indent, record.target(), record.args())
                    .bright_black()
            }
        }
    }
}

impl Log for RootstrapLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level()
    }

    fn log(&self, record: &Record) {
        let line = Self::format(record);
        if let Some(deferred) =
            self.deferred.lock().expect("Failed to lock deferred").as_mut()
        {
            deferred.push((record.level(), line));
            return;
        }
        if self.enabled(record.metadata()) {
            let mut output = self.output.lock().expect("Failed to lock output");
            let _ = writeln!(output, "{}", line);
        }
    }

    fn flush(&self) {
        let _ = self.output.lock().expect("Failed to lock output").flush();
    }
}

/// True when debug output was requested, which also turns on full error
/// reports and debug logging in the tools we run.
pub fn debug_enabled() -> bool {
    log::log_enabled!(target: "rootstrap", Level::Debug)
}

pub struct Step {
    done: Option<String>,
    active: bool,
}

/// Logs `start` and indents everything logged until the returned guard is
/// dropped. `done` is only logged by [`Step::finish`], so a step abandoned
/// through `?` stays silent.
pub fn complete_step(start: &str, done: Option<&str>) -> Step {
    log::info!("{}", start.bold());
    STEP_DEPTH.fetch_add(1, Ordering::Relaxed);
    Step {
        done: done.map(String::from),
        active: true,
    }
}

impl Step {
    pub fn finish(mut self) {
        self.leave();
        if let Some(done) = self.done.take() {
            log::info!("{}", done.bold());
        }
    }

    fn leave(&mut self) {
        if self.active {
            self.active = false;
            STEP_DEPTH.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

impl Drop for Step {
    fn drop(&mut self) {
        self.leave();
    }
}
