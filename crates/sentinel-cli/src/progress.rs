//! Reporter implementation for the CLI binary: phase progress goes to
//! stderr at a level gated by `-v`/`-vv`, errors always print.

use sentinel_config::LogVerbosity;
use sentinel_core::Reporter;

pub struct CliReporter {
    verbosity: LogVerbosity,
}

impl CliReporter {
    pub fn new(verbosity: LogVerbosity) -> Self {
        Self { verbosity }
    }
}

impl Reporter for CliReporter {
    fn info(&mut self, msg: &str) {
        if !matches!(self.verbosity, LogVerbosity::Quiet) {
            eprintln!("[info] {msg}");
        }
    }

    fn warn(&mut self, msg: &str) {
        eprintln!("[warn] {msg}");
    }

    fn error(&mut self, msg: &str) {
        eprintln!("[error] {msg}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_reporter_suppresses_info_but_accepts_the_call() {
        let mut reporter = CliReporter::new(LogVerbosity::Quiet);
        reporter.info("should not panic");
    }

    #[test]
    fn normal_reporter_accepts_every_level() {
        let mut reporter = CliReporter::new(LogVerbosity::Normal);
        reporter.info("i");
        reporter.warn("w");
        reporter.error("e");
    }
}
