//! Logging setup: env_logger, routed through indicatif when bars are drawn

use std::io::Write;

use indicatif::MultiProgress;

/// Default log level selected by command-line flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Debug,
}

impl Verbosity {
    /// `--debug` wins over `--quiet`
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        match (quiet, debug) {
            (_, true) => Self::Debug,
            (true, false) => Self::Quiet,
            (false, false) => Self::Normal,
        }
    }

    fn filter(self) -> &'static str {
        match self {
            Self::Quiet => "warn",
            Self::Normal => "info",
            Self::Debug => "debug",
        }
    }
}

/// Padded level tag, optionally wrapped in an ANSI color
fn level_tag(level: log::Level, color: bool) -> String {
    let (label, ansi) = match level {
        log::Level::Error => ("ERROR", "\x1b[31m"),
        log::Level::Warn => ("WARN ", "\x1b[33m"),
        log::Level::Info => ("INFO ", "\x1b[32m"),
        log::Level::Debug => ("DEBUG", "\x1b[36m"),
        log::Level::Trace => ("TRACE", "\x1b[35m"),
    };
    if color {
        format!("[{ansi}{label}\x1b[0m]")
    } else {
        format!("[{label}]")
    }
}

/// Logger that suspends the progress bars while printing a line.
pub struct IndicatifLogger {
    inner: env_logger::Logger,
    multi: MultiProgress,
}

impl IndicatifLogger {
    pub fn new(inner: env_logger::Logger, multi: MultiProgress) -> Self {
        Self { inner, multi }
    }
}

impl log::Log for IndicatifLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.inner.matches(record) {
            return;
        }
        let line = format!("{} {}", level_tag(record.level(), true), record.args());
        self.multi.suspend(|| eprintln!("{line}"));
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the global logger. Call once, before any logging.
///
/// `RUST_LOG` overrides the level picked by `verbosity`. With `multi`
/// set, lines go through [`IndicatifLogger`]; otherwise plain uncolored
/// lines suitable for log capture.
pub fn init_logging(verbosity: Verbosity, multi: Option<&MultiProgress>) {
    let env = env_logger::Env::default().default_filter_or(verbosity.filter());

    match multi {
        Some(multi) => {
            let logger = env_logger::Builder::from_env(env).build();
            let max_level = logger.filter();
            log::set_boxed_logger(Box::new(IndicatifLogger::new(logger, multi.clone())))
                .expect("failed to init logger");
            log::set_max_level(max_level);
        }
        None => {
            env_logger::Builder::from_env(env)
                .format(|buf, record| {
                    writeln!(buf, "{} {}", level_tag(record.level(), false), record.args())
                })
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_flags() {
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
        assert_eq!(Verbosity::from_flags(true, false), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Debug);
        assert_eq!(Verbosity::Quiet.filter(), "warn");
    }

    #[test]
    #[should_panic]
    fn second_install_fails_loudly() {
        init_logging(Verbosity::Quiet, None);
        init_logging(Verbosity::Quiet, None);
    }

    #[test]
    fn plain_tags_are_padded() {
        assert_eq!(level_tag(log::Level::Info, false), "[INFO ]");
        assert_eq!(level_tag(log::Level::Error, false), "[ERROR]");
        assert!(level_tag(log::Level::Warn, true).contains("\x1b[33m"));
    }
}
