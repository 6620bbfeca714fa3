// Category-based logging infrastructure
//
// This will be used from multiple threads, so it needs
// to be stateless. The only shared piece is the verbosity,
// which is read from the environment exactly once.
use lazy_static::lazy_static;

#[allow(dead_code, non_camel_case_types)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LogLevel {
    // in order of highest priority
    critical, // Urgent and must always be displayed
    error,
    debug,     // debugging related, not verbose
    info,      // more verbose
    profiling, // profiling related timing
}

impl LogLevel {
    pub fn get_name(&self) -> &'static str {
        match self {
            LogLevel::critical => "critical",
            LogLevel::error => "error",
            LogLevel::debug => "debug",
            LogLevel::info => "info",
            LogLevel::profiling => "profiling",
        }
    }

    pub fn get_level(&self) -> u32 {
        match self {
            LogLevel::critical => 0,
            LogLevel::error => 1,
            LogLevel::debug => 2,
            LogLevel::info => 3,
            LogLevel::profiling => 4,
        }
    }

    /// Parse a level from either its name or its numeric value
    pub fn from_str_or_level(val: &str) -> Option<LogLevel> {
        let val = val.trim();
        let levels = [
            LogLevel::critical,
            LogLevel::error,
            LogLevel::debug,
            LogLevel::info,
            LogLevel::profiling,
        ];

        if let Ok(num) = val.parse::<u32>() {
            return levels.iter().copied().find(|l| l.get_level() == num);
        }

        levels
            .iter()
            .copied()
            .find(|l| l.get_name().eq_ignore_ascii_case(val))
    }
}

/// Environment variable controlling the verbosity of all output
pub const LOG_LEVEL_ENV: &str = "DRI2TO3_LOG_LEVEL";

lazy_static! {
    /// The highest level that will be printed. Anything with a larger
    /// level number is dropped.
    pub static ref CURRENT_LOG_LEVEL: u32 = std::env::var(LOG_LEVEL_ENV)
        .ok()
        .and_then(|v| LogLevel::from_str_or_level(&v))
        .unwrap_or(LogLevel::error)
        .get_level();
}

#[macro_export]
macro_rules! log_internal {
    ($loglevel:expr, $($format_args:tt)+) => ({
        let level: $crate::logging::LogLevel = $loglevel;
        // We are loaded into other people's programs, keep stdout
        // clean and only ever write to stderr
        if level.get_level() <= *$crate::logging::CURRENT_LOG_LEVEL {
            eprintln!("[{:?}]<{}> {}:{} - {}",
                      $crate::timing::get_current_millis(),
                      level.get_name(),
                      file!(),
                      line!(),
                      format!($($format_args)+)
            );
        }
    })
}

#[macro_export]
macro_rules! critical {
    ($($format_args:tt)+) => {
        $crate::log_internal!($crate::logging::LogLevel::critical, $($format_args)+)
    };
}

#[macro_export]
macro_rules! error {
    ($($format_args:tt)+) => {
        $crate::log_internal!($crate::logging::LogLevel::error, $($format_args)+)
    };
}

#[macro_export]
macro_rules! debug {
    ($($format_args:tt)+) => {
        $crate::log_internal!($crate::logging::LogLevel::debug, $($format_args)+)
    };
}

#[macro_export]
macro_rules! info {
    ($($format_args:tt)+) => {
        $crate::log_internal!($crate::logging::LogLevel::info, $($format_args)+)
    };
}

#[macro_export]
macro_rules! profiling {
    ($($format_args:tt)+) => {
        $crate::log_internal!($crate::logging::LogLevel::profiling, $($format_args)+)
    };
}
