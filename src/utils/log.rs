//! Node logging.
//!
//! One line per message on stderr:
//!
//! ```text
//! 2024-01-01 12:00:00.000 [INFO ] chain_store: Committed block 7 (…) with 3 transactions
//! ```
//!
//! The level threshold starts at `LEDGER_LOG` (`debug`, `info`, `warn` or
//! `error`) and falls back to `info`. Logging is compiled out of unit tests.

use std::fmt;
use std::io::Write;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Environment variable holding the initial level.
pub const LOG_ENV: &str = "LEDGER_LOG";

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl Level {
    fn from_u8(raw: u8) -> Level {
        match raw {
            0 => Level::Debug,
            1 => Level::Info,
            2 => Level::Warn,
            _ => Level::Error,
        }
    }

    /// Parses a level name, ignoring case.
    pub fn parse(name: &str) -> Option<Level> {
        match name.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            _ => None,
        }
    }

    fn color(self) -> ColorSpec {
        let mut spec = ColorSpec::new();
        match self {
            Level::Debug => spec.set_fg(Some(Color::Cyan)),
            Level::Info => spec.set_fg(Some(Color::Green)),
            Level::Warn => spec.set_fg(Some(Color::Yellow)).set_bold(true),
            Level::Error => spec.set_fg(Some(Color::Red)).set_bold(true),
        };
        spec
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        };
        // padding applies to the name, so `{:5}` lines up the columns
        f.pad(name)
    }
}

/// UTC wall-clock time with microsecond precision, as used for block and
/// transaction timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Timestamp {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Timestamp(micros)
    }

    /// Splits into a civil date and the time of day.
    ///
    /// Returns `(year, month, day, hour, minute, second, millisecond)`.
    pub fn to_civil(self) -> (i64, u32, u32, u32, u32, u32, u32) {
        let secs = self.0.div_euclid(1_000_000);
        let millis = (self.0.rem_euclid(1_000_000) / 1_000) as u32;
        let days = secs.div_euclid(86_400);
        let in_day = secs.rem_euclid(86_400) as u32;
        let (year, month, day) = civil_from_days(days);
        (
            year,
            month,
            day,
            in_day / 3_600,
            in_day / 60 % 60,
            in_day % 60,
            millis,
        )
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (y, mo, d, h, mi, s, ms) = self.to_civil();
        write!(f, "{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}.{ms:03}")
    }
}

/// Proleptic Gregorian date of `days` since 1970-01-01, counted in 400-year
/// eras that start on March 1st.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let shifted = days + 719_468;
    let era = shifted.div_euclid(146_097);
    let day_of_era = shifted.rem_euclid(146_097);
    let year_of_era = (day_of_era - day_of_era / 1_460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let month_index = (5 * day_of_year + 2) / 153;
    let day = (day_of_year - (153 * month_index + 2) / 5 + 1) as u32;
    let month = (if month_index < 10 { month_index + 3 } else { month_index - 9 }) as u32;
    let year = year_of_era + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

static MIN_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);
static COLOR: AtomicBool = AtomicBool::new(true);
static FROM_ENV: Once = Once::new();

fn load_env_level() {
    FROM_ENV.call_once(|| {
        if let Some(level) = std::env::var(LOG_ENV).ok().as_deref().and_then(Level::parse) {
            MIN_LEVEL.store(level as u8, Ordering::Relaxed);
        }
    });
}

/// Lowest level that is still printed. Overrides `LEDGER_LOG`.
pub fn set_max_level(level: Level) {
    FROM_ENV.call_once(|| {});
    MIN_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn max_level() -> Level {
    load_env_level();
    Level::from_u8(MIN_LEVEL.load(Ordering::Relaxed))
}

/// Turns colored level tags on or off. Colors are also dropped when stderr
/// is not a terminal.
pub fn set_color(enabled: bool) {
    COLOR.store(enabled, Ordering::Relaxed);
}

pub fn enabled(level: Level) -> bool {
    level >= max_level()
}

/// Last segment of a module path: `ledger::storage::chain_store` → `chain_store`.
fn short_target(module_path: &str) -> &str {
    module_path.rsplit("::").next().unwrap_or(module_path)
}

#[doc(hidden)]
pub fn log(level: Level, module_path: &str, message: &str) {
    if !enabled(level) {
        return;
    }
    let choice = if COLOR.load(Ordering::Relaxed) {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    let mut stderr = StandardStream::stderr(choice);
    let _ = write!(stderr, "{} [", Timestamp::now());
    let _ = stderr.set_color(&level.color());
    let _ = write!(stderr, "{:5}", level);
    let _ = stderr.reset();
    let _ = writeln!(stderr, "] {}: {}", short_target(module_path), message);
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) && $crate::utils::log::enabled($crate::utils::log::Level::Debug) {
            $crate::utils::log::log($crate::utils::log::Level::Debug, module_path!(), &format!($($arg)*))
        }
    }};
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) {
            $crate::utils::log::log($crate::utils::log::Level::Info, module_path!(), &format!($($arg)*))
        }
    }};
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) {
            $crate::utils::log::log($crate::utils::log::Level::Warn, module_path!(), &format!($($arg)*))
        }
    }};
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) {
            $crate::utils::log::log($crate::utils::log::Level::Error, module_path!(), &format!($($arg)*))
        }
    }};
}
