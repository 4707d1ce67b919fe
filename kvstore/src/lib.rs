//! # Summary
//!
//! Pieces shared by the `kvstore-server` and `kvstore-client` binaries.

use std::time::SystemTime;

/// Installs a stderr logger. Each `-v` raises the level by one step,
/// starting from warnings.
pub fn init_logging(verbosity: u8) -> Result<(), log::SetLoggerError> {
    let level = match verbosity {
    | 0 => log::LevelFilter::Warn,
    | 1 => log::LevelFilter::Info,
    | 2 => log::LevelFilter::Debug,
    | _ => log::LevelFilter::Trace,
    };
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} {:<5} [{}] {}",
                humantime::format_rfc3339_millis(SystemTime::now()),
                record.level(),
                record.target(),
                message,
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()
}

/// Parses a duration such as `500ms` or `15s`.
pub fn parse_duration(raw: &str) -> Result<std::time::Duration, humantime::DurationError> {
    humantime::parse_duration(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_accept_units() {
        assert_eq!(parse_duration("500ms").unwrap().as_millis(), 500);
        assert_eq!(parse_duration("15s").unwrap().as_secs(), 15);
        assert!(parse_duration("soon").is_err());
    }
}
