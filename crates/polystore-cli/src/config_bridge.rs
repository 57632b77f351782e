//! Bridge from `polystore_config::Config` to runtime types.

use polystore_config::Config;
use polystore_telemetry::{LogConfig, LogFormat};

/// Logging settings for [`polystore_telemetry::setup_logging`].
pub(crate) fn to_log_config(cfg: &Config) -> LogConfig {
    let format = cfg.logging.format.parse().unwrap_or(LogFormat::Compact);

    let mut log_config = LogConfig::new(&cfg.logging.level).with_format(format);

    for directive in &cfg.logging.directives {
        log_config = log_config.with_directive(directive);
    }

    log_config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maps_logging_section() {
        let mut cfg = Config::default();
        cfg.logging.level = "warn".to_owned();
        cfg.logging.format = "json".to_owned();
        cfg.logging.directives = vec!["sqlx=error".to_owned()];

        let log = to_log_config(&cfg);
        assert_eq!(log.level, "warn");
        assert_eq!(log.format, LogFormat::Json);
        assert_eq!(log.directives, vec!["sqlx=error"]);
    }

    #[test]
    fn test_unknown_format_falls_back_to_compact() {
        let mut cfg = Config::default();
        cfg.logging.format = "fancy".to_owned();
        assert_eq!(to_log_config(&cfg).format, LogFormat::Compact);
    }
}
