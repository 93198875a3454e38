use std::{
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use crate::error::ConfigError;
use crate::hardcover_client::DEFAULT_API_URL;
use crate::scheduler::SyncSchedule;
use crate::sync::reconciler::DEFAULT_FINISHED_THRESHOLD;

const SECRETS_DIR: &str = "/run/secrets";
/// Top of every hour
pub const DEFAULT_SYNC_CRON: &str = "0 */1 * * *";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_LOG_DIR: &str = "logs";

#[derive(Debug, Clone)]
pub struct Config {
    pub abs_url: String,
    pub abs_api_key: String,
    pub hardcover_api_key: String,
    pub hardcover_api_url: String,
    pub finished_threshold: f64,
    pub sync_schedule: SyncSchedule,
    pub http_timeout: Duration,
    pub bind_addr: String,
    pub log_dir: PathBuf,
}

impl Config {
    /// Read configuration from the environment, preferring Docker secrets for API keys.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| {
            if let Some(secret) = read_secret(Path::new(SECRETS_DIR), key) {
                return Some(secret);
            }
            std::env::var(key).ok()
        })
    }

    /// Build a config from any key lookup. Only numeric keys can fail here;
    /// missing required keys are reported by `validate`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let finished_threshold = match get("FINISHED_THRESHOLD") {
            Some(raw) => parse_threshold(&raw)?,
            None => DEFAULT_FINISHED_THRESHOLD,
        };
        let sync_schedule = match (get("SYNC_INTERVAL"), get("SYNC_INTERVAL_SECS")) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::Invalid {
                    key: "SYNC_INTERVAL",
                    message: "set either SYNC_INTERVAL or SYNC_INTERVAL_SECS, not both".into(),
                });
            }
            (Some(cron), None) => parse_cron(&cron)?,
            (None, Some(secs)) => {
                SyncSchedule::Every(parse_secs("SYNC_INTERVAL_SECS", Some(secs), 0)?)
            }
            (None, None) => parse_cron(DEFAULT_SYNC_CRON)?,
        };
        let http_timeout = parse_secs(
            "HTTP_TIMEOUT_SECS",
            get("HTTP_TIMEOUT_SECS"),
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?;

        Ok(Config {
            abs_url: get("ABS_URL").unwrap_or_default(),
            abs_api_key: get("ABS_API_KEY").unwrap_or_default(),
            hardcover_api_key: get("HARDCOVER_API_KEY").unwrap_or_default(),
            hardcover_api_url: get("HARDCOVER_API_URL").unwrap_or(DEFAULT_API_URL.into()),
            finished_threshold,
            sync_schedule,
            http_timeout,
            bind_addr: get("BIND_ADDR").unwrap_or(DEFAULT_BIND_ADDR.into()),
            log_dir: get("LOG_DIR").unwrap_or(DEFAULT_LOG_DIR.into()).into(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing: Vec<&'static str> = [
            ("ABS_URL", &self.abs_url),
            ("ABS_API_KEY", &self.abs_api_key),
            ("HARDCOVER_API_KEY", &self.hardcover_api_key),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(key, _)| key)
        .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Missing(missing))
        }
    }
}

/// Docker secrets are lowercase file names under the secrets dir, e.g. `abs_api_key`.
fn read_secret(dir: &Path, key: &str) -> Option<String> {
    if !key.ends_with("_API_KEY") {
        return None;
    }
    let path = dir.join(key.to_lowercase());
    match std::fs::read_to_string(&path) {
        Ok(contents) => {
            tracing::debug!(path = %path.display(), "using Docker secret");
            Some(contents.trim().to_string())
        }
        Err(_) => None,
    }
}

fn parse_threshold(raw: &str) -> Result<f64, ConfigError> {
    let value: f64 = raw.parse().map_err(|e| ConfigError::Invalid {
        key: "FINISHED_THRESHOLD",
        message: format!("{raw:?} is not a number: {e}"),
    })?;
    if value > 0.0 && value <= 1.0 {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key: "FINISHED_THRESHOLD",
            message: format!("{value} must be greater than 0 and at most 1"),
        })
    }
}

/// Five-field crontab expressions (minute first) get a leading seconds field;
/// six and seven field expressions are taken as they are.
fn parse_cron(raw: &str) -> Result<SyncSchedule, ConfigError> {
    let expression = if raw.split_whitespace().count() == 5 {
        format!("0 {}", raw)
    } else {
        raw.to_string()
    };
    cron::Schedule::from_str(&expression)
        .map(SyncSchedule::Cron)
        .map_err(|e| ConfigError::Invalid {
            key: "SYNC_INTERVAL",
            message: format!("{raw:?} is not a cron expression: {e}"),
        })
}

fn parse_secs(key: &'static str, raw: Option<String>, default: u64) -> Result<Duration, ConfigError> {
    let secs = match raw {
        Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
            key,
            message: format!("{raw:?} is not a whole number of seconds: {e}"),
        })?,
        None => default,
    };
    if secs == 0 {
        return Err(ConfigError::Invalid {
            key,
            message: "must be greater than 0".into(),
        });
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::TimeZone;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = config_from(&[
            ("ABS_URL", "http://abs.local"),
            ("ABS_API_KEY", "abs"),
            ("HARDCOVER_API_KEY", "hc"),
        ])
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.hardcover_api_url, DEFAULT_API_URL);
        assert_eq!(config.finished_threshold, 0.95);
        assert!(matches!(config.sync_schedule, SyncSchedule::Cron(_)));
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn all_missing_keys_reported() {
        let config = config_from(&[("ABS_API_KEY", "  ")]).unwrap();
        assert_eq!(
            config.validate(),
            Err(ConfigError::Missing(vec![
                "ABS_URL",
                "ABS_API_KEY",
                "HARDCOVER_API_KEY"
            ]))
        );
    }

    #[test]
    fn threshold_bounds() {
        assert_eq!(
            config_from(&[("FINISHED_THRESHOLD", "1")]).unwrap().finished_threshold,
            1.0
        );
        assert!(matches!(
            config_from(&[("FINISHED_THRESHOLD", "0")]),
            Err(ConfigError::Invalid { key: "FINISHED_THRESHOLD", .. })
        ));
        assert!(matches!(
            config_from(&[("FINISHED_THRESHOLD", "ninety")]),
            Err(ConfigError::Invalid { key: "FINISHED_THRESHOLD", .. })
        ));
    }

    #[test]
    fn crontab_default_fires_on_the_hour() {
        let SyncSchedule::Cron(schedule) = parse_cron(DEFAULT_SYNC_CRON).unwrap() else {
            panic!("expected a cron schedule");
        };
        let now = chrono::Utc
            .with_ymd_and_hms(2024, 3, 1, 10, 15, 30)
            .unwrap();
        let next = schedule.after(&now).next().unwrap();
        assert_eq!(next, chrono::Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap());
    }

    #[test]
    fn sync_interval_accepts_cron_or_seconds() {
        assert!(matches!(
            config_from(&[("SYNC_INTERVAL", "*/15 * * * *")]).unwrap().sync_schedule,
            SyncSchedule::Cron(_)
        ));
        assert!(matches!(
            config_from(&[("SYNC_INTERVAL_SECS", "900")]).unwrap().sync_schedule,
            SyncSchedule::Every(d) if d == Duration::from_secs(900)
        ));
        assert!(matches!(
            config_from(&[("SYNC_INTERVAL", "every hour")]),
            Err(ConfigError::Invalid { key: "SYNC_INTERVAL", .. })
        ));
        assert!(matches!(
            config_from(&[("SYNC_INTERVAL", "0 * * * *"), ("SYNC_INTERVAL_SECS", "60")]),
            Err(ConfigError::Invalid { key: "SYNC_INTERVAL", .. })
        ));
    }

    #[test]
    fn bad_interval_is_fatal() {
        assert!(matches!(
            config_from(&[("SYNC_INTERVAL_SECS", "0")]),
            Err(ConfigError::Invalid { key: "SYNC_INTERVAL_SECS", .. })
        ));
        assert!(matches!(
            config_from(&[("HTTP_TIMEOUT_SECS", "-3")]),
            Err(ConfigError::Invalid { key: "HTTP_TIMEOUT_SECS", .. })
        ));
    }

    #[test]
    fn secrets_only_cover_api_keys() {
        let dir = std::env::temp_dir().join(format!("secrets-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("hardcover_api_key"), "from-secret\n").unwrap();
        std::fs::write(dir.join("abs_url"), "http://ignored").unwrap();

        assert_eq!(
            read_secret(&dir, "HARDCOVER_API_KEY").as_deref(),
            Some("from-secret")
        );
        assert_eq!(read_secret(&dir, "ABS_API_KEY"), None);
        assert_eq!(read_secret(&dir, "ABS_URL"), None);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
