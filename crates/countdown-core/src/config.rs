//! Configuration loading from environment variables.
//!
//! Every component takes its section of [`Config`] explicitly; nothing reads
//! the environment after startup.

use std::str::FromStr;
use std::time::Duration;

/// Job scheduler settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Upper bound on jobs RUNNING at once.
    pub max_concurrent_jobs: usize,
    /// Per-execution deadline; exceeding it counts as a failed attempt.
    pub job_timeout: Duration,
    /// Backoff base for the first retry.
    pub retry_delay: Duration,
    /// Retries after the initial attempt, unless a request overrides it.
    pub max_retries: u32,
    pub dispatch_poll_interval: Duration,
    /// Cap on a single backoff delay.
    pub retry_max_delay: Duration,
    /// Jitter is drawn uniformly from `[0, retry_jitter_ratio)`.
    pub retry_jitter_ratio: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 10,
            job_timeout: Duration::from_secs(300),
            retry_delay: Duration::from_secs(60),
            max_retries: 3,
            dispatch_poll_interval: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(3600),
            retry_jitter_ratio: 0.1,
        }
    }
}

/// Event consumer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerConfig {
    /// Pause after handing a delivery back for redelivery.
    pub redelivery_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            redelivery_backoff: Duration::from_millis(500),
        }
    }
}

/// Report engine settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportConfig {
    /// Records fetched per store round trip when streaming.
    pub page_size: usize,
    /// Trailing window for `statistics()`. `None` covers the whole store.
    pub stats_window: Option<chrono::Duration>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            page_size: 500,
            stats_window: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub consumer: ConsumerConfig,
    pub report: ReportConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `MAX_CONCURRENT_JOBS` (10), `JOB_TIMEOUT` seconds (300),
    ///   `RETRY_DELAY` seconds (60), `MAX_RETRIES` (3),
    ///   `DISPATCH_POLL_INTERVAL` seconds (1), `RETRY_MAX_DELAY` seconds (3600),
    ///   `RETRY_JITTER_RATIO` (0.1)
    /// - `REPORT_PAGE_SIZE` (500), `REPORT_STATS_WINDOW_DAYS` (unset)
    /// - `CONSUMER_REDELIVERY_BACKOFF_MS` (500)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`], reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = SchedulerConfig::default();

        let max_concurrent_jobs: usize = parse(&lookup, "MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs)?;
        if max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid("MAX_CONCURRENT_JOBS", "must be at least 1".into()));
        }

        let job_timeout = secs(&lookup, "JOB_TIMEOUT", defaults.job_timeout)?;
        if job_timeout.is_zero() {
            return Err(ConfigError::Invalid("JOB_TIMEOUT", "must be positive".into()));
        }

        let dispatch_poll_interval = secs(&lookup, "DISPATCH_POLL_INTERVAL", defaults.dispatch_poll_interval)?;
        if dispatch_poll_interval.is_zero() {
            return Err(ConfigError::Invalid("DISPATCH_POLL_INTERVAL", "must be positive".into()));
        }

        let retry_jitter_ratio: f64 = parse(&lookup, "RETRY_JITTER_RATIO", defaults.retry_jitter_ratio)?;
        if !(0.0..1.0).contains(&retry_jitter_ratio) {
            return Err(ConfigError::Invalid("RETRY_JITTER_RATIO", "must be in [0, 1)".into()));
        }

        let retry_delay = secs(&lookup, "RETRY_DELAY", defaults.retry_delay)?;
        let retry_max_delay = secs(&lookup, "RETRY_MAX_DELAY", defaults.retry_max_delay)?;
        if retry_max_delay < retry_delay {
            return Err(ConfigError::Invalid(
                "RETRY_MAX_DELAY",
                format!("must be at least RETRY_DELAY ({}s)", retry_delay.as_secs()),
            ));
        }

        let scheduler = SchedulerConfig {
            max_concurrent_jobs,
            job_timeout,
            retry_delay,
            max_retries: parse(&lookup, "MAX_RETRIES", defaults.max_retries)?,
            dispatch_poll_interval,
            retry_max_delay,
            retry_jitter_ratio,
        };

        let backoff_ms: u64 = parse(&lookup, "CONSUMER_REDELIVERY_BACKOFF_MS", 500)?;
        let consumer = ConsumerConfig {
            redelivery_backoff: Duration::from_millis(backoff_ms),
        };

        let page_size: usize = parse(&lookup, "REPORT_PAGE_SIZE", ReportConfig::default().page_size)?;
        if page_size == 0 {
            return Err(ConfigError::Invalid("REPORT_PAGE_SIZE", "must be at least 1".into()));
        }
        let stats_window = match lookup("REPORT_STATS_WINDOW_DAYS") {
            None => None,
            Some(raw) => {
                let days: u32 = raw.trim().parse().map_err(|e| {
                    ConfigError::Invalid("REPORT_STATS_WINDOW_DAYS", format!("{raw:?}: {e}"))
                })?;
                if days == 0 {
                    return Err(ConfigError::Invalid(
                        "REPORT_STATS_WINDOW_DAYS",
                        "must be at least 1".into(),
                    ));
                }
                Some(chrono::Duration::days(i64::from(days)))
            }
        };

        Ok(Self {
            scheduler,
            consumer,
            report: ReportConfig {
                page_size,
                stats_window,
            },
        })
    }
}

fn parse<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::Invalid(key, format!("{raw:?}: {e}"))),
    }
}

fn secs<F>(lookup: &F, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse(lookup, key, default.as_secs()).map(Duration::from_secs)
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.scheduler.max_concurrent_jobs, 10);
        assert_eq!(config.scheduler.job_timeout, Duration::from_secs(300));
        assert_eq!(config.scheduler.retry_delay, Duration::from_secs(60));
        assert_eq!(config.scheduler.max_retries, 3);
        assert_eq!(config.report.stats_window, None);
    }

    #[test]
    fn overrides_are_applied() {
        let config = load(&[
            ("MAX_CONCURRENT_JOBS", "2"),
            ("JOB_TIMEOUT", "5"),
            ("RETRY_DELAY", "1"),
            ("MAX_RETRIES", "0"),
            ("RETRY_JITTER_RATIO", "0"),
            ("REPORT_PAGE_SIZE", "50"),
            ("REPORT_STATS_WINDOW_DAYS", "30"),
            ("CONSUMER_REDELIVERY_BACKOFF_MS", "10"),
        ])
        .unwrap();

        assert_eq!(config.scheduler.max_concurrent_jobs, 2);
        assert_eq!(config.scheduler.job_timeout, Duration::from_secs(5));
        assert_eq!(config.scheduler.max_retries, 0);
        assert_eq!(config.scheduler.retry_jitter_ratio, 0.0);
        assert_eq!(config.report.page_size, 50);
        assert_eq!(config.report.stats_window, Some(chrono::Duration::days(30)));
        assert_eq!(config.consumer.redelivery_backoff, Duration::from_millis(10));
    }

    #[rstest]
    #[case("MAX_CONCURRENT_JOBS", "0")]
    #[case("MAX_CONCURRENT_JOBS", "many")]
    #[case("JOB_TIMEOUT", "-1")]
    #[case("RETRY_MAX_DELAY", "30")]
    #[case("RETRY_JITTER_RATIO", "1.0")]
    #[case("RETRY_JITTER_RATIO", "-0.1")]
    #[case("REPORT_PAGE_SIZE", "0")]
    #[case("REPORT_STATS_WINDOW_DAYS", "0")]
    fn rejects_invalid_values(#[case] key: &'static str, #[case] value: &str) {
        let err = load(&[(key, value)]).unwrap_err();
        let ConfigError::Invalid(reported, _) = err;
        assert_eq!(reported, key);
    }
}
