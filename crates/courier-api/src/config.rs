//! Environment-driven configuration

use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use courier_queue::{
    AdmissionConfig, BackoffStrategy, FailureTolerance, RetryPolicy, WorkerConfig,
};

use crate::server::ServerConfig;

/// Headroom between the per-send timeout and the HTTP request timeout
pub const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Relay settings, present when `SMTP_HOST` is set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Everything the server needs, read once at startup
#[derive(Debug, Clone)]
pub struct CourierConfig {
    pub server: ServerConfig,
    pub admission: AdmissionConfig,
    pub worker: WorkerConfig,
    /// How long finished jobs stay pollable
    pub job_ttl: Duration,
    pub smtp: Option<SmtpSettings>,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            admission: AdmissionConfig::default(),
            worker: WorkerConfig::default(),
            job_ttl: Duration::from_secs(3600),
            smtp: None,
        }
    }
}

impl CourierConfig {
    /// Create from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let defaults = Self::default();

        let port: u16 = if env.raw("COURIER_PORT").is_some() {
            env.parse("COURIER_PORT", 8080)?
        } else {
            env.parse("PORT", 8080)?
        };

        let cors_origins = env
            .raw("COURIER_CORS_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let tolerance: FailureTolerance =
            env.parse("COURIER_FAILURE_TOLERANCE", defaults.admission.tolerance)?;
        let admission = AdmissionConfig {
            bulk_threshold: env.parse("COURIER_BULK_THRESHOLD", 1)?,
            max_recipients: env.at_least("COURIER_MAX_RECIPIENTS", 500, 1)?,
            tolerance,
        };

        let base_ms: u64 = env.parse("COURIER_RETRY_BASE_MS", 500)?;
        let max_ms: u64 = env.at_least("COURIER_RETRY_MAX_MS", 30_000, base_ms)?;
        let retry = RetryPolicy {
            max_attempts: env.at_least("COURIER_MAX_ATTEMPTS", 3, 1)?,
            backoff: BackoffStrategy::Exponential {
                initial_millis: base_ms,
                multiplier: 2.0,
                max_millis: max_ms,
            },
            send_timeout: Duration::from_secs(env.at_least("COURIER_SEND_TIMEOUT_SECS", 30, 1)?),
            ..RetryPolicy::default()
        };
        let worker = WorkerConfig {
            max_in_flight: env.at_least("COURIER_MAX_IN_FLIGHT", 5, 1)?,
            retry,
            copy_sender: env.flag("COURIER_COPY_SENDER", true)?,
        };

        // an inline send must hit its own timeout before the request does
        let send_secs = retry.send_timeout.as_secs();
        let timeout_secs: u64 = env.at_least(
            "COURIER_TIMEOUT_SECS",
            send_secs + REQUEST_TIMEOUT_MARGIN.as_secs(),
            send_secs + 1,
        )?;
        let server = ServerConfig {
            addr: SocketAddr::from(([0, 0, 0, 0], port)),
            timeout: Duration::from_secs(timeout_secs),
            max_body_size: env.parse("COURIER_MAX_BODY_BYTES", defaults.server.max_body_size)?,
            cors_origins,
            ..defaults.server
        };

        let smtp = match env.raw("SMTP_HOST") {
            Some(host) => Some(SmtpSettings {
                host,
                port: env.parse("SMTP_PORT", 587)?,
                username: env.raw("SMTP_USERNAME"),
                password: env.raw("SMTP_PASSWORD"),
            }),
            None => None,
        };

        Ok(Self {
            server,
            admission,
            worker,
            job_ttl: Duration::from_secs(env.parse("COURIER_JOB_TTL_SECS", 3600)?),
            smtp,
        })
    }

    /// HTTP request timeout actually applied, always longer than one send
    /// attempt so a stuck inline send is reported by the handler.
    pub fn request_timeout(&self) -> Duration {
        self.server
            .timeout
            .max(self.worker.retry.send_timeout + REQUEST_TIMEOUT_MARGIN)
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.raw(var) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            }),
        }
    }

    fn at_least<T>(&self, var: &'static str, default: T, min: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + Display + Copy,
        T::Err: Display,
    {
        let value = self.parse(var, default)?;
        if value < min {
            return Err(ConfigError::Invalid {
                var,
                value: value.to_string(),
                reason: format!("must be at least {}", min),
            });
        }
        Ok(value)
    }

    fn flag(&self, var: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.raw(var) {
            None => Ok(default),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid {
                    var,
                    value,
                    reason: "expected a boolean".to_string(),
                }),
            },
        }
    }
}
