//! Controller configuration.
//!
//! All settings come from environment variables and are read once at startup.

use crate::error::ControllerError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Image run by every managed Deployment unless `NGINX_IMAGE` is set
pub const DEFAULT_IMAGE: &str = "nginx:mainline-alpine-perl";

/// Container and Service port unless `NGINX_PORT` is set
pub const DEFAULT_PORT: i32 = 80;

/// Fixed parts of the managed resources that do not come from the Nginx spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadTemplate {
    pub image: String,
    pub port: i32,
    /// Fixed node port for the Service. `None` lets the API server allocate
    /// one, which keeps several Nginx objects from colliding.
    pub node_port: Option<i32>,
}

impl Default for WorkloadTemplate {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            port: DEFAULT_PORT,
            node_port: None,
        }
    }
}

/// Runtime configuration of the Nginx Controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub namespace: Option<String>,
    pub template: WorkloadTemplate,
    /// Fixed short delay used for transient faults
    pub retry_interval: Duration,
    /// Cap for the per-object error backoff
    pub backoff_max: Duration,
    pub debounce: Duration,
    pub concurrency: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            template: WorkloadTemplate::default(),
            retry_interval: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
            debounce: Duration::from_secs(1),
            concurrency: 4,
        }
    }
}

impl ControllerConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which returns the raw value of a
    /// variable if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty());
        let image = lookup("NGINX_IMAGE")
            .filter(|image| !image.is_empty())
            .unwrap_or(defaults.template.image);
        let port = parse_var(&lookup, "NGINX_PORT")?.unwrap_or(defaults.template.port);
        let node_port = parse_var::<i32, _>(&lookup, "NGINX_NODE_PORT")?;
        let retry_secs = parse_var::<u64, _>(&lookup, "RETRY_INTERVAL_SECS")?;
        let backoff_max_secs = parse_var::<u64, _>(&lookup, "BACKOFF_MAX_SECS")?;
        let debounce_secs = parse_var::<u64, _>(&lookup, "RECONCILE_DEBOUNCE_SECS")?;
        let concurrency = parse_var(&lookup, "RECONCILE_CONCURRENCY")?.unwrap_or(defaults.concurrency);

        if !(1..=65535).contains(&port) {
            return Err(ControllerError::InvalidConfig(format!(
                "NGINX_PORT must be between 1 and 65535, got {}",
                port
            )));
        }

        let retry_interval = retry_secs.map(Duration::from_secs).unwrap_or(defaults.retry_interval);
        let backoff_max = backoff_max_secs.map(Duration::from_secs).unwrap_or(defaults.backoff_max);
        if retry_interval.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "RETRY_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }
        if backoff_max < retry_interval {
            return Err(ControllerError::InvalidConfig(format!(
                "BACKOFF_MAX_SECS ({}s) must not be below RETRY_INTERVAL_SECS ({}s)",
                backoff_max.as_secs(),
                retry_interval.as_secs()
            )));
        }

        Ok(Self {
            namespace,
            template: WorkloadTemplate {
                image,
                port,
                node_port,
            },
            retry_interval,
            backoff_max,
            debounce: debounce_secs.map(Duration::from_secs).unwrap_or(defaults.debounce),
            concurrency,
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ControllerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            ControllerError::InvalidConfig(format!("{} has invalid value '{}': {}", key, raw, e))
        }),
    }
}
