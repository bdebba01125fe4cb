use std::env;
use std::time::Duration;

use crate::session::resync;

pub const DEFAULT_VIEWPORT: (f64, f64) = (800.0, 600.0);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no server configured; pass --server, set PLACE_SERVER or store one in the identity file")]
    MissingServer,
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Library-level defaults drawn from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Raw server address; normalized when the session is built.
    pub server: Option<String>,
    pub resync_period: Duration,
    /// Viewport width and height in screen pixels.
    pub viewport: (f64, f64),
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: None,
            resync_period: resync::DEFAULT_PERIOD,
            viewport: DEFAULT_VIEWPORT,
        }
    }
}

impl ClientConfig {
    /// Reads `PLACE_SERVER`, `PLACE_RESYNC_SECS` and `PLACE_VIEWPORT`
    /// (`WIDTHxHEIGHT`). Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = ClientConfig::default();

        if let Ok(server) = env::var("PLACE_SERVER") {
            if !server.trim().is_empty() {
                config.server = Some(server);
            }
        }

        if let Ok(raw) = env::var("PLACE_RESYNC_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
                var: "PLACE_RESYNC_SECS",
                value: raw.clone(),
                reason: "expected whole seconds",
            })?;
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    var: "PLACE_RESYNC_SECS",
                    value: raw,
                    reason: "period must be positive",
                });
            }
            config.resync_period = Duration::from_secs(secs);
        }

        if let Ok(raw) = env::var("PLACE_VIEWPORT") {
            config.viewport = parse_viewport(&raw).ok_or(ConfigError::Invalid {
                var: "PLACE_VIEWPORT",
                value: raw,
                reason: "expected WIDTHxHEIGHT with positive sizes",
            })?;
        }

        Ok(config)
    }

    /// First server found among `explicit` and the configured default.
    pub fn resolve_server(&self, explicit: Option<&str>) -> Result<String, ConfigError> {
        explicit
            .map(str::to_string)
            .or_else(|| self.server.clone())
            .filter(|server| !server.trim().is_empty())
            .ok_or(ConfigError::MissingServer)
    }
}

fn parse_viewport(raw: &str) -> Option<(f64, f64)> {
    let (width, height) = raw.trim().split_once(['x', 'X'])?;
    let width: f64 = width.trim().parse().ok()?;
    let height: f64 = height.trim().parse().ok()?;
    (width.is_finite() && height.is_finite() && width >= 1.0 && height >= 1.0)
        .then_some((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{LazyLock, Mutex};

    // Environment variables are process-wide.
    static ENV_MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

    const VARS: [&str; 3] = ["PLACE_SERVER", "PLACE_RESYNC_SECS", "PLACE_VIEWPORT"];

    fn with_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let saved: Vec<(&str, Option<String>)> =
            VARS.iter().map(|var| (*var, env::var(var).ok())).collect();
        unsafe {
            for var in VARS {
                env::remove_var(var);
            }
            for (key, value) in vars {
                env::set_var(key, value);
            }
        }
        let out = f();
        unsafe {
            for (var, value) in saved {
                match value {
                    Some(value) => env::set_var(var, value),
                    None => env::remove_var(var),
                }
            }
        }
        out
    }

    #[test]
    fn defaults_without_env() {
        let config = with_env(&[], ClientConfig::from_env).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.resync_period, Duration::from_secs(300));
    }

    #[test]
    fn reads_all_variables() {
        let config = with_env(
            &[
                ("PLACE_SERVER", "wss://place.example.com/ws"),
                ("PLACE_RESYNC_SECS", "30"),
                ("PLACE_VIEWPORT", "1280x720"),
            ],
            ClientConfig::from_env,
        )
        .unwrap();
        assert_eq!(config.server.as_deref(), Some("wss://place.example.com/ws"));
        assert_eq!(config.resync_period, Duration::from_secs(30));
        assert_eq!(config.viewport, (1280.0, 720.0));
    }

    #[test]
    fn rejects_bad_values() {
        let err = with_env(&[("PLACE_RESYNC_SECS", "0")], ClientConfig::from_env).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "PLACE_RESYNC_SECS", .. }));
        let err = with_env(&[("PLACE_VIEWPORT", "wide")], ClientConfig::from_env).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "PLACE_VIEWPORT", .. }));
    }

    #[test]
    fn server_resolution_order() {
        let mut config = ClientConfig::default();
        assert_eq!(config.resolve_server(None), Err(ConfigError::MissingServer));
        config.server = Some("stored.example.com".into());
        assert_eq!(config.resolve_server(None).unwrap(), "stored.example.com");
        assert_eq!(
            config.resolve_server(Some("cli.example.com")).unwrap(),
            "cli.example.com"
        );
    }
}
