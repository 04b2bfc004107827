//! Endpoint configuration for the completion dispatcher.

use crate::Error;
use std::env;
use std::time::Duration;

/// Transport timeout budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Budget for establishing the TCP connection.
    pub connect: Duration,
    /// Budget for sending the request and receiving the response head.
    pub write: Duration,
    /// Budget between two successive reads of the response body.
    pub read: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            write: Duration::from_secs(50),
            read: Duration::from_secs(50),
        }
    }
}

/// Where and how to reach the completion service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub url: String,
    /// Selects the server-push transport. Independent of the wire-level `streaming` field.
    pub streaming_preferred: bool,
    pub timeouts: Timeouts,
}

impl EndpointConfig {
    /// Create a configuration with the default timeouts.
    pub fn new(url: impl Into<String>, streaming_preferred: bool) -> Self {
        Self {
            url: url.into(),
            streaming_preferred,
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Reject configurations that can never produce a request.
    pub fn validate(&self) -> Result<(), Error> {
        if self.url.trim().is_empty() {
            return Err(Error::invalid_argument("endpoint url must not be blank"));
        }
        Ok(())
    }

    /// Create configuration from environment variables.
    ///
    /// `COMPLETION_API_URL` is required. `COMPLETION_STREAMING` defaults to streaming when unset.
    /// Timeouts are read from `COMPLETION_CONNECT_TIMEOUT_SECS`, `COMPLETION_WRITE_TIMEOUT_SECS`
    /// and `COMPLETION_READ_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("COMPLETION_API_URL").ok_or_else(|| {
            Error::config("COMPLETION_API_URL environment variable is required")
        })?;

        let streaming_preferred = match lookup("COMPLETION_STREAMING") {
            Some(value) => parse_bool("COMPLETION_STREAMING", &value)?,
            None => true,
        };

        let defaults = Timeouts::default();
        let timeouts = Timeouts {
            connect: parse_secs(&lookup, "COMPLETION_CONNECT_TIMEOUT_SECS", defaults.connect)?,
            write: parse_secs(&lookup, "COMPLETION_WRITE_TIMEOUT_SECS", defaults.write)?,
            read: parse_secs(&lookup, "COMPLETION_READ_TIMEOUT_SECS", defaults.read)?,
        };

        let config = Self {
            url,
            streaming_preferred,
            timeouts,
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, Error> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::config(format!("{key} must be a boolean, got {other:?}"))),
    }
}

fn parse_secs<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, Error>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| Error::config(format!("{key} must be a whole number of seconds"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_timeouts() {
        let config = EndpointConfig::new("http://localhost:7861/chat/", false);
        assert_eq!(config.timeouts.connect, Duration::from_secs(10));
        assert_eq!(config.timeouts.write, Duration::from_secs(50));
        assert_eq!(config.timeouts.read, Duration::from_secs(50));
        assert!(!config.streaming_preferred);
    }

    #[test]
    fn test_blank_url_rejected() {
        let config = EndpointConfig::new("   ", true);
        assert!(matches!(config.validate(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_from_lookup_defaults_to_streaming() {
        let config =
            EndpointConfig::from_lookup(lookup_from(&[("COMPLETION_API_URL", "http://ai/chat")]))
                .unwrap();
        assert_eq!(config.url, "http://ai/chat");
        assert!(config.streaming_preferred);
        assert_eq!(config.timeouts, Timeouts::default());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = EndpointConfig::from_lookup(lookup_from(&[
            ("COMPLETION_API_URL", "http://ai/chat"),
            ("COMPLETION_STREAMING", "false"),
            ("COMPLETION_READ_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert!(!config.streaming_preferred);
        assert_eq!(config.timeouts.read, Duration::from_secs(5));
        assert_eq!(config.timeouts.connect, Duration::from_secs(10));
    }

    #[test]
    fn test_from_lookup_errors() {
        let missing = EndpointConfig::from_lookup(lookup_from(&[]));
        assert!(matches!(missing, Err(Error::Config(_))));

        let bad_flag = EndpointConfig::from_lookup(lookup_from(&[
            ("COMPLETION_API_URL", "http://ai/chat"),
            ("COMPLETION_STREAMING", "maybe"),
        ]));
        assert!(matches!(bad_flag, Err(Error::Config(_))));

        let bad_timeout = EndpointConfig::from_lookup(lookup_from(&[
            ("COMPLETION_API_URL", "http://ai/chat"),
            ("COMPLETION_CONNECT_TIMEOUT_SECS", "-1"),
        ]));
        assert!(matches!(bad_timeout, Err(Error::Config(_))));
    }
}
