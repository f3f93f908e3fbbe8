//! Connection options.

use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Connection options for the facade.
///
/// The connection string is opaque to pglink and handed to the native driver
/// verbatim; only the toggles below belong to the facade itself.
#[derive(Debug, Clone)]
pub struct Opts {
    /// Native connection string, passed through verbatim.
    ///
    /// Default: `""`
    pub config: String,

    /// Force a fresh physical connection.
    ///
    /// Default: `false`
    pub force_new: bool,

    /// Establish the connection non-blocking and complete it via the
    /// connect poll loop.
    ///
    /// Default: `false`
    pub connect_async: bool,

    /// Wall-clock budget for the connect poll loop.
    ///
    /// Default: `15s`
    pub connect_timeout: Duration,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            config: String::new(),
            force_new: false,
            connect_async: false,
            connect_timeout: Duration::from_secs(15),
        }
    }
}

impl Opts {
    /// Create options with a connection string and default toggles.
    pub fn new(config: impl Into<String>) -> Self {
        Self {
            config: config.into(),
            ..Self::default()
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, Error> {
    match value {
        "true" | "True" | "1" | "yes" | "on" => Ok(true),
        "false" | "False" | "0" | "no" | "off" => Ok(false),
        _ => Err(Error::Configuration(format!("Invalid {}: {}", key, value))),
    }
}

impl TryFrom<&Url> for Opts {
    type Error = Error;

    /// Parse a PostgreSQL connection URL.
    ///
    /// Format: `postgres://[user[:password]@]host[:port][/database][?param1=value1&..]`
    ///
    /// The facade's own query parameters are extracted and stripped; the
    /// rest of the URL is forwarded to the native driver untouched:
    /// - `force_new`: true/True/1/yes/on or false/False/0/no/off
    /// - `connect_async`: same values
    /// - `connect_timeout_secs`: poll loop budget in seconds (positive integer)
    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        if !["postgres", "pg"].contains(&url.scheme()) {
            return Err(Error::Configuration(format!(
                "Invalid scheme: expected 'postgres://' or 'pg://', got '{}://'",
                url.scheme()
            )));
        }

        let mut opts = Opts::default();
        let mut native = url.clone();

        let mut passthrough: Vec<(String, String)> = Vec::new();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "force_new" => {
                    opts.force_new = parse_bool("force_new", value.as_ref())?;
                }
                "connect_async" => {
                    opts.connect_async = parse_bool("connect_async", value.as_ref())?;
                }
                "connect_timeout_secs" => {
                    let secs: u64 = value.parse().map_err(|_| {
                        Error::Configuration(format!("Invalid connect_timeout_secs: {}", value))
                    })?;
                    opts.connect_timeout = Duration::from_secs(secs);
                }
                _ => {
                    passthrough.push((key.to_string(), value.to_string()));
                }
            }
        }

        if passthrough.is_empty() {
            native.set_query(None);
        } else {
            native
                .query_pairs_mut()
                .clear()
                .extend_pairs(passthrough.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }

        opts.config = native.to_string();
        Ok(opts)
    }
}

impl TryFrom<&str> for Opts {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let url =
            Url::parse(s).map_err(|e| Error::Configuration(format!("Invalid URL: {}", e)))?;
        Self::try_from(&url)
    }
}
