use crate::error::{Error, Result};
use std::env;
use std::fmt;
use std::time::Duration;
use url::Url;

// Value of NP_AUTH_URL that turns permission checks off
const AUTH_DISABLED: &str = "-";

#[derive(Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub prometheus_url: Url,
    pub grafana_url: Url,
    /// `None` when permission checks are disabled.
    pub auth_url: Option<Url>,
    pub api_url: Url,
    pub apps_url: Option<Url>,
    pub token: String,
    pub cluster_name: String,
    pub access_token_cookie_names: Vec<String>,
    pub upstream_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let auth_url = required(&lookup, "NP_AUTH_URL")?;
        let auth_url = if auth_url == AUTH_DISABLED {
            None
        } else {
            Some(parse_url("NP_AUTH_URL", &auth_url)?)
        };

        let apps_url = match lookup("NP_APPS_URL").filter(|value| !value.is_empty()) {
            Some(value) => Some(parse_url("NP_APPS_URL", &value)?),
            None => None,
        };

        let access_token_cookie_names: Vec<String> =
            required(&lookup, "NP_AUTH_ACCESS_TOKEN_COOKIE_NAMES")?
                .split(',')
                .map(|name| name.trim().to_owned())
                .filter(|name| !name.is_empty())
                .collect();
        if access_token_cookie_names.is_empty() {
            return Err(Error::Config(
                "NP_AUTH_ACCESS_TOKEN_COOKIE_NAMES must name at least one cookie".to_owned(),
            ));
        }

        Ok(Self {
            server_host: from_env_default(&lookup, "SERVER_HOST", "0.0.0.0"),
            server_port: parse_number(&lookup, "SERVER_PORT", 8080)?,
            // The default values are the service names in kubernetes
            prometheus_url: parse_url(
                "PROMETHEUS_URL",
                &from_env_default(
                    &lookup,
                    "PROMETHEUS_URL",
                    "http://prometheus-prometheus.platform.svc.cluster.local:9090",
                ),
            )?,
            grafana_url: parse_url(
                "GRAFANA_URL",
                &from_env_default(
                    &lookup,
                    "GRAFANA_URL",
                    "http://grafana.platform.svc.cluster.local:3000",
                ),
            )?,
            auth_url,
            api_url: parse_url("NP_API_URL", &required(&lookup, "NP_API_URL")?)?,
            apps_url,
            token: required(&lookup, "NP_TOKEN")?,
            cluster_name: required(&lookup, "NP_CLUSTER_NAME")?,
            access_token_cookie_names,
            upstream_timeout: Duration::from_secs(parse_number(
                &lookup,
                "NP_UPSTREAM_TIMEOUT",
                300,
            )?),
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server_host", &self.server_host)
            .field("server_port", &self.server_port)
            .field("prometheus_url", &self.prometheus_url.as_str())
            .field("grafana_url", &self.grafana_url.as_str())
            .field("auth_url", &self.auth_url.as_ref().map(Url::as_str))
            .field("api_url", &self.api_url.as_str())
            .field("apps_url", &self.apps_url.as_ref().map(Url::as_str))
            .field("token", &"<redacted>")
            .field("cluster_name", &self.cluster_name)
            .field("access_token_cookie_names", &self.access_token_cookie_names)
            .field("upstream_timeout", &self.upstream_timeout)
            .finish()
    }
}

/// Reads a variable, falling back to `default` when it is unset.
fn from_env_default(lookup: impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_owned())
}

fn required(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| Error::Config(format!("{key} is not set")))
}

fn parse_url(key: &str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| Error::Config(format!("{key}: {e}")))
}

fn parse_number<T: std::str::FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T>
where
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(value) => value
            .parse()
            .map_err(|e| Error::Config(format!("{key}: {e}"))),
        None => Ok(default),
    }
}
