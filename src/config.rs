use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Read(io::Error),
    #[error(transparent)]
    Parse(toml::de::Error),
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub frontend: Frontend,
    pub upstream: Upstream,
    #[serde(default)]
    pub resolver: Resolver,
    #[serde(default)]
    pub cache: Cache,
    #[serde(default)]
    pub http: Http,
}

impl Config {
    pub fn from_file<P>(path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let buf = std::fs::read_to_string(path).map_err(Error::Read)?;
        Self::from_toml(&buf)
    }

    pub fn from_toml(buf: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(buf).map_err(Error::Parse)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if !self.frontend.udp.enable && !self.frontend.tcp.enable {
            return Err(Error::Invalid("frontend", "at least one frontend must be enabled"));
        }

        if self.cache.default_ttl == 0 {
            return Err(Error::Invalid("cache.default_ttl", "must be at least 1 second"));
        }

        if self.cache.capacity == 0 {
            return Err(Error::Invalid("cache.capacity", "must not be 0"));
        }

        if self.resolver.timeout_ms == 0 {
            return Err(Error::Invalid("resolver.timeout_ms", "must not be 0"));
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Frontend {
    pub udp: UdpFrontend,
    #[serde(default)]
    pub tcp: TcpFrontend,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UdpFrontend {
    #[serde(default = "default_enable")]
    pub enable: bool,
    pub bind: SocketAddr,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TcpFrontend {
    pub enable: bool,
    pub bind: SocketAddr,
}

impl Default for TcpFrontend {
    fn default() -> Self {
        Self {
            enable: false,
            bind: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 5353)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "lowercase")]
pub enum Upstream {
    Udp { addr: SocketAddr },
    Https { url: Url },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Resolver {
    /// How long to wait for the upstream server, in milliseconds.
    pub timeout_ms: u64,
    /// Value of the `RA` flag in responses.
    pub recursion_available: bool,
    /// Answer with SERVFAIL when the upstream fails, instead of not answering at all.
    pub servfail_on_error: bool,
}

impl Resolver {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self {
            timeout_ms: 4000,
            recursion_available: true,
            servfail_on_error: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Cache {
    /// Upper bound of the total size of all cached entries, in bytes.
    pub capacity: usize,
    /// TTL in seconds for responses without answer records.
    pub default_ttl: u32,
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            capacity: 16 * 1024 * 1024,
            default_ttl: 30,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Http {
    pub enabled: bool,
    pub bind: SocketAddr,
}

impl Default for Http {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 9100)),
        }
    }
}

fn default_enable() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::{Config, Error, Upstream};

    const MINIMAL: &str = r#"
        [frontend.udp]
        bind = "127.0.0.1:5353"

        [upstream]
        type = "udp"
        addr = "1.1.1.1:53"
    "#;

    #[test]
    fn config_minimal_uses_defaults() {
        let config = Config::from_toml(MINIMAL).unwrap();

        assert!(config.frontend.udp.enable);
        assert!(!config.frontend.tcp.enable);
        assert!(matches!(config.upstream, Upstream::Udp { addr } if addr.port() == 53));
        assert_eq!(config.resolver.timeout_ms, 4000);
        assert!(config.resolver.recursion_available);
        assert!(!config.resolver.servfail_on_error);
        assert_eq!(config.cache.default_ttl, 30);
        assert_eq!(config.cache.capacity, 16 * 1024 * 1024);
        assert!(!config.http.enabled);
    }

    #[test]
    fn config_full() {
        let config = Config::from_toml(
            r#"
            [frontend.udp]
            enable = true
            bind = "[::]:53"

            [frontend.tcp]
            enable = true
            bind = "[::]:53"

            [upstream]
            type = "https"
            url = "https://dns.example.test/dns-query"

            [resolver]
            timeout_ms = 1500
            servfail_on_error = true

            [cache]
            capacity = 1024
            default_ttl = 5

            [http]
            enabled = true
            bind = "127.0.0.1:9000"
            "#,
        )
        .unwrap();

        assert!(config.frontend.tcp.enable);
        assert!(matches!(
            &config.upstream,
            Upstream::Https { url } if url.host_str() == Some("dns.example.test")
        ));
        assert_eq!(config.resolver.timeout().as_millis(), 1500);
        assert!(config.resolver.recursion_available);
        assert!(config.resolver.servfail_on_error);
        assert_eq!(config.cache.capacity, 1024);
        assert_eq!(config.cache.default_ttl, 5);
        assert!(config.http.enabled);
    }

    #[test]
    fn config_rejects_zero_default_ttl() {
        let input = format!("{}\n[cache]\ndefault_ttl = 0\n", MINIMAL);

        assert!(matches!(
            Config::from_toml(&input),
            Err(Error::Invalid("cache.default_ttl", _))
        ));
    }

    #[test]
    fn config_rejects_no_frontend() {
        let input = MINIMAL.replace("[frontend.udp]", "[frontend.udp]\nenable = false");

        assert!(matches!(
            Config::from_toml(&input),
            Err(Error::Invalid("frontend", _))
        ));
    }

    #[test]
    fn config_rejects_unknown_upstream() {
        let input = MINIMAL.replace("\"udp\"", "\"quic\"");

        assert!(matches!(Config::from_toml(&input), Err(Error::Parse(_))));
    }
}
