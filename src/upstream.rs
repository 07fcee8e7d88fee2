pub mod https;
pub mod udp;

use std::future::Future;
use std::io;
use std::time::Duration;

use futures::{FutureExt, select_biased};
use thiserror::Error;

use crate::config;
use crate::proto::{DecodeError, Packet, Question};

use self::https::HttpsResolver;
use self::udp::UdpResolver;

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("timed out")]
    Timeout,
    #[error("malformed response: {0}")]
    Decode(#[from] DecodeError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected http status {0}")]
    Status(reqwest::StatusCode),
    /// The message was too long and was truncated.
    #[error("response was truncated")]
    Truncated,
}

/// The server that cache misses are forwarded to.
pub trait Upstream: Send + Sync {
    /// Sends a single query for `question` and waits for the response.
    ///
    /// No retries are performed.
    fn forward(
        &self,
        question: &Question,
    ) -> impl Future<Output = Result<Packet, ResolverError>> + Send;

    fn addr(&self) -> String;
}

#[derive(Debug)]
pub enum Resolver {
    Udp(UdpResolver),
    Https(HttpsResolver),
}

impl Resolver {
    pub fn new(upstream: &config::Upstream, timeout: Duration) -> Result<Self, ResolverError> {
        match upstream {
            config::Upstream::Udp { addr } => Ok(Self::Udp(UdpResolver::new(*addr, timeout))),
            config::Upstream::Https { url } => {
                HttpsResolver::new(url.clone(), timeout).map(Self::Https)
            }
        }
    }

    fn timeout(&self) -> Duration {
        match self {
            Self::Udp(resolver) => resolver.timeout,
            Self::Https(resolver) => resolver.timeout,
        }
    }
}

impl Upstream for Resolver {
    async fn forward(&self, question: &Question) -> Result<Packet, ResolverError> {
        let timeout = tokio::time::sleep(self.timeout()).fuse();
        futures::pin_mut!(timeout);

        match self {
            Self::Udp(resolver) => select_biased! {
                res = resolver.resolve(question).fuse() => res,
                _ = timeout => Err(ResolverError::Timeout),
            },
            Self::Https(resolver) => select_biased! {
                res = resolver.resolve(question).fuse() => res,
                _ = timeout => Err(ResolverError::Timeout),
            },
        }
    }

    fn addr(&self) -> String {
        match self {
            Self::Udp(resolver) => resolver.addr.to_string(),
            Self::Https(resolver) => resolver.url.to_string(),
        }
    }
}
