use std::convert::Infallible;
use std::fmt::Write;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1::Builder;
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::tokio::TokioIo;
use tokio::net::TcpListener;

use crate::config;
use crate::state::State;
use crate::upstream::Upstream;

pub async fn run<U>(http: config::Http, state: Arc<State<U>>) -> Result<(), io::Error>
where
    U: Upstream + 'static,
{
    let listener = TcpListener::bind(http.bind).await?;
    tracing::info!("serving metrics on http://{}/metrics", http.bind);

    loop {
        let (stream, _) = listener.accept().await?;

        let conn = Builder::new().serve_connection(
            TokioIo::new(stream),
            RootService {
                state: state.clone(),
            },
        );
        tokio::task::spawn(async move {
            if let Err(err) = conn.await {
                tracing::debug!("failed to serve http connection: {}", err);
            }
        });
    }
}

struct RootService<U> {
    state: Arc<State<U>>,
}

impl<U> Service<Request<Incoming>> for RootService<U>
where
    U: Upstream + 'static,
{
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let state = self.state.clone();
        Box::pin(async move {
            let (status, body) = match req.uri().path() {
                "/metrics" => (StatusCode::OK, metrics(&state)),
                _ => (StatusCode::NOT_FOUND, String::new()),
            };

            let mut resp = Response::new(Full::new(Bytes::from(body)));
            *resp.status_mut() = status;
            Ok(resp)
        })
    }
}

fn metrics<U>(state: &State<U>) -> String
where
    U: Upstream,
{
    let mut body = String::new();
    for (key, val) in [
        (
            "dns_requests_total{protocol=\"udp\"}",
            state.metrics.requests_total_udp.get(),
        ),
        (
            "dns_requests_total{protocol=\"tcp\"}",
            state.metrics.requests_total_tcp.get(),
        ),
        ("dns_cache_hits", state.metrics.cache_hits.get()),
        ("dns_cache_misses", state.metrics.cache_misses.get()),
        (
            "dns_upstream_failures",
            state.metrics.upstream_failures.get(),
        ),
        ("dns_cache_entries", state.cache.len() as u64),
        ("dns_cache_cost_bytes", state.cache.cost() as u64),
        ("dns_cache_max_cost_bytes", state.cache.max_cost() as u64),
        ("dns_cache_evictions", state.cache.evictions()),
    ] {
        // Writing to a `String` never fails.
        let _ = writeln!(body, "{} {}", key, val);
    }

    let buckets = state.metrics.resolve_time.buckets.read();
    let mut buckets: Vec<_> = buckets
        .iter()
        .map(|(bucket, counter)| (*bucket, counter.get()))
        .collect();
    buckets.sort_unstable();

    for (bucket, count) in buckets {
        let nanos = 2_u128.pow(bucket);
        let _ = writeln!(body, "resolve_time{{ns=\"{}\"}} {}", nanos, count);
    }

    body
}
