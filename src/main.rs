mod cache;
mod config;
mod frontend;
mod http;
mod metrics;
mod proto;
mod state;
mod upstream;

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::{FutureExt, select_biased};
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};

use crate::cache::Cache;
use crate::config::Config;
use crate::frontend::OnError;
use crate::frontend::tcp::TcpServer;
use crate::frontend::udp::UdpServer;
use crate::state::State;
use crate::upstream::{Resolver, ResolverError, Upstream};

/// A caching DNS forwarder.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[derive(Debug, Error)]
enum Error {
    #[error("failed to load config: {0}")]
    Config(#[from] config::Error),
    #[error("failed to create upstream: {0}")]
    Upstream(#[from] ResolverError),
    #[error("failed to bind {0}: {1}")]
    Bind(SocketAddr, io::Error),
    #[error("{0} server failed: {1}")]
    Server(&'static str, io::Error),
    #[error("server task failed: {0}")]
    Task(#[from] JoinError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_owned());
    pretty_env_logger::formatted_builder()
        .parse_filters(&filter)
        .init();

    let args = Args::parse();

    let res = match Config::from_file(&args.config) {
        Ok(config) => run(config).await,
        Err(err) => Err(err.into()),
    };

    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), Error> {
    let cache = Cache::new(
        config.cache.capacity,
        Duration::from_secs(config.cache.default_ttl.into()),
    );
    let resolver = Resolver::new(&config.upstream, config.resolver.timeout())?;
    tracing::info!("forwarding queries to {}", resolver.addr());

    let state = Arc::new(State::new(
        cache,
        resolver,
        config.resolver.recursion_available,
    ));
    let on_error = OnError::new(config.resolver.servfail_on_error);

    tokio::task::spawn({
        let state = state.clone();
        async move {
            state.cache.cleanup().await;
        }
    });

    let mut tasks = JoinSet::new();

    if config.frontend.udp.enable {
        let bind = config.frontend.udp.bind;
        let server = UdpServer::new(bind, on_error)
            .await
            .map_err(|err| Error::Bind(bind, err))?;
        tracing::info!("listening on udp://{}", bind);

        let state = state.clone();
        tasks.spawn(async move {
            server.poll(state).await;
            Ok(())
        });
    }

    if config.frontend.tcp.enable {
        let bind = config.frontend.tcp.bind;
        let server = TcpServer::new(bind, on_error)
            .await
            .map_err(|err| Error::Bind(bind, err))?;
        tracing::info!("listening on tcp://{}", bind);

        let state = state.clone();
        tasks.spawn(async move {
            server
                .poll(state)
                .await
                .map_err(|err| Error::Server("tcp", err))
        });
    }

    if config.http.enabled {
        let state = state.clone();
        let http = config.http.clone();
        tasks.spawn(async move {
            http::run(http, state)
                .await
                .map_err(|err| Error::Server("http", err))
        });
    }

    select_biased! {
        res = tokio::signal::ctrl_c().fuse() => {
            res.map_err(|err| Error::Server("signal", err))?;
            tracing::info!("shutting down");
            Ok(())
        }
        res = tasks.join_next().fuse() => match res {
            Some(res) => res?,
            None => Ok(()),
        },
    }
}
