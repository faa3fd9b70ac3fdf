use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use futures_util::future;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
#[cfg(unix)]
use socket2::{Domain, Protocol, Socket, Type};
use streamrelay::config::{config_path_from_env, load_config, AppConfig, ServerConfig};
use streamrelay::observability::init_tracing;
use streamrelay::routing::dispatch::{dispatch_request, normalize_base_path};
use streamrelay::routing::spawn_sweeper;
use streamrelay::state::AppState;
use tokio::net::TcpListener;

const LISTEN_BACKLOG: i32 = 1024;

fn main() {
    let config_path = config_path_from_env();
    let config = load_config(&config_path).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration from '{config_path}': {e}");
        eprintln!("See 'config.example.yaml' for the supported settings.");
        std::process::exit(1);
    });
    init_tracing(&config.features.log_level);

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(threads) = config.server.runtime_worker_threads {
        builder.worker_threads(threads);
    }
    let runtime = builder.enable_all().build().unwrap_or_else(|e| {
        eprintln!("Failed to initialize Tokio runtime: {e}");
        std::process::exit(1);
    });
    runtime.block_on(run(config));
}

async fn run(config: AppConfig) {
    let base_path = Arc::<str>::from(normalize_base_path(&config.server.base_path));
    let server = config.server.clone();
    tracing::info!(
        host = %server.host,
        port = server.port,
        base_path = %base_path,
        rate_limit_enabled = config.rate_limit.enabled,
        rate_limit_window_ms = config.rate_limit.window_ms,
        rate_limit_max = config.rate_limit.max_requests,
        "streamrelay starting"
    );

    let state = Arc::new(AppState::from_config(config));
    if let Some(limiter) = state.rate_limiter() {
        spawn_sweeper(limiter);
    }

    let listeners = bind_listeners(&server).await.unwrap_or_else(|err| {
        eprintln!("Failed to bind to {}:{}: {err}", server.host, server.port);
        std::process::exit(1);
    });
    tracing::info!(listeners = listeners.len(), "streamrelay is ready to accept connections");

    let conn_builder = AutoBuilder::new(TokioExecutor::new());
    let accept_loops = listeners.into_iter().map(|listener| {
        tokio::spawn(accept_loop(
            listener,
            conn_builder.clone(),
            Arc::clone(&state),
            Arc::clone(&base_path),
        ))
    });
    future::join_all(accept_loops).await;
}

async fn accept_loop(
    listener: TcpListener,
    conn_builder: AutoBuilder<TokioExecutor>,
    state: Arc<AppState>,
    base_path: Arc<str>,
) {
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                tracing::warn!("accept error: {err}");
                continue;
            }
        };
        if let Err(err) = stream.set_nodelay(true) {
            tracing::debug!("failed to enable TCP_NODELAY for {remote_addr}: {err}");
        }

        let conn_builder = conn_builder.clone();
        let state = Arc::clone(&state);
        let base_path = Arc::clone(&base_path);
        let service = service_fn(move |request: Request<Incoming>| {
            dispatch_request(
                Arc::clone(&state),
                Arc::clone(&base_path),
                Some(remote_addr),
                request.map(Body::new),
            )
        });
        tokio::spawn(async move {
            if let Err(err) = conn_builder.serve_connection(TokioIo::new(stream), service).await {
                tracing::debug!("failed to serve connection from {remote_addr}: {err:#}");
            }
        });
    }
}

/// One plain listener, or `tcp_reuse_port_listener_count` SO_REUSEPORT
/// listeners on Unix.
async fn bind_listeners(server: &ServerConfig) -> io::Result<Vec<TcpListener>> {
    let (host, port) = (server.host.as_str(), server.port);
    let count = server.tcp_reuse_port_listener_count.unwrap_or(1).max(1);
    if count > 1 && cfg!(not(unix)) {
        tracing::warn!("SO_REUSEPORT is unavailable on this platform, using a single listener");
    }
    if count == 1 || cfg!(not(unix)) {
        return Ok(vec![TcpListener::bind((host, port)).await?]);
    }
    (0..count).map(|_| bind_reuse_port(host, port)).collect()
}

#[cfg(unix)]
fn bind_reuse_port(host: &str, port: u16) -> io::Result<TcpListener> {
    let mut last_err = None;
    for addr in (host, port).to_socket_addrs()? {
        match reuse_port_socket(addr) {
            Ok(listener) => return Ok(listener),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no bindable socket address for {host}:{port}"),
        )
    }))
}

#[cfg(unix)]
fn reuse_port_socket(addr: SocketAddr) -> io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_reuse_port(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    socket.set_nonblocking(true)?;
    TcpListener::from_std(socket.into())
}

#[cfg(not(unix))]
fn bind_reuse_port(_host: &str, _port: u16) -> io::Result<TcpListener> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "SO_REUSEPORT is only supported on Unix-like platforms",
    ))
}
