//! Listener lifecycle
//!
//! Binds the port, serves the router with graceful shutdown wired to the
//! coordinator's drain signal, and returns the coordinator's verdict.

use axum::Router;
use futures::Stream;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use super::coordinator::{ShutdownCoordinator, Termination};

/// Bind the HTTP listener on all interfaces
pub async fn bind(port: u16) -> std::io::Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    // Log after successful bind - server is actually listening
    info!(port = %port, "HTTP listener bound");
    Ok(listener)
}

/// Serve until the coordinator reaches TERMINATED
///
/// The listener stops accepting when the coordinator starts draining and
/// finishes once every open connection has closed. Peer addresses are
/// recorded for the access log.
pub async fn run_server<S>(
    listener: TcpListener,
    router: Router,
    coordinator: &mut ShutdownCoordinator,
    signals: S,
) -> Termination
where
    S: Stream<Item = &'static str> + Unpin,
{
    let mut drain = coordinator.drain_signal();

    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { drain.wait().await });

    coordinator.run(signals, server).await
}
