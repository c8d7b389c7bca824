// Server loop module
// Accepts connections until shutdown is requested, then drains in-flight ones

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::connection::accept_connection;
use crate::config::AppState;
use crate::logger;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run the accept loop on the current `LocalSet`
///
/// Returns once `shutdown` is notified and either every connection has
/// finished or the drain period (`performance.write_timeout`) has elapsed.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    active_connections: Arc<AtomicUsize>,
    shutdown: Arc<Notify>,
) {
    let shutdown_signal = shutdown.notified();
    tokio::pin!(shutdown_signal);

    loop {
        tokio::select! {
            accept_result = listener.accept() => match accept_result {
                Ok((stream, peer_addr)) => {
                    accept_connection(stream, peer_addr, &state, &active_connections);
                }
                Err(e) => logger::log_error(&format!("Failed to accept connection: {e}")),
            },
            () = &mut shutdown_signal => break,
        }
    }

    // Stop accepting before draining
    drop(listener);
    logger::log_shutdown(active_connections.load(Ordering::SeqCst));

    let deadline = Instant::now() + Duration::from_secs(state.config.performance.write_timeout);
    while active_connections.load(Ordering::SeqCst) > 0 && Instant::now() < deadline {
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }

    let remaining = active_connections.load(Ordering::SeqCst);
    if remaining > 0 {
        logger::log_warning(&format!(
            "Drain period elapsed with {remaining} connection(s) still open"
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::create_reusable_listener;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn get(addr: std::net::SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    fn bind() -> (std::net::SocketAddr, TcpListener) {
        let listener = create_reusable_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        (listener.local_addr().unwrap(), listener)
    }

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        let (addr, listener) = bind();
        let shutdown = Arc::new(Notify::new());
        let state = Arc::new(crate::config::test_state());
        let active = Arc::new(AtomicUsize::new(0));

        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let server = tokio::task::spawn_local(serve(
                    listener,
                    Arc::clone(&state),
                    Arc::clone(&active),
                    Arc::clone(&shutdown),
                ));

                let response = get(addr, "/healthz").await;
                assert!(response.starts_with("HTTP/1.1 200"), "{response}");
                assert!(response.ends_with("ok"));

                shutdown.notify_one();
                server.await.unwrap();
            })
            .await;

        assert_eq!(active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejects_beyond_max_connections() {
        let (addr, listener) = bind();
        let shutdown = Arc::new(Notify::new());
        let mut state = crate::config::test_state();
        state.config.performance.max_connections = Some(0);
        let state = Arc::new(state);
        let active = Arc::new(AtomicUsize::new(0));

        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let server = tokio::task::spawn_local(serve(
                    listener,
                    Arc::clone(&state),
                    Arc::clone(&active),
                    Arc::clone(&shutdown),
                ));

                let mut stream = TcpStream::connect(addr).await.unwrap();
                let _ = stream
                    .write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\n\r\n")
                    .await;
                let mut buf = Vec::new();
                let _ = stream.read_to_end(&mut buf).await;
                assert!(buf.is_empty());

                shutdown.notify_one();
                server.await.unwrap();
            })
            .await;
    }
}
