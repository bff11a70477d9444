use super::{dispatch, Job};
use crate::config::SocketConfig;
use crate::errors::Result;
use std::os::unix::io::{FromRawFd, IntoRawFd};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Socket receive buffer size (requests are small single-line JSON)
const SOCKET_RECV_BUF: usize = 8192;

/// Longest accept backoff after repeated errors
const MAX_BACKOFF_MS: u64 = 5000;

/// Accept port-protocol connections on a Unix socket and forward every
/// request line to the dispatcher.
///
/// Runs until `cancel` fires, then waits for every connection task to exit
/// so no clone of `jobs` outlives the call.
pub async fn listen(
    jobs: mpsc::Sender<Job>,
    socket_path: &Path,
    config: &SocketConfig,
    cancel: CancellationToken,
) -> Result<()> {
    // Remove existing socket file
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }

    // Create socket with socket2 for buffer tuning
    let socket = socket2::Socket::new(socket2::Domain::UNIX, socket2::Type::STREAM, None)?;

    // OS may clamp to minimum, which is fine
    if let Err(e) = socket.set_recv_buffer_size(SOCKET_RECV_BUF) {
        tracing::debug!("Could not set recv buffer size: {}", e);
    }

    socket.bind(&socket2::SockAddr::unix(socket_path)?)?;
    socket.listen(128)?;
    socket.set_nonblocking(true)?;

    // Convert to tokio UnixListener
    let std_listener: std::os::unix::net::UnixListener =
        unsafe { std::os::unix::net::UnixListener::from_raw_fd(socket.into_raw_fd()) };
    let listener = UnixListener::from_std(std_listener)?;

    tracing::info!("Listening on {:?}", socket_path);

    let semaphore = Arc::new(Semaphore::new(config.max_connections));
    let idle = Duration::from_secs(config.idle_timeout_secs);
    let connections = TaskTracker::new();
    let mut backoff_ms: u64 = 0;

    loop {
        let accepted = tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!("Listener cancelled");
                break;
            }
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, _)) => {
                backoff_ms = 0;

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!(
                            "Connection limit reached ({} max), dropping connection",
                            config.max_connections
                        );
                        continue;
                    }
                };

                let jobs = jobs.clone();
                let cancel = cancel.clone();
                connections.spawn(async move {
                    // Permit is held until this task completes
                    let _permit = permit;
                    if let Err(e) = handle_connection(stream, jobs, idle, cancel).await {
                        tracing::warn!("Connection error: {}", e);
                    }
                });
            }
            Err(e) => {
                tracing::error!("Accept error: {}", e);

                // Exponential backoff to prevent CPU spin on persistent errors
                backoff_ms = if backoff_ms == 0 {
                    100
                } else {
                    (backoff_ms * 2).min(MAX_BACKOFF_MS)
                };

                tracing::debug!("Backing off for {}ms", backoff_ms);
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(Duration::from_millis(backoff_ms)) => {}
                }
            }
        }
    }

    drop(jobs);
    connections.close();
    tracing::debug!(open = connections.len(), "Waiting for connections to close");
    connections.wait().await;
    Ok(())
}

/// Answer request lines on one connection until it closes, goes idle or
/// the listener is cancelled
async fn handle_connection(
    stream: UnixStream,
    jobs: mpsc::Sender<Job>,
    idle: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!("Shutting down, closing connection");
                return Ok(());
            }
            next = timeout(idle, lines.next_line()) => next,
        };

        let line = match next {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => return Ok(()), // Peer closed
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                tracing::debug!("Idle timeout, closing connection");
                return Ok(());
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let response = dispatch(&jobs, line).await?;
        let mut data = serde_json::to_vec(&response)?;
        data.push(b'\n');
        write.write_all(&data).await?;
    }
}
