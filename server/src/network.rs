//! Server network layer: TCP accept loop, per-connection receive task and the
//! fixed-rate tick scheduler.

use crate::session::{Session, SessionHandle, SessionSummary, TickOutcome};
use log::{debug, error, info, warn};
use shared::{DISCONNECT_GRACE_SECS, TICK_INTERVAL_MS};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::{interval, timeout, MissedTickBehavior};

/// How long a single accept poll waits before the loop comes around again.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Inbound lines longer than this, newline included, are discarded.
pub const MAX_LINE_LEN: usize = 1024;

/// Timing knobs for every session the server runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub tick_interval: Duration,
    pub disconnect_grace: Duration,
    /// Fixed RNG seed for reproducible games. Random per game when `None`.
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(TICK_INTERVAL_MS),
            disconnect_grace: Duration::from_secs(DISCONNECT_GRACE_SECS),
            seed: None,
        }
    }
}

/// Listens for one client at a time and runs its session to completion.
pub struct Server {
    listener: TcpListener,
    config: SessionConfig,
}

impl Server {
    pub async fn new(addr: &str, config: SessionConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);
        Ok(Server { listener, config })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Accepting is polled with a timeout so the loop never parks
    /// indefinitely on an idle listener.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        info!(
            "Server started: tick {:?}, disconnect grace {:?}",
            self.config.tick_interval, self.config.disconnect_grace
        );

        loop {
            match timeout(ACCEPT_POLL_INTERVAL, self.listener.accept()).await {
                Err(_) => continue,
                Ok(Ok((stream, addr))) => {
                    info!("Client connected from {}", addr);
                    match serve_connection(stream, &self.config).await {
                        Some(summary) => info!(
                            "Session with {} ended: {:?}, score {}, {}s",
                            addr, summary.cause, summary.score, summary.elapsed_secs
                        ),
                        None => info!("Client {} left before a game started", addr),
                    }
                }
                Ok(Err(e)) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

/// Runs one TCP connection from accept to close.
pub async fn serve_connection(stream: TcpStream, config: &SessionConfig) -> Option<SessionSummary> {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not disable Nagle: {}", e);
    }
    let (reader, writer) = stream.into_split();
    serve_streams(reader, writer, config).await
}

/// Drives a session over any byte stream pair: spawns the receive task, waits
/// for `START`, runs the tick loop, then shuts the writer and joins the receiver
/// before the session is dropped.
pub async fn serve_streams<R, W>(
    reader: R,
    mut writer: W,
    config: &SessionConfig,
) -> Option<SessionSummary>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let handle = SessionHandle::new(Session::new(config.seed));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let receiver = tokio::spawn(receive_loop(reader, handle.clone(), shutdown_rx));

    let summary = if handle.wait_for_start().await {
        run_session_loop(&handle, &mut writer, config).await
    } else {
        None
    };

    if let Err(e) = writer.shutdown().await {
        debug!("Error shutting down writer: {}", e);
    }
    let _ = shutdown_tx.send(true);
    if let Err(e) = receiver.await {
        error!("Receive task panicked: {}", e);
    }

    summary
}

/// What one bounded read produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRead {
    /// A complete line (or the unterminated tail before EOF) is in the buffer.
    Line,
    /// The line exceeded [`MAX_LINE_LEN`]. It was consumed and dropped.
    TooLong,
    Eof,
}

/// Reads one line into `buf` without ever holding more than [`MAX_LINE_LEN`]
/// bytes. An over-long line is drained up to and including its newline.
pub async fn read_bounded_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let limit = MAX_LINE_LEN as u64;
    let read = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if read == 0 {
        return Ok(LineRead::Eof);
    }
    if buf.ends_with(b"\n") || buf.len() < MAX_LINE_LEN {
        return Ok(LineRead::Line);
    }

    loop {
        buf.clear();
        let read = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
        if read == 0 || buf.ends_with(b"\n") {
            break;
        }
    }
    buf.clear();
    Ok(LineRead::TooLong)
}

/// Reads newline-terminated commands and applies each under the session lock.
/// EOF and read errors both mark the peer disconnected.
pub async fn receive_loop<R>(reader: R, handle: SessionHandle, mut shutdown: watch::Receiver<bool>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(MAX_LINE_LEN);

    loop {
        tokio::select! {
            read = read_bounded_line(&mut reader, &mut buf) => match read {
                Ok(LineRead::Eof) => {
                    debug!("Peer closed its side of the connection");
                    break;
                }
                Ok(LineRead::TooLong) => {
                    warn!("Discarded a line longer than {} bytes", MAX_LINE_LEN);
                }
                Ok(LineRead::Line) => {
                    let line = String::from_utf8_lossy(&buf);
                    handle
                        .with(|session| session.handle_line(&line, Instant::now()))
                        .await;
                    handle.notify();
                    buf.clear();
                }
                Err(e) => {
                    warn!("Error reading from peer: {}", e);
                    break;
                }
            },
            _ = shutdown.changed() => {
                debug!("Receive loop stopped by session teardown");
                return;
            }
        }
    }

    handle
        .with(|session| session.mark_disconnected(Instant::now()))
        .await;
    handle.notify();
}

/// Tick scheduler. Returns the summary once the game ends.
pub async fn run_session_loop<W>(
    handle: &SessionHandle,
    writer: &mut W,
    config: &SessionConfig,
) -> Option<SessionSummary>
where
    W: AsyncWrite + Unpin,
{
    let mut ticker = interval(config.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Skip the first tick since it fires immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let outcome = handle
            .with(|session| session.tick(Instant::now(), config.disconnect_grace))
            .await;

        match outcome {
            TickOutcome::Idle => return None,
            TickOutcome::Frame { frame, deliver } => {
                if deliver {
                    if let Err(e) = send_frame(writer, &frame).await {
                        warn!("Failed to send frame: {}", e);
                        handle
                            .with(|session| session.mark_disconnected(Instant::now()))
                            .await;
                    }
                }
            }
            TickOutcome::Finished {
                frame,
                deliver,
                summary,
            } => {
                if deliver {
                    if let Err(e) = send_frame(writer, &frame).await {
                        warn!("Failed to send final frame: {}", e);
                    }
                }
                return Some(summary);
            }
        }
    }
}

async fn send_frame<W>(writer: &mut W, frame: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await
}
