//! The per-session IO task.
//!
//! One tokio task owns the transport exclusively. It performs every write
//! on behalf of callers (one request = one `send()`, so commands never
//! interleave on the wire) and, between writes, reads whatever the device
//! sends, frames it with the device family's [`PacketDecoder`] and publishes
//! the packets into the demultiplexer.
//!
//! A transport failure ends the task; the demultiplexer then fails every
//! pending and future wait with [`Error::ConnectionLost`].

use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use ieapspect_core::error::{Error, Result};
use ieapspect_core::transport::Transport;

use crate::demux::{DemuxQueues, Publisher, Termination, demux};
use crate::framing::{DecodeResult, PacketDecoder};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Configuration for the IO task.
#[derive(Debug, Clone)]
pub struct IoConfig {
    /// Upper bound on a single transport read before the loop checks for
    /// write requests again.
    pub poll_interval: Duration,
    /// Size of a single transport read.
    pub read_chunk: usize,
    /// Receive buffer size at which unframeable data is thrown away.
    pub max_buffer: usize,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            read_chunk: 1024,
            max_buffer: 64 * 1024,
        }
    }
}

/// A request sent to the IO task.
enum Request {
    /// Write bytes to the device.
    Send {
        bytes: Vec<u8>,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Close the transport and stop.
    Close { reply: oneshot::Sender<Result<()>> },
}

/// Handle to a running IO task. Stored inside a device façade.
pub struct SessionIo {
    cmd_tx: mpsc::Sender<Request>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    queues: Arc<DemuxQueues>,
}

impl SessionIo {
    /// Write `bytes` to the device as one unit.
    pub async fn send(&self, bytes: impl Into<Vec<u8>>) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Request::Send {
                bytes: bytes.into(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| self.queues.closed_error())?;

        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(self.queues.closed_error()),
        }
    }

    /// The demultiplexer fed by this task.
    pub fn queues(&self) -> &Arc<DemuxQueues> {
        &self.queues
    }

    /// Whether the task is still running (the transport is alive).
    pub fn is_running(&self) -> bool {
        !self.task.is_finished() && self.queues.termination().is_none()
    }

    /// Close the transport and stop the task.
    ///
    /// Closing an already stopped session is not an error.
    pub async fn close(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(Request::Close { reply: reply_tx })
            .await
            .is_err()
        {
            return Ok(());
        }
        reply_rx.await.unwrap_or(Ok(()))
    }
}

impl Drop for SessionIo {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn the IO task for `transport`, framing inbound bytes with `decoder`.
pub fn spawn_io_task<D>(transport: Box<dyn Transport>, decoder: D, config: IoConfig) -> SessionIo
where
    D: PacketDecoder,
{
    let (cmd_tx, cmd_rx) = mpsc::channel::<Request>(32);
    let (publisher, queues) = demux();
    let cancel = CancellationToken::new();

    let task = tokio::spawn(io_loop(
        transport,
        decoder,
        config,
        publisher,
        cmd_rx,
        cancel.clone(),
    ));

    SessionIo {
        cmd_tx,
        cancel,
        task,
        queues: Arc::new(queues),
    }
}

// ---------------------------------------------------------------------------
// IO Loop
// ---------------------------------------------------------------------------

/// Whether a transport error means the link is gone for good.
fn is_link_failure(e: &Error) -> bool {
    matches!(
        e,
        Error::ConnectionLost | Error::NotConnected | Error::Io(_) | Error::Transport(_)
    )
}

/// The main IO loop. Runs as a spawned Tokio task.
///
/// Uses `tokio::select! { biased; }` to prioritize:
/// 1. Cancellation
/// 2. Write / close requests
/// 3. Reading and framing device output
async fn io_loop<D: PacketDecoder>(
    mut transport: Box<dyn Transport>,
    mut decoder: D,
    config: IoConfig,
    publisher: Publisher,
    mut cmd_rx: mpsc::Receiver<Request>,
    cancel: CancellationToken,
) {
    let mut chunk = vec![0u8; config.read_chunk.max(1)];
    let mut rx_buf = BytesMut::with_capacity(config.read_chunk * 4);

    let termination = loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("IO task cancelled");
                break Termination::Closed;
            }

            req = cmd_rx.recv() => {
                match req {
                    Some(Request::Send { bytes, reply }) => {
                        trace!(bytes = bytes.len(), "writing command");
                        let result = transport.send(&bytes).await;
                        let failed = matches!(&result, Err(e) if is_link_failure(e));
                        let _ = reply.send(result);
                        if failed {
                            error!("transport write failed, ending session");
                            break Termination::Lost;
                        }
                    }
                    Some(Request::Close { reply }) => {
                        debug!("IO task close requested");
                        let _ = reply.send(transport.close().await);
                        break Termination::Closed;
                    }
                    None => {
                        debug!("request channel closed, exiting IO task");
                        break Termination::Closed;
                    }
                }
            }

            res = transport.receive(&mut chunk, config.poll_interval) => {
                match res {
                    Ok(n) => {
                        rx_buf.extend_from_slice(&chunk[..n]);
                        drain_packets(&mut decoder, &mut rx_buf, &publisher);
                        if rx_buf.len() > config.max_buffer {
                            warn!(len = rx_buf.len(), "receive buffer overflow, resetting");
                            rx_buf.clear();
                        }
                    }
                    Err(Error::Timeout) => {}
                    Err(e) if is_link_failure(&e) => {
                        error!(error = %e, "transport read failed, ending session");
                        break Termination::Lost;
                    }
                    Err(e) => {
                        warn!(error = %e, "transport read error");
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        }
    };

    publisher.terminate(termination);
}

/// Frame and publish every complete packet at the front of `buf`.
fn drain_packets<D: PacketDecoder>(decoder: &mut D, buf: &mut BytesMut, publisher: &Publisher) {
    while !buf.is_empty() {
        match decoder.decode(buf) {
            DecodeResult::Packet(packet, consumed) => {
                buf.advance(consumed.clamp(1, buf.len()));
                publisher.publish(packet);
            }
            DecodeResult::Discard(0) | DecodeResult::Incomplete => return,
            DecodeResult::Discard(n) => {
                trace!(bytes = n, "discarding unframed bytes");
                buf.advance(n.min(buf.len()));
            }
        }
    }
}
