//! Per-type response demultiplexer.
//!
//! The IO task publishes every framed packet into the FIFO for its type.
//! Consumers wait on the FIFO for the type they expect, so an event packet
//! never satisfies a property read and vice versa. Each FIFO is guarded by
//! an async mutex: concurrent waiters on the same type are served in the
//! order they locked it.
//!
//! When the IO task stops, the publisher records why, and every waiter
//! (current and future) gets [`Error::NotConnected`] after a host-side close
//! or [`Error::ConnectionLost`] after a transport failure.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tokio::sync::{Mutex, MutexGuard};

use ieapspect_core::error::{Error, Result};

use crate::framing::Packet;

const KINDS: usize = 256;

/// Why a session's IO task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The host closed the session (or dropped it).
    Closed,
    /// The transport failed.
    Lost,
}

const RUNNING: u8 = 0;
const CLOSED: u8 = 1;
const LOST: u8 = 2;

fn closed_error(termination: &AtomicU8) -> Error {
    match termination.load(Ordering::Acquire) {
        LOST => Error::ConnectionLost,
        _ => Error::NotConnected,
    }
}

/// Create a connected publisher / queue-set pair.
pub fn demux() -> (Publisher, DemuxQueues) {
    let termination = Arc::new(AtomicU8::new(RUNNING));
    let (senders, receivers): (Vec<_>, Vec<_>) = (0..KINDS)
        .map(|_| {
            let (tx, rx) = mpsc::unbounded_channel();
            (tx, Mutex::new(rx))
        })
        .unzip();
    (
        Publisher {
            senders,
            termination: Arc::clone(&termination),
        },
        DemuxQueues {
            receivers,
            termination,
        },
    )
}

/// Write side, owned by the IO task.
pub struct Publisher {
    senders: Vec<UnboundedSender<Packet>>,
    termination: Arc<AtomicU8>,
}

impl Publisher {
    /// Append `packet` to the FIFO for its type.
    pub fn publish(&self, packet: Packet) {
        let kind = packet.kind();
        if self.senders[kind as usize].send(packet).is_err() {
            tracing::trace!(kind, "no queue for packet, dropping");
        }
    }

    /// Record why the session ended and close every queue.
    pub fn terminate(self, reason: Termination) {
        let code = match reason {
            Termination::Closed => CLOSED,
            Termination::Lost => LOST,
        };
        self.termination.store(code, Ordering::Release);
    }
}

/// Read side, shared by every consumer of a session.
pub struct DemuxQueues {
    receivers: Vec<Mutex<UnboundedReceiver<Packet>>>,
    termination: Arc<AtomicU8>,
}

impl DemuxQueues {
    /// Wait for the next packet of type `kind`.
    pub async fn recv(&self, kind: u8) -> Result<Packet> {
        self.lock(kind).await.recv().await
    }

    /// Take exclusive use of the FIFO for `kind`.
    ///
    /// Holding the guard across several receives keeps other consumers of
    /// the same type out, and lets one caller wait on two types at once.
    pub async fn lock(&self, kind: u8) -> QueueGuard<'_> {
        QueueGuard {
            rx: self.receivers[kind as usize].lock().await,
            termination: &self.termination,
        }
    }

    /// Discard everything queued for `kind`. Returns the number of packets
    /// dropped; a queue that someone is waiting on is left alone.
    pub fn drain(&self, kind: u8) -> usize {
        match self.receivers[kind as usize].try_lock() {
            Ok(mut rx) => {
                let mut dropped = 0;
                while rx.try_recv().is_ok() {
                    dropped += 1;
                }
                dropped
            }
            Err(_) => 0,
        }
    }

    /// Why the session ended, if it has.
    pub fn termination(&self) -> Option<Termination> {
        match self.termination.load(Ordering::Acquire) {
            CLOSED => Some(Termination::Closed),
            LOST => Some(Termination::Lost),
            _ => None,
        }
    }

    /// The error a caller should see now that the session has ended.
    pub fn closed_error(&self) -> Error {
        closed_error(&self.termination)
    }
}

/// Exclusive access to one type's FIFO.
pub struct QueueGuard<'a> {
    rx: MutexGuard<'a, UnboundedReceiver<Packet>>,
    termination: &'a AtomicU8,
}

impl QueueGuard<'_> {
    /// Wait for the next packet. Packets queued before the session ended
    /// are still delivered.
    pub async fn recv(&mut self) -> Result<Packet> {
        match self.rx.recv().await {
            Some(packet) => Ok(packet),
            None => Err(closed_error(self.termination)),
        }
    }

    /// Take a packet if one is already queued.
    pub fn try_recv(&mut self) -> Option<Packet> {
        match self.rx.try_recv() {
            Ok(packet) => Some(packet),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn packets_route_by_kind() {
        let (publisher, queues) = demux();
        publisher.publish(Packet::new(0x87, vec![0x87, 0xC8, 0x00]));
        publisher.publish(Packet::new(0x83, vec![0x83, 0x02, 0xE8, 0x03]));

        let resp = queues.recv(0x83).await.unwrap();
        assert_eq!(resp.body(), &[0x02, 0xE8, 0x03]);
        let event = queues.recv(0x87).await.unwrap();
        assert_eq!(event.body(), &[0xC8, 0x00]);
    }

    #[tokio::test]
    async fn fifo_order_within_kind() {
        let (publisher, queues) = demux();
        for v in 1..=3u8 {
            publisher.publish(Packet::new(0x87, vec![0x87, v, 0]));
        }
        let mut guard = queues.lock(0x87).await;
        for v in 1..=3u8 {
            assert_eq!(guard.recv().await.unwrap().body()[0], v);
        }
        assert!(guard.try_recv().is_none());
    }

    #[tokio::test]
    async fn waiter_is_woken_by_publish() {
        let (publisher, queues) = demux();
        let queues = Arc::new(queues);
        let q = Arc::clone(&queues);
        let waiter = tokio::spawn(async move { q.recv(0x82).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        publisher.publish(Packet::new(0x82, vec![0x82]));
        assert_eq!(waiter.await.unwrap().unwrap().kind(), 0x82);
    }

    #[tokio::test]
    async fn lost_session_fails_waiters() {
        let (publisher, queues) = demux();
        publisher.publish(Packet::new(0x87, vec![0x87, 1, 0]));
        publisher.terminate(Termination::Lost);

        assert!(queues.recv(0x87).await.is_ok());
        assert!(matches!(queues.recv(0x87).await, Err(Error::ConnectionLost)));
        assert!(matches!(queues.recv(0x83).await, Err(Error::ConnectionLost)));
        assert_eq!(queues.termination(), Some(Termination::Lost));
    }

    #[tokio::test]
    async fn closed_session_is_not_connected() {
        let (publisher, queues) = demux();
        publisher.terminate(Termination::Closed);
        assert!(matches!(queues.recv(0x87).await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn dropped_publisher_counts_as_closed() {
        let (publisher, queues) = demux();
        drop(publisher);
        assert!(matches!(queues.recv(0x01).await, Err(Error::NotConnected)));
        assert_eq!(queues.termination(), None);
    }

    #[test]
    fn drain_discards_queued_packets() {
        let (publisher, queues) = demux();
        publisher.publish(Packet::new(0xff, vec![0xff, 0x02]));
        publisher.publish(Packet::new(0xff, vec![0xff, 0x03]));
        assert_eq!(queues.drain(0xff), 2);
        assert_eq!(queues.drain(0xff), 0);
    }
}
