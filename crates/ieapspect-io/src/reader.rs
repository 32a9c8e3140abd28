//! Exact-length reads over an untyped byte stream.

use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};

use ieapspect_core::error::Result;

use crate::demux::DemuxQueues;

/// Reassembles raw chunks from one demultiplexer queue into reads of an
/// exact length.
///
/// Bytes pulled off the queue but not yet returned stay buffered in the
/// reader, so a read abandoned part-way (timeout, cancellation) loses
/// nothing.
pub struct ByteReader {
    queues: Arc<DemuxQueues>,
    kind: u8,
    pending: BytesMut,
}

impl ByteReader {
    pub fn new(queues: Arc<DemuxQueues>, kind: u8) -> Self {
        Self {
            queues,
            kind,
            pending: BytesMut::new(),
        }
    }

    /// Wait until at least `n` bytes are buffered and return the first `n`
    /// without consuming them.
    pub async fn fill(&mut self, n: usize) -> Result<&[u8]> {
        if self.pending.len() < n {
            let mut queue = self.queues.lock(self.kind).await;
            while self.pending.len() < n {
                let chunk = queue.recv().await?;
                self.pending.extend_from_slice(chunk.bytes());
            }
        }
        Ok(&self.pending[..n])
    }

    /// Wait until `n` bytes are available and return exactly those.
    pub async fn read_exact(&mut self, n: usize) -> Result<Bytes> {
        self.fill(n).await?;
        Ok(self.pending.split_to(n).freeze())
    }

    /// Read `count` big-endian 16-bit words.
    pub async fn read_words_be(&mut self, count: usize) -> Result<Vec<u16>> {
        let mut bytes = self.read_exact(count * 2).await?;
        let mut words = Vec::with_capacity(count);
        while bytes.remaining() >= 2 {
            words.push(bytes.get_u16());
        }
        Ok(words)
    }

    /// Drop everything buffered or queued so far. Returns the number of
    /// buffered bytes discarded.
    pub fn discard_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        self.queues.drain(self.kind);
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demux::{Termination, demux};
    use crate::framing::{Packet, RAW_KIND};
    use ieapspect_core::error::Error;

    #[tokio::test]
    async fn read_spans_chunks() {
        let (publisher, queues) = demux();
        let mut reader = ByteReader::new(Arc::new(queues), RAW_KIND);
        publisher.publish(Packet::new(RAW_KIND, vec![1, 2, 3]));
        publisher.publish(Packet::new(RAW_KIND, vec![4, 5]));

        assert_eq!(&reader.read_exact(4).await.unwrap()[..], &[1, 2, 3, 4]);
        assert_eq!(&reader.read_exact(1).await.unwrap()[..], &[5]);
    }

    #[tokio::test]
    async fn fill_does_not_consume() {
        let (publisher, queues) = demux();
        let mut reader = ByteReader::new(Arc::new(queues), RAW_KIND);
        publisher.publish(Packet::new(RAW_KIND, vec![0x00, 0x02]));
        publisher.publish(Packet::new(RAW_KIND, vec![0xAA, 0xBB, 0xCC, 0xDD]));

        assert_eq!(reader.fill(2).await.unwrap(), &[0x00, 0x02]);
        assert_eq!(&reader.read_exact(6).await.unwrap()[..], &[0, 2, 0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[tokio::test]
    async fn words_are_big_endian() {
        let (publisher, queues) = demux();
        let mut reader = ByteReader::new(Arc::new(queues), RAW_KIND);
        publisher.publish(Packet::new(RAW_KIND, vec![0x00, 0x03, 0x12, 0x34]));

        assert_eq!(reader.read_words_be(2).await.unwrap(), vec![0x0003, 0x1234]);
    }

    #[tokio::test]
    async fn short_stream_reports_termination() {
        let (publisher, queues) = demux();
        let mut reader = ByteReader::new(Arc::new(queues), RAW_KIND);
        publisher.publish(Packet::new(RAW_KIND, vec![0xAB]));
        publisher.terminate(Termination::Lost);

        assert!(matches!(reader.read_exact(2).await, Err(Error::ConnectionLost)));
        // The byte that did arrive is still buffered.
        assert_eq!(reader.discard_pending(), 1);
    }
}
