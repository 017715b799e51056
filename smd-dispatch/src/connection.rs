//! The pooled bidirectional connection this crate dispatches requests over.
//!
//! The connection pool, framing, and transport itself are explicitly out of
//! scope: each shard is assumed reachable via a pooled bidirectional
//! connection exposing `send(msg)` / `receive() -> msg`, and these traits
//! are the seam a real transport plugs into. This crate provides only the
//! two implementations its own tests need.

use parking_lot::Mutex;

use crate::DispatchError;

/// One pooled, bidirectional connection to a shard.
///
/// All four suspension points (connection acquisition, send, receive,
/// local-path calls) are synchronous blocking calls — there is no
/// user-visible cancellation token at this layer.
pub trait Connection: Send {
    /// Send a fully-framed request.
    fn send(&mut self, request: &[u8]) -> Result<(), DispatchError>;
    /// Receive the reply to the most recent request.
    fn receive(&mut self) -> Result<Vec<u8>, DispatchError>;
}

/// A pool handing out connections to a given shard.
pub trait ConnectionPool: Send + Sync {
    /// Acquire a connection to `shard_idx`.
    fn acquire(&self, shard_idx: usize) -> Result<Box<dyn Connection>, DispatchError>;
}

/// A `Connection` that records every request sent to it and replays a
/// queue of programmed replies — used by dispatch-engine unit tests that
/// exercise the non-co-hosted path without a real socket.
#[derive(Debug, Default)]
pub struct MockConnection {
    sent: Mutex<Vec<Vec<u8>>>,
    replies: Mutex<Vec<Vec<u8>>>,
}

impl MockConnection {
    /// A connection with no programmed replies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply to be returned by the next `receive` call.
    pub fn push_reply(&self, reply: Vec<u8>) {
        self.replies.lock().push(reply);
    }

    /// Every request sent to this connection so far, in order.
    pub fn sent_requests(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }
}

impl Connection for &MockConnection {
    fn send(&mut self, request: &[u8]) -> Result<(), DispatchError> {
        self.sent.lock().push(request.to_vec());
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<u8>, DispatchError> {
        let mut replies = self.replies.lock();
        if replies.is_empty() {
            return Err(DispatchError::Transport("mock connection has no programmed reply".into()));
        }
        Ok(replies.remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_connection_records_sends_and_replays_replies() {
        let mock = MockConnection::new();
        mock.push_reply(vec![1, 2, 3]);
        let mut conn: &MockConnection = &mock;
        conn.send(b"hello").unwrap();
        assert_eq!(conn.receive().unwrap(), vec![1, 2, 3]);
        assert_eq!(mock.sent_requests(), vec![b"hello".to_vec()]);
    }

    #[test]
    fn receive_with_no_programmed_reply_is_a_transport_error() {
        let mock = MockConnection::new();
        let mut conn: &MockConnection = &mock;
        assert!(conn.receive().is_err());
    }
}
