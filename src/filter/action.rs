//! Filter outcomes
//!
//! A pipeline handler never touches a socket. It returns a [`FilterOutcome`]
//! describing what the driver should write: the peer-directed part of the
//! decision (forward, replace, or suppress the frame) plus any frames to
//! send back to the message's own sender. The driver applies peer writes
//! first, then spoofed writes, so replies are observed only after the
//! triggering frame's handling has fully completed.

use crate::protocol::Frame;

/// What happens to the frame on its way to the peer connection.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerAction {
    /// Forward the frame unchanged.
    Transmit,
    /// Forward these frames in place of the original.
    Translate(Vec<Frame>),
    /// Forward nothing.
    Drop,
}

/// Full outcome of handling one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    pub peer: PeerAction,
    /// Frames written back to the sender, in order, after peer writes.
    pub spoof: Vec<Frame>,
    /// The sender's connection must be torn down once writes are flushed.
    pub disconnect: bool,
}

impl FilterOutcome {
    pub fn transmit() -> Self {
        Self {
            peer: PeerAction::Transmit,
            spoof: Vec::new(),
            disconnect: false,
        }
    }

    pub fn drop_frame() -> Self {
        Self {
            peer: PeerAction::Drop,
            spoof: Vec::new(),
            disconnect: false,
        }
    }

    pub fn translate(frames: Vec<Frame>) -> Self {
        Self {
            peer: PeerAction::Translate(frames),
            spoof: Vec::new(),
            disconnect: false,
        }
    }

    pub fn with_spoof(mut self, frames: Vec<Frame>) -> Self {
        self.spoof = frames;
        self
    }

    pub fn and_disconnect(mut self) -> Self {
        self.disconnect = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let outcome = FilterOutcome::transmit();
        assert_eq!(outcome.peer, PeerAction::Transmit);
        assert!(outcome.spoof.is_empty());
        assert!(!outcome.disconnect);

        let outcome = FilterOutcome::drop_frame()
            .with_spoof(vec![Frame::ssl_deny()])
            .and_disconnect();
        assert_eq!(outcome.peer, PeerAction::Drop);
        assert_eq!(outcome.spoof.len(), 1);
        assert!(outcome.disconnect);
    }
}
