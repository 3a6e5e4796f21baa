//! Shared per-pair session state
//!
//! One [`SessionState`] lives per connection pair. The server-facing
//! pipeline populates it while the upstream handshake proceeds; the
//! client-facing pipeline reads it to verify password responses against the
//! real challenge salt and to replay a finished handshake to the client.

use crate::protocol::constants::AUTH_MD5_PASSWORD;
use crate::protocol::{Frame, FrameKind, TransactionStatus};

/// Upstream session cache plus transaction status.
#[derive(Debug, Default)]
pub struct SessionState {
    auth_messages: Vec<Frame>,
    transaction_status: Option<TransactionStatus>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The upstream handshake is complete once its terminal ready-for-query
    /// frame has been cached.
    pub fn authentication_complete(&self) -> bool {
        matches!(
            self.auth_messages.last().map(Frame::kind),
            Some(FrameKind::ReadyForQuery { .. })
        )
    }

    /// Record a handshake-phase frame. After completion only parameter
    /// updates are tracked: a later parameter-status frame replaces the
    /// cached one with the same name, keeping replays current.
    pub fn save_auth_message(&mut self, frame: &Frame) {
        if !self.authentication_complete() {
            self.auth_messages.push(frame.clone());
            return;
        }
        if let FrameKind::ParameterStatus { name, .. } = frame.kind() {
            let slot = self.auth_messages.iter_mut().find(|m| {
                matches!(m.kind(), FrameKind::ParameterStatus { name: n, .. } if n == name)
            });
            if let Some(existing) = slot {
                *existing = frame.clone();
            }
        }
    }

    /// Salt of the most recent MD5 challenge seen from the upstream.
    pub fn md5_salt(&self) -> Option<[u8; 4]> {
        self.auth_messages.iter().rev().find_map(|m| match m.kind() {
            FrameKind::Authentication {
                salt: Some(salt), ..
            } => Some(*salt),
            _ => None,
        })
    }

    /// Every cached handshake frame except MD5 challenges, in arrival
    /// order: what a freshly authenticated client gets replayed.
    pub fn replay_after_challenge(&self) -> Vec<Frame> {
        self.auth_messages
            .iter()
            .filter(|m| {
                !matches!(
                    m.kind(),
                    FrameKind::Authentication {
                        status: AUTH_MD5_PASSWORD,
                        ..
                    }
                )
            })
            .cloned()
            .collect()
    }

    pub fn transaction_status(&self) -> Option<TransactionStatus> {
        self.transaction_status
    }

    pub fn set_transaction_status(&mut self, status: TransactionStatus) {
        self.transaction_status = Some(status);
    }

    #[cfg(test)]
    pub fn cached_len(&self) -> usize {
        self.auth_messages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::{MSG_AUTH_REQUEST, MSG_PARAMETER_STATUS};
    use crate::protocol::frame::decode_backend;

    fn backend_frame(tag: u8, body: &[u8]) -> Frame {
        let mut bytes = vec![tag];
        bytes.extend_from_slice(&(4 + body.len() as u32).to_be_bytes());
        bytes.extend_from_slice(body);
        let kind = decode_backend(tag, body).unwrap();
        Frame::new(bytes, Some(tag), kind)
    }

    fn md5_challenge() -> Frame {
        let mut body = 5u32.to_be_bytes().to_vec();
        body.extend_from_slice(&[1, 2, 3, 4]);
        backend_frame(MSG_AUTH_REQUEST, &body)
    }

    fn auth_ok() -> Frame {
        backend_frame(MSG_AUTH_REQUEST, &0u32.to_be_bytes())
    }

    fn param(name: &str, value: &str) -> Frame {
        let mut body = Vec::new();
        body.extend_from_slice(name.as_bytes());
        body.push(0);
        body.extend_from_slice(value.as_bytes());
        body.push(0);
        backend_frame(MSG_PARAMETER_STATUS, &body)
    }

    fn handshake() -> SessionState {
        let mut state = SessionState::new();
        state.save_auth_message(&md5_challenge());
        state.save_auth_message(&auth_ok());
        state.save_auth_message(&param("server_version", "15.2"));
        state.save_auth_message(&Frame::ready_for_query(TransactionStatus::Idle));
        state
    }

    #[test]
    fn test_completion_tracks_ready_for_query() {
        let mut state = SessionState::new();
        assert!(!state.authentication_complete());
        state.save_auth_message(&md5_challenge());
        assert!(!state.authentication_complete());
        state.save_auth_message(&Frame::ready_for_query(TransactionStatus::Idle));
        assert!(state.authentication_complete());
    }

    #[test]
    fn test_md5_salt_comes_from_latest_challenge() {
        let mut state = SessionState::new();
        assert_eq!(state.md5_salt(), None);
        state.save_auth_message(&md5_challenge());
        assert_eq!(state.md5_salt(), Some([1, 2, 3, 4]));
    }

    #[test]
    fn test_replay_excludes_the_challenge() {
        let state = handshake();
        let replay = state.replay_after_challenge();
        assert_eq!(replay.len(), 3);
        assert!(matches!(
            replay[0].kind(),
            FrameKind::Authentication { status: 0, .. }
        ));
        assert!(matches!(
            replay.last().map(Frame::kind),
            Some(FrameKind::ReadyForQuery { .. })
        ));
    }

    #[test]
    fn test_no_growth_after_completion() {
        let mut state = handshake();
        let before = state.cached_len();
        state.save_auth_message(&Frame::ready_for_query(TransactionStatus::Idle));
        state.save_auth_message(&auth_ok());
        assert_eq!(state.cached_len(), before);
    }

    #[test]
    fn test_parameter_update_overwrites_in_place() {
        let mut state = handshake();
        let before = state.cached_len();
        state.save_auth_message(&param("server_version", "15.3"));
        assert_eq!(state.cached_len(), before);
        let replay = state.replay_after_challenge();
        let updated = replay.iter().any(|m| {
            matches!(m.kind(), FrameKind::ParameterStatus { value, .. } if value == "15.3")
        });
        assert!(updated);
    }
}
