//! Server-facing filter pipeline
//!
//! Watches the upstream's side of the conversation: handshake-phase frames
//! are cached for later replay to clients, MD5 challenges are answered
//! out-of-band with the service credential, and transaction status is
//! tracked from every ready-for-query. Everything is still forwarded to the
//! client unchanged.

use tracing::{debug, warn};

use crate::config::CredentialsConfig;
use crate::filter::action::FilterOutcome;
use crate::filter::session::SessionState;
use crate::filter::DropQueue;
use crate::protocol::constants::{AUTH_CLEARTEXT_PASSWORD, AUTH_MD5_PASSWORD, AUTH_OK};
use crate::protocol::{Frame, FrameKind};

/// Pipeline for frames travelling upstream -> client.
#[derive(Debug)]
pub struct BackendFilter {
    /// Service account answered to upstream challenges
    service: CredentialsConfig,
    drop_queue: DropQueue,
}

impl BackendFilter {
    pub fn new(service: CredentialsConfig) -> Self {
        Self {
            service,
            drop_queue: DropQueue::default(),
        }
    }

    /// Silently discard the next arriving frame of this tag.
    pub fn ignore_next(&mut self, tag: u8) {
        self.drop_queue.push(tag);
    }

    pub fn handle(&mut self, frame: &Frame, upstream: &mut SessionState) -> FilterOutcome {
        if let Some(tag) = frame.tag() {
            if self.drop_queue.matches(tag) {
                debug!(tag = %(tag as char), "discarding queued frame");
                return FilterOutcome::drop_frame();
            }
        }

        match frame.kind() {
            FrameKind::Authentication { status, salt } => {
                upstream.save_auth_message(frame);
                match (*status, salt) {
                    (AUTH_MD5_PASSWORD, Some(salt)) => {
                        debug!("answering MD5 challenge with service credential");
                        FilterOutcome::transmit().with_spoof(vec![Frame::md5_password(
                            &self.service.username,
                            &self.service.password,
                            salt,
                        )])
                    }
                    (AUTH_OK, _) => {
                        debug!("upstream accepted service credential");
                        FilterOutcome::transmit()
                    }
                    (AUTH_CLEARTEXT_PASSWORD, _) => {
                        // Only the salted scheme is relayed; a cleartext
                        // request would leak the service password.
                        warn!("upstream requested cleartext password, not answering");
                        FilterOutcome::transmit()
                    }
                    (status, _) => {
                        warn!(status, "unsupported upstream authentication request");
                        FilterOutcome::transmit()
                    }
                }
            }
            FrameKind::ParameterStatus { name, value } => {
                debug!(name = %name, value = %value, "upstream parameter");
                upstream.save_auth_message(frame);
                FilterOutcome::transmit()
            }
            FrameKind::BackendKeyData { process_id, .. } => {
                debug!(process_id, "upstream key data");
                upstream.save_auth_message(frame);
                FilterOutcome::transmit()
            }
            FrameKind::ReadyForQuery { status } => {
                upstream.set_transaction_status(*status);
                // While the handshake is open this is its terminal event.
                upstream.save_auth_message(frame);
                FilterOutcome::transmit()
            }
            _ => FilterOutcome::transmit(),
        }
    }
}
