//! Client-facing filter pipeline
//!
//! Implements the authentication relay on the client side of a pair: the
//! client authenticates against the proxy's own credential table while the
//! upstream session runs under the service account, and every simple query
//! passes the statement firewall before it may cross.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::filter::action::FilterOutcome;
use crate::filter::session::SessionState;
use crate::filter::DropQueue;
use crate::firewall::{evaluate, QueryPolicy, Verdict};
use crate::protocol::auth::verify_md5_password;
use crate::protocol::constants::{SQLSTATE_INVALID_AUTHORIZATION, SQLSTATE_PROTOCOL_VIOLATION};
use crate::protocol::{Frame, FrameKind, TransactionStatus};

/// Pipeline for frames travelling client -> upstream.
#[derive(Debug)]
pub struct FrontendFilter {
    /// Service account user name sent in the rewritten startup
    service_user: String,
    /// Proxy user table: user name -> expected plaintext password
    credentials: HashMap<String, String>,
    /// Tables the firewall lets this session read
    allowed_tables: Vec<String>,
    /// Claimed user name, set by the startup frame
    user: Option<String>,
    /// Firewall policy derived from the claimed user
    policy: Option<QueryPolicy>,
    /// Local (client-facing) authentication completed
    authenticated: bool,
    drop_queue: DropQueue,
}

impl FrontendFilter {
    pub fn new(
        service_user: String,
        credentials: HashMap<String, String>,
        allowed_tables: Vec<String>,
    ) -> Self {
        Self {
            service_user,
            credentials,
            allowed_tables,
            user: None,
            policy: None,
            authenticated: false,
            drop_queue: DropQueue::default(),
        }
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Silently discard the next arriving frame of this tag.
    pub fn ignore_next(&mut self, tag: u8) {
        self.drop_queue.push(tag);
    }

    /// Decide what happens to one client frame. Pure with respect to IO:
    /// the caller applies the outcome to the sockets.
    pub fn handle(&mut self, frame: &Frame, upstream: &mut SessionState) -> FilterOutcome {
        if let Some(tag) = frame.tag() {
            if self.drop_queue.matches(tag) {
                debug!(tag = %(tag as char), "discarding queued frame");
                return FilterOutcome::drop_frame();
            }
        }

        match frame.kind() {
            FrameKind::SslRequest => {
                debug!("declining SSL negotiation");
                FilterOutcome::drop_frame().with_spoof(vec![Frame::ssl_deny()])
            }
            FrameKind::Startup { .. } => self.on_startup(frame, upstream),
            FrameKind::Password { digest } => self.on_password(digest.clone(), upstream),
            FrameKind::Parse => self.on_parse(upstream),
            FrameKind::Query { sql } => self.on_query(sql.clone(), upstream),
            FrameKind::Terminate => {
                // The upstream session outlives a client's goodbye.
                debug!(user = self.user.as_deref(), "dropping client terminate");
                FilterOutcome::drop_frame()
            }
            _ => FilterOutcome::transmit(),
        }
    }

    fn on_startup(&mut self, frame: &Frame, upstream: &mut SessionState) -> FilterOutcome {
        let user = frame.startup_parameter("user").unwrap_or_default().to_string();
        let database = frame
            .startup_parameter("database")
            .unwrap_or(&user)
            .to_string();

        debug!(user = %user, database = %database, "client startup");
        self.policy = Some(QueryPolicy::for_user(&user, self.allowed_tables.clone()));
        self.user = Some(user);

        if upstream.authentication_complete() {
            // The upstream handshake already finished; answer the client
            // from the cache and generate no new upstream traffic.
            debug!("upstream handshake already complete, replaying cache");
            return FilterOutcome::drop_frame().with_spoof(upstream.replay_after_challenge());
        }

        FilterOutcome::translate(vec![Frame::startup(&self.service_user, &database)])
    }

    fn on_password(&mut self, digest: String, upstream: &mut SessionState) -> FilterOutcome {
        let user = match &self.user {
            Some(user) => user.clone(),
            None => {
                warn!("password response before startup");
                return self.reject(upstream, SQLSTATE_PROTOCOL_VIOLATION,
                    "password response before startup")
                    .and_disconnect();
            }
        };

        let verified = match (upstream.md5_salt(), self.credentials.get(&user)) {
            (Some(salt), Some(password)) => {
                verify_md5_password(&user, password, &salt, &digest)
            }
            (salt, password) => {
                debug!(
                    user = %user,
                    have_salt = salt.is_some(),
                    known_user = password.is_some(),
                    "cannot verify password response"
                );
                false
            }
        };

        if verified {
            self.authenticated = true;
            debug!(user = %user, "client authenticated");
            // Nothing goes upstream: the client inherits the service
            // account's session as cached so far.
            return FilterOutcome::drop_frame().with_spoof(upstream.replay_after_challenge());
        }

        warn!(user = %user, "password authentication failed");
        let mut spoof = vec![self.ready_marker(upstream)];
        spoof.push(Frame::auth_error(&user));
        FilterOutcome::drop_frame().with_spoof(spoof).and_disconnect()
    }

    fn on_parse(&mut self, upstream: &SessionState) -> FilterOutcome {
        // The firewall only reads literal query text; prepared statements
        // would bypass it.
        let user = self.user.clone().unwrap_or_default();
        warn!(user = %user, "rejecting prepared-statement parse");
        self.reject(
            upstream,
            SQLSTATE_INVALID_AUTHORIZATION,
            &format!("query authentication failed for user \"{}\"", user),
        )
    }

    fn on_query(&mut self, sql: String, upstream: &SessionState) -> FilterOutcome {
        let policy = match &self.policy {
            Some(policy) => policy,
            None => {
                warn!("query before startup");
                return self
                    .reject(upstream, SQLSTATE_PROTOCOL_VIOLATION, "query before startup")
                    .and_disconnect();
            }
        };

        match evaluate(&sql, policy) {
            Verdict::Allowed => {
                debug!(user = self.user.as_deref(), sql = %sql, "query allowed");
                FilterOutcome::transmit()
            }
            Verdict::Denied(reason) => {
                // Full detail stays in the log; the client sees the kind.
                warn!(user = self.user.as_deref(), sql = %sql, %reason, "query denied");
                self.reject(
                    upstream,
                    SQLSTATE_INVALID_AUTHORIZATION,
                    &format!("query rejected: {}", reason.kind()),
                )
            }
        }
    }

    /// Ready-for-query + synthesized error back to the client, nothing to
    /// the upstream.
    fn reject(&self, upstream: &SessionState, sqlstate: &str, message: &str) -> FilterOutcome {
        FilterOutcome::drop_frame().with_spoof(vec![
            self.ready_marker(upstream),
            Frame::error_response(sqlstate, message),
        ])
    }

    /// The ready-for-query frame preceding a synthesized error mirrors the
    /// upstream's last known transaction status.
    fn ready_marker(&self, upstream: &SessionState) -> Frame {
        Frame::ready_for_query(
            upstream
                .transaction_status()
                .unwrap_or(TransactionStatus::Failed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::action::PeerAction;
    use crate::protocol::auth::compute_md5_password;
    use crate::protocol::constants::{
        AUTH_MD5_PASSWORD, AUTH_OK, ERROR_FIELD_CODE, ERROR_FIELD_MESSAGE, MSG_AUTH_REQUEST,
    };
    use crate::protocol::frame::decode_backend;

    const SALT: [u8; 4] = [0x11, 0x22, 0x33, 0x44];

    fn filter() -> FrontendFilter {
        let mut credentials = HashMap::new();
        credentials.insert("game13".to_string(), "123".to_string());
        FrontendFilter::new(
            "svc".to_string(),
            credentials,
            vec!["dau".to_string(), "sales_log".to_string()],
        )
    }

    fn backend_frame(tag: u8, body: &[u8]) -> Frame {
        let mut bytes = vec![tag];
        bytes.extend_from_slice(&(4 + body.len() as u32).to_be_bytes());
        bytes.extend_from_slice(body);
        let kind = decode_backend(tag, body).unwrap();
        Frame::new(bytes, Some(tag), kind)
    }

    fn md5_challenge() -> Frame {
        let mut body = AUTH_MD5_PASSWORD.to_be_bytes().to_vec();
        body.extend_from_slice(&SALT);
        backend_frame(MSG_AUTH_REQUEST, &body)
    }

    /// Upstream state mid-handshake: challenge seen, not yet complete.
    fn pending_upstream() -> SessionState {
        let mut state = SessionState::new();
        state.save_auth_message(&md5_challenge());
        state
    }

    /// Upstream state after a finished service-account handshake.
    fn complete_upstream() -> SessionState {
        let mut state = pending_upstream();
        state.save_auth_message(&backend_frame(MSG_AUTH_REQUEST, &AUTH_OK.to_be_bytes()));
        state.save_auth_message(&Frame::ready_for_query(TransactionStatus::Idle));
        state.set_transaction_status(TransactionStatus::Idle);
        state
    }

    fn startup_then_auth(filter: &mut FrontendFilter, upstream: &mut SessionState) {
        filter.handle(&Frame::startup("game13", "apps"), upstream);
        let digest = compute_md5_password("game13", "123", &SALT);
        let outcome = filter.handle(&Frame::password(&digest), upstream);
        assert!(filter.is_authenticated(), "setup auth failed: {:?}", outcome);
    }

    #[test]
    fn test_startup_translates_to_service_user() {
        let mut filter = filter();
        let mut upstream = SessionState::new();
        let outcome = filter.handle(&Frame::startup("game13", "apps"), &mut upstream);
        match outcome.peer {
            PeerAction::Translate(frames) => {
                assert_eq!(frames.len(), 1);
                assert_eq!(frames[0].startup_parameter("user"), Some("svc"));
                assert_eq!(frames[0].startup_parameter("database"), Some("apps"));
            }
            other => panic!("expected translate, got {:?}", other),
        }
        assert!(outcome.spoof.is_empty());
        assert_eq!(filter.user(), Some("game13"));
    }

    #[test]
    fn test_raced_startup_replays_cache_without_upstream_traffic() {
        let mut filter = filter();
        let mut upstream = complete_upstream();
        let outcome = filter.handle(&Frame::startup("game13", "apps"), &mut upstream);
        assert_eq!(outcome.peer, PeerAction::Drop);
        // Auth-ok and ready-for-query replayed; the challenge is not.
        assert_eq!(outcome.spoof.len(), 2);
        assert!(matches!(
            outcome.spoof[0].kind(),
            FrameKind::Authentication { status: 0, .. }
        ));
        assert!(matches!(
            outcome.spoof[1].kind(),
            FrameKind::ReadyForQuery { .. }
        ));
    }

    #[test]
    fn test_ssl_request_is_declined_locally() {
        let mut filter = filter();
        let mut upstream = SessionState::new();
        let wire = {
            let mut bytes = vec![];
            bytes.extend_from_slice(&8u32.to_be_bytes());
            bytes.extend_from_slice(&crate::protocol::constants::SSL_REQUEST_CODE.to_be_bytes());
            bytes
        };
        let frame = Frame::new(wire, None, FrameKind::SslRequest);
        let outcome = filter.handle(&frame, &mut upstream);
        assert_eq!(outcome.peer, PeerAction::Drop);
        assert_eq!(outcome.spoof.len(), 1);
        assert_eq!(outcome.spoof[0].as_bytes(), b"N");
    }

    #[test]
    fn test_good_password_replays_and_forwards_nothing() {
        let mut filter = filter();
        let mut upstream = complete_upstream();
        filter.handle(&Frame::startup("game13", "apps"), &mut upstream);

        let digest = compute_md5_password("game13", "123", &SALT);
        let outcome = filter.handle(&Frame::password(&digest), &mut upstream);
        assert_eq!(outcome.peer, PeerAction::Drop);
        assert!(!outcome.disconnect);
        assert!(filter.is_authenticated());
        assert_eq!(outcome.spoof.len(), 2);
    }

    #[test]
    fn test_bad_password_spoofs_error_once_and_disconnects() {
        let mut filter = filter();
        let mut upstream = pending_upstream();
        filter.handle(&Frame::startup("game13", "apps"), &mut upstream);

        let digest = compute_md5_password("game13", "wrong", &SALT);
        let outcome = filter.handle(&Frame::password(&digest), &mut upstream);
        assert_eq!(outcome.peer, PeerAction::Drop);
        assert!(outcome.disconnect);
        assert!(!filter.is_authenticated());
        assert_eq!(outcome.spoof.len(), 2);
        assert!(matches!(
            outcome.spoof[0].kind(),
            FrameKind::ReadyForQuery { .. }
        ));
        assert_eq!(outcome.spoof[1].error_field(ERROR_FIELD_CODE), Some("28000"));
        assert_eq!(
            outcome.spoof[1].error_field(ERROR_FIELD_MESSAGE),
            Some("password authentication failed for user \"game13\"")
        );
    }

    #[test]
    fn test_unknown_user_fails_authentication() {
        let mut filter = filter();
        let mut upstream = pending_upstream();
        filter.handle(&Frame::startup("intruder", "apps"), &mut upstream);

        let digest = compute_md5_password("intruder", "whatever", &SALT);
        let outcome = filter.handle(&Frame::password(&digest), &mut upstream);
        assert!(outcome.disconnect);
        assert!(!filter.is_authenticated());
    }

    #[test]
    fn test_allowed_query_is_transmitted() {
        let mut filter = filter();
        let mut upstream = complete_upstream();
        startup_then_auth(&mut filter, &mut upstream);

        let outcome = filter.handle(
            &Frame::query("SELECT * from dau WHERE app='game13'"),
            &mut upstream,
        );
        assert_eq!(outcome.peer, PeerAction::Transmit);
        assert!(outcome.spoof.is_empty());
    }

    #[test]
    fn test_denied_query_answers_locally_and_stays_open() {
        let mut filter = filter();
        let mut upstream = complete_upstream();
        startup_then_auth(&mut filter, &mut upstream);

        let outcome = filter.handle(&Frame::query("SELECT * from secrets"), &mut upstream);
        assert_eq!(outcome.peer, PeerAction::Drop);
        assert!(!outcome.disconnect);
        assert_eq!(outcome.spoof.len(), 2);
        // Ready marker mirrors the recorded upstream status.
        assert_eq!(
            outcome.spoof[0].kind(),
            &FrameKind::ReadyForQuery {
                status: TransactionStatus::Idle
            }
        );
        let message = outcome.spoof[1].error_field(ERROR_FIELD_MESSAGE).unwrap();
        assert!(message.starts_with("query rejected:"), "got: {}", message);
        // Internal detail (table name) stays out of the client message.
        assert!(!message.contains("secrets"));
    }

    #[test]
    fn test_parse_frame_is_always_rejected() {
        let mut filter = filter();
        let mut upstream = complete_upstream();
        startup_then_auth(&mut filter, &mut upstream);

        let parse = Frame::new(
            vec![b'P', 0, 0, 0, 4],
            Some(b'P'),
            FrameKind::Parse,
        );
        let outcome = filter.handle(&parse, &mut upstream);
        assert_eq!(outcome.peer, PeerAction::Drop);
        assert_eq!(outcome.spoof.len(), 2);
        assert_eq!(
            outcome.spoof[1].error_field(ERROR_FIELD_MESSAGE),
            Some("query authentication failed for user \"game13\"")
        );
    }

    #[test]
    fn test_terminate_is_dropped() {
        let mut filter = filter();
        let mut upstream = complete_upstream();
        let outcome = filter.handle(&Frame::terminate(), &mut upstream);
        assert_eq!(outcome.peer, PeerAction::Drop);
        assert!(outcome.spoof.is_empty());
        assert!(!outcome.disconnect);
    }

    #[test]
    fn test_drop_queue_suppresses_next_matching_tag() {
        let mut filter = filter();
        let mut upstream = complete_upstream();
        startup_then_auth(&mut filter, &mut upstream);

        filter.ignore_next(b'Q');
        let query = Frame::query("SELECT * from secrets");
        let outcome = filter.handle(&query, &mut upstream);
        assert_eq!(outcome.peer, PeerAction::Drop);
        assert!(outcome.spoof.is_empty());

        // Only the next one; after that the handler runs again.
        let outcome = filter.handle(&query, &mut upstream);
        assert_eq!(outcome.spoof.len(), 2);
    }

    #[test]
    fn test_opaque_frames_pass_through() {
        let mut filter = filter();
        let mut upstream = complete_upstream();
        let sync = Frame::new(vec![b'S', 0, 0, 0, 4], Some(b'S'), FrameKind::Opaque);
        let outcome = filter.handle(&sync, &mut upstream);
        assert_eq!(outcome.peer, PeerAction::Transmit);
    }
}
