//! pgfence-proxy - Intercepting PostgreSQL proxy with a statement firewall
//!
//! This library provides the core functionality for a proxy that:
//! - Parses the PostgreSQL wire protocol incrementally in both directions
//! - Relays authentication, so clients hold per-user passwords while the
//!   upstream server only ever sees the service account
//! - Rejects queries that step outside the configured table and condition
//!   policy before they reach the server

pub mod config;
pub mod error;
pub mod filter;
pub mod firewall;
pub mod protocol;
pub mod server;

pub use config::Config;
pub use error::{ProxyError, Result};
pub use filter::{BackendFilter, FilterOutcome, FrontendFilter, PeerAction, SessionState};
pub use firewall::{DenialReason, QueryPolicy, Verdict};
pub use protocol::{BackendParser, Frame, FrameKind, FrontendParser, ParseProgress};
pub use server::{ConnectionPair, Listener, ListenerStats};
