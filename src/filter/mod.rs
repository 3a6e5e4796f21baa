//! Per-direction message filter pipelines
//!
//! This module contains:
//! - Filter outcomes (peer action + spoofed replies)
//! - Shared per-pair session state (upstream handshake cache)
//! - Client-facing pipeline (local authentication, statement firewall)
//! - Server-facing pipeline (handshake caching, credential injection)

pub mod action;
pub mod backend;
pub mod frontend;
pub mod session;

pub use action::{FilterOutcome, PeerAction};
pub use backend::BackendFilter;
pub use frontend::FrontendFilter;
pub use session::SessionState;

use std::collections::VecDeque;

/// Queue of frame tags a pipeline silently discards, in order. Each entry
/// suppresses exactly one arriving frame of that tag; a frame whose tag
/// does not match the head leaves the queue untouched.
#[derive(Debug, Default)]
pub struct DropQueue(VecDeque<u8>);

impl DropQueue {
    pub fn push(&mut self, tag: u8) {
        self.0.push_back(tag);
    }

    /// True when `tag` matched the head and the frame must be dropped.
    pub fn matches(&mut self, tag: u8) -> bool {
        if self.0.front() == Some(&tag) {
            self.0.pop_front();
            true
        } else {
            false
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
