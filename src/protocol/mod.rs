//! PostgreSQL wire protocol layer
//!
//! This module contains:
//! - Accumulation buffer for incremental parsing
//! - Protocol constants
//! - Frame model and synthesized messages
//! - Per-direction incremental parsers
//! - MD5 password authentication
//!
//! Reference: <https://www.postgresql.org/docs/current/protocol.html>

pub mod auth;
pub mod buffer;
pub mod constants;
pub mod frame;
pub mod parser;

// Re-export commonly used items
pub use buffer::FrameBuffer;
pub use frame::{Frame, FrameKind, TransactionStatus};
pub use parser::{BackendParser, FrontendParser, ParseProgress};
