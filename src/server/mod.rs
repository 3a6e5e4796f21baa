//! Listener and per-connection drivers.

mod connection;
mod listener;

pub use connection::ConnectionPair;
pub use listener::{Listener, ListenerStats};
