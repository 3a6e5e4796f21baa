//! Configuration module for pgfence-proxy
//!
//! ```yaml
//! server:
//!   listen_address: "127.0.0.1"
//!   listen_port: 5433
//! upstream:
//!   host: "127.0.0.1"
//!   port: 5432
//! service_credentials:
//!   username: "postgres"
//!   password: "secret"
//! users:
//!   game13:
//!     password: "123"
//! firewall:
//!   allowed_tables: [dau, sales_log]
//! ```

mod loader;
mod types;

pub use loader::{load_config, load_config_from_str};
pub use types::*;
