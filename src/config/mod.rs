//! Agent configuration
//!
//! Read once from an optional TOML file, adjusted by command-line overrides,
//! then shared read-only through [`ConfigStore`].

mod schema;
mod store;

pub use schema::{AgentConfig, DisplayConfig, RoiSettings, SignalingConfig};
pub use store::ConfigStore;
