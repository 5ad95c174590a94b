/*!
 * Prelude module for hubbridge core.
 *
 * Re-exports the types most crates in the workspace need.
 */

pub use crate::error::{Error, Result};

pub use crate::types::{Id, Metadata, Value};

pub use crate::config::{
    BridgeConfig, Config, ConfigBuilder, GatewayConfig, SharedConfig, TopologyPaths,
};

pub use crate::utils::spawn_and_log;

pub use tracing::{debug, error, info, trace, warn};

pub use crate::init;
