/*!
 * hubbridge core
 *
 * Shared configuration, logging, error and value types for the hubbridge
 * workspace.
 */

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod types;
pub mod utils;

/// Re-export of dependencies that are part of the public API
pub mod deps {
    pub use anyhow;
    pub use futures;
    pub use serde;
    pub use serde_json;
    pub use tokio;
    pub use tracing;
}

/// hubbridge core crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library initialization with the default log filter
pub fn init() -> Result<(), error::Error> {
    logging::init()?;
    tracing::info!("hubbridge core {} initialized", VERSION);
    Ok(())
}
