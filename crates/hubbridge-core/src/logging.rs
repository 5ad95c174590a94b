/*!
 * Logging functionality for hubbridge.
 *
 * Sets up `tracing` and provides span helpers so every host task logs under
 * its own component.
 */
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Initialize the logging system with default configuration
pub fn init() -> Result<()> {
    init_with_filter("info")
}

/// Initialize the logging system with a specific filter
///
/// `RUST_LOG` takes precedence over `filter` when it is set.
pub fn init_with_filter(filter: &str) -> Result<()> {
    init_with_options(filter, true)
}

/// Initialize the logging system from the loaded configuration
pub fn init_from_config(config: &LoggingConfig) -> Result<()> {
    init_with_options(&config.level, config.with_target)
}

fn init_with_options(filter: &str, with_target: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(with_target))
        .with(filter)
        .try_init()
        .map_err(|e| Error::runtime(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

/// A type alias for a tracing span
pub type Span = tracing::Span;

/// Create a new span for a component
///
/// # Arguments
///
/// * `name` - The name of the component
/// * `id` - An optional ID for the component instance, e.g. the host address
pub fn component_span(name: &str, id: Option<&str>) -> Span {
    match id {
        Some(id) => tracing::info_span!("component", name = %name, id = %id),
        None => tracing::info_span!("component", name = %name),
    }
}

/// Create a new span for an operation
pub fn operation_span(name: &str, component: &str) -> Span {
    tracing::info_span!("operation", name = %name, component = %component)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_fails_gracefully() {
        let _ = init();
        assert!(init_with_filter("debug").is_err());
    }

    #[test]
    fn test_component_span() {
        // No subscriber interest is registered in unit tests
        let span = component_span("host", Some("192.168.1.10"));
        assert!(span.is_none());

        let span = operation_span("provision", "host");
        assert!(span.is_none());
    }
}
