/*!
 * Device catalog.
 *
 * Static lookup from a model string to its manufacturer metadata and ordered
 * attribute table. The shared table is always searched; the legacy or
 * spec-based extension table is added depending on the requested schema.
 */
use tracing::trace;

use crate::device::{AttributeMapping, SchemaKind};

mod tables;

/// Manufacturer and naming data for one model string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    /// Model string
    pub model: &'static str,
    /// Manufacturer
    pub manufacturer: &'static str,
    /// Product name
    pub name: &'static str,
    /// Vendor product code
    pub product_code: Option<&'static str>,
}

/// A group of models sharing one attribute table
#[derive(Debug)]
pub struct CatalogEntry {
    /// Models covered by this entry
    pub models: &'static [ModelInfo],
    /// Wire schema the models speak
    pub schema: SchemaKind,
    /// Attribute table
    pub mappings: &'static [AttributeMapping],
}

/// Result of a successful catalog lookup
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogMatch {
    /// Model string without its revision suffix
    pub model: String,
    /// Manufacturer
    pub manufacturer: &'static str,
    /// `manufacturer + name`
    pub display_name: String,
    /// `model + product code`
    pub product_model: String,
    /// Schema of the table that matched
    pub schema: SchemaKind,
    /// Attribute table
    pub mappings: &'static [AttributeMapping],
}

/// Strip a trailing `.vN` revision suffix
pub fn normalize_model(model: &str) -> &str {
    match model.rsplit_once(".v") {
        Some((base, rev))
            if !base.is_empty() && !rev.is_empty() && rev.bytes().all(|b| b.is_ascii_digit()) =>
        {
            base
        }
        _ => model,
    }
}

/// Look up a model. Returns `None` if no table contains it.
pub fn resolve(model: &str, schema: SchemaKind) -> Option<CatalogMatch> {
    let model = normalize_model(model);
    let extension = match schema {
        SchemaKind::Legacy => tables::LEGACY,
        SchemaKind::SpecBased => tables::SPEC,
    };

    let (entry, info) = tables::COMMON
        .iter()
        .chain(extension.iter())
        .find_map(|entry| {
            entry
                .models
                .iter()
                .find(|info| info.model == model)
                .map(|info| (entry, info))
        })?;

    trace!("Resolved model {} with {:?} schema", model, entry.schema);

    Some(CatalogMatch {
        model: model.to_string(),
        manufacturer: info.manufacturer,
        display_name: format!("{} {}", info.manufacturer, info.name),
        product_model: match info.product_code {
            Some(code) => format!("{} {}", model, code),
            None => model.to_string(),
        },
        schema: entry.schema,
        mappings: entry.mappings,
    })
}

/// Canonical name for a wire key shared across device families
pub fn global_alias(wire_key: &str) -> Option<&'static str> {
    tables::GLOBAL_ALIASES
        .iter()
        .find(|(key, _)| *key == wire_key)
        .map(|(_, name)| *name)
}

/// Whether the model is a lock that reports battery as a percentage
pub fn reports_battery_percent(model: &str) -> bool {
    model.contains("aqara.lock")
}
