//! Turning an exchange into log output.
//!
//! [`render`] evaluates a specifier list in order. The result feeds one of
//! two shapes: a tab-delimited line ([`delimited_line`]) or a grouped
//! [`StructuredRecord`].

use std::collections::BTreeMap;

use crate::log::field::{display, Exchange, FieldValue, LogFields};
use crate::log::spec::FieldSpecifier;

/// One evaluated specifier.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedField {
    pub short_name: &'static str,
    pub parameter: Option<String>,
    pub value: Option<FieldValue>,
}

impl RenderedField {
    /// The display form; absent values render empty.
    pub fn text(&self) -> String {
        display(self.value.as_ref())
    }
}

/// Evaluates `specs` against one exchange, preserving order.
pub fn render(registry: &LogFields, specs: &[FieldSpecifier], exchange: &Exchange<'_>) -> Vec<RenderedField> {
    specs
        .iter()
        .map(|spec| RenderedField {
            short_name: spec.field().short_name(),
            parameter: spec.parameter().map(str::to_owned),
            value: spec.extract(registry, exchange),
        })
        .collect()
}

/// Tab-joined values without the trailing newline.
pub fn delimited_line(fields: &[RenderedField]) -> String {
    fields.iter().map(RenderedField::text).collect::<Vec<_>>().join("\t")
}

// ── Structured record ─────────────────────────────────────────────────────────

/// Grouped key/value form of one exchange.
///
/// Group ids are `<short>@<namespace>`. Unparameterised fields share the
/// `l@<namespace>` group, keyed by short name; parameterised fields get a
/// group of their own, keyed by the normalised parameter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StructuredRecord {
    pub message_id: String,
    pub thread_name: String,
    pub groups: BTreeMap<String, BTreeMap<String, String>>,
}

impl StructuredRecord {
    pub fn new(namespace: u32, fields: &[RenderedField]) -> Self {
        let mut groups: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for field in fields {
            let Some(value) = &field.value else { continue };
            let (group, key) = match &field.parameter {
                Some(p) => (format!("{}@{namespace}", field.short_name), normalise_key(p)),
                None    => (format!("l@{namespace}"), field.short_name.to_owned()),
            };
            groups.entry(group).or_default().insert(key, value.to_string());
        }

        let thread_name = std::thread::current()
            .name()
            .unwrap_or_default()
            .chars()
            .filter(|c| !matches!(c, ' ' | '\t'))
            .collect();

        Self {
            message_id: uuid::Uuid::new_v4().simple().to_string(),
            thread_name,
            groups,
        }
    }
}

fn normalise_key(parameter: &str) -> String {
    parameter.to_lowercase().replace('=', "_")
}
