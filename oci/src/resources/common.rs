//! Helpers shared by every resource and data source

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tfplug::schema::{Attribute, AttributeBuilder, AttributeType};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::validator::Validator;

use crate::api::ApiError;
use crate::lifecycle::WaitError;
use crate::provider_data::OciProviderData;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20 * 60);
/// Longest timeout a `timeouts` entry may ask for.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 3600);

/// Pull [`OciProviderData`] out of the opaque provider data.
pub fn extract_provider_data(
    provider_data: Option<Arc<dyn Any + Send + Sync>>,
) -> Result<OciProviderData, Diagnostic> {
    match provider_data {
        Some(data) => data
            .downcast_ref::<OciProviderData>()
            .cloned()
            .ok_or_else(|| {
                Diagnostic::error(
                    "Invalid provider data",
                    "Failed to extract OciProviderData from provider data",
                )
            }),
        None => Err(Diagnostic::error(
            "Provider not configured",
            "The OCI provider must be configured before resources can be managed",
        )),
    }
}

pub fn not_configured() -> Diagnostic {
    Diagnostic::error(
        "Provider not configured",
        "Provider data was not properly configured",
    )
}

pub fn api_error(action: &str, error: &ApiError) -> Diagnostic {
    Diagnostic::error(format!("Failed to {}", action), error.to_string())
}

pub fn wait_error(action: &str, error: &WaitError) -> Diagnostic {
    Diagnostic::error(format!("Failed to {}", action), error.to_string())
}

/// OCI keeps deleted resources visible for a while in a final state.
pub fn is_gone(lifecycle_state: &str) -> bool {
    matches!(lifecycle_state, "TERMINATED" | "DELETED")
}

pub fn required_string(value: &DynamicValue, name: &str) -> Result<String, Diagnostic> {
    value.get_string(&AttributePath::new(name)).map_err(|_| {
        Diagnostic::error(
            format!("Missing {}", name),
            format!("{} must be set", name),
        )
        .with_attribute(AttributePath::new(name))
    })
}

pub fn optional_string(value: &DynamicValue, name: &str) -> Option<String> {
    value.get_string(&AttributePath::new(name)).ok()
}

pub fn optional_bool(value: &DynamicValue, name: &str) -> Option<bool> {
    value.get_bool(&AttributePath::new(name)).ok()
}

pub fn optional_i64(value: &DynamicValue, name: &str) -> Option<i64> {
    value
        .get_number(&AttributePath::new(name))
        .ok()
        .map(|n| n as i64)
}

pub fn optional_string_list(value: &DynamicValue, name: &str) -> Option<Vec<String>> {
    value.get_string_list(&AttributePath::new(name)).ok()
}

pub fn optional_string_map(value: &DynamicValue, name: &str) -> Option<HashMap<String, String>> {
    value.get_string_map(&AttributePath::new(name)).ok()
}

/// Builds a state object attribute by attribute. Attributes left out are
/// filled with null when the framework conforms the state to the schema.
#[derive(Debug, Default)]
pub struct StateBuilder {
    values: HashMap<String, Dynamic>,
}

impl StateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn string(mut self, name: &str, value: impl Into<String>) -> Self {
        self.values
            .insert(name.to_string(), Dynamic::String(value.into()));
        self
    }

    pub fn opt_string(mut self, name: &str, value: Option<String>) -> Self {
        self.values.insert(
            name.to_string(),
            value.map(Dynamic::String).unwrap_or(Dynamic::Null),
        );
        self
    }

    pub fn bool(mut self, name: &str, value: bool) -> Self {
        self.values.insert(name.to_string(), Dynamic::Bool(value));
        self
    }

    pub fn opt_bool(mut self, name: &str, value: Option<bool>) -> Self {
        self.values.insert(
            name.to_string(),
            value.map(Dynamic::Bool).unwrap_or(Dynamic::Null),
        );
        self
    }

    pub fn number(mut self, name: &str, value: f64) -> Self {
        self.values.insert(name.to_string(), Dynamic::Number(value));
        self
    }

    pub fn opt_number(mut self, name: &str, value: Option<f64>) -> Self {
        self.values.insert(
            name.to_string(),
            value.map(Dynamic::Number).unwrap_or(Dynamic::Null),
        );
        self
    }

    pub fn string_list(mut self, name: &str, values: &[String]) -> Self {
        self.values.insert(name.to_string(), string_list(values));
        self
    }

    pub fn string_map(mut self, name: &str, values: &HashMap<String, String>) -> Self {
        self.values.insert(name.to_string(), string_map(values));
        self
    }

    pub fn value(mut self, name: &str, value: Dynamic) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    /// Copy an attribute unchanged from another value, typically the plan.
    pub fn keep(mut self, name: &str, from: &DynamicValue) -> Self {
        let value = from
            .get(&AttributePath::new(name))
            .cloned()
            .unwrap_or(Dynamic::Null);
        self.values.insert(name.to_string(), value);
        self
    }

    /// Keep the value from `from` when it is set and known, otherwise use
    /// `fallback`. For attributes OCI may echo back with extra detail.
    pub fn prefer(mut self, name: &str, from: &DynamicValue, fallback: Dynamic) -> Self {
        let value = match from.get(&AttributePath::new(name)) {
            Some(value) if !value.is_null() && value.is_fully_known() => value.clone(),
            _ => fallback,
        };
        self.values.insert(name.to_string(), value);
        self
    }

    pub fn build(self) -> DynamicValue {
        DynamicValue::new(Dynamic::Map(self.values))
    }
}

/// State for a create OCI accepted but that did not finish: the new `id`
/// plus the named attributes copied from the plan. Saving it lets Terraform
/// track the object as tainted instead of losing it.
pub fn partial_state(id: &str, plan: &DynamicValue, keep: &[&str]) -> DynamicValue {
    keep.iter()
        .fold(StateBuilder::new().string("id", id), |builder, name| {
            builder.keep(name, plan)
        })
        .keep("timeouts", plan)
        .build()
}

pub fn string_list(values: &[String]) -> Dynamic {
    Dynamic::List(values.iter().cloned().map(Dynamic::String).collect())
}

pub fn string_map(values: &HashMap<String, String>) -> Dynamic {
    Dynamic::Map(
        values
            .iter()
            .map(|(k, v)| (k.clone(), Dynamic::String(v.clone())))
            .collect(),
    )
}

/// Parse `"45m"`, `"1h30m"`, `"90s"` or `"2h"`. Durations above
/// [`MAX_TIMEOUT`] are rejected.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total = 0u64;
    let mut digits = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            other => return Err(format!("unknown unit '{}' in \"{}\"", other, text)),
        };
        let amount: u64 = digits
            .parse()
            .map_err(|_| format!("missing number before '{}' in \"{}\"", c, text))?;
        total = amount
            .checked_mul(unit)
            .and_then(|seconds| total.checked_add(seconds))
            .filter(|seconds| *seconds <= MAX_TIMEOUT.as_secs())
            .ok_or_else(|| format!("\"{}\" is longer than {}h", text, MAX_TIMEOUT.as_secs() / 3600))?;
        digits.clear();
    }
    if !digits.is_empty() {
        return Err(format!("missing unit after {} in \"{}\"", digits, text));
    }
    Ok(Duration::from_secs(total))
}

/// Per-operation timeouts from the `timeouts` attribute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timeouts {
    pub create: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Timeouts {
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            create: timeout,
            update: timeout,
            delete: timeout,
        }
    }

    /// Timeouts configured on `value`, falling back to `default` for unset
    /// or unparsable entries.
    pub fn from_value(value: &DynamicValue, default: Duration) -> Self {
        let configured = optional_string_map(value, "timeouts").unwrap_or_default();
        let pick = |key: &str| {
            configured
                .get(key)
                .and_then(|text| parse_duration(text).ok())
                .unwrap_or(default)
        };
        Self {
            create: pick("create"),
            update: pick("update"),
            delete: pick("delete"),
        }
    }
}

struct TimeoutsValidator;

impl Validator for TimeoutsValidator {
    fn description(&self) -> String {
        "keys create, update or delete with durations such as \"45m\" or \"1h30m\"".to_string()
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>) {
        let Some(entries) = value.as_map() else {
            return;
        };
        for (key, entry) in entries {
            let entry_path = path.clone().key(key);
            if !matches!(key.as_str(), "create" | "update" | "delete") {
                diagnostics.push(
                    Diagnostic::error(
                        format!("Unsupported timeout \"{}\"", key),
                        "Only create, update and delete timeouts can be set",
                    )
                    .with_attribute(entry_path),
                );
                continue;
            }
            if let Some(text) = entry.as_str() {
                if let Err(e) = parse_duration(text) {
                    diagnostics.push(
                        Diagnostic::error("Invalid timeout", e).with_attribute(entry_path),
                    );
                }
            }
        }
    }
}

pub fn timeouts_attribute() -> Attribute {
    AttributeBuilder::new("timeouts", AttributeType::map(AttributeType::String))
        .description("Operation timeouts, e.g. { create = \"30m\", delete = \"1h\" }")
        .optional()
        .validator(TimeoutsValidator)
        .build()
}

pub fn freeform_tags_attribute() -> Attribute {
    AttributeBuilder::new("freeform_tags", AttributeType::map(AttributeType::String))
        .description("Free-form tags for this resource")
        .optional()
        .computed()
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_parse() {
        assert_eq!(parse_duration("45m").unwrap(), Duration::from_secs(45 * 60));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(90 * 60));
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration(" 2h ").unwrap(), Duration::from_secs(7200));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("m").is_err());
    }

    #[test]
    fn oversized_durations_are_rejected() {
        assert_eq!(parse_duration("8760h").unwrap(), MAX_TIMEOUT);
        assert!(parse_duration("8761h").is_err());
        assert!(parse_duration("8760h1s").is_err());
        assert!(parse_duration("5000000000000000h").is_err());
        assert!(parse_duration("6000000000000000h").is_err());
        assert!(parse_duration("99999999999999999999s").is_err());

        let value = Dynamic::Map(HashMap::from([(
            "create".to_string(),
            Dynamic::from("5000000000000000h"),
        )]));
        let mut diagnostics = Vec::new();
        TimeoutsValidator.validate(&value, &AttributePath::new("timeouts"), &mut diagnostics);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn timeouts_fall_back_to_default() {
        let mut value = DynamicValue::object();
        value
            .set_map(
                &AttributePath::new("timeouts"),
                HashMap::from([
                    ("create".to_string(), Dynamic::from("1h")),
                    ("delete".to_string(), Dynamic::from("bogus")),
                ]),
            )
            .unwrap();

        let timeouts = Timeouts::from_value(&value, DEFAULT_TIMEOUT);
        assert_eq!(timeouts.create, Duration::from_secs(3600));
        assert_eq!(timeouts.update, DEFAULT_TIMEOUT);
        assert_eq!(timeouts.delete, DEFAULT_TIMEOUT);

        assert_eq!(
            Timeouts::from_value(&DynamicValue::object(), Duration::from_secs(5)),
            Timeouts::uniform(Duration::from_secs(5))
        );
    }

    #[test]
    fn timeouts_validator_flags_bad_entries() {
        let value = Dynamic::Map(HashMap::from([
            ("create".to_string(), Dynamic::from("20m")),
            ("read".to_string(), Dynamic::from("1m")),
            ("delete".to_string(), Dynamic::from("soon")),
        ]));
        let mut diagnostics = Vec::new();
        TimeoutsValidator.validate(&value, &AttributePath::new("timeouts"), &mut diagnostics);

        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.iter().all(|d| d.is_error()));
    }

    #[test]
    fn state_builder_keeps_planned_values() {
        let mut plan = DynamicValue::object();
        plan.set_string(&AttributePath::new("display_name"), "web")
            .unwrap();

        let state = StateBuilder::new()
            .string("id", "ocid1")
            .opt_string("dns_label", None)
            .keep("display_name", &plan)
            .keep("timeouts", &plan)
            .build();

        assert_eq!(state.get_string(&AttributePath::new("id")).unwrap(), "ocid1");
        assert_eq!(
            state.get_string(&AttributePath::new("display_name")).unwrap(),
            "web"
        );
        assert_eq!(state.get(&AttributePath::new("dns_label")), Some(&Dynamic::Null));
        assert_eq!(state.get(&AttributePath::new("timeouts")), Some(&Dynamic::Null));
    }

    #[test]
    fn partial_state_keeps_id_and_named_attributes() {
        let mut plan = DynamicValue::object();
        plan.set_string(&AttributePath::new("name"), "web").unwrap();
        plan.set_string(&AttributePath::new("policy"), "IP_HASH").unwrap();

        let state = partial_state("lb/web", &plan, &["name"]);
        assert_eq!(state.get_string(&AttributePath::new("id")).unwrap(), "lb/web");
        assert_eq!(state.get_string(&AttributePath::new("name")).unwrap(), "web");
        assert!(state.get(&AttributePath::new("policy")).is_none());
        assert_eq!(state.get(&AttributePath::new("timeouts")), Some(&Dynamic::Null));
    }

    #[test]
    fn provider_data_is_required() {
        assert!(extract_provider_data(None).is_err());
        let wrong: Arc<dyn Any + Send + Sync> = Arc::new(42u32);
        assert!(extract_provider_data(Some(wrong)).is_err());
    }

    #[test]
    fn gone_states() {
        assert!(is_gone("TERMINATED"));
        assert!(is_gone("DELETED"));
        assert!(!is_gone("TERMINATING"));
    }
}
