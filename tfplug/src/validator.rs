//! Attribute validators
//!
//! Validators run during ValidateResourceConfig, ValidateDataResourceConfig
//! and ValidateProviderConfig. They only look at known, non-null values;
//! required-ness and type checks happen in the framework before them.

use crate::types::{AttributePath, Diagnostic, Dynamic};

pub trait Validator: Send + Sync {
    fn description(&self) -> String;
    fn validate(&self, value: &Dynamic, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>);
}

pub struct StringLengthValidator {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl StringLengthValidator {
    pub fn between(min: usize, max: usize) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn at_least(min: usize) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }
}

impl Validator for StringLengthValidator {
    fn description(&self) -> String {
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!("string length must be between {} and {}", min, max),
            (Some(min), None) => format!("string length must be at least {}", min),
            (None, Some(max)) => format!("string length must be at most {}", max),
            (None, None) => "any string length".to_string(),
        }
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>) {
        let Some(s) = value.as_str() else {
            return;
        };
        let len = s.chars().count();
        if let Some(min) = self.min {
            if len < min {
                diagnostics.push(
                    Diagnostic::error(
                        format!("{} must have minimum length of {}", path, min),
                        format!("Got length {}", len),
                    )
                    .with_attribute(path.clone()),
                );
            }
        }
        if let Some(max) = self.max {
            if len > max {
                diagnostics.push(
                    Diagnostic::error(
                        format!("{} must have maximum length of {}", path, max),
                        format!("Got length {}", len),
                    )
                    .with_attribute(path.clone()),
                );
            }
        }
    }
}

pub struct StringPatternValidator {
    pattern: Result<regex::Regex, regex::Error>,
    description: String,
}

impl StringPatternValidator {
    /// An invalid pattern is reported as a diagnostic when the validator runs.
    pub fn new(pattern: &str, description: &str) -> Self {
        Self {
            pattern: regex::Regex::new(pattern),
            description: description.to_string(),
        }
    }
}

impl Validator for StringPatternValidator {
    fn description(&self) -> String {
        format!("must match {}", self.description)
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>) {
        let Some(s) = value.as_str() else {
            return;
        };
        let pattern = match &self.pattern {
            Ok(pattern) => pattern,
            Err(e) => {
                diagnostics.push(Diagnostic::error(
                    format!("Invalid validation pattern for {}", path),
                    e.to_string(),
                ));
                return;
            }
        };
        if !pattern.is_match(s) {
            diagnostics.push(
                Diagnostic::error(
                    format!("{} must match {}", path, self.description),
                    format!("Value '{}' does not match pattern", s),
                )
                .with_attribute(path.clone()),
            );
        }
    }
}

pub struct StringOneOfValidator {
    pub values: Vec<String>,
}

impl StringOneOfValidator {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

impl Validator for StringOneOfValidator {
    fn description(&self) -> String {
        format!("must be one of: {}", self.values.join(", "))
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>) {
        if let Some(s) = value.as_str() {
            if !self.values.iter().any(|v| v == s) {
                diagnostics.push(
                    Diagnostic::error(
                        format!("{} has an invalid value", path),
                        format!("Got '{}', expected one of: {}", s, self.values.join(", ")),
                    )
                    .with_attribute(path.clone()),
                );
            }
        }
    }
}

pub struct NumberRangeValidator {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl NumberRangeValidator {
    pub fn between(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }
}

impl Validator for NumberRangeValidator {
    fn description(&self) -> String {
        format!("number must be within {:?}..={:?}", self.min, self.max)
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>) {
        let Some(n) = value.as_f64() else {
            return;
        };
        if let Some(min) = self.min {
            if n < min {
                diagnostics.push(
                    Diagnostic::error(
                        format!("{} must be at least {}", path, min),
                        format!("Got {}", n),
                    )
                    .with_attribute(path.clone()),
                );
            }
        }
        if let Some(max) = self.max {
            if n > max {
                diagnostics.push(
                    Diagnostic::error(
                        format!("{} must be at most {}", path, max),
                        format!("Got {}", n),
                    )
                    .with_attribute(path.clone()),
                );
            }
        }
    }
}

pub struct ListLengthValidator {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl Validator for ListLengthValidator {
    fn description(&self) -> String {
        format!("list length must be within {:?}..={:?}", self.min, self.max)
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>) {
        let Some(items) = value.as_list() else {
            return;
        };
        if let Some(min) = self.min {
            if items.len() < min {
                diagnostics.push(
                    Diagnostic::error(
                        format!("{} must have at least {} items", path, min),
                        format!("Got {} items", items.len()),
                    )
                    .with_attribute(path.clone()),
                );
            }
        }
        if let Some(max) = self.max {
            if items.len() > max {
                diagnostics.push(
                    Diagnostic::error(
                        format!("{} must have at most {} items", path, max),
                        format!("Got {} items", items.len()),
                    )
                    .with_attribute(path.clone()),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(validator: &dyn Validator, value: Dynamic) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        validator.validate(&value, &AttributePath::new("test_field"), &mut diags);
        diags
    }

    #[test]
    fn string_length_validator_accepts_valid_length() {
        let validator = StringLengthValidator::between(3, 10);
        assert!(run(&validator, Dynamic::from("hello")).is_empty());
    }

    #[test]
    fn string_length_validator_rejects_too_short() {
        let validator = StringLengthValidator::at_least(5);
        let diags = run(&validator, Dynamic::from("hi"));
        assert_eq!(diags.len(), 1);
        assert!(diags[0].summary.contains("minimum length"));
        assert_eq!(diags[0].attribute, Some(AttributePath::new("test_field")));
    }

    #[test]
    fn validators_skip_null_and_unknown() {
        let validator = StringLengthValidator::at_least(5);
        assert!(run(&validator, Dynamic::Null).is_empty());
        assert!(run(&validator, Dynamic::Unknown).is_empty());
    }

    #[test]
    fn pattern_validator_checks_dns_labels() {
        let validator = StringPatternValidator::new("^[a-zA-Z][a-zA-Z0-9]{0,14}$", "a DNS label");
        assert!(run(&validator, Dynamic::from("vcn1")).is_empty());

        let diags = run(&validator, Dynamic::from("1-bad"));
        assert_eq!(diags.len(), 1);
        assert!(diags[0].summary.contains("a DNS label"));
    }

    #[test]
    fn one_of_validator() {
        let validator = StringOneOfValidator::new(["RUNNING", "STOPPED"]);
        assert!(run(&validator, Dynamic::from("RUNNING")).is_empty());
        assert_eq!(run(&validator, Dynamic::from("PAUSED")).len(), 1);
    }

    #[test]
    fn number_range_validator() {
        let validator = NumberRangeValidator::between(1.0, 65535.0);
        assert!(run(&validator, Dynamic::Number(80.0)).is_empty());
        assert_eq!(run(&validator, Dynamic::Number(0.0)).len(), 1);
        assert_eq!(run(&validator, Dynamic::Number(70000.0)).len(), 1);
    }

    #[test]
    fn list_length_validator() {
        let validator = ListLengthValidator {
            min: Some(1),
            max: Some(2),
        };
        assert_eq!(run(&validator, Dynamic::List(vec![])).len(), 1);
        assert!(run(&validator, Dynamic::List(vec![Dynamic::from("a")])).is_empty());
    }
}
