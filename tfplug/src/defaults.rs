//! Default values for attributes
//!
//! Defaults are evaluated during planning for attributes that are null in the
//! configuration. The attribute must be optional and computed so Terraform
//! accepts a planned value that differs from config.

use crate::types::Dynamic;

pub trait DefaultValue: Send + Sync {
    fn description(&self) -> String;
    fn default_value(&self) -> Dynamic;
}

/// StaticDefault provides a static default value
pub struct StaticDefault {
    value: Dynamic,
}

impl StaticDefault {
    pub fn new(value: Dynamic) -> Self {
        Self { value }
    }

    pub fn string(value: &str) -> Self {
        Self::new(Dynamic::String(value.to_string()))
    }

    pub fn number(value: f64) -> Self {
        Self::new(Dynamic::Number(value))
    }

    pub fn bool(value: bool) -> Self {
        Self::new(Dynamic::Bool(value))
    }
}

impl DefaultValue for StaticDefault {
    fn description(&self) -> String {
        format!("static default value: {:?}", self.value)
    }

    fn default_value(&self) -> Dynamic {
        self.value.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_defaults() {
        assert_eq!(StaticDefault::bool(false).default_value(), Dynamic::Bool(false));
        assert_eq!(StaticDefault::number(600.0).default_value(), Dynamic::Number(600.0));
        assert_eq!(
            StaticDefault::string("RUNNING").default_value(),
            Dynamic::from("RUNNING")
        );
        assert!(StaticDefault::bool(true).description().contains("Bool(true)"));
    }
}
