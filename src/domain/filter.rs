use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One attribute/regex pair. Rules inside a group are AND-ed, groups are OR-ed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    pub parameter: String,
    pub regex: String,
}

impl FilterRule {
    pub fn new(parameter: impl Into<String>, regex: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            regex: regex.into(),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    #[error("invalid regex for attribute {parameter}: {message}")]
    InvalidRegex { parameter: String, message: String },
    #[error("attribute {0} has a nested value and cannot be filtered")]
    UnsupportedAttribute(String),
    #[error("attributes must serialize to a flat object")]
    NotAnObject,
    #[error("failed to serialize attributes: {0}")]
    Serialize(String),
}

pub type AttributeMap = BTreeMap<String, String>;

/// Flattens a serializable attribute struct into string key/value pairs.
/// Null values are treated as absent attributes.
pub fn flatten_attributes<T: Serialize>(attributes: &T) -> Result<AttributeMap, FilterError> {
    let value = serde_json::to_value(attributes)
        .map_err(|error| FilterError::Serialize(error.to_string()))?;
    let Value::Object(object) = value else {
        return Err(FilterError::NotAnObject);
    };

    let mut flattened = AttributeMap::new();
    for (key, value) in object {
        let text = match value {
            Value::Null => continue,
            Value::String(text) => text,
            Value::Number(number) => number.to_string(),
            Value::Bool(flag) => flag.to_string(),
            Value::Array(_) | Value::Object(_) => {
                return Err(FilterError::UnsupportedAttribute(key));
            }
        };
        flattened.insert(key, text);
    }

    Ok(flattened)
}

/// Returns true when at least one group has all its rules matched.
/// An empty group list disables filtering.
pub fn adheres(groups: &[Vec<FilterRule>], attributes: &AttributeMap) -> Result<bool, FilterError> {
    if groups.is_empty() {
        return Ok(true);
    }

    for group in groups {
        if group_matches(group, attributes)? {
            return Ok(true);
        }
    }

    Ok(false)
}

fn group_matches(group: &[FilterRule], attributes: &AttributeMap) -> Result<bool, FilterError> {
    for rule in group {
        let regex = Regex::new(&rule.regex).map_err(|error| FilterError::InvalidRegex {
            parameter: rule.parameter.clone(),
            message: error.to_string(),
        })?;

        let matched = attributes
            .get(&rule.parameter)
            .is_some_and(|value| regex.is_match(value));
        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}
