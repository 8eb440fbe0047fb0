//! Declarative required-key checks on a decoded request body.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of the required payload keys list.
///
/// Deserializes from `{"key": "x"}` or `{"operator": "and"|"or", "keys": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadRule {
    Group {
        operator: RuleOperator,
        keys: Vec<String>,
    },
    Key {
        key: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleOperator {
    And,
    Or,
}

impl RuleOperator {
    fn conjunction(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

impl PayloadRule {
    pub fn key(key: impl Into<String>) -> Self {
        Self::Key { key: key.into() }
    }

    pub fn all<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Group {
            operator: RuleOperator::And,
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn any<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Group {
            operator: RuleOperator::Or,
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Empty groups require nothing and always pass.
    fn is_satisfied_by(&self, body: &Value) -> bool {
        match self {
            Self::Key { key } => is_present(body, key),
            Self::Group { keys, .. } if keys.is_empty() => true,
            Self::Group {
                operator: RuleOperator::And,
                keys,
            } => keys.iter().all(|key| is_present(body, key)),
            Self::Group {
                operator: RuleOperator::Or,
                keys,
            } => keys.iter().any(|key| is_present(body, key)),
        }
    }

    fn failure_message(&self) -> String {
        match self {
            Self::Key { key } => format!("{key} is required"),
            Self::Group { operator, keys } => {
                let verb = match operator {
                    RuleOperator::And => "are",
                    RuleOperator::Or => "is",
                };
                format!("{} {verb} required", join_keys(keys, operator.conjunction()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub is_all_required_payload_keys_present: bool,
    pub message: String,
}

impl ValidationOutcome {
    fn passed() -> Self {
        Self {
            is_all_required_payload_keys_present: true,
            message: String::new(),
        }
    }
}

/// Checks `rules` in order against `body`, stopping at the first failure.
///
/// Bodies that did not decode to a JSON object or array pass vacuously.
pub fn check_required_payload_keys(
    body: &Value,
    is_body_json: bool,
    rules: &[PayloadRule],
) -> ValidationOutcome {
    if !is_body_json {
        return ValidationOutcome::passed();
    }

    match rules.iter().find(|rule| !rule.is_satisfied_by(body)) {
        Some(rule) => ValidationOutcome {
            is_all_required_payload_keys_present: false,
            message: rule.failure_message(),
        },
        None => ValidationOutcome::passed(),
    }
}

fn is_present(body: &Value, key: &str) -> bool {
    body.get(key).is_some_and(|value| !value.is_null())
}

fn join_keys(keys: &[String], conjunction: &str) -> String {
    match keys {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} {conjunction} {last}", init.join(", ")),
    }
}
