//! Thread summary schema and coercion of loosely shaped model output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const MAX_BULLETS: usize = 5;
const MAX_ACTIONS: usize = 3;
const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub bullets: Vec<String>,
    pub actions: Vec<String>,
    pub sentiment: String,
    pub urgency: String,
    pub who_needs_to_act: String,
    pub one_liner: String,
    #[serde(rename = "updated_at")]
    pub updated_at: DateTime<Utc>,
}

impl Summary {
    /// Summary for output that could not be read as the JSON contract:
    /// the raw text becomes the only bullet.
    pub fn degraded(raw: &str) -> Self {
        let raw = raw.trim();
        Self {
            bullets: if raw.is_empty() {
                Vec::new()
            } else {
                vec![raw.to_string()]
            },
            actions: Vec::new(),
            sentiment: UNKNOWN.to_string(),
            urgency: UNKNOWN.to_string(),
            who_needs_to_act: String::new(),
            one_liner: String::new(),
            updated_at: Utc::now(),
        }
    }

    /// Always yields the six-field contract, whatever the model returned.
    pub fn coerce(raw: &str) -> Self {
        match extract_json(raw) {
            Some(Value::Object(map)) => {
                let mut bullets = string_list(map.get("bullets"));
                bullets.truncate(MAX_BULLETS);
                let mut actions = string_list(map.get("actions"));
                actions.truncate(MAX_ACTIONS);
                let one_liner = string_value(field(&map, "oneLiner", "one_liner"));

                if bullets.is_empty() && one_liner.is_empty() {
                    return Self::degraded(raw);
                }

                Self {
                    bullets,
                    actions,
                    sentiment: non_empty_or_unknown(string_value(map.get("sentiment"))),
                    urgency: non_empty_or_unknown(string_value(map.get("urgency"))),
                    who_needs_to_act: string_value(field(&map, "whoNeedsToAct", "who_needs_to_act")),
                    one_liner,
                    updated_at: Utc::now(),
                }
            }
            _ => Self::degraded(raw),
        }
    }
}

/// Models like to wrap JSON in prose or code fences; take the outermost object.
pub fn extract_json(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

/// Accept both the camelCase contract and snake_case variants
fn field<'a>(map: &'a Map<String, Value>, camel: &str, snake: &str) -> Option<&'a Value> {
    map.get(camel).or_else(|| map.get(snake))
}

fn string_value(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| string_value(Some(item)))
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn non_empty_or_unknown(value: String) -> String {
    if value.is_empty() {
        UNKNOWN.to_string()
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_json_degrades() {
        let summary = Summary::coerce("I cannot summarize this");
        assert_eq!(summary.bullets, vec!["I cannot summarize this"]);
        assert_eq!(summary.sentiment, "unknown");
        assert_eq!(summary.urgency, "unknown");
        assert!(summary.actions.is_empty());
    }

    #[test]
    fn test_strict_json() {
        let raw = r#"{"bullets":["Budget approved","Launch moved to May","Hiring paused"],
            "actions":["Send revised plan"],"sentiment":"positive","urgency":"medium",
            "whoNeedsToAct":"Alice","oneLiner":"Budget approved, launch in May"}"#;

        let summary = Summary::coerce(raw);
        assert_eq!(summary.bullets.len(), 3);
        assert_eq!(summary.actions, vec!["Send revised plan"]);
        assert_eq!(summary.sentiment, "positive");
        assert_eq!(summary.who_needs_to_act, "Alice");
        assert_eq!(summary.one_liner, "Budget approved, launch in May");
    }

    #[test]
    fn test_fenced_json_with_loose_shapes() {
        let raw = "Here you go:\n```json\n{\"bullets\": \"Only one point\", \
                   \"actions\": [\"a\", \"b\", \"c\", \"d\"], \"who_needs_to_act\": [\"Bob\", \"Carol\"], \
                   \"urgency\": \"\"}\n```";

        let summary = Summary::coerce(raw);
        assert_eq!(summary.bullets, vec!["Only one point"]);
        assert_eq!(summary.actions.len(), 3);
        assert_eq!(summary.who_needs_to_act, "Bob, Carol");
        assert_eq!(summary.urgency, "unknown");
        assert_eq!(summary.sentiment, "unknown");
    }

    #[test]
    fn test_bullets_capped_at_five() {
        let raw = r#"{"bullets":["1","2","3","4","5","6","7"],"oneLiner":"x"}"#;
        assert_eq!(Summary::coerce(raw).bullets.len(), 5);
    }

    #[test]
    fn test_json_without_content_degrades() {
        let summary = Summary::coerce(r#"{"foo": 1}"#);
        assert_eq!(summary.bullets, vec![r#"{"foo": 1}"#]);
        assert_eq!(summary.urgency, "unknown");
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(Summary::degraded("x")).unwrap();
        for key in [
            "bullets",
            "actions",
            "sentiment",
            "urgency",
            "whoNeedsToAct",
            "oneLiner",
            "updated_at",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }
}
