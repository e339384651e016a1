//! Parsing of the `startingOffsets` / `endingOffsets` option values.
//!
//! A value is either the keyword `earliest` or `latest` (any case), applying
//! to every partition, or a JSON object mapping topic names to boundaries:
//!
//! ```text
//! {"persistent://public/default/t-partition-0": "12:4:0", "t2": "earliest"}
//! ```
//!
//! Each value is `"earliest"`, `"latest"` or a message id written as
//! `"<ledger>:<entry>:<partition>"`. Keys may be short topic names and are
//! stored fully qualified. [`OffsetSpec::to_json`] writes the canonical form
//! (sorted keys, fully-qualified names, no whitespace); parsing that output
//! and writing it again yields the same text.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde_json::Value;

use crate::config::{ENDING_OFFSETS_OPTION, STARTING_OFFSETS_OPTION};
use crate::error::{PulsarError, Result};
use crate::topic::normalize_topic_name;
use crate::types::{MessageId, MessageIdBoundary};

/// Which side of a range an offset option describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetRole {
    Start,
    End,
}

impl OffsetRole {
    pub fn option_key(&self) -> &'static str {
        match self {
            OffsetRole::Start => STARTING_OFFSETS_OPTION,
            OffsetRole::End => ENDING_OFFSETS_OPTION,
        }
    }

    /// Boundary used for partitions a per-topic spec does not mention.
    pub fn default_boundary(&self) -> MessageIdBoundary {
        match self {
            OffsetRole::Start => MessageIdBoundary::Earliest,
            OffsetRole::End => MessageIdBoundary::Latest,
        }
    }

    /// Spec used when the option is absent.
    pub fn default_spec(&self) -> OffsetSpec {
        match self {
            OffsetRole::Start => OffsetSpec::Earliest,
            OffsetRole::End => OffsetSpec::Latest,
        }
    }
}

/// Object entries in document order, duplicates included.
struct RawEntries(Vec<(String, Value)>);

impl<'de> Deserialize<'de> for RawEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = RawEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object of topic to message id")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<RawEntries, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, serde_json::Value>()? {
                    entries.push(entry);
                }
                Ok(RawEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// Parsed form of an offsets option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OffsetSpec {
    /// Every partition starts (or ends) at its oldest retained message.
    Earliest,
    /// Every partition starts (or ends) at its newest message.
    Latest,
    /// Boundaries for individual topics or partitions, keyed by
    /// fully-qualified name. Partitions not covered use the role default.
    Specific(BTreeMap<String, MessageIdBoundary>),
}

impl OffsetSpec {
    pub fn parse(raw: &str, role: OffsetRole) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("earliest") {
            return Ok(OffsetSpec::Earliest);
        }
        if trimmed.eq_ignore_ascii_case("latest") {
            return Ok(OffsetSpec::Latest);
        }

        let parse_error = |message: String| PulsarError::OffsetParse {
            key: role.option_key(),
            message,
        };

        let RawEntries(entries) = serde_json::from_str(trimmed).map_err(|e| {
            parse_error(format!(
                "expected 'earliest', 'latest' or a JSON object of topic to message id, got '{trimmed}': {e}"
            ))
        })?;

        // Raw duplicate keys and keys that only collide once qualified are
        // both caught by the insert below.
        let mut boundaries = BTreeMap::new();
        for (key, value) in entries {
            let topic = normalize_topic_name(&key).map_err(|e| parse_error(e.to_string()))?;
            let boundary = match &value {
                Value::String(text) => parse_boundary(text)
                    .map_err(|e| parse_error(format!("invalid value for '{key}': {e}")))?,
                other => {
                    return Err(parse_error(format!(
                        "value for '{key}' must be a string, got {other}"
                    )))
                }
            };
            if boundaries.insert(topic.clone(), boundary).is_some() {
                return Err(parse_error(format!("{topic} is specified more than once")));
            }
        }
        Ok(OffsetSpec::Specific(boundaries))
    }

    /// The boundary shared by every partition, for the keyword forms.
    pub fn uniform(&self) -> Option<MessageIdBoundary> {
        match self {
            OffsetSpec::Earliest => Some(MessageIdBoundary::Earliest),
            OffsetSpec::Latest => Some(MessageIdBoundary::Latest),
            OffsetSpec::Specific(_) => None,
        }
    }

    /// Canonical text form; accepted back by [`OffsetSpec::parse`].
    pub fn to_json(&self) -> String {
        match self {
            OffsetSpec::Earliest => "earliest".to_string(),
            OffsetSpec::Latest => "latest".to_string(),
            OffsetSpec::Specific(boundaries) => {
                let object: serde_json::Map<String, Value> = boundaries
                    .iter()
                    .map(|(topic, boundary)| (topic.clone(), Value::String(boundary.to_string())))
                    .collect();
                Value::Object(object).to_string()
            }
        }
    }

    /// Builds a per-topic spec from `(topic, boundary)` pairs.
    pub fn specific<K: AsRef<str>>(
        entries: impl IntoIterator<Item = (K, MessageIdBoundary)>,
    ) -> Result<Self> {
        let boundaries = entries
            .into_iter()
            .map(|(topic, boundary)| Ok((normalize_topic_name(topic.as_ref())?, boundary)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(OffsetSpec::Specific(boundaries))
    }
}

impl fmt::Display for OffsetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json())
    }
}

fn parse_boundary(text: &str) -> std::result::Result<MessageIdBoundary, String> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("earliest") {
        Ok(MessageIdBoundary::Earliest)
    } else if text.eq_ignore_ascii_case("latest") {
        Ok(MessageIdBoundary::Latest)
    } else {
        text.parse::<MessageId>().map(MessageIdBoundary::Explicit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: &str = "persistent://public/default/t";

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(
            OffsetSpec::parse("EARLIEST", OffsetRole::Start).unwrap(),
            OffsetSpec::Earliest
        );
        assert_eq!(
            OffsetSpec::parse(" Latest ", OffsetRole::End).unwrap(),
            OffsetSpec::Latest
        );
    }

    #[test]
    fn parses_per_topic_map() {
        let spec = OffsetSpec::parse(
            r#"{"t": "1:2:-1", "t2-partition-1": "LATEST", "acme/ns/t3": "earliest"}"#,
            OffsetRole::End,
        )
        .unwrap();
        let OffsetSpec::Specific(map) = spec else {
            panic!("expected a per-topic spec");
        };
        assert_eq!(
            map.get(T),
            Some(&MessageIdBoundary::Explicit(MessageId::new(1, 2, -1)))
        );
        assert_eq!(
            map.get("persistent://public/default/t2-partition-1"),
            Some(&MessageIdBoundary::Latest)
        );
        assert_eq!(
            map.get("persistent://acme/ns/t3"),
            Some(&MessageIdBoundary::Earliest)
        );
    }

    #[test]
    fn canonical_text_round_trips() {
        let spec = OffsetSpec::parse(
            r#"{ "t2": "earliest", "t": "5:7:-1" }"#,
            OffsetRole::Start,
        )
        .unwrap();
        let text = spec.to_json();
        assert_eq!(
            text,
            r#"{"persistent://public/default/t":"5:7:-1","persistent://public/default/t2":"earliest"}"#
        );
        let reparsed = OffsetSpec::parse(&text, OffsetRole::Start).unwrap();
        assert_eq!(reparsed, spec);
        assert_eq!(reparsed.to_json(), text);
    }

    #[test]
    fn malformed_text_is_reported() {
        let err = OffsetSpec::parse("{not json", OffsetRole::Start).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("startingOffsets"), "{msg}");

        let err = OffsetSpec::parse(r#"{"t": 5}"#, OffsetRole::End).unwrap_err();
        assert!(err.to_string().contains("must be a string"), "{err}");

        let err = OffsetSpec::parse(r#"{"t": "soon"}"#, OffsetRole::End).unwrap_err();
        assert!(err.to_string().contains("endingOffsets"), "{err}");

        let err = OffsetSpec::parse("oldest", OffsetRole::Start).unwrap_err();
        assert!(matches!(err, PulsarError::OffsetParse { .. }));
    }

    #[test]
    fn duplicate_after_normalization_is_rejected() {
        let err = OffsetSpec::parse(
            r#"{"t": "earliest", "persistent://public/default/t": "latest"}"#,
            OffsetRole::Start,
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than once"), "{err}");
    }

    #[test]
    fn repeated_key_is_rejected() {
        let err = OffsetSpec::parse(r#"{"t": "earliest", "t": "latest"}"#, OffsetRole::End)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("persistent://public/default/t is specified more than once"), "{msg}");
        assert!(msg.contains("endingOffsets"), "{msg}");
    }

    #[test]
    fn parser_does_not_enforce_direction() {
        assert_eq!(
            OffsetSpec::parse("latest", OffsetRole::Start).unwrap(),
            OffsetSpec::Latest
        );
        assert!(OffsetSpec::parse(r#"{"t": "earliest"}"#, OffsetRole::End).is_ok());
    }
}
