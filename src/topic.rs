//! Topic selection and partition enumeration.
//!
//! A table reads from exactly one [`TopicStrategy`]. The strategy is turned
//! into a set of fully-qualified topic names, and every topic into its
//! partitions, by asking the [`PulsarCatalog`].

use std::collections::BTreeSet;

use futures::future::try_join_all;
use regex::Regex;

use crate::catalog::PulsarCatalog;
use crate::config::{CaseInsensitiveOptions, TOPICS_OPTION, TOPICS_PATTERN_OPTION, TOPIC_OPTION};
use crate::error::{PulsarError, Result};
use crate::types::{TopicPartition, PARTITION_SUFFIX};

const DEFAULT_DOMAIN: &str = "persistent";
const DEFAULT_NAMESPACE: &str = "public/default";

/// How the topics of a table are chosen. Exactly one strategy per table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicStrategy {
    /// One topic, by name.
    Single(String),
    /// A fixed list of topics.
    Multi(BTreeSet<String>),
    /// Every topic whose fully-qualified name matches the regex.
    Pattern(String),
}

impl TopicStrategy {
    pub fn single(name: &str) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(PulsarError::EmptyTopicOption {
                key: TOPIC_OPTION,
                message: "No topic is specified for read",
            });
        }
        Ok(TopicStrategy::Single(normalize_topic_name(name)?))
    }

    /// Comma separated topic names. Whitespace is trimmed and duplicates are
    /// collapsed.
    pub fn multi(csv: &str) -> Result<Self> {
        let topics = csv
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(normalize_topic_name)
            .collect::<Result<BTreeSet<_>>>()?;
        if topics.is_empty() {
            return Err(PulsarError::EmptyTopicOption {
                key: TOPICS_OPTION,
                message: "No topics are specified for read",
            });
        }
        Ok(TopicStrategy::Multi(topics))
    }

    pub fn pattern(pattern: &str) -> Result<Self> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(PulsarError::EmptyTopicOption {
                key: TOPICS_PATTERN_OPTION,
                message: "Topics pattern is empty",
            });
        }
        let pattern = qualify_pattern(pattern);
        compile_pattern(&pattern)?;
        Ok(TopicStrategy::Pattern(pattern))
    }

    /// Reads the strategy from the `topic`, `topics` and `topicsPattern`
    /// options. A present but empty value is an error, not an absence.
    pub fn from_options(options: &CaseInsensitiveOptions) -> Result<Self> {
        let present: Vec<&'static str> = [TOPIC_OPTION, TOPICS_OPTION, TOPICS_PATTERN_OPTION]
            .into_iter()
            .filter(|key| options.contains(key))
            .collect();

        match present.as_slice() {
            [] => Err(PulsarError::MissingTopicOption),
            [key] => {
                let value = options.get(key).unwrap_or_default();
                match *key {
                    TOPIC_OPTION => Self::single(value),
                    TOPICS_OPTION => Self::multi(value),
                    _ => Self::pattern(value),
                }
            }
            _ => Err(PulsarError::ConflictingTopicOptions { keys: present }),
        }
    }

    /// The option key this strategy is configured with.
    pub fn option_key(&self) -> &'static str {
        match self {
            TopicStrategy::Single(_) => TOPIC_OPTION,
            TopicStrategy::Multi(_) => TOPICS_OPTION,
            TopicStrategy::Pattern(_) => TOPICS_PATTERN_OPTION,
        }
    }
}

/// Resolves `strategy` into a set of fully-qualified topic names.
///
/// Patterns are matched against the catalog's topic list as it is now; topics
/// created later are picked up by the next planning pass.
pub async fn select_topics(
    strategy: &TopicStrategy,
    catalog: &dyn PulsarCatalog,
) -> Result<BTreeSet<String>> {
    match strategy {
        TopicStrategy::Single(topic) => Ok(BTreeSet::from([topic.clone()])),
        TopicStrategy::Multi(topics) => Ok(topics.clone()),
        TopicStrategy::Pattern(pattern) => {
            let regex = compile_pattern(pattern)?;
            let topics: BTreeSet<String> = catalog
                .list_topics()
                .await?
                .iter()
                .map(|name| parent_topic(name).to_string())
                .filter(|name| regex.is_match(name))
                .collect();
            log::debug!(
                "Pattern {pattern} matched {} topic(s): {topics:?}",
                topics.len()
            );
            Ok(topics)
        }
    }
}

/// Lists the partitions of every topic. Lookups for different topics run
/// concurrently; any failure fails the whole enumeration.
pub async fn enumerate_partitions(
    topics: &BTreeSet<String>,
    catalog: &dyn PulsarCatalog,
) -> Result<Vec<TopicPartition>> {
    let per_topic = try_join_all(topics.iter().map(|topic| async move {
        let count = catalog
            .partition_count(topic)
            .await
            .map_err(|e| e.at_partition(topic))?;
        Ok::<_, PulsarError>(if count == 0 {
            vec![TopicPartition::unpartitioned(topic.clone())]
        } else {
            (0..count)
                .map(|index| TopicPartition::new(topic.clone(), Some(index)))
                .collect()
        })
    }))
    .await?;

    let mut partitions: Vec<TopicPartition> = per_topic.into_iter().flatten().collect();
    partitions.sort();
    Ok(partitions)
}

/// Expands a short topic name into its fully-qualified form:
/// `t` becomes `persistent://public/default/t` and `tenant/ns/t` becomes
/// `persistent://tenant/ns/t`.
pub fn normalize_topic_name(name: &str) -> Result<String> {
    let name = name.trim();
    let invalid = |reason: &str| PulsarError::InvalidTopicName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let (domain, path) = match name.split_once("://") {
        Some((domain, path)) => (domain, path),
        None => (DEFAULT_DOMAIN, name),
    };
    if domain != "persistent" && domain != "non-persistent" {
        return Err(invalid("domain must be 'persistent' or 'non-persistent'"));
    }

    let segments: Vec<&str> = path.split('/').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(invalid("empty name segment"));
    }
    match segments.len() {
        1 if !name.contains("://") => Ok(format!("{domain}://{DEFAULT_NAMESPACE}/{path}")),
        3 => Ok(format!("{domain}://{path}")),
        _ => Err(invalid("expected 'topic', 'tenant/namespace/topic' or a full topic url")),
    }
}

/// Strips a `-partition-N` suffix, if any.
pub fn parent_topic(name: &str) -> &str {
    match name.rfind(PARTITION_SUFFIX) {
        Some(pos)
            if !name[pos + PARTITION_SUFFIX.len()..].is_empty()
                && name[pos + PARTITION_SUFFIX.len()..]
                    .bytes()
                    .all(|b| b.is_ascii_digit()) =>
        {
            &name[..pos]
        }
        _ => name,
    }
}

fn qualify_pattern(pattern: &str) -> String {
    if pattern.contains("://") {
        pattern.to_string()
    } else if pattern.contains('/') {
        format!("{DEFAULT_DOMAIN}://(?:{pattern})")
    } else {
        format!("{DEFAULT_DOMAIN}://{DEFAULT_NAMESPACE}/(?:{pattern})")
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|source| PulsarError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}
