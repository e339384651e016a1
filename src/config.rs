//! Table options for a Pulsar scan.
//!
//! Options arrive as a string map (from `CREATE EXTERNAL TABLE ... OPTIONS`
//! or built by hand) and are validated eagerly into [`PulsarOptions`], so
//! that every configuration error surfaces before any broker I/O.

use std::collections::HashMap;

use crate::error::{PulsarError, Result};
use crate::offsets::{OffsetRole, OffsetSpec};
use crate::topic::TopicStrategy;

pub const SERVICE_URL_OPTION: &str = "service.url";
pub const ADMIN_URL_OPTION: &str = "admin.url";
pub const TOPIC_OPTION: &str = "topic";
pub const TOPICS_OPTION: &str = "topics";
pub const TOPICS_PATTERN_OPTION: &str = "topicsPattern";
pub const STARTING_OFFSETS_OPTION: &str = "startingOffsets";
pub const ENDING_OFFSETS_OPTION: &str = "endingOffsets";
pub const FAIL_ON_DATA_LOSS_OPTION: &str = "failOnDataLoss";
pub const READ_CONCURRENCY_OPTION: &str = "readConcurrency";

pub const DEFAULT_READ_CONCURRENCY: usize = 4;

const KNOWN_OPTIONS: [&str; 9] = [
    SERVICE_URL_OPTION,
    ADMIN_URL_OPTION,
    TOPIC_OPTION,
    TOPICS_OPTION,
    TOPICS_PATTERN_OPTION,
    STARTING_OFFSETS_OPTION,
    ENDING_OFFSETS_OPTION,
    FAIL_ON_DATA_LOSS_OPTION,
    READ_CONCURRENCY_OPTION,
];

/// Option map with case-insensitive keys.
#[derive(Debug, Clone, Default)]
pub struct CaseInsensitiveOptions {
    inner: HashMap<String, String>,
}

impl CaseInsensitiveOptions {
    pub fn new<K, V>(options: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let inner = options
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
            .collect();
        Self { inner }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(&key.to_ascii_lowercase())
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.inner.insert(key.to_ascii_lowercase(), value.into());
    }

    fn unknown_keys(&self) -> impl Iterator<Item = &str> {
        self.inner.keys().map(String::as_str).filter(|key| {
            !KNOWN_OPTIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(key))
        })
    }
}

/// Validated options of one Pulsar table.
#[derive(Debug, Clone, PartialEq)]
pub struct PulsarOptions {
    pub service_url: String,
    pub admin_url: Option<String>,
    pub topics: TopicStrategy,
    pub starting_offsets: OffsetSpec,
    pub ending_offsets: OffsetSpec,
    /// When false, an explicit start id that is no longer retained is moved
    /// up to the earliest retained message instead of failing the scan.
    pub fail_on_data_loss: bool,
    /// Upper bound on concurrent partition reads during one scan.
    pub read_concurrency: usize,
}

impl PulsarOptions {
    /// Builds options for `topics` with default offsets.
    pub fn new(service_url: impl Into<String>, topics: TopicStrategy) -> Self {
        Self {
            service_url: service_url.into(),
            admin_url: None,
            topics,
            starting_offsets: OffsetSpec::Earliest,
            ending_offsets: OffsetSpec::Latest,
            fail_on_data_loss: true,
            read_concurrency: DEFAULT_READ_CONCURRENCY,
        }
    }

    pub fn with_starting_offsets(mut self, spec: OffsetSpec) -> Self {
        self.starting_offsets = spec;
        self
    }

    pub fn with_ending_offsets(mut self, spec: OffsetSpec) -> Self {
        self.ending_offsets = spec;
        self
    }

    pub fn with_fail_on_data_loss(mut self, fail_on_data_loss: bool) -> Self {
        self.fail_on_data_loss = fail_on_data_loss;
        self
    }

    /// Parses and validates a raw option map.
    pub fn from_options<K, V>(options: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        Self::from_case_insensitive(&CaseInsensitiveOptions::new(options))
    }

    pub fn from_case_insensitive(options: &CaseInsensitiveOptions) -> Result<Self> {
        for key in options.unknown_keys() {
            log::debug!("Ignoring unrecognized Pulsar option '{key}'");
        }

        let service_url = options
            .get(SERVICE_URL_OPTION)
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| PulsarError::InvalidOption {
                key: SERVICE_URL_OPTION.to_string(),
                message: "a broker service url must be specified".to_string(),
            })?
            .to_string();
        let admin_url = options
            .get(ADMIN_URL_OPTION)
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string);

        let topics = TopicStrategy::from_options(options)?;

        let starting_offsets = match options.get(STARTING_OFFSETS_OPTION) {
            Some(raw) => OffsetSpec::parse(raw, OffsetRole::Start)?,
            None => OffsetRole::Start.default_spec(),
        };
        let ending_offsets = match options.get(ENDING_OFFSETS_OPTION) {
            Some(raw) => OffsetSpec::parse(raw, OffsetRole::End)?,
            None => OffsetRole::End.default_spec(),
        };

        let fail_on_data_loss = match options.get(FAIL_ON_DATA_LOSS_OPTION) {
            Some(raw) => parse_bool(FAIL_ON_DATA_LOSS_OPTION, raw)?,
            None => true,
        };
        let read_concurrency = match options.get(READ_CONCURRENCY_OPTION) {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| PulsarError::InvalidOption {
                    key: READ_CONCURRENCY_OPTION.to_string(),
                    message: format!("expected a positive integer but got '{raw}'"),
                })?,
            None => DEFAULT_READ_CONCURRENCY,
        };

        Ok(Self {
            service_url,
            admin_url,
            topics,
            starting_offsets,
            ending_offsets,
            fail_on_data_loss,
            read_concurrency,
        })
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(PulsarError::InvalidOption {
            key: key.to_string(),
            message: format!("expected 'true' or 'false' but got '{raw}'"),
        }),
    }
}
