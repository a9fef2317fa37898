//! Core article model, provider record shape and normalization for NewsRAG.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

pub const CRATE_NAME: &str = "newsrag-core";

/// Categories ingested when a caller does not name any.
pub const DEFAULT_CATEGORIES: [&str; 3] = ["technology", "science", "business"];

/// `retrievedAt` layout: ISO-8601, microsecond precision, no zone suffix.
const RETRIEVED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Used instead when the microsecond part is zero.
const RETRIEVED_AT_WHOLE_SECOND_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn default_categories() -> Vec<String> {
    DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect()
}

/// Canonical article as returned to callers and written to the document store.
///
/// Provider-sourced fields are passthroughs: a field the provider omitted stays
/// `None` and serializes as `null`. `category` and `retrieved_at` are always set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub url: Option<String>,
    pub image: Option<String>,
    pub published_at: Option<String>,
    pub source: Option<String>,
    pub category: String,
    pub retrieved_at: String,
}

impl Article {
    /// Storage key for this article, `None` when it has no URL and must not be persisted.
    /// An empty URL counts as no URL.
    pub fn document_id(&self) -> Option<String> {
        self.url
            .as_deref()
            .filter(|url| !url.is_empty())
            .map(derive_document_id)
    }
}

/// Nested `source` object of a provider record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSource {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: Option<String>,
}

/// Article record as the headlines provider returns it.
///
/// Every field is optional. A missing key, an explicit `null` and a value of the
/// wrong JSON type all decode to `None`; decoding only fails when the record
/// itself is not a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawArticle {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub published_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_source")]
    pub source: Option<RawSource>,
}

impl RawArticle {
    pub fn from_value(value: JsonValue) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match value {
        Some(JsonValue::String(s)) => Some(s),
        _ => None,
    })
}

fn lenient_source<'de, D>(deserializer: D) -> Result<Option<RawSource>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match value {
        Some(obj @ JsonValue::Object(_)) => serde_json::from_value(obj).ok(),
        _ => None,
    })
}

pub fn format_retrieved_at(now: DateTime<Utc>) -> String {
    let format = if now.timestamp_subsec_micros() == 0 {
        RETRIEVED_AT_WHOLE_SECOND_FORMAT
    } else {
        RETRIEVED_AT_FORMAT
    };
    now.naive_utc().format(format).to_string()
}

/// Map a provider record onto the canonical article shape.
pub fn normalize_article(raw: RawArticle, category: &str, now: DateTime<Utc>) -> Article {
    Article {
        title: raw.title,
        description: raw.description,
        content: raw.content,
        url: raw.url,
        image: raw.image,
        published_at: raw.published_at,
        source: raw.source.and_then(|s| s.name),
        category: category.to_string(),
        retrieved_at: format_retrieved_at(now),
    }
}

/// Document id for an article URL: the `://` separator collapses to one `_`
/// and every other `/` becomes `_`.
pub fn derive_document_id(url: &str) -> String {
    url.replacen("://", "/", 1).replace('/', "_")
}
