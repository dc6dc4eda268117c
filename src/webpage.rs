use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use typed_builder::TypedBuilder;

use crate::error::CrawlError;
use crate::parse_status::ParseStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    #[default]
    Unfetched,
    Fetched,
    Gone,
    RedirTemp,
    RedirPerm,
    Retry,
    NotModified,
}

/// A crawled page as stored under its reversed key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TypedBuilder)]
#[serde(default)]
pub struct WebPage {
    #[builder(default, setter(into))]
    pub base_url: String,
    #[builder(default)]
    pub status: CrawlStatus,
    /// Milliseconds since the epoch
    #[builder(default)]
    pub fetch_time: i64,
    #[builder(default)]
    pub prev_fetch_time: i64,
    #[builder(default)]
    pub retries_since_fetch: u32,
    /// Seconds between fetches
    #[builder(default)]
    pub fetch_interval: u32,
    #[builder(default)]
    pub score: f32,
    #[builder(default, setter(into))]
    pub title: String,
    #[builder(default, setter(into))]
    pub text: String,
    #[builder(default, setter(into, strip_option))]
    pub content_type: Option<String>,
    #[builder(default, setter(strip_option))]
    pub parse_status: Option<ParseStatus>,
    /// Target URL to anchor text
    #[builder(default)]
    pub outlinks: BTreeMap<String, String>,
    /// Source URL to anchor text
    #[builder(default)]
    pub inlinks: BTreeMap<String, String>,
    #[builder(default)]
    pub metadata: BTreeMap<String, String>,
    #[builder(default)]
    pub markers: BTreeMap<String, String>,
}

impl WebPage {
    pub fn mark_fetched(&mut self, status: CrawlStatus) {
        self.prev_fetch_time = self.fetch_time;
        self.fetch_time = Utc::now().timestamp_millis();
        self.retries_since_fetch = 0;
        self.status = status;
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        if self.fetch_time == 0 {
            return None;
        }
        Utc.timestamp_millis_opt(self.fetch_time).single()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebPageField {
    BaseUrl,
    Status,
    FetchTime,
    PrevFetchTime,
    RetriesSinceFetch,
    FetchInterval,
    Score,
    Title,
    Text,
    ContentType,
    ParseStatus,
    Outlinks,
    Inlinks,
    Metadata,
    Markers,
}

impl WebPageField {
    pub const ALL: [WebPageField; 15] = [
        WebPageField::BaseUrl,
        WebPageField::Status,
        WebPageField::FetchTime,
        WebPageField::PrevFetchTime,
        WebPageField::RetriesSinceFetch,
        WebPageField::FetchInterval,
        WebPageField::Score,
        WebPageField::Title,
        WebPageField::Text,
        WebPageField::ContentType,
        WebPageField::ParseStatus,
        WebPageField::Outlinks,
        WebPageField::Inlinks,
        WebPageField::Metadata,
        WebPageField::Markers,
    ];

    /// Name of the field in the stored record.
    pub fn name(self) -> &'static str {
        match self {
            WebPageField::BaseUrl => "base_url",
            WebPageField::Status => "status",
            WebPageField::FetchTime => "fetch_time",
            WebPageField::PrevFetchTime => "prev_fetch_time",
            WebPageField::RetriesSinceFetch => "retries_since_fetch",
            WebPageField::FetchInterval => "fetch_interval",
            WebPageField::Score => "score",
            WebPageField::Title => "title",
            WebPageField::Text => "text",
            WebPageField::ContentType => "content_type",
            WebPageField::ParseStatus => "parse_status",
            WebPageField::Outlinks => "outlinks",
            WebPageField::Inlinks => "inlinks",
            WebPageField::Metadata => "metadata",
            WebPageField::Markers => "markers",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.name() == name)
    }
}

pub fn fields_to_names(fields: impl IntoIterator<Item = WebPageField>) -> Vec<&'static str> {
    fields.into_iter().map(WebPageField::name).collect()
}

/// The requested subset of a stored page's fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectedPage(Map<String, Value>);

impl ProjectedPage {
    /// Keeps only `fields`; an empty list keeps everything.
    pub fn from_record(bytes: &[u8], fields: &[WebPageField]) -> Result<Self, CrawlError> {
        let mut record: Map<String, Value> = serde_json::from_slice(bytes)
            .map_err(|e| CrawlError::DeserializationFailed(format!("Invalid page record: {}", e)))?;

        if !fields.is_empty() {
            record.retain(|name, _| fields.iter().any(|field| field.name() == name));
        }

        Ok(Self(record))
    }

    pub fn get(&self, field: WebPageField) -> Option<&Value> {
        self.0.get(field.name())
    }

    pub fn contains(&self, field: WebPageField) -> bool {
        self.0.contains_key(field.name())
    }

    pub fn fields(&self) -> Vec<WebPageField> {
        self.0
            .keys()
            .filter_map(|name| WebPageField::from_name(name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fills every field that was not loaded with its default.
    pub fn into_page(self) -> Result<WebPage, CrawlError> {
        serde_json::from_value(Value::Object(self.0))
            .map_err(|e| CrawlError::DeserializationFailed(format!("Invalid page record: {}", e)))
    }
}

pub(crate) fn encode_page(page: &WebPage) -> Result<Vec<u8>, CrawlError> {
    // JSON has no NaN or infinity; serde_json would write null
    if !page.score.is_finite() {
        return Err(CrawlError::SerializationFailed(format!(
            "Score of '{}' is not finite: {}",
            page.base_url, page.score
        )));
    }
    serde_json::to_vec(page).map_err(|e| CrawlError::SerializationFailed(e.to_string()))
}

pub(crate) fn decode_page(bytes: &[u8]) -> Result<WebPage, CrawlError> {
    serde_json::from_slice(bytes)
        .map_err(|e| CrawlError::DeserializationFailed(format!("Invalid page record: {}", e)))
}
