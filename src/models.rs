//! Canonical data models for collected ads.
//!
//! Records are constructed by the response normalizer and immutable
//! thereafter. All types serialize with `serde` for the export writers.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AdLibraryError;

// ---------------------------------------------------------------------------
// Enumerated search parameters
// ---------------------------------------------------------------------------

/// Ad category requested from the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AdType {
    #[default]
    All,
    PoliticalAndIssue,
    Housing,
    Employment,
    Credit,
}

impl AdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::PoliticalAndIssue => "POLITICAL_AND_ISSUE_ADS",
            Self::Housing => "HOUSING_ADS",
            Self::Employment => "EMPLOYMENT_ADS",
            Self::Credit => "CREDIT_ADS",
        }
    }

    /// URL-friendly form used in the landing page referer.
    pub fn as_url_param(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::PoliticalAndIssue => "political_and_issue_ads",
            Self::Housing => "housing",
            Self::Employment => "employment",
            Self::Credit => "credit",
        }
    }

    pub const ALLOWED: &'static [&'static str] = &[
        "ALL",
        "POLITICAL_AND_ISSUE_ADS",
        "HOUSING_ADS",
        "EMPLOYMENT_ADS",
        "CREDIT_ADS",
    ];

    pub fn parse(value: &str) -> crate::error::Result<Self> {
        match value {
            "ALL" => Ok(Self::All),
            "POLITICAL_AND_ISSUE_ADS" => Ok(Self::PoliticalAndIssue),
            "HOUSING_ADS" => Ok(Self::Housing),
            "EMPLOYMENT_ADS" => Ok(Self::Employment),
            "CREDIT_ADS" => Ok(Self::Credit),
            _ => Err(AdLibraryError::InvalidParameter {
                field: "ad_type",
                value: value.to_string(),
                allowed: Self::ALLOWED.join(", "),
            }),
        }
    }
}

/// Active status filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AdStatus {
    #[default]
    Active,
    Inactive,
    All,
}

impl AdStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::All => "ALL",
        }
    }

    pub const ALLOWED: &'static [&'static str] = &["ACTIVE", "INACTIVE", "ALL"];

    pub fn parse(value: &str) -> crate::error::Result<Self> {
        match value {
            "ACTIVE" => Ok(Self::Active),
            "INACTIVE" => Ok(Self::Inactive),
            "ALL" => Ok(Self::All),
            _ => Err(AdLibraryError::InvalidParameter {
                field: "status",
                value: value.to_string(),
                allowed: Self::ALLOWED.join(", "),
            }),
        }
    }
}

/// How the query string is interpreted by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SearchType {
    #[default]
    KeywordExactPhrase,
    KeywordUnordered,
    Page,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeywordExactPhrase => "KEYWORD_EXACT_PHRASE",
            Self::KeywordUnordered => "KEYWORD_UNORDERED",
            Self::Page => "PAGE",
        }
    }

    pub const ALLOWED: &'static [&'static str] =
        &["KEYWORD_EXACT_PHRASE", "KEYWORD_UNORDERED", "PAGE"];

    pub fn parse(value: &str) -> crate::error::Result<Self> {
        match value {
            "KEYWORD_EXACT_PHRASE" => Ok(Self::KeywordExactPhrase),
            "KEYWORD_UNORDERED" => Ok(Self::KeywordUnordered),
            "PAGE" => Ok(Self::Page),
            _ => Err(AdLibraryError::InvalidParameter {
                field: "search_type",
                value: value.to_string(),
                allowed: Self::ALLOWED.join(", "),
            }),
        }
    }
}

/// Server-side sort order. Only the impression sort has a wire form; any
/// other mode string makes the remote reject the variables object, so
/// relevancy is expressed by omitting `sortData` entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SortMode {
    #[default]
    TotalImpressions,
    Relevancy,
}

impl SortMode {
    /// The `sortData.mode` value, or `None` when the field is omitted.
    pub fn wire_value(&self) -> Option<&'static str> {
        match self {
            Self::TotalImpressions => Some("SORT_BY_TOTAL_IMPRESSIONS"),
            Self::Relevancy => None,
        }
    }
}

/// Media type filter understood by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MediaType {
    #[default]
    All,
    Image,
    Video,
    Meme,
    None,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Image => "IMAGE",
            Self::Video => "VIDEO",
            Self::Meme => "MEME",
            Self::None => "NONE",
        }
    }
}

// ---------------------------------------------------------------------------
// Range parsing
// ---------------------------------------------------------------------------

static AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\d,.]+[KMBkmb]?").expect("amount regex"));

/// Extract numeric amounts from a range string, applying `K`/`M`/`B`
/// thousands suffixes. `"$9K-$10K"` yields `[9000, 10000]`.
fn parse_amounts(text: &str) -> Vec<i64> {
    let mut values = Vec::new();
    for m in AMOUNT_RE.find_iter(text) {
        let part = m.as_str();
        let (num_str, multiplier) = match part.chars().last() {
            Some('K') | Some('k') => (&part[..part.len() - 1], 1_000f64),
            Some('M') | Some('m') => (&part[..part.len() - 1], 1_000_000f64),
            Some('B') | Some('b') => (&part[..part.len() - 1], 1_000_000_000f64),
            _ => (part, 1f64),
        };
        if let Ok(num) = num_str.replace(',', "").parse::<f64>() {
            values.push((num * multiplier) as i64);
        }
    }
    values
}

/// Parse an impression-style range string. `">1M"` means at least one
/// million, so a single amount becomes `(lower, None)`.
pub fn parse_count_text(text: &str) -> (Option<i64>, Option<i64>) {
    let values = parse_amounts(text);
    match values.as_slice() {
        [lower, upper, ..] => (Some(*lower), Some(*upper)),
        [only] => (Some(*only), None),
        [] => (None, None),
    }
}

/// Parse a spend-style range string like `"$9K-$10K"`. A single amount is
/// treated as an exact value `(v, v)`.
///
/// TODO: amounts with trailing currency codes ("9K-10K USD") and
/// non-prefix currency symbols are not recognized; only the leading-symbol
/// forms observed in live responses are handled.
pub fn parse_spend_text(text: &str) -> (Option<i64>, Option<i64>) {
    let values = parse_amounts(text);
    match values.as_slice() {
        [lower, upper, ..] => (Some(*lower), Some(*upper)),
        [only] => (Some(*only), Some(*only)),
        [] => (None, None),
    }
}

// ---------------------------------------------------------------------------
// Record components
// ---------------------------------------------------------------------------

/// Inclusive spend range the remote returns in lieu of exact figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SpendRange {
    pub lower_bound: Option<i64>,
    pub upper_bound: Option<i64>,
    pub currency: Option<String>,
}

/// Inclusive count range (impressions, reach).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CountRange {
    pub lower_bound: Option<i64>,
    pub upper_bound: Option<i64>,
}

/// One demographic or regional distribution bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudienceSlice {
    pub category: String,
    pub percentage: f64,
}

/// One creative variant of an ad: text, media, and link data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AdCreative {
    pub body: Option<String>,
    pub caption: Option<String>,
    pub description: Option<String>,
    pub title: Option<String>,
    pub link_url: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub video_hd_url: Option<String>,
    pub video_sd_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub cta_text: Option<String>,
    pub cta_type: Option<String>,
}

impl AdCreative {
    pub fn has_video(&self) -> bool {
        self.video_url.is_some() || self.video_hd_url.is_some() || self.video_sd_url.is_some()
    }

    pub fn has_image(&self) -> bool {
        self.image_url.is_some() || self.thumbnail_url.is_some()
    }
}

/// The page running an ad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PageDescriptor {
    pub id: String,
    pub name: String,
    pub profile_picture_url: Option<String>,
    pub page_url: Option<String>,
    pub likes: Option<i64>,
    pub verified: bool,
}

/// A lightweight page summary from the typeahead endpoint, used to resolve
/// a page name to the numeric id accepted by the search query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PageSearchResult {
    pub page_id: String,
    pub page_name: String,
    pub page_profile_uri: Option<String>,
    pub page_alias: Option<String>,
    pub page_logo_url: Option<String>,
    pub page_verified: Option<bool>,
    pub page_like_count: Option<i64>,
    pub category: Option<String>,
}

// ---------------------------------------------------------------------------
// Ad record
// ---------------------------------------------------------------------------

/// Canonical ad record.
///
/// Captures the full data available from the remote search endpoint:
/// creative content, delivery window, performance ranges, audience
/// distributions, and compliance fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ad {
    /// Ad archive id, unique within the remote service.
    pub id: String,
    pub ad_library_id: Option<String>,

    pub page: Option<PageDescriptor>,

    /// `None` when activity is unknown from search results.
    pub is_active: Option<bool>,
    pub ad_status: Option<String>,
    pub delivery_start_time: Option<DateTime<Utc>>,
    pub delivery_stop_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub creatives: Vec<AdCreative>,

    pub snapshot_url: Option<String>,
    pub ad_snapshot_url: Option<String>,

    pub impressions: Option<CountRange>,
    pub spend: Option<SpendRange>,
    pub reach: Option<CountRange>,
    pub currency: Option<String>,

    #[serde(default)]
    pub age_gender_distribution: Vec<AudienceSlice>,
    #[serde(default)]
    pub region_distribution: Vec<AudienceSlice>,

    #[serde(default)]
    pub publisher_platforms: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,

    #[serde(default)]
    pub bylines: Vec<String>,
    pub funding_entity: Option<String>,
    pub disclaimer: Option<String>,

    pub ad_type: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,

    #[serde(default)]
    pub beneficiary_payers: Vec<String>,

    pub collation_id: Option<String>,
    pub collation_count: Option<i64>,

    pub collected_at: DateTime<Utc>,
    pub collection_source: String,

    /// Raw response record, kept for debugging and the opt-in raw export.
    /// Transient: excluded from serialization.
    #[serde(skip)]
    pub raw: Option<Value>,
}

impl Ad {
    /// Whether any creative carries a video URL.
    pub fn has_video(&self) -> bool {
        if self.creatives.iter().any(AdCreative::has_video) {
            return true;
        }
        self.raw
            .as_ref()
            .and_then(|r| r.get("videos"))
            .and_then(Value::as_array)
            .is_some_and(|v| !v.is_empty())
    }

    /// Whether any creative carries an image URL.
    pub fn has_image(&self) -> bool {
        if self.creatives.iter().any(AdCreative::has_image) {
            return true;
        }
        self.raw
            .as_ref()
            .and_then(|r| r.get("images"))
            .and_then(Value::as_array)
            .is_some_and(|v| !v.is_empty())
    }

    /// Serialize to a JSON value, optionally attaching the raw record.
    pub fn to_json(&self, include_raw: bool) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if include_raw {
            if let (Some(obj), Some(raw)) = (value.as_object_mut(), self.raw.as_ref()) {
                obj.insert("raw".to_string(), raw.clone());
            }
        }
        value
    }
}
