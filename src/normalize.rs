//! Response normalizer: canonical `Ad` records from raw GraphQL payloads.
//!
//! The remote service emits records in several schema dialects at once:
//! snake_case and camelCase keys, creative content as a `cards` array or as
//! flat fields or as parallel `ad_creative_*` arrays, timestamps as ISO-8601
//! strings or Unix integers, and numeric ranges as structured objects,
//! range-strings, or scalars. Each field is resolved through a declared
//! alias list tried in order; the first non-null match wins, and any value
//! with an unexpected shape simply leaves the output field absent.
//!
//! Normalization is total: any input carrying an identifier produces a
//! record; anything without one produces nothing.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use crate::models::{
    parse_count_text, parse_spend_text, Ad, AdCreative, AudienceSlice, CountRange,
    PageDescriptor, PageSearchResult, SpendRange,
};

// ---------------------------------------------------------------------------
// Alias tables
// ---------------------------------------------------------------------------

const ID_ALIASES: &[&str] = &["id", "adArchiveID", "ad_archive_id"];
const LIBRARY_ID_ALIASES: &[&str] = &["adLibraryID", "ad_library_id"];
const START_TIME_ALIASES: &[&str] = &["ad_delivery_start_time", "startDate", "start_date"];
const STOP_TIME_ALIASES: &[&str] = &["ad_delivery_stop_time", "endDate", "end_date"];
const IMPRESSIONS_ALIASES: &[&str] = &["impressions", "impressionsWithIndex", "impressions_with_index"];
const SPEND_ALIASES: &[&str] = &["spend", "spendWithIndex"];
const REACH_ALIASES: &[&str] = &["reach", "reach_estimate"];
const PLATFORM_ALIASES: &[&str] = &["publisher_platforms", "publisherPlatforms", "publisher_platform"];
const STATUS_ALIASES: &[&str] = &["ad_status", "adStatus"];
const SNAPSHOT_URL_ALIASES: &[&str] = &["snapshot_url", "snapshotUrl"];
const AD_SNAPSHOT_URL_ALIASES: &[&str] = &["ad_snapshot_url", "adSnapshotUrl"];
const FUNDING_ALIASES: &[&str] = &["funding_entity", "fundingEntity"];
const AD_TYPE_ALIASES: &[&str] = &["ad_type", "adType"];
const COLLATION_ID_ALIASES: &[&str] = &["collation_id", "collationID"];
const COLLATION_COUNT_ALIASES: &[&str] = &["collation_count", "collationCount"];
const BENEFICIARY_ALIASES: &[&str] = &["beneficiary_payers", "beneficiaryPayers"];
const DEMO_ALIASES: &[&str] = &["demographic_distribution", "demographicDistribution"];
const REGION_ALIASES: &[&str] = &["delivery_by_region", "deliveryByRegion"];
const LOWER_ALIASES: &[&str] = &["lower_bound", "lowerBound"];
const UPPER_ALIASES: &[&str] = &["upper_bound", "upperBound"];

// ---------------------------------------------------------------------------
// Guarded accessors
// ---------------------------------------------------------------------------

/// First alias whose value is present and non-null.
fn alias<'a>(data: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| data.get(k))
        .find(|v| !v.is_null())
}

/// First alias resolving to a non-empty string.
fn alias_str(data: &Value, keys: &[&str]) -> Option<String> {
    alias(data, keys)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// First alias resolving to an integer.
fn alias_i64(data: &Value, keys: &[&str]) -> Option<i64> {
    alias(data, keys).and_then(Value::as_i64)
}

/// String from a value that may be a JSON string or number.
fn stringish(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn str_field(data: &Value, key: &str) -> Option<String> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Body content appears either as a plain string or as `{"text": "..."}`.
fn body_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// Timestamps arrive as Unix integers or ISO-8601 strings (sometimes
/// date-only).
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => DateTime::from_timestamp(n.as_i64()?, 0),
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|ndt| ndt.and_utc())
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Field parsers
// ---------------------------------------------------------------------------

fn parse_count_range(value: &Value) -> Option<CountRange> {
    match value {
        Value::String(s) => {
            let (lower, upper) = parse_count_text(s);
            Some(CountRange {
                lower_bound: lower,
                upper_bound: upper,
            })
        }
        Value::Object(_) => {
            let mut lower = alias_i64(value, LOWER_ALIASES);
            let mut upper = alias_i64(value, UPPER_ALIASES);
            if lower.is_none() && upper.is_none() {
                // Alternative shape: {"impressions_text": ">1M", ...}
                if let Some(text) = alias_str(value, &["impressions_text", "impressionsText"]) {
                    let (l, u) = parse_count_text(&text);
                    lower = l;
                    upper = u;
                }
            }
            if lower.is_none() && upper.is_none() {
                return None;
            }
            Some(CountRange {
                lower_bound: lower,
                upper_bound: upper,
            })
        }
        Value::Number(n) => Some(CountRange {
            lower_bound: n.as_i64(),
            upper_bound: n.as_i64(),
        }),
        _ => None,
    }
}

fn parse_spend_range(value: &Value, currency: Option<&str>) -> Option<SpendRange> {
    let currency = currency.map(str::to_string);
    match value {
        Value::String(s) => {
            let (lower, upper) = parse_spend_text(s);
            Some(SpendRange {
                lower_bound: lower,
                upper_bound: upper,
                currency,
            })
        }
        Value::Object(_) => {
            let lower = alias_i64(value, LOWER_ALIASES);
            let upper = alias_i64(value, UPPER_ALIASES);
            if lower.is_none() && upper.is_none() {
                return None;
            }
            Some(SpendRange {
                lower_bound: lower,
                upper_bound: upper,
                currency,
            })
        }
        Value::Number(n) => Some(SpendRange {
            lower_bound: n.as_i64(),
            upper_bound: n.as_i64(),
            currency,
        }),
        _ => None,
    }
}

fn parse_page(data: &Value) -> Option<PageDescriptor> {
    // Nested page object, or flat fields at the record's top level.
    if let Some(page) = alias(data, &["page", "pageInfo"]).filter(|v| v.is_object()) {
        return Some(PageDescriptor {
            id: page
                .get("id")
                .and_then(stringish)
                .unwrap_or_default(),
            name: str_field(page, "name").unwrap_or_default(),
            profile_picture_url: page
                .get("profile_picture")
                .and_then(|p| p.get("uri"))
                .and_then(Value::as_str)
                .map(str::to_string),
            page_url: str_field(page, "url"),
            likes: page.get("likes").and_then(Value::as_i64),
            verified: page
                .get("is_verified")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        });
    }

    Some(PageDescriptor {
        id: data.get("page_id").and_then(stringish).unwrap_or_default(),
        name: str_field(data, "page_name").unwrap_or_default(),
        profile_picture_url: str_field(data, "page_profile_picture_url"),
        page_url: str_field(data, "page_profile_uri"),
        likes: data.get("page_like_count").and_then(Value::as_i64),
        verified: data
            .get("page_is_verified")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

fn creative_from_card(card: &Value, record: &Value) -> AdCreative {
    AdCreative {
        body: body_text(card.get("body")),
        caption: str_field(card, "caption").or_else(|| str_field(record, "caption")),
        description: str_field(card, "link_description"),
        title: str_field(card, "title"),
        link_url: str_field(card, "link_url"),
        image_url: str_field(card, "resized_image_url")
            .or_else(|| str_field(card, "original_image_url")),
        video_url: str_field(card, "video_hd_url").or_else(|| str_field(card, "video_sd_url")),
        video_hd_url: str_field(card, "video_hd_url"),
        video_sd_url: str_field(card, "video_sd_url"),
        thumbnail_url: str_field(card, "video_preview_image_url"),
        cta_text: str_field(card, "cta_text").or_else(|| str_field(record, "cta_text")),
        cta_type: str_field(card, "cta_type"),
    }
}

fn parse_creatives(data: &Value) -> Vec<AdCreative> {
    // Cards dialect: carousel ads and older responses.
    if let Some(cards) = data.get("cards").and_then(Value::as_array) {
        if !cards.is_empty() {
            return cards.iter().map(|c| creative_from_card(c, data)).collect();
        }
    }

    // Live flat dialect: body/title/videos/images directly on the record.
    let has_flat = ["body", "title", "videos", "images"]
        .iter()
        .any(|k| data.get(k).is_some_and(|v| !v.is_null()));
    if has_flat {
        let first_video = data
            .get("videos")
            .and_then(Value::as_array)
            .and_then(|v| v.first());
        let first_image = data
            .get("images")
            .and_then(Value::as_array)
            .and_then(|v| v.first());

        let video_hd = first_video.and_then(|v| str_field(v, "video_hd_url"));
        let video_sd = first_video.and_then(|v| str_field(v, "video_sd_url"));

        return vec![AdCreative {
            body: body_text(data.get("body")),
            caption: str_field(data, "caption"),
            description: str_field(data, "link_description"),
            title: str_field(data, "title"),
            link_url: str_field(data, "link_url"),
            image_url: first_image
                .and_then(|v| str_field(v, "original_image_url"))
                .or_else(|| first_image.and_then(|v| str_field(v, "resized_image_url"))),
            video_url: video_hd.clone().or_else(|| video_sd.clone()),
            video_hd_url: video_hd,
            video_sd_url: video_sd,
            thumbnail_url: first_video.and_then(|v| str_field(v, "video_preview_image_url")),
            cta_text: str_field(data, "cta_text"),
            cta_type: str_field(data, "cta_type"),
        }];
    }

    // Legacy dialect: parallel ad_creative_* arrays plus snapshot.cards
    // media overlay.
    let string_array = |keys: &[&str]| -> Vec<Option<String>> {
        alias(data, keys)
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    };

    let bodies = string_array(&["ad_creative_bodies", "adCreativeBodies"]);
    let captions = string_array(&["ad_creative_link_captions", "adCreativeLinkCaptions"]);
    let descriptions =
        string_array(&["ad_creative_link_descriptions", "adCreativeLinkDescriptions"]);
    let titles = string_array(&["ad_creative_link_titles", "adCreativeLinkTitles"]);

    let count = bodies.len().max(titles.len()).max(1);
    let mut creatives: Vec<AdCreative> = (0..count)
        .map(|i| AdCreative {
            body: bodies.get(i).cloned().flatten(),
            caption: captions.get(i).cloned().flatten(),
            description: descriptions.get(i).cloned().flatten(),
            title: titles.get(i).cloned().flatten(),
            ..AdCreative::default()
        })
        .collect();

    if let Some(snap_cards) = data
        .get("snapshot")
        .and_then(|s| s.get("cards"))
        .and_then(Value::as_array)
    {
        for (creative, card) in creatives.iter_mut().zip(snap_cards) {
            creative.image_url = str_field(card, "resized_image_url")
                .or_else(|| str_field(card, "original_image_url"));
            creative.video_url =
                str_field(card, "video_hd_url").or_else(|| str_field(card, "video_sd_url"));
            creative.video_hd_url = str_field(card, "video_hd_url");
            creative.video_sd_url = str_field(card, "video_sd_url");
            creative.link_url = str_field(card, "link_url");
            creative.cta_text = str_field(card, "cta_text");
            creative.cta_type = str_field(card, "cta_type");
        }
    }

    creatives
}

fn parse_distribution(data: &Value, keys: &[&str], kind: DistributionKind) -> Vec<AudienceSlice> {
    let Some(items) = alias(data, keys).and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter(|item| item.is_object())
        .map(|item| {
            let category = match kind {
                DistributionKind::AgeGender => format!(
                    "{}_{}",
                    str_field(item, "age").unwrap_or_else(|| "unknown".into()),
                    str_field(item, "gender").unwrap_or_else(|| "unknown".into()),
                ),
                DistributionKind::Region => {
                    str_field(item, "region").unwrap_or_else(|| "unknown".into())
                }
            };
            AudienceSlice {
                category,
                percentage: item
                    .get("percentage")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0),
            }
        })
        .collect()
}

#[derive(Clone, Copy)]
enum DistributionKind {
    AgeGender,
    Region,
}

/// Singular and plural platform aliases collapse into one list; a bare
/// string becomes a single-element list.
fn parse_platforms(data: &Value) -> Vec<String> {
    match alias(data, PLATFORM_ALIASES) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn string_list(data: &Value, keys: &[&str]) -> Vec<String> {
    alias(data, keys)
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Normalize one raw record into a canonical [`Ad`].
///
/// Returns `None` when the record carries no usable identifier.
pub fn normalize_ad(data: &Value) -> Option<Ad> {
    let id = alias(data, ID_ALIASES).and_then(stringish)?;

    let currency = str_field(data, "currency");

    let is_active = alias(data, &["is_active", "isActive"])
        .and_then(Value::as_bool)
        .or_else(|| alias_str(data, STATUS_ALIASES).map(|s| s == "ACTIVE"));

    let page_categories = string_list(data, &["page_categories", "pageCategories"]);
    let categories = {
        let own = string_list(data, &["categories"]);
        if own.is_empty() {
            page_categories
        } else {
            own
        }
    };

    Some(Ad {
        id,
        ad_library_id: alias_str(data, LIBRARY_ID_ALIASES),
        page: parse_page(data),
        is_active,
        ad_status: alias_str(data, STATUS_ALIASES),
        delivery_start_time: alias(data, START_TIME_ALIASES).and_then(parse_timestamp),
        delivery_stop_time: alias(data, STOP_TIME_ALIASES).and_then(parse_timestamp),
        creatives: parse_creatives(data),
        snapshot_url: alias_str(data, SNAPSHOT_URL_ALIASES),
        ad_snapshot_url: alias_str(data, AD_SNAPSHOT_URL_ALIASES),
        impressions: alias(data, IMPRESSIONS_ALIASES).and_then(parse_count_range),
        spend: alias(data, SPEND_ALIASES)
            .and_then(|v| parse_spend_range(v, currency.as_deref())),
        reach: alias(data, REACH_ALIASES).and_then(parse_count_range),
        currency,
        age_gender_distribution: parse_distribution(data, DEMO_ALIASES, DistributionKind::AgeGender),
        region_distribution: parse_distribution(data, REGION_ALIASES, DistributionKind::Region),
        publisher_platforms: parse_platforms(data),
        languages: string_list(data, &["languages"]),
        bylines: string_list(data, &["bylines"]),
        funding_entity: alias_str(data, FUNDING_ALIASES),
        disclaimer: str_field(data, "disclaimer"),
        ad_type: alias_str(data, AD_TYPE_ALIASES),
        categories,
        beneficiary_payers: string_list(data, BENEFICIARY_ALIASES),
        collation_id: alias(data, COLLATION_ID_ALIASES).and_then(stringish),
        collation_count: alias_i64(data, COLLATION_COUNT_ALIASES),
        collected_at: Utc::now(),
        collection_source: "ad_library".to_string(),
        raw: Some(data.clone()),
    })
}

/// Normalize one typeahead suggestion into a [`PageSearchResult`].
///
/// Returns `None` when the suggestion has no page id.
pub fn normalize_page_result(item: &Value) -> Option<PageSearchResult> {
    let page_id = alias(item, &["page_id", "pageID"]).and_then(stringish)?;

    Some(PageSearchResult {
        page_id,
        page_name: alias_str(item, &["page_name", "pageName", "name"]).unwrap_or_default(),
        page_profile_uri: alias_str(item, &["page_profile_uri", "pageProfileURI", "page_url"]),
        page_alias: alias_str(item, &["page_alias", "pageAlias"]),
        page_logo_url: alias_str(
            item,
            &[
                "page_profile_picture_url",
                "pageProfilePictureURL",
                "profile_picture_url",
                "image_uri",
            ],
        ),
        page_verified: alias(item, &["is_verified", "isVerified", "verification"])
            .and_then(Value::as_bool),
        page_like_count: alias_i64(item, &["page_like_count", "pageLikeCount", "likes"]),
        category: alias_str(item, &["category", "page_category"]),
    })
}
