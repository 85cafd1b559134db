//! Client-side filtering of normalized ad records.
//!
//! Every configured criterion must pass for a record to be yielded (AND
//! logic). Range criteria are conservative: a minimum passes when the ad's
//! upper bound could reach it, a maximum when the lower bound could stay
//! under it. Records missing the data a filter needs are included rather
//! than silently dropped; callers wanting strict behavior can post-process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Ad, MediaType};

/// Filter criteria applied per record. Every field defaults to disabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    pub min_impressions: Option<i64>,
    pub max_impressions: Option<i64>,
    pub min_spend: Option<i64>,
    pub max_spend: Option<i64>,
    /// Ad must have started on or after this instant.
    pub start_date: Option<DateTime<Utc>>,
    /// Ad must have started on or before this instant.
    pub end_date: Option<DateTime<Utc>>,
    pub media_type: Option<MediaType>,
    pub publisher_platforms: Option<Vec<String>>,
    pub languages: Option<Vec<String>>,
    pub has_video: Option<bool>,
    pub has_image: Option<bool>,
}

impl FilterConfig {
    /// True when no criteria are configured.
    pub fn is_empty(&self) -> bool {
        self.min_impressions.is_none()
            && self.max_impressions.is_none()
            && self.min_spend.is_none()
            && self.max_spend.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.media_type.is_none()
            && self.publisher_platforms.is_none()
            && self.languages.is_none()
            && self.has_video.is_none()
            && self.has_image.is_none()
    }

    /// Test `ad` against every configured criterion.
    pub fn passes(&self, ad: &Ad) -> bool {
        if self.is_empty() {
            return true;
        }

        if let (Some(min), Some(imp)) = (self.min_impressions, ad.impressions.as_ref()) {
            if imp.upper_bound.is_some_and(|upper| upper < min) {
                return false;
            }
        }
        if let (Some(max), Some(imp)) = (self.max_impressions, ad.impressions.as_ref()) {
            if imp.lower_bound.is_some_and(|lower| lower > max) {
                return false;
            }
        }

        if let (Some(min), Some(spend)) = (self.min_spend, ad.spend.as_ref()) {
            if spend.upper_bound.is_some_and(|upper| upper < min) {
                return false;
            }
        }
        if let (Some(max), Some(spend)) = (self.max_spend, ad.spend.as_ref()) {
            if spend.lower_bound.is_some_and(|lower| lower > max) {
                return false;
            }
        }

        if let (Some(start), Some(ad_start)) = (self.start_date, ad.delivery_start_time) {
            if ad_start < start {
                return false;
            }
        }
        if let (Some(end), Some(ad_start)) = (self.end_date, ad.delivery_start_time) {
            if ad_start > end {
                return false;
            }
        }

        if let Some(media) = self.media_type {
            let has_video = ad.has_video();
            let has_image = ad.has_image();
            match media {
                MediaType::All => {}
                MediaType::Video if !has_video => return false,
                MediaType::Image | MediaType::Meme if !has_image => return false,
                MediaType::None if has_video || has_image => return false,
                _ => {}
            }
        }

        if let Some(requested) = &self.publisher_platforms {
            if !ad.publisher_platforms.is_empty() {
                let wanted: Vec<String> =
                    requested.iter().map(|p| p.to_lowercase()).collect();
                let present = ad
                    .publisher_platforms
                    .iter()
                    .any(|p| wanted.contains(&p.to_lowercase()));
                if !present {
                    return false;
                }
            }
            // Missing platform data: include.
        }

        if let Some(requested) = &self.languages {
            if !ad.languages.is_empty() {
                let wanted: Vec<String> =
                    requested.iter().map(|l| l.to_lowercase()).collect();
                let present = ad
                    .languages
                    .iter()
                    .any(|l| wanted.contains(&l.to_lowercase()));
                if !present {
                    return false;
                }
            }
        }

        if let Some(wants_video) = self.has_video {
            if wants_video != ad.has_video() {
                return false;
            }
        }
        if let Some(wants_image) = self.has_image {
            if wants_image != ad.has_image() {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AdCreative, CountRange, SpendRange};

    fn ad(id: &str) -> Ad {
        Ad {
            id: id.to_string(),
            ad_library_id: None,
            page: None,
            is_active: None,
            ad_status: None,
            delivery_start_time: None,
            delivery_stop_time: None,
            creatives: Vec::new(),
            snapshot_url: None,
            ad_snapshot_url: None,
            impressions: None,
            spend: None,
            reach: None,
            currency: None,
            age_gender_distribution: Vec::new(),
            region_distribution: Vec::new(),
            publisher_platforms: Vec::new(),
            languages: Vec::new(),
            bylines: Vec::new(),
            funding_entity: None,
            disclaimer: None,
            ad_type: None,
            categories: Vec::new(),
            beneficiary_payers: Vec::new(),
            collation_id: None,
            collation_count: None,
            collected_at: Utc::now(),
            collection_source: "ad_library".to_string(),
            raw: None,
        }
    }

    #[test]
    fn empty_config_passes_everything() {
        assert!(FilterConfig::default().passes(&ad("1")));
    }

    #[test]
    fn min_impressions_rejects_low_upper_bound() {
        let config = FilterConfig {
            min_impressions: Some(1000),
            ..Default::default()
        };
        let mut a = ad("1");
        a.impressions = Some(CountRange {
            lower_bound: Some(100),
            upper_bound: Some(500),
        });
        assert!(!config.passes(&a));
    }

    #[test]
    fn missing_impressions_are_included() {
        let config = FilterConfig {
            min_impressions: Some(1000),
            ..Default::default()
        };
        assert!(config.passes(&ad("1")));
    }

    #[test]
    fn conservative_range_logic() {
        let config = FilterConfig {
            min_impressions: Some(1000),
            ..Default::default()
        };
        // Upper bound reaches the minimum: the ad could qualify.
        let mut a = ad("1");
        a.impressions = Some(CountRange {
            lower_bound: Some(500),
            upper_bound: Some(2000),
        });
        assert!(config.passes(&a));
    }

    #[test]
    fn spend_bounds() {
        let config = FilterConfig {
            max_spend: Some(100),
            ..Default::default()
        };
        let mut a = ad("1");
        a.spend = Some(SpendRange {
            lower_bound: Some(500),
            upper_bound: Some(900),
            currency: None,
        });
        assert!(!config.passes(&a));
    }

    #[test]
    fn platform_intersection_case_insensitive() {
        let config = FilterConfig {
            publisher_platforms: Some(vec!["Facebook".to_string()]),
            ..Default::default()
        };
        let mut a = ad("1");
        a.publisher_platforms = vec!["facebook".to_string(), "instagram".to_string()];
        assert!(config.passes(&a));

        a.publisher_platforms = vec!["instagram".to_string()];
        assert!(!config.passes(&a));

        // Missing platform data: included.
        a.publisher_platforms = Vec::new();
        assert!(config.passes(&a));
    }

    #[test]
    fn media_type_video() {
        let config = FilterConfig {
            media_type: Some(MediaType::Video),
            ..Default::default()
        };
        let mut a = ad("1");
        assert!(!config.passes(&a));
        a.creatives = vec![AdCreative {
            video_hd_url: Some("https://cdn.example.com/v.mp4".into()),
            ..Default::default()
        }];
        assert!(config.passes(&a));
    }

    #[test]
    fn has_image_both_polarities() {
        let mut a = ad("1");
        a.creatives = vec![AdCreative {
            image_url: Some("https://cdn.example.com/i.jpg".into()),
            ..Default::default()
        }];
        let wants = FilterConfig {
            has_image: Some(true),
            ..Default::default()
        };
        let rejects = FilterConfig {
            has_image: Some(false),
            ..Default::default()
        };
        assert!(wants.passes(&a));
        assert!(!rejects.passes(&a));
    }

    #[test]
    fn date_window() {
        let config = FilterConfig {
            start_date: Some("2024-01-01T00:00:00Z".parse().unwrap()),
            end_date: Some("2024-06-30T23:59:59Z".parse().unwrap()),
            ..Default::default()
        };
        let mut a = ad("1");
        a.delivery_start_time = Some("2024-03-01T00:00:00Z".parse().unwrap());
        assert!(config.passes(&a));
        a.delivery_start_time = Some("2023-12-01T00:00:00Z".parse().unwrap());
        assert!(!config.passes(&a));
        a.delivery_start_time = None;
        assert!(config.passes(&a));
    }
}
