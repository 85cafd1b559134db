//! Export writers: JSON document, flattened CSV, and JSON Lines.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::collector::{AdCollector, CollectorStats, SearchParams};
use crate::error::Result;
use crate::models::Ad;

/// Flattened CSV column set, one row per ad with the primary creative.
const CSV_COLUMNS: [&str; 25] = [
    "id",
    "page_id",
    "page_name",
    "page_url",
    "is_active",
    "ad_status",
    "delivery_start_time",
    "delivery_stop_time",
    "creative_body",
    "creative_title",
    "creative_description",
    "creative_link_url",
    "creative_image_url",
    "snapshot_url",
    "impressions_lower",
    "impressions_upper",
    "spend_lower",
    "spend_upper",
    "currency",
    "publisher_platforms",
    "languages",
    "funding_entity",
    "disclaimer",
    "ad_type",
    "collected_at",
];

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Write ads as one JSON document with a metadata envelope.
pub fn write_json(
    path: &Path,
    ads: &[Ad],
    params: &SearchParams,
    stats: &CollectorStats,
    include_raw: bool,
) -> Result<usize> {
    ensure_parent(path)?;

    let output = json!({
        "metadata": {
            "query": params.query,
            "country": params.country,
            "ad_type": params.ad_type.as_str(),
            "status": params.status.as_str(),
            "collected_at": Utc::now().to_rfc3339(),
            "total_count": ads.len(),
            "stats": stats,
        },
        "ads": ads.iter().map(|ad| ad.to_json(include_raw)).collect::<Vec<_>>(),
    });

    let file = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(file, &output)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    info!(count = ads.len(), path = %path.display(), "saved ads to JSON");
    Ok(ads.len())
}

/// Write ads as one JSON object per line.
pub fn write_jsonl(path: &Path, ads: &[Ad], include_raw: bool) -> Result<usize> {
    ensure_parent(path)?;
    let mut file = BufWriter::new(File::create(path)?);
    for ad in ads {
        serde_json::to_writer(&mut file, &ad.to_json(include_raw))
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        file.write_all(b"\n")?;
    }
    file.flush()?;
    info!(count = ads.len(), path = %path.display(), "saved ads to JSONL");
    Ok(ads.len())
}

/// Write ads as flattened CSV rows.
pub fn write_csv(path: &Path, ads: &[Ad]) -> Result<usize> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    writer
        .write_record(CSV_COLUMNS)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    for ad in ads {
        let creative = ad.creatives.first();
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();
        let opt_num = |v: Option<i64>| v.map(|n| n.to_string()).unwrap_or_default();

        let row = [
            ad.id.clone(),
            ad.page.as_ref().map(|p| p.id.clone()).unwrap_or_default(),
            ad.page.as_ref().map(|p| p.name.clone()).unwrap_or_default(),
            ad.page
                .as_ref()
                .and_then(|p| p.page_url.clone())
                .unwrap_or_default(),
            ad.is_active.map(|b| b.to_string()).unwrap_or_default(),
            opt(&ad.ad_status),
            ad.delivery_start_time
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            ad.delivery_stop_time
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            creative.map(|c| opt(&c.body)).unwrap_or_default(),
            creative.map(|c| opt(&c.title)).unwrap_or_default(),
            creative.map(|c| opt(&c.description)).unwrap_or_default(),
            creative.map(|c| opt(&c.link_url)).unwrap_or_default(),
            creative.map(|c| opt(&c.image_url)).unwrap_or_default(),
            ad.snapshot_url
                .clone()
                .or_else(|| ad.ad_snapshot_url.clone())
                .unwrap_or_default(),
            opt_num(ad.impressions.as_ref().and_then(|r| r.lower_bound)),
            opt_num(ad.impressions.as_ref().and_then(|r| r.upper_bound)),
            opt_num(ad.spend.as_ref().and_then(|r| r.lower_bound)),
            opt_num(ad.spend.as_ref().and_then(|r| r.upper_bound)),
            opt(&ad.currency),
            ad.publisher_platforms.join(","),
            ad.languages.join(","),
            opt(&ad.funding_entity),
            opt(&ad.disclaimer),
            opt(&ad.ad_type),
            ad.collected_at.to_rfc3339(),
        ];
        writer
            .write_record(&row)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    }
    writer
        .flush()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    info!(count = ads.len(), path = %path.display(), "saved ads to CSV");
    Ok(ads.len())
}

impl AdCollector {
    /// Collect ads and save them as a JSON document. Returns the count.
    pub async fn collect_to_json(
        &mut self,
        path: impl AsRef<Path>,
        params: SearchParams,
        include_raw: bool,
    ) -> Result<usize> {
        let ads = self.collect(params.clone()).await?;
        write_json(path.as_ref(), &ads, &params, &self.stats(), include_raw)
    }

    /// Collect ads and save them as CSV. Returns the count.
    pub async fn collect_to_csv(
        &mut self,
        path: impl AsRef<Path>,
        params: SearchParams,
    ) -> Result<usize> {
        let ads = self.collect(params).await?;
        write_csv(path.as_ref(), &ads)
    }

    /// Collect ads and save them as JSON Lines. Returns the count.
    pub async fn collect_to_jsonl(
        &mut self,
        path: impl AsRef<Path>,
        params: SearchParams,
        include_raw: bool,
    ) -> Result<usize> {
        let ads = self.collect(params.clone()).await?;
        write_jsonl(path.as_ref(), &ads, include_raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_ad;
    use serde_json::json;

    fn sample_ads() -> Vec<Ad> {
        vec![
            normalize_ad(&json!({
                "ad_archive_id": "1",
                "page_id": "p1",
                "page_name": "Page One",
                "cards": [{"body": "Hello, world", "title": "T1"}],
                "impressions": {"lower_bound": 100, "upper_bound": 200},
                "currency": "USD",
                "spend": {"lower_bound": 10, "upper_bound": 20},
                "publisher_platforms": ["facebook"]
            }))
            .unwrap(),
            normalize_ad(&json!({"ad_archive_id": "2"})).unwrap(),
        ]
    }

    #[test]
    fn json_document_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/ads.json");
        let count = write_json(
            &path,
            &sample_ads(),
            &SearchParams::default(),
            &CollectorStats::default(),
            false,
        )
        .unwrap();
        assert_eq!(count, 2);

        let text = std::fs::read_to_string(&path).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["metadata"]["total_count"], 2);
        assert_eq!(doc["ads"][0]["id"], "1");
        assert!(doc["ads"][0].get("raw").is_none());
    }

    #[test]
    fn jsonl_one_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ads.jsonl");
        write_jsonl(&path, &sample_ads(), false).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("id").is_some());
        }
    }

    #[test]
    fn jsonl_include_raw_attaches_source_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ads.jsonl");
        write_jsonl(&path, &sample_ads(), true).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(first["raw"]["ad_archive_id"], "1");
    }

    #[test]
    fn csv_flattens_primary_creative() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ads.csv");
        write_csv(&path, &sample_ads()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("id,page_id,page_name"));
        let first = lines.next().unwrap();
        assert!(first.contains("Hello, world") || first.contains("\"Hello, world\""));
        assert_eq!(lines.count(), 1);
    }
}
