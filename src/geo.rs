// Fuzzy bridge between the region names in the canonical table and the
// polygon-name vocabulary of the external geographic dataset.
//
// The bridge is deliberately lossy: a region that scores at or below the
// threshold stays unresolved and is excluded from the map view only; every
// other aggregation keeps it. Ties keep the first best candidate in
// vocabulary order, which is part of the documented contract.

use crate::error::LoadError;
use crate::types::{CanonicalRecord, MapRow};
use crate::util::similarity_score;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::warn;

/// GeoJSON source of the autonomous-community polygons; each feature carries
/// the community name under `properties.name`.
pub const REGION_VOCABULARY_URL: &str =
    "https://raw.githubusercontent.com/codeforgermany/click_that_hood/main/public/data/spain-communities.geojson";

/// Minimum similarity (exclusive) for a match to be accepted.
pub const MATCH_THRESHOLD: f64 = 80.0;

/// Pluggable similarity strategy. Scores are in [0, 100].
pub trait RegionMatcher {
    fn score(&self, region: &str, candidate: &str) -> f64;
}

/// Default matcher: normalized substring edit distance (see `util`).
#[derive(Debug, Default, Clone, Copy)]
pub struct EditDistanceMatcher;

impl RegionMatcher for EditDistanceMatcher {
    fn score(&self, region: &str, candidate: &str) -> f64 {
        similarity_score(region, candidate)
    }
}

/// Outcome of resolving a set of region names against the vocabulary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoResolution {
    /// region name -> vocabulary name, for every accepted match.
    pub resolved: HashMap<String, String>,
    /// Region names that scored at or below the threshold everywhere.
    pub unresolved: Vec<String>,
}

/// Resolve each distinct region name to its best vocabulary candidate.
///
/// Acceptance requires a score strictly greater than `MATCH_THRESHOLD`;
/// among equal scores the earliest candidate wins.
pub fn resolve_regions<M: RegionMatcher>(
    regions: &[String],
    vocabulary: &[String],
    matcher: &M,
) -> GeoResolution {
    let mut resolution = GeoResolution::default();
    for region in regions {
        let mut best: Option<(&str, f64)> = None;
        for candidate in vocabulary {
            let score = matcher.score(region, candidate);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((candidate, score));
            }
        }
        match best {
            Some((candidate, score)) if score > MATCH_THRESHOLD => {
                resolution
                    .resolved
                    .insert(region.clone(), candidate.to_string());
            }
            _ => {
                warn!("region '{region}' did not match the polygon vocabulary");
                resolution.unresolved.push(region.clone());
            }
        }
    }
    resolution
}

/// Fetch the polygon-name vocabulary from a GeoJSON endpoint.
///
/// A failure here only costs the map view; the caller proceeds with every
/// other aggregation.
pub fn fetch_region_vocabulary(url: &str) -> Result<Vec<String>, LoadError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .expect("Failed to create HTTP client");
    let body: serde_json::Value = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.json())
        .map_err(|e| LoadError::Fetch {
            url: url.to_string(),
            cause: e,
        })?;

    let names: Vec<String> = body["features"]
        .as_array()
        .map(|features| {
            features
                .iter()
                .filter_map(|f| f["properties"]["name"].as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if names.is_empty() {
        return Err(LoadError::Format {
            dataset: url.to_string(),
            reason: "no feature names in geographic dataset".to_string(),
        });
    }
    Ok(names)
}

/// Aggregate the filtered set per resolved polygon name. Records whose
/// region stayed unresolved are excluded from this view only.
pub fn map_breakdown(rows: &[&CanonicalRecord], resolution: &GeoResolution) -> Vec<MapRow> {
    let mut acc: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for r in rows {
        if let Some(polygon) = resolution.resolved.get(&r.region) {
            let e = acc.entry(polygon).or_insert((0.0, 0.0));
            e.0 += r.consumption_kwh;
            e.1 += r.cost_total;
        }
    }
    acc.into_iter()
        .map(|(polygon_name, (consumption_kwh, cost))| MapRow {
            polygon_name: polygon_name.to_string(),
            consumption_kwh,
            cost,
        })
        .collect()
}
