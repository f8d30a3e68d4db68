//! Ingest orchestration: scrape, normalize, dedup, store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use comps_core::{ListingSourceId, RawListing};
use comps_pipeline::{group_duplicates, merge_properties, MarketProfile, Normalizer, Rejection};
use comps_store::PropertyStore;
use serde::{Deserialize, Serialize};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "comps-ingest";

/// One raw element a scraper could not turn into a listing.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeIssue {
    pub source: ListingSourceId,
    pub index: usize,
    pub message: String,
}

/// Everything one scraper produced for one run.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeBatch {
    pub source: ListingSourceId,
    pub listings: Vec<RawListing>,
    pub issues: Vec<ScrapeIssue>,
}

/// Pre-filter hints passed to scrapers. Unset fields are unconstrained; the
/// geofence still applies regardless.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchCriteria {
    #[serde(default)]
    pub cities: Vec<String>,
    #[serde(default)]
    pub zip_codes: Vec<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_bedrooms: Option<f64>,
}

impl SearchCriteria {
    /// Best-effort match against raw fields. A listing missing the field
    /// under test passes; the normalizer is the authority, not this filter.
    pub fn admits(&self, raw: &RawListing) -> bool {
        if !self.cities.is_empty() {
            if let Some(city) = raw.city.as_deref() {
                if !self.cities.iter().any(|c| c.eq_ignore_ascii_case(city.trim())) {
                    return false;
                }
            }
        }
        if !self.zip_codes.is_empty() {
            if let Some(zip) = raw.zip_code.as_deref() {
                if !self.zip_codes.iter().any(|z| z == zip.trim()) {
                    return false;
                }
            }
        }
        if let (Some(min), Some(price)) = (self.min_price, raw.list_price) {
            if price < min {
                return false;
            }
        }
        if let (Some(max), Some(price)) = (self.max_price, raw.list_price) {
            if price > max {
                return false;
            }
        }
        if let (Some(min), Some(bedrooms)) = (self.min_bedrooms, raw.bedrooms) {
            if bedrooms < min {
                return false;
            }
        }
        true
    }
}

/// Per-source scraping seam. Implementations own their transport; the
/// pipeline only sees batches.
#[async_trait]
pub trait ListingScraper: Send + Sync {
    fn source_id(&self) -> ListingSourceId;
    async fn scrape(&self, criteria: &SearchCriteria) -> Result<ScrapeBatch>;
}

/// Scraper that replays a captured JSON array of raw listings.
///
/// Elements are decoded one by one so a single malformed entry surfaces as
/// an issue instead of sinking the whole batch.
pub struct FixtureScraper {
    source: ListingSourceId,
    path: PathBuf,
}

impl FixtureScraper {
    pub fn new(source: ListingSourceId, path: impl Into<PathBuf>) -> Self {
        Self {
            source,
            path: path.into(),
        }
    }
}

#[async_trait]
impl ListingScraper for FixtureScraper {
    fn source_id(&self) -> ListingSourceId {
        self.source
    }

    async fn scrape(&self, criteria: &SearchCriteria) -> Result<ScrapeBatch> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading fixture {}", self.path.display()))?;
        let elements: Vec<serde_json::Value> = serde_json::from_str(&text)
            .with_context(|| format!("parsing fixture {}", self.path.display()))?;

        let mut listings = Vec::new();
        let mut issues = Vec::new();
        for (index, element) in elements.into_iter().enumerate() {
            match serde_json::from_value::<RawListing>(element) {
                Ok(raw) if raw.source != self.source => issues.push(ScrapeIssue {
                    source: self.source,
                    index,
                    message: format!("listing attributed to {} in a {} fixture", raw.source, self.source),
                }),
                Ok(raw) => {
                    if criteria.admits(&raw) {
                        listings.push(raw);
                    }
                }
                Err(err) => issues.push(ScrapeIssue {
                    source: self.source,
                    index,
                    message: err.to_string(),
                }),
            }
        }

        Ok(ScrapeBatch {
            source: self.source,
            listings,
            issues,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceEntry {
    pub source_id: ListingSourceId,
    pub display_name: String,
    pub enabled: bool,
    /// Fixture path relative to the workspace root.
    pub fixture: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SourceRegistry {
    pub fn from_workspace_root(root: &Path) -> Result<Self> {
        let path = root.join("sources.yaml");
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub workspace_root: PathBuf,
    /// YAML market profile; the built-in Maricopa profile when unset.
    pub market_profile_path: Option<PathBuf>,
    pub scheduler_enabled: bool,
    pub ingest_cron: String,
    /// Sold listings older than this many days are purged by cleanup.
    pub cleanup_after_days: i64,
    /// User to link ingested properties to, when running on someone's behalf.
    pub user_id: Option<Uuid>,
}

impl IngestConfig {
    pub fn from_env() -> Self {
        Self {
            workspace_root: std::env::var("COMPS_WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
            market_profile_path: std::env::var("COMPS_MARKET_PROFILE").ok().map(PathBuf::from),
            scheduler_enabled: std::env::var("COMPS_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            ingest_cron: std::env::var("COMPS_INGEST_CRON")
                .unwrap_or_else(|_| "0 6 * * *".to_string()),
            cleanup_after_days: std::env::var("COMPS_CLEANUP_AFTER_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(90),
            user_id: std::env::var("COMPS_USER_ID")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: usize,
    pub scraped: usize,
    pub scrape_issues: usize,
    pub invalid: usize,
    pub out_of_market: usize,
    pub merged_groups: usize,
    pub stored: usize,
    pub store_failures: usize,
}

pub struct IngestPipeline {
    config: IngestConfig,
    normalizer: Normalizer,
    store: PropertyStore,
    scrapers: Vec<Box<dyn ListingScraper>>,
}

impl IngestPipeline {
    /// Build a pipeline from the workspace's `sources.yaml` registry, with
    /// an in-memory store and fixture-backed scrapers for each enabled
    /// source.
    pub fn new(config: IngestConfig) -> Result<Self> {
        let profile = match &config.market_profile_path {
            Some(path) => MarketProfile::from_yaml_file(path)?,
            None => MarketProfile::maricopa(),
        };

        let registry = SourceRegistry::from_workspace_root(&config.workspace_root)?;
        let scrapers: Vec<Box<dyn ListingScraper>> = registry
            .sources
            .into_iter()
            .filter(|entry| entry.enabled)
            .map(|entry| {
                Box::new(FixtureScraper::new(
                    entry.source_id,
                    config.workspace_root.join(&entry.fixture),
                )) as Box<dyn ListingScraper>
            })
            .collect();

        Ok(Self {
            config,
            normalizer: Normalizer::new(profile),
            store: PropertyStore::in_memory(),
            scrapers,
        })
    }

    pub fn with_store(mut self, store: PropertyStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_scrapers(mut self, scrapers: Vec<Box<dyn ListingScraper>>) -> Self {
        self.scrapers = scrapers;
        self
    }

    pub fn store(&self) -> &PropertyStore {
        &self.store
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// One full scrape/normalize/dedup/store cycle.
    ///
    /// Scraper failures are counted and skipped; a run only errors when it
    /// cannot run at all.
    pub async fn run_once(&self, criteria: &SearchCriteria) -> Result<IngestRunSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, sources = self.scrapers.len(), "ingest run starting");

        let mut scraped = 0usize;
        let mut scrape_issues = 0usize;
        let mut invalid = 0usize;
        let mut out_of_market = 0usize;
        let mut normalized = Vec::new();

        for scraper in &self.scrapers {
            let batch = match scraper.scrape(criteria).await {
                Ok(batch) => batch,
                Err(err) => {
                    error!(source = %scraper.source_id(), error = %err, "scrape failed");
                    scrape_issues += 1;
                    continue;
                }
            };

            scraped += batch.listings.len();
            scrape_issues += batch.issues.len();
            for issue in &batch.issues {
                warn!(source = %issue.source, index = issue.index, message = %issue.message, "bad scrape element");
            }

            for raw in &batch.listings {
                match self.normalizer.normalize(raw) {
                    Ok(property) => normalized.push(property),
                    Err(Rejection::MissingRequired(_)) => invalid += 1,
                    Err(Rejection::OutOfMarket(_)) => out_of_market += 1,
                }
            }
        }

        let groups = group_duplicates(normalized);
        let merged_groups = groups.len();

        let mut stored = 0usize;
        let mut store_failures = 0usize;
        for group in groups {
            let property = merge_properties(group);
            match self.store.upsert(property, self.config.user_id).await {
                Some(_) => stored += 1,
                None => store_failures += 1,
            }
        }

        let finished_at = Utc::now();
        let summary = IngestRunSummary {
            run_id,
            started_at,
            finished_at,
            sources: self.scrapers.len(),
            scraped,
            scrape_issues,
            invalid,
            out_of_market,
            merged_groups,
            stored,
            store_failures,
        };
        info!(
            %run_id,
            scraped = summary.scraped,
            invalid = summary.invalid,
            out_of_market = summary.out_of_market,
            stored = summary.stored,
            "ingest run finished"
        );
        Ok(summary)
    }

    /// Purge sold listings untouched for `cleanup_after_days`.
    pub async fn cleanup_sold(&self) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(self.config.cleanup_after_days);
        self.store.cleanup_sold(cutoff).await
    }
}

/// Cron scheduler running [`IngestPipeline::run_once`] with default
/// criteria, when enabled by config.
pub async fn build_scheduler(pipeline: Arc<IngestPipeline>) -> Result<Option<JobScheduler>> {
    if !pipeline.config.scheduler_enabled {
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let cron = pipeline.config.ingest_cron.clone();
    let job = Job::new_async(cron.as_str(), move |_uuid, _l| {
        let pipeline = pipeline.clone();
        Box::pin(async move {
            if let Err(err) = pipeline.run_once(&SearchCriteria::default()).await {
                error!(error = %err, "scheduled ingest run failed");
            }
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;
    sched.add(job).await.context("adding scheduler job")?;
    Ok(Some(sched))
}

pub async fn run_ingest_once_from_env() -> Result<IngestRunSummary> {
    let pipeline = IngestPipeline::new(IngestConfig::from_env())?;
    pipeline.run_once(&SearchCriteria::default()).await
}
