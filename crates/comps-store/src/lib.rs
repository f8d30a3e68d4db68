//! Persistence layer: property upsert, querying, user links, inventory stats.
//!
//! Storage is behind the [`PropertyRepository`] trait so the pipeline and CLI
//! stay backend-agnostic; [`MemoryRepository`] is the in-process
//! implementation used by the fixture pipeline and tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use comps_core::{ListingSourceId, Property};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

pub const CRATE_NAME: &str = "comps-store";

/// Scrape observations retained per property, newest kept.
pub const SCRAPE_HISTORY_CAP: usize = 10;

/// Gallery images retained per property beyond the primary.
pub const ADDITIONAL_IMAGE_CAP: usize = 20;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// A [`Property`] plus its storage identity and bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredProperty {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Whether the primary image went through the processor successfully.
    pub primary_image_stored: bool,
    pub property: Property,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPropertyLink {
    pub user_id: Uuid,
    pub property_id: Uuid,
    /// Source that first surfaced the property to this user.
    pub source: ListingSourceId,
    pub is_favorite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyImage {
    pub property_id: Uuid,
    pub image_url: String,
    pub display_order: u32,
}

/// Backend seam. Methods are single-record primitives; dedup-aware upsert
/// logic lives in [`PropertyStore`], not here.
#[async_trait]
pub trait PropertyRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<StoredProperty>, RepoError>;
    async fn find_by_mls(&self, mls_number: &str) -> Result<Option<StoredProperty>, RepoError>;
    async fn find_by_address(
        &self,
        address: &str,
        zip_code: &str,
    ) -> Result<Option<StoredProperty>, RepoError>;
    async fn insert(&self, record: StoredProperty) -> Result<(), RepoError>;
    async fn update(&self, record: StoredProperty) -> Result<(), RepoError>;
    async fn list(&self) -> Result<Vec<StoredProperty>, RepoError>;
    async fn link_user(&self, link: UserPropertyLink) -> Result<(), RepoError>;
    async fn user_links(&self, user_id: Uuid) -> Result<Vec<UserPropertyLink>, RepoError>;
    async fn record_images(&self, images: Vec<PropertyImage>) -> Result<(), RepoError>;
    /// Delete sold properties last updated before the cutoff; returns how
    /// many were removed.
    async fn delete_sold_before(&self, cutoff: DateTime<Utc>) -> Result<usize, RepoError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    properties: HashMap<Uuid, StoredProperty>,
    links: Vec<UserPropertyLink>,
    images: Vec<PropertyImage>,
}

/// In-process repository over a [`RwLock`]. Lookups scan; fine at the scale
/// of one county's inventory.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: RwLock<MemoryState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn image_count(&self, property_id: Uuid) -> usize {
        self.state
            .read()
            .await
            .images
            .iter()
            .filter(|i| i.property_id == property_id)
            .count()
    }
}

#[async_trait]
impl PropertyRepository for MemoryRepository {
    async fn get(&self, id: Uuid) -> Result<Option<StoredProperty>, RepoError> {
        Ok(self.state.read().await.properties.get(&id).cloned())
    }

    async fn find_by_mls(&self, mls_number: &str) -> Result<Option<StoredProperty>, RepoError> {
        Ok(self
            .state
            .read()
            .await
            .properties
            .values()
            .find(|p| p.property.mls_number.as_deref() == Some(mls_number))
            .cloned())
    }

    async fn find_by_address(
        &self,
        address: &str,
        zip_code: &str,
    ) -> Result<Option<StoredProperty>, RepoError> {
        Ok(self
            .state
            .read()
            .await
            .properties
            .values()
            .find(|p| {
                p.property.address.eq_ignore_ascii_case(address)
                    && p.property.zip_code == zip_code
            })
            .cloned())
    }

    async fn insert(&self, record: StoredProperty) -> Result<(), RepoError> {
        self.state.write().await.properties.insert(record.id, record);
        Ok(())
    }

    async fn update(&self, record: StoredProperty) -> Result<(), RepoError> {
        let mut state = self.state.write().await;
        if !state.properties.contains_key(&record.id) {
            return Err(RepoError::Backend(format!(
                "update of unknown property {}",
                record.id
            )));
        }
        state.properties.insert(record.id, record);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StoredProperty>, RepoError> {
        Ok(self.state.read().await.properties.values().cloned().collect())
    }

    async fn link_user(&self, link: UserPropertyLink) -> Result<(), RepoError> {
        let mut state = self.state.write().await;
        let exists = state
            .links
            .iter()
            .any(|l| l.user_id == link.user_id && l.property_id == link.property_id);
        if !exists {
            state.links.push(link);
        }
        Ok(())
    }

    async fn user_links(&self, user_id: Uuid) -> Result<Vec<UserPropertyLink>, RepoError> {
        Ok(self
            .state
            .read()
            .await
            .links
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn record_images(&self, images: Vec<PropertyImage>) -> Result<(), RepoError> {
        let mut state = self.state.write().await;
        for image in images {
            let exists = state
                .images
                .iter()
                .any(|i| i.property_id == image.property_id && i.image_url == image.image_url);
            if !exists {
                state.images.push(image);
            }
        }
        Ok(())
    }

    async fn delete_sold_before(&self, cutoff: DateTime<Utc>) -> Result<usize, RepoError> {
        let mut state = self.state.write().await;
        let doomed: Vec<Uuid> = state
            .properties
            .values()
            .filter(|p| {
                p.property.status == comps_core::ListingStatus::Sold && p.updated_at < cutoff
            })
            .map(|p| p.id)
            .collect();
        for id in &doomed {
            state.properties.remove(id);
            state.links.retain(|l| l.property_id != *id);
            state.images.retain(|i| i.property_id != *id);
        }
        Ok(doomed.len())
    }
}

/// Image pipeline seam. Failures here never fail an upsert; the listing's
/// source URL remains usable.
#[async_trait]
pub trait ImageProcessor: Send + Sync {
    /// Fetch/optimize the primary image, returning the stored URL.
    async fn optimize_primary(&self, property_id: Uuid, url: &str) -> anyhow::Result<String>;
}

/// Records image URLs as-is without fetching anything.
#[derive(Debug, Default)]
pub struct PassthroughImageProcessor;

#[async_trait]
impl ImageProcessor for PassthroughImageProcessor {
    async fn optimize_primary(&self, _property_id: Uuid, url: &str) -> anyhow::Result<String> {
        Ok(url.to_string())
    }
}

/// Pool/HOA filter stance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preference {
    #[default]
    NoPreference,
    Required,
    Avoid,
}

impl Preference {
    fn admits(self, value: bool) -> bool {
        match self {
            Preference::NoPreference => true,
            Preference::Required => value,
            Preference::Avoid => !value,
        }
    }
}

/// Conjunctive query criteria. Empty collections and `None` bounds mean
/// unconstrained.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyFilter {
    #[serde(default)]
    pub cities: Vec<String>,
    #[serde(default)]
    pub zip_codes: Vec<String>,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    pub min_bedrooms: Option<u32>,
    pub min_bathrooms: Option<f64>,
    pub min_square_feet: Option<u32>,
    #[serde(default)]
    pub property_types: Vec<comps_core::PropertyType>,
    #[serde(default)]
    pub pool: Preference,
    #[serde(default)]
    pub hoa: Preference,
    pub min_garage_spaces: Option<u32>,
    pub status: Option<comps_core::ListingStatus>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl PropertyFilter {
    pub fn matches(&self, property: &Property) -> bool {
        if !self.cities.is_empty()
            && !self
                .cities
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&property.city))
        {
            return false;
        }
        if !self.zip_codes.is_empty() && !self.zip_codes.contains(&property.zip_code) {
            return false;
        }
        if self.min_price.is_some_and(|min| property.list_price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| property.list_price > max) {
            return false;
        }
        if self.min_bedrooms.is_some_and(|min| property.bedrooms < min) {
            return false;
        }
        if self.min_bathrooms.is_some_and(|min| property.bathrooms < min) {
            return false;
        }
        if self
            .min_square_feet
            .is_some_and(|min| property.square_feet.unwrap_or(0) < min)
        {
            return false;
        }
        if !self.property_types.is_empty() && !self.property_types.contains(&property.property_type)
        {
            return false;
        }
        if !self.pool.admits(property.has_pool) {
            return false;
        }
        if !self.hoa.admits(property.has_hoa) {
            return false;
        }
        if self
            .min_garage_spaces
            .is_some_and(|min| property.garage_spaces < min)
        {
            return false;
        }
        if self.status.is_some_and(|s| property.status != s) {
            return false;
        }
        true
    }
}

/// Inventory-wide aggregates over currently stored properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryStats {
    pub total_properties: usize,
    /// Averages and extremes cover only properties with a positive price.
    pub avg_price: u64,
    pub min_price: u64,
    pub max_price: u64,
    pub by_city: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl InventoryStats {
    /// The well-defined zero shape for an empty inventory.
    pub fn empty() -> Self {
        Self {
            total_properties: 0,
            avg_price: 0,
            min_price: 0,
            max_price: 0,
            by_city: BTreeMap::new(),
            by_type: BTreeMap::new(),
            last_updated: None,
        }
    }
}

/// Dedup-aware facade over a repository and an image processor.
pub struct PropertyStore {
    repo: Arc<dyn PropertyRepository>,
    images: Arc<dyn ImageProcessor>,
}

impl PropertyStore {
    pub fn new(repo: Arc<dyn PropertyRepository>, images: Arc<dyn ImageProcessor>) -> Self {
        Self { repo, images }
    }

    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryRepository::new()),
            Arc::new(PassthroughImageProcessor),
        )
    }

    /// Insert or update one normalized property, returning its storage id.
    ///
    /// A failure is logged and swallowed so one bad record never aborts a
    /// batch; callers count the `None`s.
    pub async fn upsert(&self, property: Property, user_id: Option<Uuid>) -> Option<Uuid> {
        let address = property.address.clone();
        match self.try_upsert(property, user_id).await {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(%address, error = %err, "property upsert failed");
                None
            }
        }
    }

    async fn try_upsert(&self, property: Property, user_id: Option<Uuid>) -> anyhow::Result<Uuid> {
        let existing = match property.mls_number.as_deref() {
            Some(mls) => self.repo.find_by_mls(mls).await?,
            None => None,
        };
        let existing = match existing {
            Some(found) => Some(found),
            None => {
                self.repo
                    .find_by_address(&property.address, &property.zip_code)
                    .await?
            }
        };

        let now = Utc::now();
        let record = match existing {
            Some(mut stored) => {
                stored.property = merge_into_stored(stored.property, property);
                stored.updated_at = now;
                self.store_images(&mut stored).await;
                self.repo.update(stored.clone()).await?;
                stored
            }
            None => {
                let mut stored = StoredProperty {
                    id: Uuid::new_v4(),
                    created_at: now,
                    updated_at: now,
                    primary_image_stored: false,
                    property,
                };
                self.store_images(&mut stored).await;
                self.repo.insert(stored.clone()).await?;
                stored
            }
        };

        if let Some(user_id) = user_id {
            let source = record
                .property
                .primary_source()
                .unwrap_or(ListingSourceId::Zillow);
            self.repo
                .link_user(UserPropertyLink {
                    user_id,
                    property_id: record.id,
                    source,
                    is_favorite: false,
                })
                .await?;
        }

        Ok(record.id)
    }

    async fn store_images(&self, stored: &mut StoredProperty) {
        match stored.property.primary_image_url.clone() {
            Some(url) => match self.images.optimize_primary(stored.id, &url).await {
                Ok(stored_url) => {
                    stored.property.primary_image_url = Some(stored_url);
                    stored.primary_image_stored = true;
                }
                Err(err) => {
                    warn!(property_id = %stored.id, error = %err, "primary image processing failed");
                    stored.primary_image_stored = false;
                }
            },
            None => stored.primary_image_stored = false,
        }

        let additional: Vec<PropertyImage> = stored
            .property
            .additional_image_urls
            .iter()
            .take(ADDITIONAL_IMAGE_CAP)
            .enumerate()
            .map(|(order, url)| PropertyImage {
                property_id: stored.id,
                image_url: url.clone(),
                display_order: order as u32 + 1,
            })
            .collect();
        if !additional.is_empty() {
            if let Err(err) = self.repo.record_images(additional).await {
                warn!(property_id = %stored.id, error = %err, "recording gallery images failed");
            }
        }
    }

    /// Filtered listing query, cheapest first. Pagination applies after
    /// filtering and sorting.
    pub async fn query(&self, filter: &PropertyFilter) -> anyhow::Result<Vec<StoredProperty>> {
        let mut records: Vec<StoredProperty> = self
            .repo
            .list()
            .await?
            .into_iter()
            .filter(|r| filter.matches(&r.property))
            .collect();
        records.sort_by_key(|r| r.property.list_price);

        let offset = filter.offset.unwrap_or(0);
        let records = records.into_iter().skip(offset);
        Ok(match filter.limit {
            Some(limit) => records.take(limit).collect(),
            None => records.collect(),
        })
    }

    pub async fn user_properties(
        &self,
        user_id: Uuid,
        limit: Option<usize>,
    ) -> anyhow::Result<Vec<StoredProperty>> {
        let links = self.repo.user_links(user_id).await?;
        let mut records = Vec::with_capacity(links.len());
        for link in links {
            if let Some(record) = self.repo.get(link.property_id).await? {
                records.push(record);
            }
        }
        records.sort_by_key(|r| r.property.list_price);
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    /// Aggregates over the stored inventory, optionally restricted to
    /// records matching `filter`.
    pub async fn stats(&self, filter: Option<&PropertyFilter>) -> anyhow::Result<InventoryStats> {
        let mut records = self.repo.list().await?;
        if let Some(filter) = filter {
            records.retain(|r| filter.matches(&r.property));
        }
        if records.is_empty() {
            return Ok(InventoryStats::empty());
        }

        let priced: Vec<u64> = records
            .iter()
            .map(|r| r.property.list_price)
            .filter(|p| *p > 0)
            .collect();

        let mut by_city: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        for record in &records {
            *by_city.entry(record.property.city.clone()).or_default() += 1;
            *by_type
                .entry(record.property.property_type.to_string())
                .or_default() += 1;
        }

        Ok(InventoryStats {
            total_properties: records.len(),
            avg_price: if priced.is_empty() {
                0
            } else {
                priced.iter().sum::<u64>() / priced.len() as u64
            },
            min_price: priced.iter().copied().min().unwrap_or(0),
            max_price: priced.iter().copied().max().unwrap_or(0),
            by_city,
            by_type,
            last_updated: records.iter().map(|r| r.updated_at).max(),
        })
    }

    /// Remove sold listings that have not been touched since the cutoff.
    pub async fn cleanup_sold(&self, cutoff: DateTime<Utc>) -> anyhow::Result<usize> {
        Ok(self.repo.delete_sold_before(cutoff).await?)
    }
}

/// Fold an incoming scrape into the stored record. Every field is
/// overwritten by the incoming value, last write wins; cross-record gap
/// filling happens upstream in the merge step, never here. Only source
/// membership and the capped scrape history accumulate.
fn merge_into_stored(stored: Property, mut incoming: Property) -> Property {
    incoming
        .data_sources
        .extend(stored.data_sources.iter().copied());

    let mut history = stored.scrape_history;
    history.extend(incoming.scrape_history.iter().copied());
    history.sort_by_key(|r| r.scraped_at);
    if history.len() > SCRAPE_HISTORY_CAP {
        history.drain(..history.len() - SCRAPE_HISTORY_CAP);
    }
    incoming.scrape_history = history;

    incoming
}

#[cfg(test)]
mod tests {
    use super::*;
    use comps_core::{ListingStatus, PropertyType, ScrapeRecord};

    fn property(address: &str, source: ListingSourceId) -> Property {
        let scraped_at = Utc::now();
        Property {
            address: address.to_string(),
            city: "Phoenix".to_string(),
            state: "AZ".to_string(),
            zip_code: "85004".to_string(),
            county: "Maricopa".to_string(),
            latitude: None,
            longitude: None,
            list_price: 400_000,
            status: ListingStatus::Active,
            listing_date: None,
            days_on_market: None,
            property_type: PropertyType::SingleFamily,
            bedrooms: 3,
            bathrooms: 2.0,
            square_feet: Some(1_800),
            lot_size_sqft: None,
            year_built: None,
            has_pool: false,
            garage_spaces: 2,
            has_hoa: false,
            hoa_fee: None,
            elementary_school: None,
            middle_school: None,
            high_school: None,
            school_district: None,
            primary_image_url: None,
            additional_image_urls: Vec::new(),
            mls_number: None,
            source_url: None,
            data_sources: [source].into_iter().collect(),
            last_scraped_at: scraped_at,
            scrape_history: vec![ScrapeRecord { source, scraped_at }],
            match_score: Some(70),
        }
    }

    #[tokio::test]
    async fn upsert_by_mls_updates_instead_of_inserting() {
        let store = PropertyStore::in_memory();

        let mut first = property("123 Main St", ListingSourceId::Zillow);
        first.mls_number = Some("6543210".to_string());
        let id_a = store.upsert(first, None).await.unwrap();

        let mut second = property("123 N Main St", ListingSourceId::Redfin);
        second.mls_number = Some("6543210".to_string());
        second.list_price = 410_000;
        let id_b = store.upsert(second, None).await.unwrap();

        assert_eq!(id_a, id_b);
        let all = store.query(&PropertyFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].property.list_price, 410_000);
        assert_eq!(all[0].property.data_sources.len(), 2);
        assert_eq!(all[0].property.scrape_history.len(), 2);
    }

    #[tokio::test]
    async fn upsert_without_mls_matches_on_address_and_zip() {
        let store = PropertyStore::in_memory();
        let id_a = store
            .upsert(property("456 Oak Ave", ListingSourceId::Zillow), None)
            .await
            .unwrap();
        let id_b = store
            .upsert(property("456 OAK AVE", ListingSourceId::Redfin), None)
            .await
            .unwrap();
        assert_eq!(id_a, id_b);

        let mut elsewhere = property("456 Oak Ave", ListingSourceId::Redfin);
        elsewhere.zip_code = "85301".to_string();
        let id_c = store.upsert(elsewhere, None).await.unwrap();
        assert_ne!(id_a, id_c);
    }

    #[tokio::test]
    async fn scrape_history_is_capped_newest_kept() {
        let store = PropertyStore::in_memory();
        let mut id = None;
        for i in 0..(SCRAPE_HISTORY_CAP + 5) {
            let mut p = property("789 Pine Dr", ListingSourceId::Zillow);
            p.mls_number = Some("1234567".to_string());
            let scraped_at = Utc::now() + chrono::Duration::seconds(i as i64);
            p.last_scraped_at = scraped_at;
            p.scrape_history = vec![ScrapeRecord {
                source: ListingSourceId::Zillow,
                scraped_at,
            }];
            id = store.upsert(p, None).await;
        }

        let all = store.query(&PropertyFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id.unwrap());
        let history = &all[0].property.scrape_history;
        assert_eq!(history.len(), SCRAPE_HISTORY_CAP);
        // Oldest entries were dropped.
        assert!(history.windows(2).all(|w| w[0].scraped_at <= w[1].scraped_at));
    }

    #[tokio::test]
    async fn update_overwrites_every_field_last_write_wins() {
        let store = PropertyStore::in_memory();
        let mut first = property("12 Cactus Ln", ListingSourceId::Zillow);
        first.mls_number = Some("6543210".to_string());
        first.year_built = Some(1998);
        first.primary_image_url = Some("https://img/zillow.jpg".to_string());
        first.additional_image_urls = vec!["https://img/old.jpg".to_string()];
        store.upsert(first, None).await.unwrap();

        let mut second = property("12 Cactus Ln", ListingSourceId::Redfin);
        second.mls_number = Some("6543210".to_string());
        second.year_built = None;
        second.primary_image_url = None;
        store.upsert(second, None).await.unwrap();

        let all = store.query(&PropertyFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        // A fresher scrape clears fields it no longer carries; no
        // gap-filling from the stored record at this layer.
        assert_eq!(all[0].property.year_built, None);
        assert_eq!(all[0].property.primary_image_url, None);
        assert!(all[0].property.additional_image_urls.is_empty());
        // Bookkeeping still accumulates.
        assert_eq!(all[0].property.data_sources.len(), 2);
        assert_eq!(all[0].property.scrape_history.len(), 2);
    }

    #[tokio::test]
    async fn user_link_is_created_once_and_never_overwritten() {
        let repo = Arc::new(MemoryRepository::new());
        let store = PropertyStore::new(repo.clone(), Arc::new(PassthroughImageProcessor));
        let user = Uuid::new_v4();

        let id = store
            .upsert(property("33 Palm Way", ListingSourceId::Zillow), Some(user))
            .await
            .unwrap();
        let mut favorite = repo.user_links(user).await.unwrap();
        favorite[0].is_favorite = true;
        repo.state.write().await.links = favorite;

        store
            .upsert(property("33 Palm Way", ListingSourceId::Redfin), Some(user))
            .await
            .unwrap();

        let links = repo.user_links(user).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].property_id, id);
        assert!(links[0].is_favorite);

        let properties = store.user_properties(user, None).await.unwrap();
        assert_eq!(properties.len(), 1);
        assert_eq!(properties[0].id, id);
        assert!(store
            .user_properties(user, Some(0))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn query_filters_sorts_and_paginates() {
        let store = PropertyStore::in_memory();
        for (address, price, city) in [
            ("1 A St", 500_000u64, "Phoenix"),
            ("2 B St", 300_000, "Scottsdale"),
            ("3 C St", 400_000, "Phoenix"),
        ] {
            let mut p = property(address, ListingSourceId::Zillow);
            p.list_price = price;
            p.city = city.to_string();
            store.upsert(p, None).await.unwrap();
        }

        let all = store.query(&PropertyFilter::default()).await.unwrap();
        let prices: Vec<u64> = all.iter().map(|r| r.property.list_price).collect();
        assert_eq!(prices, vec![300_000, 400_000, 500_000]);

        let phoenix = store
            .query(&PropertyFilter {
                cities: vec!["phoenix".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(phoenix.len(), 2);

        let page = store
            .query(&PropertyFilter {
                offset: Some(1),
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].property.list_price, 400_000);
    }

    #[tokio::test]
    async fn preference_filters_apply() {
        let store = PropertyStore::in_memory();
        let mut with_pool = property("1 Pool Ct", ListingSourceId::Zillow);
        with_pool.has_pool = true;
        store.upsert(with_pool, None).await.unwrap();
        store
            .upsert(property("2 Dry Ct", ListingSourceId::Zillow), None)
            .await
            .unwrap();

        let required = store
            .query(&PropertyFilter {
                pool: Preference::Required,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(required.len(), 1);
        assert!(required[0].property.has_pool);

        let avoided = store
            .query(&PropertyFilter {
                pool: Preference::Avoid,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(avoided.len(), 1);
        assert!(!avoided[0].property.has_pool);
    }

    #[tokio::test]
    async fn stats_cover_priced_records_only() {
        let store = PropertyStore::in_memory();
        assert_eq!(store.stats(None).await.unwrap(), InventoryStats::empty());

        for (address, price) in [("1 A St", 300_000u64), ("2 B St", 500_000), ("3 C St", 0)] {
            let mut p = property(address, ListingSourceId::Zillow);
            p.list_price = price;
            store.upsert(p, None).await.unwrap();
        }

        let stats = store.stats(None).await.unwrap();
        assert_eq!(stats.total_properties, 3);
        assert_eq!(stats.avg_price, 400_000);
        assert_eq!(stats.min_price, 300_000);
        assert_eq!(stats.max_price, 500_000);
        assert_eq!(stats.by_city.get("Phoenix"), Some(&3));
        assert_eq!(stats.by_type.get("Single Family"), Some(&3));
        assert!(stats.last_updated.is_some());
    }

    #[tokio::test]
    async fn filtered_stats_cover_the_matching_subset() {
        let store = PropertyStore::in_memory();
        for (address, price) in [("1 A St", 300_000u64), ("2 B St", 500_000)] {
            let mut p = property(address, ListingSourceId::Zillow);
            p.list_price = price;
            store.upsert(p, None).await.unwrap();
        }

        let filter = PropertyFilter {
            max_price: Some(400_000),
            ..Default::default()
        };
        let stats = store.stats(Some(&filter)).await.unwrap();
        assert_eq!(stats.total_properties, 1);
        assert_eq!(stats.avg_price, 300_000);

        let none = PropertyFilter {
            min_price: Some(1_000_000),
            ..Default::default()
        };
        assert_eq!(
            store.stats(Some(&none)).await.unwrap(),
            InventoryStats::empty()
        );
    }

    #[tokio::test]
    async fn cleanup_removes_only_stale_sold_listings() {
        let repo = Arc::new(MemoryRepository::new());
        let store = PropertyStore::new(repo.clone(), Arc::new(PassthroughImageProcessor));

        let mut sold = property("9 Gone St", ListingSourceId::Zillow);
        sold.status = ListingStatus::Sold;
        store.upsert(sold, None).await.unwrap();
        store
            .upsert(property("10 Here St", ListingSourceId::Zillow), None)
            .await
            .unwrap();

        // Cutoff in the past: nothing is stale yet.
        let removed = store
            .cleanup_sold(Utc::now() - chrono::Duration::days(30))
            .await
            .unwrap();
        assert_eq!(removed, 0);

        let removed = store
            .cleanup_sold(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        let all = store.query(&PropertyFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].property.address, "10 Here St");
    }

    #[tokio::test]
    async fn gallery_images_are_recorded_and_capped() {
        let repo = Arc::new(MemoryRepository::new());
        let store = PropertyStore::new(repo.clone(), Arc::new(PassthroughImageProcessor));

        let mut p = property("77 Gallery Rd", ListingSourceId::Zillow);
        p.additional_image_urls = (0..(ADDITIONAL_IMAGE_CAP + 10))
            .map(|i| format!("https://img/{i}.jpg"))
            .collect();
        let id = store.upsert(p, None).await.unwrap();

        assert_eq!(repo.image_count(id).await, ADDITIONAL_IMAGE_CAP);
    }
}
