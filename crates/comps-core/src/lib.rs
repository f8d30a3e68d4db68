//! Core domain model for the county comps pipeline.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "comps-core";

/// Listing site a record was scraped from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ListingSourceId {
    Zillow,
    Redfin,
    HomesCom,
}

impl fmt::Display for ListingSourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ListingSourceId::Zillow => "zillow",
            ListingSourceId::Redfin => "redfin",
            ListingSourceId::HomesCom => "homes-com",
        };
        f.write_str(name)
    }
}

/// Closed set of canonical property categories.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum PropertyType {
    #[serde(rename = "Single Family")]
    SingleFamily,
    Condo,
    Townhouse,
    #[serde(rename = "Multi-Family")]
    MultiFamily,
    Manufactured,
    Land,
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyType::SingleFamily => "Single Family",
            PropertyType::Condo => "Condo",
            PropertyType::Townhouse => "Townhouse",
            PropertyType::MultiFamily => "Multi-Family",
            PropertyType::Manufactured => "Manufactured",
            PropertyType::Land => "Land",
        };
        f.write_str(name)
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ListingStatus {
    #[default]
    Active,
    Pending,
    Sold,
    OffMarket,
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ListingStatus::Active => "active",
            ListingStatus::Pending => "pending",
            ListingStatus::Sold => "sold",
            ListingStatus::OffMarket => "off-market",
        };
        f.write_str(name)
    }
}

/// One (source, timestamp) observation of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeRecord {
    pub source: ListingSourceId,
    pub scraped_at: DateTime<Utc>,
}

/// Untrusted scraper output, one per (source, listing) pair.
///
/// Every field other than `source` may be missing, malformed, or in
/// source-specific units; the normalizer owns all interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    pub source: ListingSourceId,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub county: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub list_price: Option<f64>,
    pub status: Option<ListingStatus>,
    pub listing_date: Option<DateTime<Utc>>,
    pub days_on_market: Option<i64>,
    /// Free text as scraped ("Townhome", "2-unit duplex", ...).
    pub property_type: Option<String>,
    pub bedrooms: Option<f64>,
    pub bathrooms: Option<f64>,
    pub square_feet: Option<f64>,
    /// Acres or square feet depending on the source.
    pub lot_size: Option<f64>,
    pub year_built: Option<i32>,
    pub has_pool: Option<bool>,
    pub garage_spaces: Option<i64>,
    pub has_hoa: Option<bool>,
    pub hoa_fee: Option<f64>,
    pub elementary_school: Option<String>,
    pub middle_school: Option<String>,
    pub high_school: Option<String>,
    pub school_district: Option<String>,
    pub primary_image_url: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    pub mls_number: Option<String>,
    pub source_url: Option<String>,
    pub scraped_at: Option<DateTime<Utc>>,
    pub raw_data: Option<serde_json::Value>,
}

impl RawListing {
    /// An all-empty listing attributed to `source`.
    pub fn new(source: ListingSourceId) -> Self {
        Self {
            source,
            address: None,
            city: None,
            state: None,
            zip_code: None,
            county: None,
            latitude: None,
            longitude: None,
            list_price: None,
            status: None,
            listing_date: None,
            days_on_market: None,
            property_type: None,
            bedrooms: None,
            bathrooms: None,
            square_feet: None,
            lot_size: None,
            year_built: None,
            has_pool: None,
            garage_spaces: None,
            has_hoa: None,
            hoa_fee: None,
            elementary_school: None,
            middle_school: None,
            high_school: None,
            school_district: None,
            primary_image_url: None,
            image_urls: Vec::new(),
            mls_number: None,
            source_url: None,
            scraped_at: None,
            raw_data: None,
        }
    }
}

/// Canonical property record produced by the normalizer.
///
/// See the normalizer for the invariants any instance satisfies (fixed
/// state/county, canonical address forms, clamped counts, closed type set).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub county: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Zeroed when the raw value fell outside the plausible window.
    pub list_price: u64,
    pub status: ListingStatus,
    pub listing_date: Option<DateTime<Utc>>,
    pub days_on_market: Option<u32>,
    pub property_type: PropertyType,
    pub bedrooms: u32,
    pub bathrooms: f64,
    pub square_feet: Option<u32>,
    /// Always square feet; acreage inputs are converted.
    pub lot_size_sqft: Option<u32>,
    pub year_built: Option<i32>,
    pub has_pool: bool,
    pub garage_spaces: u32,
    pub has_hoa: bool,
    pub hoa_fee: Option<f64>,
    pub elementary_school: Option<String>,
    pub middle_school: Option<String>,
    pub high_school: Option<String>,
    pub school_district: Option<String>,
    pub primary_image_url: Option<String>,
    pub additional_image_urls: Vec<String>,
    pub mls_number: Option<String>,
    pub source_url: Option<String>,
    pub data_sources: BTreeSet<ListingSourceId>,
    pub last_scraped_at: DateTime<Utc>,
    pub scrape_history: Vec<ScrapeRecord>,
    /// 0-100 desirability heuristic; absent when the price was zeroed.
    pub match_score: Option<u8>,
}

impl Property {
    /// First source in deterministic order; `data_sources` is never empty
    /// for normalizer-produced records.
    pub fn primary_source(&self) -> Option<ListingSourceId> {
        self.data_sources.iter().next().copied()
    }
}
