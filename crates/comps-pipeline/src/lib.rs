//! Normalization, deduplication, and merge pipeline for scraped listings.
//!
//! The pipeline is pure and stateless: [`Normalizer::normalize`] and the
//! [`dedup`] functions share no mutable state and may be called concurrently
//! from a worker pool without synchronization.

pub mod canonical;
pub mod dedup;
pub mod market;

use chrono::{Datelike, Utc};
use comps_core::{Property, RawListing, ScrapeRecord};
use thiserror::Error;
use tracing::{debug, warn};

pub use dedup::{group_duplicates, is_duplicate, merge_properties};
pub use market::MarketProfile;

pub const CRATE_NAME: &str = "comps-pipeline";

/// Why a raw listing produced no normalized record. Rejection is a normal
/// pipeline outcome, never a batch-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("missing or invalid required field: {0}")]
    MissingRequired(&'static str),
    #[error("listing could not be placed in {0} County")]
    OutOfMarket(String),
}

/// Match-score weights. Tunable ranking constants, not invariants.
mod score {
    pub const BASE: i32 = 50;
    pub const PRICE_UNDER_300K: i32 = 10;
    pub const PRICE_UNDER_500K: i32 = 5;
    pub const SQFT_OVER_2000: i32 = 10;
    pub const SQFT_OVER_3000: i32 = 5;
    pub const BEDROOMS_3_PLUS: i32 = 10;
    pub const BATHROOMS_2_PLUS: i32 = 10;
    pub const POOL: i32 = 5;
    pub const GARAGE_2_PLUS: i32 = 5;
    pub const NO_HOA: i32 = 5;
    pub const PREMIUM_CITY: i32 = 10;
}

/// Stateless transformer from raw scraped listings to canonical properties.
///
/// Construct one per target market and share it by reference; it holds only
/// the immutable [`MarketProfile`].
#[derive(Debug, Clone)]
pub struct Normalizer {
    profile: MarketProfile,
}

impl Normalizer {
    pub fn new(profile: MarketProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &MarketProfile {
        &self.profile
    }

    /// Validate, geofence, and canonicalize one raw listing.
    ///
    /// Hard gates run first: the required-field check (no partial records
    /// are ever produced), then the multi-signal geofence. After the gates,
    /// each field canonicalizes independently; a bad optional field is
    /// dropped, never fatal.
    pub fn normalize(&self, raw: &RawListing) -> Result<Property, Rejection> {
        if let Err(rejection) = required_fields(raw) {
            warn!(
                source = %raw.source,
                address = raw.address.as_deref().unwrap_or("<none>"),
                %rejection,
                "rejecting listing"
            );
            return Err(rejection);
        }

        if !self.profile.contains_listing(raw) {
            debug!(
                source = %raw.source,
                address = raw.address.as_deref().unwrap_or("<none>"),
                city = raw.city.as_deref().unwrap_or("<none>"),
                "listing outside target county"
            );
            return Err(Rejection::OutOfMarket(self.profile.county.clone()));
        }

        let current_year = Utc::now().year();
        let last_scraped_at = raw.scraped_at.unwrap_or_else(Utc::now);

        // The gate guarantees these are present.
        let address = raw.address.as_deref().unwrap_or_default();
        let city = raw.city.as_deref().unwrap_or_default();
        let zip = raw.zip_code.as_deref().unwrap_or_default();

        let mut property = Property {
            address: canonical::normalize_address(address),
            city: canonical::normalize_city(city),
            state: self.profile.state_code.clone(),
            zip_code: canonical::normalize_zip(zip),
            county: self.profile.county.clone(),
            latitude: raw.latitude,
            longitude: raw.longitude,
            list_price: canonical::normalize_price(raw.list_price.unwrap_or_default()),
            status: raw.status.unwrap_or_default(),
            listing_date: raw.listing_date,
            days_on_market: raw.days_on_market.map(|d| d.max(0) as u32),
            property_type: canonical::normalize_property_type(raw.property_type.as_deref()),
            bedrooms: raw.bedrooms.map(|b| b.max(0.0).round() as u32).unwrap_or(0),
            bathrooms: raw.bathrooms.map(|b| b.max(0.0)).unwrap_or(0.0),
            square_feet: raw
                .square_feet
                .filter(|sqft| *sqft > 0.0)
                .map(|sqft| sqft.round() as u32),
            lot_size_sqft: raw
                .lot_size
                .and_then(|lot| canonical::normalize_lot_size(lot, self.profile.acre_threshold)),
            year_built: raw
                .year_built
                .and_then(|year| canonical::normalize_year_built(year, current_year)),
            has_pool: raw.has_pool.unwrap_or(false),
            garage_spaces: raw.garage_spaces.map(|g| g.max(0) as u32).unwrap_or(0),
            has_hoa: raw.has_hoa.unwrap_or(false),
            hoa_fee: raw.hoa_fee,
            elementary_school: raw
                .elementary_school
                .as_deref()
                .map(canonical::normalize_school_name),
            middle_school: raw
                .middle_school
                .as_deref()
                .map(canonical::normalize_school_name),
            high_school: raw
                .high_school
                .as_deref()
                .map(canonical::normalize_school_name),
            school_district: raw.school_district.clone(),
            primary_image_url: raw.primary_image_url.clone(),
            additional_image_urls: raw.image_urls.iter().skip(1).cloned().collect(),
            mls_number: raw
                .mls_number
                .as_deref()
                .map(canonical::normalize_mls_number)
                .filter(|mls| !mls.is_empty()),
            source_url: raw.source_url.clone(),
            data_sources: [raw.source].into_iter().collect(),
            last_scraped_at,
            scrape_history: vec![ScrapeRecord {
                source: raw.source,
                scraped_at: last_scraped_at,
            }],
            match_score: None,
        };

        // Price canonicalization may have zeroed a gate-passing value; score
        // only what still has a believable price.
        if property.list_price > 0 {
            property.match_score = Some(self.match_score(&property));
        }

        Ok(property)
    }

    /// Coarse 0-100 desirability signal, not a valuation.
    fn match_score(&self, property: &Property) -> u8 {
        let mut total = score::BASE;

        if property.list_price < 300_000 {
            total += score::PRICE_UNDER_300K;
        } else if property.list_price < 500_000 {
            total += score::PRICE_UNDER_500K;
        }

        if let Some(sqft) = property.square_feet {
            if sqft >= 2000 {
                total += score::SQFT_OVER_2000;
            }
            if sqft >= 3000 {
                total += score::SQFT_OVER_3000;
            }
        }

        if property.bedrooms >= 3 {
            total += score::BEDROOMS_3_PLUS;
        }
        if property.bathrooms >= 2.0 {
            total += score::BATHROOMS_2_PLUS;
        }
        if property.has_pool {
            total += score::POOL;
        }
        if property.garage_spaces >= 2 {
            total += score::GARAGE_2_PLUS;
        }
        if !property.has_hoa {
            total += score::NO_HOA;
        }
        if self.profile.is_premium_city(&property.city) {
            total += score::PREMIUM_CITY;
        }

        total.clamp(0, 100) as u8
    }
}

fn required_fields(raw: &RawListing) -> Result<(), Rejection> {
    if raw.address.as_deref().map_or(true, |a| a.trim().is_empty()) {
        return Err(Rejection::MissingRequired("address"));
    }
    if raw.city.as_deref().map_or(true, |c| c.trim().is_empty()) {
        return Err(Rejection::MissingRequired("city"));
    }
    if raw.zip_code.as_deref().map_or(true, |z| z.trim().is_empty()) {
        return Err(Rejection::MissingRequired("zip_code"));
    }
    if raw.list_price.map_or(true, |p| p <= 0.0) {
        return Err(Rejection::MissingRequired("list_price"));
    }
    if raw.bedrooms.map_or(true, |b| b < 0.0) {
        return Err(Rejection::MissingRequired("bedrooms"));
    }
    if raw.bathrooms.map_or(true, |b| b < 0.0) {
        return Err(Rejection::MissingRequired("bathrooms"));
    }
    Ok(())
}
