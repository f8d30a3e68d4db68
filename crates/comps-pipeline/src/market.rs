//! Target-market geofence data: allow-lists, bounding box, scoring extras.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use comps_core::RawListing;
use serde::{Deserialize, Serialize};

/// Rough rectangular approximation of the market's county.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl GeoBounds {
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lng >= self.min_lng && lng <= self.max_lng
    }
}

fn default_acre_threshold() -> f64 {
    DEFAULT_ACRE_THRESHOLD
}

/// Lot sizes below this raw value are assumed to be acres, not square feet.
/// A heuristic, not a guarantee: it mis-reads genuinely tiny square-foot
/// lots and very large acreages, so profiles may tune it per market.
pub const DEFAULT_ACRE_THRESHOLD: f64 = 500.0;

/// Everything the pipeline knows about one target market, as plain data.
///
/// The geofence check is a lookup against these tables; extending the
/// pipeline to another county means authoring another profile, not code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketProfile {
    pub name: String,
    pub state_code: String,
    pub county: String,
    /// Lowercased city names inside the county.
    pub cities: BTreeSet<String>,
    pub zip_codes: BTreeSet<String>,
    pub bounds: GeoBounds,
    /// Cities that earn a match-score bonus.
    #[serde(default)]
    pub premium_cities: Vec<String>,
    #[serde(default = "default_acre_threshold")]
    pub acre_threshold: f64,
}

impl MarketProfile {
    /// Load a profile from YAML; city names are lowercased on the way in so
    /// membership tests stay a plain set lookup.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading market profile {}", path.display()))?;
        let mut profile: MarketProfile = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing market profile {}", path.display()))?;
        profile.cities = profile
            .cities
            .iter()
            .map(|c| c.trim().to_lowercase())
            .collect();
        Ok(profile)
    }

    /// True when any one geofence signal places the listing in the county:
    /// zip membership, city membership, an explicit county match, or
    /// coordinates inside the bounding box. The signals are independent and
    /// any single one suffices.
    pub fn contains_listing(&self, raw: &RawListing) -> bool {
        if let Some(zip) = raw.zip_code.as_deref() {
            if self.zip_codes.contains(zip.trim()) {
                return true;
            }
        }
        if let Some(city) = raw.city.as_deref() {
            if self.cities.contains(&city.trim().to_lowercase()) {
                return true;
            }
        }
        if let Some(county) = raw.county.as_deref() {
            if county.trim().eq_ignore_ascii_case(&self.county) {
                return true;
            }
        }
        if let (Some(lat), Some(lng)) = (raw.latitude, raw.longitude) {
            if self.bounds.contains(lat, lng) {
                return true;
            }
        }
        false
    }

    pub fn is_premium_city(&self, city: &str) -> bool {
        self.premium_cities
            .iter()
            .any(|p| p.eq_ignore_ascii_case(city))
    }

    /// Built-in Maricopa County, AZ profile.
    pub fn maricopa() -> Self {
        let cities = [
            "phoenix",
            "mesa",
            "chandler",
            "scottsdale",
            "glendale",
            "tempe",
            "peoria",
            "surprise",
            "avondale",
            "goodyear",
            "buckeye",
            "el mirage",
            "gilbert",
            "queen creek",
            "fountain hills",
            "paradise valley",
            "cave creek",
            "carefree",
            "wickenburg",
            "litchfield park",
            "tolleson",
            "youngtown",
            "guadalupe",
            "sun city",
            "sun city west",
            "anthem",
            "laveen",
            "ahwatukee",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        let zip_codes = [
            // Phoenix
            "85001", "85002", "85003", "85004", "85005", "85006", "85007", "85008", "85009",
            "85012", "85013", "85014", "85015", "85016", "85017", "85018", "85019", "85020",
            "85021", "85022", "85023", "85024", "85027", "85028", "85029", "85031", "85032",
            "85033", "85034", "85035", "85037", "85040", "85041", "85042", "85043", "85044",
            "85045", "85048", "85050", "85051", "85053", "85054", "85083", "85085", "85086",
            "85087",
            // Scottsdale
            "85250", "85251", "85252", "85253", "85254", "85255", "85256", "85257", "85258",
            "85259", "85260", "85261", "85262", "85263", "85264", "85266", "85267", "85268",
            // Mesa
            "85201", "85202", "85203", "85204", "85205", "85206", "85207", "85208", "85209",
            "85210", "85212", "85213", "85215", "85216",
            // Tempe
            "85280", "85281", "85282", "85283", "85284", "85285", "85287",
            // Chandler
            "85224", "85225", "85226", "85248", "85249", "85286",
            // Gilbert
            "85233", "85234", "85295", "85296", "85297", "85298",
            // Glendale
            "85301", "85302", "85303", "85304", "85305", "85306", "85307", "85308", "85310",
            // Peoria
            "85345", "85380", "85381", "85382", "85383",
            // Remaining incorporated areas
            "85331", "85335", "85338", "85339", "85340", "85342", "85343", "85351", "85353",
            "85354", "85355", "85361", "85363", "85364", "85365", "85373", "85374", "85375",
            "85376", "85377", "85378", "85379", "85387", "85388", "85390", "85392", "85395",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        Self {
            name: "maricopa".to_string(),
            state_code: "AZ".to_string(),
            county: "Maricopa".to_string(),
            cities,
            zip_codes,
            bounds: GeoBounds {
                min_lat: 32.5,
                max_lat: 34.0,
                min_lng: -113.5,
                max_lng: -111.0,
            },
            premium_cities: vec![
                "Scottsdale".to_string(),
                "Paradise Valley".to_string(),
                "Gilbert".to_string(),
            ],
            acre_threshold: DEFAULT_ACRE_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comps_core::ListingSourceId;

    fn listing() -> RawListing {
        RawListing::new(ListingSourceId::Zillow)
    }

    #[test]
    fn each_geofence_signal_is_sufficient_alone() {
        let profile = MarketProfile::maricopa();

        let mut by_zip = listing();
        by_zip.zip_code = Some("85254".to_string());
        assert!(profile.contains_listing(&by_zip));

        let mut by_city = listing();
        by_city.city = Some("  SCOTTSDALE ".to_string());
        assert!(profile.contains_listing(&by_city));

        let mut by_county = listing();
        by_county.county = Some("maricopa".to_string());
        assert!(profile.contains_listing(&by_county));

        let mut by_coords = listing();
        by_coords.latitude = Some(33.45);
        by_coords.longitude = Some(-112.07);
        assert!(profile.contains_listing(&by_coords));
    }

    #[test]
    fn no_signal_means_silent_reject() {
        let profile = MarketProfile::maricopa();
        let mut outside = listing();
        outside.city = Some("Tucson".to_string());
        outside.zip_code = Some("85701".to_string());
        outside.county = Some("Pima".to_string());
        outside.latitude = Some(32.22);
        outside.longitude = Some(-110.97);
        assert!(!profile.contains_listing(&outside));
    }

    #[test]
    fn empty_listing_is_not_in_market() {
        assert!(!MarketProfile::maricopa().contains_listing(&listing()));
    }
}
