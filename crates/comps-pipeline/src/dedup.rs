//! Identity equivalence and merging for normalized properties.

use comps_core::Property;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Two listings closer than this are the same physical property (~50 m).
pub const DUPLICATE_RADIUS_KM: f64 = 0.05;

/// Great-circle distance between two coordinates, spherical Earth.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Identity test, in priority order:
/// 1. Both records carry an MLS number: equality is decisive either way.
/// 2. Lowercased address plus zip match exactly.
/// 3. Both records carry coordinates within [`DUPLICATE_RADIUS_KM`].
pub fn is_duplicate(a: &Property, b: &Property) -> bool {
    if let (Some(mls_a), Some(mls_b)) = (&a.mls_number, &b.mls_number) {
        return mls_a == mls_b;
    }

    if a.address.to_lowercase() == b.address.to_lowercase() && a.zip_code == b.zip_code {
        return true;
    }

    if let (Some(lat_a), Some(lng_a), Some(lat_b), Some(lng_b)) =
        (a.latitude, a.longitude, b.latitude, b.longitude)
    {
        if haversine_km(lat_a, lng_a, lat_b, lng_b) < DUPLICATE_RADIUS_KM {
            return true;
        }
    }

    false
}

/// Partition listings into identity groups. Grouping is transitive: a record
/// joins a group when it matches any existing member.
pub fn group_duplicates(properties: Vec<Property>) -> Vec<Vec<Property>> {
    let mut groups: Vec<Vec<Property>> = Vec::new();
    'next: for property in properties {
        for group in &mut groups {
            if group.iter().any(|member| is_duplicate(member, &property)) {
                group.push(property);
                continue 'next;
            }
        }
        groups.push(vec![property]);
    }
    groups
}

/// Collapse one identity group into a single record.
///
/// The most recently scraped record is the base; all mutable fields come
/// from it. Sources are unioned, histories concatenated, and optional
/// scalars missing on the base are filled from the first other record that
/// has them. First-found fill means an older source can supply a value the
/// newest scrape deliberately dropped (a relist clearing a field, say); that
/// hazard is inherited from the documented merge policy.
///
/// # Panics
///
/// Panics on an empty input: that is a caller contract violation, not bad
/// external data.
pub fn merge_properties(mut properties: Vec<Property>) -> Property {
    assert!(
        !properties.is_empty(),
        "merge_properties requires at least one property"
    );

    if properties.len() == 1 {
        return properties.pop().expect("length checked above");
    }

    properties.sort_by(|a, b| b.last_scraped_at.cmp(&a.last_scraped_at));
    let mut merged = properties[0].clone();
    merged.data_sources.clear();
    merged.scrape_history.clear();
    merged.additional_image_urls.clear();

    for property in &properties {
        merged.data_sources.extend(property.data_sources.iter().copied());
        merged.scrape_history.extend(property.scrape_history.iter().copied());

        fill(&mut merged.latitude, property.latitude);
        fill(&mut merged.longitude, property.longitude);
        fill(&mut merged.square_feet, property.square_feet);
        fill(&mut merged.lot_size_sqft, property.lot_size_sqft);
        fill(&mut merged.year_built, property.year_built);
        fill_clone(&mut merged.mls_number, &property.mls_number);
        fill_clone(&mut merged.elementary_school, &property.elementary_school);
        fill_clone(&mut merged.middle_school, &property.middle_school);
        fill_clone(&mut merged.high_school, &property.high_school);

        for url in &property.additional_image_urls {
            if !merged.additional_image_urls.contains(url) {
                merged.additional_image_urls.push(url.clone());
            }
        }
    }

    merged
}

fn fill<T: Copy>(slot: &mut Option<T>, candidate: Option<T>) {
    if slot.is_none() {
        *slot = candidate;
    }
}

fn fill_clone<T: Clone>(slot: &mut Option<T>, candidate: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(candidate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use comps_core::{ListingSourceId, ListingStatus, PropertyType, ScrapeRecord};

    fn property(source: ListingSourceId) -> Property {
        let scraped_at = Utc::now();
        Property {
            address: "123 Main St".to_string(),
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
            square_feet: None,
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
            scrape_history: vec![ScrapeRecord {
                source,
                scraped_at,
            }],
            match_score: None,
        }
    }

    #[test]
    fn matching_mls_numbers_are_decisive() {
        let mut a = property(ListingSourceId::Zillow);
        let mut b = property(ListingSourceId::Redfin);
        a.mls_number = Some("6543210".to_string());
        b.mls_number = Some("6543210".to_string());
        b.address = "999 Somewhere Else Dr".to_string();
        b.zip_code = "85301".to_string();
        assert!(is_duplicate(&a, &b));

        b.mls_number = Some("1111111".to_string());
        b.address = a.address.clone();
        b.zip_code = a.zip_code.clone();
        // Same address, but differing MLS numbers short-circuit the test.
        assert!(!is_duplicate(&a, &b));
    }

    #[test]
    fn address_and_zip_match_without_mls() {
        let a = property(ListingSourceId::Zillow);
        let mut b = property(ListingSourceId::Redfin);
        b.address = "123 MAIN ST".to_string();
        assert!(is_duplicate(&a, &b));

        b.zip_code = "85301".to_string();
        assert!(!is_duplicate(&a, &b));
    }

    #[test]
    fn nearby_coordinates_match_distant_ones_do_not() {
        let mut a = property(ListingSourceId::Zillow);
        let mut b = property(ListingSourceId::Redfin);
        b.address = "unparsed".to_string();
        a.latitude = Some(33.448_40);
        a.longitude = Some(-112.074_00);

        // ~30 m north.
        b.latitude = Some(33.448_67);
        b.longitude = Some(-112.074_00);
        assert!(is_duplicate(&a, &b));

        // ~500 m north.
        b.latitude = Some(33.452_90);
        assert!(!is_duplicate(&a, &b));
    }

    #[test]
    fn haversine_agrees_with_known_distance() {
        // Phoenix Sky Harbor to downtown Phoenix is roughly 5 km.
        let d = haversine_km(33.4342, -112.0116, 33.4484, -112.0740);
        assert!((4.0..7.0).contains(&d), "got {d}");
    }

    #[test]
    fn merge_prefers_newest_base_and_fills_gaps_from_older() {
        let now = Utc::now();
        let mut older = property(ListingSourceId::Zillow);
        older.last_scraped_at = now - Duration::days(1);
        older.scrape_history[0].scraped_at = older.last_scraped_at;
        older.year_built = Some(1995);
        older.list_price = 390_000;

        let mut newer = property(ListingSourceId::Redfin);
        newer.last_scraped_at = now;
        newer.scrape_history[0].scraped_at = now;
        newer.year_built = None;
        newer.list_price = 405_000;

        let merged = merge_properties(vec![older, newer]);
        assert_eq!(merged.last_scraped_at, now);
        assert_eq!(merged.list_price, 405_000);
        // Gap on the newest record filled from the older source.
        assert_eq!(merged.year_built, Some(1995));
        assert_eq!(merged.data_sources.len(), 2);
        assert_eq!(merged.scrape_history.len(), 2);
    }

    #[test]
    fn merge_concatenates_images_first_seen_wins() {
        let now = Utc::now();
        let mut a = property(ListingSourceId::Zillow);
        a.last_scraped_at = now;
        a.additional_image_urls = vec!["a.jpg".to_string(), "b.jpg".to_string()];
        let mut b = property(ListingSourceId::Redfin);
        b.last_scraped_at = now - Duration::hours(1);
        b.additional_image_urls = vec!["b.jpg".to_string(), "c.jpg".to_string()];

        let merged = merge_properties(vec![b, a]);
        assert_eq!(merged.additional_image_urls, vec!["a.jpg", "b.jpg", "c.jpg"]);
    }

    #[test]
    fn merge_single_record_is_identity() {
        let a = property(ListingSourceId::Zillow);
        assert_eq!(merge_properties(vec![a.clone()]), a);
    }

    #[test]
    #[should_panic(expected = "at least one property")]
    fn merge_empty_list_panics() {
        merge_properties(Vec::new());
    }

    #[test]
    fn grouping_is_transitive_through_shared_members() {
        let mut a = property(ListingSourceId::Zillow);
        a.mls_number = Some("6543210".to_string());
        let mut b = property(ListingSourceId::Redfin);
        b.mls_number = Some("6543210".to_string());
        b.address = "different".to_string();
        let mut c = property(ListingSourceId::HomesCom);
        c.address = "456 Elsewhere Rd".to_string();
        c.zip_code = "85301".to_string();

        let groups = group_duplicates(vec![a, b, c]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1].len(), 1);
    }
}
