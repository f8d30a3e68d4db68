//! Per-field canonicalization. Every function here is pure, total over its
//! input, and a fixed point: feeding a canonical value back in returns it
//! unchanged.

use comps_core::PropertyType;

/// Street-suffix synonyms, matched case-insensitively against the final
/// address token, first match wins. Canonical forms map to themselves so the
/// pass is idempotent.
pub const STREET_SUFFIXES: &[(&str, &str)] = &[
    ("street", "St"),
    ("st", "St"),
    ("avenue", "Ave"),
    ("ave", "Ave"),
    ("road", "Rd"),
    ("rd", "Rd"),
    ("drive", "Dr"),
    ("dr", "Dr"),
    ("lane", "Ln"),
    ("ln", "Ln"),
    ("boulevard", "Blvd"),
    ("blvd", "Blvd"),
    ("court", "Ct"),
    ("ct", "Ct"),
    ("place", "Pl"),
    ("pl", "Pl"),
    ("way", "Way"),
    ("circle", "Cir"),
    ("cir", "Cir"),
    ("parkway", "Pkwy"),
    ("pkwy", "Pkwy"),
    ("terrace", "Ter"),
    ("ter", "Ter"),
];

/// Free-text property-type patterns, substring-matched against the
/// lowercased input in order; unmatched input is a single-family home.
pub const PROPERTY_TYPE_PATTERNS: &[(&str, PropertyType)] = &[
    ("condo", PropertyType::Condo),
    ("townhouse", PropertyType::Townhouse),
    ("townhome", PropertyType::Townhouse),
    ("multi", PropertyType::MultiFamily),
    ("duplex", PropertyType::MultiFamily),
    ("triplex", PropertyType::MultiFamily),
    ("manufactured", PropertyType::Manufactured),
    ("mobile", PropertyType::Manufactured),
    ("land", PropertyType::Land),
    ("lot", PropertyType::Land),
];

/// Multi-word city spellings that must survive canonicalization intact.
pub const MULTI_WORD_CITIES: &[&str] = &[
    "El Mirage",
    "Sun City West",
    "Sun City",
    "Paradise Valley",
    "Cave Creek",
    "Litchfield Park",
    "Queen Creek",
    "Fountain Hills",
];

/// Leading board prefixes stripped from MLS numbers, longest first.
pub const MLS_PREFIXES: &[&str] = &["ARMLS", "MLS", "AZ"];

const SQFT_PER_ACRE: f64 = 43_560.0;

/// Open interval of believable list prices; anything outside is a scrape
/// error and zeroes out.
pub const PRICE_MIN_EXCLUSIVE: f64 = 10_000.0;
pub const PRICE_MAX_EXCLUSIVE: f64 = 100_000_000.0;

pub const YEAR_BUILT_MIN: i32 = 1800;

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Re-space commas and periods: no space before, exactly one after (except
/// at end of string).
fn respace_punctuation(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 4);
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            ',' | '.' => {
                while out.ends_with(' ') {
                    out.pop();
                }
                out.push(ch);
                while chars.peek() == Some(&' ') {
                    chars.next();
                }
                if chars.peek().is_some() {
                    out.push(' ');
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Canonical street address: collapsed whitespace, normalized punctuation
/// spacing, uppercased single-letter directional after the house number, and
/// the trailing street suffix abbreviated per [`STREET_SUFFIXES`].
pub fn normalize_address(address: &str) -> String {
    let spaced = respace_punctuation(&collapse_whitespace(address));
    let mut tokens: Vec<String> = spaced.split(' ').map(str::to_string).collect();

    if tokens.len() >= 3 && tokens[0].chars().all(|c| c.is_ascii_digit()) {
        let directional = tokens[1].trim_end_matches('.');
        if directional.len() == 1 && "NSEWnsew".contains(directional) {
            tokens[1] = directional.to_ascii_uppercase();
        }
    }

    if let Some(last) = tokens.last_mut() {
        let bare = last.trim_end_matches('.');
        if let Some((_, canonical)) = STREET_SUFFIXES
            .iter()
            .find(|(synonym, _)| synonym.eq_ignore_ascii_case(bare))
        {
            *last = (*canonical).to_string();
        }
    }

    tokens.join(" ")
}

/// Title-case each word, then restore the closed set of multi-word city
/// spellings.
pub fn normalize_city(city: &str) -> String {
    let titled = city
        .split_whitespace()
        .map(title_case_word)
        .collect::<Vec<_>>()
        .join(" ");
    for canonical in MULTI_WORD_CITIES {
        if titled.eq_ignore_ascii_case(canonical) {
            return (*canonical).to_string();
        }
    }
    titled
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => {
            let mut out = String::new();
            out.extend(first.to_uppercase());
            out.push_str(&chars.as_str().to_lowercase());
            out
        }
        None => String::new(),
    }
}

/// Extract the first run of five consecutive digits; other text passes
/// through trimmed and uninterpreted.
pub fn normalize_zip(zip: &str) -> String {
    let chars: Vec<char> = zip.chars().collect();
    let mut run_start = 0;
    let mut run_len = 0;
    for (i, ch) in chars.iter().enumerate() {
        if ch.is_ascii_digit() {
            if run_len == 0 {
                run_start = i;
            }
            run_len += 1;
            if run_len == 5 {
                return chars[run_start..=i].iter().collect();
            }
        } else {
            run_len = 0;
        }
    }
    zip.trim().to_string()
}

/// Prices outside the plausible open window are scrape errors and zero out;
/// the record itself is kept.
pub fn normalize_price(price: f64) -> u64 {
    if price > PRICE_MIN_EXCLUSIVE && price < PRICE_MAX_EXCLUSIVE {
        price.round() as u64
    } else {
        0
    }
}

/// Classify free-text property descriptions into the closed category set.
pub fn normalize_property_type(raw: Option<&str>) -> PropertyType {
    let Some(text) = raw else {
        return PropertyType::SingleFamily;
    };
    let lowered = text.to_lowercase();
    PROPERTY_TYPE_PATTERNS
        .iter()
        .find(|(pattern, _)| lowered.contains(pattern))
        .map(|(_, property_type)| *property_type)
        .unwrap_or(PropertyType::SingleFamily)
}

/// Convert a raw lot size to square feet. Values under `acre_threshold` are
/// assumed to be acres, a known approximation that mis-reads genuinely tiny
/// square-foot lots and very large acreages.
pub fn normalize_lot_size(lot_size: f64, acre_threshold: f64) -> Option<u32> {
    if lot_size <= 0.0 {
        return None;
    }
    let sqft = if lot_size < acre_threshold {
        lot_size * SQFT_PER_ACRE
    } else {
        lot_size
    };
    Some(sqft.round() as u32)
}

/// Years outside [1800, current_year + 2] are dropped; the record is kept.
pub fn normalize_year_built(year: i32, current_year: i32) -> Option<i32> {
    if (YEAR_BUILT_MIN..=current_year + 2).contains(&year) {
        Some(year)
    } else {
        None
    }
}

const SCHOOL_SUFFIXES: &[(&str, &str)] = &[
    ("elementary school", "Elementary"),
    ("middle school", "Middle"),
    ("high school", "High"),
    ("school", "School"),
];

/// Collapse whitespace and shorten the trailing school-level suffix.
pub fn normalize_school_name(name: &str) -> String {
    let collapsed = collapse_whitespace(name);
    for (suffix, replacement) in SCHOOL_SUFFIXES {
        if collapsed.len() >= suffix.len()
            && collapsed.is_char_boundary(collapsed.len() - suffix.len())
        {
            let (head, tail) = collapsed.split_at(collapsed.len() - suffix.len());
            if tail.eq_ignore_ascii_case(suffix) {
                return format!("{head}{replacement}");
            }
        }
    }
    collapsed
}

/// Uppercase, strip leading board prefixes to a fixed point, and keep only
/// alphanumerics.
pub fn normalize_mls_number(mls: &str) -> String {
    let mut value = mls.to_uppercase();
    loop {
        let trimmed = value.trim_start_matches(['#', ':', ' ', '\t']);
        let mut next = trimmed.to_string();
        for prefix in MLS_PREFIXES {
            if let Some(rest) = next.strip_prefix(prefix) {
                next = rest.to_string();
                break;
            }
        }
        if next == value {
            break;
        }
        value = next;
    }
    value.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn street_suffixes_abbreviate() {
        assert_eq!(normalize_address("123 Main Street"), "123 Main St");
        assert_eq!(normalize_address("456 N Elm Avenue"), "456 N Elm Ave");
        assert_eq!(normalize_address("789 Desert Bloom Pkwy."), "789 Desert Bloom Pkwy");
    }

    #[test]
    fn directional_prefix_uppercases() {
        assert_eq!(normalize_address("123 n Central Ave"), "123 N Central Ave");
        // Not a directional position: no house number first.
        assert_eq!(normalize_address("n Central Ave"), "n Central Ave");
    }

    #[test]
    fn whitespace_and_punctuation_collapse() {
        assert_eq!(
            normalize_address("  123   E  Oak   St ,Phoenix"),
            "123 E Oak St, Phoenix"
        );
    }

    #[test]
    fn address_normalization_is_idempotent() {
        let once = normalize_address("9601  w Sun City   Boulevard");
        assert_eq!(normalize_address(&once), once);
    }

    #[test]
    fn city_title_case_and_multi_word_fixes() {
        assert_eq!(normalize_city("phoenix"), "Phoenix");
        assert_eq!(normalize_city("SUN CITY WEST"), "Sun City West");
        assert_eq!(normalize_city("el  mirage"), "El Mirage");
        assert_eq!(normalize_city("paradise valley"), "Paradise Valley");
    }

    #[test]
    fn zip_extracts_first_five_digit_run() {
        assert_eq!(normalize_zip("85254-1234"), "85254");
        assert_eq!(normalize_zip("AZ 85254"), "85254");
        assert_eq!(normalize_zip(" 8525 "), "8525");
    }

    #[test]
    fn price_window_is_exclusive() {
        assert_eq!(normalize_price(350_000.0), 350_000);
        assert_eq!(normalize_price(10_000.0), 0);
        assert_eq!(normalize_price(9_999.0), 0);
        assert_eq!(normalize_price(100_000_000.0), 0);
        assert_eq!(normalize_price(350_000.4), 350_000);
    }

    #[test]
    fn property_type_patterns_cover_the_table() {
        for (pattern, expected) in PROPERTY_TYPE_PATTERNS {
            assert_eq!(normalize_property_type(Some(pattern)), *expected);
        }
        assert_eq!(
            normalize_property_type(Some("Luxury Townhome w/ garage")),
            PropertyType::Townhouse
        );
        assert_eq!(normalize_property_type(Some("Ranch")), PropertyType::SingleFamily);
        assert_eq!(normalize_property_type(None), PropertyType::SingleFamily);
    }

    #[test]
    fn lot_size_acre_heuristic_round_trip() {
        assert_eq!(normalize_lot_size(1.0, 500.0), Some(43_560));
        assert_eq!(normalize_lot_size(5_000.0, 500.0), Some(5_000));
        assert_eq!(normalize_lot_size(0.25, 500.0), Some(10_890));
        assert_eq!(normalize_lot_size(0.0, 500.0), None);
    }

    #[test]
    fn year_built_window() {
        assert_eq!(normalize_year_built(1995, 2026), Some(1995));
        assert_eq!(normalize_year_built(2028, 2026), Some(2028));
        assert_eq!(normalize_year_built(2029, 2026), None);
        assert_eq!(normalize_year_built(1799, 2026), None);
    }

    #[test]
    fn school_suffixes_shorten() {
        assert_eq!(normalize_school_name("Kyrene  Elementary School"), "Kyrene Elementary");
        assert_eq!(normalize_school_name("Desert Ridge High School"), "Desert Ridge High");
        assert_eq!(normalize_school_name("Madison middle school"), "Madison Middle");
        assert_eq!(normalize_school_name("Great Hearts school"), "Great Hearts School");
        assert_eq!(normalize_school_name("Sunset High"), "Sunset High");
    }

    #[test]
    fn mls_numbers_strip_prefixes_and_punctuation() {
        assert_eq!(normalize_mls_number("MLS# 6543210"), "6543210");
        assert_eq!(normalize_mls_number("armls: 6543210"), "6543210");
        assert_eq!(normalize_mls_number("AZ-6543210"), "6543210");
        assert_eq!(normalize_mls_number("65-432-10"), "6543210");
    }

    #[test]
    fn mls_normalization_is_idempotent() {
        let once = normalize_mls_number("MLSMLS 123");
        assert_eq!(normalize_mls_number(&once), once);
    }
}
