//! Region to language lookup.
//!
//! Two static tables: the language recorded on outputs, and the more specific
//! variant requested from the translator. Unmapped regions fall back to the
//! source language and skip translation.

pub const SOURCE_LANGUAGE: &str = "English";

const REGIONS: &[(&str, &str, &str)] = &[
    ("quebec", "French", "French (Canadian)"),
    ("france", "French", "French"),
    ("mexico", "Spanish", "Spanish (Mexican)"),
    ("spain", "Spanish", "Spanish"),
    ("india", "Hindi", "Hindi"),
    ("japan", "Japanese", "Japanese"),
    ("china", "Chinese", "Chinese (Simplified)"),
    ("germany", "German", "German"),
    ("brazil", "Portuguese", "Portuguese (Brazilian)"),
];

fn lookup(region: &str) -> Option<&'static (&'static str, &'static str, &'static str)> {
    let key = region.trim().to_lowercase();
    REGIONS.iter().find(|(r, _, _)| *r == key)
}

/// Language name recorded on every output for `region`.
pub fn language_for_region(region: &str) -> &'static str {
    lookup(region).map(|(_, lang, _)| *lang).unwrap_or(SOURCE_LANGUAGE)
}

/// Translator target for `region`, or `None` when no translation is needed.
pub fn translation_target(region: &str) -> Option<&'static str> {
    lookup(region).map(|(_, _, target)| *target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_region_maps_both_ways() {
        for (region, lang, target) in REGIONS {
            assert_eq!(language_for_region(region), *lang);
            assert_eq!(translation_target(region), Some(*target));
            assert!(target.starts_with(lang));
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(language_for_region("France"), "French");
        assert_eq!(language_for_region("  QUEBEC "), "French");
        assert_eq!(translation_target("Quebec"), Some("French (Canadian)"));
    }

    #[test]
    fn test_unmapped_region_defaults_to_source() {
        assert_eq!(language_for_region("usa"), SOURCE_LANGUAGE);
        assert_eq!(language_for_region(""), SOURCE_LANGUAGE);
        assert_eq!(translation_target("canada"), None);
    }
}
