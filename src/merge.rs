use crate::model::{EnrichedRecord, ReadingRecord, normalize_name};
use crate::overrides::OverrideTable;

/// Resolve one reading against the override table. Pure: the record and the
/// table are left untouched.
///
/// Fallback is per-field: an override row that only fills in the Torah page
/// still takes its haftarah verses and haftarah page from the API record.
pub fn enrich(record: &ReadingRecord, overrides: &OverrideTable) -> EnrichedRecord {
    let entry = overrides.get(&normalize_name(record.english_name()));

    let haftarah_verses = entry
        .and_then(|e| e.haftarah_verses.clone())
        .or_else(|| record.api_haftarah());

    EnrichedRecord {
        record: record.clone(),
        torah_page: entry.and_then(|e| e.torah_page),
        haftarah_page: entry.and_then(|e| e.haftarah_page),
        haftarah_verses,
    }
}

/// Enrich a whole fetch result, preserving order.
pub fn enrich_all(records: &[ReadingRecord], overrides: &OverrideTable) -> Vec<EnrichedRecord> {
    records.iter().map(|r| enrich(r, overrides)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Aliyah, Haftarah, OverrideEntry, ReadingName};
    use chrono::NaiveDate;

    fn record(name: &str, haft: Option<Haftarah>) -> ReadingRecord {
        ReadingRecord {
            date: NaiveDate::from_ymd_opt(2024, 10, 26).unwrap(),
            hdate: "24 Tishrei 5785".to_string(),
            name: ReadingName {
                en: name.to_string(),
                he: None,
            },
            fullkriyah: None,
            weekday: None,
            haft,
            reason: None,
        }
    }

    fn isaiah_haft() -> Haftarah {
        Haftarah::Single(Aliyah {
            book: "Isaiah".to_string(),
            begin: "42:5".to_string(),
            end: "43:25".to_string(),
            verses: None,
            reason: None,
        })
    }

    #[test]
    fn absent_entry_falls_back_to_api() {
        let rec = record("Bereishit", Some(isaiah_haft()));
        let enriched = enrich(&rec, &OverrideTable::new());
        assert_eq!(enriched.torah_page, None);
        assert_eq!(enriched.haftarah_page, None);
        assert_eq!(
            enriched.haftarah_verses.as_deref(),
            Some("Isaiah 42:5-43:25")
        );
    }

    #[test]
    fn override_wins_over_api_verses() {
        let rec = record("Bereishit", Some(isaiah_haft()));
        let mut table = OverrideTable::new();
        table.insert(
            normalize_name("Bereishit"),
            OverrideEntry {
                torah_page: Some(3),
                haftarah_page: Some(36),
                haftarah_verses: Some("Isaiah 42:5-43:10".to_string()),
            },
        );
        let enriched = enrich(&rec, &table);
        assert_eq!(enriched.torah_page, Some(3));
        assert_eq!(enriched.haftarah_page, Some(36));
        assert_eq!(
            enriched.haftarah_verses.as_deref(),
            Some("Isaiah 42:5-43:10")
        );
    }

    #[test]
    fn partial_override_is_field_level() {
        let rec = record("Noach", Some(isaiah_haft()));
        let mut table = OverrideTable::new();
        table.insert(
            normalize_name("Noach"),
            OverrideEntry {
                torah_page: Some(6),
                haftarah_page: None,
                haftarah_verses: None,
            },
        );
        let enriched = enrich(&rec, &table);
        assert_eq!(enriched.torah_page, Some(6));
        assert_eq!(enriched.haftarah_page, None);
        // Unpopulated verse override falls back to the API value.
        assert_eq!(
            enriched.haftarah_verses.as_deref(),
            Some("Isaiah 42:5-43:25")
        );
    }

    #[test]
    fn lookup_is_case_and_whitespace_insensitive() {
        let rec = record("  BEREISHIT ", None);
        let mut table = OverrideTable::new();
        table.insert(
            normalize_name("Bereishit"),
            OverrideEntry {
                torah_page: Some(3),
                ..Default::default()
            },
        );
        assert_eq!(enrich(&rec, &table).torah_page, Some(3));
    }

    #[test]
    fn inputs_are_not_mutated() {
        let rec = record("Bereishit", Some(isaiah_haft()));
        let before = rec.clone();
        let table = OverrideTable::new();
        let _ = enrich(&rec, &table);
        assert_eq!(rec, before);
        assert!(table.is_empty());
    }
}
