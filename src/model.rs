use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One reading segment as the HebCal leyning API encodes it:
/// `{"k": "Genesis", "b": "1:1", "e": "2:3", "v": 34}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Aliyah {
    #[serde(rename = "k")]
    pub book: String,
    #[serde(rename = "b")]
    pub begin: String,
    #[serde(rename = "e")]
    pub end: String,
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    pub verses: Option<u32>,
    // Special-Shabbat annotation, only ever present on haftarah parts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Aliyah {
    /// Format as "Book c:v-v" when the chapters match, "Book c:v-c:v"
    /// otherwise, with a trailing verse count when the API supplied one.
    pub fn format_range(&self) -> String {
        let range = match (self.begin.split_once(':'), self.end.split_once(':')) {
            (Some((bc, bv)), Some((ec, ev))) if bc == ec => format!("{}:{}-{}", bc, bv, ev),
            _ => format!("{}-{}", self.begin, self.end),
        };
        match self.verses {
            Some(v) => format!("{} {} ({})", self.book, range, v),
            None => format!("{} {}", self.book, range),
        }
    }
}

/// The API emits a single object for a one-part haftarah and an array when
/// the reading is stitched from several passages.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Haftarah {
    Single(Aliyah),
    Parts(Vec<Aliyah>),
}

impl Haftarah {
    /// Display string for the whole haftarah. Multi-part readings join the
    /// ranges with ", ", keep the first part's book, and sum verse counts.
    pub fn format(&self) -> String {
        match self {
            Haftarah::Single(part) => part.format_range(),
            Haftarah::Parts(parts) => {
                let Some(first) = parts.first() else {
                    return String::new();
                };
                let ranges: Vec<String> = parts
                    .iter()
                    .map(|p| format!("{}-{}", p.begin, p.end))
                    .collect();
                let total: u32 = parts.iter().filter_map(|p| p.verses).sum();
                if total > 0 {
                    format!("{} {} ({})", first.book, ranges.join(", "), total)
                } else {
                    format!("{} {}", first.book, ranges.join(", "))
                }
            }
        }
    }

    pub fn special_reason(&self) -> Option<String> {
        match self {
            Haftarah::Single(part) => part.reason.clone(),
            Haftarah::Parts(parts) => parts.iter().find_map(|p| p.reason.clone()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ReadingName {
    pub en: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub he: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingType {
    FastDay,
    RoshChodesh,
    CholHamoed,
    Regular,
}

/// One calendar entry from the leyning feed. Immutable once fetched; the
/// merge stage reads it and produces an [`EnrichedRecord`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReadingRecord {
    pub date: NaiveDate,
    pub hdate: String,
    pub name: ReadingName,
    /// Shabbat/holiday aliyot keyed "1".."7" plus "M" for Maftir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fullkriyah: Option<BTreeMap<String, Aliyah>>,
    /// Weekday aliyot keyed "1".."3".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekday: Option<BTreeMap<String, Aliyah>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub haft: Option<Haftarah>,
    /// Free-form special-occasion annotations, e.g. {"haftara": "Shabbat Shuva"}.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<serde_json::Value>,
}

impl ReadingRecord {
    pub fn english_name(&self) -> &str {
        &self.name.en
    }

    pub fn reading_type(&self) -> ReadingType {
        let lower = self.name.en.to_lowercase();
        if lower.contains("fast") || lower.contains("taanit") {
            ReadingType::FastDay
        } else if lower.contains("rosh chodesh") {
            ReadingType::RoshChodesh
        } else if lower.contains("chol ha-moed") || lower.contains("chol hamoed") {
            ReadingType::CholHamoed
        } else {
            ReadingType::Regular
        }
    }

    /// Special days land on the Minyan tab instead of getting their own tab.
    pub fn is_special_day(&self) -> bool {
        self.reading_type() != ReadingType::Regular
    }

    /// True for entries the Minyan tab should list: weekday readings plus
    /// special days that carry a full kriyah.
    pub fn is_minyan_reading(&self) -> bool {
        self.weekday.is_some() || (self.fullkriyah.is_some() && self.is_special_day())
    }

    pub fn minyan_aliyot(&self) -> Option<&BTreeMap<String, Aliyah>> {
        self.weekday.as_ref().or(self.fullkriyah.as_ref())
    }

    /// Formatted API haftarah, if the record has one.
    pub fn api_haftarah(&self) -> Option<String> {
        self.haft.as_ref().map(Haftarah::format)
    }

    /// Special-Shabbat name, from the top-level reason map or the haftarah
    /// parts themselves.
    pub fn special_shabbat(&self) -> Option<String> {
        if let Some(serde_json::Value::Object(map)) = &self.reason
            && let Some(serde_json::Value::String(s)) = map.get("haftara")
        {
            return Some(s.clone());
        }
        self.haft.as_ref().and_then(Haftarah::special_reason)
    }

    /// (total, parsha-only) verse counts across the full kriyah; Maftir
    /// counts toward the total but not the parsha.
    pub fn verse_counts(&self) -> (u32, u32) {
        let mut total = 0;
        let mut parsha = 0;
        if let Some(kriyah) = &self.fullkriyah {
            for (key, aliyah) in kriyah {
                let v = aliyah.verses.unwrap_or(0);
                total += v;
                if key != "M" {
                    parsha += v;
                }
            }
        }
        (total, parsha)
    }

    /// Hebrew date without the year: "26 Tevet 5784" -> "26 Tevet".
    pub fn hdate_short(&self) -> String {
        let parts: Vec<&str> = self.hdate.split_whitespace().collect();
        match parts.as_slice() {
            [day, month, _year] => format!("{} {}", day, month),
            _ => self.hdate.clone(),
        }
    }
}

/// Page numbers and verse overrides for one parsha, loaded from the CSV.
/// Absent fields fall back per-field to the API values during merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideEntry {
    pub torah_page: Option<u32>,
    pub haftarah_page: Option<u32>,
    pub haftarah_verses: Option<String>,
}

/// A ReadingRecord with pages and haftarah verses resolved against the
/// override table. Built per record by the merge stage and handed straight
/// to the sheet builder.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
    pub record: ReadingRecord,
    pub torah_page: Option<u32>,
    pub haftarah_page: Option<u32>,
    /// Never empty when the record carries a haftarah: override if present,
    /// API value otherwise.
    pub haftarah_verses: Option<String>,
}

/// Map keys are normalized this way on both sides, since the CSV and the API
/// spell the same parsha independently.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

pub fn roman_numeral(mut num: u32) -> String {
    const SYMBOLS: [(&str, u32); 13] = [
        ("M", 1000),
        ("CM", 900),
        ("D", 500),
        ("CD", 400),
        ("C", 100),
        ("XC", 90),
        ("L", 50),
        ("XL", 40),
        ("X", 10),
        ("IX", 9),
        ("V", 5),
        ("IV", 4),
        ("I", 1),
    ];
    let mut result = String::new();
    for (symbol, value) in SYMBOLS {
        while num >= value {
            result.push_str(symbol);
            num -= value;
        }
    }
    result
}

/// Row label for an aliyah map key: digits become roman numerals, Maftir
/// becomes "Maf".
pub fn aliyah_label(key: &str) -> String {
    if key == "M" {
        return "Maf".to_string();
    }
    match key.parse::<u32>() {
        Ok(n) => roman_numeral(n),
        Err(_) => key.to_string(),
    }
}
