use crate::config::Credentials;
use crate::http::{Backoff, HttpsClient, build_client, send_with_retry};
use crate::model::{EnrichedRecord, ReadingType, aliyah_label};
use anyhow::{Context, Result, anyhow, bail};
use chrono::Datelike;
use http::Request;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

pub const MINYAN_TAB: &str = "Minyan";

/// Ids returned by document creation: the document itself plus the sheet id
/// of the Minyan tab, which formatting requests address by number.
#[derive(Debug, Clone)]
pub struct CreatedSpreadsheet {
    pub spreadsheet_id: String,
    pub minyan_sheet_id: i64,
}

/// Client for the spreadsheet backend: create document, add tab, write an
/// A1 cell range, share with an address. Writes share the fetcher's retry
/// policy for 429/5xx responses.
pub struct SheetsClient {
    client: HttpsClient,
    creds: Credentials,
    backoff: Backoff,
}

impl SheetsClient {
    pub fn new(creds: Credentials) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            creds,
            backoff: Backoff::default(),
        })
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    async fn request_json(&self, method: &str, url: &str, body: Value) -> Result<Value> {
        let payload = body.to_string();
        let (parts, bytes) = send_with_retry(&self.client, self.backoff.clone(), url, || {
            Request::builder()
                .method(method)
                .uri(url)
                .header(
                    http::header::AUTHORIZATION,
                    format!("Bearer {}", self.creds.token),
                )
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(payload.clone())
                .context("building spreadsheet request")
        })
        .await?;

        if !parts.status.is_success() {
            let detail = String::from_utf8_lossy(&bytes);
            bail!(
                "spreadsheet backend returned HTTP {} for {}: {}",
                parts.status,
                url,
                detail.chars().take(200).collect::<String>()
            );
        }
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).context("decoding spreadsheet response")
    }

    /// Create the document with the Minyan tab as its first sheet.
    pub async fn create_spreadsheet(&self, title: &str) -> Result<CreatedSpreadsheet> {
        let body = json!({
            "properties": { "title": title },
            "sheets": [ { "properties": { "title": MINYAN_TAB } } ]
        });
        let url = format!("{}/v4/spreadsheets", self.creds.sheets_url);
        let response = self.request_json("POST", &url, body).await?;
        let id = response
            .get("spreadsheetId")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("create response is missing spreadsheetId"))?;
        let minyan_sheet_id = response
            .pointer("/sheets/0/properties/sheetId")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        info!("created spreadsheet '{}' ({})", title, id);
        Ok(CreatedSpreadsheet {
            spreadsheet_id: id.to_string(),
            minyan_sheet_id,
        })
    }

    async fn batch_update(&self, spreadsheet_id: &str, requests: Vec<Value>) -> Result<Value> {
        let url = format!(
            "{}/v4/spreadsheets/{}:batchUpdate",
            self.creds.sheets_url, spreadsheet_id
        );
        self.request_json("POST", &url, json!({ "requests": requests }))
            .await
    }

    pub async fn add_tab(&self, spreadsheet_id: &str, title: &str) -> Result<()> {
        let request = json!({ "addSheet": { "properties": { "title": title } } });
        self.batch_update(spreadsheet_id, vec![request])
            .await
            .with_context(|| format!("adding tab '{}'", title))?;
        debug!("added tab '{}'", title);
        Ok(())
    }

    /// Apply cell-formatting requests built by the layout helpers.
    pub async fn apply_formats(&self, spreadsheet_id: &str, requests: Vec<Value>) -> Result<()> {
        if requests.is_empty() {
            return Ok(());
        }
        let count = requests.len();
        self.batch_update(spreadsheet_id, requests)
            .await
            .context("applying cell formatting")?;
        debug!("applied {} formatting requests", count);
        Ok(())
    }

    /// Write a block of rows starting at A1 of the given tab.
    pub async fn write_rows(
        &self,
        spreadsheet_id: &str,
        tab: &str,
        rows: &[Vec<String>],
    ) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let range = format!("'{}'!A1", tab);
        let url = format!(
            "{}/v4/spreadsheets/{}/values/{}?valueInputOption=USER_ENTERED",
            self.creds.sheets_url,
            spreadsheet_id,
            encode_range(&range)
        );
        let body = json!({ "range": range, "values": rows });
        self.request_json("PUT", &url, body)
            .await
            .with_context(|| format!("writing {} rows to tab '{}'", rows.len(), tab))?;
        debug!("wrote {} rows to '{}'", rows.len(), tab);
        Ok(())
    }

    /// Grant read/write access to the given address. Kept separate from
    /// publish so a failed share can be retried without rewriting tabs.
    pub async fn share(&self, spreadsheet_id: &str, email: &str) -> Result<()> {
        let body = json!({
            "type": "user",
            "role": "writer",
            "emailAddress": email
        });
        let url = format!(
            "{}/drive/v3/files/{}/permissions",
            self.creds.drive_url, spreadsheet_id
        );
        self.request_json("POST", &url, body)
            .await
            .with_context(|| format!("sharing spreadsheet with {}", email))?;
        info!("shared spreadsheet with {}", email);
        Ok(())
    }

    /// Build the whole document: Minyan tab, one tab per distinct parsha,
    /// then share. A share failure leaves the written tabs in place and is
    /// reported as a warning, not an error.
    pub async fn publish(
        &self,
        records: &[EnrichedRecord],
        sheet_name: &str,
        email: &str,
    ) -> Result<String> {
        let created = self.create_spreadsheet(sheet_name).await?;
        let spreadsheet_id = created.spreadsheet_id;

        let layout = minyan_layout(records);
        self.write_rows(&spreadsheet_id, MINYAN_TAB, &layout.rows)
            .await?;
        self.apply_formats(
            &spreadsheet_id,
            minyan_format_requests(created.minyan_sheet_id, &layout.headers),
        )
        .await?;

        for (name, record) in parsha_tabs(records) {
            self.add_tab(&spreadsheet_id, &name).await?;
            self.write_rows(&spreadsheet_id, &name, &parsha_rows(record))
                .await?;
        }

        if let Err(e) = self.share(&spreadsheet_id, email).await {
            warn!("tabs written, but sharing failed: {:#}", e);
        }
        Ok(spreadsheet_id)
    }
}

/// Percent-encode an A1 range for use in a URL path segment.
fn encode_range(range: &str) -> String {
    let mut out = String::with_capacity(range.len());
    for byte in range.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'!' | b':' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Distinct non-special parsha names in order of first appearance, each
/// paired with its representative record (the first one carrying a full
/// kriyah, else the first seen). Weekday entries count toward grouping, so
/// a parsha whose Shabbat falls outside the range still gets a tab.
pub fn parsha_tabs(records: &[EnrichedRecord]) -> Vec<(String, &EnrichedRecord)> {
    let mut tabs: Vec<(String, &EnrichedRecord)> = Vec::new();
    for enriched in records {
        if enriched.record.is_special_day() {
            continue;
        }
        let name = enriched.record.english_name().to_string();
        match tabs.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => {
                if existing.record.fullkriyah.is_none() && enriched.record.fullkriyah.is_some() {
                    *existing = enriched;
                }
            }
            None => tabs.push((name, enriched)),
        }
    }
    tabs
}

/// Minyan row text plus the header positions needing formatting, built in
/// one pass so the writer and the formatter cannot drift apart.
#[derive(Debug, Clone)]
pub struct MinyanLayout {
    pub rows: Vec<Vec<String>>,
    /// 0-based row index and reading type of each per-reading header row.
    pub headers: Vec<(usize, ReadingType)>,
}

/// Rows for the Minyan tab: every weekday/special-day reading in date order,
/// a header row per reading followed by its aliyot, blank row between.
pub fn minyan_layout(records: &[EnrichedRecord]) -> MinyanLayout {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut headers: Vec<(usize, ReadingType)> = Vec::new();
    for enriched in records {
        let record = &enriched.record;
        if !record.is_minyan_reading() {
            continue;
        }
        headers.push((rows.len(), record.reading_type()));
        rows.push(vec![
            record.date.format("%b %d").to_string(),
            record.hdate_short(),
            record.english_name().to_string(),
            record.date.format("%A").to_string(),
        ]);
        if let Some(aliyot) = record.minyan_aliyot() {
            for (key, aliyah) in aliyot {
                // Maftir is not read on weekdays.
                if key == "M" {
                    continue;
                }
                rows.push(vec![
                    aliyah_label(key),
                    aliyah.format_range(),
                    String::new(),
                    String::new(),
                ]);
            }
        }
        rows.push(vec![String::new(); 4]);
    }
    MinyanLayout { rows, headers }
}

pub fn minyan_rows(records: &[EnrichedRecord]) -> Vec<Vec<String>> {
    minyan_layout(records).rows
}

/// batchUpdate requests making each Minyan header row bold, centered and
/// color-coded by reading type, as the printed schedules have it.
pub fn minyan_format_requests(sheet_id: i64, headers: &[(usize, ReadingType)]) -> Vec<Value> {
    headers
        .iter()
        .map(|&(row, reading_type)| {
            json!({
                "repeatCell": {
                    "range": {
                        "sheetId": sheet_id,
                        "startRowIndex": row,
                        "endRowIndex": row + 1,
                        "startColumnIndex": 0,
                        "endColumnIndex": 4
                    },
                    "cell": {
                        "userEnteredFormat": {
                            "backgroundColor": header_color(reading_type),
                            "textFormat": { "bold": true },
                            "horizontalAlignment": "CENTER"
                        }
                    },
                    "fields": "userEnteredFormat(backgroundColor,textFormat,horizontalAlignment)"
                }
            })
        })
        .collect()
}

// Fast days red, Rosh Chodesh and Chol Ha-moed green, everything else gray.
fn header_color(reading_type: ReadingType) -> Value {
    let (red, green, blue) = match reading_type {
        ReadingType::FastDay => (1.0, 0.8, 0.8),
        ReadingType::RoshChodesh | ReadingType::CholHamoed => (0.8, 1.0, 0.8),
        ReadingType::Regular => (0.9, 0.9, 0.9),
    };
    json!({ "red": red, "green": green, "blue": blue })
}

/// Rows for one parsha tab: header, aliyah rows (label, range, page, blank
/// honor cell), Maftir, Haftarah, then the honors footer with Etz Hayim
/// pages.
pub fn parsha_rows(enriched: &EnrichedRecord) -> Vec<Vec<String>> {
    let record = &enriched.record;
    let (total, parsha) = record.verse_counts();
    let torah_page = page_cell("Torah page", enriched.torah_page);
    let haftarah_page = page_cell("Haftarah page", enriched.haftarah_page);

    let mut rows = vec![
        vec![
            record.english_name().to_string(),
            format!("{} {}", record.date.format("%B"), record.date.day()),
            record.hdate_short(),
            record.special_shabbat().unwrap_or_default(),
        ],
        vec![String::new(); 4],
        vec![
            format!("Full kriyah - {} verses (parsha={})", total, parsha),
            String::new(),
            "Etz Hayim".to_string(),
            "Honors".to_string(),
        ],
    ];

    if let Some(kriyah) = &record.fullkriyah {
        for (key, aliyah) in kriyah.iter().filter(|(k, _)| *k != "M") {
            rows.push(vec![
                aliyah_label(key),
                aliyah.format_range(),
                enriched
                    .torah_page
                    .map(|p| p.to_string())
                    .unwrap_or_default(),
                String::new(), // honor assignment, filled in by hand
            ]);
        }
        if let Some(maftir) = kriyah.get("M") {
            rows.push(vec![
                aliyah_label("M"),
                maftir.format_range(),
                String::new(),
                String::new(),
            ]);
        }
    }

    if let Some(verses) = &enriched.haftarah_verses {
        rows.push(vec![
            "Haf".to_string(),
            verses.clone(),
            enriched
                .haftarah_page
                .map(|p| p.to_string())
                .unwrap_or_default(),
            String::new(),
        ]);
    }

    rows.push(vec![String::new(); 4]);
    // Etz Hayim pages sit beside the P'ticha honor slots.
    rows.push(vec![
        "P'ticha 1".to_string(),
        String::new(),
        torah_page,
        String::new(),
    ]);
    rows.push(vec![
        "P'ticha 2".to_string(),
        String::new(),
        haftarah_page,
        String::new(),
    ]);
    for label in ["Hagbah", "G'lilah"] {
        rows.push(vec![
            label.to_string(),
            String::new(),
            String::new(),
            String::new(),
        ]);
    }
    rows
}

fn page_cell(label: &str, page: Option<u32>) -> String {
    match page {
        Some(p) => format!("{} {}", label, p),
        None => label.to_string(),
    }
}
