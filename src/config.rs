use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

const DEFAULT_SHEETS_URL: &str = "https://sheets.googleapis.com";
const DEFAULT_DRIVE_URL: &str = "https://www.googleapis.com";

/// Spreadsheet backend credentials, read from a JSON file (default
/// `credentials.json`). Endpoint overrides exist so tests can point the
/// client at a mock server.
#[derive(Deserialize, Debug, Clone)]
pub struct Credentials {
    pub token: String,
    #[serde(default = "default_sheets_url")]
    pub sheets_url: String,
    #[serde(default = "default_drive_url")]
    pub drive_url: String,
}

fn default_sheets_url() -> String {
    DEFAULT_SHEETS_URL.to_string()
}

fn default_drive_url() -> String {
    DEFAULT_DRIVE_URL.to_string()
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading credentials file {}", path.display()))?;
        let creds: Self = serde_json::from_str(&contents)
            .with_context(|| format!("parsing credentials file {}", path.display()))?;
        Ok(creds)
    }
}
