use anyhow::{Context, Result};
use clap::Parser;
use leyncal::config::Credentials;
use leyncal::fetch::{CalendarClient, validate_range};
use leyncal::merge::enrich_all;
use leyncal::overrides;
use leyncal::sheets::SheetsClient;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Fetch Torah reading schedules from the HebCal leyning API and publish
/// them to a shared spreadsheet: one tab per parsha plus a weekday Minyan
/// tab.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Start date, YYYY-MM-DD
    start_date: String,

    /// End date, YYYY-MM-DD (inclusive)
    end_date: String,

    /// Name of the spreadsheet to create
    #[arg(short, long)]
    sheet: String,

    /// Address to share the spreadsheet with
    #[arg(short, long)]
    email: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Test mode: process only the first reading
    #[arg(short, long)]
    test: bool,

    /// CSV file with Etz Hayim page numbers and haftarah verse overrides
    #[arg(long)]
    pages: Option<PathBuf>,

    /// Spreadsheet backend credentials file
    #[arg(long, default_value = "credentials.json")]
    credentials: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "leyncal=debug"
    } else {
        "leyncal=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    // Fail fast on bad input before touching the network.
    let (start, end) = validate_range(&args.start_date, &args.end_date)?;

    let overrides = overrides::load(args.pages.as_deref()).context("loading page-number CSV")?;
    debug!("{} override entries loaded", overrides.len());

    let fetcher = CalendarClient::new()?.with_test_mode(args.test);
    let records = fetcher.fetch(start, end).await.context("fetching leyning data")?;
    if records.is_empty() {
        info!("no readings in {}..{}, nothing to publish", start, end);
        return Ok(());
    }

    let enriched = enrich_all(&records, &overrides);

    let creds = Credentials::load(&args.credentials)?;
    let client = SheetsClient::new(creds)?;
    let spreadsheet_id = client
        .publish(&enriched, &args.sheet, &args.email)
        .await
        .context("writing spreadsheet")?;

    println!(
        "Data written to https://docs.google.com/spreadsheets/d/{}",
        spreadsheet_id
    );
    Ok(())
}
