use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static FORECAST_REGION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Forecast:\s(.*?)\sArea\sMountains").unwrap());

const DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y-%m-%d", "%A, %B %d, %Y"];
const REGION_SEPARATOR: char = '»';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordType {
    Avalanche,
    Observation,
    Forecast,
    Unknown,
}

impl RecordType {
    /// Record type from the text before the first colon of a title.
    pub fn from_title(title: &str) -> Self {
        match title.trim().split(':').next().unwrap_or_default() {
            "Avalanche" => RecordType::Avalanche,
            "Observation" => RecordType::Observation,
            "Forecast" => RecordType::Forecast,
            _ => RecordType::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::Avalanche => "Avalanche",
            RecordType::Observation => "Observation",
            RecordType::Forecast => "Forecast",
            RecordType::Unknown => "Unknown",
        }
    }
}

/// One row of a paginated list page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub date: NaiveDate,
    pub region_path: Vec<String>,
    pub title: String,
    pub record_type: RecordType,
    pub extension: String,
    pub author: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ListingError {
    #[error("page has no table")]
    NoTable,
    #[error("table has no rows")]
    Empty,
}

/// Parse an observation list page: Date | Region | Title (link) | Observer.
pub fn parse_observation_table(markup: &str) -> Result<Vec<SummaryRow>, ListingError> {
    parse_table(markup, |cells| {
        let [date, region, title, author, ..] = cells else {
            return None;
        };
        let title_text = cell_text(title);
        Some(SummaryRow {
            date: parse_date(&cell_text(date))?,
            region_path: split_region(&cell_text(region)),
            record_type: RecordType::from_title(&title_text),
            title: title_text,
            extension: cell_link(title)?,
            author: cell_text(author),
        })
    })
}

/// Parse a forecast archive page: Date | Title (link) | Forecaster.
pub fn parse_forecast_table(markup: &str) -> Result<Vec<SummaryRow>, ListingError> {
    parse_table(markup, |cells| {
        let [date, title, author, ..] = cells else {
            return None;
        };
        let title_text = cell_text(title);
        let region = FORECAST_REGION_RE
            .captures(&title_text)?
            .get(1)?
            .as_str()
            .to_string();
        Some(SummaryRow {
            date: parse_date(&cell_text(date))?,
            region_path: vec![region],
            record_type: RecordType::from_title(&title_text),
            title: title_text,
            extension: cell_link(title)?,
            author: cell_text(author),
        })
    })
}

fn parse_table<F>(markup: &str, build: F) -> Result<Vec<SummaryRow>, ListingError>
where
    F: Fn(&[ElementRef]) -> Option<SummaryRow>,
{
    let html = Html::parse_document(markup);
    let table = html.select(&TABLE).next().ok_or(ListingError::NoTable)?;

    let mut rows = Vec::new();
    for tr in table.select(&ROW) {
        let cells: Vec<ElementRef> = tr.select(&CELL).collect();
        if cells.is_empty() {
            // header row
            continue;
        }
        match build(&cells) {
            Some(row) => rows.push(row),
            None => warn!("Skipping malformed list row: {}", tr.text().collect::<String>().trim()),
        }
    }

    if rows.is_empty() {
        return Err(ListingError::Empty);
    }
    debug!("Parsed {} list rows", rows.len());
    Ok(rows)
}

fn cell_text(cell: &ElementRef) -> String {
    cell.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn cell_link(cell: &ElementRef) -> Option<String> {
    cell.select(&LINK)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

fn split_region(text: &str) -> Vec<String> {
    text.split(REGION_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
