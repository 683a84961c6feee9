use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::fetcher::join_url;
use crate::net::{fetch_with_retry, Fetch, Retry};
use crate::parser::document::Document;
use crate::parser::extract::forecast::{self, ForecastSource, ProblemSource};
use crate::rose::palette::{DangerLevel, Presence, DANGER, PRESENCE};
use crate::rose::scale::{ScaleReading, LIKELIHOOD, SIZE};
use crate::rose::{self, CoordinateMap, RoseMap};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProblemRecord {
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub location: RoseMap<Presence>,
    pub likelihood: Option<ScaleReading>,
    pub size: Option<ScaleReading>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastRecord {
    pub date: NaiveDate,
    pub region: String,
    pub rose_url: String,
    pub danger: RoseMap<DangerLevel>,
    pub problems: Vec<ProblemRecord>,
}

/// `/forecast/salt-lake/1/5/2024` for Salt Lake on 2024-01-05.
pub fn forecast_url(base_url: &str, date: NaiveDate, region: &str) -> String {
    let slug = region
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-");
    join_url(
        base_url,
        &format!("/forecast/{}/{}", slug, date.format("%-m/%-d/%Y")),
    )
}

/// Fetch one forecast page and decode its danger rose and problem images.
pub async fn read_forecast<F: Fetch>(
    fetcher: &F,
    base_url: &str,
    date: NaiveDate,
    region: &str,
    retry: Retry,
) -> Result<ForecastRecord> {
    let url = forecast_url(base_url, date, region);
    info!("Reading forecast {}", url);
    let body = fetch_with_retry(fetcher, &url, retry).await?;

    // The tree is dropped before any image fetch.
    let source: ForecastSource = {
        let doc = Document::parse(&String::from_utf8_lossy(&body));
        forecast::extract(doc.root()).with_context(|| format!("Failed to read {}", url))?
    };

    let rose_url = join_url(base_url, &source.rose_src);
    let rose_image = fetch_image(fetcher, &rose_url, retry).await?;
    let danger = rose::decode(&rose_image, &CoordinateMap::danger_rose(), &DANGER)
        .with_context(|| format!("Failed to decode danger rose {}", rose_url))?;

    let mut problems = Vec::with_capacity(source.problems.len());
    for problem in &source.problems {
        problems.push(read_problem(fetcher, base_url, problem, retry).await?);
    }
    debug!("{} problems on {}", problems.len(), url);

    Ok(ForecastRecord {
        date,
        region: region.to_string(),
        rose_url,
        danger,
        problems,
    })
}

async fn read_problem<F: Fetch>(
    fetcher: &F,
    base_url: &str,
    problem: &ProblemSource,
    retry: Retry,
) -> Result<ProblemRecord> {
    let location_url = join_url(base_url, &problem.location_src);
    let location_image = fetch_image(fetcher, &location_url, retry).await?;
    let location = rose::decode(&location_image, &CoordinateMap::location_rose(), &PRESENCE)
        .with_context(|| format!("Failed to decode location rose {}", location_url))?;

    let likelihood = match &problem.likelihood_src {
        Some(src) => {
            let url = join_url(base_url, src);
            let image = fetch_image(fetcher, &url, retry).await?;
            LIKELIHOOD
                .read(&image)
                .with_context(|| format!("Failed to decode likelihood scale {}", url))?
        }
        None => None,
    };

    let size = match &problem.size_src {
        Some(src) => {
            let url = join_url(base_url, src);
            let image = fetch_image(fetcher, &url, retry).await?;
            SIZE.read(&image)
                .with_context(|| format!("Failed to decode size scale {}", url))?
        }
        None => None,
    };

    Ok(ProblemRecord {
        label: problem.label.clone(),
        kind: problem.kind.clone(),
        location,
        likelihood,
        size,
        description: problem.description.clone(),
    })
}

async fn fetch_image<F: Fetch>(fetcher: &F, url: &str, retry: Retry) -> Result<image::RgbImage> {
    let bytes = fetch_with_retry(fetcher, url, retry).await?;
    rose::load_image(&bytes).with_context(|| format!("Failed to load image {}", url))
}
