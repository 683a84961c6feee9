use chrono::{Datelike, NaiveDate};
use tracing::info;

use crate::net::{fetch_with_retry, Fetch, Retry};
use crate::parser::listing::{self, ListingError, SummaryRow};

const OBSERVATIONS_PATH: &str = "/observations";
const FORECAST_ARCHIVE_PATH: &str = "/archives/forecasts";
const SEASON_START_MONTH: u32 = 8;

/// What ends a pagination walk.
///
/// The site has no "last page" marker, so a failed page is read as the end of
/// the data. `RetryTransient` gives timeouts and 5xx answers a few more tries
/// before drawing that conclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerminationPolicy {
    #[default]
    StopOnFirstFailure,
    RetryTransient(Retry),
}

impl TerminationPolicy {
    fn retry(self) -> Retry {
        match self {
            TerminationPolicy::StopOnFirstFailure => Retry::NONE,
            TerminationPolicy::RetryTransient(retry) => retry,
        }
    }
}

pub struct Harvester<'a, F> {
    fetcher: &'a F,
    base_url: String,
    policy: TerminationPolicy,
    max_pages: usize,
}

impl<'a, F: Fetch> Harvester<'a, F> {
    pub fn new(fetcher: &'a F, base_url: &str) -> Self {
        Harvester {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_string(),
            policy: TerminationPolicy::default(),
            max_pages: usize::MAX,
        }
    }

    pub fn with_policy(mut self, policy: TerminationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Every observation listed between `start` and `end`, page by page.
    pub async fn harvest(&self, start: NaiveDate, end: NaiveDate) -> Vec<SummaryRow> {
        let query = observation_url(&self.base_url, start, end);
        info!("Harvesting observations {} to {}", start, end);
        self.walk(&query, listing::parse_observation_table).await
    }

    /// Forecast archive rows, newest first.
    pub async fn harvest_forecast_archive(&self) -> Vec<SummaryRow> {
        let query = format!("{}{}", self.base_url, FORECAST_ARCHIVE_PATH);
        info!("Harvesting forecast archive");
        self.walk(&query, listing::parse_forecast_table).await
    }

    async fn walk(
        &self,
        query: &str,
        parse: fn(&str) -> Result<Vec<SummaryRow>, ListingError>,
    ) -> Vec<SummaryRow> {
        let mut rows = Vec::new();
        for page in 0..self.max_pages {
            let url = page_url(query, page);
            let body = match fetch_with_retry(self.fetcher, &url, self.policy.retry()).await {
                Ok(body) => body,
                Err(e) => {
                    info!("Stopping at page {}: {}", page, e);
                    break;
                }
            };
            match parse(&String::from_utf8_lossy(&body)) {
                Ok(page_rows) => {
                    info!("Page {}: {} rows", page, page_rows.len());
                    rows.extend(page_rows);
                }
                Err(e) => {
                    info!("Stopping at page {}: {}", page, e);
                    break;
                }
            }
        }
        info!("Harvested {} rows", rows.len());
        rows
    }
}

/// Observation list query for an inclusive date range.
pub fn observation_url(base_url: &str, start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "{}{}?rid=All&term=All&fodv%5Bmin%5D%5Bdate%5D={}&fodv%5Bmax%5D%5Bdate%5D={}",
        base_url.trim_end_matches('/'),
        OBSERVATIONS_PATH,
        start.format("%m/%d/%Y"),
        end.format("%m/%d/%Y"),
    )
}

/// Page 0 is the bare query; later pages append `page=N`.
pub fn page_url(query: &str, page: usize) -> String {
    if page == 0 {
        return query.to_string();
    }
    let sep = if query.contains('?') { '&' } else { '?' };
    format!("{}{}page={}", query, sep, page)
}

/// First day of the season containing `date`. Seasons run August to July.
pub fn season_start(date: NaiveDate) -> NaiveDate {
    let year = if date.month() < SEASON_START_MONTH {
        date.year() - 1
    } else {
        date.year()
    };
    NaiveDate::from_ymd_opt(year, SEASON_START_MONTH, 1).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::net::testing::StaticSite;

    const BASE: &str = "https://uac.test";

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn list_page(titles: &[&str]) -> String {
        let rows: String = titles
            .iter()
            .enumerate()
            .map(|(i, t)| {
                format!(
                    "<tr><td>01/0{}/2024</td><td>Salt Lake</td><td><a href=\"/observation/{}\">{}</a></td><td>Obs</td></tr>",
                    i + 1,
                    t.to_lowercase().replace([' ', ':'], "-"),
                    t
                )
            })
            .collect();
        format!("<table><tbody>{}</tbody></table>", rows)
    }

    #[test]
    fn observation_url_format() {
        assert_eq!(
            observation_url("https://utahavalanchecenter.org/", day(2024, 1, 5), day(2024, 2, 29)),
            "https://utahavalanchecenter.org/observations?rid=All&term=All\
             &fodv%5Bmin%5D%5Bdate%5D=01/05/2024&fodv%5Bmax%5D%5Bdate%5D=02/29/2024"
        );
    }

    #[test]
    fn page_urls() {
        assert_eq!(page_url("a?x=1", 0), "a?x=1");
        assert_eq!(page_url("a?x=1", 2), "a?x=1&page=2");
        assert_eq!(page_url("a/archives", 1), "a/archives?page=1");
    }

    #[test]
    fn season_boundaries() {
        assert_eq!(season_start(day(2024, 1, 15)), day(2023, 8, 1));
        assert_eq!(season_start(day(2024, 7, 31)), day(2023, 8, 1));
        assert_eq!(season_start(day(2024, 8, 1)), day(2024, 8, 1));
        assert_eq!(season_start(day(2024, 12, 25)), day(2024, 8, 1));
    }

    #[tokio::test]
    async fn stops_at_first_failed_page() {
        let (start, end) = (day(2024, 1, 1), day(2024, 1, 31));
        let query = observation_url(BASE, start, end);
        let site = StaticSite::default()
            .page(&page_url(&query, 0), list_page(&["Avalanche: A", "Observation: B"]))
            .page(&page_url(&query, 1), list_page(&["Observation: C"]))
            .failing(&page_url(&query, 2), 503)
            .page(&page_url(&query, 3), list_page(&["Observation: never"]));

        let rows = Harvester::new(&site, BASE).harvest(start, end).await;
        let titles: Vec<_> = rows.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Avalanche: A", "Observation: B", "Observation: C"]);
        assert_eq!(site.request_count(), 3);
    }

    #[tokio::test]
    async fn empty_result_when_first_page_fails() {
        let site = StaticSite::default();
        let rows = Harvester::new(&site, BASE)
            .harvest(day(2024, 7, 1), day(2024, 7, 31))
            .await;
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn unparseable_page_ends_walk() {
        let (start, end) = (day(2024, 1, 1), day(2024, 1, 31));
        let query = observation_url(BASE, start, end);
        let site = StaticSite::default()
            .page(&page_url(&query, 0), list_page(&["Observation: B"]))
            .page(&page_url(&query, 1), "<p>No results</p>");
        let rows = Harvester::new(&site, BASE).harvest(start, end).await;
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn retry_policy_retries_transient_pages() {
        let (start, end) = (day(2024, 1, 1), day(2024, 1, 31));
        let query = observation_url(BASE, start, end);
        let site = StaticSite::default()
            .page(&page_url(&query, 0), list_page(&["Observation: B"]))
            .failing(&page_url(&query, 1), 502);
        let policy = TerminationPolicy::RetryTransient(Retry {
            max_retries: 2,
            backoff: Duration::from_millis(1),
        });
        let rows = Harvester::new(&site, BASE)
            .with_policy(policy)
            .harvest(start, end)
            .await;
        assert_eq!(rows.len(), 1);
        // page 0, then page 1 three times
        assert_eq!(site.request_count(), 4);
    }

    #[tokio::test]
    async fn max_pages_bounds_the_walk() {
        let (start, end) = (day(2024, 1, 1), day(2024, 1, 31));
        let query = observation_url(BASE, start, end);
        let site = StaticSite::default()
            .page(&page_url(&query, 0), list_page(&["Observation: A"]))
            .page(&page_url(&query, 1), list_page(&["Observation: B"]));
        let rows = Harvester::new(&site, BASE)
            .with_max_pages(1)
            .harvest(start, end)
            .await;
        assert_eq!(rows.len(), 1);
        assert_eq!(site.request_count(), 1);
    }
}
