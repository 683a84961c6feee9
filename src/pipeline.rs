use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tokio::sync::watch;
use tracing::info;

use crate::fetcher::{self, BatchOutcome, ItemError};
use crate::harvest::{self, Harvester};
use crate::net::Fetch;
use crate::parser;
use crate::parser::extract::{PageType, RecordExtractor};
use crate::parser::listing::RecordType;
use crate::settings::Settings;
use crate::store::{DatasetKind, DatasetStore, Placement, Stored};
use crate::table::Table;

pub fn harvester<'a, F: Fetch>(fetcher: &'a F, settings: &Settings) -> Harvester<'a, F> {
    Harvester::new(fetcher, &settings.base_url)
        .with_policy(settings.policy())
        .with_max_pages(settings.max_pages)
}

/// Explicit dates win; otherwise resume after the stored dataset, or from the
/// start of the season. `None` when the range is already stored. An explicit
/// start that would leave a gap or overlap in the series is an error.
pub fn resolve_range(
    store: &DatasetStore,
    kind: DatasetKind,
    start: Option<NaiveDate>,
    end: NaiveDate,
) -> Result<Option<(NaiveDate, NaiveDate)>> {
    let start = match start {
        Some(start) => start,
        None => match store.find_latest(kind, None)? {
            Some(key) => key.next_start(),
            None => harvest::season_start(end),
        },
    };
    if start > end {
        return Ok(None);
    }
    match store.place(kind, None, start, end)? {
        Placement::Covered(key) => {
            info!("{} already covers {} to {}", key, start, end);
            Ok(None)
        }
        Placement::New | Placement::Continues(_) => Ok(Some((start, end))),
    }
}

/// Page type to extract with and the listing rows it applies to.
fn targets(kind: DatasetKind) -> (PageType, RecordType) {
    match kind {
        DatasetKind::Avalanches => (PageType::Avalanche, RecordType::Avalanche),
        _ => (PageType::General, RecordType::Observation),
    }
}

#[derive(Debug)]
pub struct ExtractReport {
    /// Report pages listed for the range and kind.
    pub listed: usize,
    pub records: usize,
    /// Fetch and extraction failures, keyed by extension.
    pub errors: Vec<ItemError>,
    /// `None` when cancelled: the dataset is left as it was.
    pub stored: Option<Stored>,
}

/// Harvest the listing, fetch the reports of `kind`, extract them and merge
/// the records into the dataset.
pub async fn extract_reports<F: Fetch + 'static>(
    fetcher: Arc<F>,
    settings: &Settings,
    store: &DatasetStore,
    kind: DatasetKind,
    (start, end): (NaiveDate, NaiveDate),
    cancel: watch::Receiver<bool>,
) -> Result<ExtractReport> {
    let (page_type, record_type) = targets(kind);

    let rows = harvester(&*fetcher, settings).harvest(start, end).await;
    let extensions: Vec<String> = rows
        .into_iter()
        .filter(|r| r.record_type == record_type)
        .map(|r| r.extension)
        .collect();
    let listed = extensions.len();
    info!(
        "Fetching {} {} reports from {} to {}",
        listed,
        record_type.as_str().to_lowercase(),
        start,
        end
    );

    let fetched = fetcher::fetch_all(
        Arc::clone(&fetcher),
        &settings.base_url,
        extensions,
        settings.pool(),
        cancel.clone(),
    )
    .await;
    let mut pages = Vec::with_capacity(fetched.len());
    let mut fetch_errors = Vec::new();
    for (extension, result) in fetched {
        match result {
            Ok(body) => pages.push((extension, body)),
            Err(e) => fetch_errors.push(ItemError {
                extension,
                error: e.to_string(),
            }),
        }
    }

    let extractor = RecordExtractor::new();
    let BatchOutcome { items, mut errors } = parser::process_pages(&extractor, page_type, &pages);
    errors.extend(fetch_errors);

    let cancelled = *cancel.borrow();
    let stored = if cancelled {
        info!("Cancelled, leaving {} unchanged", kind.as_str());
        None
    } else {
        let table = Table::from_records(&items);
        Some(
            store
                .merge_and_save(kind, None, start, table, end)
                .with_context(|| format!("Failed to store {} dataset", kind.as_str()))?,
        )
    };

    Ok(ExtractReport {
        listed,
        records: items.len(),
        errors,
        stored,
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::fetcher::join_url;
    use crate::harvest::observation_url;
    use crate::net::testing::StaticSite;

    const BASE: &str = "https://uac.test";
    const WOLVERINE: &str = "/avalanche/2024/01/21/wolverine-cirque";

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn settings(data_dir: &Path) -> Settings {
        Settings {
            base_url: BASE.to_string(),
            data_dir: data_dir.to_path_buf(),
            concurrency: 2,
            fetch_timeout_secs: 5,
            max_pages: 10,
            retry_transient: false,
            max_retries: 0,
            backoff_ms: 0,
        }
    }

    fn avalanche_list(extensions: &[&str]) -> String {
        let rows: String = extensions
            .iter()
            .map(|ext| {
                format!(
                    "<tr><td>01/21/2024</td><td>Salt Lake</td><td><a href=\"{}\">Avalanche: {}</a></td><td>J. Doe</td></tr>",
                    ext,
                    ext.rsplit('/').next().unwrap_or_default()
                )
            })
            .collect();
        format!("<table><tbody>{}</tbody></table>", rows)
    }

    fn avalanche_page() -> Vec<u8> {
        std::fs::read("tests/fixtures/avalanche.html").unwrap()
    }

    fn not_cancelled() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    #[tokio::test]
    async fn only_avalanche_rows_are_fetched() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::new(dir.path());
        let range = (day(2024, 1, 20), day(2024, 1, 21));
        let listing = std::fs::read("tests/fixtures/observation_list.html").unwrap();
        let site = Arc::new(
            StaticSite::default()
                .page(&observation_url(BASE, range.0, range.1), listing)
                .page(&join_url(BASE, WOLVERINE), avalanche_page()),
        );

        let report = extract_reports(
            Arc::clone(&site),
            &settings(dir.path()),
            &store,
            DatasetKind::Avalanches,
            range,
            not_cancelled(),
        )
        .await
        .unwrap();

        // list page 0, list page 1 (404 ends the walk), one avalanche report.
        // The observation and blog rows are never requested.
        assert_eq!(site.request_count(), 3);
        assert_eq!(report.listed, 1);
        assert_eq!(report.records, 1);
        assert!(report.errors.is_empty());

        let dataset = report.stored.unwrap().into_dataset();
        assert_eq!(dataset.key.file_name(), "avalanches@2024_01_20&2024_01_21.csv");
        let observer = dataset.table.headers().iter().position(|h| h == "Observer Name").unwrap();
        assert_eq!(dataset.table.rows()[0][observer], "J. Doe");
    }

    #[tokio::test]
    async fn failed_report_is_listed_and_rest_are_stored() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::new(dir.path());
        let range = (day(2024, 1, 21), day(2024, 1, 22));
        let broken = "/avalanche/2024/01/22/broken-slab";
        let site = Arc::new(
            StaticSite::default()
                .page(
                    &observation_url(BASE, range.0, range.1),
                    avalanche_list(&[WOLVERINE, broken]),
                )
                .page(&join_url(BASE, WOLVERINE), avalanche_page())
                .failing(&join_url(BASE, broken), 500),
        );

        let report = extract_reports(
            site,
            &settings(dir.path()),
            &store,
            DatasetKind::Avalanches,
            range,
            not_cancelled(),
        )
        .await
        .unwrap();

        assert_eq!(report.listed, 2);
        assert_eq!(report.records, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].extension, broken);
        assert!(report.errors[0].error.contains("HTTP 500"), "{}", report.errors[0].error);

        let keys = store.list().unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(store.load(&keys[0]).unwrap().table.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_run_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::new(dir.path());
        store
            .merge_and_save(
                DatasetKind::Avalanches,
                None,
                day(2024, 1, 1),
                Table::new(vec!["Region".to_string()]),
                day(2024, 1, 20),
            )
            .unwrap();
        let before = store.list().unwrap();

        let range = (day(2024, 1, 21), day(2024, 1, 21));
        let site = Arc::new(
            StaticSite::default()
                .page(&observation_url(BASE, range.0, range.1), avalanche_list(&[WOLVERINE]))
                .page(&join_url(BASE, WOLVERINE), avalanche_page()),
        );
        let (_cancel_tx, cancel_rx) = watch::channel(true);

        let report = extract_reports(
            site,
            &settings(dir.path()),
            &store,
            DatasetKind::Avalanches,
            range,
            cancel_rx,
        )
        .await
        .unwrap();

        assert!(report.stored.is_none());
        assert_eq!(report.records, 0);
        assert_eq!(report.errors[0].extension, WOLVERINE);
        assert!(report.errors[0].error.starts_with("cancelled"));
        assert_eq!(store.list().unwrap(), before);
    }

    #[test]
    fn resume_after_stored_range() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::new(dir.path());
        let kind = DatasetKind::General;
        assert_eq!(
            resolve_range(&store, kind, None, day(2024, 1, 10)).unwrap(),
            Some((day(2023, 8, 1), day(2024, 1, 10)))
        );

        store
            .merge_and_save(kind, None, day(2023, 8, 1), Table::default(), day(2024, 1, 10))
            .unwrap();
        assert_eq!(resolve_range(&store, kind, None, day(2024, 1, 10)).unwrap(), None);
        assert_eq!(
            resolve_range(&store, kind, None, day(2024, 1, 20)).unwrap(),
            Some((day(2024, 1, 11), day(2024, 1, 20)))
        );
        // inside the stored range
        assert_eq!(
            resolve_range(&store, kind, Some(day(2024, 1, 1)), day(2024, 1, 5)).unwrap(),
            None
        );
        // overlaps the stored range
        assert!(resolve_range(&store, kind, Some(day(2024, 1, 1)), day(2024, 1, 20)).is_err());
    }
}
