pub mod document;
pub mod extract;
pub mod fields;
pub mod listing;
pub mod units;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use crate::fetcher::{BatchOutcome, ItemError};
use document::Document;
use extract::{ExtractError, ExtractedRecord, PageType, RecordExtractor};

const CHUNK_SIZE: usize = 500;

/// Markup → owned tree → record.
pub fn process_page(
    extractor: &RecordExtractor,
    page_type: PageType,
    body: &[u8],
) -> Result<ExtractedRecord, ExtractError> {
    let doc = Document::parse(&String::from_utf8_lossy(body));
    extractor.extract(page_type, doc.root())
}

/// Extract fetched pages on the rayon pool, keeping input order.
pub fn process_pages(
    extractor: &RecordExtractor,
    page_type: PageType,
    pages: &[(String, Vec<u8>)],
) -> BatchOutcome<ExtractedRecord> {
    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut outcome = BatchOutcome::default();
    for chunk in pages.chunks(CHUNK_SIZE) {
        let results: Vec<_> = chunk
            .par_iter()
            .map(|(_, body)| process_page(extractor, page_type, body))
            .collect();

        for ((extension, _), result) in chunk.iter().zip(results) {
            match result {
                Ok(record) => outcome.items.push(record),
                Err(e) => outcome.errors.push(ItemError {
                    extension: extension.clone(),
                    error: e.to_string(),
                }),
            }
        }
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    outcome
}
