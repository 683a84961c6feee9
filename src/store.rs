use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use thiserror::Error;
use tracing::{debug, info};

use crate::table::Table;

const KEY_DATE_FORMAT: &str = "%Y_%m_%d";
const EXTENSION: &str = ".csv";
const RESERVED: [char; 4] = ['@', '&', '/', '\\'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DatasetKind {
    Observations,
    Avalanches,
    General,
    Forecasts,
}

impl DatasetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DatasetKind::Observations => "observations",
            DatasetKind::Avalanches => "avalanches",
            DatasetKind::General => "general",
            DatasetKind::Forecasts => "forecasts",
        }
    }

    fn from_name(s: &str) -> Option<Self> {
        match s {
            "observations" => Some(DatasetKind::Observations),
            "avalanches" => Some(DatasetKind::Avalanches),
            "general" => Some(DatasetKind::General),
            "forecasts" => Some(DatasetKind::Forecasts),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("not a dataset file name: {0}")]
    Malformed(String),
    #[error("unknown dataset kind {0:?}")]
    UnknownKind(String),
    #[error("bad date {0:?} in dataset file name")]
    BadDate(String),
    #[error("region {0:?} is empty or contains one of @ & / \\")]
    InvalidRegion(String),
    #[error("start {start} is after end {end}")]
    Inverted { start: NaiveDate, end: NaiveDate },
    #[error("{key} continues from {expected}; a harvest from {start} would leave a gap or overlap")]
    Discontiguous {
        key: DatasetKey,
        start: NaiveDate,
        expected: NaiveDate,
    },
}

/// Identity of a stored dataset, encoded in its file name as
/// `<kind>@[<region>@]<YYYY_MM_DD>&<YYYY_MM_DD>.csv`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DatasetKey {
    pub kind: DatasetKind,
    pub region: Option<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DatasetKey {
    pub fn new(
        kind: DatasetKind,
        region: Option<&str>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Self, KeyError> {
        if let Some(r) = region {
            if r.trim().is_empty() || r.contains(RESERVED) {
                return Err(KeyError::InvalidRegion(r.to_string()));
            }
        }
        if start > end {
            return Err(KeyError::Inverted { start, end });
        }
        Ok(DatasetKey {
            kind,
            region: region.map(str::to_string),
            start,
            end,
        })
    }

    pub fn file_name(&self) -> String {
        let region = self
            .region
            .as_deref()
            .map(|r| format!("{}@", r))
            .unwrap_or_default();
        format!(
            "{}@{}{}&{}{}",
            self.kind.as_str(),
            region,
            self.start.format(KEY_DATE_FORMAT),
            self.end.format(KEY_DATE_FORMAT),
            EXTENSION
        )
    }

    pub fn parse(file_name: &str) -> Result<Self, KeyError> {
        let malformed = || KeyError::Malformed(file_name.to_string());
        let stem = file_name.strip_suffix(EXTENSION).ok_or_else(malformed)?;

        let parts: Vec<&str> = stem.split('@').collect();
        let (kind, region, dates) = match parts.as_slice() {
            [kind, dates] => (*kind, None, *dates),
            [kind, region, dates] => (*kind, Some(*region), *dates),
            _ => return Err(malformed()),
        };
        let kind = DatasetKind::from_name(kind).ok_or_else(|| KeyError::UnknownKind(kind.to_string()))?;

        let (start, end) = dates.split_once('&').ok_or_else(malformed)?;
        let date = |s: &str| {
            NaiveDate::parse_from_str(s, KEY_DATE_FORMAT).map_err(|_| KeyError::BadDate(s.to_string()))
        };
        DatasetKey::new(kind, region, date(start)?, date(end)?)
    }

    /// Day after the last one covered.
    pub fn next_start(&self) -> NaiveDate {
        self.end.checked_add_days(Days::new(1)).unwrap_or(self.end)
    }

    fn same_series(&self, kind: DatasetKind, region: Option<&str>) -> bool {
        self.kind == kind && self.region.as_deref() == region
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub key: DatasetKey,
    pub table: Table,
}

/// Append `incoming` to `existing` and advance the key to `harvest_end`.
///
/// Returns `existing` untouched when it already covers `harvest_end`.
pub fn merge(existing: Dataset, incoming: Table, harvest_end: NaiveDate) -> Dataset {
    if harvest_end <= existing.key.end {
        debug!("{} already covers {}", existing.key, harvest_end);
        return existing;
    }
    let key = DatasetKey {
        end: harvest_end,
        ..existing.key
    };
    Dataset {
        key,
        table: existing.table.union(incoming),
    }
}

/// How a harvest of `start..=end` sits against the latest dataset of its series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// No dataset yet; the harvest starts the series.
    New,
    /// Already inside the stored range. Nothing to do.
    Covered(DatasetKey),
    /// Starts the day after the stored range ends.
    Continues(DatasetKey),
}

/// What `merge_and_save` did.
#[derive(Debug, Clone, PartialEq)]
pub enum Stored {
    Created(Dataset),
    Extended(Dataset),
    /// The range was already stored; no file was written.
    UpToDate(Dataset),
}

impl Stored {
    pub fn dataset(&self) -> &Dataset {
        match self {
            Stored::Created(d) | Stored::Extended(d) | Stored::UpToDate(d) => d,
        }
    }

    pub fn into_dataset(self) -> Dataset {
        match self {
            Stored::Created(d) | Stored::Extended(d) | Stored::UpToDate(d) => d,
        }
    }
}

/// CSV files in one directory, one file per dataset key.
pub struct DatasetStore {
    dir: PathBuf,
}

impl DatasetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DatasetStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every parseable dataset key in the directory. A missing directory is empty.
    pub fn list(&self) -> Result<Vec<DatasetKey>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read {}", self.dir.display()))?
        {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            match DatasetKey::parse(&name) {
                Ok(key) => keys.push(key),
                Err(e) => debug!("Ignoring {}: {}", name, e),
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// The dataset of this series reaching furthest forward.
    pub fn find_latest(&self, kind: DatasetKind, region: Option<&str>) -> Result<Option<DatasetKey>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|k| k.same_series(kind, region))
            .max_by_key(|k| k.end))
    }

    pub fn load(&self, key: &DatasetKey) -> Result<Dataset> {
        let path = self.dir.join(key.file_name());
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let mut table = Table::new(headers);
        for record in reader.records() {
            let record = record.with_context(|| format!("Bad row in {}", path.display()))?;
            table.push_row(record.iter().map(str::to_string).collect());
        }
        Ok(Dataset {
            key: key.clone(),
            table,
        })
    }

    /// Write `dataset` under its key and remove `replaces` if it named another file.
    pub fn save(&self, dataset: &Dataset, replaces: Option<&DatasetKey>) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let path = self.dir.join(dataset.key.file_name());

        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        // a table without columns is an empty file rather than one blank header
        if !dataset.table.headers().is_empty() {
            writer.write_record(dataset.table.headers())?;
            for row in dataset.table.rows() {
                writer.write_record(row)?;
            }
        }
        writer.flush()?;

        if let Some(old) = replaces.filter(|old| *old != &dataset.key) {
            let old_path = self.dir.join(old.file_name());
            fs::remove_file(&old_path)
                .with_context(|| format!("Failed to remove {}", old_path.display()))?;
        }
        info!("Saved {} rows to {}", dataset.table.len(), path.display());
        Ok(path)
    }

    /// Where `start..=end` falls in its series. A range that neither lies
    /// inside the stored one nor starts the day after it is refused with
    /// `KeyError::Discontiguous`.
    pub fn place(
        &self,
        kind: DatasetKind,
        region: Option<&str>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Placement> {
        let Some(key) = self.find_latest(kind, region)? else {
            return Ok(Placement::New);
        };
        if start >= key.start && end <= key.end {
            return Ok(Placement::Covered(key));
        }
        let expected = key.next_start();
        if start != expected {
            return Err(KeyError::Discontiguous {
                key,
                start,
                expected,
            }
            .into());
        }
        Ok(Placement::Continues(key))
    }

    /// Merge `incoming` into the latest dataset of the series, or create the
    /// series starting at `start`. Every day a series covers was harvested
    /// exactly once, so `start` must be the day after the stored range.
    pub fn merge_and_save(
        &self,
        kind: DatasetKind,
        region: Option<&str>,
        start: NaiveDate,
        incoming: Table,
        harvest_end: NaiveDate,
    ) -> Result<Stored> {
        match self.place(kind, region, start, harvest_end)? {
            Placement::New => {
                let dataset = Dataset {
                    key: DatasetKey::new(kind, region, start, harvest_end)?,
                    table: incoming,
                };
                self.save(&dataset, None)?;
                Ok(Stored::Created(dataset))
            }
            Placement::Covered(key) => {
                info!("{} already covers {} to {}", key, start, harvest_end);
                Ok(Stored::UpToDate(self.load(&key)?))
            }
            Placement::Continues(key) => {
                let merged = merge(self.load(&key)?, incoming, harvest_end);
                self.save(&merged, Some(&key))?;
                Ok(Stored::Extended(merged))
            }
        }
    }
}
