pub mod forecast;

use thiserror::Error;
use tracing::debug;

use super::document::DocumentNode;
use super::fields::{self, FieldSchema, FieldValue};
use super::listing::RecordType;

const TITLE_CLASS: &str = "page-title";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Avalanche,
    General,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("page has no title")]
    MissingTitle,
    #[error("forecast page has no danger rose")]
    MissingRose,
}

/// Field name to value, in schema order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedRecord {
    fields: Vec<(String, FieldValue)>,
}

impl ExtractedRecord {
    /// Insert or overwrite. Overwriting keeps the original position.
    pub fn insert(&mut self, name: &str, value: FieldValue) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Builds records from report pages. Schemas are built once and shared.
#[derive(Debug, Clone)]
pub struct RecordExtractor {
    avalanche: FieldSchema,
    common: FieldSchema,
    general: FieldSchema,
}

impl Default for RecordExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordExtractor {
    pub fn new() -> Self {
        RecordExtractor {
            avalanche: FieldSchema::avalanche(),
            common: FieldSchema::observation_common(),
            general: FieldSchema::general(),
        }
    }

    pub fn schema(&self, page_type: PageType, record_type: RecordType) -> Option<&FieldSchema> {
        match (page_type, record_type) {
            (_, RecordType::Forecast | RecordType::Unknown) => None,
            (PageType::Avalanche, RecordType::Avalanche) => Some(&self.avalanche),
            (PageType::Avalanche, RecordType::Observation) => Some(&self.common),
            (PageType::General, _) => Some(&self.general),
        }
    }

    /// Read every field of the page's schema. Unrecognized titles give an
    /// empty record; only a page without any title is an error.
    pub fn extract<N: DocumentNode>(
        &self,
        page_type: PageType,
        root: N,
    ) -> Result<ExtractedRecord, ExtractError> {
        let title = root
            .find_class(TITLE_CLASS)
            .and_then(|n| n.string())
            .ok_or(ExtractError::MissingTitle)?;

        let mut record = ExtractedRecord::default();
        let Some(schema) = self.schema(page_type, RecordType::from_title(&title)) else {
            return Ok(record);
        };

        for group in schema.groups() {
            debug!("Reading {} fields", group.name);
            for field in &group.fields {
                record.insert(field.name, fields::read(field, root));
            }
        }
        Ok(record)
    }
}
