use std::collections::HashMap;

use anyhow::Result;

use crate::forecast::ForecastRecord;
use crate::parser::extract::ExtractedRecord;
use crate::parser::listing::SummaryRow;

const SUMMARY_HEADERS: [&str; 6] = ["Date", "Region", "Title", "Type", "Extension", "Author"];
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Header row plus string cells. Every row is as wide as the header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Table {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Pads or truncates `row` to the header width.
    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    /// Rows of `self` then rows of `other`, over the union of both headers in
    /// first-seen order. Cells missing from either side are empty.
    pub fn union(mut self, other: Table) -> Table {
        for header in &other.headers {
            if !self.headers.contains(header) {
                self.headers.push(header.clone());
            }
        }
        let width = self.headers.len();
        for row in &mut self.rows {
            row.resize(width, String::new());
        }

        let index: HashMap<&str, usize> = self
            .headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.as_str(), i))
            .collect();
        let mapping: Vec<usize> = other.headers.iter().map(|h| index[h.as_str()]).collect();
        for row in other.rows {
            let mut cells = vec![String::new(); width];
            for (cell, target) in row.into_iter().zip(&mapping) {
                cells[*target] = cell;
            }
            self.rows.push(cells);
        }
        self
    }

    pub fn from_records(records: &[ExtractedRecord]) -> Self {
        let mut headers: Vec<String> = Vec::new();
        for record in records {
            for (name, _) in record.iter() {
                if !headers.iter().any(|h| h == name) {
                    headers.push(name.to_string());
                }
            }
        }

        let mut table = Table::new(headers);
        for record in records {
            let row = table
                .headers
                .iter()
                .map(|h| record.get(h).map(|v| v.to_cell()).unwrap_or_default())
                .collect();
            table.rows.push(row);
        }
        table
    }

    pub fn from_summaries(rows: &[SummaryRow]) -> Self {
        let mut table = Table::new(SUMMARY_HEADERS.iter().map(|h| h.to_string()).collect());
        for row in rows {
            table.rows.push(vec![
                row.date.format(DATE_FORMAT).to_string(),
                row.region_path.join(" » "),
                row.title.clone(),
                row.record_type.as_str().to_string(),
                row.extension.clone(),
                row.author.clone(),
            ]);
        }
        table
    }

    /// One row per forecast: date, region, rose URL, one column per rose key
    /// and the problems as a JSON array.
    pub fn from_forecasts(records: &[ForecastRecord]) -> Result<Self> {
        let mut headers: Vec<String> = ["Date", "Region", "Rose"].iter().map(|h| h.to_string()).collect();
        if let Some(first) = records.first() {
            headers.extend(first.danger.iter().map(|(key, _)| key.to_string()));
        }
        headers.push("Problems".to_string());

        let mut table = Table::new(headers);
        for record in records {
            let mut row = vec![
                record.date.format(DATE_FORMAT).to_string(),
                record.region.clone(),
                record.rose_url.clone(),
            ];
            row.extend(record.danger.iter().map(|(_, level)| level.label().to_string()));
            row.push(serde_json::to_string(&record.problems)?);
            table.push_row(row);
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::parser::fields::FieldValue;
    use crate::parser::listing::RecordType;

    fn table(headers: &[&str], rows: &[&[&str]]) -> Table {
        let mut t = Table::new(headers.iter().map(|h| h.to_string()).collect());
        for r in rows {
            t.push_row(r.iter().map(|c| c.to_string()).collect());
        }
        t
    }

    #[test]
    fn records_union_columns_and_blank_absent() {
        let mut a = ExtractedRecord::default();
        a.insert("Sky", FieldValue::Text("Clear".into()));
        a.insert("Depth", FieldValue::Number(24.0));
        let mut b = ExtractedRecord::default();
        b.insert("Sky", FieldValue::Absent);
        b.insert("Red Flags", FieldValue::List(vec!["Cracking".into(), "Collapsing".into()]));

        let t = Table::from_records(&[a, b]);
        assert_eq!(t.headers(), ["Sky", "Depth", "Red Flags"]);
        assert_eq!(t.rows()[0], ["Clear", "24", ""]);
        assert_eq!(t.rows()[1], ["", "", "Cracking; Collapsing"]);
    }

    #[test]
    fn summaries() {
        let row = SummaryRow {
            date: NaiveDate::from_ymd_opt(2024, 1, 21).unwrap(),
            region_path: vec!["Salt Lake".into(), "Big Cottonwood".into()],
            title: "Avalanche: Wolverine".into(),
            record_type: RecordType::Avalanche,
            extension: "/avalanche/x".into(),
            author: "J. Doe".into(),
        };
        let t = Table::from_summaries(&[row]);
        assert_eq!(
            t.rows()[0],
            ["2024-01-21", "Salt Lake » Big Cottonwood", "Avalanche: Wolverine", "Avalanche", "/avalanche/x", "J. Doe"]
        );
    }

    #[test]
    fn union_aligns_columns() {
        let old = table(&["A", "B"], &[&["1", "2"]]);
        let new = table(&["B", "C"], &[&["3", "4"]]);
        let merged = old.union(new);
        assert_eq!(merged.headers(), ["A", "B", "C"]);
        assert_eq!(merged.rows()[0], ["1", "2", ""]);
        assert_eq!(merged.rows()[1], ["", "3", "4"]);
    }

    #[test]
    fn union_keeps_duplicates() {
        let a = table(&["A"], &[&["1"]]);
        let merged = a.clone().union(a);
        assert_eq!(merged.len(), 2);
    }
}
