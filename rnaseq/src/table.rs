//! Delimited text tables with a header row.
//!
//! Pipeline outputs are plain CSV/TSV without quoting, so a split on the
//! delimiter is enough. Carriage returns are stripped and blank lines skipped.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn parse(text: &str, delimiter: char) -> Result<Self> {
        let mut lines = text
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty());
        let Some(header) = lines.next() else {
            bail!("table has no header row");
        };
        let split = |line: &str| -> Vec<String> {
            line.split(delimiter)
                .map(|cell| cell.trim().to_string())
                .collect()
        };
        Ok(Self {
            header: split(header),
            rows: lines.map(split).collect(),
        })
    }

    pub fn read(path: &Path, delimiter: char) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        Self::parse(&text, delimiter).with_context(|| format!("parse {}", path.display()))
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        Self::read(path, ',')
    }

    pub fn read_tsv(path: &Path) -> Result<Self> {
        Self::read(path, '\t')
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.header.iter().any(|column| column == name)
    }

    /// Index of the column named `name`.
    pub fn column(&self, name: &str) -> Result<usize> {
        self.header
            .iter()
            .position(|column| column == name)
            .ok_or_else(|| anyhow!("missing column {name:?}"))
    }

    /// Values of one column in row order; short rows read as "".
    pub fn column_values(&self, name: &str) -> Result<Vec<&str>> {
        let index = self.column(name)?;
        Ok(self
            .rows
            .iter()
            .map(|row| row.get(index).map_or("", String::as_str))
            .collect())
    }
}
