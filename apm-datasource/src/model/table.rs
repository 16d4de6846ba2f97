use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use super::{Sample, SampleValue};

pub const TIMESTAMP_COLUMN: &str = "ts";

/// The time series returned for one query predicate, sorted ascending by timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesFrame {
    pub name: String,
    pub samples: Vec<Sample>,
}

impl SeriesFrame {
    pub fn new(name: impl Into<String>, samples: Vec<Sample>) -> Self {
        Self { name: name.into(), samples }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn column_names(&self) -> [&str; 2] {
        [TIMESTAMP_COLUMN, self.name.as_str()]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesColumn {
    pub name: String,
    pub values: Vec<SampleValue>,
}

/// Wide table of series aligned on timestamp. Every column holds exactly one value per row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultTable {
    timestamps: Vec<DateTime<Utc>>,
    columns: Vec<SeriesColumn>,
}

impl ResultTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn new(timestamps: Vec<DateTime<Utc>>) -> Self {
        Self { timestamps, columns: Vec::default() }
    }

    pub(crate) fn push_column(&mut self, name: impl Into<String>, values: Vec<SampleValue>) {
        debug_assert_eq!(values.len(), self.timestamps.len());
        self.columns.push(SeriesColumn { name: name.into(), values });
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn nr_rows(&self) -> usize {
        self.timestamps.len()
    }

    /// Number of value columns, excluding the timestamp column.
    pub fn nr_series(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        std::iter::once(TIMESTAMP_COLUMN)
            .chain(self.columns.iter().map(|c| c.name.as_str()))
            .collect()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        self.timestamps.as_slice()
    }

    pub fn columns(&self) -> &[SeriesColumn] {
        self.columns.as_slice()
    }

    pub fn column(&self, name: &str) -> Option<&SeriesColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&SampleValue> {
        self.column(column).and_then(|c| c.values.get(row))
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        (0..self.nr_rows()).map(move |index| Row { table: self, index })
    }
}

#[derive(Debug, Copy, Clone)]
pub struct Row<'t> {
    table: &'t ResultTable,
    index: usize,
}

impl<'t> Row<'t> {
    pub fn ts(&self) -> &'t DateTime<Utc> {
        &self.table.timestamps[self.index]
    }

    pub fn values(&self) -> impl Iterator<Item = (&'t str, &'t SampleValue)> + 't {
        let index = self.index;
        self.table
            .columns
            .iter()
            .map(move |c| (c.name.as_str(), &c.values[index]))
    }
}

impl Serialize for Row<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.table.columns.len() + 1))?;
        map.serialize_entry(TIMESTAMP_COLUMN, &self.ts().to_rfc3339())?;
        for (name, value) in self.values() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Serializes as a sequence of row records keyed by column name.
impl Serialize for ResultTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.nr_rows()))?;
        for row in self.rows() {
            seq.serialize_element(&row)?;
        }
        seq.end()
    }
}
