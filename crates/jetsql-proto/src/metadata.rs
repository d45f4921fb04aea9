//! Result row metadata.

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

use crate::error::Error;

/// SQL column types surfaced to clients.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Archive,
    Serialize,
    Deserialize,
    SerdeSerialize,
    SerdeDeserialize,
)]
pub enum ColumnType {
    Boolean,
    Int,
    BigInt,
    Real,
    Double,
    Varchar,
    Varbinary,
    Timestamp,
    /// Type not known to the planner (e.g. an untyped null literal).
    Unknown,
}

/// Metadata for a single output column.
#[derive(
    Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize,
)]
pub struct ColumnMetadata {
    /// Column name as shown to clients.
    pub name: String,
    /// Column type.
    pub column_type: ColumnType,
}

impl ColumnMetadata {
    /// Create column metadata.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Ordered metadata for the rows a query produces.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Default,
    Archive,
    Serialize,
    Deserialize,
    SerdeSerialize,
    SerdeDeserialize,
)]
pub struct RowMetadata {
    columns: Vec<ColumnMetadata>,
}

impl RowMetadata {
    /// Create row metadata, rejecting empty or duplicate column names.
    pub fn new(columns: Vec<ColumnMetadata>) -> Result<Self, Error> {
        for (i, column) in columns.iter().enumerate() {
            if column.name.is_empty() {
                return Err(Error::InvalidMetadata(format!("column {} has no name", i)));
            }
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(Error::InvalidMetadata(format!(
                    "duplicate column name '{}'",
                    column.name
                )));
            }
        }
        Ok(Self { columns })
    }

    /// Metadata with no columns, used for insert plans that return no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Column at a position.
    pub fn column(&self, index: usize) -> Option<&ColumnMetadata> {
        self.columns.get(index)
    }

    /// All columns in order.
    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    /// Position of a column by name.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_metadata_lookup() {
        let metadata = RowMetadata::new(vec![
            ColumnMetadata::new("v", ColumnType::Int),
            ColumnMetadata::new("this", ColumnType::Varchar),
        ])
        .unwrap();

        assert_eq!(metadata.column_count(), 2);
        assert_eq!(metadata.find("this"), Some(1));
        assert_eq!(metadata.column(0).unwrap().column_type, ColumnType::Int);
        assert_eq!(metadata.find("missing"), None);
    }

    #[test]
    fn test_row_metadata_rejects_duplicates() {
        let result = RowMetadata::new(vec![
            ColumnMetadata::new("v", ColumnType::Int),
            ColumnMetadata::new("v", ColumnType::Varchar),
        ]);
        assert!(matches!(result, Err(Error::InvalidMetadata(_))));
    }
}
