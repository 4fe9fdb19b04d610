//! Row views resolving fields through shared column metadata.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::columns::{ColumnSet, DisplayMemberSet};
use crate::error::{InventoryError, Result};

/// One field of a result row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Integer(i32),
    String(String),
    /// Binary stream, represented by its length in bytes.
    Stream(usize),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            FieldValue::Integer(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Integer(value) => write!(f, "{}", value),
            FieldValue::String(value) => f.write_str(value),
            FieldValue::Stream(len) => write!(f, "<stream: {} bytes>", len),
        }
    }
}

/// A result row bound to the column metadata of its query.
///
/// Holding a view keeps the column set alive in the metadata cache; once
/// every view of a query is dropped the cache may rebuild it on next use.
#[derive(Debug, Clone)]
pub struct RecordView {
    columns: Arc<ColumnSet>,
    fields: Vec<FieldValue>,
}

impl RecordView {
    pub fn new(columns: Arc<ColumnSet>, fields: Vec<FieldValue>) -> Result<Self> {
        if fields.len() != columns.len() {
            return Err(InventoryError::invalid_argument(
                "fields",
                format!(
                    "row has {} fields but {} declares {} columns",
                    fields.len(),
                    columns.query(),
                    columns.len()
                ),
            ));
        }
        Ok(Self { columns, fields })
    }

    pub fn columns(&self) -> &Arc<ColumnSet> {
        &self.columns
    }

    /// Field by column name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.columns
            .ordinal_of(name)
            .and_then(|ordinal| self.fields.get(ordinal))
    }

    pub fn get_ordinal(&self, ordinal: usize) -> Option<&FieldValue> {
        self.fields.get(ordinal)
    }

    pub fn fields(&self) -> &[FieldValue] {
        &self.fields
    }

    /// Name and value of every display member present in this row.
    pub fn display_values<'a>(
        &'a self,
        display: &'a DisplayMemberSet,
    ) -> Vec<(&'a str, &'a FieldValue)> {
        display
            .members()
            .iter()
            .filter_map(|name| self.get(name).map(|value| (name.as_str(), value)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::columns::ColumnDescriptor;
    use crate::metadata::key::QueryKey;

    fn columns() -> Arc<ColumnSet> {
        Arc::new(
            ColumnSet::new(
                QueryKey::new("SELECT Name, Data, Attributes FROM Binary").unwrap(),
                vec![
                    ColumnDescriptor::from_definition("Name", 0, "s72").unwrap(),
                    ColumnDescriptor::from_definition("Data", 1, "v0").unwrap(),
                    ColumnDescriptor::from_definition("Attributes", 2, "I2").unwrap(),
                ],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_fields_resolve_by_name_and_ordinal() {
        let row = RecordView::new(
            columns(),
            vec![
                FieldValue::String("Icon".into()),
                FieldValue::Stream(1024),
                FieldValue::Null,
            ],
        )
        .unwrap();

        assert_eq!(row.get("name").and_then(FieldValue::as_str), Some("Icon"));
        assert_eq!(row.get("DATA"), Some(&FieldValue::Stream(1024)));
        assert!(row.get_ordinal(2).unwrap().is_null());
        assert!(row.get("Missing").is_none());
        assert!(row.get_ordinal(3).is_none());
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let err = RecordView::new(columns(), vec![FieldValue::Null]).unwrap_err();
        assert!(matches!(err, InventoryError::InvalidArgument { .. }));
    }

    #[test]
    fn test_display_values_skip_streams() {
        let columns = columns();
        let display = DisplayMemberSet::from_columns(&columns);
        let row = RecordView::new(
            columns,
            vec![
                FieldValue::String("Icon".into()),
                FieldValue::Stream(8),
                FieldValue::Integer(3),
            ],
        )
        .unwrap();

        let values = row.display_values(&display);
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], ("Name", &FieldValue::String("Icon".into())));
        assert_eq!(values[1], ("Attributes", &FieldValue::Integer(3)));
    }

    #[test]
    fn test_field_display() {
        assert_eq!(FieldValue::Integer(5).to_string(), "5");
        assert_eq!(FieldValue::Null.to_string(), "");
        assert_eq!(FieldValue::Stream(4).to_string(), "<stream: 4 bytes>");
    }
}
