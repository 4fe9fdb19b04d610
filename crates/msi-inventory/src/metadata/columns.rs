//! Column descriptors derived from a query shape.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::key::QueryKey;
use crate::error::{InventoryError, Result};

/// Column definition as reported by the native view, e.g. `s72` or `I2`.
static COLUMN_DEFINITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([sSlLgGiIjJvV])(\d{1,3})$").unwrap());

/// Storage class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    String,
    Int16,
    Int32,
    Stream,
}

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnType {
    pub kind: ColumnKind,
    /// Declared width; zero means unbounded for strings.
    pub width: u16,
    pub nullable: bool,
    pub localizable: bool,
    /// Held only in memory, never persisted to the database.
    pub temporary: bool,
}

impl ColumnType {
    pub fn new(kind: ColumnKind, width: u16) -> Self {
        Self {
            kind,
            width,
            nullable: false,
            localizable: false,
            temporary: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Parse a native column definition.
    ///
    /// The letter selects the storage class (`s`/`l`/`g` string, `i`/`j`
    /// integer, `v` stream) and upper case marks a nullable column.
    pub fn parse(definition: &str) -> Result<Self> {
        let invalid = || {
            InventoryError::invalid_argument(
                "column_type",
                format!("invalid column definition {definition:?}"),
            )
        };

        let caps = COLUMN_DEFINITION.captures(definition).ok_or_else(invalid)?;
        let letter = caps[1].chars().next().ok_or_else(invalid)?;
        let width: u16 = caps[2].parse().map_err(|_| invalid())?;

        let lower = letter.to_ascii_lowercase();
        let kind = match lower {
            's' | 'l' | 'g' => ColumnKind::String,
            'v' => ColumnKind::Stream,
            'i' | 'j' => match width {
                2 => ColumnKind::Int16,
                4 => ColumnKind::Int32,
                _ => return Err(invalid()),
            },
            _ => return Err(invalid()),
        };

        Ok(Self {
            kind,
            width,
            nullable: letter.is_ascii_uppercase(),
            localizable: lower == 'l',
            temporary: lower == 'g' || lower == 'j',
        })
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match (self.kind, self.localizable, self.temporary) {
            (ColumnKind::String, true, _) => 'l',
            (ColumnKind::String, false, true) => 'g',
            (ColumnKind::String, false, false) => 's',
            (ColumnKind::Int16 | ColumnKind::Int32, _, true) => 'j',
            (ColumnKind::Int16 | ColumnKind::Int32, _, false) => 'i',
            (ColumnKind::Stream, _, _) => 'v',
        };
        let letter = if self.nullable {
            letter.to_ascii_uppercase()
        } else {
            letter
        };
        write!(f, "{}{}", letter, self.width)
    }
}

/// One column of a query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Zero-based position in every row of the query.
    pub ordinal: usize,
    pub column_type: ColumnType,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, ordinal: usize, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            ordinal,
            column_type,
        }
    }

    /// Build from a native column definition string.
    pub fn from_definition(name: impl Into<String>, ordinal: usize, definition: &str) -> Result<Self> {
        Ok(Self::new(name, ordinal, ColumnType::parse(definition)?))
    }
}

/// All columns of one query shape, shared between the rows of that shape.
#[derive(Debug)]
pub struct ColumnSet {
    query: QueryKey,
    columns: Vec<ColumnDescriptor>,
    by_name: HashMap<String, usize>,
}

impl ColumnSet {
    /// Validate and index descriptors.
    ///
    /// Ordinals must cover `0..len` exactly once. When names repeat, lookups
    /// by name resolve to the lowest ordinal.
    pub fn new(query: QueryKey, mut columns: Vec<ColumnDescriptor>) -> Result<Self> {
        columns.sort_by_key(|column| column.ordinal);
        for (index, column) in columns.iter().enumerate() {
            if column.ordinal != index {
                return Err(InventoryError::protocol(
                    "describe query",
                    format!(
                        "column ordinals for {} are not contiguous at {}",
                        query, column.name
                    ),
                ));
            }
            if column.name.is_empty() {
                return Err(InventoryError::protocol(
                    "describe query",
                    format!("column {index} of {query} has no name"),
                ));
            }
        }

        let mut by_name = HashMap::with_capacity(columns.len());
        for column in &columns {
            by_name
                .entry(column.name.to_lowercase())
                .or_insert(column.ordinal);
        }

        Ok(Self {
            query,
            columns,
            by_name,
        })
    }

    pub fn query(&self) -> &QueryKey {
        &self.query
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Case-insensitive name lookup.
    pub fn ordinal_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(&name.to_lowercase()).copied()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.ordinal_of(name).map(|ordinal| &self.columns[ordinal])
    }

    pub fn by_ordinal(&self, ordinal: usize) -> Option<&ColumnDescriptor> {
        self.columns.get(ordinal)
    }
}

impl PartialEq for ColumnSet {
    fn eq(&self, other: &Self) -> bool {
        self.query == other.query && self.columns == other.columns
    }
}

/// Names shown by default when a row is displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMemberSet {
    query: QueryKey,
    members: Vec<String>,
}

impl DisplayMemberSet {
    /// Every non-stream column, in ordinal order, each name once.
    pub fn from_columns(columns: &ColumnSet) -> Self {
        let mut seen = std::collections::HashSet::new();
        let members = columns
            .columns()
            .iter()
            .filter(|column| column.column_type.kind != ColumnKind::Stream)
            .filter(|column| seen.insert(column.name.to_lowercase()))
            .map(|column| column.name.clone())
            .collect();
        Self {
            query: columns.query().clone(),
            members,
        }
    }

    pub fn query(&self) -> &QueryKey {
        &self.query
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.iter().any(|member| member.eq_ignore_ascii_case(name))
    }
}
