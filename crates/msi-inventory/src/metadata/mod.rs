//! Shared, reclaimable metadata for tabular queries.
//!
//! Every row returned by a query needs the same column metadata to resolve
//! fields by name. [`QueryMetadataCache`] derives that metadata once per query
//! shape and hands out shared `Arc`s. The cache holds only weak references:
//! when the last [`RecordView`] of a query is dropped the metadata is freed,
//! and the next lookup derives it again. A freed entry looks exactly like
//! one that was never computed.
//!
//! Query shapes are keyed case-insensitively, so `SELECT A` and `select a`
//! share an entry.

mod columns;
mod key;
mod reclaim;
mod record;

pub use columns::{ColumnDescriptor, ColumnKind, ColumnSet, ColumnType, DisplayMemberSet};
pub use key::QueryKey;
pub use reclaim::{Publish, ReclaimableMap, ReclaimableRef};
pub use record::{FieldValue, RecordView};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::Result;

/// Row-shape introspection for a query.
pub trait QueryDescriber: Send + Sync {
    /// Describe every column `query` returns, in row order.
    fn describe_query(&self, query: &str) -> Result<Vec<ColumnDescriptor>>;
}

impl<F> QueryDescriber for F
where
    F: Fn(&str) -> Result<Vec<ColumnDescriptor>> + Send + Sync,
{
    fn describe_query(&self, query: &str) -> Result<Vec<ColumnDescriptor>> {
        self(query)
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Column sets still held by some consumer.
    pub live_columns: usize,
    /// Column set slots whose value has been freed but not yet pruned.
    pub dead_columns: usize,
    pub live_display_sets: usize,
    pub dead_display_sets: usize,
    /// Lookups answered from a live entry.
    pub hits: u64,
    /// Lookups that found no live entry.
    pub misses: u64,
    /// Column sets built from the describer.
    pub derivations: u64,
    /// Derived values dropped because a concurrent caller published first.
    pub discarded: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    derivations: AtomicU64,
    discarded: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Process-wide cache of column and display metadata keyed by query shape.
pub struct QueryMetadataCache {
    describer: Arc<dyn QueryDescriber>,
    columns: ReclaimableMap<QueryKey, ColumnSet>,
    displays: ReclaimableMap<QueryKey, DisplayMemberSet>,
    counters: Counters,
}

impl QueryMetadataCache {
    pub fn new(describer: Arc<dyn QueryDescriber>) -> Self {
        Self {
            describer,
            columns: ReclaimableMap::new(),
            displays: ReclaimableMap::new(),
            counters: Counters::default(),
        }
    }

    /// Column metadata for `query`.
    ///
    /// Returns the live entry when one exists. Otherwise the columns are
    /// described, published and returned. Concurrent callers may describe
    /// the same query redundantly; only the first published result is kept
    /// and everyone receives it.
    pub fn get_columns(&self, query: &str) -> Result<Arc<ColumnSet>> {
        let key = QueryKey::new(query)?;
        if let Some(live) = self.columns.get(&key)? {
            trace!("Column metadata hit for {}", key);
            Counters::bump(&self.counters.hits);
            return Ok(live);
        }
        Counters::bump(&self.counters.misses);
        self.derive_columns(key)
    }

    fn derive_columns(&self, key: QueryKey) -> Result<Arc<ColumnSet>> {
        debug!("Describing columns for {}", key);
        let descriptors = self.describer.describe_query(key.original())?;
        let derived = Arc::new(ColumnSet::new(key.clone(), descriptors)?);
        Counters::bump(&self.counters.derivations);

        let (columns, outcome) = self.columns.publish(key, derived)?;
        if outcome == Publish::Existing {
            trace!("Discarding redundant column metadata for {}", columns.query());
            Counters::bump(&self.counters.discarded);
        }
        Ok(columns)
    }

    /// Display members for `query`, derived from its column metadata.
    ///
    /// Cached separately from the columns, so either may be freed while the
    /// other is still in use.
    pub fn get_display_member_set(&self, query: &str) -> Result<Arc<DisplayMemberSet>> {
        let key = QueryKey::new(query)?;
        if let Some(live) = self.displays.get(&key)? {
            trace!("Display metadata hit for {}", key);
            Counters::bump(&self.counters.hits);
            return Ok(live);
        }
        Counters::bump(&self.counters.misses);

        // Already counted as a miss; live columns are reused silently.
        let columns = match self.columns.get(&key)? {
            Some(live) => live,
            None => self.derive_columns(key.clone())?,
        };
        let derived = Arc::new(DisplayMemberSet::from_columns(&columns));
        let (display, outcome) = self.displays.publish(key, derived)?;
        if outcome == Publish::Existing {
            Counters::bump(&self.counters.discarded);
        }
        Ok(display)
    }

    /// Bind a row of field values to the column metadata of `query`.
    pub fn record(&self, query: &str, fields: Vec<FieldValue>) -> Result<RecordView> {
        RecordView::new(self.get_columns(query)?, fields)
    }

    /// Prune freed slots. Returns how many were removed.
    pub fn purge(&self) -> Result<usize> {
        Ok(self.columns.purge()? + self.displays.purge()?)
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let (live_columns, dead_columns) = self.columns.counts()?;
        let (live_display_sets, dead_display_sets) = self.displays.counts()?;
        Ok(CacheStats {
            live_columns,
            dead_columns,
            live_display_sets,
            dead_display_sets,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            derivations: self.counters.derivations.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
        })
    }
}

impl std::fmt::Debug for QueryMetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryMetadataCache")
            .field("columns", &self.columns)
            .field("displays", &self.displays)
            .finish_non_exhaustive()
    }
}
