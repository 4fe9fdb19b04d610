//! Lazy enumeration over index-driven native fetch functions.
//!
//! Native inventories are walked by calling a function with index 0, 1, 2, …
//! until it reports the end of the sequence. [`EnumerationSession`] wraps one
//! such walk as a fused iterator: the consumer drives every step, the cursor
//! only moves forward, and the session ends for good on the first end-of-data
//! or failure. A new session is needed to enumerate again.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{InventoryError, Result};
use crate::status::{NativeStatus, StatusCode, StatusTable};

/// One step of a native enumeration.
pub trait IndexedFetch {
    type Item;

    /// Fetch the item at `index`. The item is only meaningful on success.
    fn fetch(&mut self, index: u32) -> (StatusCode, Option<Self::Item>);
}

impl<T, F> IndexedFetch for F
where
    F: FnMut(u32) -> (StatusCode, Option<T>),
{
    type Item = T;

    fn fetch(&mut self, index: u32) -> (StatusCode, Option<T>) {
        self(index)
    }
}

/// Single-use, forward-only enumeration session.
pub struct EnumerationSession<F> {
    operation: String,
    fetch: F,
    table: Arc<dyn StatusTable>,
    cursor: u32,
    exhausted: bool,
}

impl<F: IndexedFetch> EnumerationSession<F> {
    /// Create a session that starts at index 0.
    ///
    /// `operation` names the native call in errors and logs.
    pub fn new(operation: impl Into<String>, fetch: F, table: Arc<dyn StatusTable>) -> Self {
        Self {
            operation: operation.into(),
            fetch,
            table,
            cursor: 0,
            exhausted: false,
        }
    }

    /// Index the next step will fetch.
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Run one enumeration step.
    ///
    /// Returns `None` once the sequence has ended or failed.
    pub fn produce(&mut self) -> Option<Result<F::Item>> {
        if self.exhausted {
            return None;
        }

        let index = self.cursor;
        let (code, item) = self.fetch.fetch(index);
        match self.table.resolve(code, 0) {
            NativeStatus::Success => match item {
                Some(item) => {
                    trace!("{} yielded index {}", self.operation, index);
                    self.cursor += 1;
                    Some(Ok(item))
                }
                None => {
                    self.exhausted = true;
                    Some(Err(InventoryError::protocol(
                        &self.operation,
                        format!("success without an item at index {index}"),
                    )))
                }
            },
            NativeStatus::SequenceEnd => {
                debug!("{} finished after {} items", self.operation, index);
                self.exhausted = true;
                None
            }
            NativeStatus::Fatal(code) => {
                debug!("{} failed at index {} with status {}", self.operation, index, code);
                self.exhausted = true;
                Some(Err(InventoryError::native(&self.operation, code)))
            }
            // Absent values and buffer growth have no meaning for an
            // enumeration step, so they are failures like any other code.
            NativeStatus::ValueAbsent | NativeStatus::InsufficientBuffer(_) => {
                debug!("{} failed at index {} with status {}", self.operation, index, code);
                self.exhausted = true;
                Some(Err(InventoryError::native(&self.operation, code)))
            }
        }
    }

    /// Collect every item, stopping at the first failure.
    pub fn collect_all(self) -> Result<Vec<F::Item>> {
        self.collect()
    }

    /// Adapt every produced item, keeping failures as they are.
    pub fn map_items<U, M>(self, mut map: M) -> impl Iterator<Item = Result<U>>
    where
        M: FnMut(F::Item) -> U,
    {
        self.map(move |item| item.map(&mut map))
    }
}

impl<F: IndexedFetch> Iterator for EnumerationSession<F> {
    type Item = Result<F::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        self.produce()
    }
}

impl<F: IndexedFetch> std::iter::FusedIterator for EnumerationSession<F> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{win32, Win32StatusTable};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn table() -> Arc<dyn StatusTable> {
        Arc::new(Win32StatusTable)
    }

    /// Source yielding `count` items, then `tail` forever; records requested indices.
    fn source(
        count: u32,
        tail: StatusCode,
        seen: Rc<RefCell<Vec<u32>>>,
    ) -> impl FnMut(u32) -> (StatusCode, Option<String>) {
        move |index| {
            seen.borrow_mut().push(index);
            if index < count {
                (win32::ERROR_SUCCESS, Some(format!("item-{index}")))
            } else {
                (tail, None)
            }
        }
    }

    #[test]
    fn test_yields_items_in_order_then_ends() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let session = EnumerationSession::new(
            "enum",
            source(3, win32::ERROR_NO_MORE_ITEMS, seen.clone()),
            table(),
        );
        let items = session.collect_all().unwrap();
        assert_eq!(items, vec!["item-0", "item-1", "item-2"]);
        assert_eq!(*seen.borrow(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_empty_sequence() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut session = EnumerationSession::new(
            "enum",
            source(0, win32::ERROR_NO_MORE_ITEMS, seen.clone()),
            table(),
        );
        assert!(session.next().is_none());
        assert!(session.is_exhausted());
        assert_eq!(session.cursor(), 0);
    }

    #[test]
    fn test_fatal_stops_after_prefix() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut session = EnumerationSession::new(
            "enum",
            source(2, win32::ERROR_BAD_CONFIGURATION, seen.clone()),
            table(),
        );

        assert_eq!(session.next().unwrap().unwrap(), "item-0");
        assert_eq!(session.next().unwrap().unwrap(), "item-1");
        let err = session.next().unwrap().unwrap_err();
        assert_eq!(err.native_code(), Some(win32::ERROR_BAD_CONFIGURATION));
        assert!(session.next().is_none());
        assert!(session.next().is_none());
        assert_eq!(*seen.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_no_fetch_after_end() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut session = EnumerationSession::new(
            "enum",
            source(1, win32::ERROR_NO_MORE_ITEMS, seen.clone()),
            table(),
        );
        while session.next().is_some() {}
        assert!(session.produce().is_none());
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn test_success_without_item_is_protocol_violation() {
        let mut session = EnumerationSession::new(
            "enum",
            |_index: u32| (win32::ERROR_SUCCESS, None::<String>),
            table(),
        );
        let err = session.next().unwrap().unwrap_err();
        assert!(matches!(err, InventoryError::ProtocolViolation { .. }));
        assert!(session.next().is_none());
    }

    #[test]
    fn test_absent_during_enumeration_is_fatal() {
        let mut session = EnumerationSession::new(
            "enum",
            |_index: u32| (win32::ERROR_UNKNOWN_PRODUCT, None::<String>),
            table(),
        );
        let err = session.next().unwrap().unwrap_err();
        assert_eq!(err.native_code(), Some(win32::ERROR_UNKNOWN_PRODUCT));
    }

    #[test]
    fn test_map_items() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let session = EnumerationSession::new(
            "enum",
            source(2, win32::ERROR_NO_MORE_ITEMS, seen),
            table(),
        );
        let lengths: Vec<usize> = session
            .map_items(|item| item.len())
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(lengths, vec![6, 6]);
    }
}
