//! Selection cursor and page window over the collection.
//!
//! Both hold nothing but an index; the collection itself is always passed in,
//! so a mutation of the store can never leave a stale copy behind.

use crate::collection::{CollectionStore, ImageId};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("selection {index} is out of range (collection has {len} images)")]
    OutOfRange { index: usize, len: usize },
}

/// The single active index into the collection. `None` iff the collection
/// is empty.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SelectionCursor {
    index: Option<usize>,
}

impl SelectionCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn current<'a>(&self, store: &'a CollectionStore) -> Option<&'a ImageId> {
        self.index.and_then(|i| store.at(i))
    }

    /// Keyboard stepping. Never wraps: a step that would leave the range
    /// stops at the first or last image. Returns whether the index changed.
    pub fn move_by(&mut self, store: &CollectionStore, delta: isize) -> bool {
        let len = store.len();
        let Some(current) = self.index else {
            return false;
        };
        if len == 0 {
            self.index = None;
            return false;
        }

        let last = len - 1;
        let target = if delta.is_negative() {
            current.saturating_sub(delta.unsigned_abs())
        } else {
            current.saturating_add(delta.unsigned_abs()).min(last)
        };

        let changed = target != current;
        self.index = Some(target);
        changed
    }

    /// Explicit selection (click, `go N`). Out of range is an error and the
    /// cursor is left untouched.
    pub fn select(&mut self, store: &CollectionStore, index: usize) -> Result<(), SelectionError> {
        let len = store.len();
        if index >= len {
            return Err(SelectionError::OutOfRange { index, len });
        }
        self.index = Some(index);
        Ok(())
    }

    /// Re-fit after the collection changed size: clamp into range, select
    /// the first image if there was no selection, clear if empty.
    pub fn clamp(&mut self, store: &CollectionStore) {
        let len = store.len();
        self.index = match (self.index, len) {
            (_, 0) => None,
            (None, _) => Some(0),
            (Some(i), _) => Some(i.min(len - 1)),
        };
    }

    /// Point at `id` if it is a member, otherwise fall back to `clamp`.
    pub fn follow(&mut self, store: &CollectionStore, id: &ImageId) {
        match store.index_of(id) {
            Some(i) => self.index = Some(i),
            None => self.clamp(store),
        }
    }

    pub fn clear(&mut self) {
        self.index = None;
    }
}

/// Half-open index range `[start, end)` of the page containing `index`.
///
/// A `page_size` of zero is treated as one; an `index` past the end is
/// treated as the last image.
pub fn window(total: usize, page_size: usize, index: usize) -> (usize, usize) {
    if total == 0 {
        return (0, 0);
    }
    let page_size = page_size.max(1);
    let index = index.min(total - 1);
    let start = page_size * (index / page_size);
    let end = total.min(start + page_size);
    (start, end)
}

/// Page geometry. Only the page size is stored; the page itself is always
/// derived from the current selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagedView {
    page_size: usize,
}

impl PagedView {
    pub const DEFAULT_PAGE_SIZE: usize = 100;

    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size.max(1);
    }

    pub fn window(&self, total: usize, index: usize) -> (usize, usize) {
        window(total, self.page_size, index)
    }

    /// Zero-based page containing `index`.
    pub fn page(&self, index: usize) -> usize {
        index / self.page_size
    }

    pub fn page_count(&self, total: usize) -> usize {
        total.div_ceil(self.page_size)
    }
}

impl Default for PagedView {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_of(n: usize) -> CollectionStore {
        let mut store = CollectionStore::new();
        store.replace_all((0..n).map(|i| ImageId::new(format!("/img/{:04}.jpg", i))));
        store
    }

    #[test]
    fn test_window_examples() {
        assert_eq!(window(250, 100, 150), (100, 200));
        assert_eq!(window(250, 100, 249), (200, 250));
        assert_eq!(window(250, 100, 0), (0, 100));
        assert_eq!(window(0, 100, 0), (0, 0));
    }

    #[test]
    fn test_window_degenerate_inputs() {
        assert_eq!(window(10, 0, 3), (3, 4), "page size 0 behaves as 1");
        assert_eq!(window(10, 4, 99), (8, 10), "index past the end uses the last page");
    }

    #[test]
    fn test_page_size_change_follows_current_index() {
        let mut view = PagedView::new(100);
        let index = 150;
        assert_eq!(view.page(index), 1);

        view.set_page_size(40);
        assert_eq!(view.window(250, index), (120, 160));
        assert_eq!(view.page(index), 3);
        assert_eq!(view.page_count(250), 7);
    }

    #[test]
    fn test_move_by_stops_at_boundaries() {
        let store = store_of(5);
        let mut cursor = SelectionCursor::new();
        cursor.select(&store, 4).unwrap();

        assert!(!cursor.move_by(&store, 1));
        assert_eq!(cursor.index(), Some(4));

        cursor.select(&store, 0).unwrap();
        assert!(!cursor.move_by(&store, -1));
        assert_eq!(cursor.index(), Some(0));
    }

    #[test]
    fn test_move_by_never_leaves_range() {
        let store = store_of(5);
        let mut cursor = SelectionCursor::new();
        cursor.clamp(&store);

        for delta in [3, 3, -10, 2, 100, -1, isize::MIN, isize::MAX] {
            cursor.move_by(&store, delta);
            let i = cursor.index().unwrap();
            assert!(i < 5, "index {} escaped after delta {}", i, delta);
        }
    }

    #[test]
    fn test_select_out_of_range_is_rejected_without_mutation() {
        let store = store_of(3);
        let mut cursor = SelectionCursor::new();
        cursor.select(&store, 1).unwrap();

        assert_eq!(
            cursor.select(&store, 3),
            Err(SelectionError::OutOfRange { index: 3, len: 3 })
        );
        assert_eq!(cursor.index(), Some(1));
    }

    #[test]
    fn test_empty_collection_has_no_selection() {
        let store = store_of(0);
        let mut cursor = SelectionCursor::new();
        cursor.clamp(&store);
        assert_eq!(cursor.index(), None);
        assert!(!cursor.move_by(&store, 1));
        assert!(cursor.current(&store).is_none());
    }

    #[test]
    fn test_clamp_after_shrink_and_follow_after_resort() {
        let mut store = store_of(10);
        let mut cursor = SelectionCursor::new();
        cursor.select(&store, 9).unwrap();

        store.replace_all((0..3).map(|i| ImageId::new(format!("/img/{:04}.jpg", i))));
        cursor.clamp(&store);
        assert_eq!(cursor.index(), Some(2));

        let selected = cursor.current(&store).cloned().unwrap();
        store.merge([ImageId::new("/img/0000a.jpg"), ImageId::new("/aaa.jpg")]);
        cursor.follow(&store, &selected);
        assert_eq!(cursor.current(&store), Some(&selected));
    }
}
