//! The current image set and its ratings.
//!
//! `CollectionStore` owns the sorted, deduplicated list of images and the
//! rating map. Everything else (selection, paging, the rated panel) refers
//! back into it by index or by `ImageId`.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Canonical absolute path identifying a collection member.
///
/// Equality, hashing and ordering all go through the raw path string, so two
/// ids compare the way their paths sort in a file listing.
#[derive(Clone, Serialize)]
#[serde(transparent)]
pub struct ImageId(PathBuf);

impl ImageId {
    /// Wrap a path that is already canonical.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Resolve symlinks and relative components through the filesystem.
    pub fn canonical(path: &Path) -> io::Result<Self> {
        Ok(Self(std::fs::canonicalize(path)?))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// File name for display, falling back to the full path.
    pub fn file_name(&self) -> String {
        self.0
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.0.display().to_string())
    }
}

impl PartialEq for ImageId {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_os_str() == other.0.as_os_str()
    }
}

impl Eq for ImageId {}

impl Hash for ImageId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.as_os_str().hash(state);
    }
}

impl PartialOrd for ImageId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ImageId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.as_os_str().cmp(other.0.as_os_str())
    }
}

impl fmt::Debug for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageId({})", self.0.display())
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// A star rating in 1..=5. "Unrated" is the absence of a `Rating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(stars: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&stars).then_some(Self(stars))
    }

    /// Nearest valid rating for `stars`.
    pub fn clamped(stars: u8) -> Self {
        Self(stars.clamp(Self::MIN, Self::MAX))
    }

    pub fn stars(self) -> u8 {
        self.0
    }

    /// All valid ratings, lowest first.
    pub fn all() -> impl DoubleEndedIterator<Item = Rating> {
        (Self::MIN..=Self::MAX).map(Rating)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CollectionError {
    #[error("image is not part of the collection: {0}")]
    UnknownImage(ImageId),
}

/// Ordered image set plus ratings.
#[derive(Debug, Default)]
pub struct CollectionStore {
    /// Sorted ascending, no duplicates.
    ids: Vec<ImageId>,
    /// Only ids present in `ids`; values are always 1..=5.
    ratings: BTreeMap<ImageId, Rating>,
    /// Bumped on every mutation so derived views know when to recompute.
    revision: u64,
}

impl CollectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh set. Ratings are dropped; the new ids are sorted and
    /// deduplicated. Returns the ids now in the store.
    pub fn replace_all(&mut self, ids: impl IntoIterator<Item = ImageId>) -> Vec<ImageId> {
        let mut ids: Vec<ImageId> = ids.into_iter().collect();
        ids.sort();
        ids.dedup();

        self.ids = ids;
        self.ratings.clear();
        self.revision += 1;

        self.ids.clone()
    }

    /// Union `ids` into the current set, keeping existing ratings, and
    /// re-sort. Returns only the ids that were not already present, in
    /// collection order.
    pub fn merge(&mut self, ids: impl IntoIterator<Item = ImageId>) -> Vec<ImageId> {
        let existing: HashSet<&ImageId> = self.ids.iter().collect();
        let mut added: Vec<ImageId> = ids
            .into_iter()
            .filter(|id| !existing.contains(id))
            .collect();
        added.sort();
        added.dedup();

        if added.is_empty() {
            return added;
        }

        self.ids.extend(added.iter().cloned());
        self.ids.sort();
        self.revision += 1;

        added
    }

    /// Set (or overwrite) the rating of a member. Not a toggle.
    pub fn rate(&mut self, id: &ImageId, rating: Rating) -> Result<(), CollectionError> {
        if !self.contains(id) {
            return Err(CollectionError::UnknownImage(id.clone()));
        }
        self.ratings.insert(id.clone(), rating);
        self.revision += 1;
        Ok(())
    }

    /// Stars for `id`, 0 when unrated or unknown.
    pub fn rating_of(&self, id: &ImageId) -> u8 {
        self.ratings.get(id).map(|r| r.stars()).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn at(&self, index: usize) -> Option<&ImageId> {
        self.ids.get(index)
    }

    pub fn contains(&self, id: &ImageId) -> bool {
        self.index_of(id).is_some()
    }

    /// Position of `id` in collection order.
    pub fn index_of(&self, id: &ImageId) -> Option<usize> {
        self.ids.binary_search(id).ok()
    }

    pub fn ids(&self) -> &[ImageId] {
        &self.ids
    }

    /// Rated members in path order.
    pub fn rated(&self) -> impl Iterator<Item = (&ImageId, Rating)> {
        self.ratings.iter().map(|(id, r)| (id, *r))
    }

    pub fn rated_count(&self) -> usize {
        self.ratings.len()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Explicit reset: the only way ratings are ever deleted.
    pub fn reset(&mut self) {
        self.ids.clear();
        self.ratings.clear();
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(path: &str) -> ImageId {
        ImageId::new(path)
    }

    fn ids(paths: &[&str]) -> Vec<ImageId> {
        paths.iter().map(|p| id(p)).collect()
    }

    #[test]
    fn test_replace_all_sorts_and_dedups() {
        let mut store = CollectionStore::new();
        store.replace_all(ids(&["/p/c.jpg", "/p/a.jpg", "/p/b.jpg", "/p/a.jpg"]));

        assert_eq!(store.len(), 3);
        assert_eq!(store.ids(), ids(&["/p/a.jpg", "/p/b.jpg", "/p/c.jpg"]).as_slice());
    }

    #[test]
    fn test_replace_all_clears_ratings() {
        let mut store = CollectionStore::new();
        store.replace_all(ids(&["/p/a.jpg"]));
        store.rate(&id("/p/a.jpg"), Rating::new(4).unwrap()).unwrap();

        store.replace_all(ids(&["/p/a.jpg", "/p/b.jpg"]));
        assert_eq!(store.rating_of(&id("/p/a.jpg")), 0, "new set starts unrated");
        assert_eq!(store.rated_count(), 0);
    }

    #[test]
    fn test_merge_is_union_sorted_and_keeps_ratings() {
        let mut store = CollectionStore::new();
        store.replace_all(ids(&["/p/b.jpg", "/p/d.jpg"]));
        store.rate(&id("/p/d.jpg"), Rating::new(5).unwrap()).unwrap();

        let added = store.merge(ids(&["/p/a.jpg", "/p/d.jpg", "/p/c.jpg", "/p/a.jpg"]));

        assert_eq!(added, ids(&["/p/a.jpg", "/p/c.jpg"]));
        assert_eq!(
            store.ids(),
            ids(&["/p/a.jpg", "/p/b.jpg", "/p/c.jpg", "/p/d.jpg"]).as_slice()
        );
        assert_eq!(store.rating_of(&id("/p/d.jpg")), 5);
    }

    #[test]
    fn test_merge_of_known_ids_changes_nothing() {
        let mut store = CollectionStore::new();
        store.replace_all(ids(&["/p/a.jpg"]));
        let before = store.revision();

        assert!(store.merge(ids(&["/p/a.jpg"])).is_empty());
        assert_eq!(store.revision(), before);
    }

    #[test]
    fn test_union_property_over_several_sets() {
        let sets: [(&[&str], &[&str]); 3] = [
            (&["/x/1", "/x/2"], &["/x/2", "/x/3"]),
            (&[], &["/x/9", "/x/1"]),
            (&["/x/5", "/x/4", "/x/5"], &[]),
        ];

        for (left, right) in sets {
            let mut store = CollectionStore::new();
            store.replace_all(ids(left));
            store.merge(ids(right));

            let mut expected: Vec<ImageId> = ids(left).into_iter().chain(ids(right)).collect();
            expected.sort();
            expected.dedup();

            assert_eq!(store.ids(), expected.as_slice(), "L={:?} M={:?}", left, right);
        }
    }

    #[test]
    fn test_rate_overwrites_and_is_not_a_toggle() {
        let mut store = CollectionStore::new();
        store.replace_all(ids(&["/p/a.jpg"]));
        let a = id("/p/a.jpg");

        for stars in [3, 3, 1, 5, 5, 2] {
            store.rate(&a, Rating::new(stars).unwrap()).unwrap();
            assert_eq!(store.rating_of(&a), stars);
        }
    }

    #[test]
    fn test_rate_unknown_image_is_rejected() {
        let mut store = CollectionStore::new();
        store.replace_all(ids(&["/p/a.jpg"]));

        let err = store.rate(&id("/p/zzz.jpg"), Rating::new(3).unwrap());
        assert_eq!(err, Err(CollectionError::UnknownImage(id("/p/zzz.jpg"))));
        assert_eq!(store.rated_count(), 0);
    }

    #[test]
    fn test_rating_bounds() {
        assert!(Rating::new(0).is_none());
        assert!(Rating::new(6).is_none());
        assert_eq!(Rating::all().count(), 5);

        let store = CollectionStore::new();
        assert_eq!(store.rating_of(&id("/nope")), 0);
    }

    #[test]
    fn test_ordering_is_by_path_string() {
        // Component-wise ordering would put "/a/b" before "/a-b"; string order does not.
        let mut v = ids(&["/a/b", "/a-b"]);
        v.sort();
        assert_eq!(v, ids(&["/a-b", "/a/b"]));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut store = CollectionStore::new();
        store.replace_all(ids(&["/p/a.jpg"]));
        store.rate(&id("/p/a.jpg"), Rating::new(2).unwrap()).unwrap();

        store.reset();
        assert!(store.is_empty());
        assert_eq!(store.rated_count(), 0);
        assert_eq!(store.at(0), None);
    }
}
