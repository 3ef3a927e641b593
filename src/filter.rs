//! Rating filter for the rated panel and for export.

use crate::collection::{CollectionStore, ImageId, Rating};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which rated images are visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FilterPredicate {
    /// Any rated image. Unrated images never appear.
    #[default]
    All,
    ExactRating(Rating),
    MinRating(Rating),
}

impl FilterPredicate {
    pub fn matches(&self, rating: Rating) -> bool {
        match self {
            FilterPredicate::All => true,
            FilterPredicate::ExactRating(r) => rating == *r,
            FilterPredicate::MinRating(r) => rating >= *r,
        }
    }

    /// Menu order: All, 5, 4, 4+, 3+, 2+, 1+.
    pub fn menu() -> Vec<FilterPredicate> {
        let r = Rating::clamped;
        vec![
            FilterPredicate::All,
            FilterPredicate::ExactRating(r(5)),
            FilterPredicate::ExactRating(r(4)),
            FilterPredicate::MinRating(r(4)),
            FilterPredicate::MinRating(r(3)),
            FilterPredicate::MinRating(r(2)),
            FilterPredicate::MinRating(r(1)),
        ]
    }

    /// Next entry of `menu()`, wrapping to `All`. Predicates that are not in
    /// the menu (e.g. "exactly 2") move to `All`.
    pub fn next(&self) -> Self {
        let menu = Self::menu();
        menu.iter()
            .position(|p| p == self)
            .and_then(|pos| menu.get(pos + 1).copied())
            .unwrap_or(FilterPredicate::All)
    }
}

impl fmt::Display for FilterPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterPredicate::All => write!(f, "All"),
            FilterPredicate::ExactRating(r) if r.stars() == 1 => write!(f, "1 star"),
            FilterPredicate::ExactRating(r) => write!(f, "{} stars", r.stars()),
            FilterPredicate::MinRating(r) if r.stars() == 1 => write!(f, "1+ star"),
            FilterPredicate::MinRating(r) => write!(f, "{}+ stars", r.stars()),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterParseError {
    #[error("empty filter")]
    Empty,
    #[error("rating must be 1-5, got '{0}'")]
    BadRating(String),
}

impl FromStr for FilterPredicate {
    type Err = FilterParseError;

    /// Accepts `all`, `4`, `4+`, `4 stars`, `4+ stars`, `1 star`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s.is_empty() {
            return Err(FilterParseError::Empty);
        }
        if s == "all" || s == "*" {
            return Ok(FilterPredicate::All);
        }

        let body = s
            .trim_end_matches("stars")
            .trim_end_matches("star")
            .trim();
        let (digits, at_least) = match body.strip_suffix('+') {
            Some(d) => (d.trim(), true),
            None => (body, false),
        };

        let rating = digits
            .parse::<u8>()
            .ok()
            .and_then(Rating::new)
            .ok_or_else(|| FilterParseError::BadRating(s.clone()))?;

        Ok(if at_least {
            FilterPredicate::MinRating(rating)
        } else {
            FilterPredicate::ExactRating(rating)
        })
    }
}

impl TryFrom<String> for FilterPredicate {
    type Error = FilterParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FilterPredicate> for String {
    fn from(value: FilterPredicate) -> Self {
        match value {
            FilterPredicate::All => "all".to_string(),
            FilterPredicate::ExactRating(r) => r.stars().to_string(),
            FilterPredicate::MinRating(r) => format!("{}+", r.stars()),
        }
    }
}

/// Rated images matching `predicate`, in path order.
pub fn visible(store: &CollectionStore, predicate: FilterPredicate) -> Vec<(ImageId, Rating)> {
    store
        .rated()
        .filter(|(_, rating)| predicate.matches(*rating))
        .map(|(id, rating)| (id.clone(), rating))
        .collect()
}

/// Memoised `visible()` for render loops.
///
/// Recomputed in full whenever the store revision or the predicate changes;
/// never patched incrementally.
#[derive(Debug, Default)]
pub struct FilterIndex {
    entries: Vec<(ImageId, Rating)>,
    computed_for: Option<(u64, FilterPredicate)>,
}

impl FilterIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible(
        &mut self,
        store: &CollectionStore,
        predicate: FilterPredicate,
    ) -> &[(ImageId, Rating)] {
        let key = (store.revision(), predicate);
        if self.computed_for != Some(key) {
            self.entries = visible(store, predicate);
            self.computed_for = Some(key);
        }
        &self.entries
    }

    pub fn count(&mut self, store: &CollectionStore, predicate: FilterPredicate) -> usize {
        self.visible(store, predicate).len()
    }

    /// Force the next `visible()` to recompute.
    pub fn invalidate(&mut self) {
        self.computed_for = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn r(n: u8) -> Rating {
        Rating::new(n).unwrap()
    }

    fn rated_store(assignments: &[(&str, u8)], unrated: &[&str]) -> CollectionStore {
        let mut store = CollectionStore::new();
        store.replace_all(
            assignments
                .iter()
                .map(|(p, _)| ImageId::new(*p))
                .chain(unrated.iter().map(|p| ImageId::new(*p))),
        );
        for (p, stars) in assignments {
            store.rate(&ImageId::new(*p), r(*stars)).unwrap();
        }
        store
    }

    fn names(entries: &[(ImageId, Rating)]) -> Vec<String> {
        entries.iter().map(|(id, _)| id.file_name()).collect()
    }

    #[test]
    fn test_exact_and_min() {
        let store = rated_store(&[("/a", 5), ("/b", 3), ("/c", 4)], &["/d"]);

        assert_eq!(names(&visible(&store, FilterPredicate::MinRating(r(4)))), ["a", "c"]);
        assert_eq!(names(&visible(&store, FilterPredicate::ExactRating(r(3)))), ["b"]);
        assert_eq!(names(&visible(&store, FilterPredicate::All)), ["a", "b", "c"]);
    }

    #[test]
    fn test_unrated_never_visible() {
        let store = rated_store(&[], &["/x", "/y"]);
        assert!(visible(&store, FilterPredicate::All).is_empty());
        assert!(visible(&store, FilterPredicate::MinRating(r(1))).is_empty());
    }

    #[test]
    fn test_min_rating_subset_and_exact_partition() {
        let store = rated_store(
            &[("/1", 1), ("/2", 2), ("/3", 3), ("/4", 4), ("/5", 5), ("/6", 3), ("/7", 5)],
            &["/8"],
        );

        let min3: HashSet<_> = visible(&store, FilterPredicate::MinRating(r(3))).into_iter().collect();
        let min1: HashSet<_> = visible(&store, FilterPredicate::MinRating(r(1))).into_iter().collect();
        assert!(min3.is_subset(&min1));

        let all = visible(&store, FilterPredicate::All);
        let mut union = Vec::new();
        for rating in Rating::all() {
            union.extend(visible(&store, FilterPredicate::ExactRating(rating)));
        }
        assert_eq!(union.len(), all.len(), "exact filters must not overlap");
        let union: HashSet<_> = union.into_iter().collect();
        let all: HashSet<_> = all.into_iter().collect();
        assert_eq!(union, all);
    }

    #[test]
    fn test_index_recomputes_after_rating_change() {
        let mut store = rated_store(&[("/a", 2)], &["/b"]);
        let mut index = FilterIndex::new();
        let pred = FilterPredicate::MinRating(r(2));

        assert_eq!(index.count(&store, pred), 1);

        store.rate(&ImageId::new("/b"), r(4)).unwrap();
        assert_eq!(index.count(&store, pred), 2);

        assert_eq!(index.count(&store, FilterPredicate::ExactRating(r(4))), 1);
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("all".parse(), Ok(FilterPredicate::All));
        assert_eq!("4".parse(), Ok(FilterPredicate::ExactRating(r(4))));
        assert_eq!("4+".parse(), Ok(FilterPredicate::MinRating(r(4))));
        assert_eq!("3+ stars".parse(), Ok(FilterPredicate::MinRating(r(3))));
        assert_eq!("1 star".parse(), Ok(FilterPredicate::ExactRating(r(1))));
        assert!("0".parse::<FilterPredicate>().is_err());
        assert!("6+".parse::<FilterPredicate>().is_err());
        assert_eq!("".parse::<FilterPredicate>(), Err(FilterParseError::Empty));

        assert_eq!(FilterPredicate::MinRating(r(1)).to_string(), "1+ star");
        assert_eq!(FilterPredicate::MinRating(r(4)).to_string(), "4+ stars");
        assert_eq!(FilterPredicate::ExactRating(r(5)).to_string(), "5 stars");
    }

    #[test]
    fn test_menu_cycle_wraps() {
        let mut p = FilterPredicate::All;
        let mut seen = vec![p];
        for _ in 0..6 {
            p = p.next();
            seen.push(p);
        }
        assert_eq!(seen, FilterPredicate::menu());
        assert_eq!(p.next(), FilterPredicate::All);
        assert_eq!(FilterPredicate::ExactRating(r(2)).next(), FilterPredicate::All);
    }
}
