// Which trip, if any, already holds an attraction.
// Keyed by external `place_id`, with the numeric attraction id as a fallback
// for rows the backend stored without one.

use dashmap::DashMap;
use tracing::debug;

use crate::models::{Attraction, Compilation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripMembership {
    pub compilation_id: i64,
    pub item_id: i64,
    pub attraction_id: i64,
}

#[derive(Default)]
pub struct TripIndex {
    by_place: DashMap<String, TripMembership>,
    by_attraction: DashMap<i64, TripMembership>,
}

impl TripIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebuild(&self, compilations: &[Compilation]) {
        self.by_place.clear();
        self.by_attraction.clear();
        for compilation in compilations {
            self.insert_items(compilation);
        }
        debug!(entries = self.len(), "trip index rebuilt");
    }

    /// Replaces every entry of `compilation` with its current items.
    ///
    /// Used after add/remove, where the backend returns the whole updated
    /// compilation.
    pub fn apply_compilation(&self, compilation: &Compilation) {
        self.remove_compilation(compilation.id);
        self.insert_items(compilation);
    }

    pub fn remove_compilation(&self, compilation_id: i64) {
        self.by_place
            .retain(|_, m| m.compilation_id != compilation_id);
        self.by_attraction
            .retain(|_, m| m.compilation_id != compilation_id);
    }

    // Local patch for a single removal, when no updated compilation is at hand
    pub fn forget(&self, attraction: &Attraction) {
        if !attraction.place_id.is_empty() {
            self.by_place.remove(&attraction.place_id);
        }
        self.by_attraction.remove(&attraction.id);
    }

    pub fn lookup(&self, place_id: &str, attraction_id: Option<i64>) -> Option<TripMembership> {
        if !place_id.is_empty() {
            if let Some(found) = self.by_place.get(place_id) {
                return Some(*found);
            }
        }
        attraction_id.and_then(|id| self.by_attraction.get(&id).map(|m| *m))
    }

    pub fn membership_of(&self, attraction: &Attraction) -> Option<TripMembership> {
        self.lookup(&attraction.place_id, Some(attraction.id))
    }

    pub fn len(&self) -> usize {
        self.by_place.len().max(self.by_attraction.len())
    }

    pub fn is_empty(&self) -> bool {
        self.by_place.is_empty() && self.by_attraction.is_empty()
    }

    fn insert_items(&self, compilation: &Compilation) {
        for item in &compilation.items {
            let attraction_id = if item.attraction_id != 0 {
                item.attraction_id
            } else {
                item.attraction.id
            };
            let membership = TripMembership {
                compilation_id: compilation.id,
                item_id: item.id,
                attraction_id,
            };

            if !item.attraction.place_id.is_empty() {
                self.by_place
                    .insert(item.attraction.place_id.clone(), membership);
            }
            if attraction_id != 0 {
                self.by_attraction.insert(attraction_id, membership);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CompilationItem;

    fn compilation(id: i64, items: &[(i64, i64, &str)]) -> Compilation {
        Compilation {
            id,
            name: format!("Trip {id}"),
            items: items
                .iter()
                .map(|(item_id, attraction_id, place_id)| CompilationItem {
                    id: *item_id,
                    attraction_id: *attraction_id,
                    attraction: Attraction {
                        id: *attraction_id,
                        place_id: place_id.to_string(),
                        ..Default::default()
                    },
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_lookup_by_place_id() {
        let index = TripIndex::new();
        index.rebuild(&[
            compilation(1, &[(10, 100, "X")]),
            compilation(2, &[(20, 200, "Y")]),
        ]);

        assert_eq!(
            index.lookup("X", None),
            Some(TripMembership {
                compilation_id: 1,
                item_id: 10,
                attraction_id: 100
            })
        );
        assert_eq!(index.lookup("Z", None), None);
    }

    #[test]
    fn test_numeric_id_fallback() {
        let index = TripIndex::new();
        index.rebuild(&[compilation(3, &[(30, 300, "")])]);

        assert_eq!(index.lookup("unknown", Some(300)).map(|m| m.item_id), Some(30));
        assert_eq!(index.lookup("unknown", Some(301)), None);
    }

    #[test]
    fn test_apply_and_remove_compilation() {
        let index = TripIndex::new();
        index.rebuild(&[compilation(1, &[(10, 100, "X"), (11, 101, "Y")])]);

        index.apply_compilation(&compilation(1, &[(11, 101, "Y")]));
        assert_eq!(index.lookup("X", Some(100)), None);
        assert!(index.lookup("Y", None).is_some());

        index.remove_compilation(1);
        assert!(index.is_empty());
    }

    #[test]
    fn test_forget_single_attraction() {
        let index = TripIndex::new();
        let trip = compilation(1, &[(10, 100, "X")]);
        index.rebuild(std::slice::from_ref(&trip));

        index.forget(&trip.items[0].attraction);
        assert_eq!(index.membership_of(&trip.items[0].attraction), None);
    }
}
