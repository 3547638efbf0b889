/*
 * Copyright (C) 2025 Open Source Robotics Foundation
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 *
*/

//! A small nearest-neighbor container with a pluggable distance function.
//!
//! The planner's query volumes are modest (one radius query per vertex
//! expansion, one nearest query per heuristic evaluation), so a linear scan
//! in insertion order keeps the structure simple and the results
//! deterministic. Callers that need something sub-linear can swap this out
//! behind the same interface.

use float_ord::FloatOrd;

type DistanceFn<T> = Box<dyn Fn(&T, &T) -> f64>;

pub struct NearestNeighbors<T> {
    items: Vec<T>,
    distance: DistanceFn<T>,
}

impl<T> std::fmt::Debug for NearestNeighbors<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NearestNeighbors")
            .field("len", &self.items.len())
            .finish()
    }
}

impl<T> NearestNeighbors<T> {
    pub fn new(distance: impl Fn(&T, &T) -> f64 + 'static) -> Self {
        Self {
            items: Vec::new(),
            distance: Box::new(distance),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn add(&mut self, item: T) {
        self.items.push(item);
    }

    /// Remove every stored item matching the predicate.
    pub fn remove_if(&mut self, mut predicate: impl FnMut(&T) -> bool) {
        self.items.retain(|item| !predicate(item));
    }

    /// The stored item closest to `query`, if any. Ties resolve to the item
    /// inserted first.
    pub fn nearest(&self, query: &T) -> Option<&T> {
        self.items
            .iter()
            .min_by_key(|item| FloatOrd((self.distance)(query, item)))
    }

    /// All stored items within `radius` of `query`, in insertion order.
    pub fn nearest_within(&self, query: &T, radius: f64) -> Vec<&T> {
        self.items
            .iter()
            .filter(|item| (self.distance)(query, item) <= radius)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar_index() -> NearestNeighbors<f64> {
        let mut nn = NearestNeighbors::new(|a: &f64, b: &f64| (a - b).abs());
        for x in [0.0, 0.3, 0.55, 0.9] {
            nn.add(x);
        }
        nn
    }

    #[test]
    fn nearest_picks_closest() {
        let nn = scalar_index();
        assert_eq!(nn.nearest(&0.5), Some(&0.55));
        assert_eq!(nn.nearest(&0.1), Some(&0.0));
    }

    #[test]
    fn nearest_within_respects_radius() {
        let nn = scalar_index();
        let hits = nn.nearest_within(&0.4, 0.16);
        assert_eq!(hits, vec![&0.3, &0.55]);
        assert!(nn.nearest_within(&0.4, 0.05).is_empty());
    }

    #[test]
    fn remove_if_drops_matching_items() {
        let mut nn = scalar_index();
        nn.remove_if(|x| *x > 0.5);
        assert_eq!(nn.len(), 2);
        assert_eq!(nn.nearest(&1.0), Some(&0.3));
    }

    #[test]
    fn nearest_on_empty_is_none() {
        let nn = NearestNeighbors::new(|a: &f64, b: &f64| (a - b).abs());
        assert_eq!(nn.nearest(&0.0), None);
    }
}
