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

//! Quasi-random sampling of the unit cube.
//!
//! Roadmap densification draws from a Halton sequence rather than a
//! pseudo-random generator: consecutive batches keep filling the gaps left by
//! earlier ones, and a fixed start index makes planner runs reproducible.

use nalgebra::DVector;

/// The first 16 primes, used as the per-dimension bases of the sequence.
const PRIMES: [u32; 16] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53];

/// A stateful Halton sequence over the unit cube `[0, 1]^dimension`.
///
/// Dimension `i` enumerates the radical-inverse sequence in base `PRIMES[i]`,
/// so the supported dimension is capped at 16 joints.
#[derive(Debug, Clone)]
pub struct HaltonSequence {
    dimension: usize,
    index: u64,
}

impl HaltonSequence {
    pub fn new(dimension: usize) -> Self {
        assert!(
            dimension <= PRIMES.len(),
            "halton sequence supports at most {} dimensions",
            PRIMES.len()
        );
        // Index 0 would yield the all-zero corner; skip it.
        Self {
            dimension,
            index: 1,
        }
    }

    /// The index of the next sample to be drawn.
    pub fn position(&self) -> u64 {
        self.index
    }

    /// Draw the next point of the sequence.
    pub fn sample(&mut self) -> DVector<f64> {
        let index = self.index;
        self.index += 1;
        DVector::from_iterator(
            self.dimension,
            (0..self.dimension).map(|d| radical_inverse(index, PRIMES[d])),
        )
    }

    /// Draw a whole batch of points.
    pub fn sample_batch(&mut self, count: usize) -> Vec<DVector<f64>> {
        (0..count).map(|_| self.sample()).collect()
    }
}

/// The radical inverse of `index` in the given base: the digits of `index`
/// mirrored around the radix point.
fn radical_inverse(mut index: u64, base: u32) -> f64 {
    let base = base as u64;
    let mut result = 0.0;
    let mut fraction = 1.0 / base as f64;
    while index > 0 {
        result += (index % base) as f64 * fraction;
        index /= base;
        fraction /= base as f64;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn base_two_prefix_matches_van_der_corput() {
        // 1/2, 1/4, 3/4, 1/8, 5/8, ...
        let mut seq = HaltonSequence::new(1);
        let expected = [0.5, 0.25, 0.75, 0.125, 0.625, 0.375, 0.875];
        for e in expected {
            assert_relative_eq!(seq.sample()[0], e);
        }
    }

    #[test]
    fn samples_stay_in_unit_cube() {
        let mut seq = HaltonSequence::new(5);
        for _ in 0..500 {
            let q = seq.sample();
            assert!(q.iter().all(|x| (0.0..1.0).contains(x)));
        }
    }

    #[test]
    fn two_sequences_agree() {
        let mut a = HaltonSequence::new(3);
        let mut b = HaltonSequence::new(3);
        for _ in 0..100 {
            assert_eq!(a.sample(), b.sample());
        }
    }
}
