//! Canonical coordinates and folding multiplicities.
//!
//! The SIV automaton is symmetric under every axis reflection and
//! permutation, so a cell's value depends only on the multiset of the
//! absolute values of its coordinates. The canonical representative of a
//! coordinate sorts those absolute values descending. Storage indexes
//! canonical coordinates only.
//!
//! Folding the lattice onto the canonical region merges directions: a
//! canonical cell may reach the same canonical neighbor along several of
//! its `2n` orthogonal directions, and the neighbor may in turn reach the
//! cell along a different number of directions. [`for_each_neighbor`]
//! reports both counts so a transferred share can be scaled exactly as
//! the unfolded lattice would have delivered it.

use serde::{Deserialize, Serialize};

use crate::error::LatticeError;
use crate::simplex::binomial;

/// A coordinate folded onto the canonical region: absolute values sorted
/// descending.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CanonicalCoordinate(Vec<u32>);

impl CanonicalCoordinate {
    /// Folds an arbitrary signed coordinate onto its representative.
    pub fn from_coords(coords: &[i32]) -> Self {
        let mut components: Vec<u32> = coords.iter().map(|c| c.unsigned_abs()).collect();
        components.sort_unstable_by(|a, b| b.cmp(a));
        Self(components)
    }

    /// Wraps components that are already sorted descending.
    pub fn from_sorted(components: Vec<u32>) -> Result<Self, LatticeError> {
        if components.is_empty() {
            return Err(LatticeError::ZeroDimension);
        }
        if !is_canonical(&components) {
            return Err(LatticeError::NotCanonical { components });
        }
        Ok(Self(components))
    }

    /// The sorted components.
    pub fn components(&self) -> &[u32] {
        &self.0
    }

    /// Number of components.
    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    /// The largest component, which selects the slice holding the cell.
    pub fn leading(&self) -> u32 {
        self.0.first().copied().unwrap_or(0)
    }

    /// Number of lattice cells folding onto this coordinate.
    pub fn orbit_size(&self) -> Option<u128> {
        orbit_size(&self.0)
    }

    /// The distinct canonical neighbors of this coordinate.
    pub fn neighbors(&self) -> Vec<CanonicalNeighbor> {
        let mut scratch = Vec::with_capacity(self.0.len());
        let mut out = Vec::new();
        for_each_neighbor(&self.0, &mut scratch, |components, link| {
            out.push(CanonicalNeighbor {
                coordinate: Self(components.to_vec()),
                outgoing: link.outgoing,
                incoming: link.incoming,
            });
        });
        out
    }

    /// Consumes the wrapper.
    pub fn into_components(self) -> Vec<u32> {
        self.0
    }
}

/// Folds a signed coordinate onto its canonical representative.
pub fn canonicalize(coords: &[i32]) -> CanonicalCoordinate {
    CanonicalCoordinate::from_coords(coords)
}

/// Returns `true` if the components are sorted descending.
pub fn is_canonical(components: &[u32]) -> bool {
    components.windows(2).all(|pair| match pair {
        [a, b] => a >= b,
        _ => true,
    })
}

/// Direction counts between a canonical cell and one of its neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborLink {
    /// Directions of the cell that land on the neighbor.
    pub outgoing: u32,
    /// Directions of the neighbor that land back on the cell.
    pub incoming: u32,
}

/// An owned canonical neighbor with its direction counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalNeighbor {
    /// The neighbor's canonical coordinate.
    pub coordinate: CanonicalCoordinate,
    /// Directions of the cell that land on the neighbor.
    pub outgoing: u32,
    /// Directions of the neighbor that land back on the cell.
    pub incoming: u32,
}

/// Visits every distinct canonical neighbor of `components`.
///
/// For each run of equal values `v` occupying `[start, end)`, raising `v`
/// replaces the first element of the run and lowering it replaces the
/// last, which keeps the tuple sorted. Raising a zero is also reached by
/// lowering it (`|-1| = 1`), so zero runs count double outgoing. Neighbors
/// are produced in a fixed order: raises then lowers, runs left to right.
///
/// `scratch` is reused as the neighbor buffer handed to `visit`.
pub fn for_each_neighbor<F>(components: &[u32], scratch: &mut Vec<u32>, mut visit: F)
where
    F: FnMut(&[u32], NeighborLink),
{
    let runs = runs(components);
    let mut previous: Option<Run> = None;
    for run in &runs {
        let mut raised_count: u32 = 1;
        if let Some(prev) = previous.filter(|p| run.value.checked_add(1) == Some(p.value)) {
            raised_count = raised_count.saturating_add(prev.len);
        }
        let outgoing = if run.value == 0 {
            run.len.saturating_mul(2)
        } else {
            run.len
        };
        scratch.clear();
        scratch.extend_from_slice(components);
        if let Some(slot) = scratch.get_mut(run.start) {
            *slot = slot.saturating_add(1);
        }
        visit(
            scratch,
            NeighborLink {
                outgoing,
                incoming: raised_count,
            },
        );
        previous = Some(*run);
    }

    let mut iter = runs.iter().peekable();
    while let Some(run) = iter.next() {
        let Some(lowered) = run.value.checked_sub(1) else {
            continue;
        };
        let mut lowered_count: u32 = 1;
        if let Some(next) = iter.peek().filter(|next| next.value == lowered) {
            lowered_count = lowered_count.saturating_add(next.len);
        }
        if lowered == 0 {
            lowered_count = lowered_count.saturating_mul(2);
        }
        scratch.clear();
        scratch.extend_from_slice(components);
        if let Some(slot) = run.end.checked_sub(1).and_then(|last| scratch.get_mut(last)) {
            *slot = lowered;
        }
        visit(
            scratch,
            NeighborLink {
                outgoing: run.len,
                incoming: lowered_count,
            },
        );
    }
}

/// Number of lattice cells folding onto a canonical tuple:
/// `n! / prod(m_v!) * 2^(nonzero components)`.
pub fn orbit_size(components: &[u32]) -> Option<u128> {
    let mut placed: u64 = 0;
    let mut size: u128 = 1;
    for run in runs(components) {
        let len = u64::from(run.len);
        placed = placed.checked_add(len)?;
        size = size.checked_mul(u128::from(binomial(placed, len)?))?;
        if run.value != 0 {
            size = size.checked_mul(1_u128.checked_shl(run.len)?)?;
        }
    }
    Some(size)
}

#[derive(Debug, Clone, Copy)]
struct Run {
    value: u32,
    start: usize,
    end: usize,
    len: u32,
}

fn runs(components: &[u32]) -> Vec<Run> {
    let mut out: Vec<Run> = Vec::new();
    for (i, &value) in components.iter().enumerate() {
        match out.last_mut() {
            Some(run) if run.value == value => {
                run.end = i.saturating_add(1);
                run.len = run.len.saturating_add(1);
            }
            _ => out.push(Run {
                value,
                start: i,
                end: i.saturating_add(1),
                len: 1,
            }),
        }
    }
    out
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_wrap
)]
mod tests {
    use std::collections::BTreeMap;

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::simplex::SimplexIter;

    /// Neighbor counts found by stepping along all 2n lattice directions.
    fn brute_force_neighbors(components: &[u32]) -> BTreeMap<Vec<u32>, (u32, u32)> {
        let signed: Vec<i32> = components.iter().map(|&c| c as i32).collect();
        let mut out: BTreeMap<Vec<u32>, (u32, u32)> = BTreeMap::new();
        for axis in 0..signed.len() {
            for delta in [-1, 1] {
                let mut moved = signed.clone();
                moved[axis] += delta;
                let neighbor = CanonicalCoordinate::from_coords(&moved).into_components();
                if neighbor == components {
                    continue;
                }
                out.entry(neighbor).or_insert((0, 0)).0 += 1;
            }
        }
        for (neighbor, counts) in &mut out {
            let signed_neighbor: Vec<i32> = neighbor.iter().map(|&c| c as i32).collect();
            for axis in 0..signed_neighbor.len() {
                for delta in [-1, 1] {
                    let mut moved = signed_neighbor.clone();
                    moved[axis] += delta;
                    if CanonicalCoordinate::from_coords(&moved).components() == components {
                        counts.1 += 1;
                    }
                }
            }
        }
        out
    }

    fn closed_form_neighbors(components: &[u32]) -> BTreeMap<Vec<u32>, (u32, u32)> {
        let mut scratch = Vec::new();
        let mut out = BTreeMap::new();
        for_each_neighbor(components, &mut scratch, |neighbor, link| {
            let previous = out.insert(neighbor.to_vec(), (link.outgoing, link.incoming));
            assert!(previous.is_none(), "neighbor {neighbor:?} reported twice");
        });
        out
    }

    #[test]
    fn neighbors_match_brute_force() {
        for n in 1..=4 {
            for coords in SimplexIter::full(n, 5) {
                assert_eq!(
                    closed_form_neighbors(&coords),
                    brute_force_neighbors(&coords),
                    "mismatch at {coords:?}"
                );
            }
        }
    }

    #[test]
    fn one_dimensional_origin_receives_double() {
        let origin = CanonicalCoordinate::from_sorted(vec![0]).unwrap();
        let neighbors = origin.neighbors();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].coordinate.components(), &[1]);
        assert_eq!(neighbors[0].outgoing, 2);
        assert_eq!(neighbors[0].incoming, 1);

        let one = CanonicalCoordinate::from_sorted(vec![1]).unwrap();
        let lowered = one
            .neighbors()
            .into_iter()
            .find(|n| n.coordinate.components() == [0])
            .unwrap();
        assert_eq!(lowered.outgoing, 1);
        assert_eq!(lowered.incoming, 2);
    }

    fn incoming_by_neighbor(components: &[u32]) -> BTreeMap<Vec<u32>, u32> {
        closed_form_neighbors(components)
            .into_iter()
            .map(|(neighbor, (_, incoming))| (neighbor, incoming))
            .collect()
    }

    #[test]
    fn one_dimensional_writes_match_the_unrolled_rule() {
        // x+ writes one share to x + 1. x- writes one share to x - 1, two
        // when x == 1 (the mirror cell -1 also lands on the origin), and
        // nothing from the origin itself.
        for x in 0..10_u32 {
            let mut expected = BTreeMap::new();
            expected.insert(vec![x + 1], 1);
            if x > 0 {
                expected.insert(vec![x - 1], if x == 1 { 2 } else { 1 });
            }
            assert_eq!(incoming_by_neighbor(&[x]), expected, "x = {x}");
        }
    }

    #[test]
    fn two_dimensional_writes_match_the_unrolled_rule() {
        for x in 0..8_u32 {
            for y in 0..=x {
                let mut expected: BTreeMap<Vec<u32>, u32> = BTreeMap::new();
                *expected.entry(vec![x + 1, y]).or_default() += 1;
                if x > y {
                    let mut share = 1;
                    if x == y + 1 {
                        share += 1;
                        if x == 1 {
                            share += 2;
                        }
                    }
                    *expected.entry(vec![x - 1, y]).or_default() += share;
                }
                if y < x {
                    let share = if y == x - 1 { 2 } else { 1 };
                    *expected.entry(vec![x, y + 1]).or_default() += share;
                }
                if y > 0 {
                    let share = if y == 1 { 2 } else { 1 };
                    *expected.entry(vec![x, y - 1]).or_default() += share;
                }
                assert_eq!(incoming_by_neighbor(&[x, y]), expected, "cell ({x}, {y})");
            }
        }
    }

    #[test]
    fn folding_conserves_direction_mass() {
        // orbit(c) * outgoing(c -> d) == orbit(d) * outgoing(d -> c)
        for n in 1..=4 {
            for coords in SimplexIter::full(n, 5) {
                let orbit = orbit_size(&coords).unwrap();
                for (neighbor, (outgoing, incoming)) in closed_form_neighbors(&coords) {
                    let neighbor_orbit = orbit_size(&neighbor).unwrap();
                    assert_eq!(
                        orbit * u128::from(outgoing),
                        neighbor_orbit * u128::from(incoming)
                    );
                }
            }
        }
    }

    #[test]
    fn orbit_sizes_cover_the_cube() {
        // Orbits of canonical cells with side s tile the (2s-1)^n cube.
        for n in 1..=4_u32 {
            let total: u128 = SimplexIter::full(n as usize, 4)
                .map(|c| orbit_size(&c).unwrap())
                .sum();
            assert_eq!(total, 7_u128.pow(n));
        }
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..500 {
            let n = rng.random_range(1..=6);
            let coords: Vec<i32> = (0..n).map(|_| rng.random_range(-50..=50)).collect();
            let once = canonicalize(&coords);
            let again: Vec<i32> = once.components().iter().map(|&c| c as i32).collect();
            assert_eq!(canonicalize(&again), once);
            assert!(is_canonical(once.components()));
        }
    }

    #[test]
    fn from_sorted_rejects_unsorted() {
        assert!(matches!(
            CanonicalCoordinate::from_sorted(vec![1, 2]),
            Err(LatticeError::NotCanonical { .. })
        ));
        assert_eq!(
            CanonicalCoordinate::from_sorted(vec![]),
            Err(LatticeError::ZeroDimension)
        );
    }

    #[test]
    fn canonicalize_handles_extremes() {
        let c = canonicalize(&[i32::MIN, 3, -7]);
        assert_eq!(c.components(), &[2_147_483_648, 7, 3]);
        assert_eq!(c.leading(), 2_147_483_648);
    }
}
