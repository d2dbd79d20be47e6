//! The toppling rule applied to one slice of canonical cells.
//!
//! Both generation backends step a grid the same way: for each slice `x`
//! of the current generation they build a [`SourceWindow`] over source
//! slices `x - 1..=x + 1` and a [`TargetWindow`] over the same target
//! slices, then call [`topple_slice`]. Every canonical neighbor of a cell
//! in slice `x` lies in one of those three slices, so a window of three
//! is all a step ever needs in memory.
//!
//! A cell with value `v` in a lattice of dimension `n` topples when
//! `share = v / (2n + 1)` is nonzero and at least one neighbor holds a
//! different value. It sends `share` along every direction whose neighbor
//! differs and keeps the rest. Folded onto canonical cells, a neighbor
//! reached by `k` directions *from* the cell receives `share * incoming`,
//! where `incoming` counts the directions of the neighbor's own lattice
//! cell that land back in the toppling cell's class. This is exactly what
//! the full lattice would deliver, so mass is conserved.

use siv_lattice::canonical::for_each_neighbor;
use siv_lattice::simplex::{advance, index_in_slice, to_usize};
use siv_lattice::{CellValue, LatticeError, NeighborLink};

use crate::error::EvolutionError;

/// What a step observed while toppling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct StepStats {
    /// At least one cell toppled with a nonzero share.
    pub(crate) changed: bool,
    /// A toppling cell wrote into the outermost allocated slice.
    pub(crate) bounds_reached: bool,
}

/// Read-only view of source slices `x - 1`, `x`, and `x + 1`.
#[derive(Debug)]
pub(crate) struct SourceWindow<'a, V> {
    /// Leading component of the center slice.
    pub(crate) x: u32,
    /// Side of the source generation.
    pub(crate) side: u32,
    /// Value of every cell outside the source generation.
    pub(crate) background: V,
    pub(crate) below: Option<&'a [V]>,
    pub(crate) center: &'a [V],
    pub(crate) above: Option<&'a [V]>,
}

impl<V: CellValue> SourceWindow<'_, V> {
    fn value(&self, components: &[u32]) -> Result<V, EvolutionError> {
        let Some(&c0) = components.first() else {
            return Err(LatticeError::ZeroDimension.into());
        };
        if c0 >= self.side {
            return Ok(self.background);
        }
        let slice = if c0 == self.x {
            Some(self.center)
        } else if c0.checked_add(1) == Some(self.x) {
            self.below
        } else if self.x.checked_add(1) == Some(c0) {
            self.above
        } else {
            None
        };
        let slice = slice.ok_or(EvolutionError::MissingBlock { x: c0 })?;
        let index = to_usize(index_in_slice(components)?)?;
        slice.get(index).copied().ok_or_else(|| {
            LatticeError::OutOfBounds {
                components: components.to_vec(),
                side: self.side,
            }
            .into()
        })
    }
}

/// Mutable view of target slices `x - 1`, `x`, and `x + 1`.
#[derive(Debug)]
pub(crate) struct TargetWindow<'a, V> {
    /// Leading component of the center slice.
    pub(crate) x: u32,
    /// Side of the target generation.
    pub(crate) side: u32,
    pub(crate) below: Option<&'a mut [V]>,
    pub(crate) center: &'a mut [V],
    pub(crate) above: Option<&'a mut [V]>,
}

impl<V: CellValue> TargetWindow<'_, V> {
    fn add(&mut self, components: &[u32], amount: V) -> Result<(), EvolutionError> {
        let Some(&c0) = components.first() else {
            return Err(LatticeError::ZeroDimension.into());
        };
        if c0 >= self.side {
            return Err(EvolutionError::OutsideAllocation {
                components: components.to_vec(),
                side: self.side,
            });
        }
        let slice = if c0 == self.x {
            Some(&mut *self.center)
        } else if c0.checked_add(1) == Some(self.x) {
            self.below.as_deref_mut()
        } else if self.x.checked_add(1) == Some(c0) {
            self.above.as_deref_mut()
        } else {
            None
        };
        let slice = slice.ok_or(EvolutionError::MissingBlock { x: c0 })?;
        let index = to_usize(index_in_slice(components)?)?;
        let slot = slice
            .get_mut(index)
            .ok_or_else(|| LatticeError::OutOfBounds {
                components: components.to_vec(),
                side: self.side,
            })?;
        *slot = slot
            .checked_add(amount)
            .ok_or_else(|| EvolutionError::overflow(components))?;
        Ok(())
    }
}

/// `2n + 1` as a cell value.
pub(crate) fn direction_count<V: CellValue>(dimension: usize) -> Option<V> {
    u64::try_from(dimension)
        .ok()
        .and_then(|n| n.checked_mul(2))
        .and_then(|n| n.checked_add(1))
        .and_then(V::from_u64)
}

/// Reusable buffers for the neighbors of one cell.
struct Neighborhood<V> {
    scratch: Vec<u32>,
    coords: Vec<u32>,
    links: Vec<(NeighborLink, V)>,
}

/// Topples every cell of source slice `source.x` into `target`.
///
/// Target cells must start from the values the next generation begins
/// with: zero inside the source generation and the background outside it.
pub(crate) fn topple_slice<V: CellValue>(
    dimension: usize,
    source: &SourceWindow<'_, V>,
    target: &mut TargetWindow<'_, V>,
    stats: &mut StepStats,
) -> Result<(), EvolutionError> {
    let directions =
        direction_count::<V>(dimension).ok_or_else(|| EvolutionError::overflow(&[]))?;
    let mut cell = vec![0_u32; dimension];
    if let Some(first) = cell.first_mut() {
        *first = source.x;
    }
    let mut neighborhood = Neighborhood {
        scratch: Vec::with_capacity(dimension),
        coords: Vec::new(),
        links: Vec::new(),
    };
    for &value in source.center {
        if value != V::ZERO {
            topple_cell(
                &cell,
                value,
                directions,
                source,
                target,
                &mut neighborhood,
                stats,
            )?;
        }
        advance(&mut cell, 1, source.x);
    }
    Ok(())
}

fn topple_cell<V: CellValue>(
    cell: &[u32],
    value: V,
    directions: V,
    source: &SourceWindow<'_, V>,
    target: &mut TargetWindow<'_, V>,
    neighborhood: &mut Neighborhood<V>,
    stats: &mut StepStats,
) -> Result<(), EvolutionError> {
    let Neighborhood {
        scratch,
        coords,
        links,
    } = neighborhood;
    coords.clear();
    links.clear();
    let mut lookup: Result<(), EvolutionError> = Ok(());
    for_each_neighbor(cell, scratch, |neighbor, link| {
        if lookup.is_err() {
            return;
        }
        match source.value(neighbor) {
            Ok(neighbor_value) => {
                coords.extend_from_slice(neighbor);
                links.push((link, neighbor_value));
            }
            Err(e) => lookup = Err(e),
        }
    });
    lookup?;

    let share = value
        .checked_div(directions)
        .ok_or_else(|| EvolutionError::overflow(cell))?;
    if share == V::ZERO || links.iter().all(|&(_, neighbor_value)| neighbor_value == value) {
        return target.add(cell, value);
    }

    stats.changed = true;
    if cell
        .first()
        .is_some_and(|&c0| c0.saturating_add(2) >= source.side)
    {
        stats.bounds_reached = true;
    }

    let mut given: u64 = 0;
    let width = cell.len().max(1);
    for (&(link, neighbor_value), neighbor) in links.iter().zip(coords.chunks_exact(width)) {
        if neighbor_value == value {
            continue;
        }
        given = given.saturating_add(u64::from(link.outgoing));
        let amount = V::from_u64(u64::from(link.incoming))
            .and_then(|incoming| share.checked_mul(incoming))
            .ok_or_else(|| EvolutionError::overflow(neighbor))?;
        target.add(neighbor, amount)?;
    }
    let kept = V::from_u64(given)
        .and_then(|count| share.checked_mul(count))
        .and_then(|spent| value.checked_sub(spent))
        .ok_or_else(|| EvolutionError::overflow(cell))?;
    target.add(cell, kept)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;

    fn step_1d(source: &[i64], side: u32, target_side: u32) -> (Vec<i64>, StepStats) {
        let mut target = vec![0_i64; usize::try_from(target_side).unwrap()];
        let mut stats = StepStats::default();
        for x in 0..side {
            let xi = usize::try_from(x).unwrap();
            let (left, rest) = target.split_at_mut(xi);
            let (center, right) = rest.split_at_mut(1);
            let mut window = TargetWindow {
                x,
                side: target_side,
                below: left.last_mut().map(std::slice::from_mut),
                center,
                above: right.first_mut().map(std::slice::from_mut),
            };
            let source_window = SourceWindow {
                x,
                side,
                background: 0,
                below: xi.checked_sub(1).map(|b| &source[b..=b]),
                center: &source[xi..=xi],
                above: source.get(xi + 1..xi + 2),
            };
            topple_slice(1, &source_window, &mut window, &mut stats).unwrap();
        }
        (target, stats)
    }

    #[test]
    fn origin_spreads_to_both_sides() {
        let (target, stats) = step_1d(&[6, 0, 0], 3, 3);
        assert_eq!(target, vec![2, 2, 0]);
        assert!(stats.changed);
        assert!(!stats.bounds_reached);
    }

    #[test]
    fn origin_receives_twice_from_its_neighbor() {
        // x = 1 sends 1 toward the origin; the origin folds both x = 1 and
        // x = -1, so it receives 2.
        let (target, stats) = step_1d(&[0, 3, 0], 3, 4);
        assert_eq!(target, vec![2, 1, 1, 0]);
        assert!(stats.changed);
        assert!(stats.bounds_reached);
    }

    #[test]
    fn small_values_do_not_topple() {
        let (target, stats) = step_1d(&[2, 0, 0], 3, 3);
        assert_eq!(target, vec![2, 0, 0]);
        assert!(!stats.changed);
    }

    #[test]
    fn equal_neighbors_hold_their_share() {
        let (target, stats) = step_1d(&[3, 3, 3], 3, 4);
        // Only x = 2 faces a different value (the zero exterior): it keeps
        // 2 and sends 1 outward.
        assert_eq!(target, vec![3, 3, 2, 1]);
        assert!(stats.changed);
    }

    #[test]
    fn writes_past_the_allocation_are_rejected() {
        let mut center = [0_i64];
        let mut window = TargetWindow {
            x: 2,
            side: 3,
            below: None,
            center: &mut center,
            above: None,
        };
        assert!(matches!(
            window.add(&[3], 1),
            Err(EvolutionError::OutsideAllocation { side: 3, .. })
        ));
    }

    #[test]
    fn overflow_is_reported() {
        let mut center = [i32::MAX];
        let mut window = TargetWindow {
            x: 0,
            side: 1,
            below: None,
            center: &mut center,
            above: None,
        };
        assert!(matches!(
            window.add(&[0], 1),
            Err(EvolutionError::Overflow { .. })
        ));
    }
}
