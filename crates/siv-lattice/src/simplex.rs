//! Closed-form indexing of the canonical simplex.
//!
//! The canonical region of an n-dimensional lattice with `side` positions
//! per axis is the set of tuples `side > c_0 >= c_1 >= ... >= c_{n-1} >= 0`.
//! Cells are packed in lexicographic order, which gives the index
//!
//! ```text
//! index(c) = sum_i C(c_i + n - 1 - i, n - i)
//! ```
//!
//! and a total volume of `C(side + n - 1, n)`. All cells sharing the same
//! leading component `c_0 = x` form one contiguous run (a "slice") starting
//! at `C(x + n - 1, n)` with `C(x + n - 1, n - 1)` cells. The remaining
//! components of a cell index it inside its slice as an (n-1)-dimensional
//! simplex.

use crate::error::LatticeError;

/// Binomial coefficient `C(n, k)`, or `None` if it does not fit in `u64`.
pub fn binomial(n: u64, k: u64) -> Option<u64> {
    if k > n {
        return Some(0);
    }
    let k = k.min(n.checked_sub(k)?);
    let mut result: u128 = 1;
    for i in 0..k {
        // result * (n - i) is divisible by (i + 1) at every step.
        let factor = u128::from(n.checked_sub(i)?);
        result = result.checked_mul(factor)?.checked_div(u128::from(i.checked_add(1)?))?;
        if result > u128::from(u64::MAX) {
            return None;
        }
    }
    u64::try_from(result).ok()
}

fn overflow(dimension: usize, side: u32) -> LatticeError {
    LatticeError::IndexOverflow { dimension, side }
}

fn dim_u64(dimension: usize) -> Result<u64, LatticeError> {
    u64::try_from(dimension).map_err(|_e| overflow(dimension, 0))
}

/// Number of canonical cells with every component below `side`.
pub fn volume(dimension: usize, side: u32) -> Result<u64, LatticeError> {
    if dimension == 0 {
        return Err(LatticeError::ZeroDimension);
    }
    if side == 0 {
        return Ok(0);
    }
    let d = dim_u64(dimension)?;
    u64::from(side)
        .checked_add(d)
        .and_then(|top| top.checked_sub(1))
        .and_then(|top| binomial(top, d))
        .ok_or_else(|| overflow(dimension, side))
}

/// Index of the first cell whose leading component is `x`.
pub fn slice_offset(dimension: usize, x: u32) -> Result<u64, LatticeError> {
    volume(dimension, x)
}

/// Number of canonical cells whose leading component is `x`.
pub fn slice_len(dimension: usize, x: u32) -> Result<u64, LatticeError> {
    match dimension {
        0 => Err(LatticeError::ZeroDimension),
        1 => Ok(1),
        _ => volume(dimension.saturating_sub(1), x.saturating_add(1)),
    }
}

/// Packed index of a canonical coordinate.
///
/// The caller guarantees the components are sorted descending; only the
/// arithmetic is checked here.
pub fn index_of(components: &[u32]) -> Result<u64, LatticeError> {
    let n = components.len();
    if n == 0 {
        return Err(LatticeError::ZeroDimension);
    }
    let mut index: u64 = 0;
    for (i, &c) in components.iter().enumerate() {
        let remaining = dim_u64(n.saturating_sub(i))?;
        let term = u64::from(c)
            .checked_add(remaining)
            .and_then(|top| top.checked_sub(1))
            .and_then(|top| binomial(top, remaining))
            .and_then(|term| index.checked_add(term))
            .ok_or_else(|| overflow(n, c))?;
        index = term;
    }
    Ok(index)
}

/// Index of a canonical coordinate inside its own slice.
///
/// For one-dimensional lattices every slice holds a single cell.
pub fn index_in_slice(components: &[u32]) -> Result<u64, LatticeError> {
    match components.split_first() {
        None => Err(LatticeError::ZeroDimension),
        Some((_, [])) => Ok(0),
        Some((_, tail)) => index_of(tail),
    }
}

/// Converts a packed index to a `usize` for slice access.
pub fn to_usize(index: u64) -> Result<usize, LatticeError> {
    usize::try_from(index).map_err(|_e| LatticeError::IndexTooLarge { index })
}

/// Advances `components` to the next canonical tuple in index order.
///
/// Positions before `first_free` are held fixed. Position 0 (if free) may
/// grow up to `max_leading`; every later position may grow up to its
/// predecessor. Returns `false` once the last tuple has been passed, in
/// which case `components` is left unchanged.
pub fn advance(components: &mut [u32], first_free: usize, max_leading: u32) -> bool {
    let n = components.len();
    for i in (first_free..n).rev() {
        let limit = match i.checked_sub(1) {
            None => max_leading,
            Some(prev) => match components.get(prev) {
                Some(&p) => p,
                None => return false,
            },
        };
        let Some(current) = components.get_mut(i) else {
            return false;
        };
        if *current < limit {
            *current = current.saturating_add(1);
            for later in components.iter_mut().skip(i.saturating_add(1)) {
                *later = 0;
            }
            return true;
        }
    }
    false
}

/// Iterator over canonical tuples in packed-index order.
///
/// Yields owned tuples, so it is meant for tests and small regions; hot
/// loops call [`advance`] on a reused buffer instead.
#[derive(Debug, Clone)]
pub struct SimplexIter {
    current: Vec<u32>,
    first_free: usize,
    max_leading: u32,
    started: bool,
    finished: bool,
}

impl SimplexIter {
    /// All canonical tuples of `dimension` components below `side`.
    pub fn full(dimension: usize, side: u32) -> Self {
        Self {
            current: vec![0; dimension],
            first_free: 0,
            max_leading: side.saturating_sub(1),
            started: false,
            finished: side == 0 || dimension == 0,
        }
    }

    /// All canonical tuples whose leading component equals `x`.
    pub fn slice(dimension: usize, x: u32) -> Self {
        let mut current = vec![0; dimension];
        if let Some(first) = current.first_mut() {
            *first = x;
        }
        Self {
            current,
            first_free: 1,
            max_leading: x,
            started: false,
            finished: dimension == 0,
        }
    }
}

impl Iterator for SimplexIter {
    type Item = Vec<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.started {
            if !advance(&mut self.current, self.first_free, self.max_leading) {
                self.finished = true;
                return None;
            }
        } else {
            self.started = true;
        }
        Some(self.current.clone())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;

    #[test]
    fn binomial_matches_pascal() {
        assert_eq!(binomial(5, 2), Some(10));
        assert_eq!(binomial(10, 0), Some(1));
        assert_eq!(binomial(3, 5), Some(0));
        assert_eq!(binomial(60, 30), Some(118_264_581_564_861_424));
        assert_eq!(binomial(200, 100), None);
    }

    #[test]
    fn volume_is_tetrahedral() {
        // 2D: triangular numbers, 3D: tetrahedral numbers.
        assert_eq!(volume(2, 4).unwrap(), 10);
        assert_eq!(volume(3, 4).unwrap(), 20);
        assert_eq!(volume(1, 7).unwrap(), 7);
        assert_eq!(volume(3, 0).unwrap(), 0);
        assert_eq!(volume(0, 3), Err(LatticeError::ZeroDimension));
    }

    #[test]
    fn slices_tile_the_volume() {
        for n in 1..=4 {
            let mut offset = 0;
            for x in 0..8 {
                assert_eq!(slice_offset(n, x).unwrap(), offset);
                offset += slice_len(n, x).unwrap();
            }
            assert_eq!(volume(n, 8).unwrap(), offset);
        }
    }

    #[test]
    fn iteration_walks_indices_in_order() {
        for n in 1..=4 {
            for (expected, coords) in SimplexIter::full(n, 6).enumerate() {
                assert_eq!(index_of(&coords).unwrap(), expected as u64);
            }
            assert_eq!(SimplexIter::full(n, 6).count() as u64, volume(n, 6).unwrap());
        }
    }

    #[test]
    fn slice_iteration_matches_slice_indices() {
        for n in 1..=4 {
            for x in 0..5 {
                let cells: Vec<_> = SimplexIter::slice(n, x).collect();
                assert_eq!(cells.len() as u64, slice_len(n, x).unwrap());
                for (expected, coords) in cells.iter().enumerate() {
                    assert_eq!(coords[0], x);
                    assert_eq!(index_in_slice(coords).unwrap(), expected as u64);
                }
            }
        }
    }

    #[test]
    fn advance_stops_at_the_last_tuple() {
        let mut coords = vec![2, 2];
        assert!(!advance(&mut coords, 0, 2));
        assert_eq!(coords, vec![2, 2]);
    }
}
