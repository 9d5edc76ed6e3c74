//! Square vector-clock matrices.
//!
//! `V[i][j]` is element `i`'s last-known logical clock for element `j`.
//! Both operations are pure: they never mutate or alias the input
//! matrix, so parent and child trace nodes can never share rows.

use std::fmt;

/// Result type for vector-clock operations.
pub type Result<T> = std::result::Result<T, VcError>;

/// Errors raised by misuse of the clock operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VcError {
    #[error("clock position {pos} is out of range for {size} elements")]
    OutOfRange { pos: usize, size: usize },

    #[error("clock transfer requires distinct elements, got {0} twice")]
    SameElement(usize),
}

/// An `N×N` matrix of logical clocks, one row per element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VectorClocks {
    rows: Vec<Vec<u64>>,
}

impl VectorClocks {
    /// The zero matrix for `size` elements.
    pub fn new(size: usize) -> Self {
        Self {
            rows: vec![vec![0; size]; size],
        }
    }

    /// Number of elements (rows).
    pub fn size(&self) -> usize {
        self.rows.len()
    }

    /// Element `pos`'s clock row, if in range.
    pub fn row(&self, pos: usize) -> Option<&[u64]> {
        self.rows.get(pos).map(Vec::as_slice)
    }

    /// True if every row has exactly `size` entries and there are
    /// `size` rows.
    pub fn is_square(&self, size: usize) -> bool {
        self.rows.len() == size && self.rows.iter().all(|r| r.len() == size)
    }

    fn check_bounds(&self, pos: usize) -> Result<()> {
        if pos >= self.rows.len() {
            return Err(VcError::OutOfRange {
                pos,
                size: self.rows.len(),
            });
        }
        Ok(())
    }

    /// A copy of `self` with `V[pos][pos]` incremented.
    pub fn increment(&self, pos: usize) -> Result<Self> {
        self.check_bounds(pos)?;
        let mut rows = self.rows.clone();
        rows[pos][pos] += 1;
        Ok(Self { rows })
    }

    /// A copy of `self` after element `src` transfers its knowledge to
    /// element `dst`: increment `V[src][src]`, set row `dst` to the
    /// element-wise max of the incremented row `src` and the old row
    /// `dst`, then increment `V[dst][dst]`.
    pub fn transfer(&self, src: usize, dst: usize) -> Result<Self> {
        self.check_bounds(src)?;
        self.check_bounds(dst)?;
        if src == dst {
            return Err(VcError::SameElement(src));
        }
        let mut rows = self.rows.clone();
        rows[src][src] += 1;
        let merged: Vec<u64> = rows[src]
            .iter()
            .zip(rows[dst].iter())
            .map(|(a, b)| (*a).max(*b))
            .collect();
        rows[dst] = merged;
        rows[dst][dst] += 1;
        Ok(Self { rows })
    }

    /// True if rows `e1` and `e2` witness concurrent histories: neither
    /// row dominates the other on the `(e1, e2)` coordinates.
    pub fn incomparable(&self, e1: usize, e2: usize) -> bool {
        let (Some(vc1), Some(vc2)) = (self.row(e1), self.row(e2)) else {
            return false;
        };
        rows_incomparable(vc1, vc2, e1, e2)
    }

    /// All unordered element pairs with incomparable rows.
    pub fn incomparable_pairs(&self) -> Vec<(usize, usize)> {
        let n = self.size();
        let mut pairs = Vec::new();
        for i in 0..n {
            for j in i + 1..n {
                if self.incomparable(i, j) {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }
}

/// True if clock rows `vc1` (element `e1`'s view) and `vc2` (element
/// `e2`'s view) are incomparable on the `(e1, e2)` coordinates. The
/// rows may come from different matrices, e.g. from two trace nodes.
pub fn rows_incomparable(vc1: &[u64], vc2: &[u64], e1: usize, e2: usize) -> bool {
    (vc1[e1] < vc2[e1] && vc1[e2] > vc2[e2]) || (vc1[e1] > vc2[e1] && vc1[e2] < vc2[e2])
}

/// Renders one clock row as `[a, b, c]`.
pub fn fmt_row(row: &[u64]) -> String {
    let cells: Vec<String> = row.iter().map(u64::to_string).collect();
    format!("[{}]", cells.join(", "))
}

impl fmt::Display for VectorClocks {
    /// Nested-list form, e.g. `[[2, 1], [0, 1]]`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: Vec<String> = self.rows.iter().map(|r| fmt_row(r)).collect();
        write!(f, "[{}]", rows.join(", "))
    }
}

impl From<Vec<Vec<u64>>> for VectorClocks {
    fn from(rows: Vec<Vec<u64>>) -> Self {
        Self { rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_matrix_is_zero() {
        let vc = VectorClocks::new(3);
        assert_eq!(vc.to_string(), "[[0, 0, 0], [0, 0, 0], [0, 0, 0]]");
    }

    #[test]
    fn increment_bumps_only_own_entry() {
        let vc = VectorClocks::new(2).increment(1).unwrap();
        assert_eq!(vc, VectorClocks::from(vec![vec![0, 0], vec![0, 1]]));
    }

    #[test]
    fn increment_is_pure() {
        let vc = VectorClocks::new(2);
        vc.increment(0).unwrap();
        assert_eq!(vc, VectorClocks::new(2));
    }

    #[test]
    fn increment_out_of_range_fails() {
        let vc = VectorClocks::new(2);
        assert_eq!(
            vc.increment(2),
            Err(VcError::OutOfRange { pos: 2, size: 2 })
        );
    }

    #[test]
    fn transfer_merges_and_bumps_both_ends() {
        // src 1 informs dst 0 about everything it has seen.
        let vc = VectorClocks::from(vec![vec![1, 0], vec![0, 0]]);
        let vc = vc.transfer(1, 0).unwrap();
        assert_eq!(vc, VectorClocks::from(vec![vec![2, 1], vec![0, 1]]));
    }

    #[test]
    fn transfer_keeps_destination_knowledge() {
        let vc = VectorClocks::from(vec![vec![0, 0, 5], vec![0, 3, 0], vec![0, 0, 0]]);
        let vc = vc.transfer(1, 0).unwrap();
        assert_eq!(vc.row(0).unwrap(), &[1, 4, 5]);
        assert_eq!(vc.row(1).unwrap(), &[0, 4, 0]);
    }

    #[test]
    fn transfer_to_self_fails() {
        let vc = VectorClocks::new(2);
        assert_eq!(vc.transfer(1, 1), Err(VcError::SameElement(1)));
    }

    #[test]
    fn incomparable_detects_concurrent_rows() {
        // Element 0 and element 1 each advanced without hearing from
        // the other.
        let vc = VectorClocks::from(vec![vec![1, 0], vec![0, 1]]);
        assert!(vc.incomparable(0, 1));
        assert_eq!(vc.incomparable_pairs(), vec![(0, 1)]);
    }

    #[test]
    fn ordered_rows_are_comparable() {
        let vc = VectorClocks::from(vec![vec![2, 1], vec![0, 1]]);
        assert!(!vc.incomparable(0, 1));
        assert!(vc.incomparable_pairs().is_empty());
    }
}
