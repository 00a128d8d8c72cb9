//! Gated bipartite matching on top of the LAPJV solver.
//!
//! The rectangular R x C problem is embedded in a square (R+C) x (R+C)
//! matrix: the input costs sit top-left, both off-diagonal blocks hold a
//! constant padding cost and the bottom-right block is zero. A row (column)
//! that ends up assigned to a padding column (row) is reported unmatched.
//!
//! With a threshold `T` the padding cost is `T / 2`, so leaving a row and a
//! column both unmatched costs `T`. A real pair is therefore kept whenever
//! its cost is below what the padding route costs in the global optimum,
//! which can accept pairs with a cost between `T / 2` and `T`.

use crate::cost::CostMatrix;
use crate::error::TrackError;
use crate::lapjv::lapjv;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentResult {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_rows: Vec<usize>,
    pub unmatched_cols: Vec<usize>,
}

/// Minimum cost matching of rows to columns of `cost`.
///
/// `threshold` gates matches through the padding cost. Without one the
/// padding is `max(cost) + 1`, which makes every row or column that can be
/// matched get matched.
pub fn linear_assignment(
    cost: &CostMatrix,
    threshold: Option<f64>,
) -> Result<AssignmentResult, TrackError> {
    let n_rows = cost.rows();
    let n_cols = cost.cols();
    if cost.is_empty() {
        return Ok(AssignmentResult {
            matches: Vec::new(),
            unmatched_rows: (0..n_rows).collect(),
            unmatched_cols: (0..n_cols).collect(),
        });
    }

    let fill = match threshold {
        Some(t) => t / 2.0,
        None => cost.max().unwrap_or(0.0) + 1.0,
    };

    let n = n_rows + n_cols;
    let mut extended = CostMatrix::new(n, n, fill);
    for i in 0..n_rows {
        extended.row_mut(i)[..n_cols].copy_from_slice(cost.row(i));
    }
    for i in n_rows..n {
        extended.row_mut(i)[n_cols..].fill(0.0);
    }

    let solution = lapjv(&extended)?;

    let mut result = AssignmentResult::default();
    for (i, &j) in solution.x.iter().take(n_rows).enumerate() {
        if j < n_cols {
            result.matches.push((i, j));
        } else {
            result.unmatched_rows.push(i);
        }
    }
    for (j, &i) in solution.y.iter().take(n_cols).enumerate() {
        if i >= n_rows {
            result.unmatched_cols.push(j);
        }
    }
    Ok(result)
}
