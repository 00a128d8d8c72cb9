use crate::cost::CostMatrix;
use crate::error::TrackError::{self, LapjvError};

const LARGE: f64 = 1_000_000.0;

/* -----------------------------------------------------------------------------
 * lapjv.rs - Jonker-Volgenant linear assignment algorithm
 * ----------------------------------------------------------------------------- */

/// Perfect assignment of a square cost matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Solution {
    /// column assigned to each row
    pub(crate) x: Vec<usize>,
    /// row assigned to each column
    pub(crate) y: Vec<usize>,
}

/// Column reduction and reduction transfer. Returns the rows left free.
fn column_reduction(
    cost: &CostMatrix,
    x: &mut [Option<usize>],
    y: &mut [Option<usize>],
    v: &mut [f64],
) -> Vec<usize> {
    let n = cost.rows();

    x.fill(None);
    v.fill(LARGE);
    y.fill(Some(0));
    for i in 0..n {
        for (j, &c) in cost.row(i).iter().enumerate() {
            if c < v[j] {
                v[j] = c;
                y[j] = Some(i);
            }
        }
    }

    let mut unique = vec![true; n];
    for j in (0..n).rev() {
        let Some(i) = y[j] else { continue };
        if x[i].is_none() {
            x[i] = Some(j);
        } else {
            unique[i] = false;
            y[j] = None;
        }
    }

    let mut free_rows = Vec::new();
    for i in 0..n {
        match x[i] {
            None => free_rows.push(i),
            Some(j) if unique[i] => {
                let min = cost
                    .row(i)
                    .iter()
                    .enumerate()
                    .filter(|&(j2, _)| j2 != j)
                    .map(|(j2, &c)| c - v[j2])
                    .fold(LARGE, |acc, c| if c < acc { c } else { acc });
                v[j] -= min;
            }
            Some(_) => {}
        }
    }
    free_rows
}

/// One pass of augmenting row reduction over `free_rows[..n_free]`.
/// Rows still free afterwards are written to the front of `free_rows`, their
/// count is returned.
fn augmenting_row_reduction(
    cost: &CostMatrix,
    free_rows: &mut [usize],
    n_free: usize,
    x: &mut [Option<usize>],
    y: &mut [Option<usize>],
    v: &mut [f64],
) -> usize {
    let n = cost.rows();
    let mut current = 0;
    let mut new_free = 0;
    let mut rr_cnt = 0;

    while current < n_free {
        rr_cnt += 1;
        let free_i = free_rows[current];
        current += 1;

        // lowest and second lowest reduced cost in the row
        let row = cost.row(free_i);
        let mut j1 = 0;
        let mut v1 = row[0] - v[0];
        let mut j2: Option<usize> = None;
        let mut v2 = LARGE;
        for j in 1..n {
            let c = row[j] - v[j];
            if c < v2 {
                if c >= v1 {
                    v2 = c;
                    j2 = Some(j);
                } else {
                    v2 = v1;
                    v1 = c;
                    j2 = Some(j1);
                    j1 = j;
                }
            }
        }

        let mut i0 = y[j1];
        let v1_new = v[j1] - (v2 - v1);
        let v1_lowers = v1_new < v[j1];

        if rr_cnt < current * n {
            if v1_lowers {
                v[j1] = v1_new;
            } else if let (Some(_), Some(j)) = (i0, j2) {
                j1 = j;
                i0 = y[j];
            }

            if let Some(i0) = i0 {
                if v1_lowers {
                    current -= 1;
                    free_rows[current] = i0;
                } else {
                    free_rows[new_free] = i0;
                    new_free += 1;
                }
            }
        } else if let Some(i0) = i0 {
            free_rows[new_free] = i0;
            new_free += 1;
        }
        x[free_i] = Some(j1);
        y[j1] = Some(free_i);
    }
    new_free
}

/// Moves the columns with minimum `d` to the front of `cols[lo..]`, returns
/// the end of that group.
fn find_min_columns(lo: usize, d: &[f64], cols: &mut [usize]) -> usize {
    let mut hi = lo + 1;
    let mut mind = d[cols[lo]];
    for k in hi..cols.len() {
        let j = cols[k];
        if d[j] <= mind {
            if d[j] < mind {
                hi = lo;
                mind = d[j];
            }
            cols.swap(k, hi);
            hi += 1;
        }
    }
    hi
}

/// Scans the columns in `cols[lo..hi]` and relaxes the ones after `hi`.
/// Returns a free column as soon as one is reached at minimum distance.
#[allow(clippy::too_many_arguments)]
fn scan_columns(
    cost: &CostMatrix,
    lo: &mut usize,
    hi: &mut usize,
    d: &mut [f64],
    cols: &mut [usize],
    pred: &mut [usize],
    y: &[Option<usize>],
    v: &[f64],
) -> Option<usize> {
    let n = cost.rows();
    let mut scan_lo = *lo;
    let mut scan_hi = *hi;

    while scan_lo != scan_hi {
        let j = cols[scan_lo];
        scan_lo += 1;
        let Some(i) = y[j] else { return Some(j) };
        let mind = d[j];
        let h = cost.at(i, j) - v[j] - mind;

        for k in scan_hi..n {
            let j = cols[k];
            let cred_ij = cost.at(i, j) - v[j] - h;
            if cred_ij < d[j] {
                d[j] = cred_ij;
                pred[j] = i;
                if cred_ij == mind {
                    if y[j].is_none() {
                        return Some(j);
                    }
                    cols.swap(k, scan_hi);
                    scan_hi += 1;
                }
            }
        }
    }
    *lo = scan_lo;
    *hi = scan_hi;
    None
}

/// Dijkstra-like shortest augmenting path from `start_i` over reduced costs.
/// Returns the free column the path ends in and updates the column duals.
fn shortest_augmenting_path(
    cost: &CostMatrix,
    start_i: usize,
    y: &[Option<usize>],
    v: &mut [f64],
    pred: &mut [usize],
) -> Result<usize, TrackError> {
    let n = cost.rows();
    let mut cols: Vec<usize> = (0..n).collect();
    let mut d: Vec<f64> =
        cost.row(start_i).iter().zip(v.iter()).map(|(c, v)| c - v).collect();
    pred.fill(start_i);

    let mut lo = 0;
    let mut hi = 0;
    let mut n_ready = 0;
    let mut final_j = None;

    while final_j.is_none() {
        if lo == hi {
            if lo >= n {
                return Err(LapjvError(format!(
                    "no free column reachable from row {}",
                    start_i
                )));
            }
            n_ready = lo;
            hi = find_min_columns(lo, &d, &mut cols);
            for &j in &cols[lo..hi] {
                if y[j].is_none() {
                    final_j = Some(j);
                }
            }
        }
        if final_j.is_none() {
            final_j =
                scan_columns(cost, &mut lo, &mut hi, &mut d, &mut cols, pred, y, v);
        }
    }

    let mind = d[cols[lo]];
    for &j in &cols[..n_ready] {
        v[j] += d[j] - mind;
    }

    final_j.ok_or_else(|| LapjvError("augmenting path search ended without a column".to_string()))
}

/// Augments every remaining free row along its shortest path.
fn augment(
    cost: &CostMatrix,
    free_rows: &[usize],
    x: &mut [Option<usize>],
    y: &mut [Option<usize>],
    v: &mut [f64],
) -> Result<(), TrackError> {
    let n = cost.rows();
    let mut pred = vec![0; n];

    for &free_i in free_rows {
        let mut j = shortest_augmenting_path(cost, free_i, y, v, &mut pred)?;
        let mut steps = 0;
        loop {
            let i = pred[j];
            y[j] = Some(i);
            let previous = x[i].replace(j);
            if i == free_i {
                break;
            }
            j = previous.ok_or_else(|| {
                LapjvError(format!("row {} on the augmenting path is unassigned", i))
            })?;

            steps += 1;
            if steps > n {
                return Err(LapjvError(format!(
                    "augmenting path from row {} does not terminate",
                    free_i
                )));
            }
        }
    }
    Ok(())
}

/// Solves the square assignment problem exactly.
pub(crate) fn lapjv(cost: &CostMatrix) -> Result<Solution, TrackError> {
    if !cost.is_square() {
        return Err(LapjvError(format!(
            "cost matrix must be square, but it is {}x{}",
            cost.rows(),
            cost.cols()
        )));
    }
    let n = cost.rows();
    if n == 0 {
        return Ok(Solution { x: vec![], y: vec![] });
    }

    let mut x = vec![None; n];
    let mut y = vec![None; n];
    let mut v = vec![0.0; n];

    let mut free_rows = column_reduction(cost, &mut x, &mut y, &mut v);
    let mut n_free = free_rows.len();
    let mut pass = 0;
    while n_free > 0 && pass < 2 {
        n_free = augmenting_row_reduction(
            cost,
            &mut free_rows,
            n_free,
            &mut x,
            &mut y,
            &mut v,
        );
        pass += 1;
    }
    if n_free > 0 {
        augment(cost, &free_rows[..n_free], &mut x, &mut y, &mut v)?;
    }

    let x = x
        .into_iter()
        .enumerate()
        .map(|(i, j)| {
            j.ok_or_else(|| LapjvError(format!("row {} left unassigned", i)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let y = y
        .into_iter()
        .enumerate()
        .map(|(j, i)| {
            i.ok_or_else(|| LapjvError(format!("column {} left unassigned", j)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Solution { x, y })
}
