//! Pairwise cost matrices between box collections.

use crate::error::TrackError;
use crate::rect::Rect;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

/*-----------------------------------------------------------------------------
CostMatrix
-----------------------------------------------------------------------------*/

/// Dense row-major matrix backed by a single buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct CostMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl CostMatrix {
    pub fn new(rows: usize, cols: usize, fill: f64) -> Self {
        Self {
            rows,
            cols,
            data: vec![fill; rows * cols],
        }
    }

    /// Builds a matrix from equally sized rows.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, TrackError> {
        let n_cols = rows.first().map_or(0, |row| row.len());
        if let Some(bad) = rows.iter().position(|row| row.len() != n_cols) {
            return Err(TrackError::LapjvError(format!(
                "row {} has {} columns, expected {}",
                bad,
                rows[bad].len(),
                n_cols
            )));
        }
        Ok(Self {
            rows: rows.len(),
            cols: n_cols,
            data: rows.concat(),
        })
    }

    #[inline(always)]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline(always)]
    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    #[inline(always)]
    pub fn at(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    #[inline(always)]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    #[inline(always)]
    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Largest entry, `None` when the matrix is empty.
    pub fn max(&self) -> Option<f64> {
        self.data.iter().copied().reduce(f64::max)
    }

    /// Rows as separate vectors, mostly useful for debugging and tests.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.rows).map(|r| self.row(r).to_vec()).collect()
    }
}

/*-----------------------------------------------------------------------------
IoU distance
-----------------------------------------------------------------------------*/

pub fn build_worker_pool(num_threads: usize) -> Result<ThreadPool, TrackError> {
    ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("iou-worker-{}", i))
        .build()
        .map_err(|e| TrackError::ThreadPool(e.to_string()))
}

/// `1 - IoU` for every pair of `a_rects` x `b_rects`. Rows are filled in
/// parallel on `workers`; pairs that do not overlap are exactly 1.0.
pub fn iou_distance(
    a_rects: &[Rect<f32>],
    b_rects: &[Rect<f32>],
    workers: &ThreadPool,
) -> CostMatrix {
    let mut cost_matrix = CostMatrix::new(a_rects.len(), b_rects.len(), 1.0);
    if cost_matrix.is_empty() {
        return cost_matrix;
    }

    let n_cols = cost_matrix.cols;
    workers.install(|| {
        cost_matrix
            .data
            .par_chunks_mut(n_cols)
            .zip(a_rects.par_iter())
            .for_each(|(row, a)| {
                for (cell, b) in row.iter_mut().zip(b_rects.iter()) {
                    let iou = a.calc_iou(b);
                    if iou > 0.0 {
                        *cell = 1.0 - iou as f64;
                    }
                }
            });
    });

    cost_matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use nearly_eq::assert_nearly_eq;

    fn workers() -> ThreadPool {
        build_worker_pool(2).unwrap()
    }

    #[test]
    fn test_same_box_has_zero_distance() {
        let rects = vec![Rect::new(10.0, 10.0, 20.0, 20.0)];
        let cost = iou_distance(&rects, &rects, &workers());
        assert_eq!(cost.at(0, 0), 0.0);
    }

    #[test]
    fn test_disjoint_boxes_have_unit_distance() {
        let a = vec![Rect::new(0.0, 0.0, 10.0, 10.0)];
        let b = vec![
            Rect::new(50.0, 0.0, 10.0, 10.0),
            Rect::new(0.0, 50.0, 10.0, 10.0),
        ];
        let cost = iou_distance(&a, &b, &workers());
        assert_eq!(cost.at(0, 0), 1.0);
        assert_eq!(cost.at(0, 1), 1.0);
    }

    #[test]
    fn test_shape_and_values() {
        let a = vec![
            Rect::new(0.0, 0.0, 10.0, 10.0),
            Rect::new(100.0, 100.0, 10.0, 10.0),
            Rect::new(5.0, 0.0, 10.0, 10.0),
        ];
        let b = vec![
            Rect::new(0.0, 0.0, 10.0, 10.0),
            Rect::new(100.0, 100.0, 10.0, 10.0),
        ];
        let cost = iou_distance(&a, &b, &workers());
        assert_eq!(cost.rows(), 3);
        assert_eq!(cost.cols(), 2);
        for (i, ra) in a.iter().enumerate() {
            for (j, rb) in b.iter().enumerate() {
                let expected = 1.0 - ra.calc_iou(rb) as f64;
                assert_nearly_eq!(cost.at(i, j), expected, 1e-9);
            }
        }
        assert_eq!(cost.at(1, 1), 0.0);
        assert_eq!(cost.at(1, 0), 1.0);
    }

    #[test]
    fn test_empty_inputs() {
        let a = vec![Rect::new(0.0, 0.0, 10.0, 10.0)];
        let cost = iou_distance(&a, &[], &workers());
        assert_eq!((cost.rows(), cost.cols()), (1, 0));
        assert!(cost.is_empty());
        let cost = iou_distance(&[], &a, &workers());
        assert_eq!((cost.rows(), cost.cols()), (0, 1));
        assert!(cost.is_empty());
    }

    #[test]
    fn test_from_rows_rejects_ragged_input() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(CostMatrix::from_rows(&rows).is_err());
    }

    #[test]
    fn test_row_major_layout() {
        let cost =
            CostMatrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]])
                .unwrap();
        assert_eq!(cost.row(1), &[4.0, 5.0, 6.0]);
        assert_eq!(
            cost.to_rows(),
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]
        );
        assert_eq!(cost.at(0, 2), 3.0);
        assert_eq!(cost.max(), Some(6.0));
        assert_eq!(CostMatrix::new(0, 3, 0.0).max(), None);
    }
}
