//! Forward search: greedily add the covariate whose projection is closest to
//! the reference model.

use nalgebra::DMatrix;

use crate::error::AppError;
use crate::projpred::projection::{DrawSet, project_onto};

/// Entry order of the first `max_size` covariates. Ties go to the lowest column.
pub fn forward_search(x: &DMatrix<f64>, draws: &DrawSet, max_size: usize) -> Result<Vec<usize>, AppError> {
    let d = x.ncols();
    let max_size = max_size.min(d);
    let mut chosen: Vec<usize> = Vec::with_capacity(max_size);
    let mut remaining: Vec<usize> = (0..d).collect();

    while chosen.len() < max_size {
        let mut best: Option<(usize, f64)> = None;
        for (pos, &c) in remaining.iter().enumerate() {
            let mut subset = chosen.clone();
            subset.push(c);
            let kl = project_onto(x, draws, &subset)?.kl;
            if best.is_none_or(|(_, b)| kl < b) {
                best = Some((pos, kl));
            }
        }
        let Some((pos, _)) = best else { break };
        chosen.push(remaining.remove(pos));
    }
    Ok(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// μ = 3 x2 + 0.5 x0; x1 is noise.
    fn setup() -> (DMatrix<f64>, DrawSet) {
        let x = DMatrix::from_row_slice(6, 3, &[
            0.0, 0.3, 1.0, //
            1.0, -0.2, 0.0, //
            0.0, 0.9, 0.0, //
            1.0, 0.1, 1.0, //
            0.5, -0.7, 2.0, //
            0.2, 0.4, -1.0,
        ]);
        let mut mu = DMatrix::zeros(2, 6);
        for i in 0..6 {
            let base = 3.0 * x[(i, 2)] + 0.5 * x[(i, 0)];
            mu[(0, i)] = base;
            mu[(1, i)] = base + 0.1;
        }
        let draws = DrawSet {
            mu,
            sigma: vec![1.0, 1.0],
            weights: vec![0.5, 0.5],
        };
        (x, draws)
    }

    #[test]
    fn strongest_covariate_enters_first() {
        let (x, draws) = setup();
        let path = forward_search(&x, &draws, 3).unwrap();
        assert_eq!(path[0], 2);
        assert_eq!(path[1], 0);
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn max_size_truncates_the_path() {
        let (x, draws) = setup();
        assert_eq!(forward_search(&x, &draws, 1).unwrap(), vec![2]);
        assert!(forward_search(&x, &draws, 0).unwrap().is_empty());
        assert_eq!(forward_search(&x, &draws, 10).unwrap().len(), 3);
    }

    #[test]
    fn ties_go_to_lowest_index() {
        // Two identical columns.
        let x = DMatrix::from_row_slice(4, 2, &[0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 4.0, 4.0]);
        let mu = DMatrix::from_row_slice(1, 4, &[0.0, 1.0, 2.0, 4.0]);
        let draws = DrawSet {
            mu,
            sigma: vec![1.0],
            weights: vec![1.0],
        };
        assert_eq!(forward_search(&x, &draws, 1).unwrap(), vec![0]);
    }
}
