//! Paired comparison of LOO results.

use serde::Serialize;
use tracing::info;

use crate::error::AppError;
use crate::loo::estimate::{LooResult, sum_se};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ElpdDiff {
    /// `elpd(b) - elpd(a)`.
    pub diff: f64,
    pub se: f64,
}

/// One row of a comparison table, relative to the best model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompareRow {
    pub label: String,
    pub elpd_loo: f64,
    pub se: f64,
    pub elpd_diff: f64,
    pub se_diff: f64,
    pub p_loo: f64,
    pub looic: f64,
}

/// Difference `b - a` with the standard error of the paired pointwise differences.
pub fn elpd_diff(a: &LooResult, b: &LooResult) -> Result<ElpdDiff, AppError> {
    if a.n() != b.n() {
        return Err(AppError::data(format!(
            "Cannot compare '{}' ({} observations) with '{}' ({} observations).",
            a.label,
            a.n(),
            b.label,
            b.n()
        )));
    }
    let diffs: Vec<f64> = a
        .pointwise
        .iter()
        .zip(&b.pointwise)
        .map(|(pa, pb)| pb.elpd_loo - pa.elpd_loo)
        .collect();
    Ok(ElpdDiff {
        diff: diffs.iter().sum(),
        se: sum_se(&diffs),
    })
}

/// Rank models best first; differences are relative to the best one (so `<= 0`).
pub fn loo_compare(results: &[&LooResult]) -> Result<Vec<CompareRow>, AppError> {
    let Some(best) = results
        .iter()
        .copied()
        .max_by(|a, b| a.elpd_loo.total_cmp(&b.elpd_loo))
    else {
        return Ok(Vec::new());
    };

    let mut rows: Vec<CompareRow> = results
        .iter()
        .map(|r| -> Result<CompareRow, AppError> {
            let d = elpd_diff(best, r)?;
            Ok(CompareRow {
                label: r.label.clone(),
                elpd_loo: r.elpd_loo,
                se: r.se,
                elpd_diff: d.diff,
                se_diff: d.se,
                p_loo: r.p_loo,
                looic: r.looic,
            })
        })
        .collect::<Result<_, _>>()?;
    rows.sort_by(|a, b| b.elpd_loo.total_cmp(&a.elpd_loo));
    Ok(rows)
}

/// Whether the covariates improve predictions over the intercept-only model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Decision {
    /// `elpd(full) - elpd(intercept)`.
    pub elpd_diff: f64,
    pub se_diff: f64,
    pub z: f64,
    pub informative: bool,
}

/// Covariates are informative iff the full model wins by more than `z` paired SEs.
pub fn decide(full: &LooResult, intercept: &LooResult, z: f64) -> Result<Decision, AppError> {
    let d = elpd_diff(intercept, full)?;
    let informative = d.diff > z * d.se;
    info!(
        elpd_diff = d.diff,
        se_diff = d.se,
        informative,
        "covariate informativeness"
    );
    Ok(Decision {
        elpd_diff: d.diff,
        se_diff: d.se,
        z,
        informative,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loo::estimate::PointwiseLoo;
    use nalgebra::DMatrix;

    fn result(label: &str, elpd: &[f64]) -> LooResult {
        let pointwise: Vec<PointwiseLoo> = elpd
            .iter()
            .map(|&e| PointwiseLoo {
                elpd_loo: e,
                p_loo: 0.1,
                lpd: e + 0.1,
                pareto_k: 0.2,
                r_eff: 1.0,
            })
            .collect();
        let total: f64 = elpd.iter().sum();
        LooResult {
            label: label.to_string(),
            elpd_loo: total,
            se: sum_se(elpd),
            p_loo: 0.1 * elpd.len() as f64,
            p_loo_se: 0.0,
            looic: -2.0 * total,
            pointwise,
            k_threshold: 0.7,
            n_bad_k: 0,
            log_weights: DMatrix::zeros(0, elpd.len()),
        }
    }

    #[test]
    fn paired_difference() {
        let a = result("a", &[-1.0, -2.0, -1.5, -1.0]);
        let b = result("b", &[-0.5, -1.0, -1.5, -0.5]);
        let d = elpd_diff(&a, &b).unwrap();
        assert!((d.diff - 2.0).abs() < 1e-12);
        assert!((d.se - sum_se(&[0.5, 1.0, 0.0, 0.5])).abs() < 1e-12);
    }

    #[test]
    fn compare_sorts_best_first() {
        let a = result("worse", &[-2.0, -2.0, -2.5]);
        let b = result("better", &[-1.0, -1.5, -1.0]);
        let rows = loo_compare(&[&a, &b]).unwrap();
        assert_eq!(rows[0].label, "better");
        assert_eq!(rows[0].elpd_diff, 0.0);
        assert_eq!(rows[0].se_diff, 0.0);
        assert!(rows[1].elpd_diff < 0.0);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let a = result("a", &[-1.0, -1.0]);
        let b = result("b", &[-1.0]);
        assert_eq!(elpd_diff(&a, &b).unwrap_err().exit_code(), 3);
    }

    #[test]
    fn decision_uses_paired_se() {
        let intercept = result("int", &[-1.0, -1.0, -1.0, -1.0]);
        let clear = result("full", &[-0.5, -0.4, -0.6, -0.5]);
        assert!(decide(&clear, &intercept, 1.0).unwrap().informative);

        let noisy = result("full", &[-0.2, -1.9, -0.3, -1.7]);
        let d = decide(&noisy, &intercept, 1.0).unwrap();
        assert!(d.elpd_diff.abs() < d.se_diff);
        assert!(!d.informative);
    }
}
