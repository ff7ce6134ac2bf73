//! Centering/scaling of the regression problem.
//!
//! Sampling happens on `ỹ = (y - ȳ) / s_y` with centered covariates. With the
//! weakly-informative priors expressed in target-sd units this is equivalent
//! to placing the priors on the original scale, and it keeps the posterior
//! geometry close to unit scale for every dataset.

use nalgebra::{DMatrix, DVector};

use crate::domain::Dataset;
use crate::error::AppError;
use crate::math::{mean, sd};

#[derive(Debug, Clone)]
pub struct Standardization {
    /// Centered covariates, `n × D` (only the columns in the formula).
    pub xc: DMatrix<f64>,
    /// Standardized target.
    pub y: DVector<f64>,
    pub y_mean: f64,
    pub y_sd: f64,
    pub x_means: Vec<f64>,
    pub x_sds: Vec<f64>,
}

impl Standardization {
    pub fn new(data: &Dataset, columns: &[usize]) -> Result<Self, AppError> {
        let y_mean = mean(&data.y);
        let y_sd = sd(&data.y);
        if !(y_sd.is_finite() && y_sd > 0.0) {
            return Err(AppError::data(format!("Target '{}' has zero variance.", data.target_name)));
        }

        let mut xc = data.select_columns(columns);
        let mut x_means = Vec::with_capacity(columns.len());
        let mut x_sds = Vec::with_capacity(columns.len());
        for (j, &col) in columns.iter().enumerate() {
            let values: Vec<f64> = data.x.column(col).iter().copied().collect();
            let m = mean(&values);
            let s = sd(&values);
            if !(s.is_finite() && s > 0.0) {
                return Err(AppError::data(format!(
                    "Covariate '{}' has zero variance.",
                    data.covariate_names[col]
                )));
            }
            xc.column_mut(j).add_scalar_mut(-m);
            x_means.push(m);
            x_sds.push(s);
        }

        let y = DVector::from_iterator(data.y.len(), data.y.iter().map(|v| (v - y_mean) / y_sd));

        Ok(Self {
            xc,
            y,
            y_mean,
            y_sd,
            x_means,
            x_sds,
        })
    }

    pub fn n(&self) -> usize {
        self.y.len()
    }

    pub fn d(&self) -> usize {
        self.xc.ncols()
    }

    /// Map `[α̃, β̃_1..β̃_D, σ̃]` to `[intercept, β_1..β_D, σ]` on the data scale.
    pub fn to_original(&self, std_draw: &[f64]) -> Vec<f64> {
        let d = self.d();
        let alpha = std_draw[0];
        let sigma = std_draw[d + 1];

        let mut out = Vec::with_capacity(d + 2);
        let mut intercept = self.y_mean + self.y_sd * alpha;
        let mut betas = Vec::with_capacity(d);
        for j in 0..d {
            let beta = self.y_sd * std_draw[1 + j];
            intercept -= beta * self.x_means[j];
            betas.push(beta);
        }
        out.push(intercept);
        out.extend(betas);
        out.push(self.y_sd * sigma);
        out
    }
}
