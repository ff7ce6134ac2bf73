//! Core statistical entities.
//!
//! Everything here is created once and read-only afterwards: the pipeline derives
//! new values instead of mutating existing ones.

use std::fmt;

use clap::ValueEnum;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Which target column a dataset carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DatasetVariant {
    /// The observed outcome.
    Original,
    /// The outcome replaced by independent standard-normal noise.
    Null,
}

impl DatasetVariant {
    pub fn display_name(self) -> &'static str {
        match self {
            DatasetVariant::Original => "original",
            DatasetVariant::Null => "null",
        }
    }
}

/// Which right-hand side to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FormulaKind {
    /// `target ~ all covariates`
    Full,
    /// `target ~ 1`
    Intercept,
}

/// Prior family selector (CLI-facing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PriorKind {
    Normal,
    Horseshoe,
}

/// A tabular dataset: `n` rows, `D` numeric covariates and one numeric target.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub ids: Vec<String>,
    pub covariate_names: Vec<String>,
    pub target_name: String,
    /// Covariates, `n × D`.
    pub x: DMatrix<f64>,
    pub y: Vec<f64>,
    pub variant: DatasetVariant,
}

/// Summary of the target column.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetStats {
    pub n_rows: usize,
    pub n_covariates: usize,
    pub y_mean: f64,
    pub y_sd: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Dataset {
    pub fn n_rows(&self) -> usize {
        self.y.len()
    }

    pub fn n_covariates(&self) -> usize {
        self.covariate_names.len()
    }

    pub fn covariate_index(&self, name: &str) -> Option<usize> {
        self.covariate_names.iter().position(|c| c == name)
    }

    pub fn stats(&self) -> DatasetStats {
        let n = self.y.len();
        let mean = crate::math::mean(&self.y);
        let sd = crate::math::sd(&self.y);
        let y_min = self.y.iter().copied().fold(f64::INFINITY, f64::min);
        let y_max = self.y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        DatasetStats {
            n_rows: n,
            n_covariates: self.n_covariates(),
            y_mean: mean,
            y_sd: sd,
            y_min,
            y_max,
        }
    }

    /// Covariate columns restricted to `columns`, in the given order.
    pub fn select_columns(&self, columns: &[usize]) -> DMatrix<f64> {
        self.x.select_columns(columns.iter())
    }
}

/// Model formula: target plus the covariates entering the linear predictor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    pub target: String,
    pub covariates: Vec<String>,
}

impl Formula {
    pub fn full(data: &Dataset) -> Self {
        Self {
            target: data.target_name.clone(),
            covariates: data.covariate_names.clone(),
        }
    }

    pub fn intercept_only(data: &Dataset) -> Self {
        Self {
            target: data.target_name.clone(),
            covariates: Vec::new(),
        }
    }

    pub fn from_kind(kind: FormulaKind, data: &Dataset) -> Self {
        match kind {
            FormulaKind::Full => Self::full(data),
            FormulaKind::Intercept => Self::intercept_only(data),
        }
    }

    pub fn is_intercept_only(&self) -> bool {
        self.covariates.is_empty()
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.covariates.is_empty() {
            write!(f, "{} ~ 1", self.target)
        } else {
            write!(f, "{} ~ {}", self.target, self.covariates.join(" + "))
        }
    }
}

/// Regularized horseshoe hyper-parameters.
///
/// The global scale is `global_scale` when given, otherwise
/// `p0 / (D - p0) / sqrt(n)` where `p0` is the prior guess for the number of
/// relevant covariates. `slab_scale` is expressed in target standard deviations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HorseshoeConfig {
    pub p0: f64,
    pub global_scale: Option<f64>,
    pub local_df: f64,
    pub global_df: f64,
    pub slab_df: f64,
    pub slab_scale: f64,
}

impl Default for HorseshoeConfig {
    fn default() -> Self {
        Self {
            p0: 3.0,
            global_scale: None,
            local_df: 1.0,
            global_df: 1.0,
            slab_df: 4.0,
            slab_scale: 2.5,
        }
    }
}

impl HorseshoeConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        let positive = [
            ("local_df", self.local_df),
            ("global_df", self.global_df),
            ("slab_df", self.slab_df),
            ("slab_scale", self.slab_scale),
            ("p0", self.p0),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(AppError::input(format!("Horseshoe {name} must be finite and > 0.")));
            }
        }
        if let Some(scale) = self.global_scale {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(AppError::input("Horseshoe global scale must be finite and > 0."));
            }
        }
        Ok(())
    }

    /// Resolve the global scale `τ0` for `d` covariates and `n` rows.
    pub fn tau0(&self, d: usize, n: usize) -> f64 {
        if let Some(scale) = self.global_scale {
            return scale;
        }
        let d = d as f64;
        // `p0 >= D` would make the ratio meaningless; fall back to a half-sparse guess.
        let p0 = if self.p0 > 0.0 && self.p0 < d { self.p0 } else { (d / 2.0).max(1.0) };
        let denom = (d - p0).max(1.0);
        p0 / denom / (n as f64).sqrt()
    }
}

/// Prior family and its hyper-parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum PriorSpec {
    /// Weakly-informative Gaussian prior: coefficient scale `scale * sd(y) / sd(x_j)`,
    /// intercept scale `scale * sd(y)`, `sigma ~ Exponential(1 / sd(y))`.
    Normal { scale: f64 },
    Horseshoe(HorseshoeConfig),
}

impl PriorSpec {
    pub fn default_normal() -> Self {
        PriorSpec::Normal { scale: 2.5 }
    }

    pub fn from_kind(kind: PriorKind, hs: HorseshoeConfig) -> Self {
        match kind {
            PriorKind::Normal => Self::default_normal(),
            PriorKind::Horseshoe => PriorSpec::Horseshoe(hs),
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PriorSpec::Normal { .. } => "normal",
            PriorSpec::Horseshoe(_) => "horseshoe",
        }
    }
}
