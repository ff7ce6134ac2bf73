//! Derived dataset variants.
//!
//! The null variant keeps every covariate and replaces the target with
//! independent `N(0, 1)` draws, so any apparent signal is pure selection noise.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};

use crate::domain::{Dataset, DatasetVariant};
use crate::error::AppError;

/// Build the null variant of `data`. Deterministic in `seed`.
pub fn make_null_variant(data: &Dataset, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(null_seed(data, seed));
    let y = (0..data.n_rows())
        .map(|_| StandardNormal.sample(&mut rng))
        .collect();

    Dataset {
        ids: data.ids.clone(),
        covariate_names: data.covariate_names.clone(),
        target_name: data.target_name.clone(),
        x: data.x.clone(),
        y,
        variant: DatasetVariant::Null,
    }
}

/// Return the requested variant of `original`.
pub fn dataset_variant(original: &Dataset, variant: DatasetVariant, seed: u64) -> Result<Dataset, AppError> {
    match variant {
        DatasetVariant::Original => Ok(original.clone()),
        DatasetVariant::Null => {
            if original.n_rows() < 3 {
                return Err(AppError::data("Null variant needs at least 3 rows."));
            }
            Ok(make_null_variant(original, seed))
        }
    }
}

fn null_seed(data: &Dataset, seed: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    "null-target".hash(&mut hasher);
    data.target_name.hash(&mut hasher);
    data.n_rows().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::load_candy;

    #[test]
    fn null_variant_keeps_covariates() {
        let data = load_candy().unwrap();
        let null = make_null_variant(&data, 7);
        assert_eq!(null.variant, DatasetVariant::Null);
        assert_eq!(null.x, data.x);
        assert_eq!(null.ids, data.ids);
        assert_ne!(null.y, data.y);

        let stats = null.stats();
        assert!(stats.y_mean.abs() < 0.5);
        assert!((stats.y_sd - 1.0).abs() < 0.35);
    }

    #[test]
    fn null_variant_is_deterministic() {
        let data = load_candy().unwrap();
        let a = make_null_variant(&data, 11);
        let b = make_null_variant(&data, 11);
        let c = make_null_variant(&data, 12);
        assert_eq!(a.y, b.y);
        assert_ne!(a.y, c.y);
    }
}
