//! The FiveThirtyEight candy-power-ranking table.
//!
//! 85 candies, nine binary attributes, two percentile covariates (`sugarpercent`,
//! `pricepercent`) and the head-to-head win percentage (`winpercent`) as target.

use crate::domain::Dataset;
use crate::error::AppError;
use crate::io::ingest::read_dataset_from_reader;

/// Raw CSV text, shipped with the crate.
pub const CANDY_CSV: &str = include_str!("../../data/candy-data.csv");

pub const CANDY_TARGET: &str = "winpercent";
pub const CANDY_ID_COLUMN: &str = "competitorname";

/// Load the embedded candy table.
pub fn load_candy() -> Result<Dataset, AppError> {
    read_dataset_from_reader(CANDY_CSV.as_bytes(), CANDY_TARGET, Some(CANDY_ID_COLUMN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_table_has_expected_shape() {
        let data = load_candy().unwrap();
        assert_eq!(data.n_rows(), 85);
        assert_eq!(data.n_covariates(), 11);
        assert_eq!(data.covariate_names[0], "chocolate");
        assert_eq!(data.covariate_names[10], "pricepercent");
        assert_eq!(data.ids[0], "100 Grand");
        assert_eq!(data.target_name, "winpercent");
    }

    #[test]
    fn embedded_table_values_are_plausible() {
        let data = load_candy().unwrap();
        let stats = data.stats();
        assert!(stats.y_min > 20.0 && stats.y_max < 90.0);
        assert!(stats.y_mean > 45.0 && stats.y_mean < 55.0);

        let chocolate = data.covariate_index("chocolate").unwrap();
        assert!(data.x.column(chocolate).iter().all(|&v| v == 0.0 || v == 1.0));
    }
}
