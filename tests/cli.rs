//! Single-stage subcommands and exports.

use candy_select::app::pipeline::{run_fit, run_select};
use candy_select::domain::{
    AnalysisConfig, DatasetVariant, FormulaKind, PriorKind, SamplerConfig, SelectionConfig, Validation,
};
use candy_select::io::write_draws_csv;
use candy_select::report::{format_fit, format_select};

fn quick_config() -> AnalysisConfig {
    AnalysisConfig {
        sampler: SamplerConfig {
            chains: 2,
            warmup: 300,
            draws: 300,
            ..SamplerConfig::default()
        },
        selection: SelectionConfig {
            validation: Validation::None,
            pred_draws: 100,
            ..SelectionConfig::default()
        },
        project_draws: 100,
        ..AnalysisConfig::default()
    }
}

#[test]
fn fit_intercept_only_model_and_export_draws() {
    let config = quick_config();
    let out = run_fit(&config, DatasetVariant::Original, PriorKind::Normal, FormulaKind::Intercept).unwrap();
    assert_eq!(out.model.fit.posterior.n_params(), 2);

    // Intercept-only posterior mean sits at the sample mean.
    let mean = out.model.fit.summary(0.9)[0].mean;
    let y_mean = out.dataset.stats().y_mean;
    assert!((mean - y_mean).abs() < 2.0, "{mean} vs {y_mean}");

    let report = format_fit(&out, &config);
    assert!(report.contains("winpercent ~ 1"));
    assert!(report.contains("elpd_loo="));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("draws.csv");
    write_draws_csv(&path, &out.model.fit.posterior).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 601);
    assert!(text.starts_with("chain,draw,(Intercept),sigma"));
}

#[test]
fn in_sample_selection_overfits_towards_larger_models() {
    let config = quick_config();
    let out = run_select(&config, DatasetVariant::Null).unwrap();
    let sizes = &out.selection.selection.sizes;
    assert_eq!(sizes.len(), 12);
    // In-sample scoring rewards every added term on pure noise.
    assert!(sizes[11].elpd > sizes[0].elpd);
    assert!(sizes[11].mse < sizes[0].mse);
    assert!(out.selection.selection.stability.is_none());

    let report = format_select(&out, &config);
    assert!(report.contains("validation=none"));
    assert!(report.contains("Projected posterior"));
}

#[test]
fn unknown_target_is_a_data_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tiny.csv");
    std::fs::write(&path, "id,a,b\nx,1,2\ny,2,3\nz,3,5\n").unwrap();
    let config = AnalysisConfig {
        data_path: Some(path),
        target: "missing".into(),
        ..quick_config()
    };
    let err = run_fit(&config, DatasetVariant::Original, PriorKind::Normal, FormulaKind::Full).unwrap_err();
    assert_eq!(err.exit_code(), 3);
}
