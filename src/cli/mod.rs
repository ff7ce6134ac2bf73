//! Command-line parsing.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! statistics code: every subcommand's flags end up in an `AnalysisConfig`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{
    AnalysisConfig, DatasetVariant, FormulaKind, HorseshoeConfig, PriorKind, SamplerConfig, SelectionConfig,
    SelectionPolicy, Validation,
};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "candy",
    version,
    about = "Bayesian linear regression with projection predictive variable selection"
)]
pub struct Cli {
    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log debug output (sampler adaptation, selection folds).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the whole analysis on the null and original datasets.
    Analyze(AnalyzeArgs),
    /// Fit a single model and print diagnostics, intervals and LOO.
    Fit(FitArgs),
    /// Horseshoe fit, variable selection and projection on one dataset.
    Select(SelectArgs),
}

/// Options shared by every subcommand.
#[derive(Debug, Args, Clone)]
pub struct CommonArgs {
    /// CSV file to analyze (defaults to the embedded candy table).
    #[arg(long, value_name = "CSV")]
    pub data: Option<PathBuf>,

    /// Target column.
    #[arg(long, default_value = "winpercent")]
    pub target: String,

    /// Row identifier column (excluded from the covariates).
    #[arg(long, default_value = "competitorname")]
    pub id_column: String,

    /// Seed for the null dataset and all chains.
    #[arg(long, default_value_t = 2017)]
    pub seed: u64,

    /// Number of Markov chains.
    #[arg(long, default_value_t = 4)]
    pub chains: usize,

    /// Warmup iterations per chain.
    #[arg(long, default_value_t = 1000)]
    pub warmup: usize,

    /// Post-warmup draws per chain.
    #[arg(long, default_value_t = 1000)]
    pub draws: usize,

    /// Maximum NUTS tree depth.
    #[arg(long, default_value_t = 10)]
    pub max_depth: u32,

    /// Target acceptance statistic for normal-prior fits.
    #[arg(long, default_value_t = 0.8)]
    pub adapt_delta: f64,

    /// Target acceptance statistic for horseshoe fits.
    #[arg(long, default_value_t = 0.99)]
    pub hs_adapt_delta: f64,

    /// Prior guess of the number of relevant covariates (sets tau0).
    #[arg(long, default_value_t = 3.0)]
    pub p0: f64,

    /// Horseshoe global scale; overrides --p0.
    #[arg(long)]
    pub global_scale: Option<f64>,

    /// Degrees of freedom of the local half-t priors.
    #[arg(long, default_value_t = 1.0)]
    pub local_df: f64,

    /// Degrees of freedom of the global half-t prior.
    #[arg(long, default_value_t = 1.0)]
    pub global_df: f64,

    /// Degrees of freedom of the slab.
    #[arg(long, default_value_t = 4.0)]
    pub slab_df: f64,

    /// Slab scale (in target sd units).
    #[arg(long, default_value_t = 2.5)]
    pub slab_scale: f64,

    /// Central interval mass for summaries.
    #[arg(long, default_value_t = 0.9)]
    pub prob: f64,

    /// Disable the ASCII plots.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 72)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 16)]
    pub height: usize,
}

/// Selection settings.
#[derive(Debug, Args, Clone)]
pub struct SelectionArgs {
    /// How submodel sizes are validated.
    #[arg(long, value_enum, default_value_t = Validation::Loo)]
    pub validation: Validation,

    /// Largest submodel size searched (default: min(D, 19)).
    #[arg(long)]
    pub max_size: Option<usize>,

    /// Reference draws used during the search.
    #[arg(long, default_value_t = 20)]
    pub search_draws: usize,

    /// Reference draws used to score sizes.
    #[arg(long, default_value_t = 400)]
    pub pred_draws: usize,

    /// Standard errors allowed below the reference when suggesting a size.
    #[arg(long, default_value_t = 1.0)]
    pub suggest_z: f64,

    /// Project onto this many terms instead of the suggested size.
    #[arg(long)]
    pub nterms: Option<usize>,

    /// Draws in the projected posterior.
    #[arg(long, default_value_t = 400)]
    pub project_draws: usize,
}

#[derive(Debug, Args, Clone)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Dataset variants to analyze, in order.
    #[arg(long, value_enum, value_delimiter = ',', default_values_t = [DatasetVariant::Null, DatasetVariant::Original])]
    pub variants: Vec<DatasetVariant>,

    /// When to run variable selection.
    #[arg(long, value_enum, default_value_t = SelectionPolicy::Always)]
    pub selection_policy: SelectionPolicy,

    /// Covariates count as informative when elpd_diff > z * se_diff.
    #[arg(long, default_value_t = 1.0)]
    pub decision_z: f64,

    /// Write the full report as JSON.
    #[arg(long, value_name = "JSON")]
    pub export_report: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long, value_enum, default_value_t = DatasetVariant::Original)]
    pub variant: DatasetVariant,

    #[arg(long, value_enum, default_value_t = PriorKind::Normal)]
    pub prior: PriorKind,

    #[arg(long, value_enum, default_value_t = FormulaKind::Full)]
    pub formula: FormulaKind,

    /// Write posterior draws as CSV.
    #[arg(long, value_name = "CSV")]
    pub export_draws: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct SelectArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub selection: SelectionArgs,

    #[arg(long, value_enum, default_value_t = DatasetVariant::Original)]
    pub variant: DatasetVariant,
}

impl CommonArgs {
    /// Base configuration from the shared flags.
    pub fn to_config(&self) -> AnalysisConfig {
        AnalysisConfig {
            data_path: self.data.clone(),
            target: self.target.clone(),
            id_column: Some(self.id_column.clone()),
            sampler: SamplerConfig {
                chains: self.chains,
                warmup: self.warmup,
                draws: self.draws,
                max_depth: self.max_depth,
                adapt_delta: self.adapt_delta,
                seed: self.seed,
                ..SamplerConfig::default()
            },
            hs_adapt_delta: self.hs_adapt_delta,
            horseshoe: HorseshoeConfig {
                p0: self.p0,
                global_scale: self.global_scale,
                local_df: self.local_df,
                global_df: self.global_df,
                slab_df: self.slab_df,
                slab_scale: self.slab_scale,
            },
            interval_prob: self.prob,
            plot: !self.no_plot,
            plot_width: self.width,
            plot_height: self.height,
            ..AnalysisConfig::default()
        }
    }
}

impl SelectionArgs {
    pub fn apply(&self, config: &mut AnalysisConfig) {
        config.selection = SelectionConfig {
            validation: self.validation,
            max_size: self.max_size,
            search_draws: self.search_draws,
            pred_draws: self.pred_draws,
            suggest_z: self.suggest_z,
        };
        config.project_size = self.nterms;
        config.project_draws = self.project_draws;
    }
}

impl AnalyzeArgs {
    pub fn to_config(&self) -> AnalysisConfig {
        let mut config = self.common.to_config();
        self.selection.apply(&mut config);
        config.variants = self.variants.clone();
        config.selection_policy = self.selection_policy;
        config.decision_z = self.decision_z;
        config.export_report = self.export_report.clone();
        config
    }
}

impl FitArgs {
    pub fn to_config(&self) -> AnalysisConfig {
        let mut config = self.common.to_config();
        config.export_draws = self.export_draws.clone();
        config
    }
}

impl SelectArgs {
    pub fn to_config(&self) -> AnalysisConfig {
        let mut config = self.common.to_config();
        self.selection.apply(&mut config);
        config
    }
}
