//! Formatted terminal output for every pipeline stage.

use crate::app::pipeline::{AnalysisOutput, FitOutput, ModelAnalysis, SelectOutput, SelectionOutput, VariantAnalysis};
use crate::diagnostics::ConvergenceReport;
use crate::domain::{AnalysisConfig, Dataset, Validation};
use crate::fit::ParamSummary;
use crate::loo::{CompareRow, Decision, LooResult};
use crate::plot::{IntervalRow, render_interval_plot, render_size_plot};
use crate::projpred::{ProjectedPosterior, SelectionResult};
use crate::sampler::ChainStats;

/// Report for `candy analyze`.
pub fn format_analysis(output: &AnalysisOutput, config: &AnalysisConfig) -> String {
    let mut out = String::new();
    out.push_str("=== candy - Bayesian regression + projection predictive selection ===\n");
    out.push_str(&format!(
        "Sampler: chains={} warmup={} draws={} max_depth={} adapt_delta={} (horseshoe {}) seed={}\n\n",
        config.sampler.chains,
        config.sampler.warmup,
        config.sampler.draws,
        config.sampler.max_depth,
        config.sampler.adapt_delta,
        config.hs_adapt_delta,
        config.sampler.seed,
    ));
    for v in &output.variants {
        out.push_str(&format_variant(v, config));
        out.push('\n');
    }
    out
}

/// Everything for one dataset variant.
pub fn format_variant(v: &VariantAnalysis, config: &AnalysisConfig) -> String {
    let mut out = String::new();
    out.push_str(&format!("##### Dataset: {} #####\n", v.dataset.variant.display_name()));
    out.push_str(&format_dataset(&v.dataset));
    out.push('\n');

    for m in v.models() {
        out.push_str(&format_model(m, config));
        out.push('\n');
    }

    out.push_str(&format_comparison(&v.comparison));
    out.push('\n');

    if v.decision_converged {
        out.push_str(&format_decision(&v.decision));
    } else {
        out.push_str("Decision withheld: the full or intercept-only fit failed its diagnostics.\n");
    }
    out.push('\n');

    if let Some(sel) = &v.selection {
        out.push_str(&format_selection_output(sel, v.selection_converged, config));
    }
    out
}

/// Report for `candy fit`.
pub fn format_fit(output: &FitOutput, config: &AnalysisConfig) -> String {
    let mut out = format_dataset(&output.dataset);
    out.push('\n');
    out.push_str(&format_model(&output.model, config));
    out
}

/// Report for `candy select`.
pub fn format_select(output: &SelectOutput, config: &AnalysisConfig) -> String {
    let mut out = format_dataset(&output.dataset);
    out.push('\n');
    out.push_str(&format_model(&output.model, config));
    out.push('\n');
    out.push_str(&format_selection_output(
        &output.selection,
        output.model.diagnostics.converged,
        config,
    ));
    out
}

pub fn format_dataset(data: &Dataset) -> String {
    let s = data.stats();
    format!(
        "Data ({}): n={} | covariates={} | {}: mean={:.2} sd={:.2} range=[{:.2}, {:.2}]\n",
        data.variant.display_name(),
        s.n_rows,
        s.n_covariates,
        data.target_name,
        s.y_mean,
        s.y_sd,
        s.y_min,
        s.y_max,
    )
}

/// Diagnostics, coefficient table, optional interval plot and LOO for one model.
pub fn format_model(m: &ModelAnalysis, config: &AnalysisConfig) -> String {
    let mut out = String::new();
    out.push_str(&format!("--- {} : {} ---\n", m.fit.label, m.fit.formula));
    if let Some(tau0) = m.fit.tau0 {
        out.push_str(&format!("Horseshoe global scale tau0={tau0:.4}\n"));
    }
    out.push_str(&format_diagnostics(&m.diagnostics, &m.fit.posterior.chain_stats));
    out.push_str(&format_summary_table(&m.fit.summary(config.interval_prob), config.interval_prob));

    if config.plot && m.fit.posterior.n_coefficients() > 0 {
        let post = &m.fit.posterior;
        let rows: Vec<IntervalRow> = (1..=post.n_coefficients())
            .map(|j| IntervalRow::from_draws(&post.param_names[j], &post.column(j)))
            .collect();
        out.push_str(&render_interval_plot(&rows, config.plot_width));
    }

    out.push_str(&format_loo(&m.loo));
    out
}

pub fn format_diagnostics(d: &ConvergenceReport, chains: &[ChainStats]) -> String {
    let mut out = format!(
        "Diagnostics: max R-hat={:.3} | min bulk ESS={:.0} | min tail ESS={:.0} | divergences={} | treedepth hits={}\n",
        d.max_rhat(),
        d.min_ess_bulk(),
        d.min_ess_tail(),
        d.divergences,
        d.treedepth_hits,
    );
    if !chains.is_empty() {
        let n = chains.len() as f64;
        let step_min = chains.iter().map(|c| c.step_size).fold(f64::INFINITY, f64::min);
        let step_max = chains.iter().map(|c| c.step_size).fold(f64::NEG_INFINITY, f64::max);
        out.push_str(&format!(
            "Sampler: step size={step_min:.3}..{step_max:.3} | mean accept stat={:.3} | mean tree depth={:.1} | leapfrog steps={} | min E-BFMI={:.2}\n",
            chains.iter().map(|c| c.mean_accept_stat).sum::<f64>() / n,
            chains.iter().map(|c| c.mean_tree_depth).sum::<f64>() / n,
            chains.iter().map(|c| c.n_leapfrog).sum::<usize>(),
            d.min_ebfmi,
        ));
    }
    if d.converged {
        out.push_str("Convergence: ok\n");
    } else {
        out.push_str("Convergence: FAILED\n");
        for w in &d.warnings {
            out.push_str(&format!("  ! {w}\n"));
        }
    }
    out
}

pub fn format_summary_table(rows: &[ParamSummary], prob: f64) -> String {
    let lo = 50.0 * (1.0 - prob);
    let hi = 100.0 - lo;
    let name_w = rows.iter().map(|r| r.name.chars().count()).max().unwrap_or(4).max(9);

    let mut out = String::new();
    push_line(
        &mut out,
        &format!(
            "{:<name_w$} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "parameter",
            "mean",
            "sd",
            format!("{lo:.0}%"),
            "50%",
            format!("{hi:.0}%"),
        ),
    );
    push_line(
        &mut out,
        &format!("{:-<name_w$} {:-<10} {:-<10} {:-<10} {:-<10} {:-<10}", "", "", "", "", "", ""),
    );
    for r in rows {
        push_line(
            &mut out,
            &format!(
                "{:<name_w$} {:>10.3} {:>10.3} {:>10.3} {:>10.3} {:>10.3}",
                r.name, r.mean, r.sd, r.lower, r.median, r.upper
            ),
        );
    }
    out
}

pub fn format_loo(l: &LooResult) -> String {
    let mut out = format!(
        "LOO: elpd_loo={:.2} (se {:.2}) | p_loo={:.2} (se {:.2}) | looic={:.2}\n",
        l.elpd_loo, l.se, l.p_loo, l.p_loo_se, l.looic
    );
    if l.n_bad_k > 0 {
        out.push_str(&format!(
            "  ! {} observation(s) with Pareto k > {:.2}: {:?}\n",
            l.n_bad_k,
            l.k_threshold,
            l.bad_observations()
        ));
    } else {
        out.push_str(&format!("  All Pareto k estimates < {:.2}.\n", l.k_threshold));
    }
    out
}

pub fn format_comparison(rows: &[CompareRow]) -> String {
    let label_w = rows.iter().map(|r| r.label.chars().count()).max().unwrap_or(5).max(5);
    let mut out = String::from("Model comparison (best first):\n");
    push_line(
        &mut out,
        &format!(
            "{:<label_w$} {:>10} {:>8} {:>10} {:>8} {:>8}",
            "model", "elpd_diff", "se_diff", "elpd_loo", "se", "p_loo"
        ),
    );
    for r in rows {
        push_line(
            &mut out,
            &format!(
                "{:<label_w$} {:>10.2} {:>8.2} {:>10.2} {:>8.2} {:>8.2}",
                r.label, r.elpd_diff, r.se_diff, r.elpd_loo, r.se, r.p_loo
            ),
        );
    }
    out
}

pub fn format_decision(d: &Decision) -> String {
    let verdict = if d.informative {
        "covariates are informative"
    } else {
        "covariates are NOT distinguishable from noise"
    };
    format!(
        "Full vs intercept-only: elpd_diff={:.2} (se {:.2}, z={}) => {verdict}\n",
        d.elpd_diff, d.se_diff, d.z
    )
}

/// Selection table and projection, or a withheld notice when the reference fit failed.
fn format_selection_output(sel: &SelectionOutput, converged: bool, config: &AnalysisConfig) -> String {
    if !converged {
        return format!(
            "Selection withheld: reference model '{}' failed its diagnostics.\n",
            sel.selection.reference_label
        );
    }
    let mut out = format_selection(&sel.selection);
    if config.plot {
        out.push_str(&render_size_plot(&sel.selection.sizes, config.plot_width, config.plot_height));
    }
    out.push('\n');
    out.push_str(&format_projection(&sel.projection, config.interval_prob));
    out
}

pub fn format_selection(s: &SelectionResult) -> String {
    let validation = match s.validation {
        Validation::None => "none (in-sample)",
        Validation::Loo => "LOO",
    };
    let mut out = format!(
        "Variable selection on '{}' | search=forward | validation={validation}\n",
        s.reference_label
    );
    out.push_str(&format!(
        "Reference: elpd={:.2} (se {:.2}) | mse={:.3}\n",
        s.reference.elpd, s.reference.elpd_se, s.reference.mse
    ));

    let term_w = s.solution_terms.iter().map(|t| t.chars().count()).max().unwrap_or(4).max(4);
    push_line(
        &mut out,
        &format!(
            "{:>4} {:<term_w$} {:>9} {:>7} {:>9} {:>7} {:>8} {:>8} {:>9}",
            "size", "term", "elpd", "se", "diff", "diff_se", "mse", "mse_se", "stability"
        ),
    );
    for st in &s.sizes {
        let term = if st.size == 0 { "(none)" } else { s.solution_terms[st.size - 1].as_str() };
        let stability = match (&s.stability, st.size) {
            (Some(stab), k) if k > 0 => format!("{:.2}", stab[k - 1]),
            _ => String::new(),
        };
        push_line(
            &mut out,
            &format!(
                "{:>4} {:<term_w$} {:>9.2} {:>7.2} {:>9.2} {:>7.2} {:>8.3} {:>8.3} {:>9}",
                st.size, term, st.elpd, st.elpd_se, st.diff, st.diff_se, st.mse, st.mse_se, stability
            ),
        );
    }

    out.push_str(&format!("Solution path: {}\n", fmt_terms(&s.solution_terms)));
    out.push_str(&format!(
        "Suggested size: {} {}\n",
        s.suggested_size,
        fmt_terms(s.terms(s.suggested_size))
    ));
    if s.suggestion_capped {
        out.push_str("  ! no size reached the reference model; using the largest searched size\n");
    }
    out
}

pub fn format_projection(p: &ProjectedPosterior, prob: f64) -> String {
    let mut out = format!(
        "Projected posterior: size={} terms={} draws={}\n",
        p.size(),
        fmt_terms(&p.terms),
        p.n_draws()
    );
    out.push_str(&format_summary_table(&p.summarize(prob), prob));
    out
}

fn fmt_terms(terms: &[String]) -> String {
    format!("[{}]", terms.join(", "))
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line.trim_end());
    out.push('\n');
}
