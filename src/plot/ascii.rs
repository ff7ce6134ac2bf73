//! ASCII plotting for terminal output.
//!
//! Fixed-size character grids, optimized for:
//! - quick visual checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Interval plot elements:
//! - 90% interval: `-`
//! - 50% interval: `=`
//! - median: `o`
//! - zero: `|`
//!
//! Selection plot elements:
//! - reference model (difference 0): `-` line
//! - elpd difference: `o`, ± one SE: `|`

use serde::Serialize;

use crate::math::quantile;
use crate::projpred::SizeStats;

/// Quantiles drawn for one parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntervalRow {
    pub name: String,
    pub q05: f64,
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
    pub q95: f64,
}

impl IntervalRow {
    pub fn from_draws(name: &str, draws: &[f64]) -> Self {
        Self {
            name: name.to_string(),
            q05: quantile(draws, 0.05),
            q25: quantile(draws, 0.25),
            q50: quantile(draws, 0.5),
            q75: quantile(draws, 0.75),
            q95: quantile(draws, 0.95),
        }
    }
}

/// One row per parameter on a shared horizontal axis that always includes 0.
pub fn render_interval_plot(rows: &[IntervalRow], width: usize) -> String {
    let width = width.max(10);
    let label_w = rows.iter().map(|r| r.name.chars().count()).max().unwrap_or(0);

    let mut lo: f64 = 0.0;
    let mut hi: f64 = 0.0;
    for r in rows {
        lo = lo.min(r.q05);
        hi = hi.max(r.q95);
    }
    if !(hi > lo) {
        hi = lo + 1.0;
    }
    let (lo, hi) = pad_range(lo, hi, 0.05);
    let zero = map_x(0.0, lo, hi, width);

    let mut out = String::new();
    out.push_str(&format!("Intervals: 90% '-' | 50% '=' | median 'o' | x=[{lo:.2}, {hi:.2}]\n"));
    for r in rows {
        let mut line = vec![' '; width];
        line[zero] = '|';
        fill(&mut line, map_x(r.q05, lo, hi, width), map_x(r.q95, lo, hi, width), '-');
        fill(&mut line, map_x(r.q25, lo, hi, width), map_x(r.q75, lo, hi, width), '=');
        line[map_x(r.q50, lo, hi, width)] = 'o';
        let body: String = line.into_iter().collect();
        out.push_str(format!("{:>label_w$} {body}", r.name).trim_end());
        out.push('\n');
    }
    out
}

/// Elpd difference to the reference model (± one SE) against submodel size.
pub fn render_size_plot(sizes: &[SizeStats], width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let max_size = sizes.iter().map(|s| s.size).max().unwrap_or(0);
    let (x_min, x_max) = (0.0, (max_size as f64).max(1.0));

    let mut y_min: f64 = 0.0;
    let mut y_max: f64 = 0.0;
    for s in sizes {
        y_min = y_min.min(s.diff - s.diff_se);
        y_max = y_max.max(s.diff + s.diff_se);
    }
    if !(y_max > y_min) {
        y_max = y_min + 1.0;
    }
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];
    let zero = map_y(0.0, y_min, y_max, height);
    for cell in grid[zero].iter_mut() {
        *cell = '-';
    }

    for s in sizes {
        let x = map_x(s.size as f64, x_min, x_max, width);
        let top = map_y(s.diff + s.diff_se, y_min, y_max, height);
        let bottom = map_y(s.diff - s.diff_se, y_min, y_max, height);
        for row in grid.iter_mut().take(bottom + 1).skip(top) {
            row[x] = '|';
        }
        grid[map_y(s.diff, y_min, y_max, height)][x] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: size=[0, {max_size}] | elpd diff to reference=[{y_min:.2}, {y_max:.2}]\n"
    ));
    for row in grid {
        out.push_str(row.into_iter().collect::<String>().trim_end());
        out.push('\n');
    }
    out
}

fn fill(line: &mut [char], a: usize, b: usize, ch: char) {
    for cell in &mut line[a.min(b)..=a.max(b)] {
        *cell = ch;
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(t: f64, t_min: f64, t_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((t - t_min) / (t_max - t_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, q: [f64; 5]) -> IntervalRow {
        IntervalRow {
            name: name.to_string(),
            q05: q[0],
            q25: q[1],
            q50: q[2],
            q75: q[3],
            q95: q[4],
        }
    }

    fn size(size: usize, diff: f64, diff_se: f64) -> SizeStats {
        SizeStats {
            size,
            elpd: 0.0,
            elpd_se: 0.0,
            diff,
            diff_se,
            mlpd: 0.0,
            mse: 0.0,
            mse_se: 0.0,
        }
    }

    #[test]
    fn interval_plot_golden_snapshot() {
        let rows = vec![row("a", [1.0, 2.0, 3.0, 4.0, 5.0]), row("bb", [-1.0, -0.5, 0.0, 0.5, 1.0])];
        let txt = render_interval_plot(&rows, 23);
        let expected = concat!(
            "Intervals: 90% '-' | 50% '=' | median 'o' | x=[-1.30, 5.30]\n",
            " a     |   ---===o====---\n",
            "bb  --=o==--\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn size_plot_golden_snapshot() {
        let sizes = vec![size(0, -8.0, 2.0), size(1, -1.0, 1.0), size(2, 0.0, 1.0)];
        let txt = render_size_plot(&sizes, 11, 6);
        let expected = concat!(
            "Plot: size=[0, 2] | elpd diff to reference=[-10.55, 1.55]\n",
            "          |\n",
            "-----o----o\n",
            "\n",
            "|\n",
            "o\n",
            "|\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn interval_from_draws_orders_quantiles() {
        let draws: Vec<f64> = (0..101).map(|i| i as f64).collect();
        let r = IntervalRow::from_draws("x", &draws);
        assert_eq!((r.q05, r.q25, r.q50, r.q75, r.q95), (5.0, 25.0, 50.0, 75.0, 95.0));
    }
}
