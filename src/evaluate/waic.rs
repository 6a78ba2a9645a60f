//! Widely applicable information criterion on the deviance scale, and
//! rankings built from it.

use serde::Serialize;

use crate::error::BenchError;
use crate::evaluate::bayes::{RegressionData, Trace};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Waic {
    pub waic: f64,
    pub waic_se: f64,
    pub p_waic: f64,
}

/// Running log-sum-exp and Welford moments of one observation's
/// log-likelihood across draws.
#[derive(Debug, Clone, Copy)]
struct Pointwise {
    count: f64,
    max: f64,
    sum_exp: f64,
    mean: f64,
    m2: f64,
}

impl Default for Pointwise {
    fn default() -> Self {
        Self {
            count: 0.0,
            max: f64::NEG_INFINITY,
            sum_exp: 0.0,
            mean: 0.0,
            m2: 0.0,
        }
    }
}

impl Pointwise {
    fn push(&mut self, ll: f64) {
        if ll > self.max {
            self.sum_exp = self.sum_exp * (self.max - ll).exp() + 1.0;
            self.max = ll;
        } else {
            self.sum_exp += (ll - self.max).exp();
        }
        self.count += 1.0;
        let delta = ll - self.mean;
        self.mean += delta / self.count;
        self.m2 += delta * (ll - self.mean);
    }

    /// Log of the mean likelihood.
    fn lppd(&self) -> f64 {
        self.max + self.sum_exp.ln() - self.count.ln()
    }

    /// Population variance (ddof 0).
    fn variance(&self) -> f64 {
        self.m2 / self.count
    }
}

pub fn waic(data: &RegressionData, trace: &Trace) -> Result<Waic, BenchError> {
    trace.check()?;
    if trace.is_empty() || data.x.is_empty() {
        return Err(BenchError::InsufficientData {
            context: "waic".to_string(),
            required: 1,
            actual: trace.len().min(data.x.len()),
        });
    }

    // One pass over the draws; memory grows with observations only.
    let mut acc = vec![Pointwise::default(); data.x.len()];
    for s in 0..trace.len() {
        for (point, ll) in acc
            .iter_mut()
            .zip(data.log_likelihood(trace.alpha[s], trace.beta[s], trace.sigma[s]))
        {
            point.push(ll);
        }
    }

    let n_obs = acc.len();
    let p_waic: f64 = acc.iter().map(Pointwise::variance).sum();
    let pointwise: Vec<f64> = acc.iter().map(|p| -2.0 * (p.lppd() - p.variance())).collect();

    let total: f64 = pointwise.iter().sum();
    let mean_i = total / n_obs as f64;
    let var_i = pointwise.iter().map(|w| (w - mean_i).powi(2)).sum::<f64>() / n_obs as f64;
    if !total.is_finite() {
        return Err(BenchError::Numerical("WAIC is not finite".to_string()));
    }

    Ok(Waic {
        waic: total,
        waic_se: (n_obs as f64 * var_i).sqrt(),
        p_waic,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankRow {
    pub method: String,
    pub waic: f64,
    pub waic_se: f64,
    pub delta_waic: f64,
}

/// Sorts by WAIC, lowest (best) first. Ties keep input order.
pub fn rank_methods(scores: Vec<(String, Waic)>) -> Vec<RankRow> {
    let mut scores = scores;
    scores.sort_by(|a, b| a.1.waic.total_cmp(&b.1.waic));
    let best = scores.first().map(|(_, w)| w.waic).unwrap_or(0.0);
    scores
        .into_iter()
        .map(|(method, w)| RankRow {
            method,
            waic: w.waic,
            waic_se: w.waic_se,
            delta_waic: w.waic - best,
        })
        .collect()
}

/// `%g`-style float: six significant digits, trailing zeros dropped.
pub fn format_general(v: f64) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    if !v.is_finite() {
        let text = if v.is_nan() {
            "nan"
        } else if v > 0.0 {
            "inf"
        } else {
            "-inf"
        };
        return text.to_string();
    }
    let sci = format!("{v:.5e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    if !(-4..6).contains(&exp) {
        let mantissa = trim_fraction(mantissa);
        let sign = if exp < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exp.abs());
    }
    let decimals = (5 - exp).max(0) as usize;
    trim_fraction(&format!("{v:.decimals$}")).to_string()
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

enum Align {
    Left,
    Decimal,
}

/// Plain-text table in the "simple" layout: header, dashed rule, rows,
/// columns two spaces apart.
pub fn render_simple_table(rows: &[RankRow]) -> String {
    let headers = ["Model", "WAIC", "WAIC SE", "ΔWAIC"];
    let aligns = [Align::Left, Align::Decimal, Align::Decimal, Align::Decimal];
    let cells: Vec<[String; 4]> = rows
        .iter()
        .map(|r| {
            [
                r.method.clone(),
                format_general(r.waic),
                format_general(r.waic_se),
                format_general(r.delta_waic),
            ]
        })
        .collect();

    let mut columns: Vec<Vec<String>> = Vec::with_capacity(headers.len());
    let mut widths = Vec::with_capacity(headers.len());
    for (c, (header, align)) in headers.iter().zip(&aligns).enumerate() {
        let mut column: Vec<String> = cells.iter().map(|row| row[c].clone()).collect();
        if let Align::Decimal = align {
            let after = |s: &str| s.find('.').map(|p| s.chars().count() - p - 1);
            let max_after = column.iter().filter_map(|s| after(s.as_str())).max();
            if let Some(max_after) = max_after {
                for cell in &mut column {
                    let pad = match after(cell.as_str()) {
                        Some(a) => max_after - a,
                        None => max_after + 1,
                    };
                    cell.push_str(&" ".repeat(pad));
                }
            }
        }
        let width = column
            .iter()
            .map(|s| s.chars().count())
            .max()
            .unwrap_or(0)
            .max(header.chars().count() + 2);
        columns.push(column);
        widths.push(width);
    }

    let pad = |s: &str, width: usize, align: &Align| {
        let fill = " ".repeat(width.saturating_sub(s.chars().count()));
        match align {
            Align::Left => format!("{s}{fill}"),
            Align::Decimal => format!("{fill}{s}"),
        }
    };
    let join = |parts: Vec<String>| parts.join("  ").trim_end().to_string();

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(join(
        headers
            .iter()
            .zip(&widths)
            .zip(&aligns)
            .map(|((h, w), a)| pad(*h, *w, a))
            .collect(),
    ));
    lines.push(join(widths.iter().map(|w| "-".repeat(*w)).collect()));
    for r in 0..rows.len() {
        lines.push(join(
            columns
                .iter()
                .zip(&widths)
                .zip(&aligns)
                .map(|((col, w), a)| pad(col[r].as_str(), *w, a))
                .collect(),
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::bayes::Priors;
    use approx::assert_relative_eq;

    fn data() -> RegressionData {
        RegressionData {
            priors: Priors {
                alpha_mu: 0.0,
                alpha_sd: 1.0,
                beta_mu: 0.0,
                beta_sd: 1.0,
                sigma_sd: 1.0,
            },
            x: vec![-1.0, 0.0, 1.0],
            y: vec![-1.0, 0.5, 0.5],
        }
    }

    #[test]
    fn single_draw_waic_is_minus_two_loglik() {
        let d = data();
        let trace = Trace {
            alpha: vec![0.0],
            beta: vec![1.0],
            sigma: vec![1.0],
        };
        let w = waic(&d, &trace).unwrap();
        let ll: f64 = d.log_likelihood(0.0, 1.0, 1.0).sum();
        assert_relative_eq!(w.waic, -2.0 * ll, epsilon = 1e-12);
        assert_eq!(w.p_waic, 0.0);
    }

    #[test]
    fn streamed_terms_match_a_full_loglik_matrix() {
        let d = data();
        let trace = Trace {
            alpha: (0..400).map(|s| 0.3 * (s as f64 * 0.37).sin()).collect(),
            beta: (0..400).map(|s| 1.0 + 0.8 * (s as f64 * 0.11).cos()).collect(),
            sigma: (0..400).map(|s| 0.02 + (s % 7) as f64 * 0.3).collect(),
        };
        let ll: Vec<Vec<f64>> = (0..trace.len())
            .map(|s| d.log_likelihood(trace.alpha[s], trace.beta[s], trace.sigma[s]).collect())
            .collect();
        let n = trace.len() as f64;
        let mut expected = 0.0;
        let mut expected_p = 0.0;
        for i in 0..d.x.len() {
            let max = ll.iter().map(|row| row[i]).fold(f64::NEG_INFINITY, f64::max);
            let lppd = max + ll.iter().map(|row| (row[i] - max).exp()).sum::<f64>().ln() - n.ln();
            let mean = ll.iter().map(|row| row[i]).sum::<f64>() / n;
            let var = ll.iter().map(|row| (row[i] - mean).powi(2)).sum::<f64>() / n;
            expected += -2.0 * (lppd - var);
            expected_p += var;
        }

        let w = waic(&d, &trace).unwrap();
        assert!(w.waic.is_finite());
        assert_relative_eq!(w.waic, expected, max_relative = 1e-9);
        assert_relative_eq!(w.p_waic, expected_p, max_relative = 1e-9);
    }

    #[test]
    fn spread_in_draws_raises_p_waic() {
        let d = data();
        let tight = Trace {
            alpha: vec![0.0, 0.0],
            beta: vec![0.9, 1.1],
            sigma: vec![1.0, 1.0],
        };
        let loose = Trace {
            alpha: vec![0.0, 0.0],
            beta: vec![0.0, 2.0],
            sigma: vec![1.0, 1.0],
        };
        assert!(waic(&d, &loose).unwrap().p_waic > waic(&d, &tight).unwrap().p_waic);
    }

    #[test]
    fn ranking_is_sorted_with_deltas() {
        let score = |w: f64| Waic {
            waic: w,
            waic_se: 1.0,
            p_waic: 2.0,
        };
        let rows = rank_methods(vec![
            ("SW".to_string(), score(120.0)),
            ("JC".to_string(), score(100.0)),
            ("TD".to_string(), score(110.5)),
        ]);
        let order: Vec<_> = rows.iter().map(|r| r.method.as_str()).collect();
        assert_eq!(order, vec!["JC", "TD", "SW"]);
        assert_eq!(rows[0].delta_waic, 0.0);
        assert_eq!(rows[2].delta_waic, 20.0);
    }

    #[test]
    fn general_format_matches_percent_g() {
        assert_eq!(format_general(1234.5678), "1234.57");
        assert_eq!(format_general(0.5), "0.5");
        assert_eq!(format_general(20.0), "20");
        assert_eq!(format_general(1_234_567.0), "1.23457e+06");
        assert_eq!(format_general(0.000012), "1.2e-05");
    }

    #[test]
    fn simple_table_layout() {
        let rows = vec![
            RankRow {
                method: "JC".into(),
                waic: 100.25,
                waic_se: 3.5,
                delta_waic: 0.0,
            },
            RankRow {
                method: "SW".into(),
                waic: 120.0,
                waic_se: 4.0,
                delta_waic: 19.75,
            },
        ];
        let table = render_simple_table(&rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Model"));
        assert!(lines[1].starts_with("-------  "));
        assert!(lines[2].starts_with("JC "));
        assert!(lines[3].starts_with("SW "));
        // Decimal points line up in the WAIC column.
        let dot2 = lines[2].find("100.25").unwrap() + 3;
        let int3 = lines[3].find("120").unwrap() + 3;
        assert_eq!(dot2, int3);
    }
}
