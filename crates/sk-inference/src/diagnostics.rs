//! MCMC diagnostics: split R-hat, bulk ESS, per-parameter summaries.
//!
//! Works on any [`Trace`], whether its draws come from CmdStan or from the
//! Laplace approximation.

use std::fmt;

use serde::Serialize;
use sk_core::Trace;

/// Split R-hat (Gelman et al.) for one parameter.
///
/// Returns `NaN` for fewer than 4 draws per chain or zero within-chain variance.
pub fn r_hat(chains: &[&[f64]]) -> f64 {
    let split = match split_chains(chains, 2) {
        Some(v) => v,
        None => return f64::NAN,
    };

    let m = split.len() as f64;
    let n = split[0].len() as f64;

    let means_vars: Vec<(f64, f64)> = split.iter().map(|c| mean_and_var(c)).collect();
    let grand_mean = means_vars.iter().map(|(mu, _)| mu).sum::<f64>() / m;

    // B = n/(m-1) * sum((chain_mean - grand_mean)^2)
    let b = means_vars.iter().map(|(mu, _)| (mu - grand_mean).powi(2)).sum::<f64>() * n
        / (m - 1.0);
    let w = means_vars.iter().map(|(_, v)| v).sum::<f64>() / m;

    if w < 1e-30 {
        return f64::NAN;
    }

    let var_hat_plus = (n - 1.0) / n * w + b / n;
    (var_hat_plus / w).sqrt()
}

/// Split every chain in half and truncate the halves to a common length.
fn split_chains<'a>(chains: &[&'a [f64]], min_half: usize) -> Option<Vec<&'a [f64]>> {
    if chains.is_empty() {
        return None;
    }

    let mut halves: Vec<&[f64]> = Vec::with_capacity(chains.len() * 2);
    for c in chains {
        if c.len() < 4 {
            return None;
        }
        let mid = c.len() / 2;
        halves.push(&c[..mid]);
        halves.push(&c[mid..]);
    }

    let min_len = halves.iter().map(|c| c.len()).min().unwrap_or(0);
    if min_len < min_half {
        return None;
    }
    Some(halves.into_iter().map(|c| &c[..min_len]).collect())
}

fn mean_and_var(chain: &[f64]) -> (f64, f64) {
    let n = chain.len() as f64;
    let mean = chain.iter().sum::<f64>() / n;
    let var = chain.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var)
}

/// Bulk effective sample size for one parameter.
///
/// Variogram autocorrelation estimate with Geyer's initial monotone sequence.
/// Returns `0.0` when chains are too short to estimate.
pub fn ess_bulk(chains: &[&[f64]]) -> f64 {
    let split = match split_chains(chains, 4) {
        Some(v) => v,
        None => return 0.0,
    };

    let m = split.len();
    let n = split[0].len();
    let total_draws = (m * n) as f64;

    let means_vars: Vec<(f64, f64)> = split.iter().map(|c| mean_and_var(c)).collect();
    let m_f = m as f64;
    let n_f = n as f64;
    let mean_all = means_vars.iter().map(|(mu, _)| mu).sum::<f64>() / m_f;
    let b = means_vars.iter().map(|(mu, _)| (mu - mean_all).powi(2)).sum::<f64>() * n_f
        / (m_f - 1.0);
    let w = means_vars.iter().map(|(_, v)| v).sum::<f64>() / m_f;
    let var_hat_plus = (n_f - 1.0) / n_f * w + b / n_f;

    if !var_hat_plus.is_finite() || var_hat_plus < 1e-30 {
        return total_draws;
    }

    // rho_t = 1 - V_t / (2 * var_hat_plus), V_t the mean squared lag-t difference.
    let mut rho: Vec<f64> = Vec::with_capacity(n - 1);
    for lag in 1..n {
        let mut sum = 0.0;
        let mut count = 0usize;
        for c in &split {
            for i in 0..(n - lag) {
                let d = c[i] - c[i + lag];
                sum += d * d;
                count += 1;
            }
        }
        let v = sum / (count as f64);
        rho.push((1.0 - v / (2.0 * var_hat_plus)).clamp(-1.0, 1.0));

        let k = rho.len();
        if k % 2 == 0 && rho[k - 2] + rho[k - 1] < 0.0 {
            break;
        }
    }

    let mut gammas: Vec<f64> = Vec::new();
    for pair in rho.chunks_exact(2) {
        let g = pair[0] + pair[1];
        if g < 0.0 {
            break;
        }
        gammas.push(g);
    }
    for k in 1..gammas.len() {
        if gammas[k] > gammas[k - 1] {
            gammas[k] = gammas[k - 1];
        }
    }

    let tau = 1.0 + 2.0 * gammas.iter().sum::<f64>();
    if !tau.is_finite() || tau <= 0.0 {
        return total_draws;
    }

    (total_draws / tau).clamp(1.0, total_draws)
}

/// Linear-interpolated quantile of already sorted values.
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Fraction of draws flagged divergent. Zero when no chain reports divergences.
pub fn divergence_rate(trace: &Trace) -> f64 {
    let flagged: usize = trace.chains.iter().map(|c| c.divergences.len()).sum();
    if flagged == 0 {
        return 0.0;
    }
    let divergent =
        trace.chains.iter().flat_map(|c| c.divergences.iter()).filter(|&&d| d).count();
    divergent as f64 / flagged as f64
}

/// Posterior summary of one parameter.
#[derive(Debug, Clone, Serialize)]
pub struct ParamSummary {
    /// Parameter name.
    pub name: String,
    /// Posterior mean.
    pub mean: f64,
    /// Posterior standard deviation.
    pub sd: f64,
    /// 5% quantile.
    pub q5: f64,
    /// Median.
    pub q50: f64,
    /// 95% quantile.
    pub q95: f64,
    /// Split R-hat.
    pub r_hat: f64,
    /// Bulk ESS.
    pub ess_bulk: f64,
}

/// Posterior summary of a whole trace.
#[derive(Debug, Clone, Serialize)]
pub struct FitSummary {
    /// Per-parameter rows, in trace order.
    pub params: Vec<ParamSummary>,
    /// Number of chains.
    pub n_chains: usize,
    /// Draws across all chains.
    pub total_draws: usize,
    /// Fraction of divergent transitions.
    pub divergence_rate: f64,
}

impl FitSummary {
    /// Largest finite R-hat, `NaN` if none.
    pub fn max_r_hat(&self) -> f64 {
        self.params
            .iter()
            .map(|p| p.r_hat)
            .filter(|v| v.is_finite())
            .fold(f64::NAN, f64::max)
    }

    /// Smallest bulk ESS, `NaN` if there are no parameters.
    pub fn min_ess_bulk(&self) -> f64 {
        self.params.iter().map(|p| p.ess_bulk).fold(f64::NAN, f64::min)
    }

    /// Row for `name`.
    pub fn param(&self, name: &str) -> Option<&ParamSummary> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// Summarize every parameter of `trace`.
pub fn summarize(trace: &Trace) -> FitSummary {
    let params = trace
        .param_names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let per_chain = trace.param_draws(i);
            let refs: Vec<&[f64]> = per_chain.iter().map(Vec::as_slice).collect();
            let mut all: Vec<f64> = per_chain.iter().flatten().copied().collect();
            all.sort_by(f64::total_cmp);
            ParamSummary {
                name: name.clone(),
                mean: trace.param_mean(i),
                sd: trace.param_sd(i),
                q5: quantile_sorted(&all, 0.05),
                q50: quantile_sorted(&all, 0.5),
                q95: quantile_sorted(&all, 0.95),
                r_hat: r_hat(&refs),
                ess_bulk: ess_bulk(&refs),
            }
        })
        .collect();

    let summary = FitSummary {
        params,
        n_chains: trace.chains.len(),
        total_draws: trace.total_draws(),
        divergence_rate: divergence_rate(trace),
    };
    if summary.max_r_hat() > 1.05 {
        log::warn!("max R-hat {:.3} > 1.05; chains may not have mixed", summary.max_r_hat());
    }
    if summary.divergence_rate > 0.0 {
        log::warn!("{:.1}% divergent transitions", 100.0 * summary.divergence_rate);
    }
    summary
}

impl fmt::Display for FitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<12} {:>10} {:>10} {:>10} {:>10} {:>10} {:>8} {:>8}",
            "param", "mean", "sd", "5%", "50%", "95%", "r_hat", "ess"
        )?;
        for p in &self.params {
            writeln!(
                f,
                "{:<12} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>8.3} {:>8.0}",
                p.name, p.mean, p.sd, p.q5, p.q50, p.q95, p.r_hat, p.ess_bulk
            )?;
        }
        write!(
            f,
            "chains={} draws={} divergences={:.2}%",
            self.n_chains,
            self.total_draws,
            100.0 * self.divergence_rate
        )
    }
}
