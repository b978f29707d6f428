//! Online estimator of the per-pair second moment.
//!
//! Only block summaries `(N, s)` ever reach the coordinator, where `s` is the
//! sum of `N` pair outcomes in `-2..=2`. Four exact block-averaged aggregates
//! are enough to recover an unbiased second moment:
//!
//! ```text
//! E[s²/N] = σ² + μ²·E[N]   ⇒   σ̂² = E[s²/N] − μ̂²·E[N],   μ̂₂ = μ̂² + σ̂²
//! ```

use serde::{Deserialize, Serialize};

/// Lower clamp of the second-moment estimate.
pub const MU2_MIN: f64 = 1e-12;

/// Upper clamp of the second-moment estimate (outcomes lie in `-2..=2`).
pub const MU2_MAX: f64 = 4.0;

const fn default_mu2_init() -> f64 {
    1.0
}

/// Block-averaged aggregates of every consumed report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentStats {
    pub report_count: f64,
    pub sum_n: f64,
    pub sum_signed_result: f64,
    pub sum_squared_result_over_n: f64,
    /// Estimate returned before any report has been folded in.
    #[serde(default = "default_mu2_init")]
    pub mu2_init: f64,
}

impl Default for MomentStats {
    fn default() -> Self {
        Self::with_prior(default_mu2_init())
    }
}

impl MomentStats {
    pub fn with_prior(mu2_init: f64) -> Self {
        Self {
            report_count: 0.0,
            sum_n: 0.0,
            sum_signed_result: 0.0,
            sum_squared_result_over_n: 0.0,
            mu2_init,
        }
    }

    /// Virtual aggregates equivalent to `reports` blocks of mean size
    /// `mean_n` drawn from the pentanomial distribution `p5`.
    ///
    /// Returns empty aggregates when either count is not positive.
    pub fn from_pentanomial_prior(p5: [f64; 5], reports: f64, mean_n: f64) -> Self {
        let (mu, mu2, var) = pentanomial_moments(p5);
        let mut stats = Self::with_prior(mu2);
        if reports <= 0.0 || mean_n <= 0.0 {
            return stats;
        }
        stats.report_count = reports;
        stats.sum_n = reports * mean_n;
        stats.sum_signed_result = reports * mean_n * mu;
        stats.sum_squared_result_over_n = reports * (var + mean_n * mu * mu);
        stats
    }

    /// Add externally computed aggregates on top of the current ones.
    pub fn warm_start(&mut self, prior: &Self) {
        if prior.report_count <= 0.0 {
            return;
        }
        self.report_count += prior.report_count;
        self.sum_n += prior.sum_n;
        self.sum_signed_result += prior.sum_signed_result;
        self.sum_squared_result_over_n += prior.sum_squared_result_over_n;
    }

    /// Fold one report of `n` pairs with summed outcome `signed_result`.
    pub fn update(&mut self, n: u64, signed_result: f64) {
        if n == 0 {
            return;
        }
        let n = n as f64;
        self.report_count += 1.0;
        self.sum_n += n;
        self.sum_signed_result += signed_result;
        self.sum_squared_result_over_n += signed_result * signed_result / n.max(1.0);
    }

    /// Mean outcome per pair, `None` before any pair was seen.
    pub fn mean(&self) -> Option<f64> {
        (self.sum_n > 0.0).then(|| self.sum_signed_result / self.sum_n)
    }

    /// Block-averaged per-pair variance, never negative.
    pub fn variance(&self) -> Option<f64> {
        if self.report_count <= 0.0 {
            return None;
        }
        let mean = self.mean()?;
        let e_s2_over_n = self.sum_squared_result_over_n / self.report_count;
        let e_n = self.sum_n / self.report_count;
        Some((e_s2_over_n - mean * mean * e_n).max(0.0))
    }

    /// Current second-moment estimate, clamped to `[MU2_MIN, MU2_MAX]`.
    ///
    /// Must be read before the block being applied is folded in.
    pub fn estimate(&self) -> f64 {
        if self.report_count <= 0.0 {
            return self.mu2_init;
        }
        let mean = self.mean().unwrap_or(0.0);
        let variance = self.variance().unwrap_or(0.0);
        (mean * mean + variance).clamp(MU2_MIN, MU2_MAX)
    }
}

/// Mean, second moment and variance of a pentanomial distribution over the
/// pair outcomes `[-2, -1, 0, 1, 2]`.
pub fn pentanomial_moments(p5: [f64; 5]) -> (f64, f64, f64) {
    const VALUES: [f64; 5] = [-2.0, -1.0, 0.0, 1.0, 2.0];
    let mu: f64 = p5.iter().zip(VALUES).map(|(p, v)| p * v).sum();
    let mu2: f64 = p5.iter().zip(VALUES).map(|(p, v)| p * v * v).sum();
    (mu, mu2, mu2 - mu * mu)
}
