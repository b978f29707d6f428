//! Perturbation generation.
//!
//! Magnitudes are a pure function of the run configuration and an iteration
//! counter; only the random flips need to be remembered between issuing a
//! perturbation and consuming its report.

use rand::Rng;

use crate::domain::models::{
    Flip, MirrorParam, OptimizerConfig, ParamPerturbation, SpsaParam, SpsaState,
};

/// Pairs of a block whose classic gain is summed exactly.
pub const EXACT_MEAN_PAIRS: u64 = 4096;

/// Simpson intervals for the remainder of a longer block. Must be even.
const TAIL_INTERVALS: u64 = 1024;

/// Legacy decaying schedule of one parameter.
///
/// `k` is the 1-based pair index (`iteration + 1`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassicSchedule {
    pub a: f64,
    pub c: f64,
    pub big_a: f64,
    pub alpha: f64,
    pub gamma: f64,
}

impl ClassicSchedule {
    /// Schedule of `param` under a classic run, `None` for other families.
    pub fn for_param(optimizer: &OptimizerConfig, param: &SpsaParam) -> Option<Self> {
        match *optimizer {
            OptimizerConfig::Classic {
                big_a,
                alpha,
                gamma,
                ..
            } => Some(Self {
                a: param.a,
                c: param.c,
                big_a,
                alpha,
                gamma,
            }),
            _ => None,
        }
    }

    /// Perturbation magnitude at pair `k`.
    pub fn c_k(&self, k: f64) -> f64 {
        self.c / k.powf(self.gamma)
    }

    /// Gain numerator at pair `k`.
    pub fn a_k(&self, k: f64) -> f64 {
        self.a / (self.big_a + k).powf(self.alpha)
    }

    /// `R = a_k / c_k²`, the factor sent along with the perturbation.
    pub fn r_k(&self, k: f64) -> f64 {
        let c_k = self.c_k(k);
        self.a_k(k) / (c_k * c_k)
    }

    /// Per-pair step gain `R·c = a_k / c_k`.
    pub fn step_gain(&self, k: f64) -> f64 {
        let c_k = self.c_k(k);
        if c_k == 0.0 {
            0.0
        } else {
            self.a_k(k) / c_k
        }
    }

    /// Mean step gain over the `n` pairs starting at `k0`.
    ///
    /// The first [`EXACT_MEAN_PAIRS`] pairs are summed term by term; the rest
    /// of the block uses the trapezoid-corrected integral of the gain, so the
    /// cost does not grow with `n`.
    pub fn mean_step_gain(&self, k0: f64, n: u64) -> f64 {
        if n == 0 {
            return 0.0;
        }
        let exact = n.min(EXACT_MEAN_PAIRS);
        let mut sum: f64 = (0..exact).map(|j| self.step_gain(k0 + j as f64)).sum();
        if n > exact {
            let lo = k0 + exact as f64;
            let hi = k0 + (n - 1) as f64;
            sum += self.integrate_step_gain(lo, hi)
                + 0.5 * (self.step_gain(lo) + self.step_gain(hi));
        }
        sum / n as f64
    }

    /// Integral of the step gain over `[lo, hi]`, `lo > 0`.
    ///
    /// Composite Simpson in `u = ln k`, where the integrand `g(e^u)·e^u` is
    /// smooth over any range of `k`.
    fn integrate_step_gain(&self, lo: f64, hi: f64) -> f64 {
        if hi <= lo {
            return 0.0;
        }
        let (u_lo, u_hi) = (lo.ln(), hi.ln());
        let h = (u_hi - u_lo) / TAIL_INTERVALS as f64;
        let f = |u: f64| {
            let k = u.exp();
            self.step_gain(k) * k
        };
        let inner: f64 = (1..TAIL_INTERVALS)
            .map(|i| {
                let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
                weight * f(u_lo + i as f64 * h)
            })
            .sum();
        (f(u_lo) + f(u_hi) + inner) * h / 3.0
    }
}

/// Deterministic part of a perturbation plus the flip it was issued with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlipContext {
    pub c: f64,
    pub flip: Flip,
    /// Classic gain `R`, absent for schedule-free runs.
    pub gain: Option<f64>,
}

/// A freshly drawn perturbation, ready to be issued.
#[derive(Debug, Clone, PartialEq)]
pub struct Perturbation {
    pub w_params: Vec<ParamPerturbation>,
    pub b_params: Vec<MirrorParam>,
}

impl Perturbation {
    pub fn flips(&self) -> Vec<Flip> {
        self.w_params.iter().map(|p| p.flip).collect()
    }
}

fn magnitude(optimizer: &OptimizerConfig, param: &SpsaParam, iteration: u64) -> (f64, Option<f64>) {
    match ClassicSchedule::for_param(optimizer, param) {
        Some(schedule) => {
            let k = iteration as f64 + 1.0;
            (schedule.c_k(k), Some(schedule.r_k(k)))
        }
        None => (param.c, None),
    }
}

/// Draw a new perturbation at `iteration`, one independent flip per parameter.
pub fn generate<R: Rng + ?Sized>(state: &SpsaState, iteration: u64, rng: &mut R) -> Perturbation {
    let mut w_params = Vec::with_capacity(state.params.len());
    let mut b_params = Vec::with_capacity(state.params.len());

    for param in &state.params {
        let (c, gain) = magnitude(&state.optimizer, param, iteration);
        let flip = if rng.gen_bool(0.5) { Flip::Plus } else { Flip::Minus };
        w_params.push(ParamPerturbation {
            name: param.name.clone(),
            value: param.clamp(param.theta + c * flip.as_f64()),
            c,
            flip,
            gain,
        });
        b_params.push(MirrorParam {
            name: param.name.clone(),
            value: param.clamp(param.theta + c * flip.opposite().as_f64()),
        });
    }

    Perturbation { w_params, b_params }
}

/// Rebuild the perturbation issued at `iteration` from its stored flips.
///
/// Perturbed values are not rebuilt: `theta` may have moved since issuance.
pub fn regenerate(state: &SpsaState, iteration: u64, flips: &[Flip]) -> Vec<FlipContext> {
    state
        .params
        .iter()
        .zip(flips)
        .map(|(param, &flip)| {
            let (c, gain) = magnitude(&state.optimizer, param, iteration);
            FlipContext { c, flip, gain }
        })
        .collect()
}
