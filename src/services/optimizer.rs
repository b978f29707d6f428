//! Closed-form batched optimizer updates.
//!
//! A report carries only `N` game pairs and their summed outcome `s`. Each
//! update rule below folds that block in one step so that the result matches
//! `N` sequential unit updates, each seeing the block mean `s / N`:
//!
//! - Classic: `theta += R·c·s·flip` (exact with [`ClassicGain::BlockMean`]).
//! - Schedule-free SGD: the fast iterate moves by `lr·c·s·flip`; the surrogate
//!   average carries a triangular factor `(N + 1) / 2` for the intermediate
//!   iterates a single step skips.
//! - Schedule-free Adam: `v` follows the closed-form geometric recursion with
//!   the pre-block second-moment estimate; the step is damped by
//!   [`adam_damping`] for the denominator drift inside the block.
//!
//! `theta` and any reconstructed surrogate are clamped to `[min, max]`.

use crate::domain::models::{ClassicGain, OptimizerConfig, SpsaParam, SpsaState};

use super::perturbation::{ClassicSchedule, FlipContext};

/// Bias-correction terms at or below this are treated as zero.
const BIAS_CORRECTION_FLOOR: f64 = 1e-16;

/// Below this distance from `sqrt(beta2) = 1` the damping factor switches to
/// its first-order series.
const DAMPING_SERIES_THRESHOLD: f64 = 1e-12;

/// Schedule-free mass bookkeeping for one report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassUpdate {
    pub weight_sum_prev: f64,
    pub weight_sum_curr: f64,
    pub report_weight: f64,
    /// Share of the report in the cumulative mass.
    pub a_k: f64,
}

impl MassUpdate {
    /// Add `lr·n` to the run's cumulative mass.
    pub fn advance(weight_sum: &mut f64, n: u64, lr: f64) -> Self {
        let report_weight = lr * n as f64;
        let weight_sum_prev = *weight_sum;
        let weight_sum_curr = weight_sum_prev + report_weight;
        *weight_sum = weight_sum_curr;
        let a_k = if weight_sum_curr > 0.0 {
            report_weight / weight_sum_curr
        } else {
            1.0
        };
        Self {
            weight_sum_prev,
            weight_sum_curr,
            report_weight,
            a_k,
        }
    }
}

/// New state of one parameter after a report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamUpdate {
    pub theta: f64,
    pub z: f64,
    /// Surrogate after the update (equals `z` without blending, `theta` for
    /// classic runs).
    pub x: f64,
    pub v: f64,
    /// Value recorded in the history.
    pub display: f64,
}

impl ParamUpdate {
    fn store(&self, param: &mut SpsaParam) {
        param.theta = self.theta;
        param.z = self.z;
        param.v = self.v;
    }
}

fn reconstruct_x_prev(param: &SpsaParam, beta: f64) -> f64 {
    param.clamp((param.theta - (1.0 - beta) * param.z) / beta)
}

fn blend(param: &SpsaParam, z_new: f64, x_new: f64, beta: f64) -> f64 {
    param.clamp((1.0 - beta) * z_new + beta * x_new)
}

/// Legacy update: `theta += step_gain·s·flip`, where `step_gain` is `R·c`.
pub fn classic_step(
    param: &SpsaParam,
    ctx: &FlipContext,
    step_gain: f64,
    signed_result: f64,
) -> ParamUpdate {
    let theta = param.clamp(param.theta + step_gain * signed_result * ctx.flip.as_f64());
    ParamUpdate {
        theta,
        z: param.z,
        x: theta,
        v: param.v,
        display: theta,
    }
}

/// Schedule-free SGD update for a block of `n` pairs.
pub fn sgd_step(
    param: &SpsaParam,
    ctx: &FlipContext,
    n: u64,
    signed_result: f64,
    lr: f64,
    beta: f64,
    mass: &MassUpdate,
) -> ParamUpdate {
    let z_prev = param.z;
    let delta = lr * ctx.c * signed_result * ctx.flip.as_f64();
    let z_new = z_prev + delta;

    if beta == 0.0 {
        let theta = param.clamp(z_new);
        return ParamUpdate {
            theta,
            z: z_new,
            x: z_new,
            v: param.v,
            display: theta,
        };
    }

    let x_prev = reconstruct_x_prev(param, beta);
    let tri_factor = (n as f64 + 1.0) / 2.0;
    let x_new = param.clamp(
        (mass.weight_sum_prev * x_prev + mass.report_weight * z_prev + lr * delta * tri_factor)
            / mass.weight_sum_curr,
    );
    let theta = blend(param, z_new, x_new, beta);
    ParamUpdate {
        theta,
        z: z_new,
        x: x_new,
        v: param.v,
        display: x_new,
    }
}

/// Closed-form second moment after `n` steps that each see `mu2`.
///
/// `steps` is the cumulative pair count after the block, used for bias
/// correction. Returns `(v_new, denom)`.
pub fn adam_second_moment(
    v_prev: f64,
    beta2: f64,
    n: u64,
    mu2: f64,
    steps: u64,
    eps: f64,
) -> (f64, f64) {
    let (v_new, v_hat) = if beta2 < 1.0 {
        let decay = beta2.powf(n as f64);
        let v_new = decay * v_prev + (1.0 - decay) * mu2;
        let correction = 1.0 - beta2.powf(steps as f64);
        let v_hat = if correction > BIAS_CORRECTION_FLOOR {
            v_new / correction
        } else {
            v_new
        };
        (v_new, v_hat)
    } else {
        (v_prev, v_prev)
    };
    (v_new, v_hat.sqrt() + eps)
}

/// Intra-block damping `k(N, beta2) = (1 − beta2^(N/2)) / (N·(1 − sqrt(beta2)))`.
///
/// `1` for single-pair blocks or `beta2` outside `(0, 1)`; clamped to
/// `[1e-12, 1]`.
pub fn adam_damping(n: u64, beta2: f64) -> f64 {
    if n <= 1 || !(beta2 > 0.0 && beta2 < 1.0) {
        return 1.0;
    }
    let n = n as f64;
    let q = beta2.sqrt();
    let k = if (1.0 - q).abs() > DAMPING_SERIES_THRESHOLD {
        (1.0 - beta2.powf(0.5 * n)) / (n * (1.0 - q))
    } else {
        1.0 - (n - 1.0) * 0.25 * (1.0 - beta2)
    };
    k.clamp(1e-12, 1.0)
}

/// Schedule-free Adam update for a block of `n` pairs.
#[allow(clippy::too_many_arguments)]
pub fn adam_step(
    param: &SpsaParam,
    ctx: &FlipContext,
    n: u64,
    signed_result: f64,
    config: &AdamHyper,
    mass: &MassUpdate,
    mu2: f64,
    steps: u64,
) -> ParamUpdate {
    let (v_new, denom) = adam_second_moment(param.v, config.beta2, n, mu2, steps, config.eps);

    let mut step = if denom > 0.0 {
        config.lr * signed_result / denom
    } else {
        0.0
    };
    step *= adam_damping(n, config.beta2);
    let z_new = param.z + step * ctx.c * ctx.flip.as_f64();

    if config.beta1 == 0.0 {
        let theta = param.clamp(z_new);
        return ParamUpdate {
            theta,
            z: z_new,
            x: z_new,
            v: v_new,
            display: theta,
        };
    }

    let x_prev = reconstruct_x_prev(param, config.beta1);
    let x_new = param.clamp((1.0 - mass.a_k) * x_prev + mass.a_k * z_new);
    let theta = blend(param, z_new, x_new, config.beta1);
    ParamUpdate {
        theta,
        z: z_new,
        x: x_new,
        v: v_new,
        display: x_new,
    }
}

/// Adam hyper-parameters of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdamHyper {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
}

/// Fold one report into the run's optimizer state.
///
/// `contexts` is the regenerated perturbation, in parameter order, and
/// `issued_iter` the counter it was derived from. Advances `iter` (and the
/// schedule-free mass), updates every parameter, then feeds the block to the
/// moment estimator. Returns the display value of each parameter.
///
/// A block without pairs changes nothing.
pub fn apply_report(
    state: &mut SpsaState,
    contexts: &[FlipContext],
    issued_iter: u64,
    n: u64,
    signed_result: f64,
) -> Vec<f64> {
    if n == 0 {
        return state.params.iter().map(|p| p.theta).collect();
    }
    state.iter += n;

    let updates: Vec<ParamUpdate> = match state.optimizer {
        OptimizerConfig::Classic { gain, .. } => state
            .params
            .iter()
            .zip(contexts)
            .map(|(param, ctx)| {
                let step_gain = match gain {
                    ClassicGain::BlockStart => ctx.gain.unwrap_or(0.0) * ctx.c,
                    ClassicGain::BlockMean => ClassicSchedule::for_param(&state.optimizer, param)
                        .map_or(0.0, |s| s.mean_step_gain(issued_iter as f64 + 1.0, n)),
                };
                classic_step(param, ctx, step_gain, signed_result)
            })
            .collect(),
        OptimizerConfig::ScheduleFreeSgd { lr, beta } => {
            let mass = MassUpdate::advance(&mut state.sf_weight_sum, n, lr);
            state
                .params
                .iter()
                .zip(contexts)
                .map(|(param, ctx)| sgd_step(param, ctx, n, signed_result, lr, beta, &mass))
                .collect()
        }
        OptimizerConfig::ScheduleFreeAdam {
            lr,
            beta1,
            beta2,
            eps,
        } => {
            let mass = MassUpdate::advance(&mut state.sf_weight_sum, n, lr);
            let mu2 = state.moments.estimate();
            let hyper = AdamHyper {
                lr,
                beta1,
                beta2,
                eps,
            };
            let steps = state.iter;
            state
                .params
                .iter()
                .zip(contexts)
                .map(|(param, ctx)| {
                    adam_step(param, ctx, n, signed_result, &hyper, &mass, mu2, steps)
                })
                .collect()
        }
    };

    for (param, update) in state.params.iter_mut().zip(&updates) {
        update.store(param);
    }
    state.moments.update(n, signed_result);

    updates.iter().map(|u| u.display).collect()
}
