//! Batch/sequence equivalence of the closed-form updates
//!
//! A report folds `N` pairs in one step. Most tests replay the same blocks as
//! `N` unit steps that each see the block mean `s / N` and compare the two.
//! The blended Adam surrogate is checked against its per-block closed form.

use spsa_coordinator::domain::models::{MomentStats, OptimizerDefaults};
use spsa_coordinator::services::{apply_report, regenerate, ClassicSchedule};
use spsa_coordinator::{ClassicGain, Flip, OptimizerKind, RunBuilder, SpsaState, TuningDefinition};

const BLOCKS: [(u64, f64); 6] = [(10, 4.0), (3, -2.0), (7, 1.0), (1, 1.0), (12, -5.0), (16, 6.0)];

fn flips_for(block: usize, n_params: usize) -> Vec<Flip> {
    (0..n_params)
        .map(|i| if (block + i) % 2 == 0 { Flip::Plus } else { Flip::Minus })
        .collect()
}

fn state(kind: OptimizerKind, defaults: OptimizerDefaults, gain: ClassicGain) -> SpsaState {
    let raw = "P, 0, -100, 100, 0.5, 0.002\nQ, 5, -100, 100, 1.5, 0.002";
    RunBuilder::new(defaults)
        .build_state(&TuningDefinition::new(raw, 10_000, kind).with_classic_gain(gain))
        .unwrap()
}

#[test]
fn test_schedule_free_sgd_matches_unit_steps() {
    let lr = 0.1;
    let beta = 0.9;
    let defaults = OptimizerDefaults {
        sf_lr: lr,
        sf_beta: beta,
        ..OptimizerDefaults::default()
    };
    let mut state = state(OptimizerKind::ScheduleFreeSgd, defaults, ClassicGain::default());

    // Sequential reference: fast iterate, surrogate, cumulative mass.
    let mut z: Vec<f64> = state.params.iter().map(|p| p.z).collect();
    let mut x = z.clone();
    let mut weight_sum = 0.0;

    for (block, &(n, s)) in BLOCKS.iter().enumerate() {
        let flips = flips_for(block, state.params.len());
        let contexts = regenerate(&state, state.iter, &flips);
        let issued = state.iter;
        let display = apply_report(&mut state, &contexts, issued, n, s);

        for _ in 0..n {
            weight_sum += lr;
            let a = lr / weight_sum;
            for (i, ctx) in contexts.iter().enumerate() {
                z[i] += lr * ctx.c * (s / n as f64) * ctx.flip.as_f64();
                x[i] = (1.0 - a) * x[i] + a * z[i];
            }
        }

        for (i, param) in state.params.iter().enumerate() {
            let theta = (1.0 - beta) * z[i] + beta * x[i];
            assert!((param.z - z[i]).abs() < 1e-12, "z block {block} param {i}");
            assert!((display[i] - x[i]).abs() < 1e-12, "x block {block} param {i}");
            assert!((param.theta - theta).abs() < 1e-12, "theta block {block} param {i}");
        }
        assert!((state.sf_weight_sum - weight_sum).abs() < 1e-12);
    }
}

#[test]
fn test_schedule_free_adam_matches_unit_steps() {
    let lr = 0.5;
    let beta2 = 0.999;
    let eps = 1e-8;
    let defaults = OptimizerDefaults {
        sf_lr: lr,
        sf_beta: 0.0,
        adam_beta2: beta2,
        adam_eps: eps,
        ..OptimizerDefaults::default()
    };
    let mut state = state(OptimizerKind::ScheduleFreeAdam, defaults, ClassicGain::default());
    // A heavy prior keeps the per-pair second moment nearly constant.
    state.moments.warm_start(&MomentStats::from_pentanomial_prior(
        [0.05, 0.2, 0.5, 0.2, 0.05],
        1e6,
        10.0,
    ));

    for (block, &(n, s)) in BLOCKS.iter().enumerate() {
        let flips = flips_for(block, state.params.len());
        let contexts = regenerate(&state, state.iter, &flips);
        let mu2 = state.moments.estimate();
        let start_iter = state.iter;
        let z_prev: Vec<f64> = state.params.iter().map(|p| p.z).collect();
        let v_prev: Vec<f64> = state.params.iter().map(|p| p.v).collect();

        apply_report(&mut state, &contexts, start_iter, n, s);

        for (i, ctx) in contexts.iter().enumerate() {
            let mut z = z_prev[i];
            let mut v = v_prev[i];
            let mut denom = 0.0;
            for j in 1..=n {
                let t = (start_iter + j) as f64;
                v = beta2 * v + (1.0 - beta2) * mu2;
                let v_hat = v / (1.0 - beta2.powf(t));
                denom = v_hat.sqrt() + eps;
                z += lr * (s / n as f64) / denom * ctx.c * ctx.flip.as_f64();
            }

            let param = &state.params[i];
            let seq_move = z - z_prev[i];
            let batch_move = param.z - z_prev[i];
            assert!((param.v - v).abs() < 1e-12, "v block {block} param {i}");
            let batch_denom = (param.v / (1.0 - beta2.powf(state.iter as f64))).sqrt() + eps;
            assert!((batch_denom - denom).abs() < 1e-9, "denom block {block} param {i}");
            assert!(
                (batch_move - seq_move).abs() <= 1e-2 * seq_move.abs() + 1e-12,
                "z block {block} param {i}: {batch_move} vs {seq_move}"
            );
            assert!((param.theta - param.z).abs() < 1e-12, "theta follows z without blending");
        }
    }
}

/// With `beta1 > 0` the surrogate takes one averaging step per block, so
/// `theta` follows the block closed form rather than `N` unit steps.
#[test]
fn test_schedule_free_adam_blend_uses_block_surrogate() {
    let lr = 0.5;
    let beta1 = 0.9;
    let beta2 = 0.999;
    let eps = 1e-8;
    let defaults = OptimizerDefaults {
        sf_lr: lr,
        sf_beta: beta1,
        adam_beta2: beta2,
        adam_eps: eps,
        ..OptimizerDefaults::default()
    };
    let mut state = state(OptimizerKind::ScheduleFreeAdam, defaults, ClassicGain::default());

    for (block, &(n, s)) in BLOCKS.iter().enumerate() {
        let flips = flips_for(block, state.params.len());
        let contexts = regenerate(&state, state.iter, &flips);
        let mu2 = state.moments.estimate();
        let start_iter = state.iter;
        let weight_sum = state.sf_weight_sum;
        let before: Vec<(f64, f64, f64)> =
            state.params.iter().map(|p| (p.theta, p.z, p.v)).collect();

        let display = apply_report(&mut state, &contexts, start_iter, n, s);

        let steps = (start_iter + n) as f64;
        let decay = beta2.powf(n as f64);
        let damping = if n > 1 {
            (1.0 - beta2.powf(0.5 * n as f64)) / (n as f64 * (1.0 - beta2.sqrt()))
        } else {
            1.0
        };
        let a_k = lr * n as f64 / (weight_sum + lr * n as f64);

        for (i, ctx) in contexts.iter().enumerate() {
            let (theta, z, v) = before[i];
            let v_new = decay * v + (1.0 - decay) * mu2;
            let denom = (v_new / (1.0 - beta2.powf(steps))).sqrt() + eps;
            let z_new = z + lr * s / denom * damping * ctx.c * ctx.flip.as_f64();
            let x_prev = (theta - (1.0 - beta1) * z) / beta1;
            let x_new = (1.0 - a_k) * x_prev + a_k * z_new;
            let theta_new = (1.0 - beta1) * z_new + beta1 * x_new;

            let param = &state.params[i];
            assert!((param.v - v_new).abs() < 1e-12, "v block {block} param {i}");
            assert!((param.z - z_new).abs() < 1e-10, "z block {block} param {i}");
            assert!((display[i] - x_new).abs() < 1e-10, "x block {block} param {i}");
            assert!(
                (param.theta - theta_new).abs() < 1e-10,
                "theta block {block} param {i}: {} vs {theta_new}",
                param.theta
            );
        }
        assert!((state.sf_weight_sum - (weight_sum + lr * n as f64)).abs() < 1e-12);
    }
}

#[test]
fn test_classic_block_mean_matches_unit_steps() {
    let mut state = state(
        OptimizerKind::Classic,
        OptimizerDefaults::default(),
        ClassicGain::BlockMean,
    );
    let mut theta: Vec<f64> = state.params.iter().map(|p| p.theta).collect();

    for (block, &(n, s)) in BLOCKS.iter().enumerate() {
        let flips = flips_for(block, state.params.len());
        let issued = state.iter;
        let contexts = regenerate(&state, issued, &flips);

        for (i, param) in state.params.iter().enumerate() {
            let schedule = ClassicSchedule::for_param(&state.optimizer, param).unwrap();
            for j in 0..n {
                let k = (issued + j + 1) as f64;
                theta[i] += schedule.step_gain(k) * (s / n as f64) * contexts[i].flip.as_f64();
            }
        }

        apply_report(&mut state, &contexts, issued, n, s);

        for (i, param) in state.params.iter().enumerate() {
            assert!((param.theta - theta[i]).abs() < 1e-12, "theta block {block} param {i}");
        }
    }
}

#[test]
fn test_classic_block_start_uses_first_pair_gain() {
    let mut state = state(
        OptimizerKind::Classic,
        OptimizerDefaults::default(),
        ClassicGain::BlockStart,
    );
    let flips = vec![Flip::Plus, Flip::Minus];
    let contexts = regenerate(&state, 0, &flips);
    let before: Vec<f64> = state.params.iter().map(|p| p.theta).collect();

    apply_report(&mut state, &contexts, 0, 8, 3.0);

    for (i, ctx) in contexts.iter().enumerate() {
        let gain = ctx.gain.unwrap();
        let expected = before[i] + gain * ctx.c * 3.0 * ctx.flip.as_f64();
        assert!((state.params[i].theta - expected).abs() < 1e-12);
    }
}
