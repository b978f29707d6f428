//! Periodic parameter snapshots for display.
//!
//! The sampling period is derived from the planned game count so that the
//! history size stays bounded however long the run gets.

use crate::domain::models::{HistorySample, SpsaState};

use super::perturbation::FlipContext;

/// Target number of snapshots for a run with `n_params` parameters.
pub fn target_samples(n_params: usize) -> f64 {
    if n_params < 100 {
        100.0
    } else if n_params < 1000 {
        10_000.0 / n_params as f64
    } else {
        1.0
    }
}

/// Pairs between two snapshots.
pub fn sampling_period(num_games: u64, n_params: usize) -> f64 {
    num_games as f64 / 2.0 / target_samples(n_params)
}

/// Append a snapshot if the run's `iter` crossed the next sampling point.
///
/// Returns whether a snapshot was recorded.
pub fn record_history(
    state: &mut SpsaState,
    num_games: u64,
    contexts: &[FlipContext],
    display_values: &[f64],
) -> bool {
    let period = sampling_period(num_games, state.params.len());
    if period <= 0.0 {
        return false;
    }
    let due = (state.param_history.len() + 1) as f64 <= state.iter as f64 / period;
    if !due {
        return false;
    }

    let sample = contexts
        .iter()
        .zip(display_values)
        .map(|(ctx, &theta)| HistorySample { theta, c: ctx.c })
        .collect();
    state.param_history.push(sample);
    true
}
