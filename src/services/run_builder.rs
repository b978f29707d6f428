//! Run creation from a user tuning definition.
//!
//! The definition lists one parameter per line as
//! `name, start, min, max, c_end, r_end`. `r_end` (the final gain) is only
//! required by classic runs. Schedule-free runs use `c_end` as their fixed
//! perturbation size.

use uuid::Uuid;

use crate::domain::errors::RunSpecError;
use crate::domain::models::{
    ClassicGain, MomentStats, OptimizerConfig, OptimizerDefaults, OptimizerKind, Run, SpsaParam,
    SpsaState, MU2_MAX, MU2_MIN,
};

/// Warm-start of the second-moment estimator from a pentanomial prior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mu2Prior {
    pub p5: [f64; 5],
    /// Number of virtual reports.
    pub reports: f64,
    /// Mean pairs per virtual report.
    pub mean_n: f64,
}

/// Everything needed to create a tuning run.
#[derive(Debug, Clone, PartialEq)]
pub struct TuningDefinition {
    pub raw_params: String,
    pub num_games: u64,
    pub optimizer: OptimizerKind,
    pub classic_gain: ClassicGain,
    pub mu2_prior: Option<Mu2Prior>,
}

impl TuningDefinition {
    pub fn new(raw_params: impl Into<String>, num_games: u64, optimizer: OptimizerKind) -> Self {
        Self {
            raw_params: raw_params.into(),
            num_games,
            optimizer,
            classic_gain: ClassicGain::default(),
            mu2_prior: None,
        }
    }

    pub fn with_classic_gain(mut self, gain: ClassicGain) -> Self {
        self.classic_gain = gain;
        self
    }

    pub fn with_mu2_prior(mut self, prior: Mu2Prior) -> Self {
        self.mu2_prior = Some(prior);
        self
    }
}

/// One parsed line of a tuning definition.
#[derive(Debug, Clone, PartialEq)]
pub struct RawParam {
    /// 1-based line in the definition.
    pub line: usize,
    pub name: String,
    pub start: f64,
    pub min: f64,
    pub max: f64,
    pub c_end: f64,
    pub r_end: Option<f64>,
}

const FIELD_NAMES: [&str; 6] = ["name", "start", "min", "max", "c_end", "r_end"];

fn parse_field(line: usize, index: usize, value: &str) -> Result<f64, RunSpecError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| RunSpecError::NotANumber {
            line,
            field: FIELD_NAMES[index],
            value: value.to_string(),
        })
}

/// Parse and validate the raw parameter lines. Blank lines are skipped.
pub fn parse_raw_params(raw: &str) -> Result<Vec<RawParam>, RunSpecError> {
    let mut params: Vec<RawParam> = Vec::new();

    for (index, line) in raw.lines().enumerate() {
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if !(5..=6).contains(&fields.len()) {
            return Err(RunSpecError::FieldCount {
                line: line_no,
                expected: "5 or 6",
                found: fields.len(),
            });
        }

        let name = fields[0].to_string();
        if name.is_empty() {
            return Err(RunSpecError::EmptyName(line_no));
        }
        if params.iter().any(|p| p.name == name) {
            return Err(RunSpecError::DuplicateName(name));
        }

        let start = parse_field(line_no, 1, fields[1])?;
        let min = parse_field(line_no, 2, fields[2])?;
        let max = parse_field(line_no, 3, fields[3])?;
        let c_end = parse_field(line_no, 4, fields[4])?;
        let r_end = fields
            .get(5)
            .map(|value| parse_field(line_no, 5, value))
            .transpose()?;

        if min >= max {
            return Err(RunSpecError::InvalidBounds { name, min, max });
        }
        if !(min..=max).contains(&start) {
            return Err(RunSpecError::StartOutOfBounds {
                name,
                start,
                min,
                max,
            });
        }
        if c_end <= 0.0 {
            return Err(RunSpecError::NonPositive {
                name,
                field: "c_end",
                value: c_end,
            });
        }
        if let Some(r_end) = r_end {
            if r_end <= 0.0 {
                return Err(RunSpecError::NonPositive {
                    name,
                    field: "r_end",
                    value: r_end,
                });
            }
        }

        params.push(RawParam {
            line: line_no,
            name,
            start,
            min,
            max,
            c_end,
            r_end,
        });
    }

    if params.is_empty() {
        return Err(RunSpecError::NoParameters);
    }
    Ok(params)
}

fn check(
    name: &'static str,
    value: f64,
    ok: bool,
    reason: &'static str,
) -> Result<(), RunSpecError> {
    if ok {
        Ok(())
    } else {
        Err(RunSpecError::InvalidHyperParameter {
            name,
            value,
            reason,
        })
    }
}

/// Validate hyper-parameter defaults for the chosen family.
pub fn validate_defaults(
    kind: OptimizerKind,
    defaults: &OptimizerDefaults,
) -> Result<(), RunSpecError> {
    let d = defaults;
    check(
        "mu2_init",
        d.mu2_init,
        (MU2_MIN..=MU2_MAX).contains(&d.mu2_init),
        "must lie in [1e-12, 4]",
    )?;

    if kind.is_schedule_free() {
        check("sf_lr", d.sf_lr, d.sf_lr > 0.0, "must be positive")?;
        check(
            "sf_beta",
            d.sf_beta,
            (0.0..1.0).contains(&d.sf_beta),
            "must lie in [0, 1)",
        )?;
    } else {
        let non_negative = [
            ("classic_a_fraction", d.classic_a_fraction),
            ("classic_alpha", d.classic_alpha),
            ("classic_gamma", d.classic_gamma),
        ];
        for (name, value) in non_negative {
            check(name, value, value >= 0.0, "must be non-negative")?;
        }
    }

    if kind == OptimizerKind::ScheduleFreeAdam {
        check(
            "adam_beta2",
            d.adam_beta2,
            d.adam_beta2 > 0.0 && d.adam_beta2 <= 1.0,
            "must lie in (0, 1]",
        )?;
        check("adam_eps", d.adam_eps, d.adam_eps >= 0.0, "must be non-negative")?;
    }
    Ok(())
}

fn validate_prior(prior: &Mu2Prior) -> Result<(), RunSpecError> {
    let total: f64 = prior.p5.iter().sum();
    check(
        "mu2_prior.p5",
        total,
        prior.p5.iter().all(|p| *p >= 0.0) && (total - 1.0).abs() < 1e-9,
        "must be a probability distribution",
    )?;
    check("mu2_prior.reports", prior.reports, prior.reports >= 0.0, "must be non-negative")?;
    check("mu2_prior.mean_n", prior.mean_n, prior.mean_n >= 0.0, "must be non-negative")
}

/// Builds optimizer state for new runs from configured defaults.
#[derive(Debug, Clone, Default)]
pub struct RunBuilder {
    defaults: OptimizerDefaults,
}

impl RunBuilder {
    pub fn new(defaults: OptimizerDefaults) -> Self {
        Self { defaults }
    }

    /// Initial optimizer state: `theta = z = start`, `v = 0`, counters at zero.
    pub fn build_state(&self, definition: &TuningDefinition) -> Result<SpsaState, RunSpecError> {
        let kind = definition.optimizer;
        validate_defaults(kind, &self.defaults)?;
        if let Some(prior) = &definition.mu2_prior {
            validate_prior(prior)?;
        }

        let num_iter = definition.num_games / 2;
        if num_iter == 0 {
            return Err(RunSpecError::TooFewGames(definition.num_games));
        }
        let raw = parse_raw_params(&definition.raw_params)?;
        let d = &self.defaults;
        let n = num_iter as f64;

        let optimizer = match kind {
            OptimizerKind::Classic => OptimizerConfig::Classic {
                big_a: d.classic_a_fraction * n,
                alpha: d.classic_alpha,
                gamma: d.classic_gamma,
                gain: definition.classic_gain,
            },
            OptimizerKind::ScheduleFreeSgd => OptimizerConfig::ScheduleFreeSgd {
                lr: d.sf_lr,
                beta: d.sf_beta,
            },
            OptimizerKind::ScheduleFreeAdam => OptimizerConfig::ScheduleFreeAdam {
                lr: d.sf_lr,
                beta1: d.sf_beta,
                beta2: d.adam_beta2,
                eps: d.adam_eps,
            },
        };

        let params = raw
            .into_iter()
            .map(|p| -> Result<SpsaParam, RunSpecError> {
                let (c, r_end, a) = match optimizer {
                    OptimizerConfig::Classic {
                        big_a,
                        alpha,
                        gamma,
                        ..
                    } => {
                        let r_end = p.r_end.ok_or(RunSpecError::FieldCount {
                            line: p.line,
                            expected: "6 (classic runs need r_end)",
                            found: 5,
                        })?;
                        let c = p.c_end * n.powf(gamma);
                        let a = r_end * p.c_end * p.c_end * (big_a + n).powf(alpha);
                        (c, r_end, a)
                    }
                    _ => (p.c_end, p.r_end.unwrap_or(0.0), 0.0),
                };
                Ok(SpsaParam {
                    name: p.name,
                    start: p.start,
                    min: p.min,
                    max: p.max,
                    theta: p.start,
                    c,
                    c_end: p.c_end,
                    r_end,
                    a,
                    z: p.start,
                    v: 0.0,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut moments = MomentStats::with_prior(d.mu2_init);
        if let Some(prior) = &definition.mu2_prior {
            moments.warm_start(&MomentStats::from_pentanomial_prior(
                prior.p5,
                prior.reports,
                prior.mean_n,
            ));
        }

        Ok(SpsaState {
            optimizer,
            iter: 0,
            num_iter,
            sf_weight_sum: 0.0,
            moments,
            params,
            param_history: Vec::new(),
        })
    }

    /// Create a new run with no tasks.
    pub fn build_run(
        &self,
        run_id: Uuid,
        definition: &TuningDefinition,
    ) -> Result<Run, RunSpecError> {
        let spsa = self.build_state(definition)?;
        tracing::info!(
            %run_id,
            optimizer = definition.optimizer.as_str(),
            params = spsa.params.len(),
            num_games = definition.num_games,
            "created tuning run"
        );
        Ok(Run::new(run_id, definition.num_games, spsa))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str =
        "KnightValue, 300, 200, 400, 10, 0.0020\n\nBishopValue,320,200,400,10,0.002\n";

    #[test]
    fn test_parse_raw_params() {
        let params = parse_raw_params(RAW).unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "KnightValue");
        assert!((params[1].start - 320.0).abs() < f64::EPSILON);
        assert_eq!(params[1].r_end, Some(0.002));
    }

    #[test]
    fn test_parse_rejects_bad_lines() {
        assert!(matches!(
            parse_raw_params("A, 1, 0"),
            Err(RunSpecError::FieldCount { line: 1, .. })
        ));
        assert!(matches!(
            parse_raw_params("A, x, 0, 2, 1"),
            Err(RunSpecError::NotANumber { field: "start", .. })
        ));
        assert!(matches!(
            parse_raw_params("A, 1, 2, 0, 1"),
            Err(RunSpecError::InvalidBounds { .. })
        ));
        assert!(matches!(
            parse_raw_params("A, 5, 0, 2, 1"),
            Err(RunSpecError::StartOutOfBounds { .. })
        ));
        assert!(matches!(
            parse_raw_params("A, 1, 0, 2, 0"),
            Err(RunSpecError::NonPositive { field: "c_end", .. })
        ));
        assert_eq!(
            parse_raw_params("A, 1, 0, 2, 1\nA, 1, 0, 2, 1"),
            Err(RunSpecError::DuplicateName("A".to_string()))
        );
        assert_eq!(parse_raw_params(" , 1, 0, 2, 1"), Err(RunSpecError::EmptyName(1)));
        assert_eq!(parse_raw_params("\n  \n"), Err(RunSpecError::NoParameters));
        assert!(matches!(
            parse_raw_params("A, NaN, 0, 2, 1"),
            Err(RunSpecError::NotANumber { line: 1, .. })
        ));
    }

    #[test]
    fn test_build_schedule_free_state() {
        let builder = RunBuilder::default();
        let state = builder
            .build_state(&TuningDefinition::new(RAW, 20_000, OptimizerKind::ScheduleFreeSgd))
            .unwrap();

        assert_eq!(state.num_iter, 10_000);
        assert_eq!(state.kind(), OptimizerKind::ScheduleFreeSgd);
        let knight = &state.params[0];
        assert!((knight.theta - 300.0).abs() < f64::EPSILON);
        assert!((knight.z - 300.0).abs() < f64::EPSILON);
        assert!((knight.c - 10.0).abs() < f64::EPSILON);
        assert!((state.moments.estimate() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_classic_schedule_reaches_end_values() {
        use crate::services::perturbation::ClassicSchedule;

        let builder = RunBuilder::default();
        let state = builder
            .build_state(&TuningDefinition::new(RAW, 20_000, OptimizerKind::Classic))
            .unwrap();
        let param = &state.params[0];
        let schedule = ClassicSchedule::for_param(&state.optimizer, param).unwrap();

        let k = state.num_iter as f64;
        assert!((schedule.c_k(k) - 10.0).abs() < 1e-9);
        assert!((schedule.r_k(k) - 0.002).abs() < 1e-12);
    }

    #[test]
    fn test_classic_requires_r_end() {
        let builder = RunBuilder::default();
        let definition = TuningDefinition::new("A, 1, 0, 2, 1", 100, OptimizerKind::Classic);
        let result = builder.build_state(&definition);
        assert!(matches!(result, Err(RunSpecError::FieldCount { line: 1, .. })));
    }

    #[test]
    fn test_rejects_bad_hyper_parameters() {
        let builder = RunBuilder::new(OptimizerDefaults {
            sf_beta: 1.0,
            ..Default::default()
        });
        let result =
            builder.build_state(&TuningDefinition::new(RAW, 100, OptimizerKind::ScheduleFreeSgd));
        assert!(matches!(
            result,
            Err(RunSpecError::InvalidHyperParameter { name: "sf_beta", .. })
        ));

        // Schedule-free settings do not constrain a classic run, and vice versa.
        assert!(builder
            .build_state(&TuningDefinition::new(RAW, 100, OptimizerKind::Classic))
            .is_ok());
        let builder = RunBuilder::new(OptimizerDefaults {
            classic_alpha: -1.0,
            ..Default::default()
        });
        let result = builder.build_state(&TuningDefinition::new(RAW, 100, OptimizerKind::Classic));
        assert!(matches!(
            result,
            Err(RunSpecError::InvalidHyperParameter { name: "classic_alpha", .. })
        ));
        assert!(builder
            .build_state(&TuningDefinition::new(RAW, 100, OptimizerKind::ScheduleFreeSgd))
            .is_ok());

        let builder = RunBuilder::default();
        let result =
            builder.build_state(&TuningDefinition::new(RAW, 1, OptimizerKind::ScheduleFreeAdam));
        assert_eq!(result, Err(RunSpecError::TooFewGames(1)));
    }

    #[test]
    fn test_mu2_prior_warm_start() {
        let builder = RunBuilder::default();
        let prior = Mu2Prior {
            p5: [0.05, 0.2, 0.5, 0.2, 0.05],
            reports: 10.0,
            mean_n: 16.5,
        };
        let state = builder
            .build_state(
                &TuningDefinition::new(RAW, 1000, OptimizerKind::ScheduleFreeAdam)
                    .with_mu2_prior(prior),
            )
            .unwrap();
        assert!((state.moments.report_count - 10.0).abs() < f64::EPSILON);
        assert!((state.moments.estimate() - 0.8).abs() < 1e-12);

        let bad = Mu2Prior {
            p5: [0.5, 0.5, 0.5, 0.0, 0.0],
            ..prior
        };
        let definition =
            TuningDefinition::new(RAW, 1000, OptimizerKind::ScheduleFreeAdam).with_mu2_prior(bad);
        assert!(builder.build_state(&definition).is_err());
    }

    #[test]
    fn test_build_run() {
        let run_id = Uuid::new_v4();
        let run = RunBuilder::default()
            .build_run(run_id, &TuningDefinition::new(RAW, 2000, OptimizerKind::ScheduleFreeAdam))
            .unwrap();
        assert_eq!(run.id, run_id);
        assert!(run.is_alive());
        assert!(run.tasks.is_empty());
    }
}
