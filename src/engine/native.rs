//! The built-in engine: Sobol quasi-random startup, then GP-guided search.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::constraint::LinearConstraint;
use super::gp::{self, Search};
use super::sobol::SobolSequence;
use super::{
    ArmSummary, Engine, Experiment, GenerationStep, GenerationStrategy, Model, TrialSummary,
};
use crate::config::{ParameterDef, ValueType};
use crate::error::{Error, Result};
use crate::types::{ObjectiveValues, ParamMap, TrialId, TrialState};

/// Snapshot format version written by [`NativeEngine::snapshot`].
const SNAPSHOT_VERSION: u32 = 1;

/// Consecutive infeasible Sobol points tolerated before giving up.
const MAX_SOBOL_REJECTIONS: usize = 1000;

/// Tuning knobs of the Gaussian-process phase.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GpSettings {
    /// Random candidates scored per pick.
    pub n_candidates: usize,
    /// Observation noise added to the kernel diagonal.
    pub noise_variance: f64,
}

impl Default for GpSettings {
    fn default() -> Self {
        Self {
            n_candidates: 1000,
            noise_variance: 1e-6,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Arm {
    name: String,
    params: ParamMap,
    values: Option<ObjectiveValues>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct EngineTrial {
    index: u64,
    arms: Vec<Arm>,
}

impl EngineTrial {
    fn state(&self) -> TrialState {
        if self.arms.iter().all(|a| a.values.is_some()) {
            TrialState::Complete
        } else {
            TrialState::Running
        }
    }
}

/// Everything that survives a snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct EngineState {
    version: u32,
    experiment: Experiment,
    strategy: GenerationStrategy,
    /// Arms drawn per strategy step.
    step_draws: Vec<usize>,
    /// Next position in the Sobol sequence.
    sobol_index: u64,
    /// Seed for the GP candidate search.
    seed: u64,
    enforce_constraints: bool,
    gp: GpSettings,
    trials: Vec<EngineTrial>,
    /// Lowest index the next trial may take.
    #[serde(default)]
    index_floor: u64,
}

/// Sobol + Gaussian-process [`Engine`].
///
/// The whole state serializes to JSON, so a restored engine continues the
/// Sobol sequence where the saved one stopped.
pub struct NativeEngine {
    state: EngineState,
    constraints: Vec<LinearConstraint>,
    rng: Mutex<fastrand::Rng>,
}

impl NativeEngine {
    /// Current GP settings.
    #[must_use]
    pub fn gp_settings(&self) -> GpSettings {
        self.state.gp
    }

    /// Replace the GP settings.
    #[must_use]
    pub fn with_gp_settings(mut self, settings: GpSettings) -> Self {
        self.state.gp = settings;
        self
    }

    /// The declared experiment.
    #[must_use]
    pub fn experiment(&self) -> &Experiment {
        &self.state.experiment
    }

    /// The active generation strategy, with every Sobol seed resolved.
    #[must_use]
    pub fn strategy(&self) -> &GenerationStrategy {
        &self.state.strategy
    }

    fn from_state(state: EngineState) -> Result<Self> {
        let constraints = parse_constraints(&state.experiment)?;
        let drawn: usize = state.step_draws.iter().sum();
        let rng = fastrand::Rng::with_seed(state.seed ^ drawn as u64);
        Ok(Self {
            state,
            constraints,
            rng: Mutex::new(rng),
        })
    }

    fn parameters(&self) -> &[ParameterDef] {
        &self.state.experiment.parameters
    }

    /// Map a unit-cube point to parameter values.
    fn params_from_unit(&self, point: &[f64]) -> ParamMap {
        self.parameters()
            .iter()
            .zip(point)
            .map(|(def, &u)| (def.name.clone(), scale_to_bounds(def, u)))
            .collect()
    }

    /// Map parameter values into the unit cube. Values outside the bounds
    /// are clamped.
    fn unit_from_params(&self, params: &ParamMap) -> Vec<f64> {
        self.parameters()
            .iter()
            .map(|def| {
                let (lo, hi) = def.bounds.unwrap_or((0.0, 1.0));
                let v = params.get(&def.name).copied().unwrap_or(lo);
                if (hi - lo).abs() < 1e-15 {
                    0.5
                } else {
                    ((v - lo) / (hi - lo)).clamp(0.0, 1.0)
                }
            })
            .collect()
    }

    fn is_feasible(&self, params: &ParamMap) -> bool {
        !self.state.enforce_constraints || self.constraints.iter().all(|c| c.is_satisfied(params))
    }

    /// Check a parameter set supplied from outside.
    fn validate_params(&self, params: &ParamMap) -> Result<()> {
        for def in self.parameters() {
            let Some(&value) = params.get(&def.name) else {
                return Err(Error::InvalidParameter {
                    name: def.name.clone(),
                    reason: "value missing".to_string(),
                });
            };
            if !value.is_finite() {
                return Err(Error::InvalidParameter {
                    name: def.name.clone(),
                    reason: format!("value {value} is not finite"),
                });
            }
            if self.state.enforce_constraints
                && let Some((lo, hi)) = def.bounds
                && !(lo..=hi).contains(&value)
            {
                return Err(Error::InvalidParameter {
                    name: def.name.clone(),
                    reason: format!("value {value} outside [{lo}, {hi}]"),
                });
            }
        }
        if let Some(unknown) = params
            .keys()
            .find(|k| !self.parameters().iter().any(|d| &d.name == *k))
        {
            return Err(Error::InvalidParameter {
                name: unknown.clone(),
                reason: "not a declared parameter".to_string(),
            });
        }
        if self.state.enforce_constraints
            && let Some(violated) = self.constraints.iter().find(|c| !c.is_satisfied(params))
        {
            return Err(Error::ConstraintViolated(violated.source().to_string()));
        }
        Ok(())
    }

    /// Check a set of objective values before recording it.
    fn validate_values(&self, values: &ObjectiveValues) -> Result<()> {
        let objectives = &self.state.experiment.objectives;
        if let Some(unknown) = values.keys().find(|k| !objectives.iter().any(|o| &o.name == *k)) {
            return Err(Error::ObjectiveMismatch(format!(
                "'{unknown}' is not a declared objective"
            )));
        }
        for objective in objectives {
            match values.get(&objective.name) {
                Some(v) if v.is_finite() => {}
                Some(v) => {
                    return Err(Error::ObjectiveMismatch(format!(
                        "value {v} for '{}' is not finite",
                        objective.name
                    )));
                }
                None => {
                    return Err(Error::ObjectiveMismatch(format!(
                        "missing value for '{}'",
                        objective.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// The first step with quota left and how many more arms it may draw.
    fn current_step(&self) -> Result<(usize, Option<usize>)> {
        self.state
            .strategy
            .steps
            .iter()
            .enumerate()
            .find_map(|(i, step)| {
                let drawn = self.state.step_draws.get(i).copied().unwrap_or(0);
                match step.num_trials {
                    None => Some((i, None)),
                    Some(quota) if drawn < quota => Some((i, Some(quota - drawn))),
                    Some(_) => None,
                }
            })
            .ok_or(Error::StrategyExhausted)
    }

    fn draw_sobol(&mut self, seed: u64) -> Result<ParamMap> {
        let sequence = SobolSequence::with_seed(seed);
        let dims = self.parameters().len();
        for _ in 0..MAX_SOBOL_REJECTIONS {
            let point = sequence.point(self.state.sobol_index, dims)?;
            self.state.sobol_index += 1;
            let params = self.params_from_unit(&point);
            if self.is_feasible(&params) {
                return Ok(params);
            }
        }
        Err(Error::InvalidSearchSpace(
            "no Sobol point satisfies the parameter constraints".to_string(),
        ))
    }

    /// Propose `n` arms from the GP. Running arms and `pending` count as
    /// observations at the current best value.
    fn propose_gp(&self, n: usize, pending: &[ParamMap]) -> Result<Vec<ParamMap>> {
        let completed: Vec<(&ParamMap, &ObjectiveValues)> = self
            .state
            .trials
            .iter()
            .flat_map(|t| &t.arms)
            .filter_map(|a| a.values.as_ref().map(|v| (&a.params, v)))
            .collect();
        if completed.is_empty() {
            return Err(Error::DataRequired);
        }

        let mut y_train = scalarize(&self.state.experiment, &completed);
        let mut x_train: Vec<Vec<f64>> =
            completed.iter().map(|(p, _)| self.unit_from_params(p)).collect();

        let liar = y_train.iter().copied().fold(f64::INFINITY, f64::min);
        let running = self
            .state
            .trials
            .iter()
            .flat_map(|t| &t.arms)
            .filter(|a| a.values.is_none())
            .map(|a| &a.params);
        for params in running.chain(pending) {
            x_train.push(self.unit_from_params(params));
            y_train.push(liar);
        }

        let search = Search {
            n_candidates: self.state.gp.n_candidates,
            noise_variance: self.state.gp.noise_variance,
        };
        let picks = {
            let mut rng = self.rng.lock();
            gp::propose_batch(&x_train, &y_train, n, search, &mut rng, |u| {
                self.is_feasible(&self.params_from_unit(u))
            })?
        };
        Ok(picks.iter().map(|u| self.params_from_unit(u)).collect())
    }

    /// Draw `n` arms following the generation strategy. Leaves the engine
    /// untouched on error.
    fn generate(&mut self, n: usize) -> Result<Vec<ParamMap>> {
        if n == 0 {
            return Err(Error::EmptyRequest);
        }
        let saved = (self.state.sobol_index, self.state.step_draws.clone());
        let result = self.generate_inner(n);
        if result.is_err() {
            (self.state.sobol_index, self.state.step_draws) = saved;
        }
        result
    }

    fn generate_inner(&mut self, n: usize) -> Result<Vec<ParamMap>> {
        let mut out: Vec<ParamMap> = Vec::with_capacity(n);
        while out.len() < n {
            let (step, quota) = self.current_step()?;
            let take = quota.map_or(n - out.len(), |q| q.min(n - out.len()));
            match self.state.strategy.steps[step].model {
                Model::Sobol { seed } => {
                    let seed = seed.unwrap_or(self.state.seed);
                    trace_debug!(step, take, seed, "drawing Sobol arms");
                    for _ in 0..take {
                        let params = self.draw_sobol(seed)?;
                        out.push(params);
                    }
                }
                Model::Gp => {
                    trace_debug!(step, take, "proposing GP arms");
                    let picks = self.propose_gp(take, &out)?;
                    out.extend(picks);
                }
            }
            self.state.step_draws[step] += take;
        }
        Ok(out)
    }

    fn next_index(&self) -> u64 {
        self.state
            .trials
            .iter()
            .map(|t| t.index + 1)
            .max()
            .unwrap_or(0)
            .max(self.state.index_floor)
    }

    fn find_arm_mut(&mut self, id: &TrialId) -> Result<&mut Arm> {
        match id {
            TrialId::Index(index) => {
                let trial = self
                    .state
                    .trials
                    .iter_mut()
                    .find(|t| t.index == *index)
                    .ok_or_else(|| Error::UnknownTrial(id.to_string()))?;
                match trial.arms.as_mut_slice() {
                    [arm] => Ok(arm),
                    _ => Err(Error::UnknownTrial(format!(
                        "{index} (batch trial, complete its arms by label)"
                    ))),
                }
            }
            TrialId::Arm(label) => self
                .state
                .trials
                .iter_mut()
                .flat_map(|t| t.arms.iter_mut())
                .find(|a| &a.name == label)
                .ok_or_else(|| Error::UnknownTrial(label.clone())),
        }
    }
}

impl Engine for NativeEngine {
    fn declare(experiment: Experiment, strategy: GenerationStrategy) -> Result<Self> {
        validate_experiment(&experiment)?;
        let strategy = resolve_seeds(strategy);
        let seed = first_sobol_seed(&strategy).unwrap_or_else(|| fastrand::u64(..));
        trace_info!(
            name = %experiment.name,
            parameters = experiment.parameters.len(),
            objectives = experiment.objectives.len(),
            steps = strategy.steps.len(),
            "experiment declared"
        );
        Self::from_state(EngineState {
            version: SNAPSHOT_VERSION,
            step_draws: vec![0; strategy.steps.len()],
            experiment,
            strategy,
            sobol_index: 0,
            seed,
            enforce_constraints: true,
            gp: GpSettings::default(),
            trials: Vec::new(),
            index_floor: 0,
        })
    }

    fn attach_trial(&mut self, params: &ParamMap) -> Result<TrialId> {
        self.validate_params(params)?;
        let index = self.next_index();
        self.state.trials.push(EngineTrial {
            index,
            arms: vec![Arm {
                name: format!("{index}_0"),
                params: params.clone(),
                values: None,
            }],
        });
        trace_debug!(index, "trial attached");
        Ok(TrialId::Index(index))
    }

    fn complete_trial(&mut self, id: &TrialId, values: &ObjectiveValues) -> Result<()> {
        self.validate_values(values)?;
        let arm = self.find_arm_mut(id)?;
        arm.values = Some(values.clone());
        trace_debug!(trial = %id, "trial completed");
        Ok(())
    }

    fn next_trials(&mut self, n: usize) -> Result<Vec<(TrialId, ParamMap)>> {
        let arms = self.generate(n)?;
        let mut out = Vec::with_capacity(arms.len());
        for params in arms {
            let index = self.next_index();
            self.state.trials.push(EngineTrial {
                index,
                arms: vec![Arm {
                    name: format!("{index}_0"),
                    params: params.clone(),
                    values: None,
                }],
            });
            out.push((TrialId::Index(index), params));
        }
        trace_info!(count = out.len(), "generated trials");
        Ok(out)
    }

    fn generate_batch(&mut self, n: usize) -> Result<Vec<(TrialId, ParamMap)>> {
        let arms = self.generate(n)?;
        let index = self.next_index();
        let arms: Vec<Arm> = arms
            .into_iter()
            .enumerate()
            .map(|(j, params)| Arm {
                name: format!("{index}_{j}"),
                params,
                values: None,
            })
            .collect();
        let out = arms
            .iter()
            .map(|a| (TrialId::Arm(a.name.clone()), a.params.clone()))
            .collect();
        trace_info!(index, arms = arms.len(), "generated batch trial");
        self.state.trials.push(EngineTrial { index, arms });
        Ok(out)
    }

    fn set_generation_strategy(&mut self, strategy: GenerationStrategy) {
        let strategy = resolve_seeds(strategy);
        self.state.step_draws = vec![0; strategy.steps.len()];
        self.state.strategy = strategy;
    }

    fn set_constraint_enforcement(&mut self, enabled: bool) -> bool {
        core::mem::replace(&mut self.state.enforce_constraints, enabled)
    }

    fn clear_trials(&mut self) {
        self.state.trials.clear();
        self.state.index_floor = 0;
    }

    fn reserve_trial_indices(&mut self, next: u64) {
        self.state.index_floor = self.state.index_floor.max(next);
    }

    fn trials(&self) -> Vec<TrialSummary> {
        self.state
            .trials
            .iter()
            .map(|t| TrialSummary {
                index: t.index,
                state: t.state(),
                arms: t
                    .arms
                    .iter()
                    .map(|a| ArmSummary {
                        name: a.name.clone(),
                        params: a.params.clone(),
                    })
                    .collect(),
            })
            .collect()
    }

    fn snapshot(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(&self.state).map_err(|e| Error::Snapshot(e.to_string()))
    }

    fn restore(bytes: &[u8]) -> Result<Self> {
        let state: EngineState =
            serde_json::from_slice(bytes).map_err(|e| Error::Snapshot(e.to_string()))?;
        if state.version != SNAPSHOT_VERSION {
            return Err(Error::Snapshot(format!(
                "unsupported snapshot version {}",
                state.version
            )));
        }
        if state.step_draws.len() != state.strategy.steps.len() {
            return Err(Error::Snapshot(
                "step counters do not match the generation strategy".to_string(),
            ));
        }
        validate_experiment(&state.experiment)?;
        trace_info!(trials = state.trials.len(), "engine restored");
        Self::from_state(state)
    }
}

fn validate_experiment(experiment: &Experiment) -> Result<()> {
    if experiment.parameters.is_empty() {
        return Err(Error::InvalidSearchSpace("no parameters declared".to_string()));
    }
    for (i, def) in experiment.parameters.iter().enumerate() {
        if experiment.parameters[..i].iter().any(|d| d.name == def.name) {
            return Err(Error::InvalidSearchSpace(format!(
                "duplicate parameter '{}'",
                def.name
            )));
        }
        let Some((lo, hi)) = def.bounds else {
            return Err(Error::InvalidParameter {
                name: def.name.clone(),
                reason: "bounds missing".to_string(),
            });
        };
        if !lo.is_finite() || !hi.is_finite() || lo > hi {
            return Err(Error::InvalidParameter {
                name: def.name.clone(),
                reason: format!("invalid bounds [{lo}, {hi}]"),
            });
        }
        if def.value_type == ValueType::Int && lo.ceil() > hi.floor() {
            return Err(Error::InvalidParameter {
                name: def.name.clone(),
                reason: format!("no integer within [{lo}, {hi}]"),
            });
        }
    }
    if experiment.objectives.is_empty() {
        return Err(Error::InvalidSearchSpace("no objectives declared".to_string()));
    }
    for (i, objective) in experiment.objectives.iter().enumerate() {
        if experiment.objectives[..i].iter().any(|o| o.name == objective.name) {
            return Err(Error::InvalidSearchSpace(format!(
                "duplicate objective '{}'",
                objective.name
            )));
        }
    }
    parse_constraints(experiment).map(|_| ())
}

fn parse_constraints(experiment: &Experiment) -> Result<Vec<LinearConstraint>> {
    let names: Vec<&str> = experiment.parameters.iter().map(|d| d.name.as_str()).collect();
    experiment
        .constraints
        .iter()
        .map(|c| LinearConstraint::parse(c.as_str(), &names))
        .collect()
}

/// Give every unseeded Sobol step a random seed.
fn resolve_seeds(strategy: GenerationStrategy) -> GenerationStrategy {
    GenerationStrategy {
        steps: strategy
            .steps
            .into_iter()
            .map(|step| match step.model {
                Model::Sobol { seed: None } => GenerationStep {
                    model: Model::Sobol {
                        seed: Some(fastrand::u64(..)),
                    },
                    ..step
                },
                _ => step,
            })
            .collect(),
    }
}

fn first_sobol_seed(strategy: &GenerationStrategy) -> Option<u64> {
    strategy.steps.iter().find_map(|step| match step.model {
        Model::Sobol { seed } => seed,
        Model::Gp => None,
    })
}

/// Map a unit value onto the bounds of `def`, honoring its value type and
/// rounding precision.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss
)]
fn scale_to_bounds(def: &ParameterDef, u: f64) -> f64 {
    let (lo, hi) = def.bounds.unwrap_or((0.0, 1.0));
    match def.value_type {
        ValueType::Int => {
            let (lo, hi) = (lo.ceil(), hi.floor());
            let range = hi - lo + 1.0;
            (lo + (u * range).floor()).min(hi)
        }
        ValueType::Float => {
            let v = lo + u * (hi - lo);
            match def.digits {
                Some(d) => {
                    let factor = 10f64.powi(d.min(15) as i32);
                    ((v * factor).round() / factor).clamp(lo, hi)
                }
                None => v,
            }
        }
    }
}

/// Reduce every arm's objective values to one target to minimize: the sum
/// of direction-signed standardized objective values.
#[allow(clippy::cast_precision_loss)]
fn scalarize(experiment: &Experiment, arms: &[(&ParamMap, &ObjectiveValues)]) -> Vec<f64> {
    let n = arms.len() as f64;
    let mut y = vec![0.0; arms.len()];
    for objective in &experiment.objectives {
        let column: Vec<f64> = arms
            .iter()
            .map(|(_, v)| v.get(&objective.name).copied().unwrap_or(0.0))
            .collect();
        let mean = column.iter().sum::<f64>() / n;
        let std = (column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
        let std = if std > 1e-12 { std } else { 1.0 };
        let sign = if objective.minimize { 1.0 } else { -1.0 };
        for (target, v) in y.iter_mut().zip(&column) {
            *target += sign * (v - mean) / std;
        }
    }
    y
}
