use seqdesign::prelude::*;

/// Records every call instead of optimizing.
#[derive(Default)]
struct RecordingEngine {
    attached: Vec<ParamMap>,
    completed: Vec<(TrialId, ObjectiveValues)>,
    reserved: Option<u64>,
    enforcing: bool,
    enforcement_history: Vec<bool>,
    /// Attaching a trial with this `temp` fails.
    fail_on: Option<f64>,
}

impl Engine for RecordingEngine {
    fn declare(_: Experiment, _: GenerationStrategy) -> Result<Self> {
        Ok(Self {
            enforcing: true,
            ..Self::default()
        })
    }

    fn attach_trial(&mut self, params: &ParamMap) -> Result<TrialId> {
        if self.fail_on.is_some() && params.get("temp").copied() == self.fail_on {
            return Err(Error::ConstraintViolated("temp <= 1".to_string()));
        }
        self.attached.push(params.clone());
        Ok(TrialId::Index(self.attached.len() as u64 - 1))
    }

    fn complete_trial(&mut self, id: &TrialId, values: &ObjectiveValues) -> Result<()> {
        self.completed.push((id.clone(), values.clone()));
        Ok(())
    }

    fn next_trials(&mut self, _: usize) -> Result<Vec<(TrialId, ParamMap)>> {
        Err(Error::DataRequired)
    }

    fn generate_batch(&mut self, _: usize) -> Result<Vec<(TrialId, ParamMap)>> {
        Err(Error::DataRequired)
    }

    fn set_generation_strategy(&mut self, _: GenerationStrategy) {}

    fn set_constraint_enforcement(&mut self, enabled: bool) -> bool {
        self.enforcement_history.push(enabled);
        core::mem::replace(&mut self.enforcing, enabled)
    }

    fn clear_trials(&mut self) {
        self.attached.clear();
        self.completed.clear();
        self.reserved = None;
    }

    fn reserve_trial_indices(&mut self, next: u64) {
        self.reserved = Some(next);
    }

    fn trials(&self) -> Vec<TrialSummary> {
        Vec::new()
    }

    fn snapshot(&self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn restore(_: &[u8]) -> Result<Self> {
        Ok(Self::default())
    }
}

fn config() -> ExperimentConfig {
    ExperimentConfig {
        parameters: vec![
            ParameterDef::new("temp", 0.0, 10.0).digits(1),
            ParameterDef::new("time", 1.0, 5.0).digits(0),
        ],
        objectives: vec![
            ObjectiveDef::new("yield", false),
            ObjectiveDef::new("cost", true),
        ],
        ..ExperimentConfig::default()
    }
}

fn row(cells: &[(&str, Cell)]) -> std::collections::BTreeMap<String, Cell> {
    cells
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

fn ledger(rows: &[std::collections::BTreeMap<String, Cell>]) -> Ledger {
    let mut ledger = MemoryLedgerStore::new().load(&config()).unwrap();
    for cells in rows {
        ledger.push_row(cells);
    }
    ledger
}

fn engine() -> RecordingEngine {
    RecordingEngine::declare(
        Experiment::from_config("recording", &config()),
        GenerationStrategy::model_only(),
    )
    .unwrap()
}

#[test]
fn rows_with_missing_parameters_are_never_attached() {
    let ledger = ledger(&[
        row(&[("temp", Cell::Number(1.0)), ("trial_index", Cell::Number(0.0))]),
        row(&[
            ("temp", Cell::Number(2.0)),
            ("time", Cell::Number(3.0)),
            ("trial_index", Cell::Number(1.0)),
        ]),
    ]);
    let mut engine = engine();
    let report = replay_ledger(&mut engine, &ledger, &config()).unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.attached, 1);
    assert_eq!(engine.attached.len(), 1);
    assert_eq!(engine.attached[0]["temp"], 2.0);
    assert!(!report.ids.contains_key(&TrialId::Index(0)));
    assert_eq!(report.engine_id(&TrialId::Index(1)), Some(TrialId::Index(0)));
}

#[test]
fn skipped_rows_keep_their_identifier_out_of_reach() {
    let ledger = ledger(&[
        row(&[("trial_index", Cell::Number(0.0))]),
        row(&[
            ("temp", Cell::Number(5.0)),
            ("time", Cell::Number(2.0)),
            ("yield", Cell::Number(1.0)),
            ("cost", Cell::Number(1.0)),
            ("trial_index", Cell::Number(1.0)),
        ]),
        row(&[
            ("temp", Cell::Number(6.0)),
            ("time", Cell::Number(2.0)),
            ("trial_index", Cell::Text("4_1".to_string())),
        ]),
    ]);
    let mut engine = engine();
    let report = replay_ledger(&mut engine, &ledger, &config()).unwrap();

    assert_eq!(report.engine_id(&TrialId::Index(0)), None);
    assert_eq!(report.engine_id(&TrialId::Index(1)), Some(TrialId::Index(0)));
    assert_eq!(
        report.engine_id(&TrialId::Arm("4_1".to_string())),
        Some(TrialId::Index(1))
    );
    // Identifiers issued after the replay resolve to themselves.
    assert_eq!(report.engine_id(&TrialId::Index(5)), Some(TrialId::Index(5)));
    assert_eq!(engine.reserved, Some(5));
}

#[test]
fn ledger_without_identifiers_reserves_nothing() {
    let ledger = ledger(&[row(&[("temp", Cell::Number(1.0)), ("time", Cell::Number(2.0))])]);
    let mut engine = engine();
    replay_ledger(&mut engine, &ledger, &config()).unwrap();
    assert_eq!(engine.reserved, None);
}

#[test]
fn parameters_are_floored_to_one_decimal() {
    let ledger = ledger(&[row(&[
        ("temp", Cell::Number(5.37)),
        ("time", Cell::Number(2.99)),
    ])]);
    let mut engine = engine();
    replay_ledger(&mut engine, &ledger, &config()).unwrap();
    assert_eq!(engine.attached[0]["temp"], 5.3);
    assert_eq!(engine.attached[0]["time"], 2.9);
}

#[test]
fn resolved_rows_complete_with_exact_recorded_values() {
    let ledger = ledger(&[row(&[
        ("temp", Cell::Number(1.25)),
        ("time", Cell::Number(2.0)),
        ("yield", Cell::Number(0.123_456_789)),
        ("cost", Cell::Number(-4.5)),
        ("trial_index", Cell::Text("0_0".to_string())),
    ])]);
    let mut engine = engine();
    let report = replay_ledger(&mut engine, &ledger, &config()).unwrap();

    assert_eq!(report.completed, 1);
    let (id, values) = &engine.completed[0];
    assert_eq!(id, &TrialId::Index(0));
    assert_eq!(values["yield"], 0.123_456_789);
    assert_eq!(values["cost"], -4.5);
    assert_eq!(values.len(), 2);
    assert_eq!(
        report.engine_id(&TrialId::Arm("0_0".to_string())),
        Some(TrialId::Index(0))
    );
}

#[test]
fn completion_policy_partial_objectives_leave_trial_pending() {
    let ledger = ledger(&[row(&[
        ("temp", Cell::Number(1.0)),
        ("time", Cell::Number(2.0)),
        ("yield", Cell::Number(3.0)),
    ])]);
    let mut engine = engine();
    let report = replay_ledger(&mut engine, &ledger, &config()).unwrap();

    assert_eq!(report.attached, 1);
    assert_eq!(report.completed, 0);
    assert!(engine.completed.is_empty());
}

#[test]
fn enforcement_is_disabled_during_replay_and_restored() {
    let ledger = ledger(&[row(&[("temp", Cell::Number(99.0)), ("time", Cell::Number(9.0))])]);
    let mut engine = engine();
    replay_ledger(&mut engine, &ledger, &config()).unwrap();
    assert_eq!(engine.enforcement_history, [false, true]);
    assert!(engine.enforcing);
}

#[test]
fn enforcement_is_restored_when_replay_fails() {
    let ledger = ledger(&[
        row(&[("temp", Cell::Number(1.0)), ("time", Cell::Number(2.0))]),
        row(&[("temp", Cell::Number(4.0)), ("time", Cell::Number(2.0))]),
    ]);
    let mut engine = engine();
    engine.fail_on = Some(4.0);
    let err = replay_ledger(&mut engine, &ledger, &config()).unwrap_err();
    assert!(matches!(err, Error::ConstraintViolated(_)));
    assert!(engine.enforcing);
    assert_eq!(engine.enforcement_history, [false, true]);
}

#[test]
fn text_in_a_parameter_cell_is_an_error() {
    let ledger = ledger(&[row(&[
        ("temp", Cell::Text("warm".to_string())),
        ("time", Cell::Number(2.0)),
    ])]);
    let mut engine = engine();
    let err = replay_ledger(&mut engine, &ledger, &config()).unwrap_err();
    assert!(matches!(err, Error::InvalidCell { .. }));
    assert!(engine.enforcing);
}
