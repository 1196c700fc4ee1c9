//! The interactive session.
//!
//! A [`Session`] owns everything one run of the program works with: the
//! configuration, the ledger store and the table loaded from it, the engine
//! [`Client`] and the snapshot file. Operator I/O goes through a [`Console`],
//! so the menu loop runs the same against a terminal and a scripted test.
//!
//! The table is reloaded from the store after every menu action.

use std::collections::VecDeque;
use std::io::{BufRead, Write};

use crate::client::{Client, Phase, SobolRequest};
use crate::config::ExperimentConfig;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::ledger::{Cell, Ledger};
use crate::storage::{LedgerStore, SnapshotFile};
use crate::types::{ObjectiveValues, ParamMap, TrialId};

const MENU: &str = "\nChoose an action:\n  1) Show data\n  2) Generate trials\n  3) Add outputs\n  0) Exit\n> ";

/// Line-based operator I/O.
pub trait Console {
    /// Show `prompt` and read one line without its terminator. `None` means
    /// the input is closed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if reading fails.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;

    /// Show a message on its own line.
    fn say(&mut self, text: &str);
}

/// [`Console`] on standard input and output.
#[derive(Debug, Default)]
pub struct StdConsole;

impl Console for StdConsole {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(prompt.as_bytes())?;
        stdout.flush()?;
        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn say(&mut self, text: &str) {
        println!("{text}");
    }
}

/// [`Console`] that replays canned input and records everything shown.
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    input: VecDeque<String>,
    output: String,
}

impl ScriptedConsole {
    #[must_use]
    pub fn new<I, S>(input: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            input: input.into_iter().map(Into::into).collect(),
            output: String::new(),
        }
    }

    /// Prompts and messages shown so far.
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }
}

impl Console for ScriptedConsole {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        self.output.push_str(prompt);
        Ok(self.input.pop_front())
    }

    fn say(&mut self, text: &str) {
        self.output.push_str(text);
        self.output.push('\n');
    }
}

/// Whether the menu loop goes on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// How many arms to generate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerateRequest {
    /// Declare the experiment with an initial Sobol phase and draw it as one
    /// batch.
    Sobol(SobolRequest),
    /// Draw from the current strategy; one arm uses the single-trial path,
    /// more use the batch path.
    Count(usize),
}

/// One run of the program.
pub struct Session<E, S> {
    config: ExperimentConfig,
    store: S,
    snapshot: SnapshotFile,
    ledger: Ledger,
    client: Client<E>,
}

impl<E: Engine, S: LedgerStore> Session<E, S> {
    /// Open a session, loading the ledger from `store`.
    ///
    /// # Errors
    ///
    /// Propagates ledger load errors.
    pub fn new(config: ExperimentConfig, store: S, snapshot: SnapshotFile) -> Result<Self> {
        let ledger = store.load(&config)?;
        Ok(Self {
            config,
            store,
            snapshot,
            ledger,
            client: Client::new(),
        })
    }

    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    #[must_use]
    pub fn client(&self) -> &Client<E> {
        &self.client
    }

    #[must_use]
    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Whether the next generation has to start with a Sobol phase: no engine
    /// is live, none was saved and no trial has been recorded yet.
    #[must_use]
    pub fn needs_sobol(&self) -> bool {
        self.client.engine().is_none() && !self.snapshot.exists() && !self.ledger.has_trial_index()
    }

    /// Reload the ledger from the store.
    ///
    /// # Errors
    ///
    /// Propagates ledger load errors.
    pub fn reload(&mut self) -> Result<()> {
        self.ledger = self.store.load(&self.config)?;
        Ok(())
    }

    fn engine(&mut self, sobol: Option<SobolRequest>) -> Result<&mut E> {
        self.client.ensure(&self.ledger, &self.config, sobol, &self.snapshot)
    }

    /// Generate arms, append them to the ledger and persist ledger and
    /// snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataRequired`] when the model phase has nothing to fit
    /// yet; the ledger is left unchanged in that case. When the first batch of
    /// a newly declared Sobol phase cannot be drawn, the engine and its
    /// snapshot are discarded, so the next attempt declares again.
    pub fn generate(&mut self, request: GenerateRequest) -> Result<Vec<(TrialId, ParamMap)>> {
        let arms = match request {
            GenerateRequest::Sobol(sobol) => self.generate_sobol(sobol)?,
            GenerateRequest::Count(0) => return Err(Error::EmptyRequest),
            GenerateRequest::Count(1) => self.engine(None)?.next_trials(1)?,
            GenerateRequest::Count(n) => self.engine(None)?.generate_batch(n)?,
        };
        for (id, params) in &arms {
            self.ledger.append_trial(params, id);
        }
        self.store.save(&self.ledger)?;
        self.save_snapshot()?;
        trace_info!(count = arms.len(), "trials appended to ledger");
        Ok(arms)
    }

    fn generate_sobol(&mut self, sobol: SobolRequest) -> Result<Vec<(TrialId, ParamMap)>> {
        let fresh = self.client.engine().is_none();
        let drawn = self.engine(Some(sobol))?.generate_batch(sobol.count);
        if drawn.is_err() && fresh && self.client.phase() == Phase::Sobol {
            self.client = Client::new();
            self.snapshot.remove()?;
        }
        drawn
    }

    /// Rows that carry a trial identifier but miss at least one objective.
    #[must_use]
    pub fn pending_rows(&self) -> Vec<usize> {
        let objectives = self.config.objective_names();
        self.ledger
            .rows_missing_any(&objectives)
            .into_iter()
            .filter(|&row| self.ledger.trial_id(row).is_some())
            .collect()
    }

    /// Write objective values into `row`, save the ledger and, once every
    /// objective of the row is recorded, complete the trial in the engine.
    ///
    /// Returns whether the trial was completed. Rows the engine holds no
    /// trial for, because the replay skipped them, are only written to the
    /// ledger.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTrial`] when the engine has no trial for the
    /// row; the values stay in the ledger.
    pub fn record_outputs(&mut self, row: usize, values: &ObjectiveValues) -> Result<bool> {
        for (name, value) in values {
            self.ledger.set(row, name, Cell::from(*value))?;
        }
        self.store.save(&self.ledger)?;

        let objectives = self.config.objective_names();
        let Some(resolved) = self.ledger.numeric_values(row, &objectives)? else {
            return Ok(false);
        };
        let Some(local) = self.ledger.trial_id(row) else {
            return Ok(false);
        };
        self.engine(None)?;
        let Some(id) = self.client.replay().engine_id(&local) else {
            trace_debug!(trial = %local, "row was not replayed, outputs kept in the ledger");
            return Ok(false);
        };
        let engine = self
            .client
            .engine_mut()
            .ok_or(Error::Internal("engine missing after ensure"))?;
        engine.complete_trial(&id, &resolved)?;
        trace_debug!(trial = %id, "outputs recorded");
        Ok(true)
    }

    fn save_snapshot(&self) -> Result<()> {
        match self.client.engine() {
            Some(engine) => self.snapshot.save(engine),
            None => Ok(()),
        }
    }

    /// Save everything and end the session. Returns the process exit code.
    ///
    /// # Errors
    ///
    /// Propagates persistence errors.
    pub fn exit(&mut self, console: &mut impl Console) -> Result<i32> {
        self.store.save(&self.ledger)?;
        self.save_snapshot()?;
        console.say("Data saved. Goodbye.");
        Ok(0)
    }

    /// Run the menu loop until the operator exits or input ends.
    ///
    /// # Errors
    ///
    /// Returns configuration, storage and engine errors other than the ones
    /// reported to the operator.
    pub fn run(&mut self, console: &mut impl Console) -> Result<i32> {
        loop {
            self.reload()?;
            let Some(choice) = console.read_line(MENU)? else {
                return self.exit(console);
            };
            let flow = match choice.trim() {
                "1" => self.show_data(console),
                "2" => self.generate_trials(console)?,
                "3" => self.add_outputs(console)?,
                "0" => return self.exit(console),
                other => {
                    console.say(&format!("Unknown choice '{other}'. Enter 1, 2, 3 or 0."));
                    Flow::Continue
                }
            };
            if flow == Flow::Exit {
                return self.exit(console);
            }
        }
    }

    fn show_data(&self, console: &mut impl Console) -> Flow {
        console.say(&self.ledger.to_string());
        match self.client.engine() {
            Some(engine) => {
                for trial in engine.trials() {
                    for arm in &trial.arms {
                        console.say(&format!(
                            "Trial {} [{}]: {} -> {}",
                            trial.index,
                            trial.state,
                            arm.name,
                            format_params(&arm.params)
                        ));
                    }
                }
            }
            None => console.say("The optimizer client is not loaded yet."),
        }
        Flow::Continue
    }

    fn generate_trials(&mut self, console: &mut impl Console) -> Result<Flow> {
        let request = if self.needs_sobol() {
            let Some(count) = prompt_count(console, "Number of Sobol trials: ")? else {
                return Ok(Flow::Exit);
            };
            let Some(seed) = prompt_seed(console)? else {
                return Ok(Flow::Exit);
            };
            GenerateRequest::Sobol(SobolRequest { seed, count })
        } else {
            let Some(count) = prompt_count(console, "Number of trials to generate: ")? else {
                return Ok(Flow::Exit);
            };
            GenerateRequest::Count(count)
        };

        match self.generate(request) {
            Ok(arms) => {
                console.say(&format!("Generated {} trial(s):", arms.len()));
                for (id, params) in &arms {
                    console.say(&format!("  {id}: {}", format_params(params)));
                }
            }
            Err(Error::DataRequired) => console.say(
                "No trial has recorded outputs yet. Add outputs (option 3) before \
                 requesting model-based trials.",
            ),
            Err(e) => return Err(e),
        }
        Ok(Flow::Continue)
    }

    fn add_outputs(&mut self, console: &mut impl Console) -> Result<Flow> {
        let pending = self.pending_rows();
        if pending.is_empty() {
            console.say("No trials are waiting for outputs.");
            return Ok(Flow::Continue);
        }

        let objectives: Vec<String> =
            self.config.objectives.iter().map(|o| o.name.clone()).collect();
        for row in pending {
            let label = self
                .ledger
                .trial_id(row)
                .map_or_else(String::new, |id| id.to_string());
            console.say(&format!("Trial {label}:"));
            let mut values = ObjectiveValues::new();
            for name in &objectives {
                if !self.ledger.get(row, name).is_missing() {
                    continue;
                }
                let Some(value) = prompt_f64(console, &format!("  {name}: "))? else {
                    return Ok(Flow::Exit);
                };
                values.insert(name.clone(), value);
            }
            match self.record_outputs(row, &values) {
                Ok(_) => {}
                Err(Error::UnknownTrial(id)) => console.say(&format!(
                    "Trial {id} is not known to the optimizer; outputs were saved to the ledger only."
                )),
                Err(e) => return Err(e),
            }
        }
        self.save_snapshot()?;
        Ok(Flow::Continue)
    }
}

fn format_params(params: &ParamMap) -> String {
    let fields: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{{{}}}", fields.join(", "))
}

/// Prompt until the operator enters a positive integer.
fn prompt_count(console: &mut impl Console, prompt: &str) -> Result<Option<usize>> {
    loop {
        let Some(line) = console.read_line(prompt)? else {
            return Ok(None);
        };
        match line.trim().parse::<usize>() {
            Ok(n) if n > 0 => return Ok(Some(n)),
            _ => console.say("Please enter a positive whole number."),
        }
    }
}

/// Prompt for an optional seed; blank means random. The outer `None` means
/// the input is closed.
fn prompt_seed(console: &mut impl Console) -> Result<Option<Option<u64>>> {
    loop {
        let Some(line) = console.read_line("Seed (blank for random): ")? else {
            return Ok(None);
        };
        let line = line.trim();
        if line.is_empty() {
            return Ok(Some(None));
        }
        match line.parse::<u64>() {
            Ok(seed) => return Ok(Some(Some(seed))),
            Err(_) => console.say("Please enter a whole number or leave it blank."),
        }
    }
}

/// Prompt until the operator enters a finite number. A decimal comma is
/// accepted.
fn prompt_f64(console: &mut impl Console, prompt: &str) -> Result<Option<f64>> {
    loop {
        let Some(line) = console.read_line(prompt)? else {
            return Ok(None);
        };
        match line.trim().replace(',', ".").parse::<f64>() {
            Ok(v) if v.is_finite() => return Ok(Some(v)),
            _ => console.say("Please enter a number."),
        }
    }
}
