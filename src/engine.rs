//! Build Engine
//!
//! Main entry point for the build driver. Ties together the rule-file
//! parser, the expression evaluator, and the scheduler: loading a rule
//! file folds the globals and compiles the head patterns; running a
//! build walks the four driver phases (realize the graph, run the
//! producers, quarantine incomplete outputs, re-analyze for the
//! pretend-up-to-date mtime rewind).

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::build::graph::add_target;
use crate::build::producer::produce;
use crate::build::state::{BuildState, LockTable};
use crate::errors::{ProduceError, Result};
use crate::expr::{Env, Evaluator, ExprEvaluator, Value};
use crate::rules::{fold_globals, parse_rulefile, RuleSet};
use crate::words;

/// Options for a build run.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Rule file path.
    pub file: PathBuf,
    /// Recipe parallelism.
    pub jobs: usize,
    /// Rebuild everything reached, fresh or not.
    pub always_build: bool,
    /// Echo recipes without executing anything.
    pub dry_run: bool,
    /// Do not echo recipes.
    pub silent: bool,
    /// Paths to treat as fresh this run, with a compensating mtime
    /// rewind so the next run still sees downstream staleness.
    pub pretend_up_to_date: Vec<String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            file: PathBuf::from("produce.ini"),
            jobs: 1,
            always_build: false,
            dry_run: false,
            silent: false,
            pretend_up_to_date: Vec::new(),
        }
    }
}

impl BuildOptions {
    pub fn pretended(&self, target: &str) -> bool {
        self.pretend_up_to_date.iter().any(|p| p == target)
    }
}

/// The build engine: compiled rules, the globals environment, and the
/// scheduler state shared by every producer.
pub struct Engine {
    pub options: BuildOptions,
    pub rules: RuleSet,
    pub globals: Env,
    evaluator: Box<dyn Evaluator>,
    state: Mutex<BuildState>,
    pub locks: LockTable,
    pub jobs: Semaphore,
}

impl Engine {
    /// Read and compile the configured rule file.
    pub fn load(options: BuildOptions) -> Result<Arc<Engine>> {
        let text = std::fs::read_to_string(&options.file).map_err(|e| {
            ProduceError::Config(format!(
                "cannot read rule file '{}': {}",
                options.file.display(),
                e
            ))
        })?;
        Self::from_text(&text, options)
    }

    /// Compile rule-file text.
    pub fn from_text(text: &str, options: BuildOptions) -> Result<Arc<Engine>> {
        let file_name = options.file.display().to_string();
        let parsed = parse_rulefile(&file_name, text)?;
        let evaluator: Box<dyn Evaluator> = Box::new(ExprEvaluator::new());
        let globals = fold_globals(&parsed.globals, evaluator.as_ref())?;
        let rules = RuleSet::compile(&parsed.rules, &globals, evaluator.as_ref())?;
        debug!(rules = rules.rules.len(), globals = globals.len(), "rule file compiled");
        let jobs = Semaphore::new(options.jobs.max(1));
        Ok(Arc::new(Engine {
            options,
            rules,
            globals,
            evaluator,
            state: Mutex::new(BuildState::default()),
            locks: LockTable::new(),
            jobs,
        }))
    }

    pub fn evaluator(&self) -> &dyn Evaluator {
        self.evaluator.as_ref()
    }

    /// The scheduler state, ignoring poisoning: critical sections only
    /// touch plain maps and sets.
    pub fn state(&self) -> MutexGuard<'_, BuildState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Requested targets: the command line, or the `default` global
    /// split shell-style.
    pub fn requested_targets(&self, cli: &[String]) -> Result<Vec<String>> {
        if !cli.is_empty() {
            return Ok(cli.to_vec());
        }
        let default = self.globals.get("default").ok_or_else(|| {
            ProduceError::Config(
                "no targets requested and no 'default' global is set".to_string(),
            )
        })?;
        let targets = match default {
            Value::Str(text) => words::split_quoted(text)?,
            Value::List(items) => items.iter().map(|v| v.to_string()).collect(),
            other => vec![other.to_string()],
        };
        if targets.is_empty() {
            return Err(ProduceError::Config(
                "the 'default' global names no targets".to_string(),
            ));
        }
        Ok(targets)
    }

    /// Run a build of the given targets. Returns whether any recipe ran.
    pub async fn run(self: Arc<Self>, targets: &[String]) -> Result<bool> {
        let result = run_phases(&self, targets).await;

        // Quarantine runs even when the build failed: anything still in
        // the incomplete set must not survive under its original name.
        let quarantined = self.quarantine();
        let rewound = rewind(&self, targets).await;

        match result {
            Ok(built) => {
                quarantined?;
                rewound?;
                if !built {
                    println!("all targets are up to date");
                }
                Ok(built)
            }
            Err(err) => {
                if let Err(qe) = quarantined {
                    debug!(error = %qe, "quarantine after failed build");
                }
                if let Err(re) = rewound {
                    debug!(error = %re, "rewind after failed build");
                }
                Err(err)
            }
        }
    }

    /// Phase 3: rename every still-incomplete output to `<path>~`,
    /// silently tolerating absence.
    fn quarantine(&self) -> Result<()> {
        let paths: Vec<String> = {
            let mut st = self.state();
            st.incomplete.drain().collect()
        };
        let mut first_err: Option<ProduceError> = None;
        for path in paths {
            let backup = format!("{}~", path);
            match std::fs::rename(&path, &backup) {
                Ok(()) => debug!(path = %path, "quarantined incomplete output"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path, error = %e, "cannot quarantine incomplete output");
                    first_err.get_or_insert(ProduceError::io(&path, e));
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Phases 1 and 2: realize the graph from the requested roots, then run
/// one producer per root and join them. Ctrl-C resolves the build with
/// an error; in-flight recipes inherit the terminal signal naturally.
async fn run_phases(engine: &Arc<Engine>, targets: &[String]) -> Result<bool> {
    for target in targets {
        add_target(engine, target, &[]).await?;
    }

    let mut handles = Vec::with_capacity(targets.len());
    for target in targets {
        handles.push(tokio::spawn(produce(engine.clone(), target.clone(), 0)));
    }

    let join_all = async {
        let mut built = false;
        let mut first_err: Option<ProduceError> = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(ran)) => built |= ran,
                Ok(Err(err)) => {
                    first_err.get_or_insert(err);
                }
                Err(join_err) => {
                    first_err.get_or_insert(ProduceError::Internal(format!(
                        "producer panicked: {}",
                        join_err
                    )));
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(built),
        }
    };

    tokio::select! {
        result = join_all => result,
        _ = interrupted() => Err(ProduceError::Interrupted),
    }
}

async fn interrupted() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {}
        // No signal handler available; never resolve.
        Err(_) => std::future::pending().await,
    }
}

/// Phase 4: re-run the analysis against the post-build filesystem so the
/// staleness-preserving touch fires for pretended dependencies. The
/// realized set is cleared to bypass add-once deduplication.
async fn rewind(engine: &Arc<Engine>, targets: &[String]) -> Result<()> {
    if engine.options.pretend_up_to_date.is_empty() || engine.options.dry_run {
        return Ok(());
    }
    debug!("re-analyzing targets to preserve staleness");
    engine.state().targets.clear();
    let mut all: Vec<String> = targets.to_vec();
    for pretend in &engine.options.pretend_up_to_date {
        if !all.iter().any(|t| t == pretend) {
            all.push(pretend.clone());
        }
    }
    for target in &all {
        add_target(engine, target, &[]).await?;
    }
    Ok(())
}
