//! Graph Realization & Staleness
//!
//! `add_target` recursively realizes a target into the scheduler state:
//! instantiate its rule, detect cycles along the ancestor beam, realize
//! its dependencies, record its modification time, and decide whether it
//! is out of date. Re-running the analysis after the build (with the
//! realized set cleared) is what drives the pretend-up-to-date mtime
//! rewind.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::debug;

use crate::build::producer::produce;
use crate::build::state::{Mtime, TargetInfo, EPOCH};
use crate::build::BoxFuture;
use crate::engine::Engine;
use crate::errors::{ProduceError, Result};
use crate::rules::instantiate::{attr_deps, instantiate};

/// Realize `target` and everything below it. `beam` is the chain of
/// ancestors from the current root; meeting a beam entry again (as a
/// target or as a declared output) is a cyclic dependency.
pub fn add_target<'a>(
    engine: &'a Arc<Engine>,
    target: &'a str,
    beam: &'a [String],
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if beam.iter().any(|b| b == target) {
            let mut chain = beam.to_vec();
            chain.push(target.to_string());
            return Err(ProduceError::Cycle { chain });
        }
        if engine.state().targets.contains_key(target) {
            return Ok(());
        }

        debug!(target, depth = beam.len(), "realizing target");
        let irule = instantiate(target, &engine.rules, &engine.globals, engine.evaluator())?;
        let outputs = irule.outputs()?;
        for output in &outputs {
            if beam.iter().any(|b| b == output) {
                let mut chain = beam.to_vec();
                chain.push(target.to_string());
                chain.push(output.clone());
                return Err(ProduceError::Cycle { chain });
            }
        }

        let mut child_beam = beam.to_vec();
        child_beam.push(target.to_string());

        let mut ddeps: Vec<String> = Vec::new();
        if let Some(depfile) = irule.depfile().map(str::to_string) {
            // The depfile is itself a dependency, and it must be brought
            // up to date before its contents are read.
            ddeps.push(depfile.clone());
            add_target(engine, &depfile, &child_beam).await?;
            produce(engine.clone(), depfile.clone(), child_beam.len()).await?;
            // Producing the depfile may have rewritten it; its recorded
            // time predates that, and its out-of-date flag is already
            // cleared, so the staleness loop below would otherwise see
            // a regenerated depfile as unchanged.
            refresh_mtime(engine, &depfile)?;
            ddeps.extend(read_depfile(&depfile, engine.options.dry_run)?);
        }
        ddeps.extend(attr_deps(&irule)?);

        for dep in &ddeps {
            add_target(engine, dep, &child_beam).await?;
        }

        let is_file = irule.is_file();
        let disk_mtime = if is_file { file_mtime(target)? } else { None };
        let missing = is_file && disk_mtime.is_none();

        let mut out_of_date = engine.options.always_build || !is_file;
        let mut changed: Option<String> = None;
        let mtime;
        {
            let st = engine.state();
            let dep_time =
                |dep: &str| st.targets.get(dep).map(|info| info.mtime).unwrap_or(EPOCH);
            mtime = match disk_mtime {
                Some(t) => t,
                // A missing file inherits the newest dependency time, so
                // ordering above it stays intact; the `missing` flag is
                // what forces the rebuild.
                None if is_file => ddeps.iter().map(|d| dep_time(d)).max().unwrap_or(EPOCH),
                None => EPOCH,
            };
            for dep in &ddeps {
                let pretended = engine.options.pretended(dep);
                if st.out_of_date.contains(dep) && !pretended {
                    out_of_date = true;
                }
                if dep_time(dep) > mtime {
                    changed = Some(dep.clone());
                    if !pretended {
                        out_of_date = true;
                    }
                }
            }
        }

        debug!(target, out_of_date, missing, "staleness decided");
        {
            let mut st = engine.state();
            if out_of_date {
                st.out_of_date.insert(target.to_string());
            } else {
                st.out_of_date.remove(target);
            }
            if missing {
                st.missing.insert(target.to_string());
            } else {
                st.missing.remove(target);
            }
            match changed {
                Some(dep) => {
                    st.changed_ddep.insert(target.to_string(), dep);
                }
                None => {
                    st.changed_ddep.remove(target);
                }
            }
            st.targets.insert(
                target.to_string(),
                TargetInfo {
                    irule,
                    ddeps,
                    outputs,
                    mtime,
                },
            );
        }

        // A newer dependency recorded for a target that is nonetheless
        // not out of date can only be a pretended one. Push its mtime
        // past now so a future run still sees this target as stale.
        if !engine.options.dry_run {
            let rewind_dep = {
                let st = engine.state();
                if st.out_of_date.contains(target) {
                    None
                } else {
                    st.changed_ddep.get(target).cloned()
                }
            };
            if let Some(dep) = rewind_dep {
                advance_mtime(&dep)?;
                debug!(target, dep = %dep, "advanced dependency mtime to preserve staleness");
            }
        }
        Ok(())
    })
}

fn file_mtime(path: &str) -> Result<Option<Mtime>> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.modified().map_err(|e| ProduceError::io(path, e))?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ProduceError::io(path, e)),
    }
}

/// Re-stat a just-produced file target and update its recorded time,
/// which was taken before the recipe ran.
fn refresh_mtime(engine: &Engine, target: &str) -> Result<()> {
    if let Some(mtime) = file_mtime(target)? {
        let mut st = engine.state();
        if let Some(info) = st.targets.get_mut(target) {
            if info.irule.is_file() {
                info.mtime = mtime;
            }
        }
    }
    Ok(())
}

/// Set a file's mtime one second past now.
fn advance_mtime(path: &str) -> Result<()> {
    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| ProduceError::io(path, e))?;
    file.set_modified(SystemTime::now() + Duration::from_secs(1))
        .map_err(|e| ProduceError::io(path, e))
}

fn read_depfile(path: &str, dry_run: bool) -> Result<Vec<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect()),
        // In a dry run the depfile's recipe was only echoed, so the file
        // may legitimately not exist yet.
        Err(e) if dry_run && e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(ProduceError::Depfile {
            path: path.to_string(),
            message: e.to_string(),
        }),
    }
}
