//! Producers
//!
//! One producer per target drives its rebuild in four phases: take every
//! output lock in sorted order, re-check freshness under the state lock,
//! bring the direct dependencies up to date concurrently, then run the
//! recipe gated on the global parallelism bound. Failures are memoized
//! per output so every producer waiting on the same output fails
//! identically without redoing work.

use std::io::Write;
use std::sync::Arc;

use tracing::debug;

use crate::build::state::{Outcome, TargetInfo};
use crate::build::BoxFuture;
use crate::engine::Engine;
use crate::errors::{ProduceError, Result};

/// Bring one target up to date. Returns whether a recipe ran (in dry
/// run: would have run).
pub fn produce(engine: Arc<Engine>, target: String, depth: usize) -> BoxFuture<'static, Result<bool>> {
    Box::pin(async move {
        let info = engine
            .state()
            .targets
            .get(&target)
            .cloned()
            .ok_or_else(|| {
                ProduceError::Internal(format!("target '{}' was never realized", target))
            })?;

        // Phase A: lock the target and every declared output, in sorted
        // order so two rules sharing an output cannot deadlock.
        let mut names: Vec<String> = info.outputs.clone();
        names.push(target.clone());
        names.sort();
        names.dedup();
        let handles: Vec<_> = names.iter().map(|name| engine.locks.handle(name)).collect();
        let mut guards = Vec::with_capacity(handles.len());
        for handle in handles {
            guards.push(handle.lock_owned().await);
        }

        // Phase B: another producer may have built this while we waited
        // for the locks.
        {
            let st = engine.state();
            if !st.is_stale(&target) {
                debug!(target = %target, depth, "fresh; nothing to do");
                return Ok(false);
            }
            for name in &names {
                if let Some(Outcome::Failed(err)) = st.outcomes.get(name) {
                    debug!(target = %target, depth, "re-raising memoized failure");
                    return Err(err.clone());
                }
            }
        }

        // Phase C: dependencies, concurrently.
        if engine.options.pretended(&target) {
            debug!(target = %target, depth, "pretending up to date");
            return Ok(false);
        }
        let mut children = Vec::with_capacity(info.ddeps.len());
        for dep in &info.ddeps {
            children.push(tokio::spawn(produce(engine.clone(), dep.clone(), depth + 1)));
        }
        let mut first_err: Option<ProduceError> = None;
        for child in children {
            match child.await {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    first_err.get_or_insert(err);
                }
                Err(join_err) => {
                    first_err.get_or_insert(ProduceError::Internal(format!(
                        "dependency producer panicked: {}",
                        join_err
                    )));
                }
            }
        }
        if let Some(err) = first_err {
            return Err(err);
        }

        // Phase D: the recipe, bounded by the jobs counter.
        let _permit = engine
            .jobs
            .acquire()
            .await
            .map_err(|_| ProduceError::Internal("jobs semaphore closed".to_string()))?;

        let recipe = match info.irule.recipe() {
            Some(text) => text.strip_prefix('\n').unwrap_or(text).to_string(),
            None => {
                // No recipe: with its dependencies fresh the target has
                // nothing left to do.
                let mut st = engine.state();
                for name in &names {
                    st.out_of_date.remove(name);
                    st.missing.remove(name);
                }
                debug!(target = %target, depth, "no recipe; nothing to run");
                return Ok(false);
            }
        };

        if !engine.options.silent {
            println!("{}", recipe);
        }
        if engine.options.dry_run {
            let mut st = engine.state();
            for name in &names {
                st.out_of_date.remove(name);
                st.missing.remove(name);
            }
            return Ok(true);
        }

        debug!(target = %target, depth, shell = info.irule.shell(), "running recipe");
        match run_recipe(&engine, &info, &target, &recipe).await {
            Ok(()) => {
                let mut st = engine.state();
                for name in &names {
                    st.mark_fresh(name);
                }
                debug!(target = %target, depth, "recipe succeeded");
                Ok(true)
            }
            Err(err) => {
                let mut st = engine.state();
                for name in &names {
                    st.outcomes.insert(name.clone(), Outcome::Failed(err.clone()));
                }
                Err(err)
            }
        }
    })
}

/// Execute a recipe through its interpreter, maintaining the
/// incomplete-files set so an unclean exit leaves only quarantined
/// leftovers.
async fn run_recipe(
    engine: &Engine,
    info: &TargetInfo,
    target: &str,
    recipe: &str,
) -> Result<()> {
    let mut outs = info.outputs.clone();
    if info.irule.is_file() {
        outs.push(target.to_string());
    }

    for out in &outs {
        let backup = format!("{}~", out);
        match std::fs::remove_file(&backup) {
            Ok(()) => debug!(path = %backup, "removed stale backup"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ProduceError::io(&backup, e)),
        }
    }

    let mut script = tempfile::Builder::new()
        .prefix(".produce-")
        .suffix(".sh")
        .tempfile()
        .map_err(|e| ProduceError::io("recipe script", e))?;
    script
        .write_all(recipe.as_bytes())
        .and_then(|_| script.write_all(b"\n"))
        .and_then(|_| script.flush())
        .map_err(|e| ProduceError::io("recipe script", e))?;

    {
        let mut st = engine.state();
        for out in &outs {
            st.incomplete.insert(out.clone());
        }
    }

    let status = tokio::process::Command::new(info.irule.shell())
        .arg(script.path())
        .status()
        .await
        .map_err(|e| ProduceError::io(info.irule.shell(), e))?;

    if !status.success() {
        return Err(ProduceError::RecipeFailed {
            target: target.to_string(),
            code: status.code().unwrap_or(-1),
        });
    }

    let mut st = engine.state();
    for out in &outs {
        st.incomplete.remove(out);
    }
    Ok(())
}
