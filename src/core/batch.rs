// src/core/batch.rs
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use super::engine::{Engine, InputReport};
use super::OutputSpec;
use crate::config::BatchConfig;
use crate::error::{PublicizerError, Result};

/// Outcome of one input in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InputOutcome {
    Publicized(InputReport),
    Failed {
        input: PathBuf,
        error: String,
        exit_code: i32,
    },
}

impl InputOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub outcomes: Vec<InputOutcome>,
    pub failures: usize,
}

impl BatchSummary {
    /// Process exit status for the run.
    ///
    /// A single input reports the stage code of its failure; several inputs
    /// report how many of them failed.
    pub fn exit_code(&self) -> i32 {
        match self.outcomes.as_slice() {
            [InputOutcome::Failed { exit_code, .. }] => *exit_code,
            _ => self.failures.min(255) as i32,
        }
    }
}

/// Drives the engine over every input, isolating failures per input
pub struct BatchDriver {
    engine: Engine,
    batch: BatchConfig,
}

impl BatchDriver {
    pub fn new(engine: Engine, batch: BatchConfig) -> Self {
        Self { engine, batch }
    }

    /// Replace directory inputs by the modules they contain, sorted by path.
    ///
    /// A directory without any module is kept as is so it fails as not found.
    pub fn expand(&self, inputs: &[PathBuf]) -> Vec<PathBuf> {
        let mut expanded = Vec::new();

        for input in inputs {
            if !input.is_dir() {
                expanded.push(input.clone());
                continue;
            }

            let max_depth = if self.batch.recursive { usize::MAX } else { 1 };
            let mut modules: Vec<PathBuf> = WalkDir::new(input)
                .max_depth(max_depth)
                .into_iter()
                .filter_map(|entry| match entry {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        warn!("Skipping unreadable entry under {}: {}", input.display(), e);
                        None
                    }
                })
                .filter(|entry| entry.file_type().is_file() && self.is_module(entry.path()))
                .map(|entry| entry.into_path())
                .collect();

            if modules.is_empty() {
                warn!("No modules found in {}", input.display());
                expanded.push(input.clone());
            } else {
                modules.sort();
                info!("Found {} modules in {}", modules.len(), input.display());
                expanded.extend(modules);
            }
        }

        expanded
    }

    fn is_module(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| {
                self.batch
                    .extensions
                    .iter()
                    .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
            })
    }

    /// Refuse to overwrite the output of an earlier input in the same run
    fn check_collision(
        &self,
        input: &Path,
        output: Option<&OutputSpec>,
        written: &HashMap<PathBuf, PathBuf>,
    ) -> Result<()> {
        // Resolution failures surface from the engine with their own stage
        let Ok(target) = self.engine.target(input, output) else {
            return Ok(());
        };
        let path = target.path();
        match written.get(&path) {
            Some(earlier) => Err(PublicizerError::write(
                &path,
                format!("already written for {} in this run", earlier.display()),
            )),
            None => Ok(()),
        }
    }

    /// Publicize every input; one input failing never stops the others
    pub fn run(&self, inputs: &[PathBuf], output: Option<&OutputSpec>) -> BatchSummary {
        let inputs = self.expand(inputs);

        // Several inputs cannot share one file name
        let shared_output = if inputs.len() > 1 {
            output.cloned().map(OutputSpec::into_directory)
        } else {
            output.cloned()
        };

        let mut summary = BatchSummary::default();
        let mut written: HashMap<PathBuf, PathBuf> = HashMap::new();
        for input in &inputs {
            let result = self
                .check_collision(input, shared_output.as_ref(), &written)
                .and_then(|_| self.engine.process(input, shared_output.as_ref()));
            let outcome = match result {
                Ok(report) => {
                    info!("✅ {} -> {}", input.display(), report.output.display());
                    written.insert(report.output.clone(), input.clone());
                    InputOutcome::Publicized(report)
                }
                Err(e) => {
                    error!("{}", e);
                    summary.failures += 1;
                    InputOutcome::Failed {
                        input: input.clone(),
                        error: e.to_string(),
                        exit_code: e.exit_code(),
                    }
                }
            };
            summary.outcomes.push(outcome);
        }

        if inputs.len() > 1 {
            info!(
                "Publicized {} of {} inputs",
                inputs.len() - summary.failures,
                inputs.len()
            );
        }
        summary
    }
}
