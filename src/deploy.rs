//! Plan and deploy stacks

use crate::stack::Stack;
use crate::state::{RealizedState, StateRecorder};
use anyhow::{Context, Result};
use declarative::{
    Output, ProgressCallback, Provisioner, RealizeOptions, RealizedResource, Realizer,
};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

/// Realization order of a stack, computed without provisioning
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub stack: String,
    /// Descriptor ids in realization order
    pub order: Vec<String>,
    /// Groups of ids that may be realized concurrently
    pub waves: Vec<Vec<String>>,
}

/// Result of a successful deploy
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub stack: String,
    pub order: Vec<String>,
    /// Realized resources in realization order
    pub resources: Vec<RealizedResource>,
    pub outputs: Vec<Output>,
}

impl DeployReport {
    /// Look up a resolved output by name
    pub fn output(&self, name: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|o| o.name == name)
            .map(|o| o.value.as_str())
    }

    /// Machine-readable report
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize deploy report")
    }
}

/// Compute the realization order of `stack`
pub fn plan(stack: &Stack) -> Result<Plan> {
    let graph = stack
        .build_graph()
        .with_context(|| format!("Invalid stack '{}'", stack.name()))?;
    let order = graph
        .topological_order()
        .with_context(|| format!("Cannot order stack '{}'", stack.name()))?;
    let waves = graph.levels()?;
    Ok(Plan {
        stack: stack.name().to_string(),
        order,
        waves,
    })
}

/// Realize every resource of `stack` and resolve its outputs
pub fn deploy<P, C>(
    stack: &Stack,
    provisioner: &P,
    options: &RealizeOptions,
    progress: &mut C,
) -> Result<DeployReport>
where
    P: Provisioner,
    C: ProgressCallback,
{
    let name = stack.name();
    let graph = stack
        .build_graph()
        .with_context(|| format!("Invalid stack '{name}'"))?;
    let collector = stack
        .output_collector()
        .with_context(|| format!("Invalid outputs of stack '{name}'"))?;
    let order = graph
        .topological_order()
        .with_context(|| format!("Cannot order stack '{name}'"))?;

    log::info!("Deploying stack '{name}' ({} resources)", order.len());
    let realization = Realizer::new(options.clone())
        .run_with_progress(&graph, provisioner, progress)
        .with_context(|| format!("Failed to deploy stack '{name}'"))?;

    let outputs = collector
        .collect(&realization)
        .with_context(|| format!("Failed to resolve outputs of stack '{name}'"))?;

    let mut by_id: HashMap<_, _> = realization
        .into_resources()
        .into_iter()
        .map(|r| (r.id.clone(), r))
        .collect();
    let resources = order.iter().filter_map(|id| by_id.remove(id)).collect();

    Ok(DeployReport {
        stack: name.to_string(),
        order,
        resources,
        outputs,
    })
}

/// [`deploy`], recording realized resources to `state_path` as they complete
///
/// A deploy failure takes precedence over a failure to record state; the
/// latter is then only logged.
pub fn deploy_recorded<P: Provisioner>(
    stack: &Stack,
    provisioner: &P,
    options: &RealizeOptions,
    state_path: &Path,
) -> Result<(DeployReport, RealizedState)> {
    let mut recorder = StateRecorder::open(state_path, stack.name())?;
    let report = deploy(stack, provisioner, options, &mut recorder);
    let recorded = recorder.finish();
    match (report, recorded) {
        (Ok(report), Ok(state)) => Ok((report, state)),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), recorded) => {
            if let Err(save_error) = recorded {
                log::warn!(
                    "State of '{}' was not fully recorded: {save_error:#}",
                    stack.name()
                );
            }
            Err(e)
        }
    }
}
