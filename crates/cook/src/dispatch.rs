//! Cooking many nodes at once.
//!
//! The node data bag is built once, up front, and every node run only reads
//! it. Runs then fan out over a bounded rayon pool, one run per node; a
//! failed node never stops the others.

use crate::context::{FleetProgress, RunContext};
use crate::error::{Error, Result};
use crate::run::{RunOutcome, SkipReason, conclude, run_node};
use kitchen::{Catalog, DataBagGuard, Node};
use rayon::prelude::*;
use remote::{Connector, Target};

/// Concurrent node runs when nothing else is configured.
pub const DEFAULT_JOBS: usize = 4;

/// Outcome of every node in a fleet run, in the order the nodes were given.
#[derive(Debug, Default)]
pub struct FleetSummary {
    /// `(node name, outcome)` pairs
    pub outcomes: Vec<(String, RunOutcome)>,
}

impl FleetSummary {
    /// Nodes that were cooked successfully.
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, RunOutcome::Succeeded))
    }

    /// Nodes that were skipped.
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, RunOutcome::Skipped(_)))
    }

    /// Nodes that failed.
    pub fn failed(&self) -> usize {
        self.count(RunOutcome::is_failure)
    }

    /// Whether no node failed. Skipped nodes don't count as failures.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Failed nodes with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.outcomes.iter().filter_map(|(name, outcome)| match outcome {
            RunOutcome::Failed(e) => Some((name.as_str(), e)),
            _ => None,
        })
    }

    fn count(&self, pred: impl Fn(&RunOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Cook `nodes` with at most `jobs` runs in flight.
///
/// Builds the node data bag from `catalog` first; an inconsistent catalog
/// fails here before any node is contacted. The bag is removed again once
/// every run has ended. Each node is reached at `template` with the host
/// replaced by the node name.
pub fn dispatch(
    ctx: &RunContext<'_>,
    catalog: &Catalog,
    nodes: &[Node],
    connector: &dyn Connector,
    template: &Target,
    jobs: usize,
    progress: &dyn FleetProgress,
) -> Result<FleetSummary> {
    let (_bag, _) = DataBagGuard::build(ctx.layout, catalog)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()?;

    log::info!(
        "Cooking {} node(s) with {} parallel job(s)",
        nodes.len(),
        jobs.max(1)
    );

    let outcomes = pool.install(|| {
        nodes
            .par_iter()
            .map(|node| {
                progress.started(&node.name);
                let outcome = cook_one(ctx, node, connector, template);
                progress.finished(&node.name, &outcome);
                (node.name.clone(), outcome)
            })
            .collect::<Vec<_>>()
    });

    Ok(FleetSummary { outcomes })
}

fn cook_one(
    ctx: &RunContext<'_>,
    node: &Node,
    connector: &dyn Connector,
    template: &Target,
) -> RunOutcome {
    // dummies never get a connection
    if node.is_dummy() {
        log::info!("[{}] skipping dummy node", node.name);
        return RunOutcome::Skipped(SkipReason::Dummy);
    }

    let target = Target {
        host: node.name.clone(),
        ..template.clone()
    };
    match connector.connect(&target) {
        Ok(transport) => run_node(ctx, node, transport.as_ref()),
        Err(e) => conclude(
            ctx,
            node,
            RunOutcome::Failed(Error::from_transport(&node.name, e)),
        ),
    }
}

/// Label for an outcome in status lines.
pub fn describe(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Succeeded => "configured".to_string(),
        RunOutcome::Skipped(SkipReason::Dummy) => "skipped (dummy)".to_string(),
        RunOutcome::Skipped(reason) => format!("skipped ({reason})"),
        RunOutcome::Failed(e) => format!("failed: {e}"),
    }
}
