use super::Kitchen;
use crate::Context;
use crate::cli::CookArgs;
use crate::progress::FleetBar;
use crate::ui;
use anyhow::{Context as _, Result};
use kitchen::{Catalog, Node};
use remote::SshConnector;

pub fn run(ctx: &Context, args: CookArgs) -> Result<()> {
    let kitchen = Kitchen::open(ctx)?;
    let catalog = kitchen.catalog()?;
    let nodes = select(&catalog, &args)?;

    if nodes.is_empty() {
        ui::warn("No nodes selected");
        return Ok(());
    }

    let fleet_wide = args.all || args.env.is_some();
    if fleet_wide && !args.yes && !confirm(&nodes)? {
        ui::info("Cancelled");
        return Ok(());
    }

    let settings = kitchen.settings(args.why_run, args.force_save);
    let run_ctx = kitchen.run_context(&settings);
    let jobs = args.jobs.unwrap_or(kitchen.config.run.jobs);

    if !ctx.quiet {
        ui::header(&format!(
            "Cooking {} node{}{}",
            nodes.len(),
            ui::plural(nodes.len()),
            if args.why_run { " (why-run)" } else { "" }
        ));
        if ctx.verbose > 0 {
            ui::kv("kitchen", &kitchen.root.display().to_string());
            ui::kv("operator", &kitchen.operator.user);
            ui::kv("branch", &kitchen.operator.branch);
            ui::kv("jobs", &jobs.to_string());
        }
    }

    let bar = FleetBar::new(nodes.len(), ctx.quiet);
    let summary = cook::dispatch(
        &run_ctx,
        &catalog,
        &nodes,
        &SshConnector,
        &kitchen.config.target_template(),
        jobs,
        &bar,
    );
    bar.finish();
    let summary = summary.context("Fleet run aborted before any node was contacted")?;

    println!();
    let failed = summary.failed();
    let line = format!(
        "{} configured, {} skipped, {} failed",
        summary.succeeded(),
        summary.skipped(),
        failed
    );
    if summary.is_success() {
        ui::success(&line);
        Ok(())
    } else {
        ui::error(&line);
        for (node, e) in summary.failures() {
            ui::dim(&format!("{node}: {e}"));
        }
        anyhow::bail!("{failed} node{} failed", ui::plural(failed))
    }
}

/// Nodes chosen on the command line, in kitchen order for fleet-wide runs.
pub fn select(catalog: &Catalog, args: &CookArgs) -> Result<Vec<Node>> {
    if args.all {
        return Ok(catalog.nodes.clone());
    }
    if let Some(env) = &args.env {
        let nodes: Vec<Node> = catalog
            .nodes
            .iter()
            .filter(|n| &n.chef_environment == env)
            .cloned()
            .collect();
        if nodes.is_empty() {
            ui::warn(&format!("No nodes in environment '{env}'"));
        }
        return Ok(nodes);
    }
    args.nodes
        .iter()
        .map(|name| catalog.node(name).cloned().map_err(Into::into))
        .collect()
}

fn confirm(nodes: &[Node]) -> Result<bool> {
    for node in nodes {
        ui::dim(&node.name);
    }
    dialoguer::Confirm::new()
        .with_prompt(format!(
            "Cook {} node{}?",
            nodes.len(),
            ui::plural(nodes.len())
        ))
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, env: &str) -> Node {
        let mut node = Node::new(name);
        node.chef_environment = env.to_string();
        node
    }

    fn catalog() -> Catalog {
        Catalog {
            nodes: vec![
                node("db1", "production"),
                node("web1", "production"),
                node("web2", "staging"),
            ],
            ..Catalog::default()
        }
    }

    fn args() -> CookArgs {
        CookArgs {
            nodes: Vec::new(),
            all: false,
            env: None,
            jobs: None,
            why_run: false,
            force_save: false,
            yes: false,
        }
    }

    fn names(nodes: &[Node]) -> Vec<&str> {
        nodes.iter().map(|n| n.name.as_str()).collect()
    }

    #[test]
    fn test_select_all() {
        let selected = select(&catalog(), &CookArgs { all: true, ..args() }).unwrap();
        assert_eq!(names(&selected), ["db1", "web1", "web2"]);
    }

    #[test]
    fn test_select_environment() {
        let selected = select(
            &catalog(),
            &CookArgs {
                env: Some("production".into()),
                ..args()
            },
        )
        .unwrap();
        assert_eq!(names(&selected), ["db1", "web1"]);
    }

    #[test]
    fn test_select_named_nodes_keeps_order() {
        let selected = select(
            &catalog(),
            &CookArgs {
                nodes: vec!["web2".into(), "db1".into()],
                ..args()
            },
        )
        .unwrap();
        assert_eq!(names(&selected), ["web2", "db1"]);
    }

    #[test]
    fn test_select_unknown_node_fails() {
        let result = select(
            &catalog(),
            &CookArgs {
                nodes: vec!["mail1".into()],
                ..args()
            },
        );
        assert!(result.is_err());
    }
}
