use super::Kitchen;
use crate::Context;
use crate::ui;
use anyhow::{Context as _, Result};
use colored::Colorize;
use kitchen::resolve::expand_roles;
use kitchen::{Catalog, ResolvedNode, resolve};

/// Print a node's resolved document as JSON.
pub fn show(ctx: &Context, name: &str) -> Result<()> {
    let kitchen = Kitchen::open(ctx)?;
    let catalog = kitchen.catalog()?;
    let resolved = resolve_node(&catalog, name)?;
    let json = serde_json::to_string_pretty(&resolved.document)
        .context("Failed to serialize node document")?;
    println!("{json}");
    Ok(())
}

pub fn resolve_node(catalog: &Catalog, name: &str) -> Result<ResolvedNode> {
    let node = catalog.node(name)?;
    let environment = catalog.environment_for(node)?;
    let resolved = resolve(node, &catalog.recipes, &catalog.roles, &environment)?;
    Ok(resolved)
}

/// List nodes with their environment and expanded roles.
pub fn list(ctx: &Context) -> Result<()> {
    let kitchen = Kitchen::open(ctx)?;
    let catalog = kitchen.catalog()?;

    if catalog.nodes.is_empty() {
        ui::info(&format!(
            "No nodes in {}",
            kitchen.layout.nodes_dir().display()
        ));
        return Ok(());
    }

    ui::header(&format!("Nodes ({})", catalog.nodes.len()));
    for node in &catalog.nodes {
        let roles = match expand_roles(node, &catalog.roles) {
            Ok(roles) => roles.join(", "),
            Err(e) => format!("{}", e.to_string().red()),
        };
        let name = if node.is_dummy() {
            format!("{} {}", node.name, "(dummy)".dimmed())
        } else {
            node.name.clone()
        };
        println!(
            "  {} {} {}",
            name.bold(),
            format!("[{}]", node.chef_environment).cyan(),
            roles.dimmed()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kitchen::{Environment, Node, Recipe, Role};
    use serde_json::json;

    #[test]
    fn test_resolve_node_applies_role_defaults() {
        let mut node = Node::new("web1");
        node.run_list = vec!["role[base]".into()];

        let role: Role = serde_json::from_value(json!({
            "name": "base",
            "run_list": ["recipe[app]"],
            "default_attributes": { "app": { "port": 8080 } }
        }))
        .unwrap();
        let recipe: Recipe = serde_json::from_value(json!({ "name": "app" })).unwrap();

        let mut catalog = Catalog {
            nodes: vec![node],
            ..Catalog::default()
        };
        catalog.roles.insert("base".into(), role);
        catalog.recipes.insert("app".into(), recipe);
        catalog
            .environments
            .insert("_default".into(), Environment::empty("_default"));

        let resolved = resolve_node(&catalog, "web1").unwrap();
        assert_eq!(resolved.roles, ["base"]);
        assert_eq!(resolved.attribute("app/port"), Some(&json!(8080)));
    }

    #[test]
    fn test_resolve_unknown_node_fails() {
        assert!(resolve_node(&Catalog::default(), "nope").is_err());
    }
}
