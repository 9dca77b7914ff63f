use super::Kitchen;
use crate::Context;
use crate::ui;
use anyhow::{Context as _, Result};
use cook::agent;

/// Install chef on a node with the omnibus installer.
pub fn deploy(ctx: &Context, node: &str, version: Option<&str>) -> Result<()> {
    let kitchen = Kitchen::open(ctx)?;
    let catalog = kitchen.catalog()?;
    let node = catalog.node(node)?;
    let version = version.or(kitchen.config.chef.version.as_deref());

    let transport = kitchen.connect(node)?;
    if agent::chef_available(transport.as_ref())? {
        ui::info(&format!("chef-solo is already installed on {}, reinstalling", node.name));
    }

    ui::info(&format!(
        "Installing chef {} on {}...",
        version.unwrap_or("(latest)"),
        node.name
    ));
    agent::install(transport.as_ref(), version)
        .with_context(|| format!("Could not install chef on {}", node.name))?;

    ui::success(&format!("chef-solo installed on {}", node.name));
    Ok(())
}
