//! The generated `node` data bag.
//!
//! Every node of the kitchen is resolved and written as
//! `data_bags/node/<id>.json`, so recipes running on one node can search the
//! resolved attributes of any other. The bag is rebuilt from scratch on every
//! run and removed afterwards.

use crate::catalog::{Catalog, KitchenLayout};
use crate::error::{Error, Result};
use crate::resolve::{ResolvedNode, resolve};
use crate::types::data_bag_id;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

/// Resolve every node in the catalog without writing anything.
///
/// Stops at the first inconsistency.
pub fn resolve_all(catalog: &Catalog) -> Result<Vec<ResolvedNode>> {
    catalog
        .nodes
        .iter()
        .map(|node| {
            let environment = catalog.environment_for(node)?;
            resolve(node, &catalog.recipes, &catalog.roles, &environment)
        })
        .collect()
}

/// Data bag ids for `names`, failing when two names map to the same id.
pub fn item_ids<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<Vec<String>> {
    let mut owners: BTreeMap<String, &str> = BTreeMap::new();
    names
        .into_iter()
        .map(|name| {
            let id = data_bag_id(name);
            if let Some(first) = owners.insert(id.clone(), name) {
                return Err(Error::DuplicateDataBagId {
                    id,
                    first: first.to_string(),
                    second: name.to_string(),
                });
            }
            Ok(id)
        })
        .collect()
}

/// Rebuild the node data bag from the catalog.
///
/// Any existing bag is removed first. Nothing is written when any node fails
/// to resolve or two nodes would share an item. Returns the written item
/// paths.
pub fn materialize(layout: &KitchenLayout, catalog: &Catalog) -> Result<Vec<PathBuf>> {
    remove(layout)?;
    let resolved = resolve_all(catalog)?;
    let ids = item_ids(resolved.iter().map(|node| node.name.as_str()))?;

    let dir = layout.node_data_bag_dir();
    fs::create_dir_all(&dir)?;

    let mut written = Vec::with_capacity(resolved.len());
    for (node, id) in resolved.iter().zip(&ids) {
        let path = dir.join(format!("{id}.json"));
        fs::write(&path, serde_json::to_string(&node.document)?)?;
        written.push(path);
    }

    log::info!(
        "Built node data bag with {} items in {}",
        written.len(),
        dir.display()
    );
    Ok(written)
}

/// Remove the generated node data bag, if present.
pub fn remove(layout: &KitchenLayout) -> Result<()> {
    let dir = layout.node_data_bag_dir();
    if dir.exists() {
        fs::remove_dir_all(&dir)?;
        log::debug!("Removed {}", dir.display());
    }
    Ok(())
}

/// Removes the node data bag when dropped.
///
/// Hold one for the duration of a fleet run so the generated bag never
/// outlives it, whichever way the run ends.
pub struct DataBagGuard {
    layout: KitchenLayout,
}

impl DataBagGuard {
    /// Materialize the bag and return a guard that removes it.
    pub fn build(layout: &KitchenLayout, catalog: &Catalog) -> Result<(Self, Vec<PathBuf>)> {
        let written = materialize(layout, catalog)?;
        Ok((
            Self {
                layout: layout.clone(),
            },
            written,
        ))
    }
}

impl Drop for DataBagGuard {
    fn drop(&mut self) {
        if let Err(e) = remove(&self.layout) {
            log::warn!("Could not remove generated node data bag: {e}");
        }
    }
}
