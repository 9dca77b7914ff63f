//! Loading a kitchen from disk.
//!
//! A kitchen is a directory tree:
//!
//! ```text
//! nodes/<name>.json
//! roles/**/<role>.json
//! environments/**/<environment>.json
//! <cookbook_path>/<cookbook>/metadata.json
//! data_bags/<bag>/<item>.json
//! ```

use crate::document::Document;
use crate::error::{Error, Result};
use crate::types::{
    AttributeMeta, Environment, Node, Recipe, Role, is_sentinel_environment,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Cookbook directories searched when none are configured.
pub const DEFAULT_COOKBOOK_PATHS: &[&str] = &["site-cookbooks", "cookbooks"];

/// Where things live inside a kitchen directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KitchenLayout {
    /// Kitchen root directory
    pub root: PathBuf,
    /// Cookbook directories relative to the root, highest priority first
    pub cookbook_paths: Vec<String>,
}

impl KitchenLayout {
    /// Layout rooted at `root` with the default cookbook paths.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cookbook_paths: DEFAULT_COOKBOOK_PATHS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }

    /// Replace the cookbook paths.
    pub fn with_cookbook_paths(mut self, paths: Vec<String>) -> Self {
        self.cookbook_paths = paths;
        self
    }

    /// `nodes/`
    pub fn nodes_dir(&self) -> PathBuf {
        self.root.join("nodes")
    }

    /// `roles/`
    pub fn roles_dir(&self) -> PathBuf {
        self.root.join("roles")
    }

    /// `environments/`
    pub fn environments_dir(&self) -> PathBuf {
        self.root.join("environments")
    }

    /// `data_bags/`
    pub fn data_bags_dir(&self) -> PathBuf {
        self.root.join("data_bags")
    }

    /// `data_bags/node/`, the generated node collection
    pub fn node_data_bag_dir(&self) -> PathBuf {
        self.data_bags_dir().join("node")
    }

    /// Path of a node's persisted record.
    pub fn node_file(&self, name: &str) -> PathBuf {
        self.nodes_dir().join(format!("{name}.json"))
    }

    /// Path of the transient per-run node document.
    pub fn tmp_node_file(&self, name: &str) -> PathBuf {
        self.root.join(format!("tmp_{name}.json"))
    }

    /// Existing cookbook directories, highest priority first.
    pub fn cookbook_dirs(&self) -> Vec<PathBuf> {
        self.cookbook_paths
            .iter()
            .map(|p| self.root.join(p))
            .filter(|p| p.is_dir())
            .collect()
    }
}

/// Everything the resolver needs, read once before any node is touched.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// All nodes, sorted by name
    pub nodes: Vec<Node>,
    /// Roles by name
    pub roles: BTreeMap<String, Role>,
    /// Environments by name
    pub environments: BTreeMap<String, Environment>,
    /// Recipes by name
    pub recipes: BTreeMap<String, Recipe>,
}

impl Catalog {
    /// Load nodes, roles, environments and cookbook metadata.
    pub fn load(layout: &KitchenLayout) -> Result<Self> {
        let catalog = Self {
            nodes: load_nodes(&layout.nodes_dir())?,
            roles: load_named(&layout.roles_dir(), |role: &mut Role, stem| {
                if role.name.is_empty() {
                    role.name = stem.to_string();
                }
                role.name.clone()
            })?,
            environments: load_named(
                &layout.environments_dir(),
                |env: &mut Environment, stem| {
                    if env.name.is_empty() {
                        env.name = stem.to_string();
                    }
                    env.name.clone()
                },
            )?,
            recipes: load_recipes(&layout.cookbook_dirs())?,
        };

        log::debug!(
            "Loaded kitchen {}: {} nodes, {} roles, {} environments, {} recipes",
            layout.root.display(),
            catalog.nodes.len(),
            catalog.roles.len(),
            catalog.environments.len(),
            catalog.recipes.len()
        );
        Ok(catalog)
    }

    /// Find a node by name.
    pub fn node(&self, name: &str) -> Result<&Node> {
        self.nodes
            .iter()
            .find(|n| n.name == name)
            .ok_or_else(|| Error::NodeNotFound(name.to_string()))
    }

    /// The environment a node belongs to.
    ///
    /// Sentinel environments resolve to an empty environment unless the
    /// kitchen defines them explicitly.
    pub fn environment_for(&self, node: &Node) -> Result<Environment> {
        if let Some(env) = self.environments.get(&node.chef_environment) {
            return Ok(env.clone());
        }
        if is_sentinel_environment(&node.chef_environment) {
            return Ok(Environment::empty(node.chef_environment.clone()));
        }
        Err(Error::MissingEnvironment {
            node: node.name.clone(),
            environment: node.chef_environment.clone(),
        })
    }
}

/// Load every `*.json` file directly under `nodes/`, sorted by name.
pub fn load_nodes(dir: &Path) -> Result<Vec<Node>> {
    let mut nodes = Vec::new();
    if !dir.is_dir() {
        return Ok(nodes);
    }

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !is_json(&path) {
            continue;
        }
        let mut node: Node = read_json(&path)?;
        if node.name.is_empty() {
            node.name = file_stem(&path);
        }
        nodes.push(node);
    }

    nodes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(nodes)
}

/// Load a single node record.
pub fn load_node(layout: &KitchenLayout, name: &str) -> Result<Node> {
    let path = layout.node_file(name);
    if !path.exists() {
        return Err(Error::NodeNotFound(name.to_string()));
    }
    let mut node: Node = read_json(&path)?;
    if node.name.is_empty() {
        node.name = name.to_string();
    }
    Ok(node)
}

/// Persist a node record.
///
/// Writes `nodes/<name>.json` only when it doesn't exist yet or `overwrite`
/// is set. Derived fields are stripped first. Returns whether the file was
/// written.
pub fn save_node(layout: &KitchenLayout, node: &Node, overwrite: bool) -> Result<bool> {
    let path = layout.node_file(&node.name);
    if path.exists() && !overwrite {
        return Ok(false);
    }

    fs::create_dir_all(layout.nodes_dir())?;
    write_pretty(&path, &node.sanitized())?;
    log::info!("Saved node configuration to {}", path.display());
    Ok(true)
}

/// Write the transient node document that gets uploaded for a run.
pub fn write_tmp_node(layout: &KitchenLayout, node: &Node) -> Result<PathBuf> {
    let path = layout.tmp_node_file(&node.name);
    write_pretty(&path, &node.sanitized())?;
    Ok(path)
}

fn write_pretty(path: &Path, doc: &Document) -> Result<()> {
    let mut content = serde_json::to_string_pretty(doc)?;
    content.push('\n');
    fs::write(path, content)?;
    Ok(())
}

fn load_named<T, F>(dir: &Path, mut name_of: F) -> Result<BTreeMap<String, T>>
where
    T: DeserializeOwned,
    F: FnMut(&mut T, &str) -> String,
{
    let mut items = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(items);
    }

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || !is_json(path) {
            continue;
        }
        let mut item: T = read_json(path)?;
        let name = name_of(&mut item, &file_stem(path));
        if items.insert(name.clone(), item).is_some() {
            log::warn!("Duplicate definition of '{name}' in {}", dir.display());
        }
    }

    Ok(items)
}

#[derive(Debug, Deserialize)]
struct CookbookMetadata {
    #[serde(default)]
    name: String,
    #[serde(default)]
    recipes: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    attributes: BTreeMap<String, AttributeMeta>,
}

/// Read `metadata.json` of every cookbook in `dirs`.
///
/// Each cookbook yields a recipe named after itself plus one per entry of its
/// `recipes` map, all carrying the cookbook's attribute metadata. A cookbook
/// found in more than one directory is taken from the first.
pub fn load_recipes(dirs: &[PathBuf]) -> Result<BTreeMap<String, Recipe>> {
    let mut recipes = BTreeMap::new();

    for dir in dirs {
        let mut cookbooks: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(std::result::Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        cookbooks.sort();

        for cookbook_dir in cookbooks {
            let metadata_path = cookbook_dir.join("metadata.json");
            if !metadata_path.exists() {
                log::debug!("Skipping {}: no metadata.json", cookbook_dir.display());
                continue;
            }

            let metadata: CookbookMetadata = read_json(&metadata_path)?;
            let cookbook = if metadata.name.is_empty() {
                file_stem(&cookbook_dir)
            } else {
                metadata.name.clone()
            };
            if recipes.contains_key(&cookbook) {
                continue;
            }

            let names = std::iter::once(cookbook.clone()).chain(metadata.recipes.keys().cloned());
            for name in names {
                recipes.entry(name.clone()).or_insert_with(|| Recipe {
                    name,
                    attributes: metadata.attributes.clone(),
                });
            }
        }
    }

    Ok(recipes)
}

/// Read and parse a JSON kitchen file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, value: serde_json::Value) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_string(&value).unwrap()).unwrap();
    }

    fn kitchen() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(
            root,
            "nodes/web1.example.com.json",
            json!({"name": "web1.example.com", "run_list": ["role[base]"]}),
        );
        write(root, "nodes/db1.json", json!({"run_list": []}));
        write(
            root,
            "roles/base.json",
            json!({"name": "base", "run_list": ["recipe[app]"]}),
        );
        write(root, "roles/nested/web.json", json!({"run_list": []}));
        write(
            root,
            "environments/prod.json",
            json!({"name": "prod", "override_attributes": {"timeout": 30}}),
        );
        write(
            root,
            "cookbooks/app/metadata.json",
            json!({
                "name": "app",
                "recipes": {"app::server": "Server"},
                "attributes": {"app/port": {"default": "80"}}
            }),
        );
        write(
            root,
            "site-cookbooks/app/metadata.json",
            json!({"name": "app", "attributes": {"app/port": {"default": "8080"}}}),
        );
        dir
    }

    #[test]
    fn test_load_catalog() {
        let dir = kitchen();
        let catalog = Catalog::load(&KitchenLayout::new(dir.path())).unwrap();

        let names: Vec<_> = catalog.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["db1", "web1.example.com"]);
        assert!(catalog.roles.contains_key("base"));
        assert!(catalog.roles.contains_key("web"), "name falls back to stem");
        assert!(catalog.environments.contains_key("prod"));
    }

    #[test]
    fn test_site_cookbooks_shadow_cookbooks() {
        let dir = kitchen();
        let catalog = Catalog::load(&KitchenLayout::new(dir.path())).unwrap();

        let app = &catalog.recipes["app"];
        assert_eq!(app.attributes["app/port"].default, Some(json!("8080")));
        assert!(
            !catalog.recipes.contains_key("app::server"),
            "shadowed cookbook contributes nothing"
        );
    }

    #[test]
    fn test_recipes_from_metadata_map() {
        let dir = kitchen();
        let layout = KitchenLayout::new(dir.path()).with_cookbook_paths(vec!["cookbooks".into()]);
        let catalog = Catalog::load(&layout).unwrap();
        assert!(catalog.recipes.contains_key("app"));
        assert!(catalog.recipes.contains_key("app::server"));
    }

    #[test]
    fn test_environment_for_sentinels_and_missing() {
        let dir = kitchen();
        let catalog = Catalog::load(&KitchenLayout::new(dir.path())).unwrap();

        let mut node = Node::new("n");
        assert!(catalog.environment_for(&node).unwrap().default_attributes.is_empty());

        node.chef_environment = "none".into();
        assert!(catalog.environment_for(&node).is_ok());

        node.chef_environment = "staging".into();
        let err = catalog.environment_for(&node).unwrap_err();
        assert!(matches!(err, Error::MissingEnvironment { .. }));
    }

    #[test]
    fn test_save_node_only_when_absent_or_forced() {
        let dir = TempDir::new().unwrap();
        let layout = KitchenLayout::new(dir.path());
        let mut node = Node::new("web1");
        node.attributes.insert("fqdn".into(), json!("web1"));

        assert!(save_node(&layout, &node, false).unwrap());
        node.set_ipaddress("10.0.0.9");
        assert!(!save_node(&layout, &node, false).unwrap());
        assert!(load_node(&layout, "web1").unwrap().ipaddress().is_none());

        assert!(save_node(&layout, &node, true).unwrap());
        let saved = load_node(&layout, "web1").unwrap();
        assert_eq!(saved.ipaddress(), Some("10.0.0.9"));
        assert!(!saved.attributes.contains_key("fqdn"));
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("nodes")).unwrap();
        fs::write(dir.path().join("nodes/bad.json"), "{not json").unwrap();

        let err = load_nodes(&dir.path().join("nodes")).unwrap_err();
        assert!(err.to_string().contains("bad.json"));
    }
}
