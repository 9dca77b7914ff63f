//! Attribute resolution: from a node record to its fully merged document.
//!
//! Precedence, lowest first:
//!
//! 1. cookbook defaults
//! 2. environment defaults
//! 3. role defaults
//! 4. node normal attributes
//! 5. role overrides
//! 6. environment overrides
//!
//! Roles are expanded transitively before anything is merged. Role inclusion
//! cycles are rejected rather than followed.

use crate::document::{Document, merge, set_path, split_attribute_key};
use crate::error::{Error, Result};
use crate::types::{Environment, Node, Recipe, Role};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// A node after role/recipe expansion and attribute merging.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedNode {
    /// Node name
    pub name: String,
    /// Expanded roles, in expansion order
    pub roles: Vec<String>,
    /// Expanded recipes, in expansion order
    pub recipes: Vec<String>,
    /// Merged attributes only, before being folded into the node record
    pub attributes: Document,
    /// The node record with merged attributes and derived fields
    pub document: Document,
}

impl ResolvedNode {
    /// Look up a slash-separated attribute path in the resolved document.
    pub fn attribute(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('/');
        let first = self.document.get(segments.next()?)?;
        segments.try_fold(first, |value, segment| value.get(segment))
    }
}

/// Expand a node's roles, following role-includes-role edges.
///
/// Roles appear once, in depth-first first-encounter order.
pub fn expand_roles(node: &Node, roles: &BTreeMap<String, Role>) -> Result<Vec<String>> {
    let mut expanded = Vec::new();
    let mut seen = HashSet::new();
    let mut path = Vec::new();

    for role in node.explicit_roles() {
        visit_role(&node.name, &role, roles, &mut path, &mut seen, &mut expanded)?;
    }

    Ok(expanded)
}

fn visit_role(
    node: &str,
    name: &str,
    roles: &BTreeMap<String, Role>,
    path: &mut Vec<String>,
    seen: &mut HashSet<String>,
    expanded: &mut Vec<String>,
) -> Result<()> {
    if path.iter().any(|p| p == name) {
        let mut cycle: Vec<&str> = path
            .iter()
            .skip_while(|p| p.as_str() != name)
            .map(String::as_str)
            .collect();
        cycle.push(name);
        return Err(Error::RoleCycle {
            path: cycle.join(" -> "),
        });
    }
    if seen.contains(name) {
        return Ok(());
    }

    let role = roles.get(name).ok_or_else(|| Error::MissingRole {
        node: node.to_string(),
        role: name.to_string(),
    })?;

    seen.insert(name.to_string());
    expanded.push(name.to_string());

    path.push(name.to_string());
    for included in role.included_roles() {
        visit_role(node, &included, roles, path, seen, expanded)?;
    }
    path.pop();

    Ok(())
}

/// Expand a node's recipes: its own plus every recipe of every expanded role.
pub fn expand_recipes(
    node: &Node,
    expanded_roles: &[String],
    roles: &BTreeMap<String, Role>,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let from_roles = expanded_roles
        .iter()
        .filter_map(|name| roles.get(name))
        .flat_map(Role::included_recipes);

    node.explicit_recipes()
        .into_iter()
        .chain(from_roles)
        .filter(|recipe| seen.insert(recipe.clone()))
        .collect()
}

/// Find a recipe, treating `cookbook::default` as `cookbook`.
pub fn find_recipe<'a>(recipes: &'a BTreeMap<String, Recipe>, name: &str) -> Option<&'a Recipe> {
    recipes.get(name).or_else(|| {
        name.strip_suffix("::default")
            .and_then(|cookbook| recipes.get(cookbook))
    })
}

/// Resolve a node against the catalog.
///
/// Fails on the first recipe or role that cannot be found. Neither catalog
/// map is modified.
pub fn resolve(
    node: &Node,
    recipes: &BTreeMap<String, Recipe>,
    roles: &BTreeMap<String, Role>,
    environment: &Environment,
) -> Result<ResolvedNode> {
    let expanded_roles = expand_roles(node, roles)?;
    let expanded_recipes = expand_recipes(node, &expanded_roles, roles);

    let mut attributes = Document::new();

    for name in &expanded_recipes {
        let recipe = find_recipe(recipes, name).ok_or_else(|| Error::MissingRecipe {
            node: node.name.clone(),
            recipe: name.clone(),
        })?;
        for (key, meta) in &recipe.attributes {
            set_path(
                &mut attributes,
                &split_attribute_key(key)[..],
                &meta.default_value(),
            );
        }
    }

    let expanded: Vec<&Role> = expanded_roles.iter().filter_map(|r| roles.get(r)).collect();

    merge(&mut attributes, &environment.default_attributes);
    for role in &expanded {
        merge(&mut attributes, &role.default_attributes);
    }
    merge(&mut attributes, &node.normal_attributes());
    for role in &expanded {
        merge(&mut attributes, &role.override_attributes);
    }
    merge(&mut attributes, &environment.override_attributes);

    let document = build_document(node, &expanded_roles, &expanded_recipes, &attributes);

    Ok(ResolvedNode {
        name: node.name.clone(),
        roles: expanded_roles,
        recipes: expanded_recipes,
        attributes,
        document,
    })
}

fn build_document(
    node: &Node,
    roles: &[String],
    recipes: &[String],
    attributes: &Document,
) -> Document {
    let mut doc = node.to_document();

    doc.insert("id".to_string(), Value::String(node.data_bag_id()));
    doc.insert("role".to_string(), string_list(node.explicit_roles()));
    doc.insert("roles".to_string(), sorted_list(roles));
    doc.insert("recipes".to_string(), sorted_list(recipes));

    // Attributes land as top-level fields so recipes can read them directly.
    for (key, value) in attributes {
        doc.insert(key.clone(), value.clone());
    }

    doc.insert("fqdn".to_string(), Value::String(node.name.clone()));
    doc.insert(
        "hostname".to_string(),
        Value::String(node.hostname().to_string()),
    );
    doc.insert(
        "domain".to_string(),
        Value::String(node.domain().to_string()),
    );
    doc
}

fn string_list(items: Vec<String>) -> Value {
    Value::Array(items.into_iter().map(Value::String).collect())
}

fn sorted_list(items: &[String]) -> Value {
    let mut sorted = items.to_vec();
    sorted.sort();
    string_list(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttributeMeta;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    fn role(name: &str, run_list: &[&str]) -> Role {
        Role {
            name: name.into(),
            run_list: run_list.iter().map(ToString::to_string).collect(),
            ..Default::default()
        }
    }

    fn recipe(name: &str, attrs: &[(&str, Value)]) -> Recipe {
        Recipe {
            name: name.into(),
            attributes: attrs
                .iter()
                .map(|(k, v)| {
                    (
                        (*k).to_string(),
                        AttributeMeta {
                            default: Some(v.clone()),
                            kind: None,
                        },
                    )
                })
                .collect(),
        }
    }

    fn node(name: &str, run_list: &[&str]) -> Node {
        let mut node = Node::new(name);
        node.run_list = run_list.iter().map(ToString::to_string).collect();
        node
    }

    fn catalog_maps(
        roles: Vec<Role>,
        recipes: Vec<Recipe>,
    ) -> (BTreeMap<String, Role>, BTreeMap<String, Recipe>) {
        (
            roles.into_iter().map(|r| (r.name.clone(), r)).collect(),
            recipes.into_iter().map(|r| (r.name.clone(), r)).collect(),
        )
    }

    #[test]
    fn test_end_to_end_environment_override_wins() {
        let mut base = role("base", &[]);
        base.default_attributes = doc(json!({"timeout": 10}));
        let (roles, recipes) =
            catalog_maps(vec![base], vec![recipe("app", &[("timeout", json!(5))])]);
        let env = Environment {
            name: "prod".into(),
            override_attributes: doc(json!({"timeout": 30})),
            ..Default::default()
        };
        let mut web1 = node("web1", &["role[base]", "recipe[app]"]);
        web1.chef_environment = "prod".into();

        let resolved = resolve(&web1, &recipes, &roles, &env).unwrap();
        assert_eq!(resolved.document["timeout"], json!(30));
    }

    #[test]
    fn test_precedence_falls_back_layer_by_layer() {
        // One value per layer; peel them off from the top.
        let layers = [
            "cookbook",
            "env_default",
            "role_default",
            "normal",
            "role_override",
            "env_override",
        ];
        for top in (0..layers.len()).rev() {
            let present = |layer: usize| layer <= top;

            let cookbook_value = json!(layers[0]);
            let mut r = role("r", &[]);
            if present(2) {
                r.default_attributes = doc(json!({"key": layers[2]}));
            }
            if present(4) {
                r.override_attributes = doc(json!({"key": layers[4]}));
            }
            let mut env = Environment::empty("e");
            if present(1) {
                env.default_attributes = doc(json!({"key": layers[1]}));
            }
            if present(5) {
                env.override_attributes = doc(json!({"key": layers[5]}));
            }
            let mut n = node("n", &["role[r]", "recipe[c]"]);
            if present(3) {
                n.attributes.insert("key".into(), json!(layers[3]));
            }
            let (roles, recipes) =
                catalog_maps(vec![r], vec![recipe("c", &[("key", cookbook_value)])]);

            let resolved = resolve(&n, &recipes, &roles, &env).unwrap();
            assert_eq!(resolved.attributes["key"], json!(layers[top]), "top layer {top}");
        }
    }

    #[test]
    fn test_role_and_recipe_expansion() {
        let (roles, recipes) = catalog_maps(
            vec![
                role("A", &["role[B]", "recipe[R1]"]),
                role("B", &["recipe[R1]"]),
            ],
            vec![recipe("R1", &[]), recipe("R2", &[])],
        );
        for run_list in [
            ["role[A]", "recipe[R2]"],
            ["recipe[R2]", "role[A]"],
        ] {
            let resolved =
                resolve(&node("n", &run_list), &recipes, &roles, &Environment::default()).unwrap();

            let mut roles_found = resolved.roles.clone();
            roles_found.sort();
            let mut recipes_found = resolved.recipes.clone();
            recipes_found.sort();
            assert_eq!(roles_found, vec!["A", "B"]);
            assert_eq!(recipes_found, vec!["R1", "R2"]);
            assert_eq!(resolved.document["roles"], json!(["A", "B"]));
            assert_eq!(resolved.document["role"], json!(["A"]));
        }
    }

    #[test]
    fn test_missing_recipe_is_fatal() {
        let (roles, recipes) = catalog_maps(vec![], vec![recipe("app", &[])]);
        let err = resolve(
            &node("web1", &["recipe[app]", "recipe[ghost]"]),
            &recipes,
            &roles,
            &Environment::default(),
        )
        .unwrap_err();
        match err {
            Error::MissingRecipe { node, recipe } => {
                assert_eq!(node, "web1");
                assert_eq!(recipe, "ghost");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_role_is_fatal() {
        let (roles, recipes) = catalog_maps(vec![role("A", &["role[nope]"])], vec![]);
        let err = resolve(&node("n", &["role[A]"]), &recipes, &roles, &Environment::default())
            .unwrap_err();
        assert!(matches!(err, Error::MissingRole { ref role, .. } if role == "nope"));
    }

    #[test]
    fn test_role_cycle_is_rejected() {
        let (roles, recipes) = catalog_maps(
            vec![
                role("A", &["role[B]"]),
                role("B", &["role[C]"]),
                role("C", &["role[A]"]),
            ],
            vec![],
        );
        let err = resolve(&node("n", &["role[A]"]), &recipes, &roles, &Environment::default())
            .unwrap_err();
        match err {
            Error::RoleCycle { path } => assert_eq!(path, "A -> B -> C -> A"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let (roles, recipes) = catalog_maps(
            vec![
                role("top", &["role[left]", "role[right]"]),
                role("left", &["role[shared]"]),
                role("right", &["role[shared]"]),
                role("shared", &[]),
            ],
            vec![],
        );
        let resolved =
            resolve(&node("n", &["role[top]"]), &recipes, &roles, &Environment::default())
                .unwrap();
        assert_eq!(resolved.roles, vec!["top", "left", "shared", "right"]);
    }

    #[test]
    fn test_cookbook_defaults_expand_paths_and_coerce() {
        let (roles, recipes) = catalog_maps(
            vec![],
            vec![recipe(
                "nginx",
                &[("nginx/gzip", json!("true")), ("nginx/worker/count", json!(4))],
            )],
        );
        let resolved = resolve(
            &node("n", &["recipe[nginx::default]"]),
            &recipes,
            &roles,
            &Environment::default(),
        )
        .unwrap();
        assert_eq!(
            resolved.document["nginx"],
            json!({"gzip": true, "worker": {"count": 4}})
        );
        assert_eq!(resolved.attribute("nginx/worker/count"), Some(&json!(4)));
    }

    #[test]
    fn test_automatic_attributes() {
        let resolved = resolve(
            &node("web1.prod.example.com", &[]),
            &BTreeMap::new(),
            &BTreeMap::new(),
            &Environment::default(),
        )
        .unwrap();
        assert_eq!(resolved.document["fqdn"], json!("web1.prod.example.com"));
        assert_eq!(resolved.document["hostname"], json!("web1"));
        assert_eq!(resolved.document["domain"], json!("prod.example.com"));
        assert_eq!(resolved.document["id"], json!("web1_prod_example_com"));
    }

    #[test]
    fn test_resolution_is_deterministic_and_pure() {
        let mut base = role("base", &["recipe[app]"]);
        base.default_attributes = doc(json!({"a": {"b": 1}, "list": [1, 2]}));
        let (roles, recipes) = catalog_maps(
            vec![base],
            vec![recipe("app", &[("a/c", json!("x"))])],
        );
        let roles_before = roles.clone();
        let recipes_before = recipes.clone();
        let n = node("n", &["role[base]"]);

        let first = resolve(&n, &recipes, &roles, &Environment::default()).unwrap();
        let second = resolve(&n, &recipes, &roles, &Environment::default()).unwrap();
        assert_eq!(
            serde_json::to_vec(&first.document).unwrap(),
            serde_json::to_vec(&second.document).unwrap()
        );
        assert_eq!(roles, roles_before);
        assert_eq!(recipes, recipes_before);
    }
}
