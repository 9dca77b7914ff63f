//! Core types for the kitchen: nodes, roles, environments and recipes.

use crate::document::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Environment every node belongs to unless it says otherwise.
pub const DEFAULT_ENVIRONMENT: &str = "_default";

/// Sentinel for "no environment"; resolves like [`DEFAULT_ENVIRONMENT`].
pub const NO_ENVIRONMENT: &str = "none";

/// Node fields that are identity or run-list plumbing, not attributes.
pub const NON_ATTRIBUTE_FIELDS: &[&str] = &[
    "id",
    "name",
    "role",
    "roles",
    "recipes",
    "run_list",
    "ipaddress",
];

/// Fields computed during resolution. Stripped before a node is persisted.
pub const DERIVED_FIELDS: &[&str] = &[
    "id", "role", "roles", "recipes", "fqdn", "hostname", "domain",
];

/// An entry of a run list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunListEntry {
    /// `role[name]`
    Role(String),
    /// `recipe[name]` or a bare recipe name
    Recipe(String),
}

impl RunListEntry {
    /// Parse a run list item such as `role[web]` or `recipe[nginx::default]`.
    pub fn parse(item: &str) -> Self {
        let item = item.trim();
        if let Some(name) = bracketed(item, "role") {
            Self::Role(name.to_string())
        } else if let Some(name) = bracketed(item, "recipe") {
            Self::Recipe(name.to_string())
        } else {
            Self::Recipe(item.to_string())
        }
    }
}

fn bracketed<'a>(item: &'a str, kind: &str) -> Option<&'a str> {
    item.strip_prefix(kind)?
        .strip_prefix('[')?
        .strip_suffix(']')
        .map(str::trim)
}

fn roles_in(run_list: &[String]) -> impl Iterator<Item = String> + '_ {
    run_list
        .iter()
        .filter_map(|item| match RunListEntry::parse(item) {
            RunListEntry::Role(name) => Some(name),
            RunListEntry::Recipe(_) => None,
        })
}

fn recipes_in(run_list: &[String]) -> impl Iterator<Item = String> + '_ {
    run_list
        .iter()
        .filter_map(|item| match RunListEntry::parse(item) {
            RunListEntry::Recipe(name) => Some(name),
            RunListEntry::Role(_) => None,
        })
}

fn default_environment() -> String {
    DEFAULT_ENVIRONMENT.to_string()
}

/// A managed machine as recorded in `nodes/<name>.json`.
///
/// Anything that isn't the name, environment or run list is kept in
/// `attributes` as free-form normal attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Fully-qualified node name
    #[serde(default)]
    pub name: String,

    /// Environment the node belongs to
    #[serde(default = "default_environment")]
    pub chef_environment: String,

    /// Roles and recipes explicitly assigned to the node
    #[serde(default)]
    pub run_list: Vec<String>,

    /// Normal attributes and any other free-form fields
    #[serde(flatten)]
    pub attributes: Document,
}

impl Node {
    /// Create an empty node with the default environment.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chef_environment: default_environment(),
            run_list: Vec::new(),
            attributes: Document::new(),
        }
    }

    /// Roles listed directly in the node's run list.
    pub fn explicit_roles(&self) -> Vec<String> {
        roles_in(&self.run_list).collect()
    }

    /// Recipes listed directly in the node's run list.
    pub fn explicit_recipes(&self) -> Vec<String> {
        recipes_in(&self.run_list).collect()
    }

    /// Whether the node is a placeholder that must never be configured.
    ///
    /// True when `dummy` is set to a truthy value or `tags` contains `"dummy"`.
    pub fn is_dummy(&self) -> bool {
        let flagged = match self.attributes.get("dummy") {
            Some(Value::Bool(b)) => *b,
            Some(Value::Null) | None => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        };
        let tagged = self
            .attributes
            .get("tags")
            .and_then(Value::as_array)
            .is_some_and(|tags| tags.iter().any(|t| t.as_str() == Some("dummy")));
        flagged || tagged
    }

    /// The node's recorded IP address, if any.
    pub fn ipaddress(&self) -> Option<&str> {
        self.attributes.get("ipaddress").and_then(Value::as_str)
    }

    /// Record a discovered IP address.
    pub fn set_ipaddress(&mut self, address: impl Into<String>) {
        self.attributes
            .insert("ipaddress".to_string(), Value::String(address.into()));
    }

    /// Whether the node's environment is one of the sentinel environments.
    pub fn has_default_environment(&self) -> bool {
        is_sentinel_environment(&self.chef_environment)
    }

    /// First label of the node name (`web1` for `web1.example.com`).
    pub fn hostname(&self) -> &str {
        self.name.split('.').next().unwrap_or_default()
    }

    /// Everything after the first label (`example.com` for `web1.example.com`).
    pub fn domain(&self) -> &str {
        self.name.split_once('.').map_or("", |(_, domain)| domain)
    }

    /// Identifier used for the node's data bag item.
    pub fn data_bag_id(&self) -> String {
        data_bag_id(&self.name)
    }

    /// The full record as a document, keys sorted.
    pub fn to_document(&self) -> Document {
        let mut doc = self.attributes.clone();
        doc.insert("name".to_string(), Value::String(self.name.clone()));
        doc.insert(
            "chef_environment".to_string(),
            Value::String(self.chef_environment.clone()),
        );
        doc.insert(
            "run_list".to_string(),
            Value::Array(self.run_list.iter().cloned().map(Value::String).collect()),
        );
        doc
    }

    /// The record without fields computed by resolution.
    pub fn sanitized(&self) -> Document {
        let mut doc = self.to_document();
        for field in DERIVED_FIELDS {
            doc.remove(*field);
        }
        doc
    }

    /// Normal attributes: every field except identity and run-list plumbing.
    pub fn normal_attributes(&self) -> Document {
        self.to_document()
            .into_iter()
            .filter(|(key, _)| !NON_ATTRIBUTE_FIELDS.contains(&key.as_str()))
            .collect()
    }
}

/// Whether `name` denotes the implicit environment.
pub fn is_sentinel_environment(name: &str) -> bool {
    name.is_empty() || name == DEFAULT_ENVIRONMENT || name == NO_ENVIRONMENT
}

/// Filesystem-safe identifier for a node name.
///
/// Every character outside `[A-Za-z0-9_-]` becomes an underscore, so
/// `web1.example.com` maps to `web1_example_com`.
pub fn data_bag_id(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// A named bundle of attributes plus an included run list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Role {
    /// Role name
    #[serde(default)]
    pub name: String,

    /// Free-text description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Attributes below node normal precedence
    #[serde(default)]
    pub default_attributes: Document,

    /// Attributes above node normal precedence
    #[serde(default)]
    pub override_attributes: Document,

    /// Included roles and recipes
    #[serde(default)]
    pub run_list: Vec<String>,
}

impl Role {
    /// Roles this role includes directly.
    pub fn included_roles(&self) -> Vec<String> {
        roles_in(&self.run_list).collect()
    }

    /// Recipes this role includes directly.
    pub fn included_recipes(&self) -> Vec<String> {
        recipes_in(&self.run_list).collect()
    }
}

/// A named attribute overlay applied to every node in it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    /// Environment name
    #[serde(default)]
    pub name: String,

    /// Attributes applied just above cookbook defaults
    #[serde(default)]
    pub default_attributes: Document,

    /// Attributes applied last, above everything else
    #[serde(default)]
    pub override_attributes: Document,
}

impl Environment {
    /// An environment with no attributes.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Metadata for one cookbook attribute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeMeta {
    /// Literal default value
    #[serde(default)]
    pub default: Option<Value>,

    /// Declared type (`"string"`, `"array"`, `"hash"`, ...)
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl AttributeMeta {
    /// The value this attribute contributes as a cookbook default.
    ///
    /// Hash attributes always start out empty, whatever literal default
    /// the metadata carries.
    pub fn default_value(&self) -> Value {
        if self.kind.as_deref() == Some("hash") {
            return Value::Object(Document::new());
        }
        self.default.clone().unwrap_or(Value::Null)
    }
}

/// A unit of configuration logic and the attribute defaults it declares.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    /// Recipe name (`nginx` or `nginx::source`)
    pub name: String,

    /// Attribute defaults keyed by slash-separated path
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeMeta>,
}
