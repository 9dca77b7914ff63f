//! # kitchen
//!
//! Kitchen catalog loading and layered attribute resolution for chef-solo
//! nodes.
//!
//! A kitchen is a directory of nodes, roles, environments and cookbooks. This
//! crate reads it, expands each node's roles and recipes, and merges the
//! attribute layers into one document per node:
//!
//! ```text
//! cookbook default < environment default < role default
//!     < node normal < role override < environment override
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use kitchen::{Catalog, KitchenLayout, resolve};
//!
//! let layout = KitchenLayout::new(".");
//! let catalog = Catalog::load(&layout)?;
//! let node = catalog.node("web1.example.com")?;
//! let env = catalog.environment_for(node)?;
//!
//! let resolved = resolve(node, &catalog.recipes, &catalog.roles, &env)?;
//! println!("{}", serde_json::to_string_pretty(&resolved.document)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod databag;
pub mod document;
pub mod error;
pub mod resolve;
pub mod types;

pub use catalog::{Catalog, KitchenLayout};
pub use databag::{DataBagGuard, materialize};
pub use document::{Document, merge, set_path};
pub use error::{Error, Result};
pub use resolve::{ResolvedNode, resolve};
pub use types::{AttributeMeta, Environment, Node, Recipe, Role, RunListEntry, data_bag_id};
