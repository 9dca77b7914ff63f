use super::Kitchen;
use crate::Context;
use crate::ui;
use anyhow::Result;
use cook::{Error, LockCoordinator};

pub fn lock(ctx: &Context, node: &str, reason: &str) -> Result<()> {
    let kitchen = Kitchen::open(ctx)?;
    let catalog = kitchen.catalog()?;
    let node = catalog.node(node)?;
    let settings = kitchen.settings(false, false);
    let run_ctx = kitchen.run_context(&settings);

    let transport = kitchen.connect(node)?;
    match LockCoordinator::new(transport.as_ref()).acquire(&run_ctx, node, reason) {
        Ok(info) => {
            ui::success(&format!("Locked {}", node.name));
            ui::kv("author", &info.author);
            ui::kv("reason", &info.reason);
            Ok(())
        }
        Err(Error::AlreadyLocked {
            node,
            author,
            reason,
        }) => {
            ui::warn(&format!("{node} is already locked"));
            ui::kv("author", &author);
            ui::kv("reason", &reason);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub fn unlock(ctx: &Context, node: &str) -> Result<()> {
    let kitchen = Kitchen::open(ctx)?;
    let catalog = kitchen.catalog()?;
    let node = catalog.node(node)?;
    let settings = kitchen.settings(false, false);
    let run_ctx = kitchen.run_context(&settings);

    let transport = kitchen.connect(node)?;
    match LockCoordinator::new(transport.as_ref()).release(&run_ctx, node) {
        Ok(()) => {
            ui::success(&format!("Unlocked {}", node.name));
            Ok(())
        }
        Err(Error::NotLocked { node }) => {
            ui::warn(&format!("{node} is not locked"));
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
