//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `indiek_core` linkage.
//! - Exercise one save/load cycle against the configured SQLite store.
//! - Keep output deterministic for quick local sanity checks.

use indiek_core::{CoreConfig, ItemKind, KnowledgeBase, SqliteStore};
use log::info;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    let config = CoreConfig::from_env()?;
    if std::env::var_os(indiek_core::config::ENV_LOG_DIR).is_some() {
        config.init_logging()?;
    }

    let conn = config.open_database()?;
    let store = SqliteStore::try_new(&conn)?;
    let mut kb = KnowledgeBase::new(&store);

    let inner = kb.create_text_note("for every epsilon");
    let content = kb.create_text_note("limit:");
    kb.add_content(content, inner)?;
    let item = kb.create_item(ItemKind::Definition, "continuity", content)?;
    let id = kb.save_item(item)?;
    info!("event=cli_smoke module=cli status=ok item_id={id}");

    let mut fresh = KnowledgeBase::new(&store);
    let loaded = fresh.load_item(ItemKind::Definition, id)?;
    let loaded_content = fresh.item(loaded)?.content();

    println!("indiek_core ping={}", indiek_core::ping());
    println!("indiek_core version={}", indiek_core::core_version());
    println!(
        "{} {id}: {} (depth {})",
        ItemKind::Definition,
        fresh.render_note(loaded_content)?,
        fresh.depth(loaded_content)?
    );
    Ok(())
}
