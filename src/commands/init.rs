use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use konnekt::config::{drafts_db_path, WORKSPACE_DIR};
use konnekt::db::DraftStore;

pub fn run(dir: &Path) -> Result<()> {
    let workspace = dir.join(WORKSPACE_DIR);
    let db_path = drafts_db_path(&workspace);

    if db_path.exists() {
        println!("Already initialized at {}", workspace.display());
        return Ok(());
    }

    fs::create_dir_all(&workspace)
        .with_context(|| format!("Failed to create {}", workspace.display()))?;
    DraftStore::open(&db_path)
        .context("Failed to create draft store")?
        .close()?;

    println!("Initialized konnekt drafts in {}", workspace.display());
    Ok(())
}
