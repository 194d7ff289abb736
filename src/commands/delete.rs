use anyhow::{bail, Result};
use std::io::{self, Write};

use konnekt::db::DraftStore;

pub fn run(store: &DraftStore, id: i64, force: bool) -> Result<()> {
    // Check it exists first so the prompt can name it
    let draft = match store.get(id)? {
        Some(d) => d,
        None => bail!("Draft #{} not found", id),
    };

    if !force {
        print!("Delete draft #{} \"{}\"? [y/N] ", id, draft.fields.title);
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    store.delete(id)?;
    println!("Deleted draft #{}", id);

    Ok(())
}

/// Internal function for testing without stdin interaction
#[cfg(test)]
pub fn run_force(store: &DraftStore, id: i64) -> Result<()> {
    run(store, id, true)
}
