use anyhow::Result;
use std::io::{self, Write};

use konnekt::db::DraftStore;
use konnekt::restore::newest_first;

use super::{format_created_at, truncate};

pub fn run(store: &DraftStore, json: bool) -> Result<()> {
    let drafts = newest_first(store.list()?);

    if json {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", serde_json::to_string_pretty(&drafts)?)?;
        return Ok(());
    }

    if drafts.is_empty() {
        println!("No drafts saved.");
        return Ok(());
    }

    println!("{} saved", drafts.len());
    for draft in drafts {
        let title = if draft.fields.title.is_empty() {
            "(untitled)"
        } else {
            draft.fields.title.as_str()
        };
        let photo = if draft.fields.image_data_url.is_some() {
            "[photo]"
        } else {
            ""
        };
        println!(
            "#{:<4} {:<40} {:16} {}",
            draft.id,
            truncate(title, 40),
            format_created_at(draft.fields.created_at),
            photo
        );
    }

    Ok(())
}
