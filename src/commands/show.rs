use anyhow::{bail, Result};

use konnekt::db::DraftStore;

use super::format_created_at;

pub fn run(store: &DraftStore, id: i64) -> Result<()> {
    let draft = match store.get(id)? {
        Some(d) => d,
        None => bail!("Draft #{} not found", id),
    };
    let f = &draft.fields;

    println!("Draft #{}: {}", draft.id, f.title);
    println!("Saved:        {}", format_created_at(f.created_at));
    println!("Category:     {}", f.category_id);
    println!("Municipality: {}", f.municipality_id);

    if let Some(address) = &f.address {
        println!("Address:      {}", address);
    }
    if let (Some(lat), Some(lon)) = (&f.latitude, &f.longitude) {
        println!("Location:     {}, {}", lat, lon);
    }
    if f.image_data_url.is_some() {
        println!(
            "Photo:        {}",
            f.image_name.as_deref().unwrap_or("(unnamed)")
        );
    }

    println!("\nDescription:");
    if f.description.is_empty() {
        println!("  (none)");
    } else {
        for line in f.description.lines() {
            println!("  {}", line);
        }
    }

    Ok(())
}
