use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use konnekt::db::DraftStore;
use konnekt::models::NewDraft;
use konnekt::restore::{latest, restore, RestoredReport};

/// What gets printed for the form to pre-fill. The photo itself goes to a file.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Prefill<'a> {
    draft_id: i64,
    title: &'a str,
    description: &'a str,
    category_id: &'a str,
    municipality_id: &'a str,
    address: Option<&'a str>,
    latitude: Option<&'a str>,
    longitude: Option<&'a str>,
    image_name: Option<&'a str>,
    image_path: Option<PathBuf>,
}

fn prefill<'a>(report: &'a RestoredReport, image_path: Option<PathBuf>) -> Prefill<'a> {
    let f: &NewDraft = &report.fields;
    Prefill {
        draft_id: report.draft_id,
        title: &f.title,
        description: &f.description,
        category_id: &f.category_id,
        municipality_id: &f.municipality_id,
        address: f.address.as_deref(),
        latitude: f.latitude.as_deref(),
        longitude: f.longitude.as_deref(),
        image_name: report.image.as_ref().map(|i| i.name.as_str()),
        image_path,
    }
}

/// Restore a draft for editing. Without an id, the most recent one is used.
pub fn run(store: &DraftStore, id: Option<i64>, image_out: Option<&Path>) -> Result<RestoredReport> {
    let draft = match id {
        Some(id) => match store.get(id)? {
            Some(d) => d,
            None => bail!("Draft #{} not found", id),
        },
        None => {
            let drafts = store.list()?;
            match latest(&drafts) {
                Some(d) => d.clone(),
                None => bail!("No drafts saved."),
            }
        }
    };

    let report = restore(&draft).with_context(|| format!("Draft #{} has a corrupt photo", draft.id))?;

    let mut image_path = None;
    if let (Some(image), Some(dir_or_file)) = (&report.image, image_out) {
        let target = if dir_or_file.is_dir() {
            // Only the final component; a stored name must not escape the directory
            let name = Path::new(&image.name)
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "draft.jpg".into());
            dir_or_file.join(name)
        } else {
            dir_or_file.to_path_buf()
        };
        fs::write(&target, &image.bytes)
            .with_context(|| format!("Failed to write photo to {}", target.display()))?;
        image_path = Some(target);
    }

    println!("{}", serde_json::to_string_pretty(&prefill(&report, image_path))?);
    Ok(report)
}
