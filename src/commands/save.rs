use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use konnekt::compress::{compress_image, format_file_size, CompressionOptions};
use konnekt::dataurl;
use konnekt::db::DraftStore;
use konnekt::models::NewDraft;

/// Fields of the report form.
#[derive(Args, Debug, Clone, Default)]
pub struct ReportForm {
    /// Issue title
    pub title: String,
    /// What is wrong
    #[arg(short, long, default_value = "")]
    pub description: String,
    /// Category id
    #[arg(short, long, default_value = "")]
    pub category: String,
    /// Municipality id
    #[arg(short, long, default_value = "")]
    pub municipality: String,
    /// Street address
    #[arg(short, long)]
    pub address: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    pub latitude: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    pub longitude: Option<String>,
    /// Photo to attach
    #[arg(short, long)]
    pub image: Option<PathBuf>,
    /// Attach the photo without shrinking it
    #[arg(long)]
    pub no_compress: bool,
}

/// Read a photo and turn it into an inline data URL, shrinking it first
/// unless asked not to. Returns the file name to record alongside it.
pub fn attach_image(path: &Path, compress: bool) -> Result<(String, String)> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image.jpg".to_string());

    if compress {
        match compress_image(&bytes, &CompressionOptions::default()) {
            Ok(c) => {
                info!(
                    "Compressed {} from {} to {}",
                    name,
                    format_file_size(c.original_size as u64),
                    format_file_size(c.compressed_size as u64)
                );
                let stem = Path::new(&name)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "image".to_string());
                return Ok((format!("{}.jpg", stem), dataurl::encode(c.mime, &c.bytes)));
            }
            Err(e) => warn!("Could not compress {}, attaching it as-is: {}", name, e),
        }
    }

    let mime = dataurl::mime_for_name(&name);
    Ok((name, dataurl::encode(mime, &bytes)))
}

/// Build a draft from the form. A photo that cannot be read is dropped with a
/// warning; the rest of the report is still kept.
pub fn build_draft(form: &ReportForm, created_at: i64) -> NewDraft {
    let mut draft = NewDraft {
        title: form.title.clone(),
        description: form.description.clone(),
        category_id: form.category.clone(),
        municipality_id: form.municipality.clone(),
        address: form.address.clone(),
        latitude: form.latitude.clone(),
        longitude: form.longitude.clone(),
        image_name: None,
        image_data_url: None,
        created_at,
    };

    if let Some(path) = &form.image {
        draft.image_name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        match attach_image(path, !form.no_compress) {
            Ok((name, url)) => {
                draft.image_name = Some(name);
                draft.image_data_url = Some(url);
            }
            Err(e) => warn!("Failed to read image for draft: {:#}", e),
        }
    }

    draft
}

pub fn run(store: &DraftStore, form: &ReportForm) -> Result<i64> {
    let draft = build_draft(form, Utc::now().timestamp_millis());
    let id = store.save(&draft).context("Failed to save draft locally")?;
    println!("Saved draft #{}", id);
    Ok(id)
}
