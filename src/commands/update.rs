use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use konnekt::db::DraftStore;
use konnekt::models::Draft;

use super::save::attach_image;

/// Edits to apply to a stored draft. Anything left `None` keeps its value.
#[derive(Debug, Default)]
pub struct DraftEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub municipality: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub image: Option<PathBuf>,
    pub no_compress: bool,
    pub clear_image: bool,
}

impl DraftEdit {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.municipality.is_none()
            && self.address.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
            && self.image.is_none()
            && !self.clear_image
    }
}

/// Apply the edit to a copy of the draft and write the whole record back.
pub fn run(store: &DraftStore, id: i64, edit: DraftEdit) -> Result<()> {
    if edit.is_empty() {
        bail!("Nothing to update. Pass at least one field to change.");
    }
    if edit.clear_image && edit.image.is_some() {
        bail!("--image and --clear-image cannot be combined");
    }

    let mut draft: Draft = match store.get(id)? {
        Some(d) => d,
        None => bail!("Draft #{} not found", id),
    };
    apply(&mut draft, &edit)?;
    write_back(store, &draft)?;

    println!("Updated draft #{}", id);
    Ok(())
}

fn apply(draft: &mut Draft, edit: &DraftEdit) -> Result<()> {
    let f = &mut draft.fields;

    if let Some(v) = &edit.title {
        f.title = v.clone();
    }
    if let Some(v) = &edit.description {
        f.description = v.clone();
    }
    if let Some(v) = &edit.category {
        f.category_id = v.clone();
    }
    if let Some(v) = &edit.municipality {
        f.municipality_id = v.clone();
    }
    if let Some(v) = &edit.address {
        f.address = Some(v.clone()).filter(|a| !a.is_empty());
    }
    if let Some(v) = &edit.latitude {
        f.latitude = Some(v.clone()).filter(|a| !a.is_empty());
    }
    if let Some(v) = &edit.longitude {
        f.longitude = Some(v.clone()).filter(|a| !a.is_empty());
    }
    if edit.clear_image {
        f.image_name = None;
        f.image_data_url = None;
    }
    if let Some(path) = &edit.image {
        let (name, url) = attach_image(path, !edit.no_compress)?;
        f.image_name = Some(name);
        f.image_data_url = Some(url);
    }
    Ok(())
}

/// The draft may have been synced while the edit was being prepared; it must
/// not come back in that case.
fn write_back(store: &DraftStore, draft: &Draft) -> Result<()> {
    let replaced = store
        .replace(draft)
        .with_context(|| format!("Failed to update draft #{}", draft.id))?;
    if !replaced {
        bail!("Draft #{} was already synced or deleted", draft.id);
    }
    Ok(())
}
