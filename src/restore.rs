use crate::dataurl;
use crate::error::DataUrlError;
use crate::models::{Draft, NewDraft};

const DEFAULT_IMAGE_NAME: &str = "draft.jpg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredImage {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// A draft's text fields plus its photo as real bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoredReport {
    pub draft_id: i64,
    pub fields: NewDraft,
    pub image: Option<RestoredImage>,
}

/// Most recent first, the order drafts are offered in.
pub fn newest_first(mut drafts: Vec<Draft>) -> Vec<Draft> {
    drafts.sort_by(|a, b| {
        b.fields
            .created_at
            .cmp(&a.fields.created_at)
            .then(b.id.cmp(&a.id))
    });
    drafts
}

/// The draft offered to pre-fill the report form.
pub fn latest(drafts: &[Draft]) -> Option<&Draft> {
    drafts
        .iter()
        .max_by(|a, b| a.fields.created_at.cmp(&b.fields.created_at).then(a.id.cmp(&b.id)))
}

pub fn restore(draft: &Draft) -> Result<RestoredReport, DataUrlError> {
    let image = match &draft.fields.image_data_url {
        Some(url) => {
            let decoded = dataurl::decode(url)?;
            Some(RestoredImage {
                name: draft
                    .fields
                    .image_name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_IMAGE_NAME.to_string()),
                mime: decoded.mime,
                bytes: decoded.bytes,
            })
        }
        None => None,
    };

    Ok(RestoredReport {
        draft_id: draft.id,
        fields: draft.fields.clone(),
        image,
    })
}
