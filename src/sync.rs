use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::dataurl;
use crate::db::DraftStore;
use crate::error::{StoreError, SyncError};
use crate::models::{CreatedRecord, NewDraft, NewIssue, User};
use crate::remote::{BlobStore, Identity, RecordStore, ISSUES_COLLECTION, ISSUE_IMAGES_BUCKET};

/// Build the remote issue row for a draft. This is where the fields that may
/// be blank while editing become mandatory.
pub fn build_issue(
    draft: &NewDraft,
    reporter: &User,
    image_url: Option<String>,
) -> Result<NewIssue, SyncError> {
    for (name, value) in [
        ("title", &draft.title),
        ("description", &draft.description),
        ("category", &draft.category_id),
        ("municipality", &draft.municipality_id),
    ] {
        if value.trim().is_empty() {
            return Err(SyncError::InvalidDraft(format!("{} is required", name)));
        }
    }

    Ok(NewIssue {
        title: draft.title.clone(),
        description: draft.description.clone(),
        category_id: draft.category_id.clone(),
        municipality_id: draft.municipality_id.clone(),
        reporter_id: reporter.id.clone(),
        latitude: parse_coordinate("latitude", draft.latitude.as_deref())?,
        longitude: parse_coordinate("longitude", draft.longitude.as_deref())?,
        address: draft.address.clone().filter(|a| !a.trim().is_empty()),
        image_url,
    })
}

fn parse_coordinate(name: &str, value: Option<&str>) -> Result<Option<f64>, SyncError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(Some)
            .ok_or_else(|| SyncError::InvalidDraft(format!("{} '{}' is not a number", name, v))),
    }
}

/// Object name for an uploaded photo: upload time, then the draft id when
/// there is one, so two drafts in the same millisecond cannot collide.
pub fn blob_name(now_ms: i64, draft_id: Option<i64>, image_name: Option<&str>) -> String {
    let ext = image_name
        .and_then(dataurl::extension)
        .unwrap_or_else(|| "jpg".to_string());
    match draft_id {
        Some(id) => format!("{}-{}.{}", now_ms, id, ext),
        None => format!("{}.{}", now_ms, ext),
    }
}

async fn within<T, E>(
    limit: Duration,
    what: &'static str,
    fut: impl Future<Output = Result<T, E>>,
    wrap: impl FnOnce(E) -> SyncError,
) -> Result<T, SyncError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(wrap(e)),
        Err(_) => Err(SyncError::Timeout(what)),
    }
}

/// Uploads an optional photo and creates one issue. Shared by the sync pass
/// and by direct online submission.
pub struct Submitter<'a, R, B> {
    records: &'a R,
    blobs: &'a B,
    timeout: Duration,
}

impl<'a, R: RecordStore, B: BlobStore> Submitter<'a, R, B> {
    pub fn new(records: &'a R, blobs: &'a B, timeout: Duration) -> Self {
        Self {
            records,
            blobs,
            timeout,
        }
    }

    pub async fn submit(
        &self,
        draft: &NewDraft,
        draft_id: Option<i64>,
        reporter: &User,
    ) -> Result<CreatedRecord, SyncError> {
        // Validate before uploading so a bad draft leaves no orphaned blob
        build_issue(draft, reporter, None)?;

        let image_url = match &draft.image_data_url {
            Some(url) => Some(self.upload_image(draft, draft_id, url).await?),
            None => None,
        };

        let issue = build_issue(draft, reporter, image_url)?;
        let fields = serde_json::to_value(&issue)
            .map_err(|e| SyncError::InvalidDraft(format!("cannot encode issue: {}", e)))?;

        within(
            self.timeout,
            "issue creation",
            self.records.create(ISSUES_COLLECTION, fields),
            SyncError::Create,
        )
        .await
    }

    async fn upload_image(
        &self,
        draft: &NewDraft,
        draft_id: Option<i64>,
        data_url: &str,
    ) -> Result<String, SyncError> {
        let image = dataurl::decode(data_url)?;
        let name = blob_name(
            Utc::now().timestamp_millis(),
            draft_id,
            draft.image_name.as_deref(),
        );
        let content_type = if image.mime == "application/octet-stream" {
            draft
                .image_name
                .as_deref()
                .map(dataurl::mime_for_name)
                .unwrap_or("image/jpeg")
                .to_string()
        } else {
            image.mime
        };

        debug!(blob = %name, size = image.bytes.len(), "Uploading draft image");
        let stored = within(
            self.timeout,
            "image upload",
            self.blobs
                .upload(ISSUE_IMAGES_BUCKET, &name, &content_type, image.bytes),
            SyncError::Upload,
        )
        .await?;

        Ok(stored.path)
    }
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub synced: Vec<i64>,
    pub failed: Vec<(i64, SyncError)>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug)]
pub enum SyncPass {
    Completed(SyncReport),
    /// Nothing was attempted; every draft is still queued.
    Deferred { pending: usize, reason: SyncError },
    /// Another pass is still in flight.
    AlreadyRunning,
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Walks every stored draft once per pass. Each draft either becomes an
/// issue and is removed locally, or stays exactly as it was for next time.
pub struct SyncCoordinator<'a, R, B, I> {
    store: &'a DraftStore,
    submitter: Submitter<'a, R, B>,
    identity: &'a I,
    timeout: Duration,
    running: AtomicBool,
}

impl<'a, R, B, I> SyncCoordinator<'a, R, B, I>
where
    R: RecordStore,
    B: BlobStore,
    I: Identity,
{
    pub fn new(
        store: &'a DraftStore,
        records: &'a R,
        blobs: &'a B,
        identity: &'a I,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            submitter: Submitter::new(records, blobs, timeout),
            identity,
            timeout,
            running: AtomicBool::new(false),
        }
    }

    /// Run one pass over every stored draft.
    ///
    /// Only failing to read the draft table is an error here; per-draft
    /// failures end up in the report.
    pub async fn run_pass(&self) -> Result<SyncPass, StoreError> {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Sync pass already in flight");
            return Ok(SyncPass::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.running);

        // Other handles on the same table, e.g. `watch` next to `sync`
        let _lock = match self.store.try_lock_sync()? {
            Some(lock) => lock,
            None => {
                debug!("Sync pass running against the same drafts elsewhere");
                return Ok(SyncPass::AlreadyRunning);
            }
        };

        let drafts = self.store.list()?;
        if drafts.is_empty() {
            return Ok(SyncPass::Completed(SyncReport::default()));
        }

        let reporter = match within(
            self.timeout,
            "user lookup",
            self.identity.current_user(),
            SyncError::Identity,
        )
        .await
        {
            Ok(Some(user)) => user,
            Ok(None) => {
                info!(pending = drafts.len(), "No signed-in user; drafts stay queued");
                return Ok(SyncPass::Deferred {
                    pending: drafts.len(),
                    reason: SyncError::Unauthenticated,
                });
            }
            Err(e) => {
                warn!(pending = drafts.len(), "Could not resolve user, skipping sync: {}", e);
                return Ok(SyncPass::Deferred {
                    pending: drafts.len(),
                    reason: e,
                });
            }
        };

        info!(count = drafts.len(), "Syncing drafts");
        let mut report = SyncReport::default();

        for draft in drafts {
            match self
                .submitter
                .submit(&draft.fields, Some(draft.id), &reporter)
                .await
            {
                Ok(record) => match self.store.delete(draft.id) {
                    Ok(()) => {
                        info!(draft_id = draft.id, issue_id = %record.id, "Draft synced");
                        report.synced.push(draft.id);
                    }
                    Err(e) => {
                        warn!(
                            draft_id = draft.id,
                            issue_id = %record.id,
                            "Issue created but draft not removed, it may be submitted again: {}",
                            e
                        );
                        report.failed.push((draft.id, SyncError::LocalDelete(e)));
                    }
                },
                Err(e) => {
                    warn!(draft_id = draft.id, "Draft did not sync, keeping it for retry: {}", e);
                    report.failed.push((draft.id, e));
                }
            }
        }

        Ok(SyncPass::Completed(report))
    }
}
