use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::time::Duration;
use tracing::warn;

use konnekt::db::DraftStore;
use konnekt::models::NewDraft;
use konnekt::remote::{BlobStore, ConnectivityProbe, Identity, RecordStore};
use konnekt::sync::Submitter;

use super::save::{build_draft, ReportForm};

pub const OFFLINE_NOTICE: &str =
    "You are offline — draft saved locally and will sync when online.";

#[derive(Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted { issue_id: String },
    SavedOffline { draft_id: i64 },
    /// Offline and the draft table could not be used either.
    NotSaved,
}

pub struct Remote<'a, Q, R, B, I> {
    pub probe: &'a Q,
    pub records: &'a R,
    pub blobs: &'a B,
    pub identity: &'a I,
    pub timeout: Duration,
}

/// File a report: straight to the backend when online, otherwise as a local
/// draft. The draft table is only opened when it is needed.
pub async fn run<Q, R, B, I>(
    open_store: impl FnOnce() -> Result<DraftStore>,
    remote: Remote<'_, Q, R, B, I>,
    form: &ReportForm,
) -> Result<SubmitOutcome>
where
    Q: ConnectivityProbe,
    R: RecordStore,
    B: BlobStore,
    I: Identity,
{
    let draft = build_draft(form, Utc::now().timestamp_millis());

    if !remote.probe.is_online().await {
        return Ok(save_offline(open_store, &draft));
    }

    let user = match remote.identity.current_user().await? {
        Some(user) => user,
        None => bail!("You must be signed in to submit a report. Set KONNEKT_ACCESS_TOKEN."),
    };

    let submitter = Submitter::new(remote.records, remote.blobs, remote.timeout);
    let record = submitter
        .submit(&draft, None, &user)
        .await
        .context("Failed to submit report")?;

    println!("Submitted issue {}", record.id);
    Ok(SubmitOutcome::Submitted {
        issue_id: record.id,
    })
}

/// File a report with no backend configured at all. Same as being offline.
pub fn run_offline(open_store: impl FnOnce() -> Result<DraftStore>, form: &ReportForm) -> SubmitOutcome {
    let draft = build_draft(form, Utc::now().timestamp_millis());
    save_offline(open_store, &draft)
}

fn save_offline(open_store: impl FnOnce() -> Result<DraftStore>, draft: &NewDraft) -> SubmitOutcome {
    let saved = open_store().and_then(|store| {
        store
            .save(draft)
            .context("Failed to save draft locally")
    });
    match saved {
        Ok(id) => {
            println!("{}", OFFLINE_NOTICE);
            println!("Saved draft #{}", id);
            SubmitOutcome::SavedOffline { draft_id: id }
        }
        Err(e) => {
            warn!("Drafts are unavailable: {:#}", e);
            println!("You are offline and drafts are unavailable on this device; the report was not saved.");
            SubmitOutcome::NotSaved
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fake::FakeBackend;
    use tempfile::tempdir;

    fn form(title: &str) -> ReportForm {
        ReportForm {
            title: title.to_string(),
            description: "Streetlight out".to_string(),
            category: "1".to_string(),
            municipality: "2".to_string(),
            ..Default::default()
        }
    }

    fn remote(backend: &FakeBackend) -> Remote<'_, FakeBackend, FakeBackend, FakeBackend, FakeBackend> {
        Remote {
            probe: backend,
            records: backend,
            blobs: backend,
            identity: backend,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_offline_saves_draft() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("drafts.db");
        let backend = FakeBackend::signed_in().with_connectivity(&[false]);

        let outcome = run(
            || Ok(DraftStore::open(&db_path)?),
            remote(&backend),
            &form("Dark corner"),
        )
        .await
        .unwrap();

        assert_eq!(outcome, SubmitOutcome::SavedOffline { draft_id: 1 });
        assert!(backend.creates.lock().unwrap().is_empty());

        let store = DraftStore::open(&db_path).unwrap();
        assert_eq!(store.list().unwrap()[0].fields.title, "Dark corner");
    }

    #[test]
    fn test_unconfigured_backend_saves_draft() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("drafts.db");

        let outcome = run_offline(|| Ok(DraftStore::open(&db_path)?), &form("No backend yet"));

        assert_eq!(outcome, SubmitOutcome::SavedOffline { draft_id: 1 });
        let store = DraftStore::open(&db_path).unwrap();
        assert_eq!(store.list().unwrap()[0].fields.title, "No backend yet");
    }

    #[tokio::test]
    async fn test_offline_without_storage_does_not_fail() {
        let backend = FakeBackend::signed_in().with_connectivity(&[false]);

        let outcome = run(
            || bail!("storage disabled"),
            remote(&backend),
            &form("Nowhere to go"),
        )
        .await
        .unwrap();

        assert_eq!(outcome, SubmitOutcome::NotSaved);
    }

    #[tokio::test]
    async fn test_online_submits_without_touching_drafts() {
        let backend = FakeBackend::signed_in().with_connectivity(&[true]);

        let outcome = run(
            || panic!("draft store should not be opened while online"),
            remote(&backend),
            &form("Online report"),
        )
        .await
        .unwrap();

        assert_eq!(
            outcome,
            SubmitOutcome::Submitted {
                issue_id: "issue-1".to_string()
            }
        );
        let creates = backend.creates.lock().unwrap();
        assert_eq!(creates[0]["reporter_id"], "citizen-1");
        assert_eq!(creates[0]["title"], "Online report");
    }

    #[tokio::test]
    async fn test_online_requires_sign_in() {
        let backend = FakeBackend::default().with_connectivity(&[true]);

        let result = run(
            || panic!("draft store should not be opened while online"),
            remote(&backend),
            &form("Anonymous"),
        )
        .await;

        assert!(result.unwrap_err().to_string().contains("signed in"));
        assert!(backend.creates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_online_rejection_is_an_error() {
        let backend = FakeBackend::signed_in().with_connectivity(&[true]);
        backend
            .rejected_titles
            .lock()
            .unwrap()
            .insert("Rejected".to_string());

        let result = run(
            || panic!("draft store should not be opened while online"),
            remote(&backend),
            &form("Rejected"),
        )
        .await;

        assert!(result.is_err());
    }
}
