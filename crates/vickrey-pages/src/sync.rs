// Page synchronizer: keeps `drafts/{id}/pages/*` in step with the draft.
//
// Each page records the draft version it was rendered from. A write only
// lands if that version is not older than what the page already holds, and
// the check-then-write is a compare-and-swap on the page document, so a slow
// invocation can never clobber a page rendered from a newer draft.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument};

use vickrey_core::draft::DraftSnapshot;
use vickrey_core::page::{is_participant_page_key, PageDocument};
use vickrey_core::paths::{self, DRAFTS, PUBLIC_PAGE_KEY};
use vickrey_core::store::{
    relative_path, ChangeEvent, ChangeKind, DocPath, DocumentStore, DocumentStoreExt,
    Precondition, StoreError,
};

use crate::pages::{render_public_page, render_team_page};

/// Attempts per page before a write that keeps losing races gives up.
const MAX_WRITE_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("cannot determine draft id from `{resource}`")]
    Parse { resource: String },

    #[error("failed to read draft {draft_id}: {source}")]
    Read {
        draft_id: String,
        source: StoreError,
    },

    #[error("failed to write page `{page_key}`: {source}")]
    Write {
        page_key: String,
        source: StoreError,
    },
}

/// Summary of one synchronization pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub draft_id: String,
    pub written: usize,
    /// Pages left alone because they already reflect a newer draft version.
    pub skipped_stale: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The change was a delete; nothing was touched.
    Ignored,
    Synced(SyncReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageWrite {
    Written,
    Stale,
}

#[derive(Clone)]
pub struct Synchronizer {
    store: Arc<dyn DocumentStore>,
}

impl Synchronizer {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// React to one change notification on the drafts collection.
    pub fn handle_change(&self, event: &ChangeEvent) -> Result<SyncOutcome, SyncError> {
        if event.kind == ChangeKind::Deleted {
            debug!(resource = %event.resource, "ignoring delete");
            return Ok(SyncOutcome::Ignored);
        }
        let draft_id = draft_id_from_resource(&event.resource)?;
        self.sync_draft(&draft_id).map(SyncOutcome::Synced)
    }

    /// Re-read the draft and rewrite its public page and one page per
    /// participant. Pages already written stay written if a later one fails.
    #[instrument(skip(self))]
    pub fn sync_draft(&self, draft_id: &str) -> Result<SyncReport, SyncError> {
        let read_err = |source| SyncError::Read {
            draft_id: draft_id.to_string(),
            source,
        };
        let path = paths::draft(draft_id).map_err(read_err)?;
        let (snapshot, version) = self
            .store
            .get_as::<DraftSnapshot>(&path)
            .map_err(read_err)?
            .ok_or_else(|| read_err(StoreError::NotFound(path.to_string())))?;

        // Render everything before writing anything so a bad participant name
        // fails the pass with no partial output.
        let mut rendered = Vec::with_capacity(snapshot.users.len() + 1);
        rendered.push((
            PUBLIC_PAGE_KEY.to_string(),
            render_public_page(draft_id, &snapshot),
        ));
        let mut seen = HashSet::with_capacity(snapshot.users.len());
        for participant in &snapshot.users {
            let key = participant.display_name.as_str();
            let problem = if !is_participant_page_key(key) {
                Some("reserved or malformed page key")
            } else if !seen.insert(key) {
                Some("page key used by another participant")
            } else {
                None
            };
            if let Some(reason) = problem {
                return Err(SyncError::Write {
                    page_key: key.to_string(),
                    source: StoreError::InvalidPath {
                        path: format!("{}/{key}", paths::pages_collection(draft_id)),
                        reason,
                    },
                });
            }
            rendered.push((
                key.to_string(),
                render_team_page(draft_id, &snapshot, participant),
            ));
        }

        let mut report = SyncReport {
            draft_id: draft_id.to_string(),
            written: 0,
            skipped_stale: 0,
        };
        for (page_key, html) in rendered {
            let write_err = |source| SyncError::Write {
                page_key: page_key.clone(),
                source,
            };
            let page_path = paths::page(draft_id, &page_key).map_err(write_err)?;
            match write_page(self.store.as_ref(), &page_path, html, version).map_err(write_err)? {
                PageWrite::Written => report.written += 1,
                PageWrite::Stale => {
                    debug!(page_key = %page_key, version, "page already newer, skipped");
                    report.skipped_stale += 1;
                }
            }
        }

        info!(
            written = report.written,
            skipped_stale = report.skipped_stale,
            version,
            "pages synchronized"
        );
        Ok(report)
    }
}

/// Extract `{id}` from `.../documents/drafts/{id}`.
pub fn draft_id_from_resource(resource: &str) -> Result<String, SyncError> {
    let parse_err = || SyncError::Parse {
        resource: resource.to_string(),
    };
    let rel = relative_path(resource).ok_or_else(parse_err)?;
    let path = DocPath::parse(rel).map_err(|_| parse_err())?;
    if path.collection() != DRAFTS {
        return Err(parse_err());
    }
    Ok(path.id().to_string())
}

fn write_page(
    store: &dyn DocumentStore,
    path: &DocPath,
    html: String,
    source_version: u64,
) -> Result<PageWrite, StoreError> {
    let page = PageDocument {
        html,
        source_version,
    };
    let mut attempt = 0;
    loop {
        attempt += 1;
        let precondition = match store.get(path)? {
            Some(doc) => {
                let existing = doc
                    .fields
                    .get("source_version")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                if existing > source_version {
                    return Ok(PageWrite::Stale);
                }
                Precondition::Version(doc.version)
            }
            None => Precondition::Missing,
        };
        match store.set_from(path, &page, precondition) {
            Ok(_) => return Ok(PageWrite::Written),
            Err(StoreError::Conflict { .. } | StoreError::AlreadyExists(_))
                if attempt < MAX_WRITE_ATTEMPTS =>
            {
                debug!(path = %path, attempt, "page changed underneath us, retrying");
            }
            Err(e) => return Err(e),
        }
    }
}
