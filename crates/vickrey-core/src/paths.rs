// Document layout shared by every component.
//
//   drafts/{draft_id}                    DraftSnapshot
//   drafts/{draft_id}/pages/{page_key}   PageDocument
//   teams/{username}                     TeamRecord

use crate::store::{DocPath, StoreError};

pub const DRAFTS: &str = "drafts";
pub const PAGES: &str = "pages";
pub const TEAMS: &str = "teams";

/// Page key of the page everyone can read.
pub const PUBLIC_PAGE_KEY: &str = "public";

pub fn draft(draft_id: &str) -> Result<DocPath, StoreError> {
    DocPath::from_segments(&[DRAFTS, draft_id])
}

pub fn page(draft_id: &str, page_key: &str) -> Result<DocPath, StoreError> {
    DocPath::from_segments(&[DRAFTS, draft_id, PAGES, page_key])
}

/// Collection path holding all pages of one draft.
pub fn pages_collection(draft_id: &str) -> String {
    format!("{DRAFTS}/{draft_id}/{PAGES}")
}

pub fn team(username: &str) -> Result<DocPath, StoreError> {
    DocPath::from_segments(&[TEAMS, username])
}
