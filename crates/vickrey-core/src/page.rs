// Derived page document, stored at `drafts/{id}/pages/{page_key}`.

use serde::{Deserialize, Serialize};

use crate::paths::PUBLIC_PAGE_KEY;

/// Rendered markup for one page of a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageDocument {
    pub html: String,
    /// Version of the draft document the markup was rendered from. Pages
    /// written before versions were tracked read as 0.
    #[serde(default)]
    pub source_version: u64,
}

/// Whether `display_name` can serve as a participant page key. The public
/// key is reserved and keys cannot contain path separators.
pub fn is_participant_page_key(display_name: &str) -> bool {
    !display_name.is_empty() && display_name != PUBLIC_PAGE_KEY && !display_name.contains('/')
}
