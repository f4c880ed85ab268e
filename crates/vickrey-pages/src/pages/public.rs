use vickrey_core::draft::DraftSnapshot;
use vickrey_core::paths::PUBLIC_PAGE_KEY;

use crate::builder::build_page;
use crate::components::{labeled_list, Header, JoinForm, Script};

const TITLE: &str = "Join Draft";

/// The page anyone can read: who is in the draft, who is available, and the
/// form to join.
pub fn render_public_page(draft_id: &str, snapshot: &DraftSnapshot) -> String {
    let header = Header {
        title: TITLE.to_string(),
    };
    let users = labeled_list(
        "Users",
        snapshot.users.iter().map(|u| u.display_name.as_str()),
    );
    let players = labeled_list(
        "Players",
        snapshot.players.iter().map(|p| p.full_name.as_str()),
    );
    let refresh = Script::live_refresh(draft_id, PUBLIC_PAGE_KEY);
    let join = JoinForm {
        draft_id: draft_id.to_string(),
    };

    build_page(TITLE, &[&header, &users, &players, &refresh, &join])
}
