use vickrey_core::draft::{DraftSnapshot, Participant};

use crate::builder::build_page;
use crate::components::{labeled_list, Header, Markup, Script};

/// The page for one participant: their budget plus the shared draft view.
pub fn render_team_page(draft_id: &str, snapshot: &DraftSnapshot, participant: &Participant) -> String {
    let title = format!("{}'s Draft", participant.display_name);
    let header = Header {
        title: title.clone(),
    };
    let budget = Markup {
        html: format!("<p>Budget: ${}</p>", participant.current_budget),
    };
    let users = labeled_list(
        "Users",
        snapshot.users.iter().map(|u| u.display_name.as_str()),
    );
    let players = labeled_list(
        "Players",
        snapshot.players.iter().map(|p| p.full_name.as_str()),
    );
    let refresh = Script::live_refresh(draft_id, &participant.display_name);

    build_page(&title, &[&header, &budget, &users, &players, &refresh])
}
