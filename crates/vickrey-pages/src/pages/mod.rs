//! Renderers for the pages derived from a draft snapshot. Output depends only
//! on the inputs, so re-rendering an unchanged snapshot yields identical
//! markup.

mod public;
mod team;

pub use public::render_public_page;
pub use team::render_team_page;
