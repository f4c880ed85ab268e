// Reusable page fragments.

use crate::builder::{escape_html, js_string, Fragment};

const JOIN_FORM_JS: &str = include_str!("../assets/join_form.js");
const LIVE_REFRESH_JS: &str = include_str!("../assets/live_refresh.js");

/// Page heading.
pub struct Header {
    pub title: String,
}

impl Fragment for Header {
    fn body(&self) -> String {
        format!("<h1>{}</h1>", escape_html(&self.title))
    }
}

/// Pre-built markup, inserted verbatim.
pub struct Markup {
    pub html: String,
}

impl Fragment for Markup {
    fn body(&self) -> String {
        self.html.clone()
    }
}

/// A module script, inserted verbatim.
pub struct Script {
    pub javascript: String,
}

impl Script {
    /// Script that polls the given page and swaps in fresh `#root` content.
    pub fn live_refresh(draft_id: &str, page_key: &str) -> Self {
        Self {
            javascript: format!(
                "const DRAFT_ID = {};\nconst PAGE_KEY = {};\n{LIVE_REFRESH_JS}",
                js_string(draft_id),
                js_string(page_key)
            ),
        }
    }
}

impl Fragment for Script {
    fn script(&self) -> String {
        format!("<script type=\"module\">\n{}</script>", self.javascript)
    }
}

/// Login form posting to the broker, then loading the team's page.
pub struct JoinForm {
    pub draft_id: String,
}

impl Fragment for JoinForm {
    fn head(&self) -> String {
        "<style>
#joinDraftForm{display:flex;flex-direction:column;gap:.75rem;max-width:28rem}
#joinDraftForm input{width:100%;padding:.5rem .75rem;font-size:1rem;box-sizing:border-box}
</style>"
            .to_string()
    }

    fn body(&self) -> String {
        "<form id=\"joinDraftForm\">
<input type=\"text\" id=\"sleeperUsername\" name=\"sleeperUsername\" placeholder=\"Enter Sleeper username\" autocomplete=\"username\" required>
<input type=\"password\" id=\"draftPassword\" name=\"draftPassword\" placeholder=\"Password\" autocomplete=\"current-password\" required>
<button type=\"submit\">Join Draft</button>
</form>"
            .to_string()
    }

    fn script(&self) -> String {
        format!(
            "<script type=\"module\">\nconst DRAFT_ID = {};\n{JOIN_FORM_JS}</script>",
            js_string(&self.draft_id)
        )
    }
}

/// `<p>{label}: a, b, c</p>` with every item escaped.
pub fn labeled_list<'a>(label: &str, items: impl IntoIterator<Item = &'a str>) -> Markup {
    let joined = items
        .into_iter()
        .map(escape_html)
        .collect::<Vec<_>>()
        .join(", ");
    Markup {
        html: format!("<p>{}: {joined}</p>", escape_html(label)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_escapes_title() {
        let header = Header {
            title: "<Draft>".into(),
        };
        assert_eq!(header.body(), "<h1>&lt;Draft&gt;</h1>");
        assert!(header.head().is_empty());
        assert!(header.script().is_empty());
    }

    #[test]
    fn labeled_list_escapes_items() {
        let markup = labeled_list("Users", ["A&B", "C"]);
        assert_eq!(markup.body(), "<p>Users: A&amp;B, C</p>");
        assert_eq!(labeled_list("Players", []).body(), "<p>Players: </p>");
    }

    #[test]
    fn join_form_embeds_draft_id_as_js_string() {
        let form = JoinForm {
            draft_id: "d-1".into(),
        };
        let script = form.script();
        assert!(script.starts_with("<script type=\"module\">\nconst DRAFT_ID = \"d-1\";"));
        assert!(script.contains("joinDraftForm"));
        assert!(form.body().contains("id=\"joinDraftForm\""));
        assert!(form.head().contains("<style>"));
    }

    #[test]
    fn live_refresh_binds_page() {
        let script = Script::live_refresh("d-1", "john doe").script();
        assert!(script.contains("const DRAFT_ID = \"d-1\";\nconst PAGE_KEY = \"john doe\";"));
        assert!(script.ends_with("</script>"));
    }
}
