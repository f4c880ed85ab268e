// Page assembly: an ordered list of fragments, each contributing to the
// document head, the `#root` body and the trailing scripts.

/// One piece of a page. Every part defaults to empty.
pub trait Fragment {
    /// `<style>` or `<meta>` tags for `<head>`.
    fn head(&self) -> String {
        String::new()
    }

    /// Markup placed inside `<div id="root">`.
    fn body(&self) -> String {
        String::new()
    }

    /// Script tags placed just before `</body>`.
    fn script(&self) -> String {
        String::new()
    }
}

/// Assemble a full HTML document. `title` is escaped; fragment output is
/// used as-is and must already be escaped.
pub fn build_page(title: &str, fragments: &[&dyn Fragment]) -> String {
    let mut head = String::new();
    let mut body = String::new();
    let mut script = String::new();
    for fragment in fragments {
        head.push_str(&fragment.head());
        body.push_str(&fragment.body());
        script.push_str(&fragment.script());
    }

    format!(
        "<!DOCTYPE html>
<html>
<head>
<meta charset=\"utf-8\">
<title>{title}</title>
{head}
</head>
<body>
<div id=\"root\">
{body}
</div>
{script}
</body>
</html>",
        title = escape_html(title),
    )
}

/// Escape text for HTML element content and quoted attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Encode `text` as a JavaScript string literal that is safe inside a
/// `<script>` element.
pub fn js_string(text: &str) -> String {
    let json = serde_json::Value::String(text.to_string()).to_string();
    json.replace("</", "<\\/").replace("<!--", "<\\!--")
}
