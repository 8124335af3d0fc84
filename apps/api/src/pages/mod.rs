//! Server-rendered operator pages.
//!
//! Templates are embedded at compile time. `{{name}}` placeholders are filled with
//! HTML-escaped values; `{{flashes}}` expands to the pending flash notices.

use crate::session::Flash;

pub mod handlers;

pub const INDEX_HTML: &str = include_str!("../../templates/index.html");
pub const LOGIN_HTML: &str = include_str!("../../templates/login.html");
pub const ACCOUNT_HTML: &str = include_str!("../../templates/account.html");
pub const RECORD_HTML: &str = include_str!("../../templates/record.html");
pub const SORTING_HTML: &str = include_str!("../../templates/sorting.html");
pub const HISTORY_HTML: &str = include_str!("../../templates/history.html");

const FLASHES_SLOT: &str = "flashes";

pub fn render(template: &str, flashes: &[Flash], vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };

        let name = after[..end].trim();
        if name == FLASHES_SLOT {
            out.push_str(&render_flashes(flashes));
        } else if let Some((_, value)) = vars.iter().find(|(key, _)| *key == name) {
            out.push_str(&escape_html(value));
        } else {
            // unknown placeholders are left visible
            out.push_str(&rest[start..start + end + 4]);
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}

fn render_flashes(flashes: &[Flash]) -> String {
    flashes
        .iter()
        .map(|f| {
            format!(
                r#"<div class="flash flash-{}">{}</div>"#,
                f.category.as_str(),
                escape_html(&f.message)
            )
        })
        .collect()
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            other => escaped.push(other),
        }
    }
    escaped
}
