//! HTML rendering helpers.

use std::fmt::Write as _;

use axum::response::Html;
use tally_core::Tally;
use tally_db::entities::{Choice, vote};

/// Escape text for use in element content and quoted attributes.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = "body{font-family:system-ui,sans-serif;max-width:42rem;margin:2rem auto;padding:0 1rem}\
button{font-size:1.2rem;padding:.6rem 2rem;margin:.5rem}\
table{border-collapse:collapse;width:100%}td,th{border-bottom:1px solid #ddd;padding:.3rem;text-align:left;font-size:.9rem}";

/// Wrap `body` (already escaped) in a full document.
#[must_use]
pub fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        escape(title)
    ))
}

/// Voting form.
#[must_use]
pub fn index(question: &str) -> Html<String> {
    let body = format!(
        "<h1>{}</h1>\n<form method=\"post\" action=\"/vote\">\n\
         <button type=\"submit\" name=\"choice\" value=\"yes\">Yes</button>\n\
         <button type=\"submit\" name=\"choice\" value=\"no\">No</button>\n</form>",
        escape(question)
    );
    page(question, &body)
}

/// Short message page.
#[must_use]
pub fn message(title: &str, text: &str) -> Html<String> {
    page(title, &format!("<h1>{}</h1>\n<p>{}</p>", escape(title), escape(text)))
}

/// Results with counts, percentages and the vote table.
#[must_use]
pub fn results(question: &str, tally: &Tally, votes: &[vote::Model]) -> Html<String> {
    let mut body = format!(
        "<h1>Results</h1>\n<p>{}</p>\n<ul>\n\
         <li>Yes: {} ({:.1}%)</li>\n<li>No: {} ({:.1}%)</li>\n<li>Total: {}</li>\n</ul>\n",
        escape(question),
        tally.yes,
        tally.percent(Choice::Yes),
        tally.no,
        tally.percent(Choice::No),
        tally.total,
    );

    body.push_str(
        "<table>\n<tr><th>#</th><th>Choice</th><th>Time (UTC)</th><th>IP</th><th>User agent</th></tr>\n",
    );
    for vote in votes {
        let _ = writeln!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            vote.id,
            vote.choice,
            vote.created_at.format("%Y-%m-%d %H:%M:%S"),
            escape(vote.ip.as_deref().unwrap_or_default()),
            escape(vote.user_agent.as_deref().unwrap_or_default()),
        );
    }
    body.push_str("</table>\n<p><a href=\"/export.csv\">Download CSV</a> · <a href=\"/logout\">Log out</a></p>");

    page("Results", &body)
}

/// Dashboard pointing at the public voting page.
#[must_use]
pub fn dashboard(question: &str, vote_url: &str) -> Html<String> {
    let url = escape(vote_url);
    let body = format!(
        "<h1>Dashboard</h1>\n<p>{}</p>\n\
         <p>Share this link with voters: <a href=\"{url}\">{url}</a></p>\n\
         <ul>\n<li><a href=\"/results\">Results</a></li>\n<li><a href=\"/stats\">Stats (JSON)</a></li>\n\
         <li><a href=\"/export.csv\">Export CSV</a></li>\n</ul>\n\
         <form method=\"post\" action=\"/admin/backup\"><button type=\"submit\">Back up now</button></form>\n\
         <p><a href=\"/logout\">Log out</a></p>",
        escape(question)
    );
    page("Dashboard", &body)
}
