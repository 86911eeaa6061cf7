use crate::github::Issue;
use crate::repos::RepoRef;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

/// Render an issue as a Telegram HTML message.
///
/// <b>New issue in acme/widgets</b>
/// <a href="https://github.com/acme/widgets/issues/42">#42 Crash on start</a>
/// Opened 2024-03-01 09:30 UTC
pub fn render_html(repo: &RepoRef, issue: &Issue) -> String {
    format!(
        "<b>New issue in {}</b>\n<a href=\"{}\">#{} {}</a>\nOpened {}",
        escape_html(&repo.key()),
        escape_html(&issue.url),
        issue.number,
        escape_html(&issue.title),
        issue.created_at.format(TIME_FORMAT),
    )
}

/// Same content as render_html() without any markup.
pub fn render_plain(repo: &RepoRef, issue: &Issue) -> String {
    format!(
        "New issue in {}\n#{} {}\n{}\nOpened {}",
        repo,
        issue.number,
        issue.title,
        issue.url,
        issue.created_at.format(TIME_FORMAT),
    )
}

/// Escape the characters Telegram's HTML parse mode treats as markup.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
