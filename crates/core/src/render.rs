//! Server-side HTML for the chat page.
//!
//! Messages are substituted into [`USER_TEMPLATE`] or [`BOT_TEMPLATE`] at the
//! `{{MSG}}` placeholder after HTML escaping.

use crate::models::{BuildReport, Role, Turn};

pub const MESSAGE_PLACEHOLDER: &str = "{{MSG}}";

pub const CSS: &str = r#"<style>
body { font-family: sans-serif; max-width: 860px; margin: 0 auto; padding: 1rem; background: #0e1117; color: #fafafa; }
h1 { text-align: center; }
form { margin: 1rem 0; }
.notice { padding: .75rem 1rem; border-radius: .5rem; margin: 1rem 0; }
.notice.info { background: #1c3d5a; }
.notice.error { background: #5a1c1c; }
.chat-message { padding: 1.5rem; border-radius: .5rem; margin-bottom: 1rem; display: flex; }
.chat-message.user { background-color: #2b313e; }
.chat-message.bot { background-color: #475063; }
.chat-message .avatar { width: 15%; font-size: 2rem; }
.chat-message .message { width: 85%; padding: 0 1.5rem; white-space: pre-wrap; }
</style>"#;

pub const BOT_TEMPLATE: &str = r#"<div class="chat-message bot">
    <div class="avatar">🤖</div>
    <div class="message">{{MSG}}</div>
</div>"#;

pub const USER_TEMPLATE: &str = r#"<div class="chat-message user">
    <div class="avatar">🧑</div>
    <div class="message">{{MSG}}</div>
</div>"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Info,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            text: text.into(),
        }
    }
}

/// Everything the page shows, read from a session after an action completes.
#[derive(Debug, Default)]
pub struct PageView<'a> {
    pub history: &'a [Turn],
    pub last_build: Option<&'a BuildReport>,
    pub notice: Option<Notice>,
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

pub fn render_message(turn: &Turn) -> String {
    let template = match turn.role {
        Role::User => USER_TEMPLATE,
        Role::Assistant => BOT_TEMPLATE,
    };
    template.replace(MESSAGE_PLACEHOLDER, &escape_html(&turn.content))
}

pub fn render_history(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(render_message)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_page(view: &PageView<'_>) -> String {
    let notice = view
        .notice
        .as_ref()
        .map(|notice| {
            let class = match notice.kind {
                NoticeKind::Info => "info",
                NoticeKind::Error => "error",
            };
            format!(r#"<div class="notice {class}">{}</div>"#, escape_html(&notice.text))
        })
        .unwrap_or_default();

    let status = match view.last_build {
        Some(report) => format!(
            "<p>Reading done: {} document(s), {} chunk(s), at {}.</p>",
            report.document_count,
            report.chunk_count,
            report.built_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        None => "<p>No documents read yet.</p>".to_string(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>PDFs to Bot</title>
{CSS}
</head>
<body>
<h1>📚 PDFs to Bot 📚</h1>
{notice}
<form action="/build" method="post" enctype="multipart/form-data">
    <label>Upload your PDFs here and click the 'Start the Reading Process' button!
        <input type="file" name="pdfs" accept="application/pdf" multiple>
    </label>
    <button type="submit">Start the Reading Process</button>
</form>
{status}
<form action="/ask" method="post">
    <label>Ask a question about your PDFs:
        <input type="text" name="question" autofocus>
    </label>
    <button type="submit">Ask</button>
</form>
{history}
</body>
</html>
"#,
        history = render_history(view.history),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_alternate_between_templates() {
        let turns = vec![Turn::user("question"), Turn::assistant("answer")];
        let html = render_history(&turns);

        let user_at = html.find("chat-message user").unwrap();
        let bot_at = html.find("chat-message bot").unwrap();
        assert!(user_at < bot_at);
        assert!(html.contains(r#"<div class="message">question</div>"#));
        assert!(html.contains(r#"<div class="message">answer</div>"#));
        assert!(!html.contains(MESSAGE_PLACEHOLDER));
    }

    #[test]
    fn message_text_is_escaped() {
        let html = render_message(&Turn::assistant("<script>alert('x')</script> & more"));
        assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt; &amp; more"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn page_shows_notice_and_empty_state() {
        let view = PageView {
            notice: Some(Notice::error("build failed: bad.pdf")),
            ..PageView::default()
        };
        let html = render_page(&view);

        assert!(html.contains(r#"<div class="notice error">build failed: bad.pdf</div>"#));
        assert!(html.contains("No documents read yet."));
        assert!(html.contains("Start the Reading Process"));
    }
}
