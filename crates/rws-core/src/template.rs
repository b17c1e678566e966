//! The test page template.
//!
//! The page is plain HTML with two placeholders:
//!
//! - `{{ws_url}}`    – full `ws://` / `wss://` URL of the paired bridge
//! - `{{test_path}}` – the test page path, used to build asset URLs
//!
//! Templates are compiled once into segments so rendering is a single pass.
//! Substituted values are HTML-escaped.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated placeholder at byte {0}")]
    Unterminated(usize),

    #[error("unknown placeholder {{{{{0}}}}}")]
    UnknownPlaceholder(String),
}

/// Values substituted into the test page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageContext<'a> {
    pub ws_url: &'a str,
    pub test_path: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    WsUrl,
    TestPath,
}

/// A compiled test page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTemplate {
    segments: Vec<Segment>,
}

impl PageTemplate {
    /// Compiles `source`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] for an unclosed `{{` or an unknown name.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rws_core::template::{PageContext, PageTemplate};
    ///
    /// let page = PageTemplate::compile("<a href=\"{{ws_url}}\">{{test_path}}</a>").unwrap();
    /// let html = page.render(&PageContext { ws_url: "ws://h/ws", test_path: "/test" });
    /// assert_eq!(html, "<a href=\"ws://h/ws\">/test</a>");
    /// ```
    pub fn compile(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after_open = &rest[start + 2..];
            let end = after_open
                .find("}}")
                .ok_or(TemplateError::Unterminated(offset + start))?;
            segments.push(match after_open[..end].trim() {
                "ws_url" => Segment::WsUrl,
                "test_path" => Segment::TestPath,
                other => return Err(TemplateError::UnknownPlaceholder(other.to_string())),
            });

            let consumed = start + 2 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        Ok(Self { segments })
    }

    pub fn render(&self, context: &PageContext<'_>) -> String {
        let mut html = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => html.push_str(text),
                Segment::WsUrl => html.push_str(&escape_html(context.ws_url)),
                Segment::TestPath => html.push_str(&escape_html(context.test_path)),
            }
        }
        html
    }
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
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
