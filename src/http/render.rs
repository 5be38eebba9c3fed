//! View rendering seam.
//!
//! The dispatcher and handlers depend only on [`ViewRenderer`];
//! [`BasicRenderer`] ships the handful of pages the dispatcher names so the
//! crate works without an external template engine.

use serde_json::Value;
use thiserror::Error;

/// Renderer failure. The dispatcher never feeds this back into error
/// handling; it falls back to a minimal hardcoded page instead.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("unknown template: {0}")]
    UnknownTemplate(String),
}

/// Renders a named template with JSON-shaped locals into an HTML body.
pub trait ViewRenderer: Send + Sync {
    fn render(&self, template: &str, locals: &Value) -> Result<String, RenderError>;
}

/// Built-in renderer for the pages the dispatcher and the demo routes use:
/// `403`, `404`, the generic `error` template, and `index`.
#[derive(Debug, Default)]
pub struct BasicRenderer;

impl BasicRenderer {
    pub fn new() -> BasicRenderer {
        BasicRenderer
    }
}

impl ViewRenderer for BasicRenderer {
    fn render(&self, template: &str, locals: &Value) -> Result<String, RenderError> {
        match template {
            "403" => Ok(page(
                "403 Forbidden",
                "<h1>403 Forbidden</h1>\n<p>You are not authorized to view this page.</p>",
            )),
            "404" => Ok(page(
                "404 Not Found",
                "<h1>404 Not Found</h1>\n<p>The page you are looking for does not exist.</p>",
            )),
            "error" => Ok(error_page(locals)),
            "index" => {
                let title = escape(locals["title"].as_str().unwrap_or("sitekit"));
                Ok(page(
                    &title,
                    &format!("<h1>{title}</h1>\n<p>The service is up.</p>"),
                ))
            }
            other => Err(RenderError::UnknownTemplate(other.to_owned())),
        }
    }
}

fn error_page(locals: &Value) -> String {
    let code = locals["code"].as_u64().unwrap_or(500);
    let title = escape(locals["title"].as_str().unwrap_or("Internal Server Error"));
    let message = escape(locals["message"].as_str().unwrap_or(""));
    let mut body = format!("<h1>{code} {title}</h1>\n<p>{message}</p>");
    if locals["showerr"].as_bool().unwrap_or(false) {
        if let Some(err) = locals["err"].as_str() {
            body.push_str(&format!("\n<pre>{}</pre>", escape(err)));
        }
    }
    page(&format!("{code} {title}"), &body)
}

/// Last-resort page used when a renderer fails.
pub fn fallback_page(code: u16, title: &str) -> String {
    page(
        &format!("{code} {title}"),
        &format!("<h1>{code} {}</h1>", escape(title)),
    )
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n<body>\n{body}\n</body>\n</html>\n"
    )
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
