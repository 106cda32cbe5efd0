//! HTML job descriptions to plain text.

use std::sync::LazyLock;

use htmd::HtmlToMarkdown;
use scraper::{Html, Selector};
use tracing::debug;

use crate::cleanup;

/// Tags whose content never belongs in a description.
const SKIP_TAGS: [&str; 7] = ["script", "style", "nav", "iframe", "noscript", "svg", "head"];

/// Convert an HTML fragment into readable plain text.
///
/// Returns `None` for blank input or when nothing readable is left.
pub fn html_to_text(html: &str) -> Option<String> {
    if html.trim().is_empty() {
        return None;
    }

    let converter = HtmlToMarkdown::builder()
        .skip_tags(SKIP_TAGS.to_vec())
        .build();
    let markdown = match converter.convert(html) {
        Ok(md) => md,
        Err(e) => {
            debug!(error = %e, "html conversion failed, falling back to text nodes");
            text_nodes(html)
        }
    };

    let text = cleanup::run_pipeline(&markdown);
    (!text.is_empty()).then_some(text)
}

/// Concatenate visible text nodes, one block per line.
fn text_nodes(html: &str) -> String {
    static SKIPPED: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(&SKIP_TAGS.join(", ")).expect("valid selector")
    });

    let document = Html::parse_fragment(html);
    let hidden: Vec<_> = document.select(&SKIPPED).map(|el| el.id()).collect();

    let mut lines = Vec::new();
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let inside_hidden = node.ancestors().any(|a| hidden.contains(&a.id()));
        let trimmed = text.trim();
        if !inside_hidden && !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }
    lines.join("\n")
}
