//! Post-conversion cleanup pipeline that turns converted Markdown into plain text.
//!
//! Each pass is a function `&str -> String` applied in sequence. Bullets are
//! kept as `- ` lines because the quality heuristics look for them.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full cleanup pipeline on converted Markdown.
pub(crate) fn run_pipeline(md: &str) -> String {
    let mut result = md.to_string();

    result = strip_rules(&result);
    result = normalize_bullets(&result);
    result = strip_images_and_links(&result);
    result = strip_emphasis(&result);
    result = strip_heading_markers(&result);
    result = unescape_markdown(&result);
    result = strip_leftover_html(&result);
    result = drop_boilerplate(&result);
    result = normalize_whitespace(&result);
    result = clean_blank_lines(&result);

    result.trim().to_string()
}

// ---------------------------------------------------------------------------
// Pass 0: Rules
// ---------------------------------------------------------------------------

/// Drop horizontal rules and setext heading underlines.
fn strip_rules(md: &str) -> String {
    static RULE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^\s*(?:[-*_=]\s*){3,}$").expect("valid regex"));

    md.lines()
        .filter(|line| !RULE_RE.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 1: Bullets
// ---------------------------------------------------------------------------

/// Rewrite `*` and `+` list markers to `-`.
fn normalize_bullets(md: &str) -> String {
    static BULLET_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^(\s*)[*+•]\s+").expect("valid regex"));

    BULLET_RE.replace_all(md, "$1- ").to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: Links and images
// ---------------------------------------------------------------------------

/// Drop images and keep only the visible text of links.
fn strip_images_and_links(md: &str) -> String {
    static IMAGE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));
    static LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid regex"));

    let without_images = IMAGE_RE.replace_all(md, "");
    LINK_RE.replace_all(&without_images, "$1").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: Emphasis
// ---------------------------------------------------------------------------

fn strip_emphasis(md: &str) -> String {
    static STRONG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\*\*|__").expect("valid regex"));
    static EM_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\*([^*\s][^*\n]*?)\*").expect("valid regex"));
    static CODE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"`+([^`]*)`+").expect("valid regex"));

    let result = STRONG_RE.replace_all(md, "");
    let result = EM_RE.replace_all(&result, "$1");
    CODE_RE.replace_all(&result, "$1").to_string()
}

// ---------------------------------------------------------------------------
// Pass 4: Headings
// ---------------------------------------------------------------------------

fn strip_heading_markers(md: &str) -> String {
    static H_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+").expect("valid regex"));

    H_RE.replace_all(md, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 5: Markdown escapes
// ---------------------------------------------------------------------------

/// Undo the backslash escapes the converter adds to punctuation.
fn unescape_markdown(md: &str) -> String {
    static ESCAPE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\\([\\`*_{}\[\]()#+\-.!<>|])").expect("valid regex")
    });

    ESCAPE_RE.replace_all(md, "$1").to_string()
}

// ---------------------------------------------------------------------------
// Pass 6: Leftover HTML
// ---------------------------------------------------------------------------

/// Remove any tags that survived conversion, keeping inner text.
fn strip_leftover_html(md: &str) -> String {
    static HTML_TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)</?[a-zA-Z][^>]*>").expect("valid regex"));

    HTML_TAG_RE.replace_all(md, " ").to_string()
}

// ---------------------------------------------------------------------------
// Pass 7: Boilerplate
// ---------------------------------------------------------------------------

/// Drop equal-opportunity and accommodation boilerplate lines.
fn drop_boilerplate(md: &str) -> String {
    static BOILERPLATE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?i)equal employment opportunity|\bEEO\b|we are an equal opportunity employer|reasonable accommodation|veteran status",
        )
        .expect("valid regex")
    });

    md.lines()
        .filter(|line| !BOILERPLATE_RE.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 8: Whitespace
// ---------------------------------------------------------------------------

/// Collapse runs of spaces/tabs and trim each line.
fn normalize_whitespace(md: &str) -> String {
    static SPACES_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").expect("valid regex"));

    md.lines()
        .map(|line| SPACES_RE.replace_all(line.trim(), " ").to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 9: Blank lines
// ---------------------------------------------------------------------------

/// Collapse runs of blank lines into one.
fn clean_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(md, "\n\n").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_and_underlines_are_dropped() {
        assert_eq!(strip_rules("Title\n=====\nBody\n* * *\nEnd"), "Title\nBody\nEnd");
        assert_eq!(strip_rules("- item"), "- item");
    }

    #[test]
    fn bullets_are_normalized() {
        assert_eq!(normalize_bullets("* one\n+ two\n  • three"), "- one\n- two\n  - three");
    }

    #[test]
    fn links_keep_text_and_images_vanish() {
        let input = "Apply [here](https://jobs.example.com) ![logo](/logo.png)";
        assert_eq!(strip_images_and_links(input), "Apply here ");
    }

    #[test]
    fn emphasis_and_code_markers_are_removed() {
        assert_eq!(
            strip_emphasis("**Requirements**: *Python* and `SQL`"),
            "Requirements: Python and SQL"
        );
    }

    #[test]
    fn escapes_are_undone() {
        assert_eq!(unescape_markdown(r"3\+ years of C\# \- remote"), "3+ years of C# - remote");
    }

    #[test]
    fn boilerplate_lines_dropped() {
        let input = "Build pipelines\nWe are an equal opportunity employer.\nShip models";
        assert_eq!(drop_boilerplate(input), "Build pipelines\nShip models");
    }

    #[test]
    fn whitespace_and_blank_lines_collapse() {
        let input = "  a   b \n\n\n\n c\t\td ";
        let result = clean_blank_lines(&normalize_whitespace(input));
        assert_eq!(result, "a b\n\nc d");
    }

    #[test]
    fn full_pipeline_produces_plain_text() {
        let input = concat!(
            "## About the role\n\n**We** build [tools](https://x.io).\n\n\n\n",
            "* Python\n* SQL\n\n<div>EEO statement</div>",
        );
        assert_eq!(
            run_pipeline(input),
            "About the role\n\nWe build tools.\n\n- Python\n- SQL"
        );
    }
}
