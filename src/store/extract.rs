use anyhow::{anyhow, Result};
use regex::Regex;
use std::sync::LazyLock;

/// Cap on extracted text kept for indexing (4MB).
const MAX_TEXT_LEN: usize = 4 * 1024 * 1024;

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s\-_.]").expect("static regex"));
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

/// Extract the text layer of a PDF.
///
/// Returns `Ok(None)` when the document parses but carries no text
/// (scanned pages, empty documents).
pub fn extract_pdf_text(data: &[u8]) -> Result<Option<String>> {
    let text = pdf_extract::extract_text_from_mem(data)
        .map_err(|e| anyhow!("could not read PDF: {e}"))?;
    Ok(truncate_text(text))
}

fn truncate_text(text: String) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }
    if text.len() <= MAX_TEXT_LEN {
        return Some(text);
    }
    let mut end = MAX_TEXT_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    Some(text[..end].to_string())
}

/// True when the filename carries a `.pdf` extension, in any case.
pub fn has_pdf_extension(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && ext.eq_ignore_ascii_case("pdf"))
}

/// Reduce a client-supplied filename to a safe single path component.
///
/// Directory parts are dropped, characters outside word characters,
/// whitespace, `-`, `_` and `.` are removed and whitespace runs become `_`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned = UNSAFE_CHARS.replace_all(base, "");
    WHITESPACE_RUN
        .replace_all(cleaned.trim(), "_")
        .into_owned()
}
