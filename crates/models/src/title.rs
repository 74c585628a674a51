//! Title normalization for cross-source identity matching.
//!
//! Different services render the same paper title with different casing,
//! whitespace, punctuation, smart quotes, full-width characters or markup.
//! These normalizers reduce a title to comparable forms, the most
//! aggressive of which doubles as a `title:` identifier so papers without
//! a shared DOI/arXiv id can still merge in the registry.

use unicode_normalization::UnicodeNormalization;

/// All normalized forms of one title, gentlest to harshest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TitleHashes {
    /// Lowercased, NFKC-normalized, whitespace collapsed.
    pub basic: String,
    /// Basic, plus ASCII quotes/dashes and no trailing punctuation.
    pub moderate: String,
    /// Only alphanumeric and CJK characters, no whitespace. The best
    /// form for matching across sources.
    pub aggressive: String,
}

pub fn title_hashes(title: &str) -> Option<TitleHashes> {
    if title.trim().is_empty() {
        return None;
    }
    Some(TitleHashes {
        basic: basic_normalize(title),
        moderate: moderate_normalize(title),
        aggressive: aggressive_normalize(title),
    })
}

/// The `title:` identifier for a paper, if the title has any substance
/// left after aggressive normalization.
pub fn title_identifier(title: &str) -> Option<String> {
    let hash = aggressive_normalize(title);
    if hash.is_empty() {
        None
    } else {
        Some(format!("title:{hash}"))
    }
}

/// The canonical matching form: an alias for aggressive normalization.
pub fn canonical_hash(title: &str) -> String {
    aggressive_normalize(title)
}

pub fn basic_normalize(title: &str) -> String {
    let normalized: String = title.nfkc().collect();
    collapse_whitespace(normalized.to_lowercase().trim())
}

pub fn moderate_normalize(title: &str) -> String {
    let unquoted: String = basic_normalize(title).chars().map(to_ascii_mark).collect();
    unquoted
        .trim_end_matches(['.', ',', ';', ':', '!', '?'])
        .to_string()
}

pub fn aggressive_normalize(title: &str) -> String {
    let stripped = strip_tags(&title.nfkc().collect::<String>());
    stripped
        .to_lowercase()
        .chars()
        .filter(|c| keep_aggressive(*c))
        .collect()
}

fn collapse_whitespace(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_space = false;
    for c in title.chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(c);
        }
    }
    out
}

// Curly quotes and the em/en-dash family fold to their ASCII forms.
fn to_ascii_mark(c: char) -> char {
    match c {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '`' => '\'',
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{00AB}' | '\u{00BB}' => '"',
        '\u{2010}'..='\u{2015}' | '\u{2212}' => '-',
        other => other,
    }
}

// ASCII alphanumerics, CJK ideographs, and the ligature block (anything
// NFKC left intact).
fn keep_aggressive(c: char) -> bool {
    c.is_ascii_alphanumeric() || ('\u{4E00}'..='\u{9FFF}').contains(&c) || ('\u{FB00}'..='\u{FEFF}').contains(&c)
}

fn strip_tags(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut in_tag = false;
    for c in title.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}
