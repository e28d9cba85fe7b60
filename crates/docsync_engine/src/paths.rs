use url::Url;

use crate::hash::hex_digest;

const MAX_SEGMENT_LEN: usize = 80;

/// Deterministic storage path for a provider page:
/// `{provider}/{host}/{slug}--{short_hash(provider, url)}.md`.
///
/// The slug comes from the URL path. The hash suffix covers the raw provider and
/// url, so distinct URLs with the same slug (query strings, trailing slashes) and
/// provider names that sanitize alike (`acme corp`, `acme_corp`) stay apart. Every segment is safe
/// on Windows and contains no path separators.
pub fn local_path_for(provider: &str, url: &str) -> String {
    let (host, path) = match Url::parse(url) {
        Ok(parsed) => (
            parsed.host_str().unwrap_or("unknown-host").to_string(),
            parsed.path().to_string(),
        ),
        Err(_) => ("unknown-host".to_string(), url.to_string()),
    };

    let slug = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(sanitize_segment)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    let slug = if slug.is_empty() { "index".to_string() } else { slug };
    let slug = truncate_chars(slug.trim_end_matches(".html").trim_end_matches(".htm"), MAX_SEGMENT_LEN);

    format!(
        "{}/{}/{}--{}.md",
        sanitize_segment(provider),
        sanitize_segment(&host),
        slug,
        short_hash(&format!("{provider}\n{url}"))
    )
}

fn sanitize_segment(input: &str) -> String {
    let mut cleaned = String::with_capacity(input.len());
    let mut prev_underscore = false;
    for c in input.chars() {
        let c = if is_forbidden(c) { '_' } else { c };
        if c == '_' {
            if !prev_underscore {
                cleaned.push(c);
            }
            prev_underscore = true;
        } else {
            cleaned.push(c);
            prev_underscore = false;
        }
    }
    let mut name = truncate_chars(cleaned.trim_matches(&['_', ' ', '.'][..]), MAX_SEGMENT_LEN);
    if name.is_empty() {
        name = "untitled".to_string();
    }
    if is_reserved_windows_name(&name) {
        name.push('_');
    }
    name
}

fn truncate_chars(input: &str, max: usize) -> String {
    input.chars().take(max).collect()
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '%' | '#' | '\0'..='\u{1F}'
    ) || c.is_whitespace()
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

fn short_hash(input: &str) -> String {
    hex_digest(input.as_bytes())[..8].to_string()
}
