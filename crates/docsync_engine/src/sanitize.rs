use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::ElementRef;

/// Elements whose content is executable, embedded, or never rendered as text.
pub(crate) fn is_unsafe_element(name: &str) -> bool {
    matches!(
        name,
        "script"
            | "style"
            | "noscript"
            | "iframe"
            | "frame"
            | "frameset"
            | "template"
            | "object"
            | "embed"
            | "applet"
            | "link"
            | "meta"
            | "base"
            | "head"
    )
}

pub(crate) fn is_script_url(value: &str) -> bool {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    compact.starts_with("javascript:") || compact.starts_with("vbscript:") || compact.starts_with("data:text/html")
}

fn is_event_attribute(name: &str) -> bool {
    name.len() > 2 && name.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("on"))
}

fn is_void_element(name: &str) -> bool {
    matches!(
        name,
        "area" | "br" | "col" | "hr" | "img" | "input" | "source" | "track" | "wbr"
    )
}

/// Re-serializes the subtree under `root` as HTML with executable content removed:
/// unsafe elements, `on*` event handler attributes, inline `style`, and
/// `javascript:`-style URLs are dropped; comments and doctypes are omitted.
pub(crate) fn sanitized_html(root: ElementRef) -> String {
    let mut out = String::new();
    for child in root.children() {
        write_node(child, &mut out);
    }
    out
}

fn write_node(node: NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Text(text) => escape_into(text, false, out),
        Node::Element(element) => {
            let name = element.name().to_ascii_lowercase();
            if is_unsafe_element(&name) {
                return;
            }
            out.push('<');
            out.push_str(&name);
            for (key, value) in element.attrs() {
                if is_event_attribute(key) || key.eq_ignore_ascii_case("style") || is_script_url(value)
                {
                    continue;
                }
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                escape_into(value, true, out);
                out.push('"');
            }
            out.push('>');
            if is_void_element(&name) {
                return;
            }
            for child in node.children() {
                write_node(child, out);
            }
            out.push_str("</");
            out.push_str(&name);
            out.push('>');
        }
        Node::Document | Node::Fragment => {
            for child in node.children() {
                write_node(child, out);
            }
        }
        _ => {}
    }
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

/// Escapes every `<` of a markdown or plain-text body as `&lt;`, leaving fenced
/// code blocks and inline code spans untouched. Raw HTML embedded in such a
/// body therefore renders as text instead of markup.
pub(crate) fn escape_raw_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut fence: Option<(char, usize)> = None;
    for line in text.split_inclusive('\n') {
        match fence {
            Some((marker, len)) => {
                if fence_marker(line).is_some_and(|(m, n)| m == marker && n >= len) {
                    fence = None;
                }
                out.push_str(line);
            }
            None => {
                if let Some(opening) = fence_marker(line) {
                    fence = Some(opening);
                    out.push_str(line);
                } else {
                    escape_line(line, &mut out);
                }
            }
        }
    }
    out
}

/// The marker character and run length of a ``` or ~~~ fence line.
fn fence_marker(line: &str) -> Option<(char, usize)> {
    let trimmed = line.trim_start_matches(' ');
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let marker = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let run = trimmed.chars().take_while(|c| *c == marker).count();
    (run >= 3).then_some((marker, run))
}

fn escape_line(line: &str, out: &mut String) {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '`' => {
                let run = chars[i..].iter().take_while(|c| **c == '`').count();
                let close = find_backtick_run(&chars, i + run, run);
                let end = close.map_or(i + run, |at| at + run);
                out.extend(&chars[i..end]);
                i = end;
            }
            '<' => {
                out.push_str("&lt;");
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
}

/// Start of the next run of exactly `len` backticks at or after `from`.
fn find_backtick_run(chars: &[char], from: usize, len: usize) -> Option<usize> {
    let mut i = from;
    while i < chars.len() {
        if chars[i] == '`' {
            let run = chars[i..].iter().take_while(|c| **c == '`').count();
            if run == len {
                return Some(i);
            }
            i += run;
        } else {
            i += 1;
        }
    }
    None
}
