use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::ElementRef;

use crate::sanitize::{is_script_url, is_unsafe_element};

/// Page furniture that carries no documentation content.
fn is_chrome_element(name: &str) -> bool {
    matches!(
        name,
        "nav" | "form" | "button" | "input" | "select" | "textarea" | "svg" | "canvas" | "img"
            | "picture" | "video" | "audio"
    )
}

#[derive(Debug, Clone, Copy)]
enum ListKind {
    Unordered,
    Ordered(usize),
}

/// Converts the subtree under `root` into markdown.
///
/// Unsafe and chrome elements are skipped entirely, whitespace in text runs is
/// collapsed (except inside `<pre>`), and the output is trimmed and ends with a
/// single newline. The same subtree always yields the same bytes.
pub(crate) fn render_markdown(root: ElementRef) -> String {
    let mut writer = MarkdownWriter::default();
    writer.visit_children(*root);
    writer.finish()
}

#[derive(Default)]
struct MarkdownWriter {
    out: String,
    lists: Vec<ListKind>,
    pre_depth: usize,
}

impl MarkdownWriter {
    fn finish(self) -> String {
        let trimmed = self.out.trim();
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("{trimmed}\n")
        }
    }

    fn visit_node(&mut self, node: NodeRef<'_, Node>) {
        match node.value() {
            Node::Text(text) => {
                if self.pre_depth > 0 {
                    self.out.push_str(text);
                } else {
                    self.append_text(text);
                }
            }
            Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(node) {
                    self.visit_element(element);
                }
            }
            Node::Document | Node::Fragment => self.visit_children(node),
            _ => {}
        }
    }

    fn visit_children(&mut self, node: NodeRef<'_, Node>) {
        for child in node.children() {
            self.visit_node(child);
        }
    }

    fn visit_element(&mut self, element: ElementRef) {
        let tag = element.value().name().to_ascii_lowercase();
        if is_unsafe_element(&tag) || is_chrome_element(&tag) {
            return;
        }
        match tag.as_str() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = usize::from(tag.as_bytes()[1] - b'0');
                self.blank_line();
                self.out.push_str(&"#".repeat(level));
                self.out.push(' ');
                self.visit_children(*element);
                self.blank_line();
            }
            "p" | "div" | "section" | "article" | "main" | "header" | "footer" | "aside"
            | "figure" | "figcaption" | "address" | "details" | "summary" | "dl" | "table" => {
                self.blank_line();
                self.visit_children(*element);
                self.blank_line();
            }
            "dt" | "dd" => {
                self.newline();
                self.visit_children(*element);
                self.newline();
            }
            "ul" | "ol" => {
                if self.lists.is_empty() {
                    self.blank_line();
                } else {
                    self.newline();
                }
                self.lists.push(if tag == "ol" {
                    ListKind::Ordered(0)
                } else {
                    ListKind::Unordered
                });
                self.visit_children(*element);
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank_line();
                } else {
                    self.newline();
                }
            }
            "li" => self.list_item(element),
            "pre" => self.code_block(element),
            "code" | "kbd" | "samp" if self.pre_depth == 0 => self.wrap_inline(element, "`"),
            "strong" | "b" => self.wrap_inline(element, "**"),
            "em" | "i" => self.wrap_inline(element, "_"),
            "a" => self.anchor(element),
            "blockquote" => self.blockquote(element),
            "tr" => self.table_row(element),
            "br" => self.newline(),
            "hr" => {
                self.blank_line();
                self.out.push_str("---");
                self.blank_line();
            }
            _ => self.visit_children(*element),
        }
    }

    fn list_item(&mut self, element: ElementRef) {
        self.newline();
        let depth = self.lists.len().saturating_sub(1);
        self.out.push_str(&"  ".repeat(depth));
        match self.lists.last_mut() {
            Some(ListKind::Ordered(n)) => {
                *n += 1;
                let marker = format!("{n}. ");
                self.out.push_str(&marker);
            }
            _ => self.out.push_str("- "),
        }
        self.visit_children(*element);
        self.newline();
    }

    fn code_block(&mut self, element: ElementRef) {
        let language = element
            .descendants()
            .filter_map(ElementRef::wrap)
            .find(|e| e.value().name() == "code")
            .and_then(|code| code.value().classes().find_map(|c| c.strip_prefix("language-")))
            .unwrap_or_default()
            .to_string();
        self.blank_line();
        self.out.push_str("```");
        self.out.push_str(&language);
        self.out.push('\n');
        self.pre_depth += 1;
        self.visit_children(*element);
        self.pre_depth -= 1;
        if !self.out.ends_with('\n') {
            self.out.push('\n');
        }
        self.out.push_str("```");
        self.blank_line();
    }

    fn wrap_inline(&mut self, element: ElementRef, marker: &str) {
        let start = self.out.len();
        self.out.push_str(marker);
        let inner_start = self.out.len();
        self.visit_children(*element);
        if self.out[inner_start..].trim().is_empty() {
            self.out.truncate(start);
        } else {
            self.out.push_str(marker);
        }
    }

    fn anchor(&mut self, element: ElementRef) {
        let href = element
            .value()
            .attr("href")
            .map(str::trim)
            .filter(|h| !h.is_empty() && !h.starts_with('#') && !is_script_url(h));
        let start = self.out.len();
        self.visit_children(*element);
        let text = self.out[start..].trim().to_string();
        if let Some(href) = href {
            if !text.is_empty() {
                self.out.truncate(start);
                self.out.push_str(&format!("[{text}]({href})"));
            }
        }
    }

    fn blockquote(&mut self, element: ElementRef) {
        let mut inner = MarkdownWriter {
            lists: Vec::new(),
            pre_depth: self.pre_depth,
            out: String::new(),
        };
        inner.visit_children(*element);
        let quoted = inner.finish();
        if quoted.is_empty() {
            return;
        }
        self.blank_line();
        for line in quoted.lines() {
            if line.is_empty() {
                self.out.push_str(">\n");
            } else {
                self.out.push_str("> ");
                self.out.push_str(line);
                self.out.push('\n');
            }
        }
        self.blank_line();
    }

    fn table_row(&mut self, row: ElementRef) {
        let cells: Vec<(bool, String)> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|c| matches!(c.value().name(), "td" | "th"))
            .map(|cell| {
                let mut inner = MarkdownWriter::default();
                inner.visit_children(*cell);
                let text = inner.finish().replace('\n', " ").trim().to_string();
                (cell.value().name() == "th", text)
            })
            .collect();
        if cells.is_empty() {
            return;
        }
        self.newline();
        let line = cells
            .iter()
            .map(|(_, text)| text.as_str())
            .collect::<Vec<_>>()
            .join(" | ");
        self.out.push_str(&format!("| {line} |"));
        self.newline();
        if cells.iter().all(|(header, _)| *header) {
            let separator = vec!["---"; cells.len()].join(" | ");
            self.out.push_str(&format!("| {separator} |"));
            self.newline();
        }
    }

    fn append_text(&mut self, text: &str) {
        for ch in text.chars() {
            if ch.is_whitespace() {
                if self.out.is_empty() || self.out.ends_with(' ') || self.out.ends_with('\n') {
                    continue;
                }
                self.out.push(' ');
            } else {
                self.out.push(ch);
            }
        }
    }

    fn trim_trailing_spaces(&mut self) {
        let trimmed = self.out.trim_end_matches(' ').len();
        self.out.truncate(trimmed);
    }

    fn newline(&mut self) {
        self.trim_trailing_spaces();
        if self.out.is_empty() || self.out.ends_with('\n') {
            return;
        }
        self.out.push('\n');
    }

    fn blank_line(&mut self) {
        self.trim_trailing_spaces();
        if self.out.is_empty() || self.out.ends_with("\n\n") {
            return;
        }
        if self.out.ends_with('\n') {
            self.out.push('\n');
        } else {
            self.out.push_str("\n\n");
        }
    }
}
