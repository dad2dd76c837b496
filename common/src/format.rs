//! Layout of free-text assistant replies.
//!
//! Nothing here fails: unknown input degrades to paragraphs, and a reply
//! with no recognisable structure renders as one plain paragraph.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "content", rename_all = "snake_case")]
pub enum Block {
    Header { level: u8, text: String },
    NumberedList(Vec<String>),
    BulletList(Vec<String>),
    Paragraph(String),
}

enum Line<'a> {
    Blank,
    Header(u8, &'a str),
    Numbered(&'a str),
    Bullet(&'a str),
    Text(&'a str),
}

fn strip_numbered(s: &str) -> Option<&str> {
    let digits = s.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 || digits > 3 {
        return None;
    }
    let rest = &s[digits..];
    let rest = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')'))?;
    if rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

fn strip_bullet(s: &str) -> Option<&str> {
    ["- ", "* ", "• ", "– "]
        .iter()
        .find_map(|marker| s.strip_prefix(marker))
        .map(str::trim_start)
}

fn strip_bold_line(s: &str) -> Option<&str> {
    let inner = s.strip_prefix("**")?.strip_suffix("**")?;
    if inner.is_empty() || inner.contains("**") {
        None
    } else {
        Some(inner.trim())
    }
}

fn classify(raw: &str) -> Line<'_> {
    let line = raw.trim();
    if line.is_empty() {
        return Line::Blank;
    }

    let hashes = line.chars().take_while(|c| *c == '#').count();
    if (1..=6).contains(&hashes) && line[hashes..].starts_with(' ') {
        return Line::Header(hashes as u8, line[hashes..].trim());
    }
    if let Some(text) = strip_bold_line(line) {
        return Line::Header(3, text);
    }
    if let Some(item) = strip_numbered(line) {
        return Line::Numbered(item);
    }
    if let Some(item) = strip_bullet(line) {
        return Line::Bullet(item);
    }
    Line::Text(line)
}

/// Drop inline emphasis markers that mean nothing in plain text.
fn clean_inline(s: &str) -> String {
    s.replace("**", "").replace("__", "").trim().to_string()
}

enum Open {
    Paragraph(Vec<String>),
    Numbered(Vec<String>),
    Bullet(Vec<String>),
}

impl Open {
    fn close(self) -> Block {
        match self {
            Open::Paragraph(lines) => Block::Paragraph(lines.join(" ")),
            Open::Numbered(items) => Block::NumberedList(items),
            Open::Bullet(items) => Block::BulletList(items),
        }
    }
}

/// Split a reply into headers, lists and paragraphs.
pub fn parse_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut open: Option<Open> = None;

    for raw in text.lines() {
        match classify(raw) {
            Line::Blank => {
                if let Some(block) = open.take() {
                    blocks.push(block.close());
                }
            }
            Line::Header(level, text) => {
                if let Some(block) = open.take() {
                    blocks.push(block.close());
                }
                blocks.push(Block::Header { level, text: clean_inline(text) });
            }
            Line::Numbered(item) => match &mut open {
                Some(Open::Numbered(items)) => items.push(clean_inline(item)),
                _ => {
                    if let Some(block) = open.take() {
                        blocks.push(block.close());
                    }
                    open = Some(Open::Numbered(vec![clean_inline(item)]));
                }
            },
            Line::Bullet(item) => match &mut open {
                Some(Open::Bullet(items)) => items.push(clean_inline(item)),
                _ => {
                    if let Some(block) = open.take() {
                        blocks.push(block.close());
                    }
                    open = Some(Open::Bullet(vec![clean_inline(item)]));
                }
            },
            Line::Text(text) => {
                let indented = raw.starts_with(char::is_whitespace);
                match &mut open {
                    Some(Open::Paragraph(lines)) => lines.push(clean_inline(text)),
                    // Indented text continues the last list item
                    Some(Open::Numbered(items)) | Some(Open::Bullet(items)) if indented => {
                        if let Some(last) = items.last_mut() {
                            last.push(' ');
                            last.push_str(&clean_inline(text));
                        }
                    }
                    _ => {
                        if let Some(block) = open.take() {
                            blocks.push(block.close());
                        }
                        open = Some(Open::Paragraph(vec![clean_inline(text)]));
                    }
                }
            }
        }
    }

    if let Some(block) = open.take() {
        blocks.push(block.close());
    }
    blocks
}

/// Troubleshooting replies with named sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Troubleshooting {
    pub action_required: Option<Vec<String>>,
    pub tools_needed: Option<Vec<String>>,
    pub procedure: Option<Vec<String>>,
    pub resolution: Option<Vec<String>>,
    pub is_structured: bool,
}

#[derive(Debug, Clone, Copy)]
enum Section {
    ActionRequired,
    ToolsNeeded,
    Procedure,
    Resolution,
}

const SECTIONS: [(&str, Section); 4] = [
    ("ACTION REQUIRED", Section::ActionRequired),
    ("TOOLS NEEDED", Section::ToolsNeeded),
    ("PROCEDURE", Section::Procedure),
    ("RESOLUTION", Section::Resolution),
];

/// Recognise a section header. Returns the section and any inline content after it.
///
/// The name is a case-insensitive prefix of the line and must end at a word
/// boundary, so "Procedures are..." is prose while "PROCEDURE - ..." or
/// "Tools needed." are headers. A leading separator is dropped from the
/// inline content, and a bare parenthetical such as "(urgent)" is treated
/// as a qualifier rather than an item.
fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, '*' | ':' | '-' | '.' | '–' | '—')
}

fn section_header(line: &str) -> Option<(Section, &str)> {
    let line = line.trim_start_matches('#').trim().trim_start_matches('*').trim_start();
    for (name, section) in SECTIONS {
        let Some(head) = line.get(..name.len()) else { continue };
        if !head.eq_ignore_ascii_case(name) {
            continue;
        }
        let rest = &line[name.len()..];
        if rest.starts_with(char::is_alphanumeric) {
            continue;
        }
        let inline = rest.trim_start_matches(is_separator).trim_end();
        if inline.starts_with('(') && inline.ends_with(')') {
            return Some((section, ""));
        }
        return Some((section, inline));
    }
    None
}

fn item_text(line: &str) -> String {
    let line = line.trim();
    let line = strip_numbered(line).or_else(|| strip_bullet(line)).unwrap_or(line);
    clean_inline(line)
}

impl Troubleshooting {
    fn section_mut(&mut self, section: Section) -> &mut Vec<String> {
        let slot = match section {
            Section::ActionRequired => &mut self.action_required,
            Section::ToolsNeeded => &mut self.tools_needed,
            Section::Procedure => &mut self.procedure,
            Section::Resolution => &mut self.resolution,
        };
        slot.get_or_insert_with(Vec::new)
    }

    /// Sections in display order, skipping the ones never seen.
    pub fn sections(&self) -> Vec<(&'static str, &[String])> {
        [
            ("Action required", &self.action_required),
            ("Tools needed", &self.tools_needed),
            ("Procedure", &self.procedure),
            ("Resolution", &self.resolution),
        ]
        .into_iter()
        .filter_map(|(title, items)| items.as_deref().map(|i| (title, i)))
        .collect()
    }
}

pub fn parse_troubleshooting(text: &str) -> Troubleshooting {
    let mut result = Troubleshooting::default();
    let mut current: Option<Section> = None;

    for line in text.lines() {
        if let Some((section, inline)) = section_header(line) {
            current = Some(section);
            result.is_structured = true;
            let items = result.section_mut(section);
            if !inline.is_empty() {
                items.push(clean_inline(inline));
            }
            continue;
        }

        // Text before the first header is ignored
        let Some(section) = current else { continue };
        let item = item_text(line);
        if !item.is_empty() {
            result.section_mut(section).push(item);
        }
    }

    result
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum FormattedResponse {
    Structured(Troubleshooting),
    Blocks { blocks: Vec<Block> },
    Plain { text: String },
}

/// Named sections when present, otherwise blocks, otherwise the raw text.
pub fn format_response(text: &str) -> FormattedResponse {
    let structured = parse_troubleshooting(text);
    if structured.is_structured {
        return FormattedResponse::Structured(structured);
    }
    let blocks = parse_blocks(text);
    if blocks.is_empty() {
        return FormattedResponse::Plain { text: text.trim().to_string() };
    }
    FormattedResponse::Blocks { blocks }
}
