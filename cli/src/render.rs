//! Terminal layout for assistant replies.

use common::{Block, FormattedResponse};

pub fn render(response: &FormattedResponse) -> String {
    let mut out = String::new();
    match response {
        FormattedResponse::Structured(ts) => {
            for (title, items) in ts.sections() {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(&format!("{}:\n", title.to_uppercase()));
                let numbered = title == "Procedure";
                for (i, item) in items.iter().enumerate() {
                    if numbered {
                        out.push_str(&format!("  {}. {}\n", i + 1, item));
                    } else {
                        out.push_str(&format!("  - {}\n", item));
                    }
                }
            }
        }
        FormattedResponse::Blocks { blocks } => {
            for block in blocks {
                if !out.is_empty() {
                    out.push('\n');
                }
                render_block(block, &mut out);
            }
        }
        FormattedResponse::Plain { text } => {
            out.push_str(text);
            out.push('\n');
        }
    }
    out
}

fn render_block(block: &Block, out: &mut String) {
    match block {
        Block::Header { level, text } => {
            out.push_str(text);
            out.push('\n');
            let rule = if *level <= 1 { '=' } else { '-' };
            out.push_str(&rule.to_string().repeat(text.chars().count()));
            out.push('\n');
        }
        Block::NumberedList(items) => {
            for (i, item) in items.iter().enumerate() {
                out.push_str(&format!("  {}. {}\n", i + 1, item));
            }
        }
        Block::BulletList(items) => {
            for item in items {
                out.push_str(&format!("  • {}\n", item));
            }
        }
        Block::Paragraph(text) => {
            out.push_str(text);
            out.push('\n');
        }
    }
}
