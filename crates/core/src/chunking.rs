use crate::error::IngestError;
use crate::models::{Chunk, ChunkKind, ChunkingOptions, Document};
use regex::Regex;

/// Markdown `#` headings plus the numbered section headings that survive
/// PDF text extraction (markers are lost, the numbering is not).
const HEADING_PATTERN: &str = r"^(?:#{1,6}\s+\S.*|\d+(?:\.\d+)*\s+[A-Z][^.]{0,78})$";

#[derive(Debug, Clone, PartialEq)]
enum Block {
    Heading(String),
    Paragraph(String),
    Table(String),
}

impl Block {
    fn text(&self) -> &str {
        match self {
            Block::Heading(text) | Block::Paragraph(text) | Block::Table(text) => text,
        }
    }

    fn is_table(&self) -> bool {
        matches!(self, Block::Table(_))
    }
}

/// Splits a document into ordered chunks along structural boundaries.
/// Chunk order matches document order; the zero-based position is what the
/// chunk ID is derived from.
pub fn split_document(
    document: &Document,
    options: &ChunkingOptions,
) -> Result<Vec<Chunk>, IngestError> {
    if options.max_chars == 0 {
        return Err(IngestError::InvalidChunkConfig(
            "max_chars must be positive".to_string(),
        ));
    }
    if options.overlap_chars >= options.max_chars {
        return Err(IngestError::InvalidChunkConfig(format!(
            "overlap_chars {} must be smaller than max_chars {}",
            options.overlap_chars, options.max_chars
        )));
    }

    let heading_re = Regex::new(HEADING_PATTERN)?;
    let blocks = parse_blocks(&document.content, &heading_re);
    let units = attach_headings(blocks, options.max_chars);
    let packed = pack_units(units, options);

    Ok(packed
        .into_iter()
        .enumerate()
        .map(|(index, (content, has_table))| {
            let kind = if has_table {
                ChunkKind::Table
            } else {
                ChunkKind::Text
            };
            Chunk::new(&document.source, index, kind, content)
        })
        .collect())
}

fn parse_blocks(text: &str, heading_re: &Regex) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut paragraph: Vec<String> = Vec::new();
    let mut table: Vec<String> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with('|') {
            flush_lines(&mut paragraph, &mut blocks, false);
            table.push(trimmed.to_string());
            continue;
        }
        flush_lines(&mut table, &mut blocks, true);

        if trimmed.is_empty() {
            flush_lines(&mut paragraph, &mut blocks, false);
            continue;
        }

        if heading_re.is_match(trimmed) {
            flush_lines(&mut paragraph, &mut blocks, false);
            blocks.push(Block::Heading(trimmed.to_string()));
            continue;
        }

        paragraph.push(trimmed.to_string());
    }

    flush_lines(&mut table, &mut blocks, true);
    flush_lines(&mut paragraph, &mut blocks, false);
    blocks
}

fn flush_lines(lines: &mut Vec<String>, blocks: &mut Vec<Block>, as_table: bool) {
    if lines.is_empty() {
        return;
    }
    let text = lines.join("\n");
    lines.clear();
    blocks.push(if as_table {
        Block::Table(text)
    } else {
        Block::Paragraph(text)
    });
}

/// Glues each heading to the block that follows it when the pair fits in
/// one chunk, so a heading does not end up orphaned at a split point.
fn attach_headings(blocks: Vec<Block>, max_chars: usize) -> Vec<Block> {
    let mut units = Vec::new();
    let mut pending: Option<String> = None;

    for block in blocks {
        match block {
            Block::Heading(heading) => {
                if let Some(previous) = pending.take() {
                    units.push(Block::Heading(previous));
                }
                pending = Some(heading);
            }
            other => match pending.take() {
                Some(heading) if heading.len() + 2 + other.text().len() <= max_chars => {
                    let glued = format!("{}\n\n{}", heading, other.text());
                    units.push(if other.is_table() {
                        Block::Table(glued)
                    } else {
                        Block::Paragraph(glued)
                    });
                }
                Some(heading) => {
                    units.push(Block::Heading(heading));
                    units.push(other);
                }
                None => units.push(other),
            },
        }
    }

    if let Some(heading) = pending {
        units.push(Block::Heading(heading));
    }
    units
}

fn pack_units(units: Vec<Block>, options: &ChunkingOptions) -> Vec<(String, bool)> {
    let mut packed: Vec<(String, bool)> = Vec::new();
    let mut current = String::new();
    let mut current_has_table = false;

    for unit in units {
        let is_table = unit.is_table();
        let text = match unit {
            Block::Heading(text) | Block::Paragraph(text) | Block::Table(text) => text,
        };

        if text.len() > options.max_chars {
            flush_current(&mut packed, &mut current, &mut current_has_table);
            if is_table {
                // a table never splits; it goes out whole even when oversized
                packed.push((text, true));
            } else {
                for piece in split_by_chars(&text, options) {
                    packed.push((piece, false));
                }
            }
            continue;
        }

        if !current.is_empty() && current.len() + 2 + text.len() > options.max_chars {
            let tail = overlap_tail(&current, options.overlap_chars);
            flush_current(&mut packed, &mut current, &mut current_has_table);
            current.push_str(&tail);
        }

        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(&text);
        current_has_table |= is_table;
    }

    flush_current(&mut packed, &mut current, &mut current_has_table);
    packed
}

fn flush_current(packed: &mut Vec<(String, bool)>, current: &mut String, has_table: &mut bool) {
    if !current.is_empty() {
        packed.push((std::mem::take(current), *has_table));
        *has_table = false;
    }
}

fn split_by_chars(text: &str, options: &ChunkingOptions) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = options
        .max_chars
        .saturating_sub(options.overlap_chars)
        .max(1);

    let mut pieces = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + options.max_chars).min(chars.len());
        pieces.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    pieces
}

fn overlap_tail(text: &str, overlap_chars: usize) -> String {
    if overlap_chars == 0 || text.is_empty() {
        return String::new();
    }
    let chars: Vec<char> = text.chars().collect();
    let start = chars.len().saturating_sub(overlap_chars);
    chars[start..].iter().collect()
}
