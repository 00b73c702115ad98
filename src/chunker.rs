//! Text chunking for embedding.
//!
//! Splits long values into size-limited pieces along the strongest boundary
//! available: paragraphs first, then sentences, then fixed character windows.
//! Consecutive chunks share a trailing overlap so context carries across the
//! cut. Token counts are estimated from character counts, not tokenized.

use serde::Deserialize;

/// Chunking knobs. Also the `[chunking]` section of the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// When false, every value is embedded whole as a single chunk.
    pub enabled: bool,
    pub max_tokens: usize,
    pub overlap_tokens: usize,
    pub chars_per_token: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_tokens: 400,
            overlap_tokens: 50,
            chars_per_token: 4,
        }
    }
}

impl ChunkerConfig {
    fn max_chars(&self) -> usize {
        self.max_tokens * self.chars_per_token.max(1)
    }

    fn overlap_chars(&self) -> usize {
        self.overlap_tokens * self.chars_per_token.max(1)
    }
}

/// `ceil(chars / chars_per_token)`.
pub fn estimate_tokens(text: &str, chars_per_token: usize) -> usize {
    text.chars().count().div_ceil(chars_per_token.max(1))
}

/// Split `text` into ordered, non-empty chunks no larger than `max_tokens`.
pub fn chunk_text(text: &str, config: &ChunkerConfig) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    if fits(text, config) {
        return vec![text.to_string()];
    }

    let paragraphs = split_paragraphs(text);
    pack(&paragraphs, "\n\n", Level::Paragraph, config)
}

#[derive(Clone, Copy)]
enum Level {
    Paragraph,
    Sentence,
}

fn fits(text: &str, config: &ChunkerConfig) -> bool {
    estimate_tokens(text, config.chars_per_token) <= config.max_tokens
}

/// Accumulate pieces into chunks, flushing when the next piece would not fit.
fn pack(pieces: &[String], sep: &str, level: Level, config: &ChunkerConfig) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    // False while `current` holds nothing but an overlap seed.
    let mut has_new = false;

    for piece in pieces {
        if !fits(piece, config) {
            if has_new {
                chunks.push(std::mem::take(&mut current));
            }
            let split = match level {
                Level::Paragraph => pack(&split_sentences(piece), " ", Level::Sentence, config),
                Level::Sentence => hard_split(piece, config.max_chars()),
            };
            chunks.extend(split);
            current = chunks.last().map(|c| overlap_tail(c, config)).unwrap_or_default();
            has_new = false;
            continue;
        }

        if current.is_empty() {
            current.push_str(piece);
            has_new = true;
            continue;
        }

        let candidate = format!("{current}{sep}{piece}");
        if fits(&candidate, config) {
            current = candidate;
            has_new = true;
            continue;
        }

        let seed = if has_new {
            let tail = overlap_tail(&current, config);
            chunks.push(std::mem::take(&mut current));
            tail
        } else {
            std::mem::take(&mut current)
        };

        let seeded = format!("{seed}{sep}{piece}");
        current = if !seed.is_empty() && fits(&seeded, config) {
            seeded
        } else {
            piece.clone()
        };
        has_new = true;
    }

    if has_new && !current.trim().is_empty() {
        chunks.push(current);
    }

    chunks
}

/// The last `overlap_tokens * chars_per_token` characters of `chunk`.
fn overlap_tail(chunk: &str, config: &ChunkerConfig) -> String {
    let want = config.overlap_chars();
    if want == 0 {
        return String::new();
    }
    let total = chunk.chars().count();
    if total <= want {
        return chunk.to_string();
    }
    chunk.chars().skip(total - want).collect()
}

/// Blank-line separated blocks, trimmed, with empty blocks dropped.
fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n").trim().to_string());
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n").trim().to_string());
    }

    paragraphs.retain(|p| !p.is_empty());
    paragraphs
}

/// Split after `.`, `!` or `?` when followed by whitespace. The terminator
/// stays with its sentence; the whitespace run is dropped.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let Some(&(_, next)) = chars.peek() else {
            break;
        };
        if !next.is_whitespace() {
            continue;
        }
        let end = idx + ch.len_utf8();
        let sentence = text[start..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        while chars.next_if(|&(_, c)| c.is_whitespace()).is_some() {}
        start = chars.peek().map_or(text.len(), |&(i, _)| i);
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

/// Fixed windows of `window` characters. Last resort, no overlap.
fn hard_split(text: &str, window: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(window.max(1))
        .map(|w| w.iter().collect::<String>())
        .filter(|w| !w.trim().is_empty())
        .collect()
}
