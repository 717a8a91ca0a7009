use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::config::ChunkingConfig;

/// Heading paragraphs are only recognised below this many characters.
const MAX_HEADING_CHARS: usize = 100;

/// Words that end in a period without ending the sentence.
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "st", "jr", "sr", "prof", "mt", "capt", "sgt", "lt", "col", "gen",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub id: String,
    pub index: usize,
    pub section_index: usize,
    pub section_title: Option<String>,
    pub content: String,
    /// Byte offset of the first sentence in the normalized text.
    pub start_offset: usize,
    /// Byte offset just past the last sentence in the normalized text.
    pub end_offset: usize,
    pub word_count: usize,
    pub sentences: Vec<String>,
    /// Leading sentences repeated from the previous chunk of the same section.
    pub overlap_count: usize,
    pub is_chapter_start: bool,
    pub is_chapter_end: bool,
    pub has_dialogue: bool,
}

impl Chunk {
    pub fn empty() -> Self {
        Self {
            id: chunk_id(0),
            index: 0,
            section_index: 0,
            section_title: None,
            content: String::new(),
            start_offset: 0,
            end_offset: 0,
            word_count: 0,
            sentences: Vec::new(),
            overlap_count: 0,
            is_chapter_start: true,
            is_chapter_end: true,
            has_dialogue: false,
        }
    }

    /// Sentences first seen in this chunk (overlap excluded).
    pub fn fresh_sentences(&self) -> &[String] {
        &self.sentences[self.overlap_count.min(self.sentences.len())..]
    }
}

fn chunk_id(index: usize) -> String {
    format!("chunk_{index}")
}

#[derive(Debug, Clone)]
struct Sentence {
    text: String,
    start: usize,
    end: usize,
    chars: usize,
}

#[derive(Debug, Default)]
struct Section {
    title: Option<String>,
    sentences: Vec<Sentence>,
}

/// Splits prose into overlapping, sentence-aligned chunks grouped by section.
pub struct TextChunker {
    max_chunk_size: usize,
    overlap_size: usize,
    space_run: Regex,
    newline_padding: Regex,
    blank_run: Regex,
    numbered_heading: Regex,
    named_heading: Regex,
    markdown_heading: Regex,
    numeral_heading: Regex,
    caps_heading: Regex,
    terminator: Regex,
}

impl TextChunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            max_chunk_size: config.max_chunk_size,
            overlap_size: config.overlap_size,
            space_run: Regex::new(r" {2,}").unwrap(),
            newline_padding: Regex::new(r" ?\n ?").unwrap(),
            blank_run: Regex::new(r"\n{3,}").unwrap(),
            // Chapter 3 / Part II / Book One: The Crossing
            numbered_heading: Regex::new(
                r"(?i)^(?:chapter|part|book|section)\s+(?:\d+|[ivxlcdm]+|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve)\b[.:]?(?:\s+.*)?$",
            )
            .unwrap(),
            named_heading: Regex::new(r"(?i)^(?:prologue|epilogue|interlude)\b[.:]?(?:\s+.*)?$")
                .unwrap(),
            markdown_heading: Regex::new(r"^#{1,6}\s+(\S.*)$").unwrap(),
            numeral_heading: Regex::new(r"^(?:[IVXLCDM]+|\d+)\.?$").unwrap(),
            caps_heading: Regex::new(r"^[A-Z][A-Z0-9 ',:\-]{2,}$").unwrap(),
            terminator: Regex::new(r#"[.!?…]+["'”’)\]]*\s+"#).unwrap(),
        }
    }

    /// Normalizes whitespace: LF line endings, single spaces, at most one
    /// blank line between paragraphs, trimmed.
    pub fn normalize(&self, raw: &str) -> String {
        let text = raw
            .replace("\r\n", "\n")
            .replace('\r', "\n")
            .replace('\t', " ");
        let text = self.space_run.replace_all(&text, " ");
        let text = self.newline_padding.replace_all(&text, "\n");
        let text = self.blank_run.replace_all(&text, "\n\n");
        text.trim().to_string()
    }

    /// Normalizes `raw` and splits it into chunks.
    pub fn chunk(&self, raw: &str) -> Vec<Chunk> {
        let normalized = self.normalize(raw);
        self.chunk_normalized(&normalized)
    }

    /// Splits already-normalized text into chunks. Offsets refer to `text`.
    pub fn chunk_normalized(&self, text: &str) -> Vec<Chunk> {
        let sections = self.split_sections(text);

        let mut chunks = Vec::new();
        for (section_index, section) in sections.iter().enumerate() {
            let first = chunks.len();
            self.chunk_section(section, section_index, &mut chunks);
            if let Some(chunk) = chunks.get_mut(first) {
                chunk.is_chapter_start = true;
            }
            if chunks.len() > first {
                if let Some(chunk) = chunks.last_mut() {
                    chunk.is_chapter_end = true;
                }
            }
        }

        if chunks.is_empty() {
            debug!("no sentences in input, emitting a single empty chunk");
            return vec![Chunk::empty()];
        }

        debug!(
            "chunked {} bytes into {} chunks across {} sections",
            text.len(),
            chunks.len(),
            sections.len()
        );
        chunks
    }

    /// Returns the heading title when `para` looks like a section heading.
    fn heading_title(&self, para: &str) -> Option<String> {
        if para.chars().count() >= MAX_HEADING_CHARS || para.contains('\n') {
            return None;
        }
        if let Some(caps) = self.markdown_heading.captures(para) {
            return caps.get(1).map(|m| m.as_str().trim().to_string());
        }
        let is_heading = self.numbered_heading.is_match(para)
            || self.named_heading.is_match(para)
            || self.numeral_heading.is_match(para)
            || self.caps_heading.is_match(para);
        is_heading.then(|| para.trim().to_string())
    }

    fn split_sections(&self, text: &str) -> Vec<Section> {
        let mut sections = Vec::new();
        let mut current = Section::default();
        let mut offset = 0;

        for para in text.split("\n\n") {
            let para_start = offset;
            offset += para.len() + 2;
            if para.trim().is_empty() {
                continue;
            }

            if let Some(title) = self.heading_title(para) {
                if !current.sentences.is_empty() || current.title.is_some() {
                    sections.push(std::mem::take(&mut current));
                }
                current.title = Some(title);
                continue;
            }

            current
                .sentences
                .extend(self.split_sentences(para, para_start));
        }
        sections.push(current);

        // A trailing heading with no prose under it produces no chunks.
        sections.retain(|s| !s.sentences.is_empty());
        sections
    }

    /// Splits a paragraph on terminal punctuation followed by whitespace and
    /// a capital letter. `base` is the paragraph's offset in the full text.
    fn split_sentences(&self, para: &str, base: usize) -> Vec<Sentence> {
        let mut sentences = Vec::new();
        let mut start = 0;

        for m in self.terminator.find_iter(para) {
            let rest = &para[m.end()..];
            if !starts_sentence(rest) || ends_with_abbreviation(&para[start..m.start()]) {
                continue;
            }
            let end = m.start() + m.as_str().trim_end().len();
            push_sentence(&mut sentences, para, start, end, base);
            start = m.end();
        }
        push_sentence(&mut sentences, para, start, para.len(), base);

        sentences
    }

    fn chunk_section(&self, section: &Section, section_index: usize, chunks: &mut Vec<Chunk>) {
        let mut current: Vec<Sentence> = Vec::new();
        let mut overlap_count = 0;

        for sentence in &section.sentences {
            if !current.is_empty()
                && joined_len(&current) + 1 + sentence.chars > self.max_chunk_size
            {
                let closed = std::mem::take(&mut current);
                let seed = self.overlap_seed(&closed, sentence.chars);
                self.emit(chunks, section, section_index, &closed, overlap_count);
                overlap_count = seed.len();
                current = seed;
            }
            current.push(sentence.clone());
        }

        if !current.is_empty() {
            self.emit(chunks, section, section_index, &current, overlap_count);
        }
    }

    /// The last two sentences of `closed` if they fit the overlap budget and
    /// leave room for the next sentence, else the last one, else nothing.
    fn overlap_seed(&self, closed: &[Sentence], next_chars: usize) -> Vec<Sentence> {
        for take in [2, 1] {
            if closed.len() < take {
                continue;
            }
            let tail = &closed[closed.len() - take..];
            let len = joined_len(tail);
            if len <= self.overlap_size && len + 1 + next_chars <= self.max_chunk_size {
                return tail.to_vec();
            }
        }
        Vec::new()
    }

    fn emit(
        &self,
        chunks: &mut Vec<Chunk>,
        section: &Section,
        section_index: usize,
        sentences: &[Sentence],
        overlap_count: usize,
    ) {
        let index = chunks.len();
        let texts: Vec<String> = sentences.iter().map(|s| s.text.clone()).collect();
        let content = texts.join(" ");
        let has_dialogue = content.contains(['"', '“', '”']);

        chunks.push(Chunk {
            id: chunk_id(index),
            index,
            section_index,
            section_title: section.title.clone(),
            word_count: content.split_whitespace().count(),
            start_offset: sentences.first().map_or(0, |s| s.start),
            end_offset: sentences.last().map_or(0, |s| s.end),
            content,
            sentences: texts,
            overlap_count,
            is_chapter_start: false,
            is_chapter_end: false,
            has_dialogue,
        });
    }
}

fn push_sentence(out: &mut Vec<Sentence>, para: &str, start: usize, end: usize, base: usize) {
    let raw = &para[start..end];
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    let lead = raw.len() - raw.trim_start().len();
    // Single newlines inside a paragraph are hard wraps; '\n' and ' ' are both
    // one byte so offsets stay valid.
    let text = trimmed.replace('\n', " ");
    out.push(Sentence {
        chars: text.chars().count(),
        start: base + start + lead,
        end: base + start + lead + trimmed.len(),
        text,
    });
}

/// True when `rest` opens with a capital letter, optionally behind an
/// opening quote or bracket.
fn starts_sentence(rest: &str) -> bool {
    let mut chars = rest.chars();
    match chars.next() {
        Some(c) if c.is_uppercase() => true,
        Some('"' | '“' | '‘' | '\'' | '(' | '[') => chars.next().is_some_and(|c| c.is_uppercase()),
        _ => false,
    }
}

fn ends_with_abbreviation(before: &str) -> bool {
    let last_word = before
        .rsplit(|c: char| !c.is_alphabetic())
        .next()
        .unwrap_or_default()
        .to_lowercase();
    ABBREVIATIONS.contains(&last_word.as_str())
}

fn joined_len(sentences: &[Sentence]) -> usize {
    if sentences.is_empty() {
        return 0;
    }
    sentences.iter().map(|s| s.chars).sum::<usize>() + sentences.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(max_chunk_size: usize, overlap_size: usize) -> TextChunker {
        TextChunker::new(&ChunkingConfig {
            max_chunk_size,
            overlap_size,
        })
    }

    #[test]
    fn test_normalize_whitespace() {
        let c = chunker(500, 100);
        let raw = "  Line one.\r\nLine\ttwo.   Three.\n\n\n\n\nNext  para. \n \n\nEnd.  ";
        assert_eq!(
            c.normalize(raw),
            "Line one.\nLine two. Three.\n\nNext para.\n\nEnd."
        );
    }

    #[test]
    fn test_sentence_split_requires_capital() {
        let c = chunker(500, 100);
        let chunks = c.chunk("It was late. the door creaked. She waited! Did he come? Yes.");
        assert_eq!(
            chunks[0].sentences,
            vec![
                "It was late. the door creaked.",
                "She waited!",
                "Did he come?",
                "Yes."
            ]
        );
    }

    #[test]
    fn test_sentence_split_keeps_quotes_and_abbreviations() {
        let c = chunker(500, 100);
        let chunks = c.chunk("\"Run!\" she said. Mr. Hale followed. \"Wait,\" he called.");
        assert_eq!(
            chunks[0].sentences,
            vec!["\"Run!\" she said.", "Mr. Hale followed.", "\"Wait,\" he called."]
        );
        assert!(chunks[0].has_dialogue);
    }

    #[test]
    fn test_paragraph_without_terminator_is_one_sentence() {
        let c = chunker(500, 100);
        let chunks = c.chunk("a fragment with no ending\n\nAnother one");
        assert_eq!(
            chunks[0].sentences,
            vec!["a fragment with no ending", "Another one"]
        );
    }

    #[test]
    fn test_empty_input_gives_single_empty_chunk() {
        let c = chunker(500, 100);
        for raw in ["", "   \n\n  \t "] {
            let chunks = c.chunk(raw);
            assert_eq!(chunks.len(), 1);
            assert!(chunks[0].content.is_empty());
            assert!(chunks[0].sentences.is_empty());
            assert!(chunks[0].is_chapter_start && chunks[0].is_chapter_end);
        }
    }

    #[test]
    fn test_section_detection() {
        let c = chunker(500, 100);
        let text = "Opening words here.\n\nChapter 1: The Road\n\nThey walked far.\n\n## The River\n\nWater rose. It was cold.";
        let chunks = c.chunk(text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].section_title, None);
        assert_eq!(chunks[1].section_title.as_deref(), Some("Chapter 1: The Road"));
        assert_eq!(chunks[2].section_title.as_deref(), Some("The River"));
        assert_eq!(
            chunks.iter().map(|c| c.section_index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(chunks.iter().all(|c| c.is_chapter_start && c.is_chapter_end));
    }

    #[test]
    fn test_prose_starting_with_keyword_is_not_heading() {
        let c = chunker(500, 100);
        let chunks = c.chunk("Part of me wanted to stay.\n\nThe rest did not.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].sentences.len(), 2);
    }

    #[test]
    fn test_no_heading_means_one_section() {
        let c = chunker(60, 30);
        let text = "One short sentence. Two short sentence. Three short sentence. Four short sentence.";
        let chunks = c.chunk(text);
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| c.section_index == 0));
        assert!(chunks[0].is_chapter_start && !chunks[0].is_chapter_end);
        assert!(chunks.last().unwrap().is_chapter_end);
    }

    #[test]
    fn test_overlap_seeds_next_chunk() {
        let c = chunker(60, 45);
        let text = "Alpha goes first. Beta goes next. Gamma goes third. Delta goes last.";
        let chunks = c.chunk(text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[0].sentences,
            vec!["Alpha goes first.", "Beta goes next.", "Gamma goes third."]
        );
        assert_eq!(chunks[1].overlap_count, 2);
        assert_eq!(
            chunks[1].sentences,
            vec!["Beta goes next.", "Gamma goes third.", "Delta goes last."]
        );
        assert_eq!(chunks[1].fresh_sentences(), ["Delta goes last."]);
    }

    #[test]
    fn test_overlap_shrinks_to_fit_next_sentence() {
        let c = chunker(40, 35);
        let text = "Alpha goes first. Beta goes next. Gamma goes third. Delta goes last.";
        let chunks = c.chunk(text);
        let sentences: Vec<Vec<String>> = chunks.iter().map(|c| c.sentences.clone()).collect();
        assert_eq!(
            sentences,
            vec![
                vec!["Alpha goes first.", "Beta goes next."],
                vec!["Beta goes next.", "Gamma goes third."],
                vec!["Gamma goes third.", "Delta goes last."],
            ]
        );
        assert!(chunks[1..].iter().all(|c| c.overlap_count == 1));
    }

    #[test]
    fn test_oversized_sentence_is_never_split() {
        let c = chunker(40, 10);
        let long = "This sentence is far longer than the tiny chunk budget allows.";
        let chunks = c.chunk(&format!("Short one. {long} Tail."));
        assert!(chunks.iter().any(|ch| ch.sentences.iter().any(|s| s == long)));
        for ch in &chunks {
            for s in &ch.sentences {
                assert!(s.ends_with('.'));
            }
        }
    }

    #[test]
    fn test_offsets_point_into_normalized_text() {
        let c = chunker(50, 20);
        let raw = "First line here.  Second line here.\n\n\n\nThird para starts. Fourth one ends.";
        let normalized = c.normalize(raw);
        let chunks = c.chunk_normalized(&normalized);
        for ch in &chunks {
            let first = &ch.sentences[0];
            assert!(normalized[ch.start_offset..].starts_with(first.as_str()));
            let last = ch.sentences.last().unwrap();
            assert!(normalized[..ch.end_offset].ends_with(last.as_str()));
        }
        let indexes: Vec<usize> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indexes, (0..chunks.len()).collect::<Vec<_>>());
    }
}
