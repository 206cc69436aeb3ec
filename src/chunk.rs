//! Markdown chunker: bounded units for one translation request each.
//!
//! Two tiers, always in this order:
//!
//! 1. Split on header lines (`#` .. `######`, outside code fences). Each
//!    section runs from its header to just before the next one; text before
//!    the first header is a section of its own.
//! 2. If that yields at most one section, split the whole document on blank
//!    lines instead. A paragraph longer than the limit is cut at `". "`.
//!
//! Units are then packed greedily: a chunk grows while the total length
//! (joiners not counted) stays within `max_chunk_size`. A unit that is too
//! big on its own becomes its own chunk and is never cut further.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Separator placed between units inside a chunk, and between chunks when
/// translations are reassembled.
pub const JOINER: &str = "\n\n";

static RE_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s").unwrap());

/// One chunk of a document, in sequence order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkdownUnit {
    /// 0-based position in the document.
    pub index: usize,
    pub text: String,
}

impl MarkdownUnit {
    /// Length in characters.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Splits `markdown` into ordered units of at most `max_chunk_size`
/// characters (oversized atomic units excepted).
pub fn split(markdown: &str, max_chunk_size: usize) -> Vec<MarkdownUnit> {
    if markdown.trim().is_empty() {
        return Vec::new();
    }
    let max = max_chunk_size.max(1);

    let sections = split_sections(markdown);
    let mut packer = Packer::new(max);

    if sections.len() <= 1 {
        pack_paragraphs(markdown, &mut packer);
    } else {
        for section in sections {
            let section = section.trim_end_matches(['\n', '\r']);
            if !section.trim().is_empty() {
                packer.push(section, JOINER);
            }
        }
    }

    packer
        .finish()
        .into_iter()
        .enumerate()
        .map(|(index, text)| MarkdownUnit { index, text })
        .collect()
}

/// Concatenates chunk texts (or their translations) with [`JOINER`].
pub fn join<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(|p| p.as_ref())
        .collect::<Vec<_>>()
        .join(JOINER)
}

/// Header-delimited sections, line endings kept.
fn split_sections(markdown: &str) -> Vec<&str> {
    let mut sections = Vec::new();
    let mut start = 0;
    let mut offset = 0;
    let mut in_fence = false;

    for line in markdown.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        } else if !in_fence && RE_HEADER.is_match(line) && offset > start {
            sections.push(&markdown[start..offset]);
            start = offset;
        }
        offset += line.len();
    }
    if start < markdown.len() {
        sections.push(&markdown[start..]);
    }
    sections
}

fn pack_paragraphs(markdown: &str, packer: &mut Packer) {
    for paragraph in markdown.split(JOINER) {
        if paragraph.trim().is_empty() {
            continue;
        }
        if char_len(paragraph) <= packer.max {
            packer.push(paragraph, JOINER);
            continue;
        }

        packer.flush();
        let pieces: Vec<&str> = paragraph.split(". ").collect();
        let last = pieces.len() - 1;
        for (i, piece) in pieces.iter().enumerate() {
            let sentence = if i < last {
                format!("{piece}.")
            } else {
                piece.to_string()
            };
            packer.push(&sentence, " ");
        }
        packer.flush();
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Greedy accumulator.
struct Packer {
    max: usize,
    chunks: Vec<String>,
    current: String,
    current_len: usize,
}

impl Packer {
    fn new(max: usize) -> Self {
        Self {
            max,
            chunks: Vec::new(),
            current: String::new(),
            current_len: 0,
        }
    }

    fn push(&mut self, unit: &str, joiner: &str) {
        let len = char_len(unit);
        if !self.current.is_empty() && self.current_len + len > self.max {
            self.flush();
        }
        if !self.current.is_empty() {
            self.current.push_str(joiner);
        }
        self.current.push_str(unit);
        self.current_len += len;
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.chunks.push(std::mem::take(&mut self.current));
        }
        self.current_len = 0;
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(units: &[MarkdownUnit]) -> Vec<&str> {
        units.iter().map(|u| u.text.as_str()).collect()
    }

    #[test]
    fn single_page_stays_one_chunk() {
        let md = "# Page 1\n\nHello world\n\n---\n";
        let units = split(md, 2000);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].text, md);
        assert_eq!(units[0].index, 0);
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(split("", 100).is_empty());
        assert!(split("  \n\n ", 100).is_empty());
    }

    #[test]
    fn sections_are_packed_greedily() {
        let md = "# A\naaaa\n# B\nbbbb\n# C\ncccc\n";
        // Each section is 8 chars once its trailing newline is trimmed.
        let units = split(md, 16);
        assert_eq!(texts(&units), vec!["# A\naaaa\n\n# B\nbbbb", "# C\ncccc"]);
        assert_eq!(units[1].index, 1);
    }

    #[test]
    fn oversized_section_is_emitted_whole() {
        let big = format!("# Big\n{}", "x".repeat(50));
        let md = format!("# Small\nhi\n{big}\n# Tail\nok\n");
        let units = split(&md, 20);
        assert_eq!(texts(&units), vec!["# Small\nhi", big.as_str(), "# Tail\nok"]);
    }

    #[test]
    fn headers_inside_code_fences_do_not_split() {
        let md = "# Title\nintro\n```\n# not a header\n```\n# Next\nbody\n";
        let units = split(md, 1000);
        assert_eq!(units.len(), 1);
        assert!(units[0].text.contains("# not a header"));
        assert_eq!(split_sections(md).len(), 2);
    }

    #[test]
    fn paragraph_tier_without_headers() {
        let md = "one one\n\ntwo two\n\nthree";
        let units = split(md, 14);
        assert_eq!(texts(&units), vec!["one one\n\ntwo two", "three"]);
    }

    #[test]
    fn long_paragraph_falls_back_to_sentences() {
        let md = "Intro.\n\nFirst sentence here. Second sentence here. Third one.";
        let units = split(md, 25);
        assert_eq!(
            texts(&units),
            vec![
                "Intro.",
                "First sentence here.",
                "Second sentence here.",
                "Third one."
            ]
        );
    }

    #[test]
    fn join_reproduces_blank_line_separated_content() {
        let cases = [
            ("# A\nalpha\n\n# B\nbeta\n\n# C\ngamma", 10),
            ("# A\nalpha\n\n# B\nbeta\n\n# C\ngamma", 1000),
            ("one one\n\ntwo two\n\nthree", 14),
            ("# Page 1\n\nHello\n\n---\n\n# Page 2\n\nWorld\n\n---", 12),
        ];
        for (md, max) in cases {
            let texts: Vec<String> = split(md, max).into_iter().map(|u| u.text).collect();
            assert_eq!(join(&texts), md, "max {max}");
        }
    }

    /// Whitespace runs collapsed to one space.
    fn normalized(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn join_of_split_loses_no_content() {
        let page_doc = "# Page 1\n\nHello\n\n---\n\n# Page 2\n\n\
            ![Image 1 (10x10 PNG)](IMAGE_PLACEHOLDER:page_2_img_0)\n\n\
            | A | B |\n| --- | --- |\n| 1 | 2 |\n\n---\n";
        let oversized = format!("# Small\nhi\n# Big\n{}\n# Tail\nok\n", "x".repeat(50));
        let cases: Vec<(&str, String, usize)> = vec![
            ("single newline between sections", "# A\naaaa\n# B\nbbbb\n# C\ncccc\n".into(), 9),
            (
                "fenced header",
                "# Code\n```\n# not a header\nlet x = 1;\n```\n# After\ntext\n".into(),
                5,
            ),
            ("preamble before first header", "lead text\n# H\nbody\n".into(), 3),
            (
                "sentence fallback",
                "Intro.\n\nFirst sentence here. Second sentence here. Third one.".into(),
                25,
            ),
            ("multibyte sentences", "안녕하세요. 반갑습니다. 잘 지내요.".into(), 8),
            ("oversized section", oversized, 20),
            ("page document", page_doc.into(), 30),
            ("limit of one", "# a\nb\n\nc d. e f.".into(), 1),
        ];

        for (name, md, max) in &cases {
            let units = split(md, *max);
            assert!(!units.is_empty(), "{name}");
            for (i, unit) in units.iter().enumerate() {
                assert_eq!(unit.index, i, "{name}");
                assert!(!unit.text.trim().is_empty(), "{name}: blank chunk");
            }

            let texts: Vec<&str> = units.iter().map(|u| u.text.as_str()).collect();
            let joined = join(&texts);
            assert_eq!(normalized(&joined), normalized(md), "{name}");
            for line in md
                .lines()
                .filter(|l| l.starts_with("# Page") || l.contains("IMAGE_PLACEHOLDER"))
            {
                assert!(joined.lines().any(|j| j == line), "{name}: lost line {line:?}");
            }
        }
    }

    #[test]
    fn every_chunk_within_limit_unless_atomic() {
        let md = (1..=40)
            .map(|i| format!("Paragraph number {i} with some words."))
            .collect::<Vec<_>>()
            .join("\n\n");
        for unit in split(&md, 120) {
            let body: usize = unit.text.split(JOINER).map(char_len).sum();
            assert!(body <= 120, "chunk too large: {}", unit.text);
        }
    }
}
