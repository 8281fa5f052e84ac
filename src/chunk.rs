//! Recursive token-bounded text chunker.
//!
//! Splits segment text into [`Chunk`]s of at most `max_tokens` tokens, with
//! consecutive chunks sharing at least `overlap_tokens` tokens. Splitting
//! prefers coarse boundaries: paragraphs (`\n\n`), then lines, sentences and
//! words, and only falls back to single characters when nothing else fits.
//!
//! Pieces are packed greedily. A piece that does not fit is refined into
//! finer pieces, and so is the overlap tail carried into the next chunk, so
//! the overlap survives a boundary between a short and a long paragraph.
//!
//! Each chunk receives a deterministic id: a SHA-256 over its source, page,
//! index and text.

use std::collections::VecDeque;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::models::{Chunk, Segment};
use crate::tokens::TokenCounter;

/// Boundaries tried in order; `""` means "split into characters".
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];
/// Index of the word separator. Overlap tails are refined down to this level.
const WORD_LEVEL: usize = 3;
const CHAR_LEVEL: usize = SEPARATORS.len() - 1;

/// A slice of the input with its token count and the separator level it
/// was split at.
#[derive(Debug, Clone, Copy)]
struct Piece<'a> {
    text: &'a str,
    tokens: usize,
    level: usize,
}

pub struct RecursiveSplitter {
    max_tokens: usize,
    overlap_tokens: usize,
    counter: Arc<dyn TokenCounter>,
}

impl RecursiveSplitter {
    pub fn new(max_tokens: usize, overlap_tokens: usize, counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            max_tokens,
            overlap_tokens,
            counter,
        }
    }

    pub fn counter(&self) -> &dyn TokenCounter {
        self.counter.as_ref()
    }

    /// Chunk every segment. Indices restart at 0 for each segment.
    pub fn split_segments(&self, segments: &[Segment]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for segment in segments {
            for (index, text) in self.split_text(&segment.text).into_iter().enumerate() {
                let token_count = self.counter.count(&text);
                chunks.push(make_chunk(segment, index, text, token_count));
            }
        }
        chunks
    }

    /// Split raw text into trimmed, non-empty pieces within the token bound.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let mut queue: VecDeque<Piece> = self.refine(text, 0).into();
        let mut window: VecDeque<Piece> = VecDeque::new();
        let mut total = 0usize;
        // Window holds text not yet emitted as a chunk.
        let mut pending = false;
        let mut chunks = Vec::new();

        while let Some(piece) = queue.pop_front() {
            if total + piece.tokens <= self.max_tokens {
                total += piece.tokens;
                window.push_back(piece);
                pending = true;
                continue;
            }
            // A window shorter than the overlap would reappear whole in the
            // next chunk, so keep filling it with finer pieces instead.
            if pending && (total >= self.overlap_tokens || piece.level == CHAR_LEVEL) {
                chunks.extend(join_window(&window));
                pending = false;
                self.keep_overlap(&mut window, &mut total);
                queue.push_front(piece);
                continue;
            }
            // The piece does not fit after the window: split it finer, or
            // give up tail tokens.
            if piece.level < CHAR_LEVEL {
                for finer in self.refine(piece.text, piece.level + 1).into_iter().rev() {
                    queue.push_front(finer);
                }
            } else if let Some(front) = window.pop_front() {
                total -= front.tokens;
                queue.push_front(piece);
            } else {
                // Single character above the bound; only reachable with max_tokens == 0.
                chunks.extend(non_empty_trimmed(piece.text));
            }
        }

        if pending {
            chunks.extend(join_window(&window));
        }
        chunks
    }

    /// Split `text` on the first separator at or after `level` that occurs in it.
    fn refine<'a>(&self, text: &'a str, level: usize) -> Vec<Piece<'a>> {
        let level = (level..CHAR_LEVEL)
            .find(|&i| text.contains(SEPARATORS[i]))
            .unwrap_or(CHAR_LEVEL);
        split_keep_end(text, SEPARATORS[level])
            .into_iter()
            .map(|text| Piece {
                text,
                tokens: self.counter.count(text),
                level,
            })
            .collect()
    }

    /// Reduce an emitted window to the shortest tail reaching
    /// `overlap_tokens`, refining a coarse front piece down to words so the
    /// tail does not carry a whole paragraph.
    fn keep_overlap<'a>(&self, window: &mut VecDeque<Piece<'a>>, total: &mut usize) {
        loop {
            while let Some(front) = window.front() {
                let rest = *total - front.tokens;
                if rest < self.overlap_tokens {
                    break;
                }
                *total = rest;
                window.pop_front();
            }
            let Some(&front) = window.front() else {
                return;
            };
            if *total <= self.overlap_tokens || front.level >= WORD_LEVEL {
                return;
            }
            window.pop_front();
            *total -= front.tokens;
            for finer in self.refine(front.text, front.level + 1).into_iter().rev() {
                *total += finer.tokens;
                window.push_front(finer);
            }
        }
    }
}

/// Split on `separator`, keeping it attached to the end of each piece.
fn split_keep_end<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }
    text.split_inclusive(separator)
        .filter(|s| !s.is_empty())
        .collect()
}

fn join_window(window: &VecDeque<Piece>) -> Option<String> {
    let joined: String = window.iter().map(|p| p.text).collect();
    non_empty_trimmed(&joined)
}

fn non_empty_trimmed(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn make_chunk(segment: &Segment, index: usize, text: String, token_count: usize) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(segment.source.as_bytes());
    hasher.update(segment.page.unwrap_or(0).to_le_bytes());
    hasher.update((index as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    let id = format!("{:x}", hasher.finalize())[..32].to_string();

    Chunk {
        id,
        source: segment.source.clone(),
        page: segment.page,
        chunk_index: index,
        text,
        token_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::ApproxTokenCounter;

    fn splitter(max: usize, overlap: usize) -> RecursiveSplitter {
        RecursiveSplitter::new(max, overlap, Arc::new(ApproxTokenCounter))
    }

    /// Tokens in the longest suffix of `prev` that `next` starts with, by words.
    fn shared_tokens(s: &RecursiveSplitter, prev: &str, next: &str) -> usize {
        let prev: Vec<&str> = prev.split_whitespace().collect();
        let next: Vec<&str> = next.split_whitespace().collect();
        (1..=prev.len().min(next.len()))
            .rev()
            .find(|&k| prev[prev.len() - k..] == next[..k])
            .map(|k| s.counter().count(&next[..k].join(" ")))
            .unwrap_or(0)
    }

    fn segment(text: &str) -> Segment {
        Segment {
            source: "doc.pdf".into(),
            page: Some(1),
            text: text.into(),
        }
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = splitter(900, 100).split_segments(&[segment("Hello, world!")]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].source, "doc.pdf");
        assert_eq!(chunks[0].page, Some(1));
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        assert!(splitter(900, 100).split_text("").is_empty());
        assert!(splitter(900, 100).split_text(" \n\n ").is_empty());
    }

    #[test]
    fn test_paragraph_boundary_preferred() {
        let p1 = "pear ".repeat(30);
        let p2 = "plum ".repeat(30);
        let text = format!("{}\n\n{}", p1.trim(), p2.trim());
        let s = splitter(40, 5);
        let chunks = s.split_text(&text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], p1.trim());
        assert!(chunks[1].starts_with("pear pear pear pear pear\n\nplum"));
        assert!(chunks[1].ends_with(p2.trim()));
        assert_eq!(shared_tokens(&s, &chunks[0], &chunks[1]), 5);
    }

    #[test]
    fn test_every_chunk_within_bound() {
        let text = (0..60)
            .map(|i| format!("Paragraph number {} has a handful of words in it.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let s = splitter(25, 5);
        let chunks = s.split_text(&text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(s.counter().count(c) <= 25, "chunk over bound: {:?}", c);
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let text = (0..400)
            .map(|i| format!("w{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let s = splitter(50, 10);
        let chunks = s.split_text(&text);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            assert!(shared_tokens(&s, &pair[0], &pair[1]) >= 10);
        }
    }

    fn paragraph(prefix: &str, words: usize) -> String {
        (0..words)
            .map(|i| format!("{}{}", prefix, i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_overlap_carried_into_oversized_paragraph() {
        let text = format!("{}\n\n{}", paragraph("a", 150), paragraph("b", 1200));
        let s = splitter(900, 100);
        let chunks = s.split_text(&text);
        assert!(chunks.len() >= 3);
        assert!(chunks[0].ends_with("a149"));
        assert!(chunks[1].contains("a149\n\nb0 b1"));
        for pair in chunks.windows(2) {
            assert!(shared_tokens(&s, &pair[0], &pair[1]) >= 100);
        }
        for c in &chunks {
            assert!(s.counter().count(c) <= 900);
        }
    }

    #[test]
    fn test_overlap_holds_across_paragraph_sizes() {
        let s = splitter(900, 100);
        for (first, second) in [(850, 100), (300, 700), (40, 2000), (899, 899)] {
            let text = format!("{}\n\n{}", paragraph("x", first), paragraph("y", second));
            let chunks = s.split_text(&text);
            assert!(chunks.len() >= 2, "sizes {} / {}", first, second);
            for pair in chunks.windows(2) {
                let shared = shared_tokens(&s, &pair[0], &pair[1]);
                assert!(shared >= 100, "sizes {} / {}: shared {}", first, second, shared);
            }
            for c in &chunks {
                assert!(s.counter().count(c) <= 900);
            }
        }
    }

    #[test]
    fn test_long_word_falls_back_to_characters() {
        let word = "x".repeat(100);
        let s = splitter(5, 1);
        let chunks = s.split_text(&word);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(s.counter().count(c) <= 5);
        }
    }

    #[test]
    fn test_chunk_indices_restart_per_segment() {
        let long = (0..100)
            .map(|i| format!("Sentence {}.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let segs = vec![segment(&long), segment("short page")];
        let chunks = splitter(20, 4).split_segments(&segs);
        let last = chunks.last().unwrap();
        assert_eq!(last.text, "short page");
        assert_eq!(last.chunk_index, 0);
        for (i, c) in chunks[..chunks.len() - 1].iter().enumerate() {
            assert_eq!(c.chunk_index, i);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let s = splitter(2, 0);
        let c1 = s.split_segments(&[segment(text)]);
        let c2 = s.split_segments(&[segment(text)]);
        assert_eq!(c1, c2);
        assert_eq!(c1.len(), 4);
        assert_ne!(c1[0].id, c1[1].id);
    }
}
