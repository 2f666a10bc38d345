//! Sentence segmentation of a growing response buffer.
//!
//! The whole buffer is re-tokenized on every update and the complete list is
//! republished. Consumers replace their view with each snapshot instead of
//! applying diffs. Only the trailing sentence can still change as text
//! arrives, so it is held back until the stream completes.

use std::sync::Arc;

/// Words that end in a period without ending the sentence.
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "st", "sr", "jr", "prof", "vs", "etc", "e.g", "i.e", "approx", "no",
    "mt", "ft", "inc", "ltd", "co",
];

const TERMINATORS: &[char] = &['.', '!', '?', '…'];
const CLOSERS: &[char] = &['"', '\'', ')', ']', '}', '”', '’', '»'];

/// One published view of a streaming response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamSnapshot {
    /// Everything received so far
    pub text: String,

    /// Every sentence in `text`, the trailing one included
    pub sentences: Arc<[String]>,

    /// The stream reached its end marker
    pub complete: bool,
}

impl StreamSnapshot {
    /// Sentences that will not change any more.
    ///
    /// Before completion the trailing sentence may still be extended by the
    /// next chunk, so it is left out.
    pub fn finalized(&self) -> &[String] {
        if self.complete {
            &self.sentences
        } else {
            let keep = self.sentences.len().saturating_sub(1);
            &self.sentences[..keep]
        }
    }
}

/// Accumulates streamed chunks and tokenizes them into sentences.
#[derive(Debug, Default)]
pub struct SentenceSegmenter {
    buffer: String,
}

impl SentenceSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) {
        self.buffer.push_str(chunk);
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn into_text(self) -> String {
        self.buffer
    }

    /// Tokenize the current buffer into a snapshot.
    pub fn snapshot(&self, complete: bool) -> StreamSnapshot {
        StreamSnapshot {
            text: self.buffer.clone(),
            sentences: split_sentences(&self.buffer).into(),
            complete,
        }
    }
}

/// Split text into trimmed, non-empty sentences.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let byte_at = |i: usize| chars.get(i).map_or(text.len(), |(b, _)| *b);

    let mut sentences = Vec::new();
    let mut start = 0;
    let mut i = 0;

    let emit = |from: usize, to: usize, out: &mut Vec<String>| {
        let sentence = text[from..to].trim();
        if !sentence.is_empty() {
            out.push(sentence.to_string());
        }
    };

    while i < chars.len() {
        let c = chars[i].1;

        if c == '\n' && blank_line_at(&chars, i) {
            emit(start, byte_at(i), &mut sentences);
            start = byte_at(i);
            i += 1;
            continue;
        }

        if !TERMINATORS.contains(&c) {
            i += 1;
            continue;
        }

        let mut end = i;
        while end < chars.len() && TERMINATORS.contains(&chars[end].1) {
            end += 1;
        }
        let run = end - i;
        while end < chars.len() && CLOSERS.contains(&chars[end].1) {
            end += 1;
        }

        // The buffer may still grow; the trailing sentence decides later.
        let boundary = match chars.get(end) {
            None => false,
            Some((_, next)) if !next.is_whitespace() => false,
            Some(_) => {
                let following = chars[end..].iter().map(|(_, c)| *c).find(|c| !c.is_whitespace());
                let lowercase_next = following.is_some_and(char::is_lowercase);
                let abbreviation = c == '.' && run == 1 && is_abbreviation(&chars, i);
                !lowercase_next && !abbreviation
            }
        };

        if boundary {
            emit(start, byte_at(end), &mut sentences);
            start = byte_at(end);
        }
        i = end;
    }

    emit(start, text.len(), &mut sentences);
    sentences
}

/// A newline followed (after optional spaces) by another newline.
fn blank_line_at(chars: &[(usize, char)], i: usize) -> bool {
    chars[i + 1..]
        .iter()
        .map(|(_, c)| *c)
        .take_while(|c| c.is_whitespace())
        .any(|c| c == '\n')
}

/// Whether the word ending at the period at `dot` is an abbreviation.
fn is_abbreviation(chars: &[(usize, char)], dot: usize) -> bool {
    let word: String = chars[..dot]
        .iter()
        .rev()
        .map(|(_, c)| *c)
        .take_while(|c| c.is_alphabetic() || *c == '.')
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    // "Mary's." is not an initial
    let starts_word = dot
        .checked_sub(word.chars().count() + 1)
        .is_none_or(|prev| matches!(chars[prev].1, c if c.is_whitespace() || "([\"“‘".contains(c)));
    if !starts_word {
        return false;
    }

    let word = word.trim_start_matches('.').to_lowercase();

    if word.chars().count() == 1 {
        // Initials such as "J. R. R. Tolkien"
        return word.chars().all(char::is_alphabetic);
    }
    ABBREVIATIONS.contains(&word.as_str())
}
