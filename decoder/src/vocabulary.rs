use std::collections::HashMap;

pub const PAD_TOKEN: &str = "<pad>";
pub const START_TOKEN: &str = "<s>";
pub const END_TOKEN: &str = "</s>";
pub const UNK_TOKEN: &str = "<unk>";

pub const PAD_TOKEN_INDEX: usize = 0;
pub const START_TOKEN_INDEX: usize = 1;
pub const END_TOKEN_INDEX: usize = 2;
pub const UNK_TOKEN_INDEX: usize = 3;

// Pad forcing zeroes symbols of finished sequences and `decoded` shifts
// indices by one; both only hold when pad is the first id.
const _: () = assert!(PAD_TOKEN_INDEX == 0);

/// Word <-> index mapping with the four reserved symbols at the front.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    word_to_index: HashMap<String, usize>,
    index_to_word: Vec<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new()
    }
}

impl Vocabulary {
    /// A vocabulary holding only the reserved symbols.
    pub fn new() -> Self {
        let mut vocab = Self {
            word_to_index: HashMap::new(),
            index_to_word: Vec::new(),
        };
        for token in [PAD_TOKEN, START_TOKEN, END_TOKEN, UNK_TOKEN] {
            vocab.add_word(token);
        }
        vocab
    }

    pub fn from_wordlist<S: AsRef<str>>(words: impl IntoIterator<Item = S>) -> Self {
        let mut vocab = Self::new();
        for word in words {
            vocab.add_word(word.as_ref());
        }
        vocab
    }

    /// Build a vocabulary from a tokenized corpus, keeping the first
    /// occurrence order of words.
    pub fn from_tokenized_text<S: AsRef<str>>(tokens: impl IntoIterator<Item = S>) -> Self {
        Self::from_wordlist(tokens)
    }

    pub fn add_word(&mut self, word: &str) -> usize {
        if let Some(&idx) = self.word_to_index.get(word) {
            return idx;
        }
        let idx = self.index_to_word.len();
        self.word_to_index.insert(word.to_string(), idx);
        self.index_to_word.push(word.to_string());
        idx
    }

    pub fn len(&self) -> usize {
        self.index_to_word.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_to_word.is_empty()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.word_to_index.contains_key(word)
    }

    pub fn index_of(&self, word: &str) -> usize {
        self.word_to_index
            .get(word)
            .copied()
            .unwrap_or(UNK_TOKEN_INDEX)
    }

    pub fn word(&self, index: usize) -> &str {
        self.index_to_word
            .get(index)
            .map(String::as_str)
            .unwrap_or(UNK_TOKEN)
    }

    /// Map padded token sentences to ids, row by row.
    pub fn sentences_to_indices(&self, sentences: &[Vec<String>]) -> Vec<Vec<usize>> {
        sentences
            .iter()
            .map(|sentence| sentence.iter().map(|w| self.index_of(w)).collect())
            .collect()
    }

    /// Map id rows back to words, cutting each row at the first end symbol
    /// and skipping padding.
    pub fn indices_to_sentences(&self, rows: &[Vec<usize>]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|row| {
                row.iter()
                    .take_while(|&&idx| idx != END_TOKEN_INDEX)
                    .filter(|&&idx| idx != PAD_TOKEN_INDEX)
                    .map(|&idx| self.word(idx).to_string())
                    .collect()
            })
            .collect()
    }
}

/// Pad (or truncate) a batch of token sentences to a common width.
///
/// The width is the length of the longest sentence including the optional
/// start and end symbols, capped at `max_length`. The end symbol survives
/// truncation so every padded row terminates.
pub fn pad_batch(
    sentences: &[Vec<String>],
    max_length: usize,
    add_start_symbol: bool,
    add_end_symbol: bool,
) -> Vec<Vec<String>> {
    let extra = usize::from(add_start_symbol) + usize::from(add_end_symbol);
    let width = sentences
        .iter()
        .map(|s| s.len() + extra)
        .max()
        .unwrap_or(extra)
        .min(max_length);

    sentences
        .iter()
        .map(|sentence| {
            let mut row = Vec::with_capacity(width);
            if add_start_symbol {
                row.push(START_TOKEN.to_string());
            }
            let room = width.saturating_sub(row.len() + usize::from(add_end_symbol));
            row.extend(sentence.iter().take(room).cloned());
            if add_end_symbol && row.len() < width {
                row.push(END_TOKEN.to_string());
            }
            row.resize(width, PAD_TOKEN.to_string());
            row
        })
        .collect()
}

/// Whitespace tokenization, lowercased.
pub fn simple_tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(|s| s.to_lowercase()).collect()
}
