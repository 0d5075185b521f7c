//! Text to token-id conversion.
//!
//! Two vocabulary sources are supported:
//! - `tokens.txt`: one `token id` pair per line (Kokoro v1.x). Text is
//!   split into characters and characters missing from the vocabulary are
//!   dropped.
//! - `vocab.json` (+ optional `token_scores.json`): a subword vocabulary
//!   segmented by greedy longest match (Pocket). Unmatched characters map
//!   to the unknown id and the sequence is closed with an end marker.

use crate::error::{SynthesisError, SynthesisResult};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// How input text is split before lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segmentation {
    /// One lookup per character.
    Character,
    /// Repeatedly consume the longest vocabulary entry that prefixes the
    /// remaining text.
    LongestMatch,
}

/// Special ids around the encoded text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub bos: i64,
    pub eos: Option<i64>,
    /// Id for characters absent from the vocabulary; `None` drops them.
    pub unk: Option<i64>,
    pub pad: i64,
}

/// Vocabulary-backed tokenizer.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    vocab: HashMap<String, i64>,
    /// Vocabulary entries sorted by descending byte length.
    sorted_tokens: Vec<String>,
    segmentation: Segmentation,
    special: SpecialTokens,
}

impl Tokenizer {
    pub fn new(
        vocab: HashMap<String, i64>,
        segmentation: Segmentation,
        special: SpecialTokens,
    ) -> Self {
        let mut sorted_tokens: Vec<String> = vocab.keys().cloned().collect();
        // Ties broken lexically so segmentation does not depend on hash order.
        sorted_tokens.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        Self {
            vocab,
            sorted_tokens,
            segmentation,
            special,
        }
    }

    /// Load a `tokens.txt` file. Blank and malformed lines are skipped.
    pub fn from_tokens_file(path: impl AsRef<Path>) -> SynthesisResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            SynthesisError::Io(format!("failed to read {}: {}", path.display(), e))
        })?;

        let mut vocab = HashMap::new();
        for line in content.lines() {
            if line.is_empty() {
                continue;
            }
            // Split on the last space so a literal space token (" 16") survives.
            let Some((token, id)) = line.rsplit_once(' ') else {
                continue;
            };
            if let Ok(id) = id.trim().parse::<i64>() {
                vocab.insert(token.to_string(), id);
            }
        }

        log::debug!("Loaded {} tokens from {}", vocab.len(), path.display());
        Ok(Self::new(
            vocab,
            Segmentation::Character,
            SpecialTokens {
                bos: 0,
                eos: None,
                unk: None,
                pad: 0,
            },
        ))
    }

    /// Load a subword `vocab.json`, plus `token_scores.json` when given.
    ///
    /// Scores are checked and counted but do not affect segmentation, which
    /// is greedy longest match. A missing or unreadable scores file is
    /// ignored.
    pub fn from_vocab_json(
        vocab_path: impl AsRef<Path>,
        scores_path: Option<&Path>,
    ) -> SynthesisResult<Self> {
        let vocab_path = vocab_path.as_ref();
        let raw = fs::read_to_string(vocab_path).map_err(|e| {
            SynthesisError::Io(format!("failed to read {}: {}", vocab_path.display(), e))
        })?;
        let vocab: HashMap<String, i64> = serde_json::from_str(&raw)?;

        let tokenizer = Self::new(
            vocab,
            Segmentation::LongestMatch,
            SpecialTokens {
                bos: 1,
                eos: Some(2),
                unk: Some(3),
                pad: 0,
            },
        );

        if let Some(scores_path) = scores_path {
            match fs::read_to_string(scores_path)
                .ok()
                .and_then(|s| serde_json::from_str::<HashMap<String, f32>>(&s).ok())
            {
                Some(scores) => log::debug!("Loaded {} token scores", scores.len()),
                None => log::debug!("No token scores loaded from {}", scores_path.display()),
            }
        }

        log::debug!(
            "Loaded vocabulary of {} entries from {}",
            tokenizer.vocab_size(),
            vocab_path.display()
        );
        Ok(tokenizer)
    }

    /// Encode text to ids.
    ///
    /// Returns an empty sequence only when the vocabulary is empty. Callers
    /// treat that as a failed request.
    pub fn encode(&self, text: &str) -> Vec<i64> {
        if self.vocab.is_empty() {
            return Vec::new();
        }

        let mut ids = Vec::with_capacity(text.len() + 2);
        ids.push(self.special.bos);

        match self.segmentation {
            Segmentation::Character => {
                let mut buf = [0u8; 4];
                for ch in text.chars() {
                    self.push_char(ch.encode_utf8(&mut buf), &mut ids);
                }
            }
            Segmentation::LongestMatch => {
                let mut remaining = text;
                while let Some(ch) = remaining.chars().next() {
                    let matched = self
                        .sorted_tokens
                        .iter()
                        .find(|token| !token.is_empty() && remaining.starts_with(token.as_str()));
                    match matched {
                        Some(token) => {
                            ids.push(self.vocab[token]);
                            remaining = &remaining[token.len()..];
                        }
                        None => {
                            let width = ch.len_utf8();
                            self.push_char(&remaining[..width], &mut ids);
                            remaining = &remaining[width..];
                        }
                    }
                }
            }
        }

        if let Some(eos) = self.special.eos {
            ids.push(eos);
        }
        ids
    }

    fn push_char(&self, ch: &str, ids: &mut Vec<i64>) {
        if let Some(&id) = self.vocab.get(ch) {
            ids.push(id);
        } else if let Some(unk) = self.special.unk {
            ids.push(unk);
        }
    }

    /// Look up a single vocabulary entry, e.g. a `[EN]` language tag.
    pub fn token_id(&self, token: &str) -> Option<i64> {
        self.vocab.get(token).copied()
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    pub fn special_tokens(&self) -> SpecialTokens {
        self.special
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn subword(entries: &[(&str, i64)]) -> Tokenizer {
        let vocab = entries.iter().map(|(t, i)| (t.to_string(), *i)).collect();
        Tokenizer::new(
            vocab,
            Segmentation::LongestMatch,
            SpecialTokens {
                bos: 1,
                eos: Some(2),
                unk: Some(3),
                pad: 0,
            },
        )
    }

    #[test]
    fn test_empty_vocab_encodes_to_nothing() {
        let tokenizer = subword(&[]);
        assert!(tokenizer.encode("").is_empty());
        assert!(tokenizer.encode("hello").is_empty());
    }

    #[test]
    fn test_empty_text_keeps_markers() {
        let tokenizer = subword(&[("a", 10)]);
        assert_eq!(tokenizer.encode(""), vec![1, 2]);
    }

    #[test]
    fn test_longest_match_wins() {
        let tokenizer = subword(&[("h", 10), ("he", 11), ("hell", 12), ("o", 13), ("l", 14)]);
        assert_eq!(tokenizer.encode("hello"), vec![1, 12, 13, 2]);
    }

    #[test]
    fn test_unmatched_character_maps_to_unknown() {
        let tokenizer = subword(&[("a", 10)]);
        assert_eq!(tokenizer.encode("aé"), vec![1, 10, 3, 2]);
    }

    #[test]
    fn test_multibyte_tokens() {
        let tokenizer = subword(&[("你好", 20), ("你", 21)]);
        assert_eq!(tokenizer.encode("你好你"), vec![1, 20, 21, 2]);
    }

    #[test]
    fn test_tokens_file_character_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.txt");
        std::fs::write(&path, "$ 0\nh 50\ni 51\n  16\n[EN] 178\n\nbroken-line\nx notanumber\n")
            .unwrap();

        let tokenizer = Tokenizer::from_tokens_file(&path).unwrap();
        assert_eq!(tokenizer.vocab_size(), 5);
        assert_eq!(tokenizer.token_id("[EN]"), Some(178));
        assert_eq!(tokenizer.token_id(" "), Some(16));
        // "?" is not in the vocabulary and is dropped.
        assert_eq!(tokenizer.encode("hi ?"), vec![0, 50, 51, 16]);
    }

    #[test]
    fn test_vocab_json_with_scores() {
        let dir = TempDir::new().unwrap();
        let vocab = dir.path().join("vocab.json");
        let scores = dir.path().join("token_scores.json");
        std::fs::write(&vocab, r#"{"<pad>":0,"<s>":1,"</s>":2,"<unk>":3,"ab":4,"a":5}"#).unwrap();
        std::fs::write(&scores, r#"{"ab":-1.5}"#).unwrap();

        let tokenizer = Tokenizer::from_vocab_json(&vocab, Some(&scores)).unwrap();
        assert_eq!(tokenizer.encode("aba"), vec![1, 4, 5, 2]);
        assert_eq!(tokenizer.special_tokens().pad, 0);
    }

    #[test]
    fn test_vocab_json_malformed() {
        let dir = TempDir::new().unwrap();
        let vocab = dir.path().join("vocab.json");
        std::fs::write(&vocab, "[not a map]").unwrap();
        assert!(matches!(
            Tokenizer::from_vocab_json(&vocab, None),
            Err(SynthesisError::Format(_))
        ));
    }
}
