//! English grapheme-to-phoneme conversion.
//!
//! Words are looked up in the CMU Pronouncing Dictionary and their ARPABET
//! pronunciations rewritten as IPA, the symbol set the legacy Kokoro
//! vocabulary is built on. Words missing from the dictionary pass through
//! lowercased.

use crate::error::{SynthesisError, SynthesisResult};
use cmudict_fast::{Cmudict, Rule};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// Dictionary file name looked up next to the model.
pub const DICTIONARY_FILE: &str = "cmudict.dict";

lazy_static! {
    /// ARPABET to IPA symbol mapping
    static ref ARPABET_TO_IPA: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        // Vowels
        m.insert("AA", "ɑ");
        m.insert("AE", "æ");
        m.insert("AH", "ʌ");
        m.insert("AO", "ɔ");
        m.insert("AW", "aʊ");
        m.insert("AX", "ə");
        m.insert("AXR", "ɚ");
        m.insert("AY", "aɪ");
        m.insert("EH", "ɛ");
        m.insert("ER", "ɝ");
        m.insert("EY", "eɪ");
        m.insert("IH", "ɪ");
        m.insert("IX", "ɨ");
        m.insert("IY", "i");
        m.insert("OW", "oʊ");
        m.insert("OY", "ɔɪ");
        m.insert("UH", "ʊ");
        m.insert("UW", "u");
        m.insert("UX", "ʉ");
        // Consonants
        m.insert("B", "b");
        m.insert("CH", "tʃ");
        m.insert("D", "d");
        m.insert("DH", "ð");
        m.insert("DX", "ɾ");
        m.insert("EL", "l̩");
        m.insert("EM", "m̩");
        m.insert("EN", "n̩");
        m.insert("F", "f");
        m.insert("G", "ɡ");
        m.insert("HH", "h");
        m.insert("JH", "dʒ");
        m.insert("K", "k");
        m.insert("L", "l");
        m.insert("M", "m");
        m.insert("N", "n");
        m.insert("NG", "ŋ");
        m.insert("NX", "ɾ̃");
        m.insert("P", "p");
        m.insert("Q", "ʔ");
        m.insert("R", "ɹ");
        m.insert("S", "s");
        m.insert("SH", "ʃ");
        m.insert("T", "t");
        m.insert("TH", "θ");
        m.insert("V", "v");
        m.insert("W", "w");
        m.insert("WH", "ʍ");
        m.insert("Y", "j");
        m.insert("Z", "z");
        m.insert("ZH", "ʒ");
        m
    };
}

/// CMU dictionary phonemizer.
pub struct Phonemizer {
    cmudict: Cmudict,
}

impl Phonemizer {
    /// Load a `cmudict.dict` file.
    pub fn new(dict_path: impl AsRef<Path>) -> SynthesisResult<Self> {
        let dict_path = dict_path.as_ref();
        if !dict_path.is_file() {
            return Err(SynthesisError::Io(format!(
                "CMU dictionary not found: {}",
                dict_path.display()
            )));
        }
        let cmudict = Cmudict::new(dict_path).map_err(|e| {
            SynthesisError::Format(format!(
                "failed to load CMU dictionary {}: {}",
                dict_path.display(),
                e
            ))
        })?;
        log::debug!("Loaded CMU dictionary from {}", dict_path.display());
        Ok(Self { cmudict })
    }

    /// Find a dictionary: `explicit` if given, else `cmudict.dict` in the
    /// model directory, the user config directory (`sonance/`), and
    /// `/usr/share/cmudict/`, in that order.
    pub fn locate(explicit: Option<&Path>, model_dir: &Path) -> SynthesisResult<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }

        let mut candidates = vec![model_dir.join(DICTIONARY_FILE)];
        if let Some(config) = dirs::config_dir() {
            candidates.push(config.join("sonance").join(DICTIONARY_FILE));
        }
        candidates.push(Path::new("/usr/share/cmudict").join(DICTIONARY_FILE));

        candidates.iter().find(|path| path.is_file()).cloned().ok_or_else(|| {
            let searched: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
            SynthesisError::Config(format!(
                "CMU dictionary not found (searched {}); set dictionary_path",
                searched.join(", ")
            ))
        })
    }

    /// Convert text to space-separated IPA words, NFC-normalized to match
    /// `tokens.txt` entries.
    ///
    /// Stress markers (1, 2) become IPA stress marks before the vowel.
    pub fn phonemize(&self, text: &str) -> String {
        let words: Vec<String> = text
            .split_whitespace()
            .map(|word| self.phonemize_word(word))
            .collect();
        words.join(" ").nfc().collect()
    }

    fn phonemize_word(&self, word: &str) -> String {
        let clean_word = word.to_lowercase();
        let (prefix, word_part, suffix) = extract_punctuation(&clean_word);
        if word_part.is_empty() {
            return clean_word;
        }

        match self.cmudict.get(word_part).and_then(|rules| rules.first()) {
            Some(rule) => format!("{}{}{}", prefix, arpabet_to_ipa(rule), suffix),
            None => {
                log::trace!("'{}' not in dictionary, passing through", word_part);
                clean_word
            }
        }
    }
}

fn arpabet_to_ipa(rule: &Rule) -> String {
    let mut ipa = String::new();
    for phoneme in rule.pronunciation() {
        let symbol = phoneme.to_string();
        let base = symbol.trim_end_matches(|c: char| matches!(c, '0' | '1' | '2'));
        match &symbol[base.len()..] {
            "1" => ipa.push('ˈ'),
            "2" => ipa.push('ˌ'),
            _ => {}
        }
        ipa.push_str(ARPABET_TO_IPA.get(base).copied().unwrap_or(base));
    }
    ipa
}

/// Split leading and trailing punctuation off a word.
fn extract_punctuation(word: &str) -> (&str, &str, &str) {
    let Some(start) = word.find(char::is_alphanumeric) else {
        return (word, "", "");
    };
    let end = word
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_alphanumeric())
        .map_or(start, |(i, c)| i + c.len_utf8());
    (&word[..start], &word[start..end], &word[end..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CMUDICT_FIXTURE;
    use tempfile::TempDir;

    fn phonemizer(dir: &TempDir) -> Phonemizer {
        let path = dir.path().join(DICTIONARY_FILE);
        std::fs::write(&path, CMUDICT_FIXTURE).unwrap();
        Phonemizer::new(&path).unwrap()
    }

    #[test]
    fn test_extract_punctuation() {
        assert_eq!(extract_punctuation("hello,"), ("", "hello", ","));
        assert_eq!(extract_punctuation("\"hello!\""), ("\"", "hello", "!\""));
        assert_eq!(extract_punctuation("..."), ("...", "", ""));
        assert_eq!(extract_punctuation("ça"), ("", "ça", ""));
    }

    #[test]
    fn test_phonemize_marks_stress() {
        let dir = TempDir::new().unwrap();
        let phonemizer = phonemizer(&dir);
        assert_eq!(phonemizer.phonemize("Hello, cats!"), "hʌlˈoʊ, kˈæts!");
    }

    #[test]
    fn test_unknown_words_pass_through() {
        let dir = TempDir::new().unwrap();
        let phonemizer = phonemizer(&dir);
        assert_eq!(phonemizer.phonemize("two Zorbs"), "tˈu zorbs");
    }

    #[test]
    fn test_locate_prefers_model_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(DICTIONARY_FILE), CMUDICT_FIXTURE).unwrap();
        assert_eq!(
            Phonemizer::locate(None, dir.path()).unwrap(),
            dir.path().join(DICTIONARY_FILE)
        );

        let explicit = Path::new("/data/custom.dict");
        assert_eq!(Phonemizer::locate(Some(explicit), dir.path()).unwrap(), explicit);
    }

    #[test]
    fn test_missing_dictionary_is_io_error() {
        assert!(matches!(
            Phonemizer::new("/nonexistent/cmudict.dict"),
            Err(SynthesisError::Io(_))
        ));
    }
}
