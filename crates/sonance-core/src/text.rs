//! Rule-based text normalization for English synthesis.
//!
//! Expands the things a character-level tokenizer cannot read aloud
//! (contractions, currency, clock times, ordinals, digits) and strips
//! markup. The output is deterministic and normalizing it again is a no-op.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref URL_RE: Regex = Regex::new(r"https?://\S+|www\.\S+").unwrap();
    static ref HTML_TAG_RE: Regex = Regex::new(r"<[^>]+>").unwrap();
    static ref EMAIL_RE: Regex = Regex::new(r"\S+@\S+\.\S+").unwrap();
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").unwrap();
    static ref CURRENCY_RE: Regex = Regex::new(r"\$(\d+)(?:\.(\d{2}))?").unwrap();
    static ref TIME_RE: Regex =
        Regex::new(r"\b(\d{1,2}):(\d{2})(?:\s*([AaPp][Mm]))?\b").unwrap();
    static ref ORDINAL_RE: Regex = Regex::new(r"\b(\d+)(?:st|nd|rd|th)\b").unwrap();
    static ref NUMBER_RE: Regex = Regex::new(r"\b\d{1,15}\b").unwrap();
    static ref CONTRACTION_RE: Regex = {
        let alternatives: Vec<String> = CONTRACTIONS
            .iter()
            .map(|(from, _)| regex::escape(from))
            .collect();
        Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|"))).unwrap()
    };
    static ref NEGATION_RE: Regex = Regex::new(r"(?i)\b([a-z]+)n't\b").unwrap();
}

/// Whole-word contractions, checked before the generic `n't` rule.
const CONTRACTIONS: &[(&str, &str)] = &[
    ("won't", "will not"),
    ("can't", "cannot"),
    ("shan't", "shall not"),
    ("let's", "let us"),
    ("i'm", "i am"),
    ("you're", "you are"),
    ("we're", "we are"),
    ("they're", "they are"),
    ("he's", "he is"),
    ("she's", "she is"),
    ("it's", "it is"),
    ("that's", "that is"),
    ("there's", "there is"),
    ("what's", "what is"),
    ("i've", "i have"),
    ("you've", "you have"),
    ("we've", "we have"),
    ("they've", "they have"),
    ("i'd", "i would"),
    ("you'd", "you would"),
    ("he'd", "he would"),
    ("she'd", "she would"),
    ("we'd", "we would"),
    ("they'd", "they would"),
    ("i'll", "i will"),
    ("you'll", "you will"),
    ("he'll", "he will"),
    ("she'll", "she will"),
    ("it'll", "it will"),
    ("we'll", "we will"),
    ("they'll", "they will"),
];

const ONES: [&str; 20] = [
    "", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten", "eleven",
    "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen", "nineteen",
];

const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

const SCALES: [&str; 5] = ["", "thousand", "million", "billion", "trillion"];

/// English text normalizer.
#[derive(Debug, Clone, Default)]
pub struct TextNormalizer;

impl TextNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize raw input text.
    pub fn normalize(&self, text: &str) -> String {
        let text: String = text.nfc().collect();
        let text = URL_RE.replace_all(&text, "");
        let text = HTML_TAG_RE.replace_all(&text, "");
        let text = EMAIL_RE.replace_all(&text, "");
        let text = expand_contractions(&text);
        let text = expand_currency(&text);
        let text = expand_time(&text);
        let text = expand_ordinals(&text);
        let text = expand_numbers(&text);
        let text = normalize_punctuation(&text);
        WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
    }
}

fn expand_contractions(text: &str) -> String {
    let text = CONTRACTION_RE.replace_all(text, |caps: &Captures| {
        let matched = &caps[0];
        let lower = matched.to_lowercase();
        match CONTRACTIONS.iter().find(|(from, _)| *from == lower) {
            Some((_, expansion)) => match_case(matched, expansion),
            None => matched.to_string(),
        }
    });
    NEGATION_RE
        .replace_all(&text, |caps: &Captures| format!("{} not", &caps[1]))
        .into_owned()
}

/// Carry a leading capital from `original` over to `replacement`.
fn match_case(original: &str, replacement: &str) -> String {
    let starts_upper = original.chars().next().is_some_and(char::is_uppercase);
    if !starts_upper {
        return replacement.to_string();
    }
    let mut chars = replacement.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn expand_currency(text: &str) -> String {
    CURRENCY_RE
        .replace_all(text, |caps: &Captures| {
            let dollars = parse_digits(&caps[1]);
            let mut out = format!(
                "{} {}",
                number_to_words(dollars),
                if dollars == 1 { "dollar" } else { "dollars" }
            );
            if let Some(cents) = caps.get(2).map(|m| parse_digits(m.as_str())) {
                if cents > 0 {
                    out.push_str(&format!(
                        " and {} {}",
                        number_to_words(cents),
                        if cents == 1 { "cent" } else { "cents" }
                    ));
                }
            }
            out
        })
        .into_owned()
}

fn expand_time(text: &str) -> String {
    TIME_RE
        .replace_all(text, |caps: &Captures| {
            let hour = parse_digits(&caps[1]);
            let minute = parse_digits(&caps[2]);
            let meridiem = caps.get(3).map(|m| m.as_str().to_lowercase());

            let mut out = number_to_words(hour);
            match minute {
                0 if meridiem.is_none() => out.push_str(" o'clock"),
                0 => {}
                1..=9 => out.push_str(&format!(" oh {}", number_to_words(minute))),
                _ => out.push_str(&format!(" {}", number_to_words(minute))),
            }
            if let Some(meridiem) = meridiem {
                out.push(' ');
                out.push_str(&meridiem);
            }
            out
        })
        .into_owned()
}

fn expand_ordinals(text: &str) -> String {
    ORDINAL_RE
        .replace_all(text, |caps: &Captures| ordinal_to_words(parse_digits(&caps[1])))
        .into_owned()
}

fn expand_numbers(text: &str) -> String {
    NUMBER_RE
        .replace_all(text, |caps: &Captures| number_to_words(parse_digits(&caps[0])))
        .into_owned()
}

fn normalize_punctuation(text: &str) -> String {
    text.chars()
        .fold(String::with_capacity(text.len()), |mut out, ch| {
            match ch {
                '\u{201c}' | '\u{201d}' | '\u{00ab}' | '\u{00bb}' => out.push('"'),
                '\u{2018}' | '\u{2019}' => out.push('\''),
                '\u{2014}' | '\u{2013}' => out.push_str(", "),
                '\u{2026}' => out.push_str("..."),
                '\u{2022}' => out.push(','),
                other => out.push(other),
            }
            out
        })
}

fn parse_digits(digits: &str) -> u64 {
    digits
        .bytes()
        .fold(0u64, |n, b| n.saturating_mul(10).saturating_add(u64::from(b - b'0')))
}

/// Spell out a non-negative integer in English words.
pub fn number_to_words(n: u64) -> String {
    if n == 0 {
        return "zero".to_string();
    }

    let mut parts = Vec::new();
    let mut rest = n;
    let mut scale = 0;
    while rest > 0 {
        let chunk = (rest % 1000) as usize;
        if chunk > 0 {
            let mut words = chunk_to_words(chunk);
            if scale > 0 && scale < SCALES.len() {
                words.push(' ');
                words.push_str(SCALES[scale]);
            }
            parts.push(words);
        }
        rest /= 1000;
        scale += 1;
    }
    parts.reverse();
    parts.join(" ")
}

fn chunk_to_words(n: usize) -> String {
    match n {
        0 => String::new(),
        1..=19 => ONES[n].to_string(),
        20..=99 if n % 10 == 0 => TENS[n / 10].to_string(),
        20..=99 => format!("{} {}", TENS[n / 10], ONES[n % 10]),
        _ if n % 100 == 0 => format!("{} hundred", ONES[n / 100]),
        _ => format!("{} hundred {}", ONES[n / 100], chunk_to_words(n % 100)),
    }
}

/// Spell out an ordinal, e.g. 21 -> "twenty first".
pub fn ordinal_to_words(n: u64) -> String {
    let cardinal = number_to_words(n);
    let (head, last) = match cardinal.rsplit_once(' ') {
        Some((head, last)) => (Some(head), last),
        None => (None, cardinal.as_str()),
    };
    let ordinal = match last {
        "one" => "first".to_string(),
        "two" => "second".to_string(),
        "three" => "third".to_string(),
        "five" => "fifth".to_string(),
        "eight" => "eighth".to_string(),
        "nine" => "ninth".to_string(),
        "twelve" => "twelfth".to_string(),
        word if word.ends_with('y') => format!("{}ieth", &word[..word.len() - 1]),
        word => format!("{}th", word),
    };
    match head {
        Some(head) => format!("{} {}", head, ordinal),
        None => ordinal,
    }
}
