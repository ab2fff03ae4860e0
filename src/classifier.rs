// src/classifier.rs
//! Significance classifier.
//!
//! An ordered rule table evaluated short-circuit: each rule either abstains
//! (`None`) or returns a verdict, and the first verdict wins. Reordering or
//! adding a rule is an edit to [`RULES`], not to control flow.
//!
//! Phrase and stock-word checks only compare *presence* on each side, so they
//! are symmetric under swapping old/new. Digest comparisons are symmetric too.

use serde::Serialize;
use std::fmt;

use crate::fingerprint::FingerprintSet;
use crate::state::TargetRecord;

/// Case-insensitive phrase set tested by substring containment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordVocabulary {
    phrases: Vec<String>,
}

impl KeywordVocabulary {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for p in phrases {
            let p = p.as_ref().trim().to_lowercase();
            if !p.is_empty() && !out.contains(&p) {
                out.push(p);
            }
        }
        Self { phrases: out }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// First phrase whose presence differs between the two (already lowercased) texts.
    fn first_flip(&self, old_low: &str, new_low: &str) -> Option<&str> {
        self.phrases
            .iter()
            .find(|p| old_low.contains(p.as_str()) != new_low.contains(p.as_str()))
            .map(String::as_str)
    }
}

impl Default for KeywordVocabulary {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_KEYWORDS)
    }
}

/// Why a verdict was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Reason {
    /// No baseline yet; the observation becomes the baseline.
    FirstSighting,
    KeywordFlip { phrase: String, now_present: bool },
    StockWord { now_present: bool },
    TextChanged,
    ImageChanged,
    MarkupOnly,
    Unchanged,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::FirstSighting => write!(f, "first sighting (baseline recorded)"),
            Reason::KeywordFlip { phrase, now_present: true } => {
                write!(f, "keyword \"{phrase}\" appeared")
            }
            Reason::KeywordFlip { phrase, now_present: false } => {
                write!(f, "keyword \"{phrase}\" disappeared")
            }
            Reason::StockWord { now_present: true } => write!(f, "\"stock\" appeared"),
            Reason::StockWord { now_present: false } => write!(f, "\"stock\" disappeared"),
            Reason::TextChanged => write!(f, "page text changed"),
            Reason::ImageChanged => write!(f, "screenshot changed"),
            Reason::MarkupOnly => write!(f, "markup changed (ignored)"),
            Reason::Unchanged => write!(f, "no change"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub significant: bool,
    pub reason: Reason,
}

impl Verdict {
    fn alert(reason: Reason) -> Self {
        Self { significant: true, reason }
    }

    fn quiet(reason: Reason) -> Self {
        Self { significant: false, reason }
    }
}

/// Inputs shared by every rule. Texts are lowercased once up front.
struct Comparison<'a> {
    old_fp: &'a FingerprintSet,
    new_fp: &'a FingerprintSet,
    old_low: String,
    new_low: String,
    vocabulary: &'a KeywordVocabulary,
}

struct Rule {
    name: &'static str,
    check: fn(&Comparison<'_>) -> Option<Verdict>,
}

const RULES: &[Rule] = &[
    Rule { name: "keyword_flip", check: keyword_flip },
    Rule { name: "stock_word", check: stock_word },
    Rule { name: "content_or_visual", check: content_or_visual },
    Rule { name: "markup_only", check: markup_only },
    Rule { name: "unchanged", check: unchanged },
];

fn keyword_flip(c: &Comparison<'_>) -> Option<Verdict> {
    c.vocabulary.first_flip(&c.old_low, &c.new_low).map(|phrase| {
        Verdict::alert(Reason::KeywordFlip {
            phrase: phrase.to_string(),
            now_present: c.new_low.contains(phrase),
        })
    })
}

fn stock_word(c: &Comparison<'_>) -> Option<Verdict> {
    let before = c.old_low.contains("stock");
    let after = c.new_low.contains("stock");
    (before != after).then(|| Verdict::alert(Reason::StockWord { now_present: after }))
}

fn content_or_visual(c: &Comparison<'_>) -> Option<Verdict> {
    if c.old_fp.text_digest != c.new_fp.text_digest {
        return Some(Verdict::alert(Reason::TextChanged));
    }
    if c.old_fp.image_digest != c.new_fp.image_digest {
        return Some(Verdict::alert(Reason::ImageChanged));
    }
    None
}

fn markup_only(c: &Comparison<'_>) -> Option<Verdict> {
    (c.old_fp.markup_digest != c.new_fp.markup_digest).then(|| Verdict::quiet(Reason::MarkupOnly))
}

fn unchanged(_: &Comparison<'_>) -> Option<Verdict> {
    Some(Verdict::quiet(Reason::Unchanged))
}

const OUT_OF_STOCK_PHRASES: &[&str] = &[
    "out of stock",
    "sold out",
    "unavailable",
    "coming soon",
    "notify me",
];
const IN_STOCK_PHRASES: &[&str] = &["in stock", "add to cart", "available to ship"];

/// Best-effort availability read from visible text. Informational only; it
/// never feeds the significance rules.
pub fn availability(text: &str) -> Option<bool> {
    let low = text.to_lowercase();
    if OUT_OF_STOCK_PHRASES.iter().any(|p| low.contains(p)) {
        return Some(false);
    }
    if IN_STOCK_PHRASES.iter().any(|p| low.contains(p)) {
        return Some(true);
    }
    None
}

#[derive(Debug, Clone, Default)]
pub struct Classifier {
    vocabulary: KeywordVocabulary,
}

impl Classifier {
    pub fn new(vocabulary: KeywordVocabulary) -> Self {
        Self { vocabulary }
    }

    pub fn vocabulary(&self) -> &KeywordVocabulary {
        &self.vocabulary
    }

    pub fn is_significant(
        &self,
        old_fp: &FingerprintSet,
        new_fp: &FingerprintSet,
        old_text: &str,
        new_text: &str,
    ) -> bool {
        self.classify(old_fp, new_fp, old_text, new_text).significant
    }

    pub fn classify(
        &self,
        old_fp: &FingerprintSet,
        new_fp: &FingerprintSet,
        old_text: &str,
        new_text: &str,
    ) -> Verdict {
        let cmp = Comparison {
            old_fp,
            new_fp,
            old_low: old_text.to_lowercase(),
            new_low: new_text.to_lowercase(),
            vocabulary: &self.vocabulary,
        };
        for rule in RULES {
            if let Some(verdict) = (rule.check)(&cmp) {
                tracing::debug!(
                    target: "classifier",
                    rule = rule.name,
                    significant = verdict.significant,
                    "rule fired"
                );
                return verdict;
            }
        }
        // `unchanged` never abstains.
        Verdict::quiet(Reason::Unchanged)
    }

    /// Compare against a persisted baseline. With no baseline the new
    /// observation only establishes one: first sightings never alert.
    pub fn classify_against(
        &self,
        previous: Option<&TargetRecord>,
        new_fp: &FingerprintSet,
        new_text: &str,
    ) -> Verdict {
        match previous {
            None => Verdict::quiet(Reason::FirstSighting),
            Some(prev) => self.classify(&prev.fingerprints(), new_fp, &prev.last_visible_text, new_text),
        }
    }
}
