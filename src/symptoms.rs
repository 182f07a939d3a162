//! Canonical symptom counting

use std::collections::BTreeSet;

use crate::config::DEFAULT_CANONICAL_SYMPTOMS;

/// Counts canonical physical-symptom matches in a checklist
#[derive(Debug, Clone)]
pub struct SymptomCounter {
    canonical: Vec<String>,
}

impl Default for SymptomCounter {
    fn default() -> Self {
        Self::new(DEFAULT_CANONICAL_SYMPTOMS.iter().copied())
    }
}

impl SymptomCounter {
    pub fn new<I, S>(canonical: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tags: Vec<String> = canonical
            .into_iter()
            .map(|s| canonical_tag(s.as_ref()))
            .filter(|s| !s.is_empty())
            .collect();
        tags.sort();
        tags.dedup();
        Self { canonical: tags }
    }

    /// Size of the intersection between `symptoms` and the canonical list
    pub fn count(&self, symptoms: &BTreeSet<String>) -> usize {
        count_canonical(symptoms, &self.canonical)
    }

    /// True when every canonical symptom is present
    pub fn all_present(&self, symptoms: &BTreeSet<String>) -> bool {
        self.count(symptoms) == self.canonical.len()
    }

    pub fn canonical(&self) -> &[String] {
        &self.canonical
    }
}

/// Count observed symptoms that appear in `canonical`. Other tags are ignored.
pub fn count_canonical(symptoms: &BTreeSet<String>, canonical: &[String]) -> usize {
    canonical.iter().filter(|tag| symptoms.contains(*tag)).count()
}

/// Normalize a symptom label to snake_case.
///
/// `backPain`, `Back Pain` and `back-pain` all become `back_pain`. Non-ASCII
/// labels pass through unchanged apart from trimming.
pub fn canonical_tag(raw: &str) -> String {
    let mut tag = String::with_capacity(raw.len() + 4);
    let mut prev_lower = false;

    for ch in raw.trim().chars() {
        if ch.is_ascii_uppercase() {
            if prev_lower {
                tag.push('_');
            }
            tag.push(ch.to_ascii_lowercase());
            prev_lower = false;
        } else if ch == ' ' || ch == '-' || ch == '_' {
            if !tag.is_empty() && !tag.ends_with('_') {
                tag.push('_');
            }
            prev_lower = false;
        } else {
            tag.push(ch);
            prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        }
    }

    while tag.ends_with('_') {
        tag.pop();
    }
    tag
}
