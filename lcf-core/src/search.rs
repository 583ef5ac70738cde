//! Search/filter overlay
//!
//! Builds a filtered, highlighted view over the accumulated comments without
//! touching them. Matching folds case and Vietnamese diacritics; highlighting
//! marks the verbatim (case-insensitive) occurrence so the original text is
//! never rewritten.

use lcf_common::events::{DisplayComment, FilteredComment, TextSegment};
use regex::{Regex, RegexBuilder};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Lowercase and strip diacritics (`Đ`/`đ` map to `d`)
pub fn fold_for_search(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c {
            'đ' | 'Đ' => 'd',
            other => other,
        })
        .flat_map(char::to_lowercase)
        .collect()
}

/// A compiled search term
#[derive(Debug, Clone)]
pub struct SearchQuery {
    raw: String,
    folded: String,
    highlighter: Option<Regex>,
}

impl SearchQuery {
    /// `None` for a blank term
    pub fn new(term: &str) -> Option<Self> {
        let raw = term.trim();
        if raw.is_empty() {
            return None;
        }

        let highlighter = RegexBuilder::new(&regex::escape(raw))
            .case_insensitive(true)
            .build()
            .ok();

        Some(Self {
            raw: raw.to_string(),
            folded: fold_for_search(raw),
            highlighter,
        })
    }

    pub fn term(&self) -> &str {
        &self.raw
    }

    fn contains(&self, haystack: &str) -> bool {
        fold_for_search(haystack).contains(&self.folded)
    }

    /// OR across author name, message and, when an order is linked, its
    /// phone, address, partner name and session ordinal
    pub fn matches(&self, item: &DisplayComment) -> bool {
        if self.contains(&item.comment.author_name) || self.contains(&item.comment.text) {
            return true;
        }

        let Some(order) = &item.order else {
            return false;
        };

        let enrichment_fields = [
            order.telephone.as_deref(),
            order.address.as_deref(),
            order.partner_name.as_deref(),
        ];
        if enrichment_fields
            .into_iter()
            .flatten()
            .any(|field| self.contains(field))
        {
            return true;
        }

        order
            .session_index
            .map(|idx| idx.to_string().contains(&self.folded))
            .unwrap_or(false)
    }

    /// Split `text` into plain and highlighted segments
    pub fn highlight(&self, text: &str) -> Vec<TextSegment> {
        let Some(highlighter) = &self.highlighter else {
            return vec![TextSegment::plain(text)];
        };

        let mut segments = Vec::new();
        let mut cursor = 0;
        for found in highlighter.find_iter(text) {
            if found.start() > cursor {
                segments.push(TextSegment::plain(&text[cursor..found.start()]));
            }
            segments.push(TextSegment::highlighted(found.as_str()));
            cursor = found.end();
        }
        if cursor < text.len() || segments.is_empty() {
            segments.push(TextSegment::plain(&text[cursor..]));
        }
        segments
    }

    /// Filter `items`, keeping their order
    pub fn apply(&self, items: &[DisplayComment]) -> Vec<FilteredComment> {
        items
            .iter()
            .filter(|item| self.matches(item))
            .map(|item| FilteredComment {
                name_segments: self.highlight(&item.comment.author_name),
                text_segments: self.highlight(&item.comment.text),
                display: item.clone(),
            })
            .collect()
    }
}
