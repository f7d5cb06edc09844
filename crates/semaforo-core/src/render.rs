//! Render plans for annotated question text.
//!
//! A plan is a list of segments whose concatenated text is exactly the
//! source text. Allocated keywords wrap their first matching word in the
//! block; nothing else is touched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Range;

use crate::allocation::{allocate_question, compile_glossary, BlockId, KeywordAllocation};
use crate::matcher::tokenize;
use crate::{Keyword, Question};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Segment {
    Text {
        text: String,
    },
    Highlight {
        text: String,
        /// Lower-cased keyword title.
        keyword: String,
        description: String,
    },
}

impl Segment {
    pub fn text(&self) -> &str {
        match self {
            Segment::Text { text } | Segment::Highlight { text, .. } => text,
        }
    }

    pub fn is_highlight(&self) -> bool {
        matches!(self, Segment::Highlight { .. })
    }
}

struct Span<'k> {
    range: Range<usize>,
    key: String,
    keyword: &'k Keyword,
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

pub fn annotate_block(text: &str, allocated: &BTreeSet<String>, glossary: &[Keyword]) -> Vec<Segment> {
    let tokens = tokenize(text);
    let mut spans: Vec<Span<'_>> = Vec::new();

    for (pattern, keyword) in compile_glossary(glossary) {
        if !allocated.contains(pattern.key()) {
            continue;
        }
        // Two keywords can share a word; the second takes its next free occurrence.
        let free = pattern
            .find_all(&tokens)
            .into_iter()
            .find(|r| !spans.iter().any(|s| overlaps(&s.range, r)));
        if let Some(range) = free {
            spans.push(Span {
                range,
                key: pattern.key().to_string(),
                keyword,
            });
        }
    }
    spans.sort_by_key(|s| s.range.start);

    let mut segments = Vec::with_capacity(spans.len() * 2 + 1);
    let mut cursor = 0;
    for span in spans {
        if span.range.start > cursor {
            segments.push(Segment::Text {
                text: text[cursor..span.range.start].to_string(),
            });
        }
        segments.push(Segment::Highlight {
            text: text[span.range.clone()].to_string(),
            keyword: span.key,
            description: span.keyword.description.clone(),
        });
        cursor = span.range.end;
    }
    if cursor < text.len() {
        segments.push(Segment::Text {
            text: text[cursor..].to_string(),
        });
    }
    segments
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedOption {
    pub id: String,
    pub segments: Vec<Segment>,
}

/// A question ready for the rendering collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedQuestion {
    pub question_id: String,
    pub title: Vec<Segment>,
    pub options: Vec<AnnotatedOption>,
    pub allocation: KeywordAllocation,
}

pub fn annotate_with(question: &Question, allocation: KeywordAllocation) -> AnnotatedQuestion {
    let empty = BTreeSet::new();
    let allocated = |id: BlockId| allocation.keywords_for(id).unwrap_or(&empty);

    let title = annotate_block(&question.text, allocated(BlockId::Title), &question.keywords);
    let options = question
        .options
        .iter()
        .enumerate()
        .map(|(i, option)| AnnotatedOption {
            id: option.id.clone(),
            segments: annotate_block(&option.text, allocated(BlockId::Option(i)), &question.keywords),
        })
        .collect();

    AnnotatedQuestion {
        question_id: question.id.clone(),
        title,
        options,
        allocation,
    }
}

pub fn annotate_question(question: &Question) -> AnnotatedQuestion {
    annotate_with(question, allocate_question(question))
}
