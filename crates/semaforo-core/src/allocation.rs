//! Keyword allocation: which block of a question highlights which keyword.
//!
//! Greedy and first-block-wins. Blocks are visited in display order (title,
//! then options) and a keyword is claimed by the first block it matches, so
//! every keyword is highlighted at most once per question instance.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::matcher::{tokenize, KeywordPattern};
use crate::{Keyword, Question};

/// Identity of a text block within one question.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(tag = "role", content = "index", rename_all = "camelCase")]
pub enum BlockId {
    Title,
    /// Position of the option in display order.
    Option(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextBlock<'a> {
    pub id: BlockId,
    pub text: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockAllocation {
    pub block: BlockId,
    /// Lower-cased keyword titles this block may highlight.
    pub keywords: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordAllocation {
    pub blocks: Vec<BlockAllocation>,
}

impl KeywordAllocation {
    pub fn keywords_for(&self, block: BlockId) -> Option<&BTreeSet<String>> {
        self.blocks
            .iter()
            .find(|b| b.block == block)
            .map(|b| &b.keywords)
    }

    /// The block a keyword was allocated to, if any.
    pub fn block_of(&self, keyword: &str) -> Option<BlockId> {
        let key = keyword.trim().to_lowercase();
        self.blocks
            .iter()
            .find(|b| b.keywords.contains(&key))
            .map(|b| b.block)
    }

    pub fn allocated_count(&self) -> usize {
        self.blocks.iter().map(|b| b.keywords.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.allocated_count() == 0
    }
}

/// Compile a glossary into patterns, dropping blank titles and
/// case-insensitive duplicates (the first entry wins).
pub fn compile_glossary(keywords: &[Keyword]) -> Vec<(KeywordPattern, &Keyword)> {
    let mut seen = HashSet::new();
    let mut patterns = Vec::with_capacity(keywords.len());
    for keyword in keywords {
        let Some(pattern) = KeywordPattern::new(&keyword.title) else {
            tracing::debug!(title = %keyword.title, "skipping keyword that can never match");
            continue;
        };
        if seen.insert(pattern.key().to_string()) {
            patterns.push((pattern, keyword));
        }
    }
    patterns
}

pub fn allocate(blocks: &[TextBlock<'_>], keywords: &[Keyword]) -> KeywordAllocation {
    let patterns = compile_glossary(keywords);
    let mut used: HashSet<&str> = HashSet::new();

    let blocks = blocks
        .iter()
        .map(|block| {
            let tokens = tokenize(block.text);
            let mut claimed = BTreeSet::new();
            for (pattern, _) in &patterns {
                if used.contains(pattern.key()) {
                    continue;
                }
                if pattern.find_in(&tokens).is_some() {
                    used.insert(pattern.key());
                    claimed.insert(pattern.key().to_string());
                }
            }
            BlockAllocation {
                block: block.id,
                keywords: claimed,
            }
        })
        .collect();

    KeywordAllocation { blocks }
}

pub fn allocate_question(question: &Question) -> KeywordAllocation {
    allocate(&question.blocks(), &question.keywords)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChoiceOption, QuestionKind};
    use pretty_assertions::assert_eq;

    fn kw(title: &str) -> Keyword {
        Keyword {
            title: title.to_string(),
            description: format!("Qué es {title}"),
        }
    }

    fn question(title: &str, options: &[&str], keywords: &[&str]) -> Question {
        Question {
            id: "q".to_string(),
            text: title.to_string(),
            kind: QuestionKind::Multiple,
            options: options
                .iter()
                .enumerate()
                .map(|(i, t)| ChoiceOption {
                    id: format!("o{i}"),
                    text: t.to_string(),
                })
                .collect(),
            keywords: keywords.iter().map(|k| kw(k)).collect(),
        }
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn title_beats_options() {
        let q = question(
            "¿Qué haces con tu ahorro mensual?",
            &["Invierto el ahorro", "Lo gasto"],
            &["ahorro"],
        );
        let alloc = allocate_question(&q);
        assert_eq!(alloc.keywords_for(BlockId::Title), Some(&set(&["ahorro"])));
        assert_eq!(alloc.keywords_for(BlockId::Option(0)), Some(&set(&[])));
        assert_eq!(alloc.block_of("Ahorro"), Some(BlockId::Title));
    }

    #[test]
    fn earlier_options_beat_later_ones() {
        let q = question(
            "¿Dónde inviertes?",
            &["Fondos indexados", "Acciones", "Fondos de pensiones"],
            &["fondos", "acciones"],
        );
        let alloc = allocate_question(&q);
        assert_eq!(alloc.block_of("fondos"), Some(BlockId::Option(0)));
        assert_eq!(alloc.block_of("acciones"), Some(BlockId::Option(1)));
        assert_eq!(alloc.keywords_for(BlockId::Option(2)), Some(&set(&[])));
    }

    #[test]
    fn every_keyword_lands_in_at_most_one_block() {
        let q = question(
            "Deuda, crédito y liquidez: ¿cómo manejas tu deuda?",
            &[
                "Pago la deuda a tiempo",
                "Uso el crédito al máximo",
                "Mantengo liquidez",
                "Deuda y crédito",
            ],
            &["deuda", "crédito", "liquidez", "hipoteca", "DEUDA"],
        );
        let alloc = allocate_question(&q);
        for key in ["deuda", "crédito", "liquidez", "hipoteca"] {
            let holders = alloc
                .blocks
                .iter()
                .filter(|b| b.keywords.contains(key))
                .count();
            assert!(holders <= 1, "{key} allocated {holders} times");
        }
        assert_eq!(alloc.block_of("hipoteca"), None);
        assert_eq!(alloc.allocated_count(), 3);
    }

    #[test]
    fn allocation_is_idempotent() {
        let q = question(
            "Inflación y tasas de interés",
            &["Sube la inflación", "Bajan las tasas"],
            &["inflación", "tasa de interés", "tasas"],
        );
        assert_eq!(allocate_question(&q), allocate_question(&q));
    }

    #[test]
    fn blank_titles_are_ignored() {
        let q = question("Ahorro", &[], &["", "  ", "ahorro"]);
        let alloc = allocate_question(&q);
        assert_eq!(alloc.keywords_for(BlockId::Title), Some(&set(&["ahorro"])));
    }

    #[test]
    fn no_blocks_yield_empty_allocation() {
        let alloc = allocate(&[], &[kw("ahorro")]);
        assert!(alloc.is_empty());
        assert!(alloc.blocks.is_empty());
    }

    #[test]
    fn block_id_wire_format() {
        assert_eq!(
            serde_json::to_value(BlockId::Option(2)).unwrap(),
            serde_json::json!({"role": "option", "index": 2})
        );
        assert_eq!(
            serde_json::to_value(BlockId::Title).unwrap(),
            serde_json::json!({"role": "title"})
        );
    }
}
