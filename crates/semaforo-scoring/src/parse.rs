use serde::Deserialize;

use semaforo_core::matcher::{normalize, tokenize};
use semaforo_core::risk::RiskLevel;
use semaforo_core::{ScoringError, ScoringResult};

#[derive(Deserialize)]
struct RawScoring {
    #[serde(default, alias = "summaryText", alias = "summary_text")]
    summary: Option<String>,
    #[serde(default, alias = "colorCode", alias = "color_code")]
    color: Option<String>,
}

const COLOR_WORDS: [(&str, RiskLevel); 6] = [
    ("rojo", RiskLevel::Worst),
    ("red", RiskLevel::Worst),
    ("amarillo", RiskLevel::Middle),
    ("yellow", RiskLevel::Middle),
    ("verde", RiskLevel::Best),
    ("green", RiskLevel::Best),
];

/// Turn raw scorer output into a [`ScoringResult`].
///
/// A JSON object anywhere in the text is authoritative: without a color
/// code its summary is kept and the color is left empty, which classifies
/// as the middle level. Output with no readable object is scanned for
/// color words, and prose alone is never enough for "verde".
pub fn parse_scoring_output(raw: &str) -> Result<ScoringResult, ScoringError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ScoringError::EmptyResponse);
    }

    if let Some(json_str) = extract_json_object(trimmed) {
        match serde_json::from_str::<RawScoring>(json_str) {
            Ok(parsed) => {
                let color = parsed.color.unwrap_or_default().trim().to_string();
                if color.is_empty() {
                    tracing::warn!("scoring object has no color code");
                }
                return Ok(ScoringResult {
                    summary_text: parsed.summary.unwrap_or_default().trim().to_string(),
                    color_code: color,
                });
            }
            Err(e) => tracing::debug!(error = %e, "scoring object is not valid JSON, scanning text"),
        }
    }

    match scan_color(trimmed) {
        Some(color) => Ok(ScoringResult {
            summary_text: trimmed.to_string(),
            color_code: color.to_string(),
        }),
        None => Err(ScoringError::Parse(format!(
            "no color code in response: {}",
            preview(trimmed)
        ))),
    }
}

/// Extract the JSON object substring from raw output.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&raw[start..=end])
}

/// Most severe color named in free text, capped at "amarillo".
fn scan_color(text: &str) -> Option<&'static str> {
    let worst = tokenize(text)
        .iter()
        .filter(|t| t.is_word())
        .filter_map(|t| {
            let word = normalize(t.text);
            COLOR_WORDS
                .iter()
                .find(|(w, _)| *w == word)
                .map(|(_, level)| *level)
        })
        .min()?;
    Some(worst.min(RiskLevel::Middle).color())
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(80).collect();
    if out.len() < text.len() {
        out.push('…');
    }
    out
}
