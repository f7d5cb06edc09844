//! Traffic-light risk classification.
//!
//! Both entry points fail toward the more attention-demanding level: an
//! unusable score is `Worst`, an unknown color is `Middle`.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Ordered from most to least severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub enum RiskLevel {
    Worst,
    Middle,
    Best,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 3] = [RiskLevel::Worst, RiskLevel::Middle, RiskLevel::Best];

    pub fn color(self) -> &'static str {
        match self {
            RiskLevel::Worst => "rojo",
            RiskLevel::Middle => "amarillo",
            RiskLevel::Best => "verde",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RiskLevel::Worst => "Alto",
            RiskLevel::Middle => "Moderado",
            RiskLevel::Best => "Bajo",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            RiskLevel::Worst => {
                "Tu situación requiere acción inmediata: revisa con tu asesor los puntos críticos."
            }
            RiskLevel::Middle => {
                "Hay aspectos de tu situación financiera que conviene mejorar en los próximos meses."
            }
            RiskLevel::Best => "Tu situación financiera es saludable; mantén tus buenos hábitos.",
        }
    }

    pub fn badge(self) -> RiskBadge {
        RiskBadge {
            level: self,
            color: self.color(),
            label: self.label(),
            description: self.description(),
        }
    }
}

/// Everything a dashboard widget needs to draw the traffic light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RiskBadge {
    pub level: RiskLevel,
    pub color: &'static str,
    pub label: &'static str,
    pub description: &'static str,
}

#[derive(Deserialize)]
struct RawThresholds {
    warn: f64,
    ok: f64,
}

/// Score cut-offs. Invariant: both finite and `warn <= ok`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawThresholds")]
pub struct Thresholds {
    warn: f64,
    ok: f64,
}

impl Thresholds {
    pub const DEFAULT_WARN: f64 = 60.0;
    pub const DEFAULT_OK: f64 = 80.0;

    pub fn new(warn: f64, ok: f64) -> Result<Self> {
        if !warn.is_finite() || !ok.is_finite() {
            return Err(CoreError::validation(format!(
                "thresholds must be finite numbers (warn={warn}, ok={ok})"
            )));
        }
        if warn > ok {
            return Err(CoreError::validation(format!(
                "warn threshold {warn} is above ok threshold {ok}"
            )));
        }
        Ok(Self { warn, ok })
    }

    pub fn warn(&self) -> f64 {
        self.warn
    }

    pub fn ok(&self) -> f64 {
        self.ok
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warn: Self::DEFAULT_WARN,
            ok: Self::DEFAULT_OK,
        }
    }
}

impl TryFrom<RawThresholds> for Thresholds {
    type Error = CoreError;

    fn try_from(raw: RawThresholds) -> Result<Self> {
        Thresholds::new(raw.warn, raw.ok)
    }
}

pub fn classify_score(score: Option<f64>, thresholds: &Thresholds) -> RiskLevel {
    match score {
        Some(s) if s.is_finite() => {
            if s < thresholds.warn {
                RiskLevel::Worst
            } else if s < thresholds.ok {
                RiskLevel::Middle
            } else {
                RiskLevel::Best
            }
        }
        _ => RiskLevel::Worst,
    }
}

pub fn classify_color_code(code: &str) -> RiskLevel {
    match code.trim().to_lowercase().as_str() {
        "rojo" | "red" => RiskLevel::Worst,
        "amarillo" | "yellow" => RiskLevel::Middle,
        "verde" | "green" => RiskLevel::Best,
        other => {
            tracing::debug!(code = other, "unrecognized color code, treating as middle");
            RiskLevel::Middle
        }
    }
}
