//! Threshold alarm configuration and evaluation.
//!
//! The alarm watches the current value and fires once per run when it drops to
//! or below a threshold. The threshold is expressed in one of three ways:
//! an absolute value, a percentage of the initial value, or a fixed drop from
//! the initial value. A threshold that was never set (or failed to parse)
//! never fires.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::util::parse_decimal;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum AlarmMode {
    /// fire when the value falls to the threshold itself
    #[default]
    Absolute,
    /// fire when the value falls to a percentage of the initial value
    Percent,
    /// fire when the value has dropped by a fixed amount from the initial value
    Difference,
}

impl AlarmMode {
    pub fn next(self) -> Self {
        match self {
            AlarmMode::Absolute => AlarmMode::Percent,
            AlarmMode::Percent => AlarmMode::Difference,
            AlarmMode::Difference => AlarmMode::Absolute,
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            AlarmMode::Absolute => "Ω",
            AlarmMode::Percent => "%",
            AlarmMode::Difference => "Ω drop",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    pub enabled: bool,
    pub mode: AlarmMode,
    pub abs_threshold: Option<f64>,
    pub pct_threshold: Option<f64>,
    pub diff_threshold: Option<f64>,
}

impl AlarmConfig {
    pub fn threshold(&self, mode: AlarmMode) -> Option<f64> {
        match mode {
            AlarmMode::Absolute => self.abs_threshold,
            AlarmMode::Percent => self.pct_threshold,
            AlarmMode::Difference => self.diff_threshold,
        }
    }

    pub fn set_threshold(&mut self, mode: AlarmMode, value: Option<f64>) {
        let value = value.filter(|v| v.is_finite());
        match mode {
            AlarmMode::Absolute => self.abs_threshold = value,
            AlarmMode::Percent => self.pct_threshold = value,
            AlarmMode::Difference => self.diff_threshold = value,
        }
    }

    /// Store raw operator input; text that does not parse clears the threshold.
    pub fn set_threshold_text(&mut self, mode: AlarmMode, text: &str) {
        self.set_threshold(mode, parse_decimal(text));
    }

    /// The absolute value the current mode compares against, given the
    /// session's initial value.
    pub fn threshold_for(&self, initial: f64) -> Option<f64> {
        match self.mode {
            AlarmMode::Absolute => self.abs_threshold,
            AlarmMode::Percent => self.pct_threshold.map(|pct| initial * (pct / 100.0)),
            AlarmMode::Difference => self.diff_threshold.map(|diff| initial - diff),
        }
    }

    /// Whether `current` meets the configured condition. Ignores `enabled`;
    /// the latch and the enabled flag are the engine's business.
    pub fn is_triggered(&self, initial: f64, current: f64) -> bool {
        self.threshold_for(initial)
            .is_some_and(|threshold| current <= threshold)
    }

    pub fn describe(&self) -> String {
        let threshold = self
            .threshold(self.mode)
            .map_or_else(|| String::from("unset"), |t| format!("{t} {}", self.mode.unit()));
        format!(
            "alarm {} | {} | {}",
            if self.enabled { "ON" } else { "OFF" },
            self.mode,
            threshold
        )
    }
}
