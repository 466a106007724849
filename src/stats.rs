use serde::{Deserialize, Serialize};

use crate::time_series::Reading;

/// Number of trailing readings used for the rate estimate
pub const DEFAULT_RATE_WINDOW: usize = 10;

/// Running aggregates over every reading since the last reset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub initial_value: Option<f64>,
    pub current_value: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub sum: f64,
    pub count: usize,
    /// Trailing-window slope in value units per minute
    pub rate: f64,
}

impl Statistics {
    /// Fold one value into the aggregates. The first value after a reset also
    /// becomes the initial value, which is never touched again.
    pub fn record(&mut self, value: f64) {
        if self.initial_value.is_none() {
            self.initial_value = Some(value);
        }
        self.current_value = Some(value);
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        self.sum += value;
        self.count += 1;
    }

    pub fn change(&self) -> Option<f64> {
        match (self.initial_value, self.current_value) {
            (Some(initial), Some(current)) => Some(current - initial),
            _ => None,
        }
    }

    /// Percentage change against the initial value; undefined for a zero
    /// initial value.
    pub fn change_percent(&self) -> Option<f64> {
        match (self.change(), self.initial_value) {
            (Some(change), Some(initial)) if initial != 0.0 => Some(change / initial * 100.0),
            _ => None,
        }
    }

    pub fn mean(&self) -> Option<f64> {
        if self.count > 0 {
            Some(self.sum / self.count as f64)
        } else {
            None
        }
    }
}

/// Two-point slope over the last `window` readings, per minute.
///
/// Needs at least two readings in the window; a non-positive time span yields
/// 0 instead of dividing.
pub fn window_rate(readings: &[Reading], window: usize) -> f64 {
    let window = window.max(2);
    let start = readings.len().saturating_sub(window);
    let recent = &readings[start..];

    match (recent.first(), recent.last()) {
        (Some(first), Some(last)) if recent.len() >= 2 => {
            let dt = last.t - first.t;
            if dt > 0.0 {
                (last.value - first.value) / dt * 60.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}
