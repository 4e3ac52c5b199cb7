//! Bounded numeric option values.
//!
//! One clamped value backs both the numeric text field and the range control of the
//! front-end, so neither view can push the other out of range.

use serde::{Deserialize, Serialize};

/// Inclusive range a numeric option is allowed to take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: u32,
    pub max: u32,
}

impl ValueRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Clamp a value into the range. A misconfigured range (min > max) collapses to `min`.
    pub fn clamp(&self, value: u32) -> u32 {
        value.max(self.min).min(self.max.max(self.min))
    }

    pub fn contains(&self, value: u32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// A numeric option that can never leave its range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawBounded")]
pub struct Bounded {
    value: u32,
    range: ValueRange,
}

// Wire form. Deserialized values go back through `Bounded::new`.
#[derive(Deserialize)]
struct RawBounded {
    value: u32,
    range: ValueRange,
}

impl From<RawBounded> for Bounded {
    fn from(raw: RawBounded) -> Self {
        Self::new(raw.value, raw.range)
    }
}

impl Bounded {
    pub fn new(value: u32, range: ValueRange) -> Self {
        Self {
            value: range.clamp(value),
            range,
        }
    }

    pub fn get(&self) -> u32 {
        self.value
    }

    pub fn range(&self) -> ValueRange {
        self.range
    }

    /// Set the value, clamping into range. Returns the stored value.
    pub fn set(&mut self, value: u32) -> u32 {
        self.value = self.range.clamp(value);
        self.value
    }

    /// Text view of the value
    pub fn text(&self) -> String {
        self.value.to_string()
    }

    /// Update from the text view.
    ///
    /// Unparsable text leaves the value untouched and returns `false`; out-of-range
    /// numbers (including negative ones) are clamped to the nearest bound.
    pub fn set_text(&mut self, text: &str) -> bool {
        match text.trim().parse::<i64>() {
            Ok(n) => {
                let n = n.clamp(0, u32::MAX as i64) as u32;
                self.set(n);
                true
            }
            Err(_) => false,
        }
    }

    /// Range-control view: 0.0 at `min`, 1.0 at `max`
    pub fn position(&self) -> f64 {
        let span = self.range.max.saturating_sub(self.range.min);
        if span == 0 {
            return 0.0;
        }
        (self.value.saturating_sub(self.range.min) as f64 / span as f64).min(1.0)
    }

    /// Update from the range-control view. Returns the stored value.
    pub fn set_position(&mut self, position: f64) -> u32 {
        let position = if position.is_nan() {
            0.0
        } else {
            position.clamp(0.0, 1.0)
        };
        let span = self.range.max.saturating_sub(self.range.min) as f64;
        let value = self.range.min as f64 + (span * position).round();
        self.set(value as u32)
    }
}
