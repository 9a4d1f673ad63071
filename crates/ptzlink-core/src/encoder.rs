// ── Gesture → speed encoding ──
//
// Pure mapping from joystick gestures and zoom levels to bounded device
// speeds. No I/O, no clocks.

use serde::Serialize;

use crate::config::EncoderConfig;

/// Raw joystick sample: displacement in [-1, 1] per axis and a magnitude
/// in [0, 1]. Out-of-range or NaN components are clamped (NaN reads as 0).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GestureInput {
    pub x: f64,
    pub y: f64,
    pub magnitude: f64,
}

impl GestureInput {
    pub fn new(x: f64, y: f64, magnitude: f64) -> Self {
        Self { x, y, magnitude }
    }

    /// The "gesture released" sample.
    pub const RELEASED: Self = Self {
        x: 0.0,
        y: 0.0,
        magnitude: 0.0,
    };
}

/// Normalized pan/tilt/zoom speeds ready for a `move` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MotionIntent {
    pub pan: f64,
    pub tilt: f64,
    pub zoom: f64,
}

/// Maps gestures to [`MotionIntent`]s using fixed [`EncoderConfig`] constants.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandEncoder {
    config: EncoderConfig,
}

impl CommandEncoder {
    /// Non-finite constants fall back to their defaults, a negative
    /// `half_range` is taken by magnitude and reversed zoom bounds are
    /// swapped, so every clamp range is well formed.
    pub fn new(config: EncoderConfig) -> Self {
        Self {
            config: normalized(config),
        }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// The "no motion" intent.
    pub fn neutral(&self) -> MotionIntent {
        MotionIntent {
            pan: self.config.neutral,
            tilt: self.config.neutral,
            zoom: self.zoom_neutral(),
        }
    }

    pub fn is_neutral(&self, intent: &MotionIntent) -> bool {
        *intent == self.neutral()
    }

    /// `pan = neutral + x·m·gain`, `tilt = neutral − y·m·gain`, rounded to
    /// two places then clamped to `neutral ± half_range`.
    ///
    /// A zero magnitude yields [`neutral`](Self::neutral) exactly.
    pub fn encode_gesture(&self, input: GestureInput) -> MotionIntent {
        let x = sanitize(input.x, -1.0, 1.0);
        let y = sanitize(input.y, -1.0, 1.0);
        let magnitude = sanitize(input.magnitude, 0.0, 1.0);

        if magnitude <= 0.0 || x.hypot(y) <= 0.0 {
            return self.neutral();
        }

        let EncoderConfig {
            gain,
            neutral,
            half_range,
            ..
        } = self.config;
        let (lo, hi) = (neutral - half_range, neutral + half_range);

        MotionIntent {
            pan: round2(neutral + x * magnitude * gain).clamp(lo, hi),
            tilt: round2(neutral - y * magnitude * gain).clamp(lo, hi),
            zoom: self.zoom_neutral(),
        }
    }

    /// Linear rescale of a zoom level in [0, 100] into `[zoom_min, zoom_max]`.
    pub fn zoom_speed(&self, level: f64) -> f64 {
        let EncoderConfig {
            zoom_min, zoom_max, ..
        } = self.config;
        let level = sanitize(level, 0.0, 100.0);
        round2(zoom_min + (level / 100.0) * (zoom_max - zoom_min)).clamp(zoom_min, zoom_max)
    }

    fn zoom_neutral(&self) -> f64 {
        round2((self.config.zoom_min + self.config.zoom_max) / 2.0)
    }
}

fn normalized(config: EncoderConfig) -> EncoderConfig {
    let defaults = EncoderConfig::default();
    let finite_or = |value: f64, fallback: f64| if value.is_finite() { value } else { fallback };

    let (mut zoom_min, mut zoom_max) = (
        finite_or(config.zoom_min, defaults.zoom_min),
        finite_or(config.zoom_max, defaults.zoom_max),
    );
    if zoom_min > zoom_max {
        std::mem::swap(&mut zoom_min, &mut zoom_max);
    }

    EncoderConfig {
        gain: finite_or(config.gain, defaults.gain),
        neutral: finite_or(config.neutral, defaults.neutral),
        half_range: finite_or(config.half_range, defaults.half_range).abs(),
        zoom_min,
        zoom_max,
    }
}

fn sanitize(value: f64, lo: f64, hi: f64) -> f64 {
    let value = if value.is_nan() { 0.0 } else { value };
    value.clamp(lo, hi)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
