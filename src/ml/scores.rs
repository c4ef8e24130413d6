//! Deterministic scores derived from raw event attributes

/// Composite risk on a 0-100 scale.
///
/// `mag*8 + (10 - min(depth/100, 10))*4 + mmi*4 + sig/200`, clamped.
/// Shallower events score higher.
pub fn risk_score(magnitude: f64, depth: f64, mmi: f64, sig: f64) -> f64 {
    let depth_factor = 10.0 - (depth / 100.0).min(10.0);
    let raw = magnitude * 8.0 + depth_factor * 4.0 + mmi * 4.0 + sig / 200.0;
    raw.clamp(0.0, 100.0)
}

/// Aftershock likelihood as a percentage (0-100).
///
/// `(mag/9)*0.6 + (1 - min(depth/300, 1))*0.4`, clamped to [0, 1] and scaled.
pub fn aftershock_probability(magnitude: f64, depth: f64) -> f64 {
    let depth_factor = 1.0 - (depth / 300.0).min(1.0);
    let probability = (magnitude / 9.0) * 0.6 + depth_factor * 0.4;
    probability.clamp(0.0, 1.0) * 100.0
}

/// Round to one decimal place, halves away from zero
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
