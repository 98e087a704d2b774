//! Small numeric helpers shared by the weather engine, the uniform builder and
//! the procedural texture generators.

/// Linear interpolation between `start` and `end`.
pub fn lerp(start: f32, end: f32, t: f32) -> f32 {
    start + (end - start) * t
}

/// Hermite smoothstep on an already-normalised `t` (same curve as the shader's `ease`).
pub fn ease(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

/// `ease` applied after clamping into [0, 1].
pub fn ease_clamped(t: f32) -> f32 {
    ease(t.clamp(0.0, 1.0))
}

/// Inverse lerp, clamped. An empty span counts as complete.
pub fn progress(value: f64, span: f64) -> f64 {
    if span <= 0.0 {
        return 1.0;
    }
    (value / span).clamp(0.0, 1.0)
}
