//! Value-over-lifetime interpolation

/// Linear interpolation between two floats
pub fn lerp_f32(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Fraction of a life span elapsed, clamped to [0, 1]
pub fn life_progress(age: f64, life_span: f64) -> f32 {
    if life_span <= 0.0 || !life_span.is_finite() {
        return 0.0;
    }
    (age / life_span).clamp(0.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lerp_f32_endpoints() {
        assert!((lerp_f32(0.0, 10.0, 0.0) - 0.0).abs() < 1e-6);
        assert!((lerp_f32(0.0, 10.0, 1.0) - 10.0).abs() < 1e-6);
        assert!((lerp_f32(4.0, 8.0, 0.5) - 6.0).abs() < 1e-6);
    }

    #[test]
    fn progress_clamps() {
        assert_eq!(life_progress(-1.0, 2.0), 0.0);
        assert_eq!(life_progress(1.0, 2.0), 0.5);
        assert_eq!(life_progress(5.0, 2.0), 1.0);
        assert_eq!(life_progress(5.0, f64::INFINITY), 0.0);
    }
}
