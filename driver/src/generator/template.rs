/// Straight-line walk through the sensor field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkTemplate {
    pub start_mm: (f64, f64),
    pub velocity_mm_s: (f64, f64),
    pub enter_ms: u64,
    pub exit_ms: u64,
}

impl WalkTemplate {
    pub fn is_visible(&self, t_ms: u64) -> bool {
        (self.enter_ms..self.exit_ms).contains(&t_ms)
    }

    pub fn position_at(&self, t_ms: u64) -> Option<(f64, f64)> {
        if !self.is_visible(t_ms) {
            return None;
        }
        let dt = (t_ms - self.enter_ms) as f64 / 1000.0;
        Some((
            self.start_mm.0 + self.velocity_mm_s.0 * dt,
            self.start_mm.1 + self.velocity_mm_s.1 * dt,
        ))
    }

    /// Radial speed as the sensor reports it: positive when receding.
    pub fn radial_speed_at(&self, t_ms: u64) -> Option<f64> {
        let (x, y) = self.position_at(t_ms)?;
        let range = x.hypot(y);
        if range == 0.0 {
            return Some(0.0);
        }
        Some((x * self.velocity_mm_s.0 + y * self.velocity_mm_s.1) / range)
    }
}
