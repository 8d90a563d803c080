pub struct StatsHelper;

impl StatsHelper {
    pub fn rms(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = samples.iter().map(|&v| v * v).sum();
        (sum_sq / samples.len() as f64).sqrt()
    }

    pub fn max_abs(samples: &[f64]) -> f64 {
        samples.iter().fold(0.0, |acc, &v| acc.max(v.abs()))
    }
}
