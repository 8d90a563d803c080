pub struct KinematicsHelper;

impl KinematicsHelper {
    /// Distance of a point from the sensor origin.
    pub fn range(x: f64, y: f64) -> f64 {
        x.hypot(y)
    }

    pub fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
        (a.0 - b.0).hypot(a.1 - b.1)
    }

    /// Finite difference of two speeds. Zero for a non-positive interval
    /// (duplicate or out-of-order timestamps).
    pub fn acceleration(previous_speed: f64, speed: f64, elapsed_secs: f64) -> f64 {
        if elapsed_secs <= 0.0 {
            return 0.0;
        }
        (speed - previous_speed) / elapsed_secs
    }

    /// Exponential blend of a fresh value into a running estimate.
    pub fn blend(alpha: f64, raw: f64, previous: f64) -> f64 {
        alpha * raw + (1.0 - alpha) * previous
    }
}
