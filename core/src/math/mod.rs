pub mod kinematics;
pub mod stats;

pub use kinematics::KinematicsHelper;
pub use stats::StatsHelper;
