pub mod bus;
pub mod serial;

pub use bus::BusUnwrapper;
pub use serial::SerialFramer;
