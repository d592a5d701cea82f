pub mod calibration;
pub mod forecast;
pub mod types;
pub mod usage;

pub use calibration::*;
pub use forecast::*;
pub use types::*;
pub use usage::*;
