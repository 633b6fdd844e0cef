pub mod logging;
pub mod math;

pub use math::{RegionHandle, parse_sl_vector, truncated_distance};
