pub mod pipeline;
pub mod schedule;

pub use pipeline::{Harvest, PassStats};
pub use schedule::run_on_interval;
