pub mod alert_level;
pub mod observation;

pub use alert_level::*;
pub use observation::*;
