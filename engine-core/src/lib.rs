pub mod error;
pub mod markets;
pub mod math;
pub mod metrics;
pub mod model;
pub mod open_orders;
pub mod pairs;
pub mod ports;
pub mod store;

pub use error::*;
pub use markets::*;
pub use math::*;
pub use metrics::*;
pub use model::*;
pub use open_orders::*;
pub use pairs::*;
pub use ports::*;
pub use store::*;
