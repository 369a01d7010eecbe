pub mod config;
pub mod error;
pub mod normalize;
pub mod period;
pub mod types;

pub use config::{load_config, Config, FileConfig};
pub use error::KillboardError;
pub use normalize::Normalizer;
pub use period::{Anchor, Classifier, Period, Window};
pub use types::*;
