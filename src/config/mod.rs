pub mod settings;

pub use settings::{DistanceMetric, IndexBackend, Secrets, Settings};
