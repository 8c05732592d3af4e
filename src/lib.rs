pub mod capture;
pub mod sentry;
pub mod vision;

pub use sentry::{Config, SentryEngine, SentryEvent};
pub use vision::Detector;
