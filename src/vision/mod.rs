//! Detection engine
//!
//! Turns a captured frame into match counts:
//! - `preprocess`: gamma, noise-floor truncation, optional CLAHE
//! - `template`: per category / UI-scale template library loaded from disk
//! - `matcher`: masked correlation, distinct-detection counting, friendly-colour exclusion
//! - `resolver`: the `Detector` facade plus UI-scale and location recognition

pub mod color;
pub mod error;
pub mod matcher;
pub mod preprocess;
pub mod resolver;
pub mod template;


pub use color::{HsvBand, SafeColorFilter};
pub use error::{VisionError, VisionResult};
pub use matcher::{MatchResult, Matcher, NOISE_FLOOR, correlation_surface, is_hit};
pub use preprocess::{PreprocessConfig, Preprocessor};
pub use resolver::{Detector, LocationMatch, pick_scale};
pub use template::{Category, Template, TemplateLibrary};
