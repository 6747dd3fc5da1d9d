//! Type definitions for the diabetes risk pipeline

pub mod prediction;
pub mod record;

pub use prediction::{DiabetesClass, Locale, Prediction};
pub use record::{FeatureRecord, FEATURE_COUNT, FEATURE_NAMES};
