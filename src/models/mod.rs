//! Model artifacts and inference components

pub mod classifier;
pub mod inference;
pub mod loader;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod scaler;

pub use classifier::{Classifier, LogisticModel};
pub use inference::{BatchPolicy, InferenceEngine, ScoredRow, ScoredTable};
pub use loader::{ArtifactLoader, Artifacts};
pub use scaler::{Scaler, StandardScaler};
