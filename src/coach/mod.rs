pub mod analysis;
pub mod llm;
pub mod rules;

pub use analysis::{Analysis, AnalysisGenerator};
pub use llm::StreamEvent;
