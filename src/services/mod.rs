pub mod collaborative;
pub mod content;
pub mod context;
pub mod engine;
pub mod persistence;

pub use collaborative::CollaborativeModel;
pub use content::ContentModel;
pub use context::{ContextStrategy, RuleTable};
pub use engine::RecommendationEngine;
