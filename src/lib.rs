pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod store;

pub use config::EngineConfig;
pub use error::{EngineError, Result};

// Re-export the engine surface
pub use models::{ContextData, Interaction, Item, ModelInfo, Recommendation};
pub use services::{
    CollaborativeModel, ContentModel, ContextStrategy, RecommendationEngine, RuleTable,
};
pub use store::{CatalogStore, InteractionStore, MemoryStore};
