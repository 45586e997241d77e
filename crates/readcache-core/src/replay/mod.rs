//! Trust replay over the active branch

mod engine;
mod knowledge;

pub use engine::{
    base_candidate, replay_boundary, replay_branch, BoundaryKey, ReplayedKnowledge,
};
pub use knowledge::{KnowledgeMap, ScopeTrust};
