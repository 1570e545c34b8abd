//! Engine-level limits.

/// Limits the engine enforces on behalf of the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Generations a player may have in flight at once.
    pub generation_limit_per_user: usize,
    /// Save slots a player may hold per story.
    pub max_save_slots_per_story: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            generation_limit_per_user: 1,
            max_save_slots_per_story: 3,
        }
    }
}
