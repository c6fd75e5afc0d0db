//! Nested mutation coordination.
//!
//! The first write of a request becomes the root and creates the shared
//! [`MutationState`]; every nested write reuses it. Only the root, once its
//! whole tree has succeeded, applies the remaining backlinks and then drains
//! the after-change stack. A failed root drains nothing.

use std::sync::Arc;

use tracing::debug;

use crate::engine::Engine;
use crate::error::EngineResult;
use crate::mutation_state::{FlushMode, MutationState};

#[derive(Debug)]
pub struct NestedMutationCoordinator {
    state: Arc<MutationState>,
    is_root: bool,
}

impl NestedMutationCoordinator {
    /// Join the caller's mutation, or start a new root when there is none.
    pub fn enter(state: Option<Arc<MutationState>>) -> Self {
        match state {
            Some(state) => Self {
                state,
                is_root: false,
            },
            None => Self {
                state: Arc::new(MutationState::new()),
                is_root: true,
            },
        }
    }

    pub fn state(&self) -> &Arc<MutationState> {
        &self.state
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// Complete this level of the mutation with `result`.
    pub async fn finish<T>(self, engine: &Engine, result: EngineResult<T>) -> EngineResult<T> {
        let value = result?;
        if self.is_root {
            self.state.flush_backlinks(engine, FlushMode::All).await?;
            let pending = self.state.pending_after_change().await;
            debug!(pending, "Draining after-change hooks");
            self.state.drain_after_change().await?;
        }
        Ok(value)
    }
}
