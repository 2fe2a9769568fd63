//! Business logic services.
//!
//! Services orchestrate the item store, the journal and the remote clients
//! for one agent and provide the high-level operations behind the facade.

mod checkpoint;
mod maintenance;
pub mod path_manager;
mod recall;

pub use checkpoint::{CheckpointOutcome, CheckpointService, KNOWN_ITEMS_CONTEXT};
pub use maintenance::{
    Candidates, DEFAULT_STALE_DAYS, MAX_SCANNED_ITEMS, MIN_STALE_DAYS, MaintenanceService,
    VERIFICATION_AGE_DAYS, VERIFICATION_CONFIDENCE, dedup_key, find_candidates,
};
pub use path_manager::{AgentPaths, validate_agent_id};
pub use recall::RecallService;

use crate::cancel::CancelToken;
use crate::embedding::{Embedder, item_text};
use crate::models::MemoryItem;
use crate::storage::ItemStore;

/// Computes and stores the embedding for an active item, best effort.
///
/// Returns true if a vector was stored. Failures are logged, never raised.
pub fn sync_embedding(
    store: &ItemStore,
    embedder: &dyn Embedder,
    item: &MemoryItem,
    cancel: &CancelToken,
) -> bool {
    if !item.is_active() {
        return false;
    }
    let stored = embedder
        .embed(&item_text(item), cancel)
        .and_then(|vector| store.upsert_embedding(&item.id, embedder.model_id(), &vector, cancel));
    match stored {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(memory.id = %item.id, error = %e, "Embedding sync failed");
            false
        },
    }
}
