//! Process request payloads.

use serde_json::{json, Map, Value};

use crate::config::PayloadMode;
use crate::core::Stage;
use crate::store::ResultStore;

/// Builds the process payload for `stage`.
///
/// Under [`PayloadMode::WithUpstream`] the payload carries the formatted
/// results of the stage's completed upstream stages, keyed by wire name.
pub(crate) fn build_payload(mode: PayloadMode, stage: Stage, store: &ResultStore) -> Value {
    match mode {
        PayloadMode::ContextOnly => json!({}),
        PayloadMode::WithUpstream => {
            let upstream: Map<String, Value> = stage
                .upstream()
                .iter()
                .filter_map(|s| {
                    let result = store.get(*s)?;
                    let formatted = serde_json::to_value(&result.formatted).ok()?;
                    Some((s.as_str().to_string(), formatted))
                })
                .collect();
            json!({ "upstream": upstream })
        }
    }
}

/// Returns true if `next` may be dispatched before `pending` is recorded.
pub(crate) fn can_overlap(overlap: bool, mode: PayloadMode, pending: Stage, next: Stage) -> bool {
    overlap && (mode == PayloadMode::ContextOnly || !next.depends_on(pending))
}
