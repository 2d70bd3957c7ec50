//! Context patch application.
//!
//! Merging is **shallow**: each top-level key in the patch replaces the same
//! key in the context. A nested object in the patch replaces the nested
//! object in the context wholesale; its fields are not merged one by one.

use serde_json::Value;

use nodes::Patch;

/// Apply `patch` to `ctx` in place.
///
/// A context that is not a JSON object is replaced by an object holding
/// the patch's keys.
pub fn apply_patch(ctx: &mut Value, patch: Patch) {
    match ctx {
        Value::Object(map) => map.extend(patch),
        other => *other = Value::Object(patch),
    }
}
