//! Partial merge of entity representations
//!
//! Entities are merged at the JSON level: keys present in the update replace
//! the stored value, an explicit `null` clears it, absent keys are untouched.

use relay_core::{EntityError, EntityKind};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Merge the top-level keys of `patch` into `target`
///
/// A non-object on either side replaces `target` outright.
pub fn merge_json(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(base), Value::Object(update)) => {
            for (key, value) in update {
                if value.is_null() {
                    base.remove(key);
                } else {
                    base.insert(key.clone(), value.clone());
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

/// Produce the merged form of `existing` without modifying it
pub(crate) fn merge_entity<T>(existing: &T, patch: &Value, kind: EntityKind) -> Result<T, EntityError>
where
    T: Serialize + DeserializeOwned,
{
    let mut base =
        serde_json::to_value(existing).map_err(|source| EntityError::Encode { kind, source })?;
    merge_json(&mut base, patch);
    serde_json::from_value(base).map_err(|source| EntityError::Decode { kind, source })
}
