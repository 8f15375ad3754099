//! Layering of pool documents over the default scope.
//!
//! A pool document only carries the fields it overrides. Merging walks the
//! overlay into the base: objects merge key by key, `null` never overrides,
//! and arrays are either replaced or extended depending on the policy.

use serde_json::Value;

/// How overlay documents combine with the base document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergePolicy {
    /// Append overlay array elements to the base array instead of replacing it.
    /// Elements already present in the base are not duplicated.
    pub slice_add: bool,
}

impl MergePolicy {
    /// Arrays in the overlay replace arrays in the base.
    pub const fn replace() -> Self {
        Self { slice_add: false }
    }

    /// Arrays in the overlay extend arrays in the base.
    pub const fn slice_add() -> Self {
        Self { slice_add: true }
    }
}

/// Merge `overlay` into `base` in place.
pub fn merge_into(base: &mut Value, overlay: Value, policy: MergePolicy) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_into(existing, value, policy),
                    None if value.is_null() => {}
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(base_items), Value::Array(overlay_items)) if policy.slice_add => {
            for item in overlay_items {
                if !base_items.contains(&item) {
                    base_items.push(item);
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Return `base` with `overlay` merged on top, leaving both inputs untouched.
pub fn merged(base: &Value, overlay: &Value, policy: MergePolicy) -> Value {
    let mut out = base.clone();
    merge_into(&mut out, overlay.clone(), policy);
    out
}
