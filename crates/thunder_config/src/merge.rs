//! Deep merge of configuration layers.

use serde_yaml::{Mapping, Value};

/// Merge `overlay` into `base`.
///
/// Maps merge key by key, recursively. Everything else, lists included, is
/// replaced outright by the overlay.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => merge_mappings(base, overlay),
        (base, overlay) => *base = overlay,
    }
}

pub fn merge_mappings(base: &mut Mapping, overlay: Mapping) {
    for (key, value) in overlay {
        match base.get_mut(&key) {
            Some(existing) => deep_merge(existing, value),
            None => {
                base.insert(key, value);
            }
        }
    }
}

/// Merge layers ordered farthest first; later layers win.
pub fn merge_layers(layers: impl IntoIterator<Item = Mapping>) -> Mapping {
    let mut merged = Mapping::new();
    for layer in layers {
        merge_mappings(&mut merged, layer);
    }
    merged
}
