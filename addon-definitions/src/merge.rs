//! Deep-merge of user argument maps (spec.md §4.8 step 5, §8 "For all arg
//! maps A, A' such that A' ⊇ A on leaf paths, mergeArgs(A, A') == A' on
//! those paths and equals A elsewhere").

use serde_json::Value;

/// Merge `overlay` over `base`: nested objects merge key-by-key
/// recursively, scalars and arrays in `overlay` overwrite/replace the
/// corresponding value in `base` outright.
pub fn merge_args(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut out = base_map.clone();
            for (k, v) in overlay_map {
                let merged = match out.get(k) {
                    Some(existing) => merge_args(existing, v),
                    None => v.clone(),
                };
                out.insert(k.clone(), merged);
            }
            Value::Object(out)
        }
        // lists replace wholesale, scalars overwrite -- overlay always wins
        // once either side isn't an object.
        (_, overlay) => overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_maps_merge_scalars_overwrite_lists_replace() {
        let base = json!({"a": 1, "b": {"x": 1, "y": 2}, "c": [1, 2]});
        let overlay = json!({"b": {"y": 20, "z": 3}, "c": [9], "d": true});
        let merged = merge_args(&base, &overlay);
        assert_eq!(
            merged,
            json!({"a": 1, "b": {"x": 1, "y": 20, "z": 3}, "c": [9], "d": true})
        );
    }

    #[test]
    fn empty_overlay_preserves_base() {
        let base = json!({"a": 1});
        let merged = merge_args(&base, &json!({}));
        assert_eq!(merged, base);
    }
}
