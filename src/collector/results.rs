//! Path-addressed accumulation of collected data.
//!
//! Every task contributes one value at a short path like
//! `["rds", "Instances", "DBInstances"]`. The registry guarantees no two
//! tasks declare the same full path, so insertion only has to create the
//! intermediate objects; sibling paths sharing a prefix (both WAF v2 tasks
//! live under `wafv2`) land in the same subtree.

use serde_json::map::Entry;
use serde_json::{Map, Value};
use tracing::warn;

/// A task's declared location in the region document.
pub type TaskPath = &'static [&'static str];

/// Inserts `value` at `path`, creating intermediate objects as needed.
pub fn insert_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        warn!("dropping result with empty path");
        return;
    };
    let mut node = root;
    for segment in parents {
        let entry = node
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            // Registry bug: a leaf and a subtree claimed the same segment.
            warn!(segment, "replacing non-object result segment");
            *entry = Value::Object(Map::new());
        }
        let Value::Object(map) = entry else {
            unreachable!()
        };
        node = map;
    }
    node.insert(last.to_string(), value);
}

/// Deep-merges `from` into `into`. Object values merge recursively; anything
/// else from the right-hand map wins. Used to fold phase 2's results into
/// phase 1's and the final document into the caller's region data.
pub fn merge(into: &mut Map<String, Value>, from: Map<String, Value>) {
    for (key, value) in from {
        match into.entry(key) {
            Entry::Occupied(mut occupied) => match (occupied.get_mut(), value) {
                (Value::Object(dst), Value::Object(src)) => merge(dst, src),
                (slot, value) => *slot = value,
            },
            Entry::Vacant(vacant) => {
                vacant.insert(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn sibling_paths_share_a_subtree() {
        let mut root = Map::new();
        insert_path(&mut root, &["wafv2", "WebACLs"], json!([{"Name": "acl"}]));
        insert_path(&mut root, &["wafv2", "IPSets"], json!([]));
        insert_path(&mut root, &["rds", "Instances", "DBInstances"], json!([]));

        assert_eq!(
            Value::Object(root),
            json!({
                "wafv2": {"WebACLs": [{"Name": "acl"}], "IPSets": []},
                "rds": {"Instances": {"DBInstances": []}},
            })
        );
    }

    #[test]
    fn single_segment_path_is_a_top_level_key() {
        let mut root = Map::new();
        insert_path(&mut root, &["ecs"], json!([{"clusterName": "main"}]));
        assert_eq!(root["ecs"], json!([{"clusterName": "main"}]));
    }

    #[test]
    fn merge_unions_nested_maps() {
        let mut phase1 = as_map(json!({
            "ecs": [],
            "rds": {"Instances": {"DBInstances": []}},
        }));
        let phase2 = as_map(json!({
            "ecr": [{"repositoryName": "app"}],
            "rds": {"DBClusters": []},
        }));

        merge(&mut phase1, phase2);

        assert_eq!(
            Value::Object(phase1),
            json!({
                "ecs": [],
                "ecr": [{"repositoryName": "app"}],
                "rds": {"Instances": {"DBInstances": []}, "DBClusters": []},
            })
        );
    }
}
