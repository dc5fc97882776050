//! Inventory loading.
//!
//! Preferred path: shell out to `ansible-inventory --list` and build the tree
//! from its JSON graph, so plugins, host patterns and group_vars all resolve
//! exactly as ansible itself sees them. When that binary is unavailable or
//! fails, fall back to a tolerant merge of the YAML inventory files on disk.
//! The fallback never rejects an odd file; it takes what it understands and
//! skips the rest, because a half-browsable tree beats an error screen.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use serde_json::Value as JsonValue;
use serde_yaml::Value as YamlValue;
use walkdir::WalkDir;

use crate::tree::NodeSpec;

/// Loads the inventory under `root` into a nested tree description.
pub fn load_tree(root: &Path) -> Result<NodeSpec> {
    match ansible_inventory_list(root) {
        Ok(listing) => Ok(tree_from_ansible_list(&listing)),
        Err(_) => load_tree_from_yaml(root),
    }
}

fn ansible_inventory_list(root: &Path) -> Result<JsonValue> {
    let output = Command::new("ansible-inventory")
        .arg("-i")
        .arg(root)
        .arg("--list")
        .output()
        .context("failed to execute ansible-inventory")?;
    if !output.status.success() {
        bail!("ansible-inventory exited with {}", output.status);
    }
    serde_json::from_slice(&output.stdout).context("failed to parse ansible-inventory output")
}

/// Builds the tree from the `ansible-inventory --list` JSON graph.
///
/// The graph maps group names to `{hosts, children, vars}` bodies plus a
/// `_meta` entry we ignore. Group references can form cycles in malformed
/// inventories; a visited set breaks them by rendering the repeat as an
/// empty group.
fn tree_from_ansible_list(listing: &JsonValue) -> NodeSpec {
    let empty = serde_json::Map::new();
    let groups = listing.as_object().unwrap_or(&empty);
    let mut seen = HashSet::new();
    build_group("all", groups, &mut seen)
}

fn build_group(
    name: &str,
    groups: &serde_json::Map<String, JsonValue>,
    seen: &mut HashSet<String>,
) -> NodeSpec {
    if !seen.insert(name.to_string()) {
        return NodeSpec::group(name, Vec::new());
    }
    let mut children = Vec::new();
    if let Some(body) = groups.get(name) {
        for child in names_of(body.get("children")) {
            if child != "_meta" {
                children.push(build_group(&child, groups, seen));
            }
        }
        for host in names_of(body.get("hosts")) {
            children.push(NodeSpec::host(host));
        }
    }
    NodeSpec::group(name, children)
}

/// Names from either a JSON list of strings or an object's keys.
fn names_of(value: Option<&JsonValue>) -> Vec<String> {
    match value {
        Some(JsonValue::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Some(JsonValue::Object(map)) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

// ---- YAML fallback ----

#[derive(Debug, Default)]
struct GroupAccum {
    hosts: BTreeSet<String>,
    children: BTreeMap<String, GroupAccum>,
}

fn load_tree_from_yaml(root: &Path) -> Result<NodeSpec> {
    let mut accum = GroupAccum::default();
    for path in inventory_files(root) {
        let Ok(raw) = std::fs::read_to_string(&path) else {
            continue;
        };
        let Ok(doc) = serde_yaml::from_str::<YamlValue>(&raw) else {
            continue;
        };
        merge_file(&mut accum, &doc);
    }
    Ok(spec_from_accum("all", &accum))
}

/// YAML inventory files under `root`, or `root` itself when it is a file.
fn inventory_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            let by_ext = matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("yml") | Some("yaml")
            );
            let by_name = path.file_name().and_then(|n| n.to_str()) == Some("hosts");
            by_ext || by_name
        })
        .collect();
    files.sort();
    files
}

fn merge_file(root: &mut GroupAccum, doc: &YamlValue) {
    let Some(map) = doc.as_mapping() else {
        return;
    };
    for (key, body) in map {
        let Some(name) = key.as_str() else {
            continue;
        };
        if name == "all" {
            merge_group(root, body);
        } else {
            merge_group(root.children.entry(name.to_string()).or_default(), body);
        }
    }
}

/// Merges one YAML group body into the accumulator.
///
/// `vars` is skipped, `hosts` and `children` carry their usual inventory
/// meaning, and any other mapping key is treated as an implicit child group
/// so hand-rolled layouts still produce a browsable tree.
fn merge_group(accum: &mut GroupAccum, body: &YamlValue) {
    let Some(map) = body.as_mapping() else {
        return;
    };
    for (key, value) in map {
        let Some(name) = key.as_str() else {
            continue;
        };
        match name {
            "vars" => {}
            "hosts" => accum.hosts.extend(host_names(value)),
            "children" => {
                if let Some(children) = value.as_mapping() {
                    for (child_key, child_body) in children {
                        if let Some(child) = child_key.as_str() {
                            merge_group(
                                accum.children.entry(child.to_string()).or_default(),
                                child_body,
                            );
                        }
                    }
                }
            }
            other => {
                merge_group(accum.children.entry(other.to_string()).or_default(), value);
            }
        }
    }
}

/// Host names from a `hosts:` value, which is a mapping of name to vars in
/// standard YAML inventories but sometimes a bare list in hand-written ones.
fn host_names(value: &YamlValue) -> Vec<String> {
    match value {
        YamlValue::Mapping(map) => map
            .keys()
            .filter_map(|key| key.as_str().map(str::to_string))
            .collect(),
        YamlValue::Sequence(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn spec_from_accum(name: &str, accum: &GroupAccum) -> NodeSpec {
    let mut children: Vec<NodeSpec> = accum
        .children
        .iter()
        .map(|(child_name, child)| spec_from_accum(child_name, child))
        .collect();
    children.extend(accum.hosts.iter().map(NodeSpec::host));
    NodeSpec::group(name, children)
}
