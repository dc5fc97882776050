//! Inventory tree model with tri-state checkboxes.
//!
//! Nodes live in a flat arena and reference each other by index, so the
//! parent back-reference is non-owning and the visible-row list is cheap to
//! rebuild. Group check state is always recomputed from children; it is never
//! cached independently of them.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Selection state of a tree row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Unchecked,
    Partial,
    Checked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Group,
    Host,
}

/// Nested tree description supplied by the inventory loader.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn group(name: impl Into<String>, children: Vec<NodeSpec>) -> Self {
        Self {
            name: name.into(),
            kind: "group".to_string(),
            children,
        }
    }

    pub fn host(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: "host".to_string(),
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    kind: NodeKind,
    parent: Option<usize>,
    children: Vec<usize>,
    depth: usize,
    expanded: bool,
    check: CheckState,
}

/// A visible row handed to the rendering layer.
#[derive(Debug, Clone, Copy)]
pub struct TreeRow<'a> {
    pub name: &'a str,
    pub kind: NodeKind,
    pub depth: usize,
    pub check: CheckState,
    pub expanded: bool,
}

/// The inventory tree: arena, flat view, cursor and scroll state.
#[derive(Debug, Default)]
pub struct InventoryTree {
    nodes: Vec<Node>,
    root: Option<usize>,
    flat: Vec<usize>,
    cursor: usize,
    top: usize,
    view_height: usize,
}

impl InventoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole tree from a nested description.
    ///
    /// Groups are auto-expanded down to `expand_depth` levels (0 = root row
    /// only). Cursor and scroll reset to the top. On a malformed description
    /// the previous tree stays installed untouched.
    pub fn load(&mut self, spec: &NodeSpec, expand_depth: usize) -> Result<()> {
        let mut nodes = Vec::new();
        build_node(&mut nodes, spec, None, 0)?;
        self.nodes = nodes;
        self.root = Some(0);
        expand_to_depth(&mut self.nodes, 0, expand_depth);
        self.cursor = 0;
        self.top = 0;
        self.rebuild_flat();
        Ok(())
    }

    /// Tells the tree how many rows the rendering pane currently shows.
    pub fn set_view_height(&mut self, height: usize) {
        self.view_height = height;
        self.ensure_cursor_visible();
    }

    pub fn is_loaded(&self) -> bool {
        self.root.is_some()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn top(&self) -> usize {
        self.top
    }

    pub fn visible_len(&self) -> usize {
        self.flat.len()
    }

    /// Visible rows in order, for rendering.
    pub fn rows(&self) -> impl Iterator<Item = TreeRow<'_>> {
        self.flat.iter().map(|&idx| {
            let node = &self.nodes[idx];
            TreeRow {
                name: &node.name,
                kind: node.kind,
                depth: node.depth,
                check: node.check,
                expanded: node.expanded,
            }
        })
    }

    fn current(&self) -> Option<usize> {
        self.flat.get(self.cursor).copied()
    }

    fn rebuild_flat(&mut self) {
        self.flat.clear();
        let Some(root) = self.root else {
            return;
        };
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            self.flat.push(idx);
            let node = &self.nodes[idx];
            if node.kind == NodeKind::Group && node.expanded {
                for &child in node.children.iter().rev() {
                    stack.push(child);
                }
            }
        }
        if self.cursor >= self.flat.len() {
            self.cursor = self.flat.len().saturating_sub(1);
        }
        self.ensure_cursor_visible();
    }

    fn ensure_cursor_visible(&mut self) {
        let visible = self.view_height.max(1);
        if self.cursor < self.top {
            self.top = self.cursor;
        } else if self.cursor >= self.top + visible {
            self.top = self.cursor + 1 - visible;
        }
    }

    // ---- cursor movement ----

    pub fn move_cursor(&mut self, delta: isize) {
        if self.flat.is_empty() {
            return;
        }
        let last = self.flat.len() - 1;
        let next = if delta >= 0 {
            self.cursor.saturating_add(delta as usize).min(last)
        } else {
            self.cursor.saturating_sub(delta.unsigned_abs())
        };
        self.cursor = next;
        self.ensure_cursor_visible();
    }

    pub fn page_up(&mut self) {
        self.move_cursor(-(self.view_height.max(1) as isize));
    }

    pub fn page_down(&mut self) {
        self.move_cursor(self.view_height.max(1) as isize);
    }

    pub fn to_home(&mut self) {
        self.cursor = 0;
        self.ensure_cursor_visible();
    }

    pub fn to_end(&mut self) {
        if !self.flat.is_empty() {
            self.cursor = self.flat.len() - 1;
            self.ensure_cursor_visible();
        }
    }

    // ---- selection ----

    /// Toggles the checkbox under the cursor.
    ///
    /// A host flips between checked and unchecked. A group that is anything
    /// short of fully checked (partial included) checks its whole subtree;
    /// a fully checked group unchecks it. Ancestors are recomputed bottom-up
    /// after either case.
    pub fn toggle_check_current(&mut self) {
        let Some(idx) = self.current() else {
            return;
        };
        self.toggle_check(idx);
        self.rebuild_flat();
    }

    fn toggle_check(&mut self, idx: usize) {
        match self.nodes[idx].kind {
            NodeKind::Host => {
                self.nodes[idx].check = match self.nodes[idx].check {
                    CheckState::Checked => CheckState::Unchecked,
                    _ => CheckState::Checked,
                };
            }
            NodeKind::Group => {
                let target = if self.nodes[idx].check == CheckState::Checked {
                    CheckState::Unchecked
                } else {
                    CheckState::Checked
                };
                self.set_subtree(idx, target);
                self.recompute_groups(idx);
            }
        }
        self.recompute_ancestors(idx);
    }

    fn set_subtree(&mut self, idx: usize, state: CheckState) {
        let mut stack = vec![idx];
        while let Some(i) = stack.pop() {
            self.nodes[i].check = state;
            stack.extend(self.nodes[i].children.iter().copied());
        }
    }

    /// Recomputes group states within a subtree, children before parents.
    fn recompute_groups(&mut self, idx: usize) {
        let children = self.nodes[idx].children.clone();
        for &child in &children {
            if self.nodes[child].kind == NodeKind::Group {
                self.recompute_groups(child);
            }
        }
        if self.nodes[idx].kind == NodeKind::Group {
            self.nodes[idx].check = self.state_from_children(idx);
        }
    }

    fn recompute_ancestors(&mut self, idx: usize) {
        let mut current = self.nodes[idx].parent;
        while let Some(i) = current {
            self.nodes[i].check = self.state_from_children(i);
            current = self.nodes[i].parent;
        }
    }

    fn state_from_children(&self, idx: usize) -> CheckState {
        let children = &self.nodes[idx].children;
        if children.is_empty() {
            return CheckState::Unchecked;
        }
        let mut all_checked = true;
        let mut all_unchecked = true;
        for &child in children {
            match self.nodes[child].check {
                CheckState::Checked => all_unchecked = false,
                CheckState::Unchecked => all_checked = false,
                CheckState::Partial => {
                    all_checked = false;
                    all_unchecked = false;
                }
            }
        }
        if all_checked {
            CheckState::Checked
        } else if all_unchecked {
            CheckState::Unchecked
        } else {
            CheckState::Partial
        }
    }

    /// Clears every checkbox in the tree.
    pub fn clear_checks(&mut self) {
        for node in &mut self.nodes {
            node.check = CheckState::Unchecked;
        }
        self.rebuild_flat();
    }

    // ---- expand / collapse ----

    pub fn toggle_expand_current(&mut self) {
        let Some(idx) = self.current() else {
            return;
        };
        let node = &mut self.nodes[idx];
        if node.kind == NodeKind::Group && !node.children.is_empty() {
            node.expanded = !node.expanded;
            self.rebuild_flat();
        }
    }

    /// Expands the group under the cursor; a no-op on hosts and on groups
    /// that are already expanded.
    pub fn expand_current(&mut self) {
        let Some(idx) = self.current() else {
            return;
        };
        let node = &mut self.nodes[idx];
        if node.kind == NodeKind::Group && !node.expanded {
            node.expanded = true;
            self.rebuild_flat();
        }
    }

    /// Collapses the group under the cursor; if it is not an expanded group,
    /// moves the cursor to the parent row instead. The dual behavior mirrors
    /// common file-tree navigation.
    pub fn collapse_current_or_go_parent(&mut self) {
        let Some(idx) = self.current() else {
            return;
        };
        let node = &self.nodes[idx];
        if node.kind == NodeKind::Group && node.expanded {
            self.nodes[idx].expanded = false;
            self.rebuild_flat();
        } else if let Some(parent) = node.parent {
            if let Some(pos) = self.flat.iter().position(|&i| i == parent) {
                self.cursor = pos;
                self.ensure_cursor_visible();
            }
        }
    }

    // ---- extraction ----

    /// Sorted, de-duplicated names of all checked hosts.
    pub fn selected_hosts(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        for idx in self.dfs_order() {
            let node = &self.nodes[idx];
            if node.kind == NodeKind::Host && node.check == CheckState::Checked {
                names.insert(node.name.clone());
            }
        }
        names.into_iter().collect()
    }

    /// Ordered, de-duplicated `--limit` tokens for the checked hosts.
    ///
    /// A host name checked under exactly one top-level group stays bare; a
    /// name that occurs more than once among the checked hosts is emitted as
    /// the intersection pattern `group:&host` for every occurrence with a
    /// known top-level group, so colliding selections are never silently
    /// merged. The counting rule applies uniformly to any number of
    /// collisions.
    pub fn limit_patterns(&self) -> Vec<String> {
        let mut selected: Vec<(usize, Option<usize>)> = Vec::new();
        for idx in self.dfs_order() {
            let node = &self.nodes[idx];
            if node.kind == NodeKind::Host && node.check == CheckState::Checked {
                selected.push((idx, self.top_level_group(idx)));
            }
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for &(idx, _) in &selected {
            *counts.entry(self.nodes[idx].name.as_str()).or_insert(0) += 1;
        }

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (idx, group) in selected {
            let name = self.nodes[idx].name.as_str();
            let token = match group {
                Some(g) if counts.get(name).copied().unwrap_or(0) > 1 => {
                    format!("{}:&{}", self.nodes[g].name, name)
                }
                _ => name.to_string(),
            };
            if seen.insert(token.clone()) {
                out.push(token);
            }
        }
        out
    }

    /// The ancestor directly below the root on the path to `idx`, or `None`
    /// when the node is the root or one of its direct children.
    fn top_level_group(&self, idx: usize) -> Option<usize> {
        let mut last = idx;
        let mut parent = self.nodes[idx].parent?;
        while let Some(grandparent) = self.nodes[parent].parent {
            last = parent;
            parent = grandparent;
        }
        (last != idx).then_some(last)
    }

    /// Full-tree depth-first order, visible or not.
    fn dfs_order(&self) -> Vec<usize> {
        let Some(root) = self.root else {
            return Vec::new();
        };
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            order.push(idx);
            for &child in self.nodes[idx].children.iter().rev() {
                stack.push(child);
            }
        }
        order
    }
}

fn build_node(
    nodes: &mut Vec<Node>,
    spec: &NodeSpec,
    parent: Option<usize>,
    depth: usize,
) -> Result<usize> {
    if spec.name.trim().is_empty() {
        return Err(Error::MalformedTree("node is missing a name".to_string()));
    }
    let kind = match spec.kind.as_str() {
        "group" => NodeKind::Group,
        "host" => NodeKind::Host,
        other => {
            return Err(Error::MalformedTree(format!(
                "node {:?} has invalid kind {:?}",
                spec.name, other
            )))
        }
    };
    if kind == NodeKind::Host && !spec.children.is_empty() {
        return Err(Error::MalformedTree(format!(
            "host {:?} has children",
            spec.name
        )));
    }
    let idx = nodes.len();
    nodes.push(Node {
        name: spec.name.clone(),
        kind,
        parent,
        children: Vec::new(),
        depth,
        expanded: false,
        check: CheckState::Unchecked,
    });
    for child_spec in &spec.children {
        let child = build_node(nodes, child_spec, Some(idx), depth + 1)?;
        nodes[idx].children.push(child);
    }
    Ok(idx)
}

fn expand_to_depth(nodes: &mut [Node], idx: usize, remaining: usize) {
    if remaining == 0 || nodes[idx].kind != NodeKind::Group {
        return;
    }
    nodes[idx].expanded = true;
    let children = nodes[idx].children.clone();
    for child in children {
        expand_to_depth(nodes, child, remaining - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> NodeSpec {
        NodeSpec::group(
            "all",
            vec![
                NodeSpec::group(
                    "switches",
                    vec![NodeSpec::host("sw1"), NodeSpec::host("sw2")],
                ),
                NodeSpec::group("routers", vec![NodeSpec::host("r1")]),
            ],
        )
    }

    fn loaded(spec: &NodeSpec) -> InventoryTree {
        let mut tree = InventoryTree::new();
        tree.load(spec, 3).unwrap();
        tree
    }

    fn cursor_to(tree: &mut InventoryTree, name: &str) {
        let pos = tree
            .rows()
            .position(|row| row.name == name)
            .unwrap_or_else(|| panic!("row {:?} not visible", name));
        tree.to_home();
        tree.move_cursor(pos as isize);
    }

    fn row_check(tree: &InventoryTree, name: &str) -> CheckState {
        tree.rows()
            .find(|row| row.name == name)
            .map(|row| row.check)
            .unwrap_or_else(|| panic!("row {:?} not visible", name))
    }

    #[test]
    fn load_rejects_missing_name() {
        let mut tree = InventoryTree::new();
        let bad = NodeSpec::group("all", vec![NodeSpec::host("")]);
        assert!(matches!(
            tree.load(&bad, 1),
            Err(Error::MalformedTree(_))
        ));
        assert!(!tree.is_loaded());
    }

    #[test]
    fn load_rejects_invalid_kind() {
        let mut tree = InventoryTree::new();
        let bad = NodeSpec {
            name: "all".to_string(),
            kind: "cluster".to_string(),
            children: Vec::new(),
        };
        assert!(matches!(
            tree.load(&bad, 1),
            Err(Error::MalformedTree(_))
        ));
    }

    #[test]
    fn failed_load_keeps_previous_tree() {
        let mut tree = loaded(&sample_tree());
        let bad = NodeSpec::group("all", vec![NodeSpec::host("")]);
        assert!(tree.load(&bad, 3).is_err());
        assert!(tree.rows().any(|row| row.name == "sw1"));
    }

    #[test]
    fn expand_depth_zero_shows_root_only() {
        let mut tree = InventoryTree::new();
        tree.load(&sample_tree(), 0).unwrap();
        assert_eq!(tree.visible_len(), 1);
    }

    #[test]
    fn host_toggle_propagates_to_ancestors() {
        let mut tree = loaded(&sample_tree());
        cursor_to(&mut tree, "sw1");
        tree.toggle_check_current();
        assert_eq!(row_check(&tree, "sw1"), CheckState::Checked);
        assert_eq!(row_check(&tree, "switches"), CheckState::Partial);
        assert_eq!(row_check(&tree, "all"), CheckState::Partial);

        cursor_to(&mut tree, "sw2");
        tree.toggle_check_current();
        assert_eq!(row_check(&tree, "switches"), CheckState::Checked);
        assert_eq!(row_check(&tree, "all"), CheckState::Partial);
    }

    #[test]
    fn group_toggle_checks_then_unchecks_subtree() {
        let mut tree = loaded(&sample_tree());
        cursor_to(&mut tree, "switches");
        tree.toggle_check_current();
        assert_eq!(tree.selected_hosts(), vec!["sw1", "sw2"]);
        assert_eq!(row_check(&tree, "switches"), CheckState::Checked);

        tree.toggle_check_current();
        assert!(tree.selected_hosts().is_empty());
        assert_eq!(row_check(&tree, "switches"), CheckState::Unchecked);
    }

    #[test]
    fn partial_group_toggle_checks_everything() {
        let mut tree = loaded(&sample_tree());
        cursor_to(&mut tree, "sw1");
        tree.toggle_check_current();
        cursor_to(&mut tree, "switches");
        assert_eq!(row_check(&tree, "switches"), CheckState::Partial);
        tree.toggle_check_current();
        assert_eq!(tree.selected_hosts(), vec!["sw1", "sw2"]);
    }

    #[test]
    fn end_to_end_check_group_then_uncheck_host() {
        let mut tree = loaded(&sample_tree());
        cursor_to(&mut tree, "switches");
        tree.toggle_check_current();
        assert_eq!(tree.selected_hosts(), vec!["sw1", "sw2"]);

        cursor_to(&mut tree, "sw1");
        tree.toggle_check_current();
        assert_eq!(row_check(&tree, "switches"), CheckState::Partial);
        assert_eq!(tree.limit_patterns(), vec!["sw2"]);
    }

    #[test]
    fn unique_host_uses_bare_pattern() {
        let sites = NodeSpec::group(
            "all",
            vec![
                NodeSpec::group("siteA", vec![NodeSpec::host("sw1")]),
                NodeSpec::group("siteB", vec![NodeSpec::host("sw2")]),
            ],
        );
        let mut tree = loaded(&sites);
        cursor_to(&mut tree, "sw1");
        tree.toggle_check_current();
        assert_eq!(tree.limit_patterns(), vec!["sw1"]);
    }

    #[test]
    fn unselected_duplicates_do_not_force_disambiguation() {
        let sites = NodeSpec::group(
            "all",
            vec![
                NodeSpec::group("A", vec![NodeSpec::host("sw1")]),
                NodeSpec::group("B", vec![NodeSpec::host("sw1")]),
            ],
        );
        let mut tree = loaded(&sites);
        cursor_to(&mut tree, "A");
        tree.toggle_check_current();
        // Only A's sw1 is checked, so the bare name is still unambiguous.
        assert_eq!(tree.limit_patterns(), vec!["sw1"]);
    }

    #[test]
    fn duplicate_hosts_are_disambiguated_in_first_seen_order() {
        let sites = NodeSpec::group(
            "all",
            vec![
                NodeSpec::group("A", vec![NodeSpec::host("sw1")]),
                NodeSpec::group("B", vec![NodeSpec::host("sw1")]),
            ],
        );
        let mut tree = loaded(&sites);
        cursor_to(&mut tree, "all");
        tree.toggle_check_current();
        assert_eq!(tree.limit_patterns(), vec!["A:&sw1", "B:&sw1"]);
        assert_eq!(tree.selected_hosts(), vec!["sw1"]);
    }

    #[test]
    fn three_way_collision_follows_the_same_rule() {
        let sites = NodeSpec::group(
            "all",
            vec![
                NodeSpec::group("A", vec![NodeSpec::host("sw1")]),
                NodeSpec::group("B", vec![NodeSpec::host("sw1")]),
                NodeSpec::group("C", vec![NodeSpec::host("sw1"), NodeSpec::host("r9")]),
            ],
        );
        let mut tree = loaded(&sites);
        cursor_to(&mut tree, "all");
        tree.toggle_check_current();
        assert_eq!(
            tree.limit_patterns(),
            vec!["A:&sw1", "B:&sw1", "C:&sw1", "r9"]
        );
    }

    #[test]
    fn host_directly_under_root_stays_bare_even_when_colliding() {
        let sites = NodeSpec::group(
            "all",
            vec![
                NodeSpec::host("sw1"),
                NodeSpec::group("A", vec![NodeSpec::host("sw1")]),
            ],
        );
        let mut tree = loaded(&sites);
        cursor_to(&mut tree, "all");
        tree.toggle_check_current();
        assert_eq!(tree.limit_patterns(), vec!["sw1", "A:&sw1"]);
    }

    #[test]
    fn collapsed_hosts_still_count_for_patterns() {
        let mut tree = loaded(&sample_tree());
        cursor_to(&mut tree, "switches");
        tree.toggle_check_current();
        tree.collapse_current_or_go_parent();
        assert!(!tree.rows().any(|row| row.name == "sw1"));
        assert_eq!(tree.limit_patterns(), vec!["sw1", "sw2"]);
    }

    #[test]
    fn expand_is_idempotent() {
        let mut tree = loaded(&sample_tree());
        cursor_to(&mut tree, "switches");
        let before: Vec<String> = tree.rows().map(|r| r.name.to_string()).collect();
        tree.expand_current();
        tree.expand_current();
        let after: Vec<String> = tree.rows().map(|r| r.name.to_string()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn collapse_on_host_jumps_to_parent() {
        let mut tree = loaded(&sample_tree());
        cursor_to(&mut tree, "sw2");
        tree.collapse_current_or_go_parent();
        let names: Vec<&str> = tree.rows().map(|r| r.name).collect();
        assert_eq!(names[tree.cursor()], "switches");
    }

    #[test]
    fn collapse_on_expanded_group_hides_children() {
        let mut tree = loaded(&sample_tree());
        cursor_to(&mut tree, "switches");
        tree.collapse_current_or_go_parent();
        assert!(!tree.rows().any(|row| row.name == "sw1"));
        // Second press walks up to the root instead.
        tree.collapse_current_or_go_parent();
        let names: Vec<&str> = tree.rows().map(|r| r.name).collect();
        assert_eq!(names[tree.cursor()], "all");
    }

    #[test]
    fn clear_checks_resets_everything() {
        let mut tree = loaded(&sample_tree());
        cursor_to(&mut tree, "all");
        tree.toggle_check_current();
        assert!(!tree.selected_hosts().is_empty());
        tree.clear_checks();
        assert!(tree.selected_hosts().is_empty());
        assert_eq!(row_check(&tree, "all"), CheckState::Unchecked);
    }

    #[test]
    fn cursor_movement_clamps_and_pages() {
        let mut tree = loaded(&sample_tree());
        tree.set_view_height(3);
        tree.move_cursor(-5);
        assert_eq!(tree.cursor(), 0);
        tree.to_end();
        assert_eq!(tree.cursor(), tree.visible_len() - 1);
        tree.page_up();
        tree.page_up();
        assert_eq!(tree.cursor(), 0);
        tree.page_down();
        assert_eq!(tree.cursor(), 3);
    }
}
