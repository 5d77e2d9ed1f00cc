//! Lineage reconstruction from parent pointers.

use crate::session::SessionInfo;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

/// Direct children of `parent_id`, oldest first.
pub fn children_of(sessions: &[SessionInfo], parent_id: &str) -> Vec<SessionInfo> {
    let mut children: Vec<SessionInfo> = sessions
        .iter()
        .filter(|s| s.parent_id.as_deref() == Some(parent_id))
        .cloned()
        .collect();
    children.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
    children
}

/// Walks parent pointers up from `id` to the topmost resolvable ancestor.
///
/// A missing parent or a cycle stops the walk at the last resolvable session.
pub fn resolve_root_id(sessions: &[SessionInfo], id: &str) -> String {
    let by_id: HashMap<&str, &SessionInfo> = sessions.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut visited = HashSet::new();
    let mut current = id.to_string();

    while visited.insert(current.clone()) {
        match by_id
            .get(current.as_str())
            .and_then(|s| s.parent_id.as_deref())
            .filter(|p| by_id.contains_key(p))
        {
            Some(parent) if !visited.contains(parent) => current = parent.to_string(),
            _ => break,
        }
    }
    current
}

/// One node of a display-ready lineage tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchNode {
    pub id: String,
    /// `None` when the id could not be resolved from storage
    pub info: Option<SessionInfo>,
    pub children: Vec<BranchNode>,
}

impl BranchNode {
    /// Number of nodes in this subtree, including itself.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(BranchNode::node_count).sum::<usize>()
    }

    /// Finds a node by id anywhere in the subtree.
    pub fn find(&self, id: &str) -> Option<&BranchNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    /// Renders the tree with box-drawing connectors, marking `current_id`.
    pub fn render(&self, current_id: Option<&str>) -> String {
        let mut out = String::new();
        self.render_into(&mut out, "", true, true, current_id);
        out
    }

    fn label(&self, current_id: Option<&str>) -> String {
        let marker = if current_id == Some(self.id.as_str()) {
            " *"
        } else {
            ""
        };
        match &self.info {
            Some(info) => {
                let at = info
                    .branch_point
                    .map(|p| format!(" @{}", p))
                    .unwrap_or_default();
                format!(
                    "{} [{}] ({} msgs){}{}",
                    info.name, info.id, info.message_count, at, marker
                )
            }
            None => format!("<missing> [{}]{}", self.id, marker),
        }
    }

    fn render_into(
        &self,
        out: &mut String,
        prefix: &str,
        is_last: bool,
        is_root: bool,
        current_id: Option<&str>,
    ) {
        let child_prefix = if is_root {
            let _ = writeln!(out, "{}", self.label(current_id));
            String::new()
        } else {
            let connector = if is_last { "└── " } else { "├── " };
            let _ = writeln!(out, "{}{}{}", prefix, connector, self.label(current_id));
            format!("{}{}", prefix, if is_last { "    " } else { "│   " })
        };

        let count = self.children.len();
        for (i, child) in self.children.iter().enumerate() {
            child.render_into(out, &child_prefix, i + 1 == count, false, current_id);
        }
    }
}

/// Builds the descendant tree rooted at `root_id` from parent pointers.
///
/// Always terminates: an id seen twice (a cycle in corrupt storage) is
/// rendered as a leaf, and an unresolvable root becomes a single
/// `info: None` node instead of an error.
pub fn build_tree(sessions: &[SessionInfo], root_id: &str) -> BranchNode {
    let mut children_by_parent: HashMap<&str, Vec<&SessionInfo>> = HashMap::new();
    for session in sessions {
        if let Some(parent) = session.parent_id.as_deref() {
            children_by_parent.entry(parent).or_default().push(session);
        }
    }
    for children in children_by_parent.values_mut() {
        children.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
    }

    let by_id: HashMap<&str, &SessionInfo> = sessions.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut visited = HashSet::new();
    build_node(root_id, &by_id, &children_by_parent, &mut visited)
}

fn build_node(
    id: &str,
    by_id: &HashMap<&str, &SessionInfo>,
    children_by_parent: &HashMap<&str, Vec<&SessionInfo>>,
    visited: &mut HashSet<String>,
) -> BranchNode {
    let info = by_id.get(id).map(|s| (*s).clone());
    if !visited.insert(id.to_string()) {
        return BranchNode {
            id: id.to_string(),
            info,
            children: Vec::new(),
        };
    }

    let children = children_by_parent
        .get(id)
        .map(|kids| {
            kids.iter()
                .map(|kid| build_node(&kid.id, by_id, children_by_parent, visited))
                .collect()
        })
        .unwrap_or_default();

    BranchNode {
        id: id.to_string(),
        info,
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn info(id: &str, parent: Option<&str>, offset_secs: i64) -> SessionInfo {
        let ts = Utc::now() + Duration::seconds(offset_secs);
        SessionInfo {
            id: id.to_string(),
            name: format!("name-{id}"),
            created: ts,
            updated: ts,
            message_count: 0,
            tags: Vec::new(),
            parent_id: parent.map(str::to_string),
            branch_point: parent.map(|_| 1),
        }
    }

    fn forest() -> Vec<SessionInfo> {
        vec![
            info("root", None, 0),
            info("a", Some("root"), 1),
            info("b", Some("root"), 2),
            info("a1", Some("a"), 3),
            info("other", None, 4),
        ]
    }

    #[test]
    fn test_children_of_returns_direct_children_only() {
        let sessions = forest();
        let ids: Vec<String> = children_of(&sessions, "root").into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(children_of(&sessions, "b").is_empty());
    }

    #[test]
    fn test_build_tree_full_hierarchy() {
        let tree = build_tree(&forest(), "root");
        assert_eq!(tree.node_count(), 4);
        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.children[0].id, "a");
        assert_eq!(tree.children[0].children[0].id, "a1");
        assert!(tree.find("other").is_none());
    }

    #[test]
    fn test_resolve_root_walks_up() {
        let sessions = forest();
        assert_eq!(resolve_root_id(&sessions, "a1"), "root");
        assert_eq!(resolve_root_id(&sessions, "root"), "root");
    }

    #[test]
    fn test_missing_parent_stops_walk() {
        let sessions = vec![info("orphan", Some("deleted"), 0), info("kid", Some("orphan"), 1)];
        assert_eq!(resolve_root_id(&sessions, "kid"), "orphan");
    }

    #[test]
    fn test_cycle_terminates() {
        let sessions = vec![info("x", Some("y"), 0), info("y", Some("x"), 1)];

        let root = resolve_root_id(&sessions, "x");
        assert!(root == "x" || root == "y");

        let tree = build_tree(&sessions, "x");
        // x -> y -> x(leaf)
        assert_eq!(tree.node_count(), 3);
        assert!(tree.children[0].children[0].children.is_empty());
    }

    #[test]
    fn test_unresolvable_root_is_leaf() {
        let tree = build_tree(&forest(), "ghost");
        assert!(tree.info.is_none());
        assert!(tree.children.is_empty());
        assert!(tree.render(None).contains("<missing> [ghost]"));
    }

    #[test]
    fn test_render_marks_current() {
        let rendered = build_tree(&forest(), "root").render(Some("a1"));
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("name-root [root]"));
        assert!(lines[1].starts_with("├── name-a [a]"));
        assert!(lines[2].starts_with("│   └── name-a1 [a1]"));
        assert!(lines[2].ends_with(" *"));
        assert!(lines[3].starts_with("└── name-b [b]"));
    }
}
