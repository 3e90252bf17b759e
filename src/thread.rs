//! Conversation graph: who replies to whom, rebuilt incrementally as
//! statuses and contexts are imported.
//!
//! Invariant: `replies[p]` contains `c` iff `in_reply_to[c]` is attached to
//! `p` (a direct [`Parent::Status`] link, or a [`Parent::Gap`] anchored at
//! `p`).

use std::collections::{HashMap, HashSet};

use serde::Serialize;

/// Where a status hangs in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parent {
    /// Direct reply to `0`.
    Status(String),
    /// The real parent `missing` is not in the graph (not fetched yet,
    /// deleted, or hidden). The status is attached under `anchor`, if any,
    /// across a gap.
    Gap {
        missing: String,
        anchor: Option<String>,
    },
}

impl Parent {
    /// The status this node is attached under.
    pub fn attached_to(&self) -> Option<&str> {
        match self {
            Parent::Status(id) => Some(id),
            Parent::Gap { anchor, .. } => anchor.as_deref(),
        }
    }
}

/// One row of a linearized thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThreadEntry {
    Status { id: String },
    Gap { missing: String },
}

impl ThreadEntry {
    pub fn status(id: impl Into<String>) -> Self {
        ThreadEntry::Status { id: id.into() }
    }

    pub fn gap(missing: impl Into<String>) -> Self {
        ThreadEntry::Gap {
            missing: missing.into(),
        }
    }

    pub fn status_id(&self) -> Option<&str> {
        match self {
            ThreadEntry::Status { id } => Some(id),
            ThreadEntry::Gap { .. } => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ThreadContext {
    in_reply_to: HashMap<String, Parent>,
    replies: HashMap<String, Vec<String>>,
    /// Gap-linked children, by the parent id they are missing.
    waiting: HashMap<String, Vec<String>>,
    known: HashSet<String>,
}

impl ThreadContext {
    pub fn parent(&self, id: &str) -> Option<&Parent> {
        self.in_reply_to.get(id)
    }

    pub fn replies(&self, id: &str) -> &[String] {
        self.replies.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_known(&self, id: &str) -> bool {
        self.known.contains(id)
    }

    /// Record that status `id` exists and replies to `in_reply_to_id`.
    ///
    /// Children that were waiting on `id` across a gap attach to it directly.
    pub fn register(&mut self, id: &str, in_reply_to_id: Option<&str>) {
        self.known.insert(id.to_owned());

        if let Some(children) = self.waiting.remove(id) {
            for child in children {
                self.link(&child, Parent::Status(id.to_owned()));
            }
        }

        let Some(parent) = in_reply_to_id else {
            // No longer a reply; gaps are left to `import_context`.
            if matches!(self.in_reply_to.get(id), Some(Parent::Status(_))) {
                self.unlink(id);
            }
            return;
        };
        // Keep an existing gap until the missing parent itself shows up.
        if let Some(Parent::Gap { missing, .. }) = self.in_reply_to.get(id)
            && missing == parent
            && !self.known.contains(parent)
        {
            return;
        }
        self.link(id, Parent::Status(parent.to_owned()));
    }

    /// Import the context of `focus`: its ancestors (oldest first) and
    /// descendants, each as `(id, in_reply_to_id)`.
    ///
    /// Descendants whose parent is nowhere in the graph are attached under
    /// `focus` across a gap; an oldest ancestor that replies to an unknown
    /// status gets an unanchored gap above it.
    pub fn import_context(
        &mut self,
        focus: &str,
        ancestors: &[(String, Option<String>)],
        descendants: &[(String, Option<String>)],
    ) {
        for (id, parent) in ancestors.iter().chain(descendants) {
            self.register(id, parent.as_deref());
        }
        // An empty ancestor list says nothing about the focus's own parent.
        if let Some((parent, _)) = ancestors.last() {
            self.register(focus, Some(parent.as_str()));
        } else {
            self.known.insert(focus.to_owned());
        }

        for (id, parent) in descendants {
            if let Some(parent) = parent
                && !self.known.contains(parent)
            {
                tracing::debug!(status_id = %id, missing = %parent, "thread gap below focus");
                self.link(
                    id,
                    Parent::Gap {
                        missing: parent.clone(),
                        anchor: Some(focus.to_owned()),
                    },
                );
            }
        }

        if let Some((oldest, Some(parent))) = ancestors.first()
            && !self.known.contains(parent)
        {
            self.link(
                oldest,
                Parent::Gap {
                    missing: parent.clone(),
                    anchor: None,
                },
            );
        }
    }

    /// Drop `id` from the graph. Its replies stay attached where `id` was,
    /// across a gap.
    pub fn remove(&mut self, id: &str) {
        self.known.remove(id);
        let attach = self
            .in_reply_to
            .get(id)
            .and_then(Parent::attached_to)
            .map(str::to_owned);
        self.unlink(id);

        for child in self.replies.remove(id).unwrap_or_default() {
            let missing = match self.in_reply_to.get(&child) {
                Some(Parent::Gap { missing, .. }) => missing.clone(),
                _ => id.to_owned(),
            };
            self.link(
                &child,
                Parent::Gap {
                    missing,
                    anchor: attach.clone(),
                },
            );
        }
    }

    /// Ancestors of `id`, oldest first, excluding `id` itself.
    ///
    /// Stops at a root, at an unanchored gap, or on revisiting a node.
    pub fn ancestors(&self, id: &str) -> Vec<ThreadEntry> {
        let mut out = Vec::new();
        let mut visited = HashSet::from([id]);
        let mut current = id;

        loop {
            match self.in_reply_to.get(current) {
                None => break,
                Some(Parent::Status(parent)) => {
                    if !visited.insert(parent.as_str()) {
                        tracing::warn!(status_id = %id, at = %parent, "reply cycle in thread");
                        break;
                    }
                    out.push(ThreadEntry::status(parent.as_str()));
                    current = parent.as_str();
                }
                Some(Parent::Gap { missing, anchor }) => {
                    out.push(ThreadEntry::gap(missing.as_str()));
                    match anchor {
                        Some(anchor) if visited.insert(anchor.as_str()) => {
                            out.push(ThreadEntry::status(anchor.as_str()));
                            current = anchor.as_str();
                        }
                        _ => break,
                    }
                }
            }
        }

        out.reverse();
        out
    }

    /// Every status below `id`, depth first, siblings in reply order.
    pub fn descendants(&self, id: &str) -> Vec<ThreadEntry> {
        let mut out = Vec::new();
        let mut visited = HashSet::from([id]);
        let mut stack = vec![id];

        while let Some(current) = stack.pop() {
            if current != id {
                if let Some(Parent::Gap { missing, .. }) = self.in_reply_to.get(current) {
                    out.push(ThreadEntry::gap(missing.as_str()));
                }
                out.push(ThreadEntry::status(current));
            }
            for child in self.replies(current).iter().rev() {
                if visited.insert(child.as_str()) {
                    stack.push(child.as_str());
                }
            }
        }

        out
    }

    /// `ancestors ++ [id] ++ descendants`.
    pub fn thread(&self, id: &str) -> Vec<ThreadEntry> {
        let mut out = self.ancestors(id);
        out.push(ThreadEntry::status(id));
        out.extend(self.descendants(id));
        out
    }

    fn link(&mut self, child: &str, parent: Parent) {
        self.unlink(child);
        if let Some(anchor) = parent.attached_to() {
            let siblings = self.replies.entry(anchor.to_owned()).or_default();
            if !siblings.iter().any(|s| s == child) {
                siblings.push(child.to_owned());
            }
        }
        if let Parent::Gap { missing, .. } = &parent {
            self.waiting
                .entry(missing.clone())
                .or_default()
                .push(child.to_owned());
        }
        self.in_reply_to.insert(child.to_owned(), parent);
    }

    fn unlink(&mut self, child: &str) {
        let Some(old) = self.in_reply_to.remove(child) else {
            return;
        };
        if let Some(anchor) = old.attached_to()
            && let Some(siblings) = self.replies.get_mut(anchor)
        {
            siblings.retain(|s| s != child);
            if siblings.is_empty() {
                self.replies.remove(anchor);
            }
        }
        if let Parent::Gap { missing, .. } = &old
            && let Some(children) = self.waiting.get_mut(missing)
        {
            children.retain(|c| c != child);
            if children.is_empty() {
                self.waiting.remove(missing);
            }
        }
    }
}

/// Positions in a linearized thread where item `i` does not reply to item
/// `i - 1`. Each returned index `i` marks a gap between `i - 1` and `i`.
pub fn find_gaps(items: &[(&str, Option<&str>)]) -> Vec<usize> {
    items
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[1].1 != Some(pair[0].0))
        .map(|(i, _)| i + 1)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(id: &str, parent: Option<&str>) -> (String, Option<String>) {
        (id.to_owned(), parent.map(str::to_owned))
    }

    fn ids(entries: &[ThreadEntry]) -> Vec<String> {
        entries
            .iter()
            .map(|e| match e {
                ThreadEntry::Status { id } => id.clone(),
                ThreadEntry::Gap { missing } => format!("gap:{missing}"),
            })
            .collect()
    }

    #[test]
    fn ancestors_oldest_first() {
        let mut ctx = ThreadContext::default();
        ctx.register("a", None);
        ctx.register("b", Some("a"));
        ctx.register("c", Some("b"));
        assert_eq!(ids(&ctx.ancestors("c")), vec!["a", "b"]);
        assert!(ctx.ancestors("a").is_empty());
    }

    #[test]
    fn ancestor_walk_terminates_on_cycle() {
        let mut ctx = ThreadContext::default();
        ctx.register("a", Some("b"));
        ctx.register("b", Some("a"));
        let chain = ctx.ancestors("a");
        assert_eq!(ids(&chain), vec!["b"]);
    }

    #[test]
    fn descendants_depth_first_in_reply_order() {
        let mut ctx = ThreadContext::default();
        ctx.register("root", None);
        ctx.register("r1", Some("root"));
        ctx.register("r2", Some("root"));
        ctx.register("r1a", Some("r1"));
        ctx.register("r1b", Some("r1"));
        ctx.register("r2a", Some("r2"));

        assert_eq!(
            ids(&ctx.descendants("root")),
            vec!["r1", "r1a", "r1b", "r2", "r2a"]
        );
    }

    #[test]
    fn descendants_terminate_on_cycle() {
        let mut ctx = ThreadContext::default();
        ctx.register("a", Some("b"));
        ctx.register("b", Some("a"));
        assert_eq!(ids(&ctx.descendants("a")), vec!["b"]);
    }

    #[test]
    fn deep_thread_does_not_recurse() {
        let mut ctx = ThreadContext::default();
        ctx.register("0", None);
        for i in 1..20_000 {
            ctx.register(&i.to_string(), Some(&(i - 1).to_string()));
        }
        assert_eq!(ctx.descendants("0").len(), 19_999);
        assert_eq!(ctx.ancestors("19999").len(), 19_999);
    }

    #[test]
    fn replies_and_parents_stay_consistent() {
        let mut ctx = ThreadContext::default();
        ctx.register("c", Some("p1"));
        assert_eq!(ctx.replies("p1"), ["c".to_string()]);
        ctx.register("c", Some("p2"));
        assert!(ctx.replies("p1").is_empty());
        assert_eq!(ctx.replies("p2"), ["c".to_string()]);
        assert_eq!(ctx.parent("c"), Some(&Parent::Status("p2".into())));
    }

    #[test]
    fn clearing_reply_unlinks_old_parent() {
        let mut ctx = ThreadContext::default();
        ctx.register("p", None);
        ctx.register("c", Some("p"));

        ctx.register("c", None);

        assert!(ctx.parent("c").is_none());
        assert!(ctx.replies("p").is_empty());
        assert!(ctx.ancestors("c").is_empty());
    }

    #[test]
    fn clearing_reply_keeps_gap_link() {
        let mut ctx = ThreadContext::default();
        ctx.import_context("focus", &[], &[pair("d", Some("unseen"))]);

        ctx.register("d", None);

        assert!(matches!(ctx.parent("d"), Some(Parent::Gap { .. })));
    }

    #[test]
    fn context_without_ancestors_keeps_focus_parent() {
        let mut ctx = ThreadContext::default();
        ctx.register("focus", Some("hidden"));

        ctx.import_context("focus", &[], &[pair("d", Some("focus"))]);

        assert_eq!(ctx.parent("focus"), Some(&Parent::Status("hidden".into())));
        assert_eq!(ids(&ctx.thread("focus")), vec!["hidden", "focus", "d"]);
    }

    #[test]
    fn context_import_bridges_missing_parent_with_gap() {
        let mut ctx = ThreadContext::default();
        ctx.import_context(
            "focus",
            &[pair("root", None)],
            &[pair("d1", Some("focus")), pair("d2", Some("unseen"))],
        );

        assert_eq!(
            ctx.parent("d2"),
            Some(&Parent::Gap {
                missing: "unseen".into(),
                anchor: Some("focus".into()),
            })
        );
        assert_eq!(
            ids(&ctx.thread("focus")),
            vec!["root", "focus", "d1", "gap:unseen", "d2"]
        );
        assert_eq!(ids(&ctx.ancestors("d2")), vec!["root", "focus", "gap:unseen"]);
    }

    #[test]
    fn gap_closes_when_missing_parent_arrives() {
        let mut ctx = ThreadContext::default();
        ctx.import_context("focus", &[], &[pair("d2", Some("unseen"))]);
        ctx.register("d2", Some("unseen"));
        assert!(matches!(ctx.parent("d2"), Some(Parent::Gap { .. })));

        ctx.register("unseen", Some("focus"));
        assert_eq!(ctx.parent("d2"), Some(&Parent::Status("unseen".into())));
        assert_eq!(ids(&ctx.descendants("focus")), vec!["unseen", "d2"]);
    }

    #[test]
    fn unanchored_gap_above_oldest_ancestor() {
        let mut ctx = ThreadContext::default();
        ctx.import_context("focus", &[pair("a1", Some("gone"))], &[]);
        assert_eq!(ids(&ctx.ancestors("focus")), vec!["gap:gone", "a1"]);
    }

    #[test]
    fn removing_status_keeps_replies_connected() {
        let mut ctx = ThreadContext::default();
        ctx.register("root", None);
        ctx.register("mid", Some("root"));
        ctx.register("leaf", Some("mid"));

        ctx.remove("mid");

        assert!(ctx.parent("mid").is_none());
        assert_eq!(
            ctx.parent("leaf"),
            Some(&Parent::Gap {
                missing: "mid".into(),
                anchor: Some("root".into()),
            })
        );
        assert_eq!(ids(&ctx.descendants("root")), vec!["gap:mid", "leaf"]);
    }

    #[test]
    fn flags_gap_between_non_adjacent_replies() {
        let items = [
            ("p1", None),
            ("p2", Some("p1")),
            ("p3", Some("somewhere-else")),
        ];
        assert_eq!(find_gaps(&items), vec![2]);
        assert!(find_gaps(&items[..2]).is_empty());
    }
}
