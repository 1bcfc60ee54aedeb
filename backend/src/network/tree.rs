//! Binary referral tree.
//!
//! Nodes live in an arena (`Vec`) and refer to their children by index,
//! so every child has exactly one owning slot and the structure cannot
//! form cycles. The tree is a derived view: build it, traverse it, drop it.

use std::collections::VecDeque;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::db::UserRecord;

use super::PlacementError;

/// Index of a node inside its tree.
pub type NodeId = usize;

/// Which child slot a node occupies under its parent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// Which nodes count toward a subtree's pair count.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CountPolicy {
    /// Every placed user counts, whatever their status.
    AllNodes,
    /// Only active users count.
    ActiveOnly,
}

impl CountPolicy {
    fn counts(&self, user: &UserRecord) -> bool {
        match self {
            CountPolicy::AllNodes => true,
            CountPolicy::ActiveOnly => user.is_active(),
        }
    }
}

impl FromStr for CountPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(CountPolicy::AllNodes),
            "active" => Ok(CountPolicy::ActiveOnly),
            other => Err(format!("expected `all` or `active`, got `{}`", other)),
        }
    }
}

/// Where a user landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Placement {
    /// First user; became the root.
    Root,
    /// Attached under `parent_id`.
    Child {
        parent_id: i64,
        side: Side,
        /// Levels below the referrer (1 = direct child of the referrer).
        depth_below_referrer: usize,
    },
}

/// One user snapshot plus its child slots.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub user: UserRecord,
    parent: Option<NodeId>,
    left: Option<NodeId>,
    right: Option<NodeId>,
    depth: usize,
}

/// The referral placement tree.
#[derive(Debug, Clone, Default)]
pub struct ReferralTree {
    nodes: Vec<TreeNode>,
    root: Option<NodeId>,
}

impl ReferralTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the tree from the full user table.
    ///
    /// Users are taken in id order. The first becomes the root; each later
    /// user goes through [`ReferralTree::insert_under_referrer`]. Users whose
    /// referrer is not (yet) in the tree are skipped with a warning.
    pub fn build(mut users: Vec<UserRecord>) -> Self {
        users.sort_by_key(|u| u.id);

        let mut tree = Self::new();
        let mut orphaned = 0usize;

        for user in users {
            let id = user.id;
            if let Err(e) = tree.insert_under_referrer(user) {
                warn!("Orphaned user {} left out of referral tree: {}", id, e);
                orphaned += 1;
            }
        }

        debug!(
            "Built referral tree with {} nodes ({} orphaned)",
            tree.len(),
            orphaned
        );
        tree
    }

    /// Place `user` at the first free slot under its referrer.
    ///
    /// An empty tree takes the user as root regardless of `referred_by`.
    pub fn insert_under_referrer(&mut self, user: UserRecord) -> Result<Placement, PlacementError> {
        if self.root.is_none() {
            let id = self.push(user, None, 0);
            self.root = Some(id);
            return Ok(Placement::Root);
        }

        let referrer = self
            .find_by_referral_code(&user.referred_by)
            .ok_or_else(|| PlacementError::ReferrerNotFound(user.referred_by.clone()))?;

        let (parent, side) = self.first_free_slot(referrer);
        let depth = self.nodes[parent].depth + 1;
        let child = self.push(user, Some(parent), depth);

        match side {
            Side::Left => self.nodes[parent].left = Some(child),
            Side::Right => self.nodes[parent].right = Some(child),
        }

        Ok(Placement::Child {
            parent_id: self.nodes[parent].user.id,
            side,
            depth_below_referrer: depth - self.nodes[referrer].depth,
        })
    }

    /// Breadth-first search for the shallowest empty slot under `start`.
    fn first_free_slot(&self, start: NodeId) -> (NodeId, Side) {
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            let node = &self.nodes[current];
            match (node.left, node.right) {
                (None, _) => return (current, Side::Left),
                (Some(_), None) => return (current, Side::Right),
                (Some(left), Some(right)) => {
                    queue.push_back(left);
                    queue.push_back(right);
                }
            }
        }

        // A finite binary tree always has a free slot below any node.
        unreachable!("no free slot found under node {}", start)
    }

    fn push(&mut self, user: UserRecord, parent: Option<NodeId>, depth: usize) -> NodeId {
        self.nodes.push(TreeNode {
            user,
            parent,
            left: None,
            right: None,
            depth,
        });
        self.nodes.len() - 1
    }

    /// Depth-first, left before right; first match wins.
    pub fn find_by_referral_code(&self, code: &str) -> Option<NodeId> {
        self.find(|user| user.referral_code == code)
    }

    pub fn find_by_id(&self, id: i64) -> Option<NodeId> {
        self.find(|user| user.id == id)
    }

    fn find(&self, matches: impl Fn(&UserRecord) -> bool) -> Option<NodeId> {
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();

        while let Some(current) = stack.pop() {
            let node = &self.nodes[current];
            if matches(&node.user) {
                return Some(current);
            }
            // Right pushed first so the left subtree is searched first.
            stack.extend(node.right);
            stack.extend(node.left);
        }

        None
    }

    /// Nodes under and including `subtree`; 0 for an empty slot.
    pub fn count_nodes(&self, subtree: Option<NodeId>) -> i64 {
        self.count_matching(subtree, CountPolicy::AllNodes)
    }

    /// Nodes under and including `subtree` that `policy` counts.
    pub fn count_matching(&self, subtree: Option<NodeId>, policy: CountPolicy) -> i64 {
        let mut stack: Vec<NodeId> = subtree.into_iter().collect();
        let mut count = 0;

        while let Some(current) = stack.pop() {
            let node = &self.nodes[current];
            if policy.counts(&node.user) {
                count += 1;
            }
            stack.extend(node.left);
            stack.extend(node.right);
        }

        count
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id]
    }

    pub fn left(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].left
    }

    pub fn right(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].right
    }

    /// Where an already-placed node sits relative to its referrer.
    pub fn placement_of(&self, id: NodeId) -> Placement {
        let node = &self.nodes[id];
        let Some(parent) = node.parent else {
            return Placement::Root;
        };

        let side = if self.nodes[parent].left == Some(id) {
            Side::Left
        } else {
            Side::Right
        };
        let referrer_depth = self
            .find_by_referral_code(&node.user.referred_by)
            .map(|r| self.nodes[r].depth)
            .unwrap_or(0);

        Placement::Child {
            parent_id: self.nodes[parent].user.id,
            side,
            depth_below_referrer: node.depth.saturating_sub(referrer_depth),
        }
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
