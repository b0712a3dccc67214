use crate::{
    alphabet::Symbol, error::LearningError, hypothesis::StateId, math, show::Show,
    word::FiniteWord,
};

/// Handle of a node in a [`DiscriminationTree`]. Handles are stable for the
/// whole lifetime of the tree: a leaf that gets split keeps its handle and
/// merely changes its data to an inner node, so transitions pointing at it
/// stay valid.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl std::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl Show for NodeId {
    fn show(&self) -> String {
        format!("n{}", self.0)
    }
}

/// What a node is at the moment: a leaf optionally holding the state it
/// represents, or an inner node labeled with a discriminator. The `false`
/// child of an inner node collects everything whose membership outcome on
/// the discriminator is negative, the `true` child the rest.
#[derive(Clone, Debug)]
pub enum NodeData<S: Symbol> {
    Leaf {
        state: Option<StateId>,
    },
    Inner {
        discriminator: Vec<S>,
        children: [NodeId; 2],
        temporary: bool,
    },
}

#[derive(Clone, Debug)]
struct Node<S: Symbol> {
    parent: Option<NodeId>,
    data: NodeData<S>,
    /// Non-tree transitions currently targeting this node, as pairs of
    /// source state and input symbol.
    incoming: math::Set<(StateId, S)>,
}

/// The discrimination tree: a binary tree whose inner nodes carry
/// distinguishing suffixes and whose leaves stand for the states of the
/// hypothesis. All state-separating knowledge the learner has lives here.
///
/// The tree itself is purely structural, it never talks to the oracle.
/// Classification outcomes are computed by the caller and passed in, which
/// keeps every operation in this module infallible and query-free.
#[derive(Clone, Debug)]
pub struct DiscriminationTree<S: Symbol> {
    nodes: Vec<Node<S>>,
    root: NodeId,
}

impl<S: Symbol> Default for DiscriminationTree<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Symbol> DiscriminationTree<S> {
    /// Creates the initial tree: a root labeled with the empty discriminator
    /// whose two children are vacant leaves. Everything to the `true` side
    /// of the root is accepting, which is what makes the empty-discriminator
    /// root an invariant rather than a convention.
    pub fn new() -> Self {
        let mut tree = Self {
            nodes: Vec::with_capacity(3),
            root: NodeId(0),
        };
        let root = tree.alloc(None, NodeData::Leaf { state: None });
        let reject = tree.alloc(Some(root), NodeData::Leaf { state: None });
        let accept = tree.alloc(Some(root), NodeData::Leaf { state: None });
        tree.nodes[root.0].data = NodeData::Inner {
            discriminator: Vec::new(),
            children: [reject, accept],
            temporary: false,
        };
        tree
    }

    fn alloc(&mut self, parent: Option<NodeId>, data: NodeData<S>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent,
            data,
            incoming: math::Set::default(),
        });
        id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn is_leaf(&self, node: NodeId) -> bool {
        matches!(self.nodes[node.0].data, NodeData::Leaf { .. })
    }

    pub fn is_temporary(&self, node: NodeId) -> bool {
        matches!(
            self.nodes[node.0].data,
            NodeData::Inner {
                temporary: true,
                ..
            }
        )
    }

    /// The discriminator of an inner node, `None` for leaves.
    pub fn discriminator(&self, node: NodeId) -> Option<&[S]> {
        match &self.nodes[node.0].data {
            NodeData::Inner { discriminator, .. } => Some(discriminator),
            NodeData::Leaf { .. } => None,
        }
    }

    pub fn children(&self, node: NodeId) -> Option<[NodeId; 2]> {
        match self.nodes[node.0].data {
            NodeData::Inner { children, .. } => Some(children),
            NodeData::Leaf { .. } => None,
        }
    }

    /// The child of an inner node for the given membership outcome.
    pub fn child(&self, node: NodeId, outcome: bool) -> NodeId {
        self.children(node).expect("only inner nodes have children")[outcome as usize]
    }

    /// The state represented by a leaf, if any. Inner nodes represent none.
    pub fn state_of(&self, node: NodeId) -> Option<StateId> {
        match self.nodes[node.0].data {
            NodeData::Leaf { state } => state,
            NodeData::Inner { .. } => None,
        }
    }

    /// Associates `state` with the given vacant leaf. A state is placed in
    /// exactly one leaf and never moves to a different one; relinking is a
    /// bug and panics.
    pub fn link(&mut self, leaf: NodeId, state: StateId) {
        match &mut self.nodes[leaf.0].data {
            NodeData::Leaf { state: slot @ None } => *slot = Some(state),
            NodeData::Leaf { state: Some(occupant) } => panic!(
                "cannot place q{} in {leaf:?}, it already represents q{}",
                state.0, occupant.0
            ),
            NodeData::Inner { .. } => panic!("cannot place a state in inner node {leaf:?}"),
        }
    }

    pub fn incoming(&self, node: NodeId) -> &math::Set<(StateId, S)> {
        &self.nodes[node.0].incoming
    }

    pub fn add_incoming(&mut self, node: NodeId, transition: (StateId, S)) {
        self.nodes[node.0].incoming.insert(transition);
    }

    pub fn remove_incoming(&mut self, node: NodeId, transition: &(StateId, S)) {
        self.nodes[node.0].incoming.shift_remove(transition);
    }

    /// Reroutes the bookkeeping of a non-tree transition from one node to
    /// another, typically after sifting it further down.
    pub fn move_incoming(&mut self, from: NodeId, to: NodeId, transition: (StateId, S)) {
        self.nodes[from.0].incoming.shift_remove(&transition);
        self.nodes[to.0].incoming.insert(transition);
    }

    /// Turns the given occupied leaf into a temporary inner node labeled
    /// `discriminator` with two fresh leaves below it. The leaf's state is
    /// re-placed in the child given by `state_outcome`, its membership
    /// outcome on the new discriminator. The handle of the split leaf stays
    /// valid and now names the inner node, so incoming transitions keep
    /// pointing at the right spot in the tree.
    ///
    /// Returns the pair of children, `false` side first.
    pub fn split_leaf(
        &mut self,
        leaf: NodeId,
        discriminator: Vec<S>,
        state_outcome: bool,
    ) -> [NodeId; 2] {
        let state = match self.nodes[leaf.0].data {
            NodeData::Leaf { state } => state.expect("can only split an occupied leaf"),
            NodeData::Inner { .. } => panic!("cannot split inner node {leaf:?}"),
        };
        let children = [
            self.alloc(Some(leaf), NodeData::Leaf { state: None }),
            self.alloc(Some(leaf), NodeData::Leaf { state: None }),
        ];
        self.nodes[children[state_outcome as usize].0].data = NodeData::Leaf {
            state: Some(state),
        };
        self.nodes[leaf.0].data = NodeData::Inner {
            discriminator,
            children,
            temporary: true,
        };
        children
    }

    /// The signature of a node: the discriminators on the path up to the
    /// root, each paired with the branch the path takes, most specific
    /// entry first. The pair with the empty discriminator encodes whether
    /// the node lies on the accepting side of the root.
    pub fn signature(&self, node: NodeId) -> Vec<(Vec<S>, bool)> {
        let mut signature = Vec::new();
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            let NodeData::Inner {
                discriminator,
                children,
                ..
            } = &self.nodes[parent.0].data
            else {
                unreachable!("parents are inner nodes")
            };
            signature.push((discriminator.clone(), children[1] == current));
            current = parent;
        }
        signature
    }

    /// Which child of `ancestor` the subtree containing `descendant` hangs
    /// off, or `None` if `ancestor` is not a proper ancestor.
    pub fn branch_at(&self, ancestor: NodeId, descendant: NodeId) -> Option<bool> {
        let mut current = descendant;
        while let Some(parent) = self.parent(current) {
            if parent == ancestor {
                let children = self.children(parent)?;
                return Some(children[1] == current);
            }
            current = parent;
        }
        None
    }

    /// Whether the given node lies on the accepting side of the root. The
    /// root's discriminator is the empty word by construction, so this is
    /// exactly the acceptance of the access sequence of any state below.
    pub fn accepting_branch(&self, node: NodeId) -> bool {
        debug_assert!(
            self.discriminator(self.root)
                .is_some_and(|d| d.is_empty()),
            "the root must carry the empty discriminator"
        );
        self.branch_at(self.root, node)
            .expect("every node except the root lies below it")
    }

    fn depth(&self, node: NodeId) -> usize {
        let mut depth = 0;
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            depth += 1;
            current = parent;
        }
        depth
    }

    /// The lowest common ancestor of a non-empty set of nodes.
    pub fn lca<I: IntoIterator<Item = NodeId>>(&self, nodes: I) -> NodeId {
        let mut iter = nodes.into_iter();
        let first = iter.next().expect("lca of an empty set of nodes");
        iter.fold(first, |a, b| self.lca_pair(a, b))
    }

    fn lca_pair(&self, mut a: NodeId, mut b: NodeId) -> NodeId {
        let (mut depth_a, mut depth_b) = (self.depth(a), self.depth(b));
        while depth_a > depth_b {
            a = self.parent(a).expect("depth accounted for");
            depth_a -= 1;
        }
        while depth_b > depth_a {
            b = self.parent(b).expect("depth accounted for");
            depth_b -= 1;
        }
        while a != b {
            a = self.parent(a).expect("nodes of one tree share an ancestor");
            b = self.parent(b).expect("nodes of one tree share an ancestor");
        }
        a
    }

    /// All leaves in the subtree of `node`, left to right.
    pub fn leaves_below(&self, node: NodeId) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            match self.nodes[current.0].data {
                NodeData::Leaf { .. } => leaves.push(current),
                NodeData::Inner { children, .. } => {
                    stack.push(children[1]);
                    stack.push(children[0]);
                }
            }
        }
        leaves
    }

    /// The roots of all blocks: maximal subtrees consisting entirely of
    /// temporary inner nodes. A block root is a temporary node whose parent
    /// is finalized; finalized nodes never occur below temporary ones.
    pub fn block_roots(&self) -> Vec<NodeId> {
        let mut roots = Vec::new();
        let mut stack = vec![self.root];
        while let Some(current) = stack.pop() {
            match self.nodes[current.0].data {
                NodeData::Leaf { .. } => {}
                NodeData::Inner {
                    children,
                    temporary,
                    ..
                } => {
                    if temporary {
                        roots.push(current);
                    } else {
                        stack.push(children[1]);
                        stack.push(children[0]);
                    }
                }
            }
        }
        roots
    }

    pub fn has_temporary(&self) -> bool {
        !self.block_roots().is_empty()
    }

    /// Replaces the root of a block by a finalized inner node labeled
    /// `discriminator`. The block's leaves are redistributed according to
    /// `outcome`, their membership outcome on the new discriminator; the
    /// remaining temporary discriminators are kept on both sides wherever
    /// they still separate two leaves and silently dropped where they do
    /// not. Leaf handles survive, the apex keeps its handle, parent and
    /// incoming set, and interior nodes of the old block are abandoned.
    pub fn replace_block_root(
        &mut self,
        apex: NodeId,
        discriminator: Vec<S>,
        outcome: &math::Map<NodeId, bool>,
    ) -> Result<(), LearningError<S>> {
        debug_assert!(self.is_temporary(apex), "can only finalize a block root");
        let low = self.extract_side(apex, false, outcome)?;
        let high = self.extract_side(apex, true, outcome)?;
        let (Some(low), Some(high)) = (low, high) else {
            return Err(LearningError::InvariantViolation {
                reason: format!(
                    "discriminator {} does not split the block at {apex:?}",
                    discriminator.as_string()
                ),
            });
        };
        self.nodes[low.0].parent = Some(apex);
        self.nodes[high.0].parent = Some(apex);
        self.nodes[apex.0].data = NodeData::Inner {
            discriminator,
            children: [low, high],
            temporary: false,
        };
        Ok(())
    }

    /// Rebuilds the part of a block that falls on one side of a new
    /// discriminator. Leaves are reused, inner nodes are re-allocated when
    /// both of their restricted children survive and elided otherwise.
    fn extract_side(
        &mut self,
        node: NodeId,
        side: bool,
        outcome: &math::Map<NodeId, bool>,
    ) -> Result<Option<NodeId>, LearningError<S>> {
        let data = self.nodes[node.0].data.clone();
        match data {
            NodeData::Leaf { .. } => match outcome.get(&node) {
                Some(leaf_side) => Ok((*leaf_side == side).then_some(node)),
                None => Err(LearningError::InvariantViolation {
                    reason: format!("no outcome was computed for block leaf {node:?}"),
                }),
            },
            NodeData::Inner {
                discriminator,
                children,
                temporary,
            } => {
                debug_assert!(temporary, "finalized node {node:?} inside a block");
                let low = self.extract_side(children[0], side, outcome)?;
                let high = self.extract_side(children[1], side, outcome)?;
                Ok(match (low, high) {
                    (None, None) => None,
                    (Some(single), None) | (None, Some(single)) => Some(single),
                    (Some(low), Some(high)) => {
                        let copy = self.alloc(
                            None,
                            NodeData::Inner {
                                discriminator,
                                children: [low, high],
                                temporary: true,
                            },
                        );
                        self.nodes[low.0].parent = Some(copy);
                        self.nodes[high.0].parent = Some(copy);
                        Some(copy)
                    }
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DiscriminationTree;
    use crate::{hypothesis::StateId, math};

    #[test]
    fn fresh_tree_has_empty_root_discriminator() {
        let tree: DiscriminationTree<char> = DiscriminationTree::new();
        assert_eq!(tree.discriminator(tree.root()), Some(&[] as &[char]));
        assert!(!tree.has_temporary());
        assert!(tree.accepting_branch(tree.child(tree.root(), true)));
        assert!(!tree.accepting_branch(tree.child(tree.root(), false)));
    }

    #[test]
    fn split_keeps_the_handle_and_moves_the_state() {
        let mut tree: DiscriminationTree<char> = DiscriminationTree::new();
        let leaf = tree.child(tree.root(), false);
        tree.link(leaf, StateId(0));

        let [low, high] = tree.split_leaf(leaf, vec!['a'], true);
        assert!(!tree.is_leaf(leaf));
        assert!(tree.is_temporary(leaf));
        assert_eq!(tree.state_of(high), Some(StateId(0)));
        assert_eq!(tree.state_of(low), None);
        assert_eq!(tree.parent(low), Some(leaf));

        let signature = tree.signature(high);
        assert_eq!(signature[0], (vec!['a'], true));
        assert_eq!(signature[1], (vec![], false));
    }

    #[test]
    #[should_panic]
    fn relinking_a_leaf_is_rejected() {
        let mut tree: DiscriminationTree<char> = DiscriminationTree::new();
        let leaf = tree.child(tree.root(), false);
        tree.link(leaf, StateId(0));
        tree.link(leaf, StateId(1));
    }

    #[test]
    fn lowest_common_ancestors() {
        let mut tree: DiscriminationTree<char> = DiscriminationTree::new();
        let leaf = tree.child(tree.root(), false);
        tree.link(leaf, StateId(0));
        let [low, high] = tree.split_leaf(leaf, vec!['a'], false);
        let accept = tree.child(tree.root(), true);

        assert_eq!(tree.lca([low, high]), leaf);
        assert_eq!(tree.lca([low, accept]), tree.root());
        assert_eq!(tree.lca([high]), high);
    }

    #[test]
    fn blocks_and_finalization() {
        let mut tree: DiscriminationTree<char> = DiscriminationTree::new();
        let leaf = tree.child(tree.root(), false);
        tree.link(leaf, StateId(0));

        // two stacked temporary splits form a single block rooted at `leaf`
        let [low, high] = tree.split_leaf(leaf, vec!['a', 'a'], false);
        tree.link(high, StateId(1));
        let [_inner_low, inner_high] = tree.split_leaf(low, vec!['a'], false);
        tree.link(inner_high, StateId(2));

        assert_eq!(tree.block_roots(), vec![leaf]);
        let leaves = tree.leaves_below(leaf);
        assert_eq!(
            leaves.iter().map(|l| tree.state_of(*l)).collect::<Vec<_>>(),
            vec![Some(StateId(0)), Some(StateId(2)), Some(StateId(1))]
        );

        // finalize with a discriminator separating {0} from {1, 2}
        let outcome: math::Map<_, _> = leaves
            .iter()
            .map(|l| (*l, tree.state_of(*l) != Some(StateId(0))))
            .collect();
        tree.replace_block_root(leaf, vec!['b'], &outcome).unwrap();

        assert!(!tree.is_temporary(leaf));
        assert_eq!(tree.discriminator(leaf), Some(&['b'] as &[char]));
        // the false side collapsed to the single leaf of state 0
        let low_side = tree.child(leaf, false);
        assert_eq!(tree.state_of(low_side), Some(StateId(0)));
        // the true side kept the temporary discriminator "aa" separating 2 from 1
        let high_side = tree.child(leaf, true);
        assert!(tree.is_temporary(high_side));
        assert_eq!(tree.discriminator(high_side), Some(&['a', 'a'] as &[char]));
        assert_eq!(tree.block_roots(), vec![high_side]);
        assert_eq!(
            tree.leaves_below(high_side)
                .iter()
                .map(|l| tree.state_of(*l))
                .collect::<Vec<_>>(),
            vec![Some(StateId(2)), Some(StateId(1))]
        );
    }
}
