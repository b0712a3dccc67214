use std::collections::VecDeque;

use crate::{
    alphabet::{Alphabet, SymbolOf},
    dfa::Dfa,
    math,
    show::Show,
    tree::{DiscriminationTree, NodeId},
    word::FiniteWord,
};
use tracing::warn;

/// Handle of a state in a [`Hypothesis`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub(crate) usize);

impl std::fmt::Debug for StateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "q{}", self.0)
    }
}

impl Show for StateId {
    fn show(&self) -> String {
        format!("q{}", self.0)
    }
}

/// A transition of the hypothesis. Tree transitions form a spanning tree of
/// the state set and point directly at their target state; the access
/// sequence of that state is exactly the word routing through the
/// transition. Every other transition is non-tree and refers to a node of
/// the discrimination tree instead; its target state is whatever state the
/// node resolves to once it has been sifted down to an occupied leaf.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Transition {
    Tree(StateId),
    NonTree(NodeId),
}

#[derive(Clone, Debug)]
struct State<S> {
    access: Vec<S>,
    node: NodeId,
    transitions: math::Map<S, Transition>,
}

/// The hypothesis automaton under construction. States are allocated in an
/// arena and never destroyed; each is represented by a leaf of the
/// discrimination tree and reached from the start state by its unique
/// access sequence along tree transitions.
#[derive(Clone, Debug)]
pub struct Hypothesis<A: Alphabet> {
    alphabet: A,
    states: Vec<State<SymbolOf<A>>>,
    finals: math::Set<StateId>,
    /// Worklist of transitions that still need closing: their target node
    /// is either an inner node or a vacant leaf.
    open: VecDeque<(StateId, SymbolOf<A>)>,
}

impl<A: Alphabet> Hypothesis<A> {
    pub fn new(alphabet: A) -> Self {
        Self {
            alphabet,
            states: Vec::new(),
            finals: math::Set::default(),
            open: VecDeque::new(),
        }
    }

    pub fn alphabet(&self) -> &A {
        &self.alphabet
    }

    /// The number of states.
    pub fn size(&self) -> usize {
        self.states.len()
    }

    /// The start state. The first state that was added.
    pub fn initial(&self) -> StateId {
        assert!(!self.states.is_empty(), "hypothesis has no states yet");
        StateId(0)
    }

    pub fn state_ids(&self) -> impl Iterator<Item = StateId> {
        (0..self.states.len()).map(StateId)
    }

    /// Allocates a fresh state with the given access sequence, represented
    /// by the given leaf. All its transitions start out non-tree, pointing
    /// at the root of the discrimination tree, and are enqueued for
    /// closing. The caller is responsible for the reverse leaf-to-state
    /// link and the root's incoming bookkeeping.
    pub fn add_state(&mut self, access: Vec<SymbolOf<A>>, node: NodeId, dt_root: NodeId) -> StateId {
        let id = StateId(self.states.len());
        let transitions = self
            .alphabet
            .universe()
            .map(|sym| (sym, Transition::NonTree(dt_root)))
            .collect();
        self.states.push(State {
            access,
            node,
            transitions,
        });
        for sym in self.alphabet.universe() {
            self.open.push_back((id, sym));
        }
        id
    }

    fn state(&self, id: StateId) -> &State<SymbolOf<A>> {
        self.states
            .get(id.0)
            .unwrap_or_else(|| panic!("state {} does not exist", id.show()))
    }

    /// The access sequence of a state: the unique word reaching it from the
    /// start along tree transitions.
    pub fn access(&self, id: StateId) -> &[SymbolOf<A>] {
        &self.state(id).access
    }

    /// The leaf of the discrimination tree representing this state.
    pub fn node_of(&self, id: StateId) -> NodeId {
        self.state(id).node
    }

    pub(crate) fn set_node(&mut self, id: StateId, node: NodeId) {
        self.states[id.0].node = node;
    }

    /// The canonical word routing through the transition of `state` on
    /// `symbol`: the state's access sequence extended by the symbol.
    pub fn transition_word(&self, state: StateId, symbol: SymbolOf<A>) -> Vec<SymbolOf<A>> {
        let mut word = self.state(state).access.clone();
        word.push(symbol);
        word
    }

    pub fn transition(&self, state: StateId, symbol: SymbolOf<A>) -> Transition {
        *self
            .state(state)
            .transitions
            .get(&symbol)
            .unwrap_or_else(|| panic!("symbol {} is not in the alphabet", symbol.show()))
    }

    pub(crate) fn set_transition(
        &mut self,
        state: StateId,
        symbol: SymbolOf<A>,
        transition: Transition,
    ) {
        *self.states[state.0]
            .transitions
            .get_mut(&symbol)
            .unwrap_or_else(|| panic!("symbol {} is not in the alphabet", symbol.show())) =
            transition;
    }

    /// Marks the given state as accepting. Panics if it does not exist.
    pub fn make_final(&mut self, state: StateId) {
        assert!(
            state.0 < self.states.len(),
            "cannot make unknown state {} final",
            state.show()
        );
        self.finals.insert(state);
    }

    pub fn is_final(&self, state: StateId) -> bool {
        self.finals.contains(&state)
    }

    pub(crate) fn enqueue_open(&mut self, state: StateId, symbol: SymbolOf<A>) {
        self.open.push_back((state, symbol));
    }

    pub(crate) fn pop_open(&mut self) -> Option<(StateId, SymbolOf<A>)> {
        self.open.pop_front()
    }

    pub fn open_transitions(&self) -> impl Iterator<Item = (StateId, SymbolOf<A>)> + '_ {
        self.open.iter().copied()
    }

    /// Resolves the target state of a transition without issuing queries:
    /// tree transitions resolve directly, non-tree transitions resolve if
    /// their target node is an occupied leaf. An unresolvable transition is
    /// open and must be closed first.
    pub fn resolve(
        &self,
        tree: &DiscriminationTree<SymbolOf<A>>,
        state: StateId,
        symbol: SymbolOf<A>,
    ) -> Option<StateId> {
        match self.transition(state, symbol) {
            Transition::Tree(target) => Some(target),
            Transition::NonTree(node) => tree.state_of(node),
        }
    }

    /// Runs the automaton on `word` from the start state. Every transition
    /// on the way must resolve to a state; encountering an open transition
    /// means the caller forgot to close the hypothesis and panics.
    pub fn run<W: FiniteWord<Symbol = SymbolOf<A>>>(
        &self,
        tree: &DiscriminationTree<SymbolOf<A>>,
        word: W,
    ) -> StateId {
        let mut current = self.initial();
        for sym in word.symbols() {
            current = self.resolve(tree, current, sym).unwrap_or_else(|| {
                panic!(
                    "run crossed the open transition ({}, {}); close the hypothesis first",
                    current.show(),
                    sym.show()
                )
            });
        }
        current
    }

    /// Whether `word` is accepted by the hypothesis. Same preconditions as
    /// [`Hypothesis::run`].
    pub fn evaluate<W: FiniteWord<Symbol = SymbolOf<A>>>(
        &self,
        tree: &DiscriminationTree<SymbolOf<A>>,
        word: W,
    ) -> bool {
        self.is_final(self.run(tree, word))
    }

    /// Snapshots the hypothesis into a plain [`Dfa`]. State ids are the
    /// arena indices, so the start state becomes 0. Unresolved transitions
    /// are routed into a rejecting sink; after closing there never are any,
    /// so a stable hypothesis snapshots without a sink.
    pub fn to_dfa(&self, tree: &DiscriminationTree<SymbolOf<A>>) -> Dfa<A> {
        let mut accepting = (0..self.states.len())
            .map(|q| self.finals.contains(&StateId(q)))
            .collect::<Vec<_>>();
        let mut sink = None;
        let mut edges: Vec<math::Map<SymbolOf<A>, usize>> = Vec::with_capacity(self.states.len());
        for q in self.state_ids() {
            let mut row = math::Map::default();
            for sym in self.alphabet.universe() {
                let target = match self.resolve(tree, q, sym) {
                    Some(p) => p.0,
                    None => {
                        warn!(
                            "snapshot of an unstable hypothesis, ({}, {}) leads to a sink",
                            q.show(),
                            sym.show()
                        );
                        *sink.get_or_insert(self.states.len())
                    }
                };
                row.insert(sym, target);
            }
            edges.push(row);
        }
        if let Some(sink) = sink {
            accepting.push(false);
            edges.push(self.alphabet.universe().map(|sym| (sym, sink)).collect());
        }
        Dfa::from_parts(self.alphabet.clone(), 0, accepting, edges)
    }
}

#[cfg(test)]
mod tests {
    use super::{Hypothesis, StateId, Transition};
    use crate::{alphabet::CharAlphabet, tree::DiscriminationTree};

    fn singleton() -> (DiscriminationTree<char>, Hypothesis<CharAlphabet>) {
        let mut tree = DiscriminationTree::new();
        let mut hypothesis = Hypothesis::new(CharAlphabet::of_size(2));
        let leaf = tree.child(tree.root(), false);
        let q0 = hypothesis.add_state(vec![], leaf, tree.root());
        tree.link(leaf, q0);
        (tree, hypothesis)
    }

    #[test]
    fn fresh_state_has_open_transitions() {
        let (_tree, hypothesis) = singleton();
        assert_eq!(hypothesis.size(), 1);
        assert_eq!(
            hypothesis.open_transitions().collect::<Vec<_>>(),
            vec![(StateId(0), 'a'), (StateId(0), 'b')]
        );
        assert_eq!(hypothesis.transition_word(StateId(0), 'b'), vec!['b']);
    }

    #[test]
    fn run_follows_closed_transitions() {
        let (tree, mut hypothesis) = singleton();
        let q0 = hypothesis.initial();
        // close both transitions as self loops onto the occupied leaf
        hypothesis.set_transition(q0, 'a', Transition::NonTree(hypothesis.node_of(q0)));
        hypothesis.set_transition(q0, 'b', Transition::NonTree(hypothesis.node_of(q0)));
        assert_eq!(hypothesis.run(&tree, "abba"), q0);
        assert!(!hypothesis.evaluate(&tree, "abba"));
    }

    #[test]
    #[should_panic(expected = "open transition")]
    fn run_across_an_open_transition_panics() {
        let (tree, hypothesis) = singleton();
        hypothesis.run(&tree, "a");
    }

    #[test]
    #[should_panic(expected = "unknown state")]
    fn finalizing_an_unknown_state_panics() {
        let (_tree, mut hypothesis) = singleton();
        hypothesis.make_final(StateId(7));
    }

    #[test]
    fn snapshot_routes_open_transitions_to_a_sink() {
        let (tree, hypothesis) = singleton();
        let dfa = hypothesis.to_dfa(&tree);
        assert_eq!(dfa.size(), 2);
        assert!(!dfa.accepts("a"));
        assert_eq!(dfa.reached("ab"), 1);
    }
}
