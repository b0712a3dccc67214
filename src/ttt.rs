use std::{cell::RefCell, fmt::Debug, time::Instant};

use itertools::Itertools;
use tracing::{debug, info, trace, warn};

use crate::{
    alphabet::{Alphabet, SymbolOf},
    dfa::Dfa,
    error::LearningError,
    hypothesis::{Hypothesis, StateId, Transition},
    math,
    oracle::Oracle,
    show::Show,
    tree::{DiscriminationTree, NodeId},
    word::{Concat, FiniteWord},
};

const ITERATION_THRESHOLD: usize = if cfg!(debug_assertions) { 50 } else { 200000 };

type Sym<O> = SymbolOf<<O as Oracle>::Alphabet>;

/// How counterexamples are decomposed into a prefix, a symbol and a
/// distinguishing suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RsSearch {
    /// Binary search over the prefix length, using logarithmically many
    /// membership queries.
    #[default]
    Eager,
    /// Scan prefix lengths from the front. Linearly many queries, mainly
    /// useful for debugging the eager variant.
    Linear,
}

/// Tunables of the learner. The defaults are what you want unless you are
/// investigating the algorithm itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TttConfig {
    pub rs_search: RsSearch,
    /// Whether temporary discriminators are finalized after every processed
    /// counterexample. Turning this off trades tree depth for fewer
    /// membership queries per round.
    pub finalize_after_counterexample: bool,
    /// Upper bound on the number of membership queries posed to the oracle.
    /// `None` means unbounded.
    pub query_limit: Option<usize>,
}

impl Default for TttConfig {
    fn default() -> Self {
        Self {
            rs_search: RsSearch::default(),
            finalize_after_counterexample: true,
            query_limit: None,
        }
    }
}

/// Counters for the queries posed so far. Cached membership answers are
/// counted as hits and never reach the oracle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub membership_queries: usize,
    pub equivalence_queries: usize,
    pub cache_hits: usize,
}

/// An implementation of the TTT algorithm for learning a minimal DFA from a
/// minimally adequate teacher.
///
/// The learner maintains a [`DiscriminationTree`] holding all
/// state-separating suffixes and a [`Hypothesis`] automaton whose spanning
/// tree mirrors the access sequences of the discovered states. Processing a
/// counterexample splits one leaf with a temporary discriminator; closing
/// re-sifts the affected transitions and materializes new states;
/// finalization then shortens the temporary discriminators block by block
/// until the tree is final again.
pub struct Ttt<O: Oracle> {
    // the alphabet of what we are learning
    alphabet: O::Alphabet,
    oracle: O,
    tree: DiscriminationTree<Sym<O>>,
    hypothesis: Hypothesis<O::Alphabet>,
    // all membership queries posed so far, together with their answer
    queries: RefCell<math::OrderedMap<Vec<Sym<O>>, bool>>,
    stats: RefCell<Statistics>,
    config: TttConfig,
}

impl<O: Oracle> Ttt<O> {
    pub fn new(alphabet: O::Alphabet, oracle: O) -> Self {
        Self::with_config(alphabet, oracle, TttConfig::default())
    }

    pub fn with_config(alphabet: O::Alphabet, oracle: O, config: TttConfig) -> Self {
        Self {
            tree: DiscriminationTree::new(),
            hypothesis: Hypothesis::new(alphabet.clone()),
            queries: RefCell::new(math::OrderedMap::default()),
            stats: RefCell::new(Statistics::default()),
            alphabet,
            oracle,
            config,
        }
    }

    pub fn statistics(&self) -> Statistics {
        *self.stats.borrow()
    }

    /// Runs the main loop: pose an equivalence query, decompose the
    /// counterexample, split, close and finalize, until the oracle is
    /// satisfied. Returns the learned automaton, which recognizes exactly
    /// the target language and is minimal.
    pub fn infer(&mut self) -> Result<Dfa<O::Alphabet>, LearningError<Sym<O>>> {
        let start = Instant::now();
        self.initialize()?;
        let threshold: usize = std::env::var("MAX_ITERATIONS")
            .unwrap_or(format!("{ITERATION_THRESHOLD}"))
            .parse()
            .unwrap();

        let mut iteration = 0;
        while iteration < threshold {
            iteration += 1;
            self.check_invariants()?;

            let hypothesis = self.hypothesis.to_dfa(&self.tree);
            self.stats.borrow_mut().equivalence_queries += 1;
            let Err(counterexample) = self.oracle.equivalence(&hypothesis) else {
                let duration = start.elapsed().as_millis();
                info!(
                    "learned an automaton with {} states after {iteration} equivalence queries in {duration}ms",
                    hypothesis.size()
                );
                return Ok(hypothesis);
            };

            trace!(
                "iteration {iteration}, processing counterexample {}",
                counterexample.as_string()
            );
            let index = self.decompose(&counterexample)?;
            self.split_at(&counterexample, index)?;
            self.close_transitions()?;
            if self.config.finalize_after_counterexample {
                self.finalize_blocks()?;
            }
        }

        panic!("Iteration threshold exceeded!")
    }

    /// Re-poses every membership query answered so far and reports the
    /// first word the oracle now answers differently. A sound oracle makes
    /// this a no-op; a non-deterministic one is caught red-handed. This
    /// audit runs as part of the invariant check before every equivalence
    /// query; it is public so that callers can also audit a finished run.
    /// The re-posed queries bypass the cache and are not counted.
    pub fn verify_consistency(&self) -> Result<(), LearningError<Sym<O>>> {
        for (word, answer) in self.queries.borrow().iter() {
            let fresh = self.oracle.membership(word);
            if fresh != *answer {
                return Err(LearningError::InconsistentTeacher {
                    word: word.clone(),
                    first: *answer,
                    second: fresh,
                });
            }
        }
        Ok(())
    }

    /// Runs the hypothesis on `word`, sifting the target node of any
    /// still-open transition encountered on the way as far down as the
    /// current discriminators allow. This advances `target_node` pointers
    /// but never materializes states or closes transitions; a transition
    /// whose leaf is still vacant cannot be crossed, so the driver closes
    /// the hypothesis before any run.
    pub fn run_non_deterministic<W: FiniteWord<Symbol = Sym<O>>>(
        &mut self,
        word: W,
    ) -> Result<StateId, LearningError<Sym<O>>> {
        let mut current = self.hypothesis.initial();
        for sym in word.symbols() {
            current = match self.hypothesis.transition(current, sym) {
                Transition::Tree(target) => target,
                Transition::NonTree(node) => {
                    let aseq = self.hypothesis.transition_word(current, sym);
                    let leaf = self.sift_from(node, &aseq)?;
                    if leaf != node {
                        self.tree.move_incoming(node, leaf, (current, sym));
                        self.hypothesis
                            .set_transition(current, sym, Transition::NonTree(leaf));
                    }
                    self.tree.state_of(leaf).unwrap_or_else(|| {
                        panic!(
                            "({}, {}) leads to the unmaterialized leaf {leaf:?}; close the hypothesis first",
                            current.show(),
                            sym.show()
                        )
                    })
                }
            };
        }
        Ok(current)
    }

    /// Like [`Ttt::run_non_deterministic`], returning whether the reached
    /// state is accepting.
    pub fn evaluate_non_deterministic<W: FiniteWord<Symbol = Sym<O>>>(
        &mut self,
        word: W,
    ) -> Result<bool, LearningError<Sym<O>>> {
        let state = self.run_non_deterministic(word)?;
        Ok(self.hypothesis.is_final(state))
    }

    /// Answers a membership query through the cache. Only cache misses
    /// reach the oracle and count against the query budget.
    fn membership<W: FiniteWord<Symbol = Sym<O>>>(
        &self,
        word: W,
    ) -> Result<bool, LearningError<Sym<O>>> {
        let word = word.collect_vec();
        if let Some(answer) = self.queries.borrow().get(&word) {
            self.stats.borrow_mut().cache_hits += 1;
            return Ok(*answer);
        }
        if let Some(limit) = self.config.query_limit {
            if self.stats.borrow().membership_queries >= limit {
                return Err(LearningError::QueryLimitExceeded { limit });
            }
        }
        let answer = self.oracle.membership(&word);
        self.stats.borrow_mut().membership_queries += 1;
        trace!("membership of {} is {}", word.as_string(), answer.show());
        self.queries.borrow_mut().insert(word, answer);
        Ok(answer)
    }

    /// Sifts `word` from `origin` down to a leaf: at every inner node the
    /// membership outcome of `word` extended by the node's discriminator
    /// decides the branch. One query per level, served from the cache where
    /// the descent retraces an earlier one.
    fn sift_from(
        &self,
        origin: NodeId,
        word: &[Sym<O>],
    ) -> Result<NodeId, LearningError<Sym<O>>> {
        let mut current = origin;
        while let Some(discriminator) = self.tree.discriminator(current) {
            let outcome = self.membership(Concat(word, discriminator))?;
            current = self.tree.child(current, outcome);
        }
        Ok(current)
    }

    /// Sets up the one-state hypothesis: the start state with the empty
    /// access sequence is placed on whichever side of the root matches the
    /// acceptance of the empty word, then its transitions are closed.
    fn initialize(&mut self) -> Result<(), LearningError<Sym<O>>> {
        if self.hypothesis.size() > 0 {
            return Ok(());
        }
        let accepted = self.membership(Vec::<Sym<O>>::new())?;
        let leaf = self.tree.child(self.tree.root(), accepted);
        let initial = self.hypothesis.add_state(Vec::new(), leaf, self.tree.root());
        self.tree.link(leaf, initial);
        for sym in self.alphabet.universe() {
            self.tree.add_incoming(self.tree.root(), (initial, sym));
        }
        if accepted {
            self.hypothesis.make_final(initial);
        }
        debug!(
            "initialized with a single {} state",
            if accepted { "accepting" } else { "rejecting" }
        );
        self.close_transitions()
    }

    /// Works the open-transition list down to a fixpoint. Every popped
    /// transition is sifted from its current target node to a leaf. A
    /// vacant leaf materializes a fresh state whose access sequence is the
    /// word routing through the transition, and the transition becomes the
    /// state's unique incoming tree transition; an occupied leaf leaves the
    /// transition non-tree with its pointer advanced.
    fn close_transitions(&mut self) -> Result<(), LearningError<Sym<O>>> {
        while let Some((state, symbol)) = self.hypothesis.pop_open() {
            let Transition::NonTree(origin) = self.hypothesis.transition(state, symbol) else {
                continue;
            };
            let word = self.hypothesis.transition_word(state, symbol);
            let leaf = self.sift_from(origin, &word)?;
            if leaf != origin {
                self.tree.move_incoming(origin, leaf, (state, symbol));
                self.hypothesis
                    .set_transition(state, symbol, Transition::NonTree(leaf));
            }
            if let Some(target) = self.tree.state_of(leaf) {
                trace!(
                    "({}, {}) stays non-tree at {}",
                    state.show(),
                    symbol.show(),
                    target.show()
                );
                continue;
            }

            let target = self.hypothesis.add_state(word, leaf, self.tree.root());
            self.tree.link(leaf, target);
            for sym in self.alphabet.universe() {
                self.tree.add_incoming(self.tree.root(), (target, sym));
            }
            if self.tree.accepting_branch(leaf) {
                self.hypothesis.make_final(target);
            }
            self.tree.remove_incoming(leaf, &(state, symbol));
            self.hypothesis
                .set_transition(state, symbol, Transition::Tree(target));
            debug!(
                "materialized {} with access sequence {}",
                target.show(),
                self.hypothesis.access(target).as_string()
            );
        }
        Ok(())
    }

    /// The prefix-substitution predicate of the Rivest–Schapire analysis:
    /// the first `index` symbols of the counterexample are replaced by the
    /// access sequence of the state they reach in the hypothesis.
    fn rs_alpha(
        &self,
        counterexample: &[Sym<O>],
        index: usize,
        cache: &mut math::Map<usize, bool>,
    ) -> Result<bool, LearningError<Sym<O>>> {
        if let Some(answer) = cache.get(&index) {
            return Ok(*answer);
        }
        let state = self.hypothesis.run(&self.tree, &counterexample[..index]);
        let answer = self.membership(Concat(
            self.hypothesis.access(state),
            &counterexample[index..],
        ))?;
        cache.insert(index, answer);
        Ok(answer)
    }

    /// Finds an index at which the prefix-substitution predicate flips,
    /// i.e. a decomposition `u · a · v` of the counterexample such that the
    /// state reached on `u` disagrees with its `a`-successor about the
    /// suffix `v`. Fails with [`LearningError::SpuriousCounterexample`] if
    /// hypothesis and oracle agree on the word.
    fn decompose(
        &self,
        counterexample: &[Sym<O>],
    ) -> Result<usize, LearningError<Sym<O>>> {
        let length = counterexample.len();
        let mut cache = math::Map::default();
        let before = self.rs_alpha(counterexample, 0, &mut cache)?;
        let after = self.rs_alpha(counterexample, length, &mut cache)?;
        if before == after {
            return Err(LearningError::SpuriousCounterexample {
                word: counterexample.to_vec(),
            });
        }

        match self.config.rs_search {
            RsSearch::Linear => {
                for index in 0..length {
                    if self.rs_alpha(counterexample, index, &mut cache)?
                        != self.rs_alpha(counterexample, index + 1, &mut cache)?
                    {
                        return Ok(index);
                    }
                }
                unreachable!("the predicate flips somewhere, its endpoints differ")
            }
            RsSearch::Eager => {
                // invariant: alpha(low) == before and alpha(high + 1) != before
                let (mut low, mut high) = (0, length - 1);
                loop {
                    let mid = (low + high) / 2;
                    let at = self.rs_alpha(counterexample, mid, &mut cache)?;
                    let next = self.rs_alpha(counterexample, mid + 1, &mut cache)?;
                    if at != next {
                        return Ok(mid);
                    }
                    if at == before {
                        low = mid + 1;
                    } else {
                        high = mid - 1;
                    }
                }
            }
        }
    }

    /// Splits the leaf the diverging transition points at, using the
    /// counterexample suffix as a temporary discriminator. The old state is
    /// re-placed according to its own membership outcome; all transitions
    /// into the split leaf are reopened and re-sifted by the next closing
    /// step, which also materializes the state for the vacant child.
    fn split_at(
        &mut self,
        counterexample: &[Sym<O>],
        index: usize,
    ) -> Result<(), LearningError<Sym<O>>> {
        let symbol = counterexample[index];
        let suffix = counterexample[index + 1..].to_vec();
        if suffix.is_empty() {
            // two states differing on the empty word sit on opposite sides
            // of the root and can never share a leaf
            return Err(LearningError::InvariantViolation {
                reason: "counterexample decomposition produced an empty discriminator".into(),
            });
        }
        let source = self.hypothesis.run(&self.tree, &counterexample[..index]);
        let Transition::NonTree(leaf) = self.hypothesis.transition(source, symbol) else {
            return Err(LearningError::InvariantViolation {
                reason: format!(
                    "counterexample diverges on the spanning-tree transition ({}, {})",
                    source.show(),
                    symbol.show()
                ),
            });
        };
        let Some(old) = self.tree.state_of(leaf) else {
            return Err(LearningError::InvariantViolation {
                reason: format!(
                    "transition ({}, {}) was not closed before counterexample analysis",
                    source.show(),
                    symbol.show()
                ),
            });
        };

        let outcome = self.membership(Concat(self.hypothesis.access(old), &suffix[..]))?;
        debug!(
            "splitting the leaf of {} with discriminator {}",
            old.show(),
            suffix.as_string()
        );
        let children = self.tree.split_leaf(leaf, suffix, outcome);
        self.hypothesis.set_node(old, children[outcome as usize]);
        for (state, sym) in self.tree.incoming(leaf).clone() {
            self.hypothesis.enqueue_open(state, sym);
        }
        Ok(())
    }

    /// The leaf a transition currently resolves to. Only meaningful after
    /// closing, which is the only time finalization runs.
    fn successor_leaf(
        &self,
        state: StateId,
        symbol: Sym<O>,
    ) -> Result<NodeId, LearningError<Sym<O>>> {
        match self.hypothesis.transition(state, symbol) {
            Transition::Tree(target) => Ok(self.hypothesis.node_of(target)),
            Transition::NonTree(node) if self.tree.state_of(node).is_some() => Ok(node),
            Transition::NonTree(_) => Err(LearningError::InvariantViolation {
                reason: format!(
                    "({}, {}) is open during finalization",
                    state.show(),
                    symbol.show()
                ),
            }),
        }
    }

    /// Searches a splitter for the block rooted at `apex`: an input symbol
    /// whose successor leaves are separated by a finalized inner node. The
    /// candidate with the shortest resulting discriminator wins, ties going
    /// to the earlier symbol.
    fn find_splitter(
        &self,
        apex: NodeId,
    ) -> Result<Option<(Sym<O>, NodeId)>, LearningError<Sym<O>>> {
        let states = self
            .tree
            .leaves_below(apex)
            .into_iter()
            .map(|leaf| {
                self.tree
                    .state_of(leaf)
                    .ok_or_else(|| LearningError::InvariantViolation {
                        reason: format!("vacant leaf {leaf:?} in the block at {apex:?}"),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut best: Option<(Sym<O>, NodeId, usize)> = None;
        for symbol in self.alphabet.universe() {
            let leaves = states
                .iter()
                .map(|state| self.successor_leaf(*state, symbol))
                .collect::<Result<Vec<_>, _>>()?;
            let ancestor = self.tree.lca(leaves);
            if self.tree.is_leaf(ancestor) || self.tree.is_temporary(ancestor) {
                continue;
            }
            let length = 1 + self.tree.discriminator(ancestor).expect("inner node").len();
            if best.as_ref().map_or(true, |(_, _, len)| length < *len) {
                best = Some((symbol, ancestor, length));
            }
        }
        Ok(best.map(|(symbol, ancestor, _)| (symbol, ancestor)))
    }

    /// Replaces the root of the block at `apex` by a finalized inner node
    /// with discriminator `a · d`, where `d` is the splitter's
    /// discriminator. Which side of the new node a block state belongs to
    /// is read off the position of its `a`-successor leaf relative to the
    /// splitter, without any membership query. Transitions into the block's
    /// leaves are retargeted at the apex and reopened, since the new
    /// discriminator may route them differently than their old leaf.
    fn finalize_block(
        &mut self,
        apex: NodeId,
        symbol: Sym<O>,
        splitter: NodeId,
    ) -> Result<(), LearningError<Sym<O>>> {
        let mut discriminator = vec![symbol];
        discriminator.extend(
            self.tree
                .discriminator(splitter)
                .expect("the splitter is an inner node")
                .iter()
                .copied(),
        );
        debug!(
            "finalizing the block at {apex:?} with discriminator {}",
            discriminator.as_string()
        );

        let leaves = self.tree.leaves_below(apex);
        let mut outcome = math::Map::default();
        for leaf in &leaves {
            let state = self
                .tree
                .state_of(*leaf)
                .ok_or_else(|| LearningError::InvariantViolation {
                    reason: format!("vacant leaf {leaf:?} in the block at {apex:?}"),
                })?;
            let successor = self.successor_leaf(state, symbol)?;
            let side = self.tree.branch_at(splitter, successor).ok_or_else(|| {
                LearningError::InvariantViolation {
                    reason: format!(
                        "successor leaf {successor:?} does not lie below the splitter {splitter:?}"
                    ),
                }
            })?;
            outcome.insert(*leaf, side);
        }

        for leaf in &leaves {
            for (state, sym) in self.tree.incoming(*leaf).clone() {
                self.tree.move_incoming(*leaf, apex, (state, sym));
                self.hypothesis
                    .set_transition(state, sym, Transition::NonTree(apex));
                self.hypothesis.enqueue_open(state, sym);
            }
        }

        self.tree.replace_block_root(apex, discriminator, &outcome)
    }

    /// Finalizes blocks until none are left or none admits a splitter.
    /// Closing runs after every replacement so that the reopened
    /// transitions are settled before the next block is examined. A round
    /// without progress is left to the driver: the next counterexample
    /// introduces the discriminators the stuck blocks are waiting for.
    fn finalize_blocks(&mut self) -> Result<(), LearningError<Sym<O>>> {
        loop {
            let roots = self.tree.block_roots();
            if roots.is_empty() {
                return Ok(());
            }
            let mut progressed = false;
            for apex in roots {
                let Some((symbol, splitter)) = self.find_splitter(apex)? else {
                    continue;
                };
                self.finalize_block(apex, symbol, splitter)?;
                self.close_transitions()?;
                progressed = true;
                break;
            }
            if !progressed {
                warn!(
                    "no block admits a finalizer yet, keeping {} temporary block(s)",
                    self.tree.block_roots().len()
                );
                return Ok(());
            }
        }
    }

    fn violated(reason: String) -> Result<(), LearningError<Sym<O>>> {
        Err(LearningError::InvariantViolation { reason })
    }

    /// Checks the global invariants tying tree, hypothesis and oracle
    /// together. Runs at every stable point, i.e. right before an
    /// equivalence query. The oracle-facing parts re-pose queries live, so
    /// an oracle that contradicts itself mid-learning surfaces here as
    /// [`LearningError::InconsistentTeacher`] with the offending word
    /// instead of silently corrupting the hypothesis.
    fn check_invariants(&self) -> Result<(), LearningError<Sym<O>>> {
        self.verify_consistency()?;

        // tree transitions form a spanning tree rooted at the start state
        let mut incoming_tree = vec![0usize; self.hypothesis.size()];
        for state in self.hypothesis.state_ids() {
            for sym in self.alphabet.universe() {
                if let Transition::Tree(target) = self.hypothesis.transition(state, sym) {
                    incoming_tree[target.0] += 1;
                }
            }
        }
        if incoming_tree[self.hypothesis.initial().0] != 0 {
            return Self::violated("the start state has an incoming tree transition".into());
        }
        for (index, count) in incoming_tree.iter().enumerate().skip(1) {
            if *count != 1 {
                return Self::violated(format!(
                    "state q{index} has {count} incoming tree transitions instead of one"
                ));
            }
        }

        // access sequences reach their state along the spanning tree
        for state in self.hypothesis.state_ids() {
            let mut current = self.hypothesis.initial();
            for sym in self.hypothesis.access(state).iter().copied() {
                match self.hypothesis.transition(current, sym) {
                    Transition::Tree(target) => current = target,
                    Transition::NonTree(_) => {
                        return Self::violated(format!(
                            "the access sequence of {} leaves the spanning tree",
                            state.show()
                        ))
                    }
                }
            }
            if current != state {
                return Self::violated(format!(
                    "running the access sequence of {} ends in {}",
                    state.show(),
                    current.show()
                ));
            }
        }

        // the worklist is exactly the set of unresolved transitions
        let open: math::Set<_> = self.hypothesis.open_transitions().collect();
        for state in self.hypothesis.state_ids() {
            for sym in self.alphabet.universe() {
                let unresolved = self.hypothesis.resolve(&self.tree, state, sym).is_none();
                if unresolved != open.contains(&(state, sym)) {
                    return Self::violated(format!(
                        "({}, {}) is {} but {} the open list",
                        state.show(),
                        sym.show(),
                        if unresolved { "unresolved" } else { "resolved" },
                        if open.contains(&(state, sym)) {
                            "on"
                        } else {
                            "not on"
                        },
                    ));
                }
            }
        }

        // leaf signatures agree with the oracle: for every discriminator
        // on the path of a state's leaf, membership of the access sequence
        // extended by it must answer the branch the path takes. Asked
        // live, not from the cache the signature was built from.
        for state in self.hypothesis.state_ids() {
            let leaf = self.hypothesis.node_of(state);
            if self.tree.state_of(leaf) != Some(state) {
                return Self::violated(format!(
                    "{} and its leaf {leaf:?} disagree about each other",
                    state.show()
                ));
            }
            for (discriminator, expected) in self.tree.signature(leaf) {
                let word =
                    Concat(self.hypothesis.access(state), &discriminator[..]).collect_vec();
                let fresh = self.oracle.membership(&word);
                if fresh != expected {
                    let first = self.queries.borrow().get(&word).copied();
                    if let Some(first) = first.filter(|first| *first != fresh) {
                        return Err(LearningError::InconsistentTeacher {
                            word,
                            first,
                            second: fresh,
                        });
                    }
                    return Self::violated(format!(
                        "membership of {} contradicts the signature of {}",
                        word.as_string(),
                        state.show()
                    ));
                }
            }
        }
        Ok(())
    }
}

impl<O: Oracle> Debug for Ttt<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.hypothesis.size() == 0 {
            return write!(f, "<uninitialized>");
        }
        let mut builder = tabled::builder::Builder::default();
        builder.push_record(["state", "access", "acc", "signature"]);
        for state in self.hypothesis.state_ids() {
            builder.push_record([
                if state == self.hypothesis.initial() {
                    owo_colors::OwoColorize::blue(&state.show()).to_string()
                } else {
                    state.show()
                },
                self.hypothesis.access(state).as_string(),
                self.hypothesis.is_final(state).show(),
                self.tree
                    .signature(self.hypothesis.node_of(state))
                    .iter()
                    .map(|(d, b)| format!("{}{}", d.as_string(), b.show()))
                    .join(" "),
            ]);
        }
        write!(f, "{}", builder.build())
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use rand::Rng;

    use super::{RsSearch, Ttt, TttConfig};
    use crate::{
        alphabet::{Alphabet, CharAlphabet},
        dfa::{Dfa, DfaBuilder},
        error::LearningError,
        oracle::{Counterexample, DfaOracle, Oracle},
        word::FiniteWord,
    };

    fn learn(target: Dfa) -> (Dfa, Ttt<DfaOracle<CharAlphabet>>) {
        learn_with(target, TttConfig::default())
    }

    fn learn_with(target: Dfa, config: TttConfig) -> (Dfa, Ttt<DfaOracle<CharAlphabet>>) {
        let oracle = DfaOracle::new(target);
        let mut learner = Ttt::with_config(oracle.alphabet().clone(), oracle, config);
        let learned = learner.infer().expect("learning must succeed");
        (learned, learner)
    }

    /// Words whose number of 'a's is congruent to three modulo four.
    fn three_mod_four_as() -> Dfa {
        DfaBuilder::new(CharAlphabet::of_size(2))
            .accepting([3])
            .with_edges([
                (0, 'a', 1),
                (0, 'b', 0),
                (1, 'a', 2),
                (1, 'b', 1),
                (2, 'a', 3),
                (2, 'b', 2),
                (3, 'a', 0),
                (3, 'b', 3),
            ])
            .into_dfa(0)
    }

    fn contains_aba() -> Dfa {
        DfaBuilder::new(CharAlphabet::of_size(2))
            .accepting([3])
            .with_edges([
                (0, 'a', 1),
                (0, 'b', 0),
                (1, 'a', 1),
                (1, 'b', 2),
                (2, 'a', 3),
                (2, 'b', 0),
                (3, 'a', 3),
                (3, 'b', 3),
            ])
            .into_dfa(0)
    }

    #[test_log::test]
    fn learns_three_mod_four_as() {
        let target = three_mod_four_as();
        let (learned, learner) = learn(target.clone());

        assert_eq!(learned.size(), 4);
        assert!(learned.accepts("aaa"));
        assert!(!learned.accepts("aaaa"));
        assert!(learned.accepts("bbbaaabbb"));
        assert!(!learned.accepts(""));
        assert!(learned.minimized().isomorphic_to(&target.minimized()));

        assert!(!learner.tree.has_temporary());
        let stats = learner.statistics();
        // O(k n^2 + n log m) with k = 2, n = 4 and counterexamples of
        // length at most 3 leaves plenty of headroom below this bound
        assert!(stats.membership_queries <= 96, "posed {stats:?}");
    }

    #[test]
    fn learns_the_empty_language() {
        let target = DfaBuilder::new(CharAlphabet::of_size(2))
            .with_edges([(0, 'a', 0), (0, 'b', 0)])
            .into_dfa(0);
        let (learned, learner) = learn(target);

        assert_eq!(learned.size(), 1);
        assert!(!learned.accepts(""));
        assert!(!learned.accepts("abba"));
        let stats = learner.statistics();
        assert_eq!(stats.equivalence_queries, 1);
        assert_eq!(stats.membership_queries, 3);
    }

    #[test]
    fn learns_the_universal_language() {
        let target = DfaBuilder::new(CharAlphabet::of_size(2))
            .accepting([0])
            .with_edges([(0, 'a', 0), (0, 'b', 0)])
            .into_dfa(0);
        let (learned, learner) = learn(target);

        assert_eq!(learned.size(), 1);
        assert!(learned.accepts(""));
        assert!(learned.accepts("babab"));
        assert_eq!(learner.statistics().equivalence_queries, 1);
    }

    #[test_log::test]
    fn learns_odd_number_of_as() {
        let target = DfaBuilder::new(CharAlphabet::of_size(2))
            .accepting([1])
            .with_edges([
                (0, 'a', 1),
                (0, 'b', 0),
                (1, 'a', 0),
                (1, 'b', 1),
            ])
            .into_dfa(0);
        let (learned, learner) = learn(target.clone());

        assert_eq!(learned.size(), 2);
        assert!(learned.accepts("a"));
        assert!(learned.accepts("bab"));
        assert!(!learned.accepts("aa"));
        assert!(!learned.accepts(""));
        assert!(learned.minimized().isomorphic_to(&target.minimized()));
        assert!(!learner.tree.has_temporary());
    }

    #[test_log::test]
    fn learns_words_ending_in_ab() {
        let target = DfaBuilder::new(CharAlphabet::of_size(2))
            .accepting([2])
            .with_edges([
                (0, 'a', 1),
                (0, 'b', 0),
                (1, 'a', 1),
                (1, 'b', 2),
                (2, 'a', 1),
                (2, 'b', 0),
            ])
            .into_dfa(0);
        let (learned, learner) = learn(target.clone());

        assert_eq!(learned.size(), 3);
        assert!(learned.accepts("ab"));
        assert!(learned.accepts("aab"));
        assert!(!learned.accepts("abb"));
        assert!(!learned.accepts("bba"));
        assert!(learned.minimized().isomorphic_to(&target.minimized()));
        assert!(!learner.tree.has_temporary());
    }

    #[test_log::test]
    fn learns_words_containing_aba() {
        let target = contains_aba();
        let (learned, learner) = learn(target.clone());

        assert_eq!(learned.size(), 4);
        assert!(learned.accepts("aba"));
        assert!(learned.accepts("bbabab"));
        assert!(!learned.accepts("abba"));
        assert!(learned.minimized().isomorphic_to(&target.minimized()));

        // after finalization, every discriminator in the tree is final and
        // short: one input symbol stacked on an already-final suffix
        assert!(!learner.tree.has_temporary());
        let mut stack = vec![learner.tree.root()];
        while let Some(node) = stack.pop() {
            if let Some(children) = learner.tree.children(node) {
                assert!(
                    learner.tree.discriminator(node).unwrap().len() <= 2,
                    "discriminator of {node:?} was not finalized to a short suffix"
                );
                stack.extend(children);
            }
        }
    }

    #[test]
    fn linear_search_agrees_with_eager_search() {
        let eager = learn(three_mod_four_as()).0;
        let linear = learn_with(
            three_mod_four_as(),
            TttConfig {
                rs_search: RsSearch::Linear,
                ..TttConfig::default()
            },
        )
        .0;
        assert!(eager.equivalent(&linear));
        assert_eq!(eager.size(), linear.size());
    }

    #[test]
    fn learning_is_deterministic() {
        let (first, first_learner) = learn(three_mod_four_as());
        let (second, second_learner) = learn(three_mod_four_as());
        assert_eq!(first, second);
        assert_eq!(first_learner.statistics(), second_learner.statistics());
    }

    #[test]
    fn closing_is_idempotent() {
        let (learned, mut learner) = learn(three_mod_four_as());
        let stats = learner.statistics();
        learner.close_transitions().unwrap();
        assert_eq!(learner.statistics(), stats);
        assert_eq!(learner.hypothesis.to_dfa(&learner.tree), learned);
    }

    #[test]
    fn non_deterministic_run_agrees_with_the_snapshot() {
        let (learned, mut learner) = learn(three_mod_four_as());
        for word in ["", "a", "aaa", "babba", "aaaaaaa"] {
            assert_eq!(
                learner.evaluate_non_deterministic(word).unwrap(),
                learned.accepts(word)
            );
        }
    }

    #[test]
    fn query_budget_is_enforced() {
        let oracle = DfaOracle::new(three_mod_four_as());
        let mut learner = Ttt::with_config(
            oracle.alphabet().clone(),
            oracle,
            TttConfig {
                query_limit: Some(5),
                ..TttConfig::default()
            },
        );
        assert_eq!(
            learner.infer(),
            Err(LearningError::QueryLimitExceeded { limit: 5 })
        );
    }

    /// Claims a counterexample that hypothesis and membership answers
    /// actually agree on.
    struct LyingOracle {
        alphabet: CharAlphabet,
    }

    impl Oracle for LyingOracle {
        type Alphabet = CharAlphabet;

        fn alphabet(&self) -> &CharAlphabet {
            &self.alphabet
        }

        fn membership<W: FiniteWord<Symbol = char>>(&self, _word: W) -> bool {
            false
        }

        fn equivalence(&self, _hypothesis: &Dfa) -> Result<(), Counterexample<CharAlphabet>> {
            Err(vec!['a', 'b'])
        }
    }

    #[test]
    fn spurious_counterexamples_are_reported() {
        let oracle = LyingOracle {
            alphabet: CharAlphabet::of_size(2),
        };
        let mut learner = Ttt::new(oracle.alphabet().clone(), oracle);
        assert_eq!(
            learner.infer(),
            Err(LearningError::SpuriousCounterexample {
                word: vec!['a', 'b']
            })
        );
    }

    /// Answers membership from a shared flag, so a test can change the
    /// language mid-flight.
    #[derive(Clone)]
    struct SwitchOracle {
        alphabet: CharAlphabet,
        accepting: Rc<Cell<bool>>,
    }

    impl Oracle for SwitchOracle {
        type Alphabet = CharAlphabet;

        fn alphabet(&self) -> &CharAlphabet {
            &self.alphabet
        }

        fn membership<W: FiniteWord<Symbol = char>>(&self, _word: W) -> bool {
            self.accepting.get()
        }

        fn equivalence(&self, _hypothesis: &Dfa) -> Result<(), Counterexample<CharAlphabet>> {
            Ok(())
        }
    }

    /// Answers membership consistently for the first few calls and then
    /// flips every answer, without the learner being told.
    struct FlakyOracle {
        alphabet: CharAlphabet,
        calls: Cell<usize>,
    }

    impl Oracle for FlakyOracle {
        type Alphabet = CharAlphabet;

        fn alphabet(&self) -> &CharAlphabet {
            &self.alphabet
        }

        fn membership<W: FiniteWord<Symbol = char>>(&self, _word: W) -> bool {
            let calls = self.calls.get();
            self.calls.set(calls + 1);
            calls >= 3
        }

        fn equivalence(&self, _hypothesis: &Dfa) -> Result<(), Counterexample<CharAlphabet>> {
            Ok(())
        }
    }

    #[test]
    fn a_contradicting_oracle_is_reported_during_learning() {
        // the first three answers build the one-state hypothesis; the
        // invariant check before the first equivalence query re-poses them
        // and runs into the flipped answers
        let oracle = FlakyOracle {
            alphabet: CharAlphabet::of_size(2),
            calls: Cell::new(0),
        };
        let mut learner = Ttt::new(oracle.alphabet().clone(), oracle);
        assert_eq!(
            learner.infer(),
            Err(LearningError::InconsistentTeacher {
                word: vec![],
                first: false,
                second: true
            })
        );
    }

    #[test]
    fn inconsistent_answers_are_caught_by_the_audit() {
        let flag = Rc::new(Cell::new(false));
        let oracle = SwitchOracle {
            alphabet: CharAlphabet::of_size(2),
            accepting: Rc::clone(&flag),
        };
        let mut learner = Ttt::new(oracle.alphabet().clone(), oracle);
        learner.infer().unwrap();

        assert_eq!(learner.verify_consistency(), Ok(()));
        flag.set(true);
        assert!(matches!(
            learner.verify_consistency(),
            Err(LearningError::InconsistentTeacher { first: false, second: true, .. })
        ));
    }

    #[test_log::test]
    fn learns_random_automata() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let size = rng.gen_range(1..10);
            let alphabet = CharAlphabet::of_size(2);
            let mut builder = DfaBuilder::new(alphabet.clone());
            for state in 0..size {
                for sym in alphabet.universe() {
                    builder = builder.with_edges([(state, sym, rng.gen_range(0..size))]);
                }
                if rng.gen_bool(0.5) {
                    builder = builder.accepting([state]);
                }
            }
            let target = builder.into_dfa(0);
            let minimal = target.minimized();

            let oracle = DfaOracle::new(target);
            let mut learner = Ttt::new(oracle.alphabet().clone(), oracle);
            let learned = learner.infer().expect("learning must succeed");

            assert_eq!(learned.size(), minimal.size());
            assert!(learned.isomorphic_to(&minimal));
        }
    }
}
