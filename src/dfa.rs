use std::collections::VecDeque;

use itertools::Itertools;

use crate::{
    alphabet::{Alphabet, CharAlphabet, SymbolOf},
    math,
    show::Show,
    word::FiniteWord,
};

/// A deterministic finite automaton in plain tabular form: integer state
/// ids, a total transition table, a start state and a set of accepting
/// states. This is the snapshot format the learner exports; it carries no
/// learning bookkeeping and can be cloned, compared and minimized freely.
#[derive(Clone, PartialEq, Eq)]
pub struct Dfa<A: Alphabet = CharAlphabet> {
    alphabet: A,
    initial: usize,
    accepting: Vec<bool>,
    edges: Vec<math::Map<SymbolOf<A>, usize>>,
}

impl<A: Alphabet> Dfa<A> {
    /// Assembles a DFA from its parts. Panics unless the table is total over
    /// the alphabet and all referenced states exist.
    pub fn from_parts(
        alphabet: A,
        initial: usize,
        accepting: Vec<bool>,
        edges: Vec<math::Map<SymbolOf<A>, usize>>,
    ) -> Self {
        assert_eq!(accepting.len(), edges.len(), "state count mismatch");
        assert!(initial < edges.len(), "initial state does not exist");
        for row in &edges {
            assert_eq!(row.len(), alphabet.size(), "transition table is not total");
            assert!(
                row.values().all(|target| *target < edges.len()),
                "transition target does not exist"
            );
        }
        Self {
            alphabet,
            initial,
            accepting,
            edges,
        }
    }

    /// Starts building a DFA over the given alphabet from tuple edges.
    pub fn builder(alphabet: A) -> DfaBuilder<A> {
        DfaBuilder::new(alphabet)
    }

    pub fn alphabet(&self) -> &A {
        &self.alphabet
    }

    pub fn initial(&self) -> usize {
        self.initial
    }

    /// The number of states.
    pub fn size(&self) -> usize {
        self.edges.len()
    }

    pub fn is_accepting(&self, state: usize) -> bool {
        self.accepting[state]
    }

    /// The unique `symbol`-successor of `state`.
    pub fn successor(&self, state: usize, symbol: SymbolOf<A>) -> usize {
        *self.edges[state]
            .get(&symbol)
            .unwrap_or_else(|| panic!("no transition for symbol {} in q{state}", symbol.show()))
    }

    /// Runs `word` from the start state and returns the reached state.
    pub fn reached<W: FiniteWord<Symbol = SymbolOf<A>>>(&self, word: W) -> usize {
        word.symbols()
            .fold(self.initial, |state, sym| self.successor(state, sym))
    }

    /// Returns whether `word` is in the recognized language.
    pub fn accepts<W: FiniteWord<Symbol = SymbolOf<A>>>(&self, word: W) -> bool {
        self.accepting[self.reached(word)]
    }

    fn reachable_states(&self) -> Vec<usize> {
        let mut order = vec![self.initial];
        let mut seen: math::Set<usize> = math::Set::from_iter([self.initial]);
        let mut at = 0;
        while at < order.len() {
            let state = order[at];
            at += 1;
            for sym in self.alphabet.universe() {
                let target = self.successor(state, sym);
                if seen.insert(target) {
                    order.push(target);
                }
            }
        }
        order
    }

    /// Computes the canonical minimal DFA for the recognized language via
    /// partition refinement on the reachable part.
    pub fn minimized(&self) -> Dfa<A> {
        let reachable = self.reachable_states();
        let index_of: math::Map<usize, usize> = reachable
            .iter()
            .enumerate()
            .map(|(i, q)| (*q, i))
            .collect();

        // initial partition by acceptance, refined by successor classes
        let mut class: Vec<usize> = Vec::with_capacity(reachable.len());
        let mut assignment: math::Map<bool, usize> = math::Map::default();
        for q in &reachable {
            let next = assignment.len();
            class.push(*assignment.entry(self.accepting[*q]).or_insert(next));
        }

        loop {
            let mut next_class = Vec::with_capacity(reachable.len());
            let mut ids: math::Map<(usize, Vec<usize>), usize> = math::Map::default();
            for (i, q) in reachable.iter().enumerate() {
                let sig = (
                    class[i],
                    self.alphabet
                        .universe()
                        .map(|sym| class[index_of[&self.successor(*q, sym)]])
                        .collect_vec(),
                );
                let next = ids.len();
                next_class.push(*ids.entry(sig).or_insert(next));
            }
            if next_class == class {
                break;
            }
            class = next_class;
        }

        let count = class.iter().max().map(|m| m + 1).unwrap_or(0);
        let mut representative = vec![usize::MAX; count];
        for (i, c) in class.iter().enumerate() {
            if representative[*c] == usize::MAX {
                representative[*c] = reachable[i];
            }
        }
        let accepting = representative
            .iter()
            .map(|rep| self.accepting[*rep])
            .collect_vec();
        let edges = representative
            .iter()
            .map(|rep| {
                self.alphabet
                    .universe()
                    .map(|sym| (sym, class[index_of[&self.successor(*rep, sym)]]))
                    .collect()
            })
            .collect_vec();
        Dfa::from_parts(
            self.alphabet.clone(),
            class[index_of[&self.initial]],
            accepting,
            edges,
        )
    }

    /// Attempts to separate the languages of `self` and `other` by a word
    /// that exactly one of them accepts. Returns a shortest such word,
    /// found breadth-first in alphabet order, or `None` if the two automata
    /// are language-equivalent.
    pub fn separate(&self, other: &Dfa<A>) -> Option<Vec<SymbolOf<A>>> {
        assert_eq!(
            self.alphabet.size(),
            other.alphabet.size(),
            "can only separate automata over the same alphabet"
        );
        let mut seen: math::Set<(usize, usize)> = math::Set::default();
        let mut queue = VecDeque::from([(self.initial, other.initial, Vec::new())]);
        seen.insert((self.initial, other.initial));

        while let Some((q, p, word)) = queue.pop_front() {
            if self.accepting[q] != other.accepting[p] {
                return Some(word);
            }
            for sym in self.alphabet.universe() {
                let pair = (self.successor(q, sym), other.successor(p, sym));
                if seen.insert(pair) {
                    let mut extended = word.clone();
                    extended.push(sym);
                    queue.push_back((pair.0, pair.1, extended));
                }
            }
        }
        None
    }

    /// Checks whether `self` and `other` recognize the same language.
    pub fn equivalent(&self, other: &Dfa<A>) -> bool {
        self.separate(other).is_none()
    }

    /// Checks whether `self` and `other` are isomorphic, i.e. identical up
    /// to a renaming of states. Both automata should be reachable and
    /// minimal for this to coincide with language equivalence.
    pub fn isomorphic_to(&self, other: &Dfa<A>) -> bool {
        if self.size() != other.size() {
            return false;
        }
        let mut forward: math::Map<usize, usize> = math::Map::default();
        let mut backward: math::Map<usize, usize> = math::Map::default();
        let mut queue = VecDeque::from([(self.initial, other.initial)]);
        forward.insert(self.initial, other.initial);
        backward.insert(other.initial, self.initial);

        while let Some((q, p)) = queue.pop_front() {
            if self.accepting[q] != other.accepting[p] {
                return false;
            }
            for sym in self.alphabet.universe() {
                let (qq, pp) = (self.successor(q, sym), other.successor(p, sym));
                match (forward.get(&qq), backward.get(&pp)) {
                    (None, None) => {
                        forward.insert(qq, pp);
                        backward.insert(pp, qq);
                        queue.push_back((qq, pp));
                    }
                    (Some(mapped), _) if *mapped != pp => return false,
                    (_, Some(mapped)) if *mapped != qq => return false,
                    _ => {}
                }
            }
        }
        forward.len() == self.size()
    }
}

impl<A: Alphabet> std::fmt::Debug for Dfa<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut builder = tabled::builder::Builder::default();
        let mut header = vec!["state".to_string(), "acc".to_string()];
        header.extend(self.alphabet.universe().map(|sym| sym.show()));
        builder.push_record(header);
        for state in 0..self.size() {
            let mut row = vec![
                if state == self.initial {
                    format!("→q{state}")
                } else {
                    format!("q{state}")
                },
                self.accepting[state].show(),
            ];
            row.extend(
                self.alphabet
                    .universe()
                    .map(|sym| format!("q{}", self.successor(state, sym))),
            );
            builder.push_record(row);
        }
        write!(f, "{}", builder.build())
    }
}

/// Builds a [`Dfa`] from tuple edges `(source, symbol, target)`. States are
/// allocated implicitly up to the largest mentioned id; if the resulting
/// table is partial, a rejecting sink state is appended to make it total.
#[derive(Debug, Clone)]
pub struct DfaBuilder<A: Alphabet = CharAlphabet> {
    alphabet: A,
    accepting: math::Set<usize>,
    edges: Vec<(usize, SymbolOf<A>, usize)>,
}

impl<A: Alphabet> DfaBuilder<A> {
    pub fn new(alphabet: A) -> Self {
        Self {
            alphabet,
            accepting: math::Set::default(),
            edges: Vec::new(),
        }
    }

    /// Marks the given states as accepting.
    pub fn accepting<I: IntoIterator<Item = usize>>(mut self, states: I) -> Self {
        self.accepting.extend(states);
        self
    }

    /// Adds the given edges.
    pub fn with_edges<I: IntoIterator<Item = (usize, SymbolOf<A>, usize)>>(
        mut self,
        edges: I,
    ) -> Self {
        self.edges.extend(edges);
        self
    }

    /// Finishes construction with the given start state.
    pub fn into_dfa(self, initial: usize) -> Dfa<A> {
        let states = self
            .edges
            .iter()
            .flat_map(|(q, _, p)| [*q, *p])
            .chain(self.accepting.iter().copied())
            .chain([initial])
            .max()
            .expect("at least the initial state exists")
            + 1;

        let mut edges: Vec<math::Map<SymbolOf<A>, usize>> =
            vec![math::Map::default(); states];
        for (source, symbol, target) in self.edges {
            assert!(
                self.alphabet.contains(symbol),
                "symbol {} is not in the alphabet",
                symbol.show()
            );
            let previous = edges[source].insert(symbol, target);
            assert!(
                previous.is_none(),
                "duplicate edge from q{source} on {}",
                symbol.show()
            );
        }

        let partial = edges
            .iter()
            .any(|row| row.len() < self.alphabet.size());
        if partial {
            let sink = edges.len();
            edges.push(math::Map::default());
            for row in edges.iter_mut() {
                for sym in self.alphabet.universe() {
                    row.entry(sym).or_insert(sink);
                }
            }
        }

        let accepting = (0..edges.len()).map(|q| self.accepting.contains(&q)).collect();
        Dfa::from_parts(self.alphabet, initial, accepting, edges)
    }
}
