use crate::{
    alphabet::{Alphabet, SymbolOf},
    dfa::Dfa,
    word::FiniteWord,
};

/// A word on which a hypothesis and the target language disagree.
pub type Counterexample<A> = Vec<<A as Alphabet>::Symbol>;

/// A minimally adequate teacher for active learning. The learner drives the
/// inference entirely through this trait: membership queries classify single
/// words, equivalence queries either certify a hypothesis or produce a
/// counterexample.
///
/// Membership answers must be idempotent: asking the same word twice has to
/// give the same answer. Equivalence queries carry no such obligation, the
/// oracle may return different counterexamples for the same hypothesis.
pub trait Oracle {
    type Alphabet: Alphabet;

    fn alphabet(&self) -> &Self::Alphabet;

    /// Decides whether the given word belongs to the target language.
    fn membership<W: FiniteWord<Symbol = SymbolOf<Self::Alphabet>>>(&self, word: W) -> bool;

    /// Compares the hypothesis against the target language. Returns `Ok(())`
    /// on agreement and otherwise some word witnessing the difference.
    fn equivalence(
        &self,
        hypothesis: &Dfa<Self::Alphabet>,
    ) -> Result<(), Counterexample<Self::Alphabet>>;
}

/// An oracle answering from a known [`Dfa`]. Membership queries run the word
/// through the automaton; equivalence queries search the product of target
/// and hypothesis breadth-first, so counterexamples are always of minimal
/// length and deterministic for a fixed hypothesis.
#[derive(Debug, Clone)]
pub struct DfaOracle<A: Alphabet> {
    automaton: Dfa<A>,
}

impl<A: Alphabet> DfaOracle<A> {
    /// Creates a new [`DfaOracle`] from the given target automaton.
    pub fn new(automaton: Dfa<A>) -> Self {
        Self { automaton }
    }
}

impl<A: Alphabet> Oracle for DfaOracle<A> {
    type Alphabet = A;

    fn alphabet(&self) -> &A {
        self.automaton.alphabet()
    }

    fn membership<W: FiniteWord<Symbol = SymbolOf<A>>>(&self, word: W) -> bool {
        self.automaton.accepts(word)
    }

    fn equivalence(&self, hypothesis: &Dfa<A>) -> Result<(), Counterexample<A>> {
        match self.automaton.separate(hypothesis) {
            Some(witness) => Err(witness),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DfaOracle, Oracle};
    use crate::{alphabet::CharAlphabet, dfa::DfaBuilder};

    #[test]
    fn dfa_oracle_produces_shortest_counterexample() {
        let target = DfaBuilder::new(CharAlphabet::of_size(2))
            .accepting([1])
            .with_edges([
                (0, 'a', 1),
                (0, 'b', 0),
                (1, 'a', 0),
                (1, 'b', 1),
            ])
            .into_dfa(0);
        let trivial = DfaBuilder::new(CharAlphabet::of_size(2))
            .with_edges([(0, 'a', 0), (0, 'b', 0)])
            .into_dfa(0);

        let oracle = DfaOracle::new(target.clone());
        assert!(oracle.membership("a"));
        assert!(!oracle.membership("aa"));

        assert_eq!(oracle.equivalence(&trivial), Err(vec!['a']));
        assert_eq!(oracle.equivalence(&target), Ok(()));
    }
}
