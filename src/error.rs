use thiserror::Error;

use crate::{alphabet::Symbol, word::FiniteWord};

/// The ways in which learning can fail. Misuse of the engine (running a word
/// across an open transition, finalizing an unknown state) is a programmer
/// error and panics instead; these variants cover contract violations by the
/// oracle, exhausted budgets and broken internal invariants.
///
/// After an [`LearningError::InvariantViolation`] the hypothesis may be in an
/// inconsistent state and must be discarded.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum LearningError<S: Symbol> {
    /// The oracle answered the same membership query differently across two
    /// calls. Carries the offending word together with both answers.
    #[error("oracle answered membership of {} inconsistently: first {first}, then {second}", word.as_string())]
    InconsistentTeacher {
        word: Vec<S>,
        first: bool,
        second: bool,
    },
    /// The oracle returned a counterexample on which hypothesis and target
    /// actually agree, so no prefix decomposition exists.
    #[error("{} is not a counterexample, hypothesis and oracle agree on it", word.as_string())]
    SpuriousCounterexample { word: Vec<S> },
    /// The configured membership-query budget ran out. The caller may still
    /// snapshot the current hypothesis.
    #[error("membership query budget of {limit} exhausted")]
    QueryLimitExceeded { limit: usize },
    /// An internal invariant does not hold; indicates a bug in the engine or
    /// an oracle that is not a well-defined language.
    #[error("internal invariant violated: {reason}")]
    InvariantViolation { reason: String },
}
