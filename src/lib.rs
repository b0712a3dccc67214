//! Active learning of regular languages with the TTT algorithm.
//!
//! Given an [`oracle::Oracle`], a minimally adequate teacher answering
//! membership and equivalence queries about an unknown regular language,
//! the [`ttt::Ttt`] learner infers the minimal deterministic finite
//! automaton recognizing that language. State-distinguishing information is
//! kept in a [`tree::DiscriminationTree`] instead of an observation table,
//! which keeps the space usage linear in the number of states; long
//! discriminators extracted from counterexamples are shortened again by
//! finalization, following Isberner, Howar and Steffen.
//!
//! # Example
//! ```
//! use ttt_learning::prelude::*;
//!
//! // the target language: an odd number of 'a's
//! let target = DfaBuilder::new(CharAlphabet::of_size(2))
//!     .accepting([1])
//!     .with_edges([(0, 'a', 1), (0, 'b', 0), (1, 'a', 0), (1, 'b', 1)])
//!     .into_dfa(0);
//!
//! let oracle = DfaOracle::new(target);
//! let mut learner = Ttt::new(oracle.alphabet().clone(), oracle);
//! let learned = learner.infer().unwrap();
//!
//! assert_eq!(learned.size(), 2);
//! assert!(learned.accepts("aab") && !learned.accepts("aa"));
//! ```

/// Alphabets and the symbols they consist of.
pub mod alphabet;

/// The plain automaton snapshot the learner produces.
pub mod dfa;

mod error;

/// The hypothesis automaton maintained during learning.
pub mod hypothesis;

/// Deterministic map and set types used throughout the crate.
pub mod math;

/// The teacher side of the learning loop.
pub mod oracle;

mod show;

/// The discrimination tree holding all state-separating suffixes.
pub mod tree;

/// The learner itself.
pub mod ttt;

/// Finite words and lazy concatenation.
pub mod word;

pub use error::LearningError;
pub use show::Show;

/// Everything needed to drive the learner: `use ttt_learning::prelude::*;`.
pub mod prelude {
    pub use crate::{
        alphabet::{Alphabet, CharAlphabet, Symbol, SymbolOf},
        dfa::{Dfa, DfaBuilder},
        error::LearningError,
        hypothesis::{Hypothesis, StateId, Transition},
        math,
        oracle::{Counterexample, DfaOracle, Oracle},
        show::Show,
        tree::{DiscriminationTree, NodeId},
        ttt::{RsSearch, Statistics, Ttt, TttConfig},
        word::{Concat, FiniteWord},
    };
}
