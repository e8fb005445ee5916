//! Immutable, typed, request-scoped state.
//!
//! `State` is a persistent key-to-value map: every mutation returns a new
//! `State` that shares structure with its parent via `Arc`, so concurrent
//! readers of the same `State` never need coordination and no caller can
//! observe a write made by another caller unless the new `State` is handed
//! to them explicitly.
//!
//! A key is a `(name, value-type)` pair. Two keys with the same name but a
//! different value type are distinct bindings — this is what the source
//! system's dynamic map with per-key type assertions becomes in a
//! statically typed language: [`Key<T>`] pairs a name with
//! `std::any::TypeId::of::<T>()`, so `get` either yields a value of the
//! declared type or `None`, never a type-confused read.
//!
//! The storage backing a `State` is a plain `HashMap` behind an `Arc`;
//! `with`/`with_multiple` clone the map and insert into the clone before
//! re-wrapping it in a fresh `Arc`. This is the copy-on-write overlay the
//! design calls for rather than a hash-array-mapped trie — request-scoped
//! states are small (a handful of canonical keys plus whatever a unit
//! adds), so an O(n) clone per write is cheaper than maintaining trie
//! structural sharing, and it keeps the implementation free of an extra
//! dependency.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A typed handle to a named state binding.
///
/// `Key<T>` carries no runtime data beyond the name; the type parameter
/// `T` is encoded via `TypeId` at lookup time. Keys are `Copy` so they can
/// be declared as `const` canonical keys (see [`keys`] below) and passed
/// around freely.
pub struct Key<T> {
    name: &'static str,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> Key<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Key<T> {}

impl<T> std::fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Key({})", self.name)
    }
}

type SlotKey = (&'static str, TypeId);
type Slot = Arc<dyn Any + Send + Sync>;

/// Immutable, persistent state. Cheap to `Clone` (an `Arc` bump); cheap to
/// share across threads; every derivation is independent of its parent.
#[derive(Clone, Default)]
pub struct State {
    bindings: Arc<HashMap<SlotKey, Slot>>,
}

impl State {
    /// An empty state with no bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a binding by key. Returns `None` if the name is unbound or
    /// bound to a value of a different type.
    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: Key<T>) -> Option<T> {
        self.bindings
            .get(&(key.name, TypeId::of::<T>()))
            .and_then(|slot| slot.downcast_ref::<T>())
            .cloned()
    }

    /// True if `key`'s name is bound, regardless of type.
    pub fn contains_name(&self, name: &str) -> bool {
        self.bindings.keys().any(|(n, _)| *n == name)
    }

    /// Derive a new state with `key` bound to `value`. The receiver is
    /// unchanged; this is the fundamental persistent-update operation.
    pub fn with<T: Send + Sync + 'static>(&self, key: Key<T>, value: T) -> State {
        let mut map = (*self.bindings).clone();
        map.insert((key.name, TypeId::of::<T>()), Arc::new(value));
        State {
            bindings: Arc::new(map),
        }
    }

    /// Derive a new state with every binding in `bindings` applied, in a
    /// single clone of the underlying map rather than one clone per
    /// binding.
    pub fn with_multiple(&self, bindings: Vec<Box<dyn Binding>>) -> State {
        let mut map = (*self.bindings).clone();
        for binding in bindings {
            binding.apply(&mut map);
        }
        State {
            bindings: Arc::new(map),
        }
    }

    /// The set of currently-bound names (regardless of value type).
    pub fn keys(&self) -> HashSet<&'static str> {
        self.bindings.keys().map(|(name, _)| *name).collect()
    }

    /// Derived view over the canonical `budget_usage` binding; absent
    /// usage reads as zero so middlewares never need a presence check.
    pub fn budget_usage(&self) -> Usage {
        self.get(keys::BUDGET_USAGE).unwrap_or_default()
    }

    /// Bindings present in `self` that are absent from `base`, or whose
    /// value was replaced relative to `base`. Relies on `with`/
    /// `with_multiple` never reusing an `Arc` for an unrelated write: a
    /// cloned `HashMap` shares `Arc` pointers with its parent for every
    /// binding it doesn't touch, so pointer inequality is exactly "this
    /// key was written after the fork point". Used by [`crate::graph::Layer`]
    /// to merge sibling states without requiring every bound type to be
    /// comparable.
    pub(crate) fn changed_since(&self, base: &State) -> Vec<(SlotKey, Slot)> {
        self.bindings
            .iter()
            .filter(|(k, v)| match base.bindings.get(*k) {
                Some(bv) => !Arc::ptr_eq(bv, v),
                None => true,
            })
            .map(|(k, v)| (*k, Arc::clone(v)))
            .collect()
    }

    /// Derive a new state from `self` with `changes` (as produced by
    /// [`State::changed_since`]) applied on top, last entry wins.
    pub(crate) fn overlay(&self, changes: Vec<(SlotKey, Slot)>) -> State {
        let mut map = (*self.bindings).clone();
        for (k, v) in changes {
            map.insert(k, v);
        }
        State {
            bindings: Arc::new(map),
        }
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("bound_names", &self.keys())
            .finish()
    }
}

/// A single, type-erased pending write, produced by [`binding`] and
/// consumed by [`State::with_multiple`].
pub trait Binding: Send + Sync {
    fn apply(self: Box<Self>, map: &mut HashMap<SlotKey, Slot>);
}

struct TypedBinding<T> {
    key: Key<T>,
    value: T,
}

impl<T: Send + Sync + 'static> Binding for TypedBinding<T> {
    fn apply(self: Box<Self>, map: &mut HashMap<SlotKey, Slot>) {
        map.insert((self.key.name, TypeId::of::<T>()), Arc::new(self.value));
    }
}

/// Build a boxed [`Binding`] for use with [`State::with_multiple`].
pub fn binding<T: Send + Sync + 'static>(key: Key<T>, value: T) -> Box<dyn Binding> {
    Box::new(TypedBinding { key, value })
}

/// Canonical keys reserved by the core. Unit implementations read and
/// write these to interoperate with judges, aggregators, and middlewares.
pub mod keys {
    use super::*;

    pub const QUESTION: Key<String> = Key::new("question");
    pub const ANSWERS: Key<Vec<Answer>> = Key::new("answers");
    pub const JUDGE_SCORES: Key<Vec<JudgeSummary>> = Key::new("judge_scores");
    pub const VERDICT: Key<Verdict> = Key::new("verdict");
    pub const BUDGET_USAGE: Key<Usage> = Key::new("budget_usage");
}

/// A candidate answer under evaluation. IDs are unique within a single
/// `answers` sequence.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Answer {
    pub id: String,
    pub content: String,
}

impl Answer {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }
}

/// A judge's assessment of one answer. The i-th `JudgeSummary` in
/// `judge_scores` corresponds positionally to the i-th `Answer` in
/// `answers`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct JudgeSummary {
    pub score: f64,
    pub confidence: f64,
    pub reasoning: String,
}

impl JudgeSummary {
    pub fn new(score: f64, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            score,
            confidence,
            reasoning: reasoning.into(),
        }
    }
}

/// The aggregator's final decision.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Verdict {
    pub id: String,
    pub winner_answer: Answer,
    pub aggregate_score: f64,
}

/// Per-request resource consumption. Expected to be monotonically
/// non-decreasing over the course of a single execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Usage {
    pub tokens: i64,
    pub calls: i64,
}

impl Usage {
    pub fn new(tokens: i64, calls: i64) -> Self {
        Self { tokens, calls }
    }

    /// Add two usage readings together (e.g. to accumulate the usage of
    /// two sequential LLM calls inside one unit).
    pub fn combine(self, other: Usage) -> Usage {
        Usage {
            tokens: self.tokens + other.tokens,
            calls: self.calls + other.calls,
        }
    }

    /// Componentwise, floor-at-zero difference. Used to recover how much
    /// usage a single execution branch consumed when only the
    /// before/after cumulative readings are available (e.g. comparing a
    /// child's post-execution usage against the usage it started from).
    pub fn saturating_sub(self, other: Usage) -> Usage {
        Usage {
            tokens: (self.tokens - other.tokens).max(0),
            calls: (self.calls - other.calls).max(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNTER: Key<i64> = Key::new("counter");
    const LABEL: Key<String> = Key::new("label");

    #[test]
    fn with_does_not_mutate_receiver() {
        let s0 = State::new();
        let s1 = s0.with(COUNTER, 42);

        assert_eq!(s1.get(COUNTER), Some(42));
        assert_eq!(s0.get(COUNTER), None);
    }

    #[test]
    fn get_is_stable_across_calls() {
        let s = State::new().with(COUNTER, 7);
        assert_eq!(s.get(COUNTER), s.get(COUNTER));
    }

    #[test]
    fn same_name_different_type_are_distinct_bindings() {
        let string_key: Key<String> = Key::new("dual");
        let int_key: Key<i64> = Key::new("dual");

        let s = State::new().with(string_key, "hello".to_string());
        assert_eq!(s.get(string_key), Some("hello".to_string()));
        assert_eq!(s.get(int_key), None);
    }

    #[test]
    fn with_multiple_applies_all_bindings_in_one_clone() {
        let s = State::new().with_multiple(vec![
            binding(COUNTER, 1),
            binding(LABEL, "x".to_string()),
        ]);

        assert_eq!(s.get(COUNTER), Some(1));
        assert_eq!(s.get(LABEL), Some("x".to_string()));
    }

    #[test]
    fn budget_usage_defaults_to_zero_when_absent() {
        let s = State::new();
        assert_eq!(s.budget_usage(), Usage::default());
    }

    #[test]
    fn keys_reflects_bound_names() {
        let s = State::new().with(COUNTER, 1).with(LABEL, "y".to_string());
        let names = s.keys();
        assert!(names.contains("counter"));
        assert!(names.contains("label"));
    }

    #[test]
    fn changed_since_reports_only_new_or_overwritten_keys() {
        let base = State::new().with(COUNTER, 1).with(LABEL, "base".to_string());
        let child = base.with(LABEL, "child".to_string());

        let diff = child.changed_since(&base);
        assert_eq!(diff.len(), 1);

        let merged = base.overlay(diff);
        assert_eq!(merged.get(LABEL), Some("child".to_string()));
        assert_eq!(merged.get(COUNTER), Some(1));
    }

    #[test]
    fn concurrent_children_are_independent() {
        let base = State::new().with(COUNTER, 0);
        let a = base.with(COUNTER, 1);
        let b = base.with(COUNTER, 2);

        assert_eq!(base.get(COUNTER), Some(0));
        assert_eq!(a.get(COUNTER), Some(1));
        assert_eq!(b.get(COUNTER), Some(2));
    }

    proptest::proptest! {
        /// `changed_since` against one's own base is always empty — the
        /// identity case the `Layer` merge machinery relies on when a child
        /// touches nothing its siblings also wrote.
        #[test]
        fn changed_since_self_is_always_empty(v in proptest::prelude::any::<i64>()) {
            let base = State::new().with(COUNTER, v);
            let diff = base.changed_since(&base);
            proptest::prop_assert!(diff.is_empty());
        }

        /// Overlaying the full diff between a derived state and its base
        /// recovers the derived state's bindings exactly, no matter how
        /// many writes separate them.
        #[test]
        fn overlay_of_full_diff_recovers_derived_state(
            values in proptest::collection::vec(proptest::prelude::any::<i64>(), 1..10),
        ) {
            let base = State::new();
            let mut derived = base.clone();
            for v in &values {
                derived = derived.with(COUNTER, *v);
            }

            let diff = derived.changed_since(&base);
            let recovered = base.overlay(diff);
            proptest::prop_assert_eq!(recovered.get(COUNTER), derived.get(COUNTER));
        }
    }
}
