// Copyright © 2024 Pathway

//! Group-by reduction with partial aggregation.
//!
//! A reducer turns every input value into a [`Semigroup`] state; states belonging to the
//! same key are combined with [`Semigroup::plus_equals`]. Because the combination is
//! associative and commutative, any partitioning of the input can be reduced
//! independently and merged afterwards without changing the result. For floating point
//! sums "without changing" holds up to rounding of the intermediate additions.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;

pub trait Semigroup {
    fn plus_equals(&mut self, rhs: &Self);
}

pub trait ReducerImpl: Send + Sync + 'static {
    type Input;
    type State: Semigroup + Clone + Send;
    type Output;

    fn init(&self, value: Self::Input) -> Self::State;

    fn finish(&self, state: Self::State) -> Self::Output;
}

/// Running sum kept at full `f64` precision. The number of summed values travels
/// along so that merged partials can be checked for completeness.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FloatSumState {
    count: usize,
    sum: f64,
}

impl FloatSumState {
    pub fn single(value: f64) -> Self {
        Self {
            count: 1,
            sum: value,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }
}

impl Semigroup for FloatSumState {
    fn plus_equals(&mut self, rhs: &Self) {
        self.count += rhs.count;
        self.sum += rhs.sum;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SumReducer;

impl ReducerImpl for SumReducer {
    type Input = f64;
    type State = FloatSumState;
    type Output = f64;

    fn init(&self, value: f64) -> FloatSumState {
        FloatSumState::single(value)
    }

    fn finish(&self, state: FloatSumState) -> f64 {
        state.sum
    }
}

/// Per-key reducer states. One instance is owned by whoever processes a partition;
/// instances only meet in [`Aggregate::merge`].
#[derive(Debug, Clone)]
pub struct Aggregate<K, R: ReducerImpl> {
    reducer: R,
    states: HashMap<K, R::State>,
}

impl<K, R> Aggregate<K, R>
where
    K: Hash + Eq,
    R: ReducerImpl,
{
    pub fn new(reducer: R) -> Self {
        Self {
            reducer,
            states: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: K, value: R::Input) {
        let state = self.reducer.init(value);
        self.combine_state(key, state);
    }

    fn combine_state(&mut self, key: K, state: R::State) {
        match self.states.entry(key) {
            Entry::Occupied(mut entry) => entry.get_mut().plus_equals(&state),
            Entry::Vacant(entry) => {
                entry.insert(state);
            }
        }
    }

    /// Combines two partial aggregates key by key. The smaller side is folded into
    /// the larger one; the result does not depend on the argument order.
    #[must_use]
    pub fn merge(mut self, mut other: Self) -> Self {
        if self.states.len() < other.states.len() {
            std::mem::swap(&mut self.states, &mut other.states);
        }
        for (key, state) in other.states {
            self.combine_state(key, state);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, key: &K) -> Option<&R::State> {
        self.states.get(key)
    }

    pub fn states(&self) -> impl Iterator<Item = (&K, &R::State)> {
        self.states.iter()
    }

    /// Finishes every group. Rows come out ordered by key.
    pub fn finish(self) -> Vec<(K, R::Output)>
    where
        K: Ord,
    {
        let reducer = self.reducer;
        let mut rows: Vec<_> = self
            .states
            .into_iter()
            .map(|(key, state)| (key, reducer.finish(state)))
            .collect();
        rows.sort_unstable_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs));
        rows
    }
}

impl<K, R> Default for Aggregate<K, R>
where
    K: Hash + Eq,
    R: ReducerImpl + Default,
{
    fn default() -> Self {
        Self::new(R::default())
    }
}

impl<K, R> Extend<(K, R::Input)> for Aggregate<K, R>
where
    K: Hash + Eq,
    R: ReducerImpl,
{
    fn extend<T: IntoIterator<Item = (K, R::Input)>>(&mut self, iter: T) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}
