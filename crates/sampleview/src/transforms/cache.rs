use super::Transform;
use crate::error::Result;
use crate::memo::{ByAddress, CacheStats, KeyedCache};
use crate::ops::ThreadOps;
use crate::profile::{
    Category, CategoryIndex, Marker, MarkerSchemaByName, ProfileMeta, Thread, derive_markers,
};
use std::rc::Rc;

/// Everything a transform may consult besides the thread itself.
#[derive(Debug, Clone)]
pub struct TransformContext {
    pub default_category: CategoryIndex,
    pub markers: Rc<Vec<Marker>>,
    /// Indexes into `markers` that are in view.
    pub marker_indexes: Rc<Vec<usize>>,
    pub marker_schema: Rc<MarkerSchemaByName>,
    pub categories: Rc<Vec<Category>>,
}

impl TransformContext {
    /// Context with every marker of `thread` in view.
    pub fn for_thread(thread: &Thread, meta: &ProfileMeta) -> Self {
        let markers = derive_markers(thread);
        Self {
            default_category: meta.default_category(),
            marker_indexes: Rc::new((0..markers.len()).collect()),
            markers: Rc::new(markers),
            marker_schema: meta.marker_schema.clone(),
            categories: meta.categories.clone(),
        }
    }
}

/// Cache key of one transform step: the input thread and the context by
/// address, the transform by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransformKey {
    pub thread: ByAddress<Thread>,
    pub transform: Transform,
    pub context: ByAddress<TransformContext>,
}

/// Every transform step computed for one thread view.
///
/// Entries are never evicted: popping a transform and pushing it back, or
/// toggling between two stacks that share a prefix, never recomputes a step.
/// The price is memory proportional to the number of distinct steps seen,
/// which [`len`](Self::len) exposes.
#[derive(Debug)]
pub struct TransformCache {
    steps: KeyedCache<TransformKey, Rc<Thread>>,
}

impl Default for TransformCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformCache {
    pub fn new() -> Self {
        Self {
            steps: KeyedCache::new("apply_transform"),
        }
    }

    pub fn apply(
        &self,
        ops: &dyn ThreadOps,
        thread: &Rc<Thread>,
        transform: &Transform,
        context: &Rc<TransformContext>,
    ) -> Result<Rc<Thread>> {
        let key = TransformKey {
            thread: ByAddress(thread.clone()),
            transform: transform.clone(),
            context: ByAddress(context.clone()),
        };
        self.steps.get_or_try_insert_with(key, |key| {
            log::debug!("applying transform {} to '{}'", key.transform, thread.name);
            ops.apply_transform(thread, &key.transform, context)
                .map(Rc::new)
        })
    }

    /// Fold `stack` over `thread`, one cached step per transform.
    pub fn apply_stack(
        &self,
        ops: &dyn ThreadOps,
        thread: &Rc<Thread>,
        stack: &[Transform],
        context: &Rc<TransformContext>,
    ) -> Result<Rc<Thread>> {
        stack.iter().try_fold(thread.clone(), |current, transform| {
            self.apply(ops, &current, transform, context)
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.steps.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::ops::StandardOps;
    use crate::profile::{ProfileBuilder, ThreadBuilder};
    use std::cell::Cell;

    #[derive(Default)]
    struct CountingOps {
        applied: Cell<usize>,
    }

    impl ThreadOps for CountingOps {
        fn apply_transform(
            &self,
            thread: &Thread,
            transform: &Transform,
            context: &TransformContext,
        ) -> Result<Thread> {
            self.applied.set(self.applied.get() + 1);
            StandardOps.apply_transform(thread, transform, context)
        }
    }

    fn setup() -> (Rc<Thread>, Rc<TransformContext>) {
        let thread = Rc::new(
            ThreadBuilder::new("Main")
                .sample(0.0, "A;B;C;D;E")
                .sample(1.0, "A;C")
                .build(),
        );
        let meta = ProfileBuilder::new().build().meta;
        let context = Rc::new(TransformContext::for_thread(&thread, &meta));
        (thread, context)
    }

    fn merge(func: usize) -> Transform {
        Transform::MergeFunction { func }
    }

    #[test]
    fn pushing_a_transform_only_computes_the_new_step() {
        let (thread, context) = setup();
        let cache = TransformCache::new();
        let ops = CountingOps::default();

        let three = [merge(1), merge(2), merge(3)];
        let first = cache.apply_stack(&ops, &thread, &three, &context).unwrap();
        assert_eq!(ops.applied.get(), 3);

        let four = [merge(1), merge(2), merge(3), merge(4)];
        cache.apply_stack(&ops, &thread, &four, &context).unwrap();
        assert_eq!(ops.applied.get(), 4);

        // Popping back returns the very same thread.
        let popped = cache.apply_stack(&ops, &thread, &three, &context).unwrap();
        assert!(Rc::ptr_eq(&first, &popped));
        assert_eq!(ops.applied.get(), 4);
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn empty_stack_is_the_input() {
        let (thread, context) = setup();
        let cache = TransformCache::new();
        let result = cache.apply_stack(&StandardOps, &thread, &[], &context).unwrap();
        assert!(Rc::ptr_eq(&result, &thread));
    }

    #[test]
    fn new_context_misses() {
        let (thread, context) = setup();
        let cache = TransformCache::new();
        let ops = CountingOps::default();
        cache.apply(&ops, &thread, &merge(1), &context).unwrap();
        let other = Rc::new((*context).clone());
        cache.apply(&ops, &thread, &merge(1), &other).unwrap();
        assert_eq!(ops.applied.get(), 2);
    }

    #[test]
    fn failing_step_stops_the_fold() {
        let (thread, context) = setup();
        let cache = TransformCache::new();
        let result = cache.apply_stack(&StandardOps, &thread, &[merge(1), merge(99)], &context);
        assert!(matches!(result, Err(Error::Transform { .. })));
        assert_eq!(cache.len(), 1);
    }
}
