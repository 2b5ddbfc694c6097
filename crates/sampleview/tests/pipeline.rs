//! End-to-end behavior of the memoized thread pipeline.

use sampleview::Result;
use sampleview::ops::{
    EventDelayInfo, ImplementationFilter, ThreadOps, filter_thread_by_implementation,
    filter_thread_to_range, filter_thread_to_search_strings, filter_thread_to_tab,
    invert_call_stack, process_event_delays,
};
use sampleview::profile::{
    CategoryIndex, InnerWindowId, Profile, ProfileBuilder, Thread, ThreadBuilder, ThreadsKey,
};
use sampleview::selectors::Selectors;
use sampleview::state::{PreviewSelection, ViewState};
use sampleview::transforms::{Transform, TransformContext, apply_transform};
use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;

/// Standard operations that count how often the expensive ones run.
#[derive(Default)]
struct CountingOps {
    tabs: Cell<usize>,
    ranges: Cell<usize>,
    transforms: Cell<usize>,
    implementations: Cell<usize>,
    searches: Cell<usize>,
    inversions: Cell<usize>,
    event_delays: Cell<usize>,
}

fn bump(counter: &Cell<usize>) {
    counter.set(counter.get() + 1);
}

impl ThreadOps for CountingOps {
    fn filter_to_tab(
        &self,
        thread: &Thread,
        windows: &HashSet<InnerWindowId>,
        default_category: CategoryIndex,
    ) -> Thread {
        bump(&self.tabs);
        filter_thread_to_tab(thread, windows, default_category)
    }

    fn filter_to_range(&self, thread: &Thread, start: f64, end: f64) -> Thread {
        bump(&self.ranges);
        filter_thread_to_range(thread, start, end)
    }

    fn filter_by_implementation(
        &self,
        thread: &Thread,
        implementation: ImplementationFilter,
        default_category: CategoryIndex,
    ) -> Thread {
        bump(&self.implementations);
        filter_thread_by_implementation(thread, implementation, default_category)
    }

    fn filter_by_search(&self, thread: &Thread, search_strings: &[String]) -> Thread {
        bump(&self.searches);
        filter_thread_to_search_strings(thread, search_strings)
    }

    fn invert_call_stack(&self, thread: &Thread, default_category: CategoryIndex) -> Thread {
        bump(&self.inversions);
        invert_call_stack(thread, default_category)
    }

    fn process_event_delays(&self, thread: &Thread, interval: f64) -> Result<EventDelayInfo> {
        bump(&self.event_delays);
        process_event_delays(thread, interval)
    }

    fn apply_transform(
        &self,
        thread: &Thread,
        transform: &Transform,
        context: &TransformContext,
    ) -> Result<Thread> {
        bump(&self.transforms);
        apply_transform(thread, transform, context)
    }
}

/// Twenty samples one millisecond apart, all on `A;B;C;D;E` except every
/// fourth, which is on `A;X`.
fn profile() -> Rc<Profile> {
    let mut thread = ThreadBuilder::new("GeckoMain").main_thread();
    for i in 0..20 {
        let stack = if i % 4 == 0 { "A;X" } else { "A;B;C;D;E" };
        thread = thread.sample(i as f64, stack);
    }
    Rc::new(
        ProfileBuilder::new()
            .thread(thread)
            .thread(ThreadBuilder::new("Worker").sample(2.5, "W;A"))
            .build(),
    )
}

fn counting() -> (Rc<CountingOps>, Selectors) {
    let ops = Rc::new(CountingOps::default());
    let selectors = Selectors::with_ops(ops.clone());
    (ops, selectors)
}

fn func(thread: &Thread, name: &str) -> usize {
    (0..thread.funcs.len())
        .find(|&f| thread.func_name(f) == name)
        .unwrap()
}

fn merge(thread: &Thread, name: &str) -> Transform {
    Transform::MergeFunction {
        func: func(thread, name),
    }
}

#[test]
fn repeated_queries_are_cached() {
    let state = ViewState::new(profile());
    let (ops, selectors) = counting();
    let view = selectors.for_thread(&ThreadsKey::single(0));

    let first = view.preview_filtered_thread(&state).unwrap();
    let second = view.preview_filtered_thread(&state).unwrap();
    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(ops.ranges.get(), 1);

    let stats = view.cache_stats();
    let (_, range) = stats
        .iter()
        .find(|(name, _)| *name == "range_filtered_thread")
        .unwrap();
    assert_eq!(range.misses, 1);
    assert!(range.hits >= 1);
}

#[test]
fn downstream_changes_keep_upstream_stages() {
    let mut state = ViewState::new(profile());
    let (ops, selectors) = counting();
    let view = selectors.for_thread(&ThreadsKey::single(0));

    let range = view.range_filtered_thread(&state).unwrap();
    view.filtered_thread(&state).unwrap();

    state.set_search_text("C");
    state.set_invert_call_stack(true);
    let searched = view.filtered_thread(&state).unwrap();
    assert_eq!(ops.ranges.get(), 1);
    assert!(Rc::ptr_eq(&range, &view.range_filtered_thread(&state).unwrap()));

    // Search keeps rows and drops the stacks of non-matching samples.
    assert_eq!(searched.samples.len(), 20);
    assert_eq!(searched.samples.stack[0], None);
    assert!(searched.samples.stack[1].is_some());
}

#[test]
fn recommitting_the_same_range_is_free() {
    let mut state = ViewState::new(profile());
    let (ops, selectors) = counting();
    let view = selectors.for_thread(&ThreadsKey::single(0));

    state.commit_range(5.0, 15.0).unwrap();
    let first = view.range_filtered_thread(&state).unwrap();
    state.commit_range(5.0, 15.0).unwrap();
    let second = view.range_filtered_thread(&state).unwrap();

    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(ops.ranges.get(), 1);
    assert_eq!(first.samples.time.first(), Some(&5.0));
    assert_eq!(first.samples.time.last(), Some(&14.0));
}

#[test]
fn transform_stack_is_folded_incrementally() {
    let mut state = ViewState::new(profile());
    let (ops, selectors) = counting();
    let key = ThreadsKey::single(0);
    let view = selectors.for_thread(&key);
    let raw = view.thread(&state).unwrap();

    for name in ["B", "C", "D"] {
        state.push_transform(&key, merge(&raw, name));
    }
    view.range_and_transform_filtered_thread(&state).unwrap();
    assert_eq!(ops.transforms.get(), 3);

    state.push_transform(&key, merge(&raw, "E"));
    let merged = view.range_and_transform_filtered_thread(&state).unwrap();
    assert_eq!(ops.transforms.get(), 4);
    assert_eq!(merged.sample_func_names(1), ["A"]);

    // Popping back to a prefix and re-pushing is answered from the cache.
    state.pop_transforms_from(&key, 2);
    view.range_and_transform_filtered_thread(&state).unwrap();
    state.push_transform(&key, merge(&raw, "D"));
    state.push_transform(&key, merge(&raw, "E"));
    let again = view.range_and_transform_filtered_thread(&state).unwrap();
    assert_eq!(ops.transforms.get(), 4);
    assert!(Rc::ptr_eq(&merged, &again));
    assert_eq!(view.transform_cache().len(), 4);
}

#[test]
fn transforms_are_per_thread_key() {
    let mut state = ViewState::new(profile());
    let selectors = Selectors::new();
    let main = ThreadsKey::single(0);
    let worker = selectors.for_thread(&ThreadsKey::single(1));

    let before = worker.range_and_transform_filtered_thread(&state).unwrap();
    let raw = selectors.for_thread(&main).thread(&state).unwrap();
    state.push_transform(&main, merge(&raw, "B"));
    let after = worker.range_and_transform_filtered_thread(&state).unwrap();
    assert!(Rc::ptr_eq(&before, &after));
}

#[test]
fn preview_without_selection_passes_through() {
    let mut state = ViewState::new(profile());
    let selectors = Selectors::new();
    let view = selectors.for_thread(&ThreadsKey::single(0));

    let filtered = view.filtered_thread(&state).unwrap();
    assert!(Rc::ptr_eq(&filtered, &view.preview_filtered_thread(&state).unwrap()));

    state
        .set_preview_selection(Some(PreviewSelection {
            start: 4.0,
            end: 8.0,
        }))
        .unwrap();
    let preview = view.preview_filtered_thread(&state).unwrap();
    assert_eq!(preview.samples.time, vec![4.0, 5.0, 6.0, 7.0]);
    assert!(Rc::ptr_eq(&filtered, &view.filtered_thread(&state).unwrap()));

    state.set_preview_selection(None).unwrap();
    assert!(Rc::ptr_eq(&filtered, &view.preview_filtered_thread(&state).unwrap()));
}

#[test]
fn sample_offsets_account_for_both_ranges() {
    let mut state = ViewState::new(profile());
    let selectors = Selectors::new();
    let view = selectors.for_thread(&ThreadsKey::single(0));

    state.commit_range(10.0, 20.0).unwrap();
    assert_eq!(view.sample_index_offset_from_committed_range(&state).unwrap(), 10);
    assert_eq!(view.sample_index_offset_from_preview_range(&state).unwrap(), 10);

    state
        .set_preview_selection(Some(PreviewSelection {
            start: 13.0,
            end: 16.0,
        }))
        .unwrap();
    assert_eq!(view.sample_index_offset_from_preview_range(&state).unwrap(), 13);
}

#[test]
fn every_stage_is_internally_consistent() {
    let mut state = ViewState::new(profile());
    let selectors = Selectors::new();
    let key = ThreadsKey::new([0, 1]).unwrap();
    let view = selectors.for_thread(&key);
    let raw = view.thread(&state).unwrap();

    state.commit_range(2.0, 18.0).unwrap();
    state.push_transform(&key, merge(&raw, "C"));
    state.push_transform(
        &key,
        Transform::FocusFunction {
            func: func(&raw, "A"),
        },
    );
    state.set_search_text("D, W");
    state.set_invert_call_stack(true);
    state
        .set_preview_selection(Some(PreviewSelection {
            start: 3.0,
            end: 9.0,
        }))
        .unwrap();

    let categories = state.categories().len();
    let stages = [
        view.thread(&state),
        view.cpu_processed_thread(&state),
        view.tab_filtered_thread(&state),
        view.range_filtered_thread(&state),
        view.range_and_transform_filtered_thread(&state),
        view.implementation_filtered_thread(&state),
        view.search_filtered_thread(&state),
        view.filtered_thread(&state),
        view.preview_filtered_thread(&state),
    ];
    for stage in stages {
        stage.unwrap().check_indices(categories).unwrap();
    }

    // Every kept sample of the inverted tree starts at a leaf.
    let filtered = view.filtered_thread(&state).unwrap();
    for sample in 0..filtered.samples.len() {
        let names = filtered.sample_func_names(sample);
        if let Some(root) = names.first() {
            assert!(["E", "W"].contains(root), "unexpected root {root}");
        }
    }
}

#[test]
fn registry_reuses_selectors() {
    let state = ViewState::new(profile());
    let selectors = Selectors::new();
    let key = ThreadsKey::single(0);
    assert!(Rc::ptr_eq(&selectors.for_thread(&key), &selectors.for_thread(&key)));
    assert_eq!(selectors.for_each_thread(&state).len(), 2);
    assert_eq!(selectors.len(), 2);
}

/// Ten samples alternating between two browser tabs, each with an event delay.
fn tabbed_profile() -> Rc<Profile> {
    let mut thread = ThreadBuilder::new("GeckoMain").main_thread();
    for i in 0..10 {
        let stack = if i % 2 == 0 {
            "loop;a[js][win:10];b[js][win:10];native"
        } else {
            "loop;c[js][win:20];native"
        };
        thread = thread.sample_with_event_delay(i as f64, stack, Some(i as f64));
    }
    Rc::new(
        ProfileBuilder::new()
            .page(1, 10, "https://a.example")
            .page(2, 20, "https://b.example")
            .thread(thread)
            .build(),
    )
}

#[test]
fn every_active_filter_runs_once() {
    let mut state = ViewState::new(tabbed_profile());
    let (ops, selectors) = counting();
    let view = selectors.for_thread(&ThreadsKey::single(0));

    state.set_current_tab(Some(1));
    state.set_active_tab(Some(2));
    state.commit_range(2.0, 8.0).unwrap();
    state.set_implementation(ImplementationFilter::Js);
    state.set_search_text("b");
    state.set_invert_call_stack(true);
    state
        .set_preview_selection(Some(PreviewSelection {
            start: 4.0,
            end: 6.0,
        }))
        .unwrap();

    for _ in 0..5 {
        view.preview_filtered_thread(&state).unwrap();
        view.active_tab_filtered_thread(&state).unwrap();
        view.processed_event_delays(&state).unwrap();
    }

    // One tab filter each for the current and the active tab, one range
    // filter each for the committed range and the preview selection.
    assert_eq!(ops.tabs.get(), 2);
    assert_eq!(ops.ranges.get(), 2);
    assert_eq!(ops.implementations.get(), 1);
    assert_eq!(ops.searches.get(), 1);
    assert_eq!(ops.inversions.get(), 1);
    assert_eq!(ops.event_delays.get(), 1);

    let preview = view.preview_filtered_thread(&state).unwrap();
    assert_eq!(preview.samples.time, vec![4.0, 5.0]);
    assert_eq!(preview.sample_func_names(0), ["b", "a"]);
    assert!(preview.sample_func_names(1).is_empty());

    let active = view.active_tab_filtered_thread(&state).unwrap();
    assert_eq!(active.sample_func_names(1), ["c", "native"]);
    assert!(active.sample_func_names(0).is_empty());

    assert_eq!(view.sample_index_offset_from_committed_range(&state).unwrap(), 2);
    assert_eq!(view.sample_index_offset_from_preview_range(&state).unwrap(), 4);
}

#[test]
fn changing_the_active_tab_leaves_the_call_tree_alone() {
    let mut state = ViewState::new(tabbed_profile());
    let (ops, selectors) = counting();
    let view = selectors.for_thread(&ThreadsKey::single(0));

    state.set_current_tab(Some(1));
    let filtered = view.filtered_thread(&state).unwrap();
    view.active_tab_filtered_thread(&state).unwrap();
    assert_eq!(ops.tabs.get(), 1);

    state.set_active_tab(Some(2));
    view.active_tab_filtered_thread(&state).unwrap();
    assert_eq!(ops.tabs.get(), 2);
    assert!(Rc::ptr_eq(&filtered, &view.filtered_thread(&state).unwrap()));
    assert_eq!(ops.tabs.get(), 2);
}
