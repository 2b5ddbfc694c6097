use crate::error::Result;
use crate::memo::{CacheStats, MemoCell};
use crate::ops::{
    EventDelayInfo, ImplementationFilter, JsTracerTiming, SamplesLikeTable, ThreadOps,
    sample_index_range,
};
use crate::profile::{
    Category, CategoryIndex, CpuDeltaUnit, InnerWindowId, JsAllocationsTable, JsTracerTable,
    Marker, MarkerSchemaByName, NativeAllocationsTable, Profile, RawMarkerTable, SamplesTable,
    StringTable, Thread, ThreadsKey, derive_markers,
};
use crate::state::{CommittedRange, PreviewSelection, ThreadViewOptions, ViewState};
use crate::summary::{CallTreeSummaryStrategy, resolve_summary_strategy};
use crate::transforms::{TransformCache, TransformContext, TransformStack};
use std::collections::HashSet;
use std::rc::Rc;

type ThreadCell<A> = MemoCell<A, Rc<Thread>>;
type Windows = Rc<HashSet<InnerWindowId>>;
type SamplesLikeCell = MemoCell<(Rc<Thread>, CallTreeSummaryStrategy), Rc<SamplesLikeTable>>;
type TimingCell = MemoCell<(Option<Rc<JsTracerTable>>, Rc<StringTable>), Option<Rc<JsTracerTiming>>>;
type ContextArgs = (
    CategoryIndex,
    Rc<Vec<Marker>>,
    Rc<Vec<usize>>,
    Rc<MarkerSchemaByName>,
    Rc<Vec<Category>>,
);

/// The derived-value pipeline of one thread key.
///
/// Each stage is a [`MemoCell`] fed by the stage before it and by the view
/// parameters it depends on, so a query recomputes exactly the stages whose
/// inputs changed identity since the previous query:
///
/// ```text
/// thread -> cpu_processed -> tab -> range -> transforms -> implementation
///        -> search -> invert (filtered) -> preview
///                  \-> active tab
/// ```
pub struct ThreadSelectors {
    key: ThreadsKey,
    transform_cache: Rc<TransformCache>,

    thread: ThreadCell<Rc<Profile>>,
    cpu_processed: ThreadCell<(Rc<Thread>, Option<CpuDeltaUnit>, f64)>,
    tab_filtered: ThreadCell<(Rc<Thread>, Windows, CategoryIndex)>,
    active_tab_filtered: ThreadCell<(Rc<Thread>, Windows, CategoryIndex)>,
    range_filtered: ThreadCell<(Rc<Thread>, CommittedRange)>,
    markers: MemoCell<(Rc<RawMarkerTable>, Rc<StringTable>), Rc<Vec<Marker>>>,
    marker_indexes: MemoCell<(Rc<Vec<Marker>>, CommittedRange), Rc<Vec<usize>>>,
    transform_context: MemoCell<ContextArgs, Rc<TransformContext>>,
    range_and_transform_filtered: ThreadCell<(Rc<Thread>, Rc<TransformStack>, Rc<TransformContext>)>,
    implementation_filtered: ThreadCell<(Rc<Thread>, ImplementationFilter, CategoryIndex)>,
    search_filtered: ThreadCell<(Rc<Thread>, Rc<Vec<String>>)>,
    filtered: ThreadCell<(Rc<Thread>, bool, CategoryIndex)>,
    preview_filtered: ThreadCell<(Rc<Thread>, Option<PreviewSelection>)>,

    summary_strategy: MemoCell<(Rc<Thread>, CallTreeSummaryStrategy), CallTreeSummaryStrategy>,
    unfiltered_samples: SamplesLikeCell,
    filtered_samples: SamplesLikeCell,
    preview_filtered_samples: SamplesLikeCell,
    committed_range_offset: MemoCell<(Rc<SamplesLikeTable>, CommittedRange), usize>,
    preview_range_offset: MemoCell<(usize, Rc<SamplesLikeTable>, Option<PreviewSelection>), usize>,

    thread_range: MemoCell<(Rc<Thread>, f64), CommittedRange>,
    friendly_name: MemoCell<Rc<Thread>, Rc<str>>,
    process_details: MemoCell<Rc<Thread>, Rc<str>>,
    useful_timing_samples: MemoCell<Rc<SamplesTable>, bool>,
    js_tracer_timing: TimingCell,
    js_tracer_leaf_timing: TimingCell,
    event_delays: MemoCell<(Rc<Thread>, f64), Rc<EventDelayInfo>>,
}

impl ThreadSelectors {
    pub fn new(key: ThreadsKey, ops: Rc<dyn ThreadOps>) -> Self {
        let transform_cache = Rc::new(TransformCache::new());
        let indexes: Vec<usize> = key.indexes().iter().copied().collect();

        Self {
            thread: MemoCell::new("thread", {
                let ops = ops.clone();
                move |profile: &Rc<Profile>| {
                    if let &[index] = indexes.as_slice() {
                        return profile.thread(index).cloned();
                    }
                    let threads = indexes
                        .iter()
                        .map(|&index| profile.thread(index).cloned())
                        .collect::<Result<Vec<_>>>()?;
                    ops.merge_threads(&threads).map(Rc::new)
                }
            }),

            cpu_processed: MemoCell::new("cpu_processed_thread", {
                let ops = ops.clone();
                move |(thread, unit, interval): &(Rc<Thread>, Option<CpuDeltaUnit>, f64)| {
                    Ok(match unit {
                        Some(unit) if thread.samples.thread_cpu_delta.is_some() => {
                            Rc::new(ops.process_cpu_delta(thread, *unit, *interval))
                        }
                        _ => thread.clone(),
                    })
                }
            }),

            tab_filtered: tab_cell("tab_filtered_thread", ops.clone()),
            active_tab_filtered: tab_cell("active_tab_filtered_thread", ops.clone()),

            range_filtered: MemoCell::new("range_filtered_thread", {
                let ops = ops.clone();
                move |(thread, range): &(Rc<Thread>, CommittedRange)| {
                    Ok(Rc::new(ops.filter_to_range(thread, range.start, range.end)))
                }
            }),

            markers: MemoCell::new(
                "markers",
                |(markers, strings): &(Rc<RawMarkerTable>, Rc<StringTable>)| {
                    let thread = Thread {
                        markers: markers.clone(),
                        strings: strings.clone(),
                        ..Default::default()
                    };
                    Ok(Rc::new(derive_markers(&thread)))
                },
            ),

            marker_indexes: MemoCell::new(
                "committed_range_marker_indexes",
                |(markers, range): &(Rc<Vec<Marker>>, CommittedRange)| {
                    let indexes = markers
                        .iter()
                        .enumerate()
                        .filter(|(_, m)| match m.end {
                            Some(end) => m.start < range.end && end >= range.start,
                            None => m.start >= range.start && m.start < range.end,
                        })
                        .map(|(i, _)| i)
                        .collect();
                    Ok(Rc::new(indexes))
                },
            ),

            transform_context: MemoCell::new(
                "transform_context",
                |(default_category, markers, marker_indexes, marker_schema, categories): &ContextArgs| {
                    Ok(Rc::new(TransformContext {
                        default_category: *default_category,
                        markers: markers.clone(),
                        marker_indexes: marker_indexes.clone(),
                        marker_schema: marker_schema.clone(),
                        categories: categories.clone(),
                    }))
                },
            ),

            range_and_transform_filtered: MemoCell::new("range_and_transform_filtered_thread", {
                let ops = ops.clone();
                let cache = transform_cache.clone();
                move |(thread, stack, context): &(
                    Rc<Thread>,
                    Rc<TransformStack>,
                    Rc<TransformContext>,
                )| { cache.apply_stack(ops.as_ref(), thread, stack, context) }
            }),

            implementation_filtered: MemoCell::new("implementation_filtered_thread", {
                let ops = ops.clone();
                move |(thread, implementation, default_category): &(
                    Rc<Thread>,
                    ImplementationFilter,
                    CategoryIndex,
                )| {
                    Ok(match implementation {
                        ImplementationFilter::Combined => thread.clone(),
                        _ => Rc::new(ops.filter_by_implementation(
                            thread,
                            *implementation,
                            *default_category,
                        )),
                    })
                }
            }),

            search_filtered: MemoCell::new("search_filtered_thread", {
                let ops = ops.clone();
                move |(thread, search): &(Rc<Thread>, Rc<Vec<String>>)| {
                    Ok(if search.is_empty() {
                        thread.clone()
                    } else {
                        Rc::new(ops.filter_by_search(thread, search))
                    })
                }
            }),

            filtered: MemoCell::new("filtered_thread", {
                let ops = ops.clone();
                move |(thread, invert, default_category): &(Rc<Thread>, bool, CategoryIndex)| {
                    Ok(if *invert {
                        Rc::new(ops.invert_call_stack(thread, *default_category))
                    } else {
                        thread.clone()
                    })
                }
            }),

            preview_filtered: MemoCell::new("preview_filtered_thread", {
                let ops = ops.clone();
                move |(thread, selection): &(Rc<Thread>, Option<PreviewSelection>)| {
                    Ok(match selection {
                        Some(selection) => {
                            Rc::new(ops.filter_to_range(thread, selection.start, selection.end))
                        }
                        None => thread.clone(),
                    })
                }
            }),

            summary_strategy: MemoCell::new(
                "call_tree_summary_strategy",
                |(thread, requested): &(Rc<Thread>, CallTreeSummaryStrategy)| {
                    Ok(resolve_summary_strategy(thread, *requested))
                },
            ),

            unfiltered_samples: samples_like_cell("unfiltered_samples_for_call_tree", ops.clone()),
            filtered_samples: samples_like_cell("filtered_samples_for_call_tree", ops.clone()),
            preview_filtered_samples: samples_like_cell(
                "preview_filtered_samples_for_call_tree",
                ops.clone(),
            ),

            committed_range_offset: MemoCell::new(
                "sample_index_offset_from_committed_range",
                |(samples, range): &(Rc<SamplesLikeTable>, CommittedRange)| {
                    Ok(sample_index_range(&samples.time, range.start, range.end).start)
                },
            ),

            preview_range_offset: MemoCell::new(
                "sample_index_offset_from_preview_range",
                |(committed_offset, samples, selection): &(
                    usize,
                    Rc<SamplesLikeTable>,
                    Option<PreviewSelection>,
                )| {
                    Ok(match selection {
                        Some(selection) => {
                            committed_offset
                                + samples.time.partition_point(|&t| t < selection.start)
                        }
                        None => *committed_offset,
                    })
                },
            ),

            thread_range: MemoCell::new("thread_range", |(thread, interval): &(Rc<Thread>, f64)| {
                Ok(thread_time_range(thread, *interval))
            }),

            friendly_name: MemoCell::new("friendly_thread_name", |thread: &Rc<Thread>| {
                Ok(Rc::from(friendly_thread_name(thread)))
            }),

            process_details: MemoCell::new("thread_process_details", |thread: &Rc<Thread>| {
                Ok(Rc::from(thread_process_details(thread)))
            }),

            useful_timing_samples: MemoCell::new(
                "has_useful_timing_samples",
                |samples: &Rc<SamplesTable>| Ok(samples.stack.iter().any(Option::is_some)),
            ),

            js_tracer_timing: MemoCell::new("expensive_js_tracer_timing", {
                let ops = ops.clone();
                move |(tracer, strings): &(Option<Rc<JsTracerTable>>, Rc<StringTable>)| {
                    Ok(tracer
                        .as_ref()
                        .map(|tracer| Rc::new(ops.js_tracer_timing(tracer, strings))))
                }
            }),

            js_tracer_leaf_timing: MemoCell::new("expensive_js_tracer_leaf_timing", {
                let ops = ops.clone();
                move |(tracer, strings): &(Option<Rc<JsTracerTable>>, Rc<StringTable>)| {
                    Ok(tracer
                        .as_ref()
                        .map(|tracer| Rc::new(ops.js_tracer_leaf_timing(tracer, strings))))
                }
            }),

            event_delays: MemoCell::new("processed_event_delays", {
                let ops = ops.clone();
                move |(thread, interval): &(Rc<Thread>, f64)| {
                    ops.process_event_delays(thread, *interval).map(Rc::new)
                }
            }),

            key,
            transform_cache,
        }
    }

    pub fn key(&self) -> &ThreadsKey {
        &self.key
    }

    pub fn transform_cache(&self) -> &TransformCache {
        &self.transform_cache
    }

    /// The raw thread, or the merge of every thread in the key.
    pub fn thread(&self, state: &ViewState) -> Result<Rc<Thread>> {
        self.thread.get(state.profile().clone())
    }

    pub fn cpu_processed_thread(&self, state: &ViewState) -> Result<Rc<Thread>> {
        let thread = self.thread(state)?;
        self.cpu_processed
            .get((thread, state.cpu_delta_unit(), state.interval()))
    }

    pub fn tab_filtered_thread(&self, state: &ViewState) -> Result<Rc<Thread>> {
        let thread = self.cpu_processed_thread(state)?;
        self.tab_filtered.get((
            thread,
            state.current_tab_windows().clone(),
            state.default_category(),
        ))
    }

    /// Like [`tab_filtered_thread`](Self::tab_filtered_thread) for the active
    /// tab. Nothing downstream consumes it.
    pub fn active_tab_filtered_thread(&self, state: &ViewState) -> Result<Rc<Thread>> {
        let thread = self.cpu_processed_thread(state)?;
        self.active_tab_filtered.get((
            thread,
            state.active_tab_windows().clone(),
            state.default_category(),
        ))
    }

    pub fn range_filtered_thread(&self, state: &ViewState) -> Result<Rc<Thread>> {
        let thread = self.tab_filtered_thread(state)?;
        self.range_filtered.get((thread, state.committed_range()))
    }

    /// Every marker of the tab-filtered thread.
    pub fn markers(&self, state: &ViewState) -> Result<Rc<Vec<Marker>>> {
        let thread = self.tab_filtered_thread(state)?;
        self.markers
            .get((thread.markers.clone(), thread.strings.clone()))
    }

    /// Indexes into [`markers`](Self::markers) overlapping the committed range.
    pub fn committed_range_marker_indexes(&self, state: &ViewState) -> Result<Rc<Vec<usize>>> {
        let markers = self.markers(state)?;
        self.marker_indexes.get((markers, state.committed_range()))
    }

    pub fn transform_context(&self, state: &ViewState) -> Result<Rc<TransformContext>> {
        let markers = self.markers(state)?;
        let marker_indexes = self.committed_range_marker_indexes(state)?;
        self.transform_context.get((
            state.default_category(),
            markers,
            marker_indexes,
            state.marker_schema().clone(),
            state.categories().clone(),
        ))
    }

    pub fn transform_stack(&self, state: &ViewState) -> Rc<TransformStack> {
        state.transform_stack(&self.key)
    }

    pub fn range_and_transform_filtered_thread(&self, state: &ViewState) -> Result<Rc<Thread>> {
        let thread = self.range_filtered_thread(state)?;
        let context = self.transform_context(state)?;
        self.range_and_transform_filtered
            .get((thread, self.transform_stack(state), context))
    }

    pub fn implementation_filtered_thread(&self, state: &ViewState) -> Result<Rc<Thread>> {
        let thread = self.range_and_transform_filtered_thread(state)?;
        self.implementation_filtered
            .get((thread, state.implementation(), state.default_category()))
    }

    pub fn search_filtered_thread(&self, state: &ViewState) -> Result<Rc<Thread>> {
        let thread = self.implementation_filtered_thread(state)?;
        self.search_filtered
            .get((thread, state.search_strings().clone()))
    }

    /// The thread the call tree is built from.
    pub fn filtered_thread(&self, state: &ViewState) -> Result<Rc<Thread>> {
        let thread = self.search_filtered_thread(state)?;
        self.filtered
            .get((thread, state.invert_call_stack(), state.default_category()))
    }

    pub fn preview_filtered_thread(&self, state: &ViewState) -> Result<Rc<Thread>> {
        let thread = self.filtered_thread(state)?;
        self.preview_filtered
            .get((thread, state.preview_selection()))
    }

    /// The last selected summary strategy, downgraded to one this thread has
    /// data for.
    pub fn summary_strategy(&self, state: &ViewState) -> Result<CallTreeSummaryStrategy> {
        let thread = self.thread(state)?;
        self.summary_strategy
            .get((thread, state.summary_strategy()))
    }

    pub fn unfiltered_samples_for_call_tree(
        &self,
        state: &ViewState,
    ) -> Result<Rc<SamplesLikeTable>> {
        let thread = self.thread(state)?;
        let strategy = self.summary_strategy(state)?;
        self.unfiltered_samples.get((thread, strategy))
    }

    pub fn filtered_samples_for_call_tree(&self, state: &ViewState) -> Result<Rc<SamplesLikeTable>> {
        let thread = self.filtered_thread(state)?;
        let strategy = self.summary_strategy(state)?;
        self.filtered_samples.get((thread, strategy))
    }

    pub fn preview_filtered_samples_for_call_tree(
        &self,
        state: &ViewState,
    ) -> Result<Rc<SamplesLikeTable>> {
        let thread = self.preview_filtered_thread(state)?;
        let strategy = self.summary_strategy(state)?;
        self.preview_filtered_samples.get((thread, strategy))
    }

    /// Index of the first unfiltered sample inside the committed range.
    pub fn sample_index_offset_from_committed_range(&self, state: &ViewState) -> Result<usize> {
        let samples = self.unfiltered_samples_for_call_tree(state)?;
        self.committed_range_offset
            .get((samples, state.committed_range()))
    }

    /// Index of the first unfiltered sample inside the preview selection; the
    /// committed offset when there is no selection.
    pub fn sample_index_offset_from_preview_range(&self, state: &ViewState) -> Result<usize> {
        let committed = self.sample_index_offset_from_committed_range(state)?;
        let samples = self.filtered_samples_for_call_tree(state)?;
        self.preview_range_offset
            .get((committed, samples, state.preview_selection()))
    }

    pub fn string_table(&self, state: &ViewState) -> Result<Rc<StringTable>> {
        Ok(self.thread(state)?.strings.clone())
    }

    pub fn samples_table(&self, state: &ViewState) -> Result<Rc<SamplesTable>> {
        Ok(self.thread(state)?.samples.clone())
    }

    pub fn native_allocations(&self, state: &ViewState) -> Result<Option<Rc<NativeAllocationsTable>>> {
        Ok(self.thread(state)?.native_allocations.clone())
    }

    pub fn js_allocations(&self, state: &ViewState) -> Result<Option<Rc<JsAllocationsTable>>> {
        Ok(self.thread(state)?.js_allocations.clone())
    }

    pub fn js_tracer_table(&self, state: &ViewState) -> Result<Option<Rc<JsTracerTable>>> {
        Ok(self.thread(state)?.js_tracer.clone())
    }

    pub fn expensive_js_tracer_timing(
        &self,
        state: &ViewState,
    ) -> Result<Option<Rc<JsTracerTiming>>> {
        let thread = self.thread(state)?;
        self.js_tracer_timing
            .get((thread.js_tracer.clone(), thread.strings.clone()))
    }

    pub fn expensive_js_tracer_leaf_timing(
        &self,
        state: &ViewState,
    ) -> Result<Option<Rc<JsTracerTiming>>> {
        let thread = self.thread(state)?;
        self.js_tracer_leaf_timing
            .get((thread.js_tracer.clone(), thread.strings.clone()))
    }

    pub fn thread_range(&self, state: &ViewState) -> Result<CommittedRange> {
        let thread = self.thread(state)?;
        self.thread_range.get((thread, state.interval()))
    }

    pub fn friendly_thread_name(&self, state: &ViewState) -> Result<Rc<str>> {
        self.friendly_name.get(self.thread(state)?)
    }

    pub fn thread_process_details(&self, state: &ViewState) -> Result<Rc<str>> {
        self.process_details.get(self.thread(state)?)
    }

    pub fn view_options(&self, state: &ViewState) -> Rc<ThreadViewOptions> {
        state.view_options(&self.key)
    }

    pub fn has_useful_timing_samples(&self, state: &ViewState) -> Result<bool> {
        self.useful_timing_samples.get(self.samples_table(state)?)
    }

    pub fn has_useful_js_allocations(&self, state: &ViewState) -> Result<bool> {
        Ok(self
            .js_allocations(state)?
            .is_some_and(|table| !table.is_empty()))
    }

    pub fn has_useful_native_allocations(&self, state: &ViewState) -> Result<bool> {
        Ok(self
            .native_allocations(state)?
            .is_some_and(|table| !table.is_empty()))
    }

    /// Retained memory needs every allocation to carry its address.
    pub fn can_show_retained_memory(&self, state: &ViewState) -> Result<bool> {
        Ok(self
            .native_allocations(state)?
            .is_some_and(|table| table.is_balanced()))
    }

    pub fn has_event_delays(&self, state: &ViewState) -> Result<bool> {
        Ok(self.samples_table(state)?.event_delay.is_some())
    }

    /// Fails with [`Error::MissingEventDelays`](crate::Error::MissingEventDelays)
    /// unless [`has_event_delays`](Self::has_event_delays) holds.
    pub fn processed_event_delays(&self, state: &ViewState) -> Result<Rc<EventDelayInfo>> {
        let thread = self.thread(state)?;
        self.event_delays.get((thread, state.interval()))
    }

    /// Hit/miss counters of every stage, in pipeline order.
    pub fn cache_stats(&self) -> Vec<(&'static str, CacheStats)> {
        vec![
            (self.thread.name(), self.thread.stats()),
            (self.cpu_processed.name(), self.cpu_processed.stats()),
            (self.tab_filtered.name(), self.tab_filtered.stats()),
            (self.active_tab_filtered.name(), self.active_tab_filtered.stats()),
            (self.range_filtered.name(), self.range_filtered.stats()),
            (self.markers.name(), self.markers.stats()),
            (self.marker_indexes.name(), self.marker_indexes.stats()),
            (self.transform_context.name(), self.transform_context.stats()),
            (
                self.range_and_transform_filtered.name(),
                self.range_and_transform_filtered.stats(),
            ),
            ("apply_transform", self.transform_cache.stats()),
            (
                self.implementation_filtered.name(),
                self.implementation_filtered.stats(),
            ),
            (self.search_filtered.name(), self.search_filtered.stats()),
            (self.filtered.name(), self.filtered.stats()),
            (self.preview_filtered.name(), self.preview_filtered.stats()),
            (self.summary_strategy.name(), self.summary_strategy.stats()),
            (self.unfiltered_samples.name(), self.unfiltered_samples.stats()),
            (self.filtered_samples.name(), self.filtered_samples.stats()),
            (
                self.preview_filtered_samples.name(),
                self.preview_filtered_samples.stats(),
            ),
        ]
    }
}

impl std::fmt::Debug for ThreadSelectors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadSelectors")
            .field("key", &self.key)
            .field("transform_cache", &self.transform_cache)
            .finish_non_exhaustive()
    }
}

fn tab_cell(name: &'static str, ops: Rc<dyn ThreadOps>) -> ThreadCell<(Rc<Thread>, Windows, CategoryIndex)> {
    MemoCell::new(
        name,
        move |(thread, windows, default_category): &(Rc<Thread>, Windows, CategoryIndex)| {
            Ok(if windows.is_empty() {
                thread.clone()
            } else {
                Rc::new(ops.filter_to_tab(thread, windows, *default_category))
            })
        },
    )
}

fn samples_like_cell(name: &'static str, ops: Rc<dyn ThreadOps>) -> SamplesLikeCell {
    MemoCell::new(
        name,
        move |(thread, strategy): &(Rc<Thread>, CallTreeSummaryStrategy)| {
            ops.extract_samples_like(thread, *strategy).map(Rc::new)
        },
    )
}

fn thread_time_range(thread: &Thread, interval: f64) -> CommittedRange {
    let times = &thread.samples.time;
    match (times.first(), times.last()) {
        (Some(&first), Some(&last)) => CommittedRange {
            start: first,
            end: last + interval,
        },
        _ => CommittedRange {
            start: thread.register_time,
            end: thread.unregister_time.unwrap_or(thread.register_time),
        },
    }
}

/// Main threads are better known by their process.
pub fn friendly_thread_name(thread: &Thread) -> String {
    match &thread.process_name {
        Some(process) if thread.is_main_thread && !process.is_empty() => process.clone(),
        _ => thread.name.clone(),
    }
}

pub fn thread_process_details(thread: &Thread) -> String {
    let mut details = format!("Thread: \"{}\"", thread.name);
    if let Some(tid) = thread.tid {
        details.push_str(&format!(" ({tid})"));
    }
    if let Some(process) = &thread.process_name {
        details.push_str(&format!("\nProcess: \"{process}\" ({})", thread.pid));
    }
    details.push_str(&format!("\nType: {}", thread.process_type));
    details
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::ops::StandardOps;
    use crate::profile::{ProfileBuilder, ThreadBuilder};

    fn state() -> ViewState {
        let profile = ProfileBuilder::new()
            .thread(
                ThreadBuilder::new("GeckoMain")
                    .process("Web Content", 42, "tab")
                    .tid(7)
                    .main_thread()
                    .sample(0.0, "A;B")
                    .sample(1.0, "A;C")
                    .sample(2.0, "A;B"),
            )
            .thread(ThreadBuilder::new("Worker").sample(0.5, "W"))
            .build();
        ViewState::new(Rc::new(profile))
    }

    fn selectors(key: &str) -> ThreadSelectors {
        ThreadSelectors::new(key.parse().unwrap(), Rc::new(StandardOps))
    }

    #[test]
    fn single_thread_is_passed_through() {
        let state = state();
        let selectors = selectors("0");
        let thread = selectors.thread(&state).unwrap();
        assert!(Rc::ptr_eq(&thread, &state.profile().threads[0]));
    }

    #[test]
    fn merged_key_merges() {
        let state = state();
        let merged = selectors("0,1").thread(&state).unwrap();
        assert_eq!(merged.samples.time, vec![0.0, 0.5, 1.0, 2.0]);
    }

    #[test]
    fn unfiltered_stages_are_identity() {
        let state = state();
        let selectors = selectors("0");
        let cpu = selectors.cpu_processed_thread(&state).unwrap();
        let tab = selectors.tab_filtered_thread(&state).unwrap();
        assert!(Rc::ptr_eq(&cpu, &tab));

        let transformed = selectors.range_and_transform_filtered_thread(&state).unwrap();
        let filtered = selectors.filtered_thread(&state).unwrap();
        let preview = selectors.preview_filtered_thread(&state).unwrap();
        assert!(Rc::ptr_eq(&transformed, &filtered));
        assert!(Rc::ptr_eq(&filtered, &preview));
    }

    #[test]
    fn descriptive_strings() {
        let state = state();
        let selectors = selectors("0");
        assert_eq!(&*selectors.friendly_thread_name(&state).unwrap(), "Web Content");
        assert_eq!(
            &*selectors.thread_process_details(&state).unwrap(),
            "Thread: \"GeckoMain\" (7)\nProcess: \"Web Content\" (42)\nType: tab"
        );
        assert_eq!(
            selectors.thread_range(&state).unwrap(),
            CommittedRange {
                start: 0.0,
                end: 3.0
            }
        );
    }

    #[test]
    fn event_delays_need_the_column() {
        let state = state();
        let selectors = selectors("0");
        assert!(!selectors.has_event_delays(&state).unwrap());
        assert!(matches!(
            selectors.processed_event_delays(&state),
            Err(Error::MissingEventDelays { .. })
        ));

        let profile = ProfileBuilder::new()
            .thread(
                ThreadBuilder::new("Main")
                    .sample_with_event_delay(0.0, "A", Some(3.0))
                    .sample_with_event_delay(1.0, "A", None),
            )
            .build();
        let state = ViewState::new(Rc::new(profile));
        assert!(selectors.has_event_delays(&state).unwrap());
        let delays = selectors.processed_event_delays(&state).unwrap();
        assert_eq!(delays.delays, vec![3.0, 2.0]);
        assert!(Rc::ptr_eq(
            &delays,
            &selectors.processed_event_delays(&state).unwrap()
        ));
    }

    #[test]
    fn js_tracer_timings_are_cached() {
        let state = state();
        let selectors = selectors("0");
        assert!(selectors.js_tracer_table(&state).unwrap().is_none());
        assert!(selectors.expensive_js_tracer_timing(&state).unwrap().is_none());
        assert!(
            selectors
                .expensive_js_tracer_leaf_timing(&state)
                .unwrap()
                .is_none()
        );

        let profile = ProfileBuilder::new()
            .thread(
                ThreadBuilder::new("Main")
                    .tracer_event("outer", 0.0, 10.0)
                    .tracer_event("inner", 2.0, 3.0),
            )
            .build();
        let state = ViewState::new(Rc::new(profile));
        let timing = selectors.expensive_js_tracer_timing(&state).unwrap().unwrap();
        assert_eq!(timing.rows.len(), 2);
        assert_eq!(timing.rows[1].label, ["inner"]);
        let again = selectors.expensive_js_tracer_timing(&state).unwrap().unwrap();
        assert!(Rc::ptr_eq(&timing, &again));

        let leaf = selectors
            .expensive_js_tracer_leaf_timing(&state)
            .unwrap()
            .unwrap();
        assert_eq!(leaf.rows.len(), 1);
        assert_eq!(leaf.rows[0].label, ["outer", "inner", "outer"]);
    }

    #[test]
    fn view_options_are_per_key() {
        let mut state = state();
        let main = selectors("0");
        let worker = selectors("1");
        let untouched = worker.view_options(&state);

        state.update_view_options(main.key(), |options| {
            options.selected_call_node = vec![0, 1];
            options.expanded_call_nodes.push(vec![0]);
        });
        let options = main.view_options(&state);
        assert_eq!(options.selected_call_node, [0, 1]);
        assert_eq!(options.expanded_call_nodes, [vec![0]]);
        assert!(Rc::ptr_eq(&untouched, &worker.view_options(&state)));

        // An update that changes nothing keeps the same options.
        state.update_view_options(main.key(), |options| options.selected_marker = None);
        assert!(Rc::ptr_eq(&options, &main.view_options(&state)));
    }

    #[test]
    fn missing_thread_propagates() {
        let state = state();
        assert!(selectors("5").filtered_thread(&state).is_err());
    }
}
