//! View parameters the derived-value pipeline reads.
//!
//! Every setter keeps a value's identity when its content does not change, so
//! memoized stages downstream of an untouched parameter stay cached.

use crate::error::{Error, Result};
use crate::memo::value_identity;
use crate::ops::ImplementationFilter;
use crate::profile::{
    Category, CategoryIndex, CpuDeltaUnit, InnerWindowId, MarkerSchemaByName, Profile, ThreadsKey,
};
use crate::summary::CallTreeSummaryStrategy;
use crate::transforms::{CallNodePath, Transform, TransformStack};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// The time range the user zoomed into, `[start, end)` in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommittedRange {
    pub start: f64,
    pub end: f64,
}

value_identity!(CommittedRange);

impl CommittedRange {
    pub fn new(start: f64, end: f64) -> Result<Self> {
        if start.is_nan() || end.is_nan() || start > end {
            return Err(Error::InvalidArgument(format!(
                "range start {start} is after its end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, other_start: f64, other_end: f64) -> bool {
        self.start <= other_start && other_end <= self.end
    }
}

/// A not yet committed sub-selection of the committed range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewSelection {
    pub start: f64,
    pub end: f64,
}

value_identity!(PreviewSelection);

/// Per thread-view UI state that survives filter changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadViewOptions {
    pub selected_call_node: CallNodePath,
    pub selected_inverted_call_node: CallNodePath,
    pub expanded_call_nodes: Vec<CallNodePath>,
    pub selected_marker: Option<usize>,
}

/// The full set of view parameters for one loaded profile.
#[derive(Debug, Clone)]
pub struct ViewState {
    profile: Rc<Profile>,
    committed_range: CommittedRange,
    preview_selection: Option<PreviewSelection>,
    current_tab_windows: Rc<HashSet<InnerWindowId>>,
    active_tab_windows: Rc<HashSet<InnerWindowId>>,
    transforms: HashMap<ThreadsKey, Rc<TransformStack>>,
    empty_transforms: Rc<TransformStack>,
    implementation: ImplementationFilter,
    search_strings: Rc<Vec<String>>,
    invert_call_stack: bool,
    summary_strategy: CallTreeSummaryStrategy,
    view_options: HashMap<ThreadsKey, Rc<ThreadViewOptions>>,
    default_view_options: Rc<ThreadViewOptions>,
}

impl ViewState {
    /// Fresh state showing the whole profile unfiltered.
    pub fn new(profile: Rc<Profile>) -> Self {
        let committed_range = profile_root_range(&profile);
        Self {
            profile,
            committed_range,
            preview_selection: None,
            current_tab_windows: Rc::new(HashSet::new()),
            active_tab_windows: Rc::new(HashSet::new()),
            transforms: HashMap::new(),
            empty_transforms: Rc::new(Vec::new()),
            implementation: ImplementationFilter::Combined,
            search_strings: Rc::new(Vec::new()),
            invert_call_stack: false,
            summary_strategy: CallTreeSummaryStrategy::Timing,
            view_options: HashMap::new(),
            default_view_options: Rc::new(ThreadViewOptions::default()),
        }
    }

    pub fn profile(&self) -> &Rc<Profile> {
        &self.profile
    }

    pub fn interval(&self) -> f64 {
        self.profile.meta.interval
    }

    pub fn cpu_delta_unit(&self) -> Option<CpuDeltaUnit> {
        self.profile.meta.cpu_delta_unit
    }

    pub fn categories(&self) -> &Rc<Vec<Category>> {
        &self.profile.meta.categories
    }

    pub fn default_category(&self) -> CategoryIndex {
        self.profile.meta.default_category()
    }

    pub fn marker_schema(&self) -> &Rc<MarkerSchemaByName> {
        &self.profile.meta.marker_schema
    }

    pub fn committed_range(&self) -> CommittedRange {
        self.committed_range
    }

    pub fn preview_selection(&self) -> Option<PreviewSelection> {
        self.preview_selection
    }

    pub fn current_tab_windows(&self) -> &Rc<HashSet<InnerWindowId>> {
        &self.current_tab_windows
    }

    pub fn active_tab_windows(&self) -> &Rc<HashSet<InnerWindowId>> {
        &self.active_tab_windows
    }

    /// The transform stack of `key`; every key without transforms shares one
    /// empty stack.
    pub fn transform_stack(&self, key: &ThreadsKey) -> Rc<TransformStack> {
        self.transforms
            .get(key)
            .unwrap_or(&self.empty_transforms)
            .clone()
    }

    pub fn implementation(&self) -> ImplementationFilter {
        self.implementation
    }

    pub fn search_strings(&self) -> &Rc<Vec<String>> {
        &self.search_strings
    }

    pub fn invert_call_stack(&self) -> bool {
        self.invert_call_stack
    }

    pub fn summary_strategy(&self) -> CallTreeSummaryStrategy {
        self.summary_strategy
    }

    pub fn view_options(&self, key: &ThreadsKey) -> Rc<ThreadViewOptions> {
        self.view_options
            .get(key)
            .unwrap_or(&self.default_view_options)
            .clone()
    }

    /// Zoom into `[start, end)`. Any preview selection is dropped.
    pub fn commit_range(&mut self, start: f64, end: f64) -> Result<()> {
        self.committed_range = CommittedRange::new(start, end)?;
        self.preview_selection = None;
        Ok(())
    }

    pub fn set_preview_selection(&mut self, selection: Option<PreviewSelection>) -> Result<()> {
        if let Some(selection) = selection
            && (selection.start > selection.end
                || !self.committed_range.contains(selection.start, selection.end))
        {
            return Err(Error::InvalidArgument(format!(
                "preview selection {}..{} is not inside the committed range {}..{}",
                selection.start, selection.end, self.committed_range.start, self.committed_range.end
            )));
        }
        self.preview_selection = selection;
        Ok(())
    }

    /// Restrict frames to the windows of browser tab `tab_id`, or lift the
    /// restriction with `None`.
    pub fn set_current_tab(&mut self, tab_id: Option<u64>) {
        let windows = self.tab_windows(tab_id);
        replace_if_changed(&mut self.current_tab_windows, windows);
    }

    pub fn set_active_tab(&mut self, tab_id: Option<u64>) {
        let windows = self.tab_windows(tab_id);
        replace_if_changed(&mut self.active_tab_windows, windows);
    }

    fn tab_windows(&self, tab_id: Option<u64>) -> HashSet<InnerWindowId> {
        let Some(tab_id) = tab_id else {
            return HashSet::new();
        };
        self.profile
            .meta
            .pages
            .iter()
            .filter(|page| page.tab_id == tab_id)
            .map(|page| page.inner_window_id)
            .collect()
    }

    pub fn push_transform(&mut self, key: &ThreadsKey, transform: Transform) {
        let mut stack = (*self.transform_stack(key)).clone();
        stack.push(transform);
        self.transforms.insert(key.clone(), Rc::new(stack));
    }

    /// Drop the transform at `index` and everything pushed after it.
    pub fn pop_transforms_from(&mut self, key: &ThreadsKey, index: usize) {
        let current = self.transform_stack(key);
        if index >= current.len() {
            return;
        }
        self.transforms
            .insert(key.clone(), Rc::new(current[..index].to_vec()));
    }

    pub fn remove_transform(&mut self, key: &ThreadsKey, index: usize) -> Result<Transform> {
        let mut stack = (*self.transform_stack(key)).clone();
        if index >= stack.len() {
            return Err(Error::InvalidArgument(format!(
                "thread {key} has no transform {index} ({} applied)",
                stack.len()
            )));
        }
        let removed = stack.remove(index);
        self.transforms.insert(key.clone(), Rc::new(stack));
        Ok(removed)
    }

    pub fn set_transforms(&mut self, key: &ThreadsKey, stack: TransformStack) {
        let empty = self.empty_transforms.clone();
        let slot = self.transforms.entry(key.clone()).or_insert(empty);
        replace_if_changed(slot, stack);
    }

    pub fn set_implementation(&mut self, implementation: ImplementationFilter) {
        self.implementation = implementation;
    }

    /// Set the call tree search. Comma separated parts are searched
    /// independently; a sample matching any of them is kept.
    pub fn set_search_text(&mut self, text: &str) {
        let strings: Vec<String> = text
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        replace_if_changed(&mut self.search_strings, strings);
    }

    pub fn set_invert_call_stack(&mut self, invert: bool) {
        self.invert_call_stack = invert;
    }

    pub fn set_summary_strategy(&mut self, strategy: CallTreeSummaryStrategy) {
        self.summary_strategy = strategy;
    }

    pub fn update_view_options(
        &mut self,
        key: &ThreadsKey,
        update: impl FnOnce(&mut ThreadViewOptions),
    ) {
        let mut options = (*self.view_options(key)).clone();
        update(&mut options);
        let default = self.default_view_options.clone();
        let slot = self.view_options.entry(key.clone()).or_insert(default);
        replace_if_changed(slot, options);
    }
}

fn replace_if_changed<T: PartialEq>(slot: &mut Rc<T>, value: T) {
    if **slot != value {
        *slot = Rc::new(value);
    }
}

/// Time span covering every sample and allocation of every thread, with one
/// interval of room after the last one.
pub fn profile_root_range(profile: &Profile) -> CommittedRange {
    let mut start = f64::INFINITY;
    let mut end = f64::NEG_INFINITY;
    for thread in &profile.threads {
        let columns = std::iter::once(&thread.samples.time)
            .chain(thread.native_allocations.iter().map(|t| &t.time))
            .chain(thread.js_allocations.iter().map(|t| &t.time));
        for times in columns {
            if let (Some(&first), Some(&last)) = (times.first(), times.last()) {
                start = start.min(first);
                end = end.max(last + profile.meta.interval);
            }
        }
    }
    if start > end {
        return CommittedRange {
            start: 0.0,
            end: 0.0,
        };
    }
    CommittedRange { start, end }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{ProfileBuilder, ThreadBuilder};

    fn state() -> ViewState {
        let profile = ProfileBuilder::new()
            .interval(1.0)
            .page(1, 10, "https://a.example")
            .page(1, 11, "https://a.example/frame")
            .page(2, 20, "https://b.example")
            .thread(ThreadBuilder::new("Main").sample(5.0, "A").sample(9.0, "A"))
            .build();
        ViewState::new(Rc::new(profile))
    }

    #[test]
    fn root_range_covers_the_last_interval() {
        assert_eq!(
            state().committed_range(),
            CommittedRange {
                start: 5.0,
                end: 10.0
            }
        );
    }

    #[test]
    fn unchanged_search_keeps_identity() {
        let mut state = state();
        state.set_search_text("foo, bar");
        let before = state.search_strings().clone();
        state.set_search_text(" foo,bar ,");
        assert!(Rc::ptr_eq(&before, state.search_strings()));
        assert_eq!(*before, vec!["foo".to_string(), "bar".to_string()]);

        state.set_search_text("baz");
        assert!(!Rc::ptr_eq(&before, state.search_strings()));
    }

    #[test]
    fn committing_clears_the_preview() {
        let mut state = state();
        state
            .set_preview_selection(Some(PreviewSelection { start: 6.0, end: 7.0 }))
            .unwrap();
        state.commit_range(6.0, 8.0).unwrap();
        assert_eq!(state.preview_selection(), None);
        assert!(
            state
                .set_preview_selection(Some(PreviewSelection { start: 5.0, end: 7.0 }))
                .is_err()
        );
        assert!(state.commit_range(3.0, 2.0).is_err());
    }

    #[test]
    fn tab_windows_come_from_pages() {
        let mut state = state();
        state.set_current_tab(Some(1));
        assert_eq!(**state.current_tab_windows(), HashSet::from([10, 11]));
        let before = state.current_tab_windows().clone();
        state.set_current_tab(Some(1));
        assert!(Rc::ptr_eq(&before, state.current_tab_windows()));
        assert!(state.active_tab_windows().is_empty());
    }

    #[test]
    fn transform_stack_edits() {
        let mut state = state();
        let key = ThreadsKey::single(0);
        let empty = state.transform_stack(&key);
        assert!(Rc::ptr_eq(&empty, &state.transform_stack(&ThreadsKey::single(3))));

        state.push_transform(&key, Transform::MergeFunction { func: 0 });
        state.push_transform(&key, Transform::DropFunction { func: 1 });
        state.push_transform(&key, Transform::FocusFunction { func: 2 });
        assert_eq!(state.transform_stack(&key).len(), 3);

        let removed = state.remove_transform(&key, 1).unwrap();
        assert_eq!(removed, Transform::DropFunction { func: 1 });
        state.pop_transforms_from(&key, 1);
        assert_eq!(
            *state.transform_stack(&key),
            vec![Transform::MergeFunction { func: 0 }]
        );

        let before = state.transform_stack(&key);
        state.set_transforms(&key, vec![Transform::MergeFunction { func: 0 }]);
        assert!(Rc::ptr_eq(&before, &state.transform_stack(&key)));
    }
}
