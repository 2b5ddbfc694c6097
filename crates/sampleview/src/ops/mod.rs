//! The pure thread-level operations the selector pipeline is built from.
//!
//! The pipeline only ever reaches these through [`ThreadOps`], so an embedder
//! (or a test) can swap any single operation while keeping the rest.

mod cpu;
mod event_delay;
mod implementation;
mod invert;
mod js_tracer;
mod merge;
mod range;
mod samples_like;
mod search;
mod stack_rewrite;
mod tab;

pub use cpu::process_thread_cpu_delta;
pub use event_delay::{EventDelayInfo, process_event_delays};
pub use implementation::{ImplementationFilter, filter_thread_by_implementation};
pub use invert::invert_call_stack;
pub use js_tracer::{JsTracerTiming, TimingRow, js_tracer_leaf_timing, js_tracer_timing};
pub use merge::merge_threads;
pub use range::{filter_thread_to_range, sample_index_range};
pub use samples_like::{SamplesLikeTable, extract_samples_like_table};
pub use search::filter_thread_to_search_strings;
pub use stack_rewrite::{StackRewriter, drop_samples_by_stack, filter_frames, filter_stacks};
pub use tab::filter_thread_to_tab;

use crate::error::Result;
use crate::profile::{
    CategoryIndex, CpuDeltaUnit, InnerWindowId, JsTracerTable, StringTable, Thread,
};
use crate::summary::CallTreeSummaryStrategy;
use crate::transforms::{Transform, TransformContext, apply_transform};
use std::collections::HashSet;
use std::rc::Rc;

/// Every collaborator the derived-value pipeline invokes.
///
/// Each method must be pure. The default bodies are the standard
/// implementations; identity shortcuts (returning the input thread untouched)
/// are decided by the pipeline before these are called.
pub trait ThreadOps {
    fn merge_threads(&self, threads: &[Rc<Thread>]) -> Result<Thread> {
        merge_threads(threads)
    }

    fn process_cpu_delta(&self, thread: &Thread, unit: CpuDeltaUnit, interval: f64) -> Thread {
        process_thread_cpu_delta(thread, unit, interval)
    }

    fn filter_to_tab(
        &self,
        thread: &Thread,
        windows: &HashSet<InnerWindowId>,
        default_category: CategoryIndex,
    ) -> Thread {
        filter_thread_to_tab(thread, windows, default_category)
    }

    fn filter_to_range(&self, thread: &Thread, start: f64, end: f64) -> Thread {
        filter_thread_to_range(thread, start, end)
    }

    fn apply_transform(
        &self,
        thread: &Thread,
        transform: &Transform,
        context: &TransformContext,
    ) -> Result<Thread> {
        apply_transform(thread, transform, context)
    }

    fn filter_by_implementation(
        &self,
        thread: &Thread,
        implementation: ImplementationFilter,
        default_category: CategoryIndex,
    ) -> Thread {
        filter_thread_by_implementation(thread, implementation, default_category)
    }

    fn filter_by_search(&self, thread: &Thread, search_strings: &[String]) -> Thread {
        filter_thread_to_search_strings(thread, search_strings)
    }

    fn invert_call_stack(&self, thread: &Thread, default_category: CategoryIndex) -> Thread {
        invert_call_stack(thread, default_category)
    }

    fn extract_samples_like(
        &self,
        thread: &Thread,
        strategy: CallTreeSummaryStrategy,
    ) -> Result<SamplesLikeTable> {
        extract_samples_like_table(thread, strategy)
    }

    fn process_event_delays(&self, thread: &Thread, interval: f64) -> Result<EventDelayInfo> {
        process_event_delays(thread, interval)
    }

    fn js_tracer_timing(&self, tracer: &JsTracerTable, strings: &StringTable) -> JsTracerTiming {
        js_tracer_timing(tracer, strings)
    }

    fn js_tracer_leaf_timing(
        &self,
        tracer: &JsTracerTable,
        strings: &StringTable,
    ) -> JsTracerTiming {
        js_tracer_leaf_timing(tracer, strings)
    }
}

/// The stock implementation of every operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardOps;

impl ThreadOps for StandardOps {}
