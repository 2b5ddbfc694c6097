use crate::profile::{JsTracerTable, Thread};
use std::ops::Range;
use std::rc::Rc;

/// Row range of a sorted `times` column falling inside `[start, end)`.
pub fn sample_index_range(times: &[f64], start: f64, end: f64) -> Range<usize> {
    let first = times.partition_point(|&t| t < start);
    let last = times.partition_point(|&t| t < end).max(first);
    first..last
}

/// Drop every sample, allocation, marker and tracer event outside
/// `[start, end)`. Stack-shaped tables are shared with the input.
pub fn filter_thread_to_range(thread: &Thread, start: f64, end: f64) -> Thread {
    let samples = {
        let rows = sample_index_range(&thread.samples.time, start, end);
        Rc::new(thread.samples.slice(rows.start, rows.end))
    };
    let native_allocations = thread.native_allocations.as_ref().map(|table| {
        let rows = sample_index_range(&table.time, start, end);
        Rc::new(table.slice(rows.start, rows.end))
    });
    let js_allocations = thread.js_allocations.as_ref().map(|table| {
        let rows = sample_index_range(&table.time, start, end);
        Rc::new(table.slice(rows.start, rows.end))
    });
    let js_tracer = thread
        .js_tracer
        .as_ref()
        .map(|tracer| Rc::new(tracer_in_range(tracer, start, end)));

    Thread {
        samples,
        native_allocations,
        js_allocations,
        markers: Rc::new(thread.markers.retain_range(start, end)),
        js_tracer,
        ..thread.clone()
    }
}

fn tracer_in_range(tracer: &JsTracerTable, start: f64, end: f64) -> JsTracerTable {
    let mut out = JsTracerTable::default();
    for i in 0..tracer.len() {
        let event_start = tracer.timestamp[i];
        let event_end = event_start + tracer.duration[i].unwrap_or(0.0);
        if event_start < end && event_end >= start {
            out.event.push(tracer.event[i]);
            out.timestamp.push(event_start);
            out.duration.push(tracer.duration[i]);
            out.line.push(tracer.line[i]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ThreadBuilder;

    fn thread() -> Thread {
        ThreadBuilder::new("Main")
            .sample(0.0, "A")
            .sample(1.0, "A;B")
            .sample(2.0, "A;C")
            .sample(3.0, "A")
            .native_allocation(1.5, "A;B", 32.0)
            .marker("Paint", 2.5, None)
            .build()
    }

    #[test]
    fn end_is_exclusive() {
        let filtered = filter_thread_to_range(&thread(), 1.0, 3.0);
        assert_eq!(filtered.samples.time, vec![1.0, 2.0]);
        assert_eq!(filtered.native_allocations.unwrap().len(), 1);
        assert_eq!(filtered.markers.len(), 1);
    }

    #[test]
    fn filtering_twice_changes_nothing() {
        let once = filter_thread_to_range(&thread(), 0.5, 2.5);
        let twice = filter_thread_to_range(&once, 0.5, 2.5);
        assert_eq!(once.samples, twice.samples);
        assert_eq!(once.markers, twice.markers);
        assert_eq!(once.native_allocations, twice.native_allocations);
    }

    #[test]
    fn inverted_range_is_empty() {
        assert_eq!(sample_index_range(&[0.0, 1.0, 2.0], 2.0, 1.0), 2..2);
        assert_eq!(sample_index_range(&[], 0.0, 1.0), 0..0);
    }
}
