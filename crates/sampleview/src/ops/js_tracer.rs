//! Timing rows for the JS tracer chart.

use crate::profile::{JsTracerTable, StringTable};

/// Non-overlapping boxes of one chart row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingRow {
    pub start: Vec<f64>,
    pub end: Vec<f64>,
    pub label: Vec<String>,
    /// Row of the tracer table each box came from.
    pub event: Vec<usize>,
}

impl TimingRow {
    fn push(&mut self, start: f64, end: f64, label: &str, event: usize) {
        self.start.push(start);
        self.end.push(end);
        self.label.push(label.to_string());
        self.event.push(event);
    }

    pub fn len(&self) -> usize {
        self.start.len()
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsTracerTiming {
    pub rows: Vec<TimingRow>,
}

/// Lay tracer events out by nesting depth. Row 0 holds the outermost events.
/// A child reaching past its parent's end is clipped to it.
pub fn js_tracer_timing(tracer: &JsTracerTable, strings: &StringTable) -> JsTracerTiming {
    let mut rows: Vec<TimingRow> = Vec::new();
    let mut open_ends: Vec<f64> = Vec::new();

    for event in sorted_events(tracer) {
        let start = tracer.timestamp[event];
        while open_ends.last().is_some_and(|&end| end <= start) {
            open_ends.pop();
        }
        let mut end = start + tracer.duration[event].unwrap_or(0.0);
        if let Some(&parent_end) = open_ends.last() {
            end = end.min(parent_end);
        }

        let depth = open_ends.len();
        if rows.len() <= depth {
            rows.resize_with(depth + 1, TimingRow::default);
        }
        rows[depth].push(start, end, strings.get_or_empty(tracer.event[event]), event);
        open_ends.push(end);
    }

    JsTracerTiming { rows }
}

/// A single row in which every instant belongs to the innermost event open at
/// that time.
pub fn js_tracer_leaf_timing(tracer: &JsTracerTable, strings: &StringTable) -> JsTracerTiming {
    let mut row = TimingRow::default();
    let mut open: Vec<(f64, usize)> = Vec::new();
    let mut cursor = f64::NEG_INFINITY;

    let emit = |row: &mut TimingRow, from: f64, to: f64, event: usize| {
        if to > from {
            row.push(from, to, strings.get_or_empty(tracer.event[event]), event);
        }
    };

    for event in sorted_events(tracer) {
        let start = tracer.timestamp[event];
        while let Some(&(end, closing)) = open.last()
            && end <= start
        {
            emit(&mut row, cursor, end, closing);
            cursor = end;
            open.pop();
        }
        if let Some(&(_, parent)) = open.last() {
            emit(&mut row, cursor, start, parent);
        }

        let mut end = start + tracer.duration[event].unwrap_or(0.0);
        if let Some(&(parent_end, _)) = open.last() {
            end = end.min(parent_end);
        }
        cursor = start;
        open.push((end, event));
    }
    while let Some((end, closing)) = open.pop() {
        emit(&mut row, cursor, end, closing);
        cursor = cursor.max(end);
    }

    JsTracerTiming { rows: vec![row] }
}

fn sorted_events(tracer: &JsTracerTable) -> Vec<usize> {
    let mut order: Vec<usize> = (0..tracer.len()).collect();
    order.sort_by(|&a, &b| tracer.timestamp[a].total_cmp(&tracer.timestamp[b]));
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ThreadBuilder;

    fn tracer() -> (JsTracerTable, StringTable) {
        let thread = ThreadBuilder::new("Main")
            .tracer_event("outer", 0.0, 10.0)
            .tracer_event("inner", 2.0, 3.0)
            .tracer_event("next", 12.0, 1.0)
            .build();
        let tracer = thread.js_tracer.as_deref().cloned().unwrap();
        (tracer, (*thread.strings).clone())
    }

    #[test]
    fn nesting_depth_picks_the_row() {
        let (tracer, strings) = tracer();
        let timing = js_tracer_timing(&tracer, &strings);
        assert_eq!(timing.rows.len(), 2);
        assert_eq!(timing.rows[0].label, ["outer", "next"]);
        assert_eq!(timing.rows[1].label, ["inner"]);
    }

    #[test]
    fn leaf_timing_splits_the_parent_around_children() {
        let (tracer, strings) = tracer();
        let row = &js_tracer_leaf_timing(&tracer, &strings).rows[0];
        assert_eq!(row.label, ["outer", "inner", "outer", "next"]);
        assert_eq!(row.start, vec![0.0, 2.0, 5.0, 12.0]);
        assert_eq!(row.end, vec![2.0, 5.0, 10.0, 13.0]);
    }
}
