use crate::profile::{CpuDeltaUnit, SamplesTable, Thread};
use std::rc::Rc;

/// Rewrite the CPU delta column into milliseconds of CPU time per sample.
///
/// Time-based units are converted and capped at the wall-clock time since the
/// previous sample (the sampling interval for the first one). Cycle counts
/// carry no absolute scale, so they are normalized against the busiest sample,
/// which ends up at exactly its wall-clock delta.
pub fn process_thread_cpu_delta(thread: &Thread, unit: CpuDeltaUnit, interval: f64) -> Thread {
    let Some(deltas) = &thread.samples.thread_cpu_delta else {
        return thread.clone();
    };
    let times = &thread.samples.time;
    let wall = |i: usize| if i == 0 { interval } else { times[i] - times[i - 1] };

    let processed: Vec<Option<f64>> = match unit {
        CpuDeltaUnit::Nanoseconds | CpuDeltaUnit::Microseconds => {
            let per_ms = if unit == CpuDeltaUnit::Nanoseconds {
                1e6
            } else {
                1e3
            };
            deltas
                .iter()
                .enumerate()
                .map(|(i, delta)| delta.map(|d| (d / per_ms).min(wall(i))))
                .collect()
        }
        CpuDeltaUnit::VariableCpuCycles => {
            let max_ratio = deltas
                .iter()
                .enumerate()
                .filter_map(|(i, delta)| {
                    let wall = wall(i);
                    delta.filter(|_| wall > 0.0).map(|d| d / wall)
                })
                .fold(0.0_f64, f64::max);
            deltas
                .iter()
                .map(|delta| {
                    delta.map(|d| if max_ratio > 0.0 { d / max_ratio } else { 0.0 })
                })
                .collect()
        }
    };

    Thread {
        samples: Rc::new(SamplesTable {
            thread_cpu_delta: Some(processed),
            ..(*thread.samples).clone()
        }),
        ..thread.clone()
    }
}
