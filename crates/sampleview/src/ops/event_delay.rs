use crate::error::{Error, Result};
use crate::profile::Thread;

/// Per-sample event delays after processing, aligned with the samples table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventDelayInfo {
    pub delays: Vec<f64>,
    pub min_delay: f64,
    pub max_delay: f64,
}

impl EventDelayInfo {
    pub fn delay_range(&self) -> f64 {
        self.max_delay - self.min_delay
    }
}

/// Smooth the raw event delay column.
///
/// A recorded delay keeps blocking the queue after the sample that saw it, so
/// a sample reports at least what is left of the previous delay once the time
/// since that sample has elapsed. The first sample is assumed to follow its
/// predecessor by one interval.
pub fn process_event_delays(thread: &Thread, interval: f64) -> Result<EventDelayInfo> {
    let Some(recorded) = &thread.samples.event_delay else {
        return Err(Error::MissingEventDelays {
            thread: thread.name.clone(),
        });
    };

    let times = &thread.samples.time;
    let mut delays = Vec::with_capacity(recorded.len());
    let mut previous = 0.0_f64;
    for (i, delay) in recorded.iter().enumerate() {
        let gap = if i == 0 { interval } else { times[i] - times[i - 1] };
        let carried = (previous - gap).max(0.0);
        let current = delay.unwrap_or(0.0).max(carried);
        delays.push(current);
        previous = current;
    }

    let min_delay = delays.iter().copied().fold(f64::INFINITY, f64::min);
    let max_delay = delays.iter().copied().fold(0.0, f64::max);
    Ok(EventDelayInfo {
        min_delay: if delays.is_empty() { 0.0 } else { min_delay },
        max_delay,
        delays,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ThreadBuilder;

    #[test]
    fn long_delays_carry_over() {
        let thread = ThreadBuilder::new("Main")
            .sample_with_event_delay(0.0, "A", Some(5.0))
            .sample_with_event_delay(1.0, "A", Some(0.0))
            .sample_with_event_delay(2.0, "A", None)
            .sample_with_event_delay(10.0, "A", Some(1.0))
            .build();
        let info = process_event_delays(&thread, 1.0).unwrap();
        assert_eq!(info.delays, vec![5.0, 4.0, 3.0, 1.0]);
        assert_eq!(info.max_delay, 5.0);
        assert_eq!(info.delay_range(), 4.0);
    }

    #[test]
    fn missing_column_is_an_error() {
        let thread = ThreadBuilder::new("Main").sample(0.0, "A").build();
        assert!(matches!(
            process_event_delays(&thread, 1.0),
            Err(Error::MissingEventDelays { .. })
        ));
    }
}
