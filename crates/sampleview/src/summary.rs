//! Which table a call tree is summarized from.

use crate::error::{Error, Result};
use crate::memo::value_identity;
use crate::profile::Thread;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CallTreeSummaryStrategy {
    #[default]
    Timing,
    JsAllocations,
    NativeAllocations,
    NativeRetainedAllocations,
    NativeDeallocationsSites,
    NativeDeallocationsMemory,
}

value_identity!(CallTreeSummaryStrategy);

impl CallTreeSummaryStrategy {
    pub const ALL: [CallTreeSummaryStrategy; 6] = [
        CallTreeSummaryStrategy::Timing,
        CallTreeSummaryStrategy::JsAllocations,
        CallTreeSummaryStrategy::NativeAllocations,
        CallTreeSummaryStrategy::NativeRetainedAllocations,
        CallTreeSummaryStrategy::NativeDeallocationsSites,
        CallTreeSummaryStrategy::NativeDeallocationsMemory,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CallTreeSummaryStrategy::Timing => "timing",
            CallTreeSummaryStrategy::JsAllocations => "js-allocations",
            CallTreeSummaryStrategy::NativeAllocations => "native-allocations",
            CallTreeSummaryStrategy::NativeRetainedAllocations => "native-retained-allocations",
            CallTreeSummaryStrategy::NativeDeallocationsSites => "native-deallocations-sites",
            CallTreeSummaryStrategy::NativeDeallocationsMemory => "native-deallocations-memory",
        }
    }

    /// Pairing allocations with deallocations needs their memory addresses.
    pub fn needs_memory_addresses(self) -> bool {
        matches!(
            self,
            CallTreeSummaryStrategy::NativeRetainedAllocations
                | CallTreeSummaryStrategy::NativeDeallocationsMemory
        )
    }

    pub fn is_native(self) -> bool {
        matches!(
            self,
            CallTreeSummaryStrategy::NativeAllocations
                | CallTreeSummaryStrategy::NativeRetainedAllocations
                | CallTreeSummaryStrategy::NativeDeallocationsSites
                | CallTreeSummaryStrategy::NativeDeallocationsMemory
        )
    }
}

impl fmt::Display for CallTreeSummaryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallTreeSummaryStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown summary strategy '{s}'")))
    }
}

/// Downgrade `requested` to a strategy the thread actually has data for.
pub fn resolve_summary_strategy(
    thread: &Thread,
    requested: CallTreeSummaryStrategy,
) -> CallTreeSummaryStrategy {
    use CallTreeSummaryStrategy::*;

    match requested {
        Timing => match &thread.native_allocations {
            Some(native) if thread.samples.is_empty() && !native.is_empty() => NativeAllocations,
            _ => Timing,
        },
        JsAllocations => {
            if thread.js_allocations.is_some() {
                JsAllocations
            } else {
                Timing
            }
        }
        NativeAllocations
        | NativeRetainedAllocations
        | NativeDeallocationsSites
        | NativeDeallocationsMemory => {
            if thread.native_allocations.is_some() {
                requested
            } else {
                Timing
            }
        }
    }
}
