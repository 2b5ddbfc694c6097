pub mod builder;
mod markers;
pub mod tables;
mod thread;

pub use builder::{DEFAULT_CATEGORIES, ProfileBuilder, ThreadBuilder};
pub use markers::{Marker, derive_markers};
pub use tables::*;
pub use thread::{Thread, ThreadsKey};

use crate::error::{Error, Result};
use crate::memo::value_identity;
use std::collections::HashMap;
use std::rc::Rc;

/// A recorded profile: shared metadata plus one entry per recorded thread.
#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub meta: ProfileMeta,
    pub threads: Vec<Rc<Thread>>,
}

impl Profile {
    pub fn thread(&self, index: usize) -> Result<&Rc<Thread>> {
        self.threads.get(index).ok_or(Error::ThreadIndexOutOfRange {
            index,
            count: self.threads.len(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfileMeta {
    pub product: String,
    /// Sampling interval in milliseconds.
    pub interval: f64,
    /// Profile start, milliseconds since the Unix epoch.
    pub start_time: f64,
    pub cpu_delta_unit: Option<CpuDeltaUnit>,
    pub categories: Rc<Vec<Category>>,
    pub marker_schema: Rc<MarkerSchemaByName>,
    pub pages: Rc<Vec<Page>>,
}

impl ProfileMeta {
    /// Category used for stacks whose frames carry no category: the first
    /// grey one, or the first one if none is grey.
    pub fn default_category(&self) -> CategoryIndex {
        default_category(&self.categories)
    }
}

pub fn default_category(categories: &[Category]) -> CategoryIndex {
    categories
        .iter()
        .position(|c| c.color == "grey")
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub color: String,
}

impl Category {
    pub fn new(name: &str, color: &str) -> Self {
        Self {
            name: name.to_string(),
            color: color.to_string(),
        }
    }
}

/// Unit of the per-sample CPU delta column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpuDeltaUnit {
    Nanoseconds,
    Microseconds,
    VariableCpuCycles,
}

impl CpuDeltaUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            CpuDeltaUnit::Nanoseconds => "ns",
            CpuDeltaUnit::Microseconds => "µs",
            CpuDeltaUnit::VariableCpuCycles => "variable CPU cycles",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ns" => Some(CpuDeltaUnit::Nanoseconds),
            "µs" | "us" => Some(CpuDeltaUnit::Microseconds),
            "variable CPU cycles" => Some(CpuDeltaUnit::VariableCpuCycles),
            _ => None,
        }
    }
}

value_identity!(CpuDeltaUnit);

/// How marker payloads of one type are searched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSchema {
    pub name: String,
    /// Payload field keys that take part in marker search.
    pub searchable: Vec<String>,
}

pub type MarkerSchemaByName = HashMap<String, MarkerSchema>;

/// A document loaded in a browser tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub tab_id: u64,
    pub inner_window_id: InnerWindowId,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_category_prefers_grey() {
        let categories = vec![
            Category::new("Idle", "transparent"),
            Category::new("Other", "grey"),
            Category::new("JavaScript", "yellow"),
        ];
        assert_eq!(default_category(&categories), 1);
        assert_eq!(default_category(&categories[2..]), 0);
    }

    #[test]
    fn missing_thread_is_an_error() {
        let profile = Profile::default();
        assert!(matches!(
            profile.thread(2),
            Err(Error::ThreadIndexOutOfRange { index: 2, count: 0 })
        ));
    }
}
