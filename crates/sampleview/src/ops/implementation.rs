use super::stack_rewrite::filter_frames;
use crate::error::{Error, Result};
use crate::memo::value_identity;
use crate::profile::{CategoryIndex, FuncIndex, Thread};
use std::fmt;
use std::str::FromStr;

/// Which kind of code the call tree shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ImplementationFilter {
    #[default]
    Combined,
    Js,
    Cpp,
}

value_identity!(ImplementationFilter);

impl ImplementationFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            ImplementationFilter::Combined => "combined",
            ImplementationFilter::Js => "js",
            ImplementationFilter::Cpp => "cpp",
        }
    }

    /// Whether frames of `func` survive this filter.
    pub fn keeps(self, thread: &Thread, func: FuncIndex) -> bool {
        match self {
            ImplementationFilter::Combined => true,
            ImplementationFilter::Js => {
                thread.funcs.is_js[func] || thread.funcs.relevant_for_js[func]
            }
            ImplementationFilter::Cpp => !thread.funcs.is_js[func] && !is_probable_jit(thread, func),
        }
    }
}

/// Unsymbolicated code outside any library is most likely JIT output.
fn is_probable_jit(thread: &Thread, func: FuncIndex) -> bool {
    thread.funcs.resource[func].is_none() && thread.func_name(func).starts_with("0x")
}

impl fmt::Display for ImplementationFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImplementationFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "combined" => Ok(ImplementationFilter::Combined),
            "js" => Ok(ImplementationFilter::Js),
            "cpp" => Ok(ImplementationFilter::Cpp),
            other => Err(Error::InvalidArgument(format!(
                "unknown implementation filter '{other}' (expected combined, js or cpp)"
            ))),
        }
    }
}

pub fn filter_thread_by_implementation(
    thread: &Thread,
    implementation: ImplementationFilter,
    default_category: CategoryIndex,
) -> Thread {
    if implementation == ImplementationFilter::Combined {
        return thread.clone();
    }
    filter_frames(thread, default_category, |frame| {
        implementation.keeps(thread, thread.frames.func[frame])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ThreadBuilder;

    fn thread() -> Thread {
        ThreadBuilder::new("Main")
            .sample(0.0, "main[lib:app];run[js];0x7f00;alloc[relevant][lib:app]")
            .build()
    }

    #[test]
    fn js_keeps_js_and_relevant_functions() {
        let filtered = filter_thread_by_implementation(&thread(), ImplementationFilter::Js, 0);
        assert_eq!(filtered.sample_func_names(0), ["run", "alloc"]);
    }

    #[test]
    fn cpp_drops_js_and_jit_addresses() {
        let filtered = filter_thread_by_implementation(&thread(), ImplementationFilter::Cpp, 0);
        assert_eq!(filtered.sample_func_names(0), ["main", "alloc"]);
    }
}
