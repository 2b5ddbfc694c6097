//! Call tree transforms and the cached fold that applies a stack of them.

mod apply;
mod cache;

pub use apply::apply_transform;
pub use cache::{TransformCache, TransformContext, TransformKey};

use crate::error::{Error, Result};
use crate::ops::ImplementationFilter;
use crate::profile::{CategoryIndex, FuncIndex, ResourceIndex, Thread};
use std::fmt;
use std::str::FromStr;

/// Function indexes from a root call node down to the node itself.
pub type CallNodePath = Vec<FuncIndex>;

/// Transforms in application order.
pub type TransformStack = Vec<Transform>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Transform {
    /// Re-root the tree at one call node. `inverted` paths start at a leaf.
    FocusSubtree {
        path: CallNodePath,
        implementation: ImplementationFilter,
        inverted: bool,
    },
    /// Re-root every stack at the outermost call of a function.
    FocusFunction { func: FuncIndex },
    FocusCategory { category: CategoryIndex },
    /// Remove one call node, handing its children to its parent.
    MergeCallNode {
        path: CallNodePath,
        implementation: ImplementationFilter,
    },
    /// Remove every frame of a function.
    MergeFunction { func: FuncIndex },
    /// Drop every sample that has a function anywhere on its stack.
    DropFunction { func: FuncIndex },
    /// Fold consecutive frames of one library into a single pseudo-function.
    CollapseResource { resource: ResourceIndex },
    CollapseDirectRecursion { func: FuncIndex },
    CollapseRecursion { func: FuncIndex },
    /// Attribute everything a function calls to the function itself.
    CollapseFunctionSubtree { func: FuncIndex },
    /// Keep only samples taken during markers matching a search string.
    FilterSamples { marker_search: String },
}

impl Transform {
    pub fn short_key(&self) -> &'static str {
        match self {
            Transform::FocusSubtree { .. } => "f",
            Transform::FocusFunction { .. } => "ff",
            Transform::FocusCategory { .. } => "fg",
            Transform::MergeCallNode { .. } => "mcn",
            Transform::MergeFunction { .. } => "mf",
            Transform::DropFunction { .. } => "df",
            Transform::CollapseResource { .. } => "cr",
            Transform::CollapseDirectRecursion { .. } => "drec",
            Transform::CollapseRecursion { .. } => "rec",
            Transform::CollapseFunctionSubtree { .. } => "cfs",
            Transform::FilterSamples { .. } => "fs",
        }
    }

    /// Human readable description, resolving indexes against `thread`.
    pub fn label(&self, thread: &Thread) -> String {
        let func = |f: FuncIndex| -> String {
            if f < thread.funcs.len() {
                thread.func_name(f).to_string()
            } else {
                format!("<func {f}>")
            }
        };
        let last = |path: &CallNodePath| path.last().map(|&f| func(f)).unwrap_or_default();

        match self {
            Transform::FocusSubtree { path, inverted, .. } => {
                if *inverted {
                    format!("Focus (inverted): {}", last(path))
                } else {
                    format!("Focus Node: {}", last(path))
                }
            }
            Transform::FocusFunction { func: f } => format!("Focus: {}", func(*f)),
            Transform::FocusCategory { category } => format!("Focus category: {category}"),
            Transform::MergeCallNode { path, .. } => format!("Merge Node: {}", last(path)),
            Transform::MergeFunction { func: f } => format!("Merge: {}", func(*f)),
            Transform::DropFunction { func: f } => format!("Drop: {}", func(*f)),
            Transform::CollapseResource { resource } => {
                let name = thread
                    .resources
                    .name
                    .get(*resource)
                    .map(|&s| thread.strings.get_or_empty(s).to_string())
                    .unwrap_or_else(|| format!("<resource {resource}>"));
                format!("Collapse: {name}")
            }
            Transform::CollapseDirectRecursion { func: f } => {
                format!("Collapse direct recursion: {}", func(*f))
            }
            Transform::CollapseRecursion { func: f } => format!("Collapse recursion: {}", func(*f)),
            Transform::CollapseFunctionSubtree { func: f } => format!("Collapse: {}", func(*f)),
            Transform::FilterSamples { marker_search } => {
                format!("Only samples during \"{marker_search}\"")
            }
        }
    }
}

fn write_path(f: &mut fmt::Formatter<'_>, path: &CallNodePath) -> fmt::Result {
    let parts: Vec<String> = path.iter().map(|func| func.to_string()).collect();
    f.write_str(&parts.join(","))
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-", self.short_key())?;
        match self {
            Transform::FocusSubtree {
                path,
                implementation,
                inverted,
            } => {
                write!(f, "{implementation}-")?;
                write_path(f, path)?;
                if *inverted {
                    f.write_str("-i")?;
                }
                Ok(())
            }
            Transform::MergeCallNode {
                path,
                implementation,
            } => {
                write!(f, "{implementation}-")?;
                write_path(f, path)
            }
            Transform::FocusFunction { func }
            | Transform::MergeFunction { func }
            | Transform::DropFunction { func }
            | Transform::CollapseDirectRecursion { func }
            | Transform::CollapseRecursion { func }
            | Transform::CollapseFunctionSubtree { func } => write!(f, "{func}"),
            Transform::FocusCategory { category } => write!(f, "{category}"),
            Transform::CollapseResource { resource } => write!(f, "{resource}"),
            Transform::FilterSamples { marker_search } => f.write_str(marker_search),
        }
    }
}

impl FromStr for Transform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |why: &str| Error::InvalidArgument(format!("invalid transform '{s}': {why}"));
        let (key, rest) = s
            .split_once('-')
            .ok_or_else(|| invalid("expected KIND-ARGS"))?;
        let index = |text: &str| -> Result<usize> {
            text.parse()
                .map_err(|_| invalid(&format!("'{text}' is not an index")))
        };
        let path = |text: &str| -> Result<CallNodePath> {
            if text.is_empty() {
                return Err(invalid("empty call node path"));
            }
            text.split(',').map(index).collect()
        };

        Ok(match key {
            "f" => {
                let (implementation, path_text) = split_implementation(rest)
                    .ok_or_else(|| invalid("expected IMPLEMENTATION-PATH"))?;
                let implementation: ImplementationFilter = implementation.parse()?;
                let (path_text, inverted) = match path_text.strip_suffix("-i") {
                    Some(stripped) => (stripped, true),
                    None => (path_text, false),
                };
                Transform::FocusSubtree {
                    path: path(path_text)?,
                    implementation,
                    inverted,
                }
            }
            "mcn" => {
                let (implementation, path_text) = split_implementation(rest)
                    .ok_or_else(|| invalid("expected IMPLEMENTATION-PATH"))?;
                let implementation: ImplementationFilter = implementation.parse()?;
                Transform::MergeCallNode {
                    path: path(path_text)?,
                    implementation,
                }
            }
            "ff" => Transform::FocusFunction { func: index(rest)? },
            "fg" => Transform::FocusCategory {
                category: index(rest)?,
            },
            "mf" => Transform::MergeFunction { func: index(rest)? },
            "df" => Transform::DropFunction { func: index(rest)? },
            "cr" => Transform::CollapseResource {
                resource: index(rest)?,
            },
            "drec" => Transform::CollapseDirectRecursion { func: index(rest)? },
            "rec" => Transform::CollapseRecursion { func: index(rest)? },
            "cfs" => Transform::CollapseFunctionSubtree { func: index(rest)? },
            "fs" => {
                if rest.is_empty() {
                    return Err(invalid("empty marker search"));
                }
                Transform::FilterSamples {
                    marker_search: rest.to_string(),
                }
            }
            other => return Err(invalid(&format!("unknown kind '{other}'"))),
        })
    }
}

/// Split `IMPLEMENTATION-PATH` at its first dash.
fn split_implementation(text: &str) -> Option<(&str, &str)> {
    text.split_once('-')
}
