use super::{CallNodePath, Transform, TransformContext};
use crate::error::{Error, Result};
use crate::ops::{
    ImplementationFilter, StackRewriter, drop_samples_by_stack, filter_frames, filter_stacks,
};
use crate::profile::{
    Frame, FrameTable, Func, FuncIndex, FuncTable, JsAllocationsTable, NativeAllocationsTable,
    SamplesTable, StackIndex, Thread,
};
use std::rc::Rc;

/// Apply one transform to `thread`, producing a new thread.
///
/// Indexes inside the transform are validated against the thread first; an
/// out-of-range index is an [`Error::Transform`].
pub fn apply_transform(
    thread: &Thread,
    transform: &Transform,
    context: &TransformContext,
) -> Result<Thread> {
    validate(thread, transform, context)?;
    let default_category = context.default_category;

    Ok(match transform {
        Transform::FocusSubtree {
            path,
            implementation,
            inverted: false,
        } => focus_subtree(thread, path, *implementation, default_category),
        Transform::FocusSubtree {
            path,
            implementation,
            inverted: true,
        } => focus_inverted_subtree(thread, path, *implementation),
        Transform::FocusFunction { func } => focus_function(thread, *func, default_category),
        Transform::FocusCategory { category } => filter_stacks(thread, default_category, |stack| {
            thread.stacks.category[stack] == *category
        }),
        Transform::MergeCallNode {
            path,
            implementation,
        } => merge_call_node(thread, path, *implementation, default_category),
        Transform::MergeFunction { func } => filter_frames(thread, default_category, |frame| {
            thread.frames.func[frame] != *func
        }),
        Transform::DropFunction { func } => drop_function(thread, *func),
        Transform::CollapseResource { resource } => {
            collapse_resource(thread, *resource, default_category)
        }
        Transform::CollapseDirectRecursion { func } => {
            collapse_direct_recursion(thread, *func, default_category)
        }
        Transform::CollapseRecursion { func } => collapse_recursion(thread, *func, default_category),
        Transform::CollapseFunctionSubtree { func } => {
            collapse_function_subtree(thread, *func, default_category)
        }
        Transform::FilterSamples { marker_search } => {
            filter_samples_to_markers(thread, marker_search, context)
        }
    })
}

fn validate(thread: &Thread, transform: &Transform, context: &TransformContext) -> Result<()> {
    let fail = |reason: String| {
        Err(Error::Transform {
            transform: transform.to_string(),
            reason,
        })
    };
    let check_func = |func: FuncIndex| {
        if func >= thread.funcs.len() {
            fail(format!(
                "function {func} out of range ({} functions)",
                thread.funcs.len()
            ))
        } else {
            Ok(())
        }
    };

    match transform {
        Transform::FocusSubtree { path, .. } | Transform::MergeCallNode { path, .. } => {
            if path.is_empty() {
                return fail("empty call node path".to_string());
            }
            path.iter().try_for_each(|&func| check_func(func))
        }
        Transform::FocusFunction { func }
        | Transform::MergeFunction { func }
        | Transform::DropFunction { func }
        | Transform::CollapseDirectRecursion { func }
        | Transform::CollapseRecursion { func }
        | Transform::CollapseFunctionSubtree { func } => check_func(*func),
        Transform::FocusCategory { category } => {
            if *category >= context.categories.len() {
                fail(format!("category {category} out of range"))
            } else {
                Ok(())
            }
        }
        Transform::CollapseResource { resource } => {
            if *resource >= thread.resources.len() {
                fail(format!("resource {resource} out of range"))
            } else {
                Ok(())
            }
        }
        Transform::FilterSamples { .. } => Ok(()),
    }
}

/// Progress of a stack along a call node path.
#[derive(Clone, Copy, PartialEq)]
enum PathMatch {
    /// This many path entries matched so far.
    Partial(usize),
    /// Past the last path entry.
    Inside,
    /// Diverged from the path.
    Outside,
}

fn focus_subtree(
    thread: &Thread,
    path: &CallNodePath,
    implementation: ImplementationFilter,
    default_category: usize,
) -> Thread {
    let old = &thread.stacks;
    let mut rewriter = StackRewriter::new(thread, default_category);
    let mut map: Vec<Option<StackIndex>> = Vec::with_capacity(old.len());
    let mut state: Vec<PathMatch> = Vec::with_capacity(old.len());

    for stack in 0..old.len() {
        let (prefix_state, new_prefix) = match old.prefix[stack] {
            Some(p) => (state[p], map[p]),
            None => (PathMatch::Partial(0), None),
        };
        let func = thread.func_of_stack(stack);
        let frame = old.frame[stack];

        let (next_state, mapped) = match prefix_state {
            PathMatch::Inside => (
                PathMatch::Inside,
                Some(rewriter.push_with_category(new_prefix, frame, old.category[stack])),
            ),
            PathMatch::Outside => (PathMatch::Outside, None),
            PathMatch::Partial(matched) => {
                if !implementation.keeps(thread, func) {
                    (prefix_state, None)
                } else if func != path[matched] {
                    (PathMatch::Outside, None)
                } else if matched + 1 == path.len() {
                    // The focused node becomes the new root.
                    (
                        PathMatch::Inside,
                        Some(rewriter.push_with_category(None, frame, old.category[stack])),
                    )
                } else {
                    (PathMatch::Partial(matched + 1), None)
                }
            }
        };
        state.push(next_state);
        map.push(mapped);
    }

    thread.with_stack_map(Rc::new(rewriter.finish()), &map)
}

/// Keep the samples whose stack, read from the leaf, starts with `path`, and
/// cut each one off at the last path entry.
fn focus_inverted_subtree(
    thread: &Thread,
    path: &CallNodePath,
    implementation: ImplementationFilter,
) -> Thread {
    let old = &thread.stacks;
    let map: Vec<Option<StackIndex>> = (0..old.len())
        .map(|leaf| {
            let mut remaining = path.iter();
            let mut expected = remaining.next();
            for stack in old.ancestors(leaf) {
                let func = thread.func_of_stack(stack);
                if !implementation.keeps(thread, func) {
                    continue;
                }
                if Some(&func) != expected {
                    return None;
                }
                expected = remaining.next();
                if expected.is_none() {
                    return Some(stack);
                }
            }
            None
        })
        .collect();

    thread.with_stack_map(thread.stacks.clone(), &map)
}

fn focus_function(thread: &Thread, func: FuncIndex, default_category: usize) -> Thread {
    let old = &thread.stacks;
    let mut rewriter = StackRewriter::new(thread, default_category);
    let mut map: Vec<Option<StackIndex>> = Vec::with_capacity(old.len());

    for stack in 0..old.len() {
        let new_prefix = old.prefix[stack].and_then(|p| map[p]);
        let mapped = if new_prefix.is_some() || thread.func_of_stack(stack) == func {
            Some(rewriter.push_with_category(new_prefix, old.frame[stack], old.category[stack]))
        } else {
            None
        };
        map.push(mapped);
    }

    thread.with_stack_map(Rc::new(rewriter.finish()), &map)
}

fn merge_call_node(
    thread: &Thread,
    path: &CallNodePath,
    implementation: ImplementationFilter,
    default_category: usize,
) -> Thread {
    let old = &thread.stacks;
    let mut rewriter = StackRewriter::new(thread, default_category);
    let mut map: Vec<Option<StackIndex>> = Vec::with_capacity(old.len());
    let mut state: Vec<PathMatch> = Vec::with_capacity(old.len());

    for stack in 0..old.len() {
        let (prefix_state, new_prefix) = match old.prefix[stack] {
            Some(p) => (state[p], map[p]),
            None => (PathMatch::Partial(0), None),
        };
        let func = thread.func_of_stack(stack);

        let next_state = match prefix_state {
            PathMatch::Partial(matched) if implementation.keeps(thread, func) => {
                if func != path[matched] {
                    PathMatch::Outside
                } else if matched + 1 == path.len() {
                    PathMatch::Inside
                } else {
                    PathMatch::Partial(matched + 1)
                }
            }
            other => other,
        };

        let merged_here =
            next_state == PathMatch::Inside && prefix_state != PathMatch::Inside;
        map.push(if merged_here {
            new_prefix
        } else {
            Some(rewriter.push_with_category(new_prefix, old.frame[stack], old.category[stack]))
        });
        state.push(next_state);
    }

    thread.with_stack_map(Rc::new(rewriter.finish()), &map)
}

fn drop_function(thread: &Thread, func: FuncIndex) -> Thread {
    let old = &thread.stacks;
    let mut contains = Vec::with_capacity(old.len());
    for stack in 0..old.len() {
        let inherited = old.prefix[stack].is_some_and(|p| contains[p]);
        contains.push(inherited || thread.func_of_stack(stack) == func);
    }
    drop_samples_by_stack(thread, |stack| !contains[stack])
}

/// Replace each run of consecutive frames from `resource` with one frame of a
/// new function named after the resource.
fn collapse_resource(thread: &Thread, resource: usize, default_category: usize) -> Thread {
    let resource_name = thread.resources.name[resource];

    let mut funcs: FuncTable = (*thread.funcs).clone();
    let collapsed_func = funcs.push(Func {
        name: resource_name,
        is_js: false,
        relevant_for_js: false,
        resource: Some(resource),
        file_name: None,
        line: None,
    });
    let mut frames: FrameTable = (*thread.frames).clone();
    let collapsed_frame = frames.push(Frame {
        func: collapsed_func,
        category: None,
        line: None,
        address: None,
        inner_window_id: None,
    });

    let rewritten = Thread {
        funcs: Rc::new(funcs),
        frames: Rc::new(frames),
        ..thread.clone()
    };

    let old = &thread.stacks;
    let mut rewriter = StackRewriter::new(&rewritten, default_category);
    let mut map: Vec<Option<StackIndex>> = Vec::with_capacity(old.len());
    // Whether the new stack at each old index is the collapsed frame.
    let mut is_collapsed: Vec<bool> = Vec::with_capacity(old.len());

    for stack in 0..old.len() {
        let new_prefix = old.prefix[stack].and_then(|p| map[p]);
        let prefix_collapsed = old.prefix[stack].is_some_and(|p| is_collapsed[p]);
        let in_resource = thread.funcs.resource[thread.func_of_stack(stack)] == Some(resource);

        let mapped = if in_resource && prefix_collapsed {
            new_prefix
        } else if in_resource {
            Some(rewriter.push_with_category(new_prefix, collapsed_frame, old.category[stack]))
        } else {
            Some(rewriter.push_with_category(new_prefix, old.frame[stack], old.category[stack]))
        };
        map.push(mapped);
        is_collapsed.push(in_resource);
    }

    let stacks = Rc::new(rewriter.finish());
    rewritten.with_stack_map(stacks, &map)
}

fn collapse_direct_recursion(thread: &Thread, func: FuncIndex, default_category: usize) -> Thread {
    let old = &thread.stacks;
    let mut rewriter = StackRewriter::new(thread, default_category);
    let mut map: Vec<Option<StackIndex>> = Vec::with_capacity(old.len());

    for stack in 0..old.len() {
        let new_prefix = old.prefix[stack].and_then(|p| map[p]);
        let recursed = thread.func_of_stack(stack) == func
            && old.prefix[stack].is_some_and(|p| thread.func_of_stack(p) == func);
        map.push(if recursed {
            new_prefix
        } else {
            Some(rewriter.push_with_category(new_prefix, old.frame[stack], old.category[stack]))
        });
    }

    thread.with_stack_map(Rc::new(rewriter.finish()), &map)
}

/// Any call of `func` below another call of `func` is folded into the outer
/// one, together with every frame in between.
fn collapse_recursion(thread: &Thread, func: FuncIndex, default_category: usize) -> Thread {
    let old = &thread.stacks;
    let mut rewriter = StackRewriter::new(thread, default_category);
    let mut map: Vec<Option<StackIndex>> = Vec::with_capacity(old.len());
    // New stack of the outermost `func` call on the path, if any.
    let mut outer: Vec<Option<StackIndex>> = Vec::with_capacity(old.len());

    for stack in 0..old.len() {
        let new_prefix = old.prefix[stack].and_then(|p| map[p]);
        let outer_call = old.prefix[stack].and_then(|p| outer[p]);
        let is_func = thread.func_of_stack(stack) == func;

        let (mapped, next_outer) = match outer_call {
            Some(outer_stack) if is_func => (Some(outer_stack), Some(outer_stack)),
            _ => {
                let pushed =
                    rewriter.push_with_category(new_prefix, old.frame[stack], old.category[stack]);
                (Some(pushed), outer_call.or(is_func.then_some(pushed)))
            }
        };
        map.push(mapped);
        outer.push(next_outer);
    }

    thread.with_stack_map(Rc::new(rewriter.finish()), &map)
}

fn collapse_function_subtree(thread: &Thread, func: FuncIndex, default_category: usize) -> Thread {
    let old = &thread.stacks;
    let mut rewriter = StackRewriter::new(thread, default_category);
    let mut map: Vec<Option<StackIndex>> = Vec::with_capacity(old.len());
    let mut collapsed_into: Vec<Option<StackIndex>> = Vec::with_capacity(old.len());

    for stack in 0..old.len() {
        let new_prefix = old.prefix[stack].and_then(|p| map[p]);
        match old.prefix[stack].and_then(|p| collapsed_into[p]) {
            Some(target) => {
                map.push(Some(target));
                collapsed_into.push(Some(target));
            }
            None => {
                let pushed =
                    rewriter.push_with_category(new_prefix, old.frame[stack], old.category[stack]);
                map.push(Some(pushed));
                collapsed_into.push((thread.func_of_stack(stack) == func).then_some(pushed));
            }
        }
    }

    thread.with_stack_map(Rc::new(rewriter.finish()), &map)
}

/// Empty the stack of every sample and allocation taken outside the interval
/// markers that match `search`.
fn filter_samples_to_markers(thread: &Thread, search: &str, context: &TransformContext) -> Thread {
    let needle = search.to_lowercase();
    let mut ranges: Vec<(f64, f64)> = context
        .marker_indexes
        .iter()
        .filter_map(|&i| context.markers.get(i))
        .filter(|marker| marker.matches(&needle, &context.marker_schema))
        .filter_map(|marker| marker.end.map(|end| (marker.start, end)))
        .collect();
    ranges.sort_by(|a, b| a.0.total_cmp(&b.0));

    let inside = |time: f64| ranges.iter().any(|&(start, end)| start <= time && time < end);
    let keep = |times: &[f64], stacks: &[Option<StackIndex>]| -> Vec<Option<StackIndex>> {
        times
            .iter()
            .zip(stacks)
            .map(|(&time, &stack)| stack.filter(|_| inside(time)))
            .collect()
    };

    Thread {
        samples: Rc::new(SamplesTable {
            stack: keep(&thread.samples.time, &thread.samples.stack),
            ..(*thread.samples).clone()
        }),
        native_allocations: thread.native_allocations.as_ref().map(|table| {
            Rc::new(NativeAllocationsTable {
                stack: keep(&table.time, &table.stack),
                ..(**table).clone()
            })
        }),
        js_allocations: thread.js_allocations.as_ref().map(|table| {
            Rc::new(JsAllocationsTable {
                stack: keep(&table.time, &table.stack),
                ..(**table).clone()
            })
        }),
        ..thread.clone()
    }
}
