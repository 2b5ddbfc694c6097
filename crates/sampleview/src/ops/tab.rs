use super::stack_rewrite::StackRewriter;
use crate::profile::{CategoryIndex, InnerWindowId, StackIndex, Thread};
use std::collections::HashSet;
use std::rc::Rc;

/// Keep only the parts of each stack that belong to one of `windows`.
///
/// Frames tagged with a window are kept when the window is in the set. Untagged
/// frames (native code, the event loop) are kept only below a frame that was
/// already kept, so the stack starts at the tab's first frame.
pub fn filter_thread_to_tab(
    thread: &Thread,
    windows: &HashSet<InnerWindowId>,
    default_category: CategoryIndex,
) -> Thread {
    let old = &thread.stacks;
    let mut rewriter = StackRewriter::new(thread, default_category);
    let mut map: Vec<Option<StackIndex>> = Vec::with_capacity(old.len());

    for stack in 0..old.len() {
        let frame = old.frame[stack];
        let new_prefix = old.prefix[stack].and_then(|p| map[p]);
        let keep = match thread.frames.inner_window_id[frame] {
            Some(window) => windows.contains(&window),
            None => new_prefix.is_some(),
        };
        map.push(if keep {
            Some(rewriter.push_with_category(new_prefix, frame, old.category[stack]))
        } else {
            new_prefix
        });
    }

    thread.with_stack_map(Rc::new(rewriter.finish()), &map)
}
