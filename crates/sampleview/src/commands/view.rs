//! Translate command line view arguments into a [`ViewState`].

use crate::cli::ViewArgs;
use crate::error::{Error, Result};
use crate::profile::Profile;
use crate::selectors::{Selectors, ThreadSelectors};
use crate::state::{PreviewSelection, ViewState, profile_root_range};
use crate::storage;
use std::path::Path;
use std::rc::Rc;

/// A loaded profile with its view state and the selectors of the thread the
/// arguments name.
pub struct OpenedView {
    pub state: ViewState,
    pub registry: Selectors,
    pub selectors: Rc<ThreadSelectors>,
}

pub fn open(file: &Path, args: &ViewArgs) -> Result<OpenedView> {
    let profile = Rc::new(storage::read_profile(file)?);
    let state = build_state(profile, args)?;
    let registry = Selectors::new();
    let selectors = registry.for_thread(&args.thread);
    Ok(OpenedView {
        state,
        registry,
        selectors,
    })
}

/// Apply `args` to a fresh state through the same setters an interactive
/// front end would call.
pub fn build_state(profile: Rc<Profile>, args: &ViewArgs) -> Result<ViewState> {
    let root = profile_root_range(&profile);
    let mut state = ViewState::new(profile);

    if let Some(range) = args.range {
        state.commit_range(root.start + range.start_ms(), root.start + range.end_ms())?;
    }
    if let Some(preview) = args.preview {
        state.set_preview_selection(Some(PreviewSelection {
            start: root.start + preview.start_ms(),
            end: root.start + preview.end_ms(),
        }))?;
    }
    state.set_current_tab(args.tab);
    state.set_transforms(&args.thread, args.transforms.clone());
    state.set_implementation(args.implementation);
    if let Some(search) = &args.search {
        state.set_search_text(search);
    }
    state.set_invert_call_stack(args.invert);
    state.set_summary_strategy(args.summary);
    Ok(state)
}

/// Fail early when the summary strategy asks for data the thread lacks.
pub fn check_summary(selectors: &ThreadSelectors, state: &ViewState) -> Result<()> {
    let strategy = selectors.summary_strategy(state)?;
    if strategy.needs_memory_addresses() && !selectors.can_show_retained_memory(state)? {
        return Err(Error::InvalidArgument(format!(
            "--summary {strategy} needs native allocations with memory addresses, \
             and thread '{}' has none",
            selectors.friendly_thread_name(state)?
        )));
    }
    Ok(())
}

/// Log how often each pipeline stage was reused.
pub fn log_cache_stats(selectors: &ThreadSelectors) {
    for (name, stats) in selectors.cache_stats() {
        log::debug!("{name}: {} hits, {} misses", stats.hits, stats.misses);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::cli::Command;
    use crate::ops::ImplementationFilter;
    use crate::profile::{ProfileBuilder, ThreadBuilder};
    use clap::Parser;

    fn args(extra: &[&str]) -> ViewArgs {
        let mut argv = vec!["sampleview", "top", "p.db"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Top { view, .. } => view,
            _ => unreachable!(),
        }
    }

    #[test]
    fn retained_memory_needs_addresses() {
        let profile = Rc::new(
            ProfileBuilder::new()
                .thread(
                    ThreadBuilder::new("Unpaired")
                        .native_allocation(0.0, "A", 64.0)
                        .native_allocation(1.0, "A", -64.0),
                )
                .thread(
                    ThreadBuilder::new("Paired")
                        .native_allocation_at(0.0, "A", 64.0, 0x10)
                        .native_allocation_at(1.0, "A", -64.0, 0x10),
                )
                .build(),
        );
        let registry = Selectors::new();

        for summary in ["native-retained-allocations", "native-deallocations-memory"] {
            let unpaired = args(&["--summary", summary]);
            let state = build_state(profile.clone(), &unpaired).unwrap();
            let selectors = registry.for_thread(&unpaired.thread);
            assert!(matches!(
                check_summary(&selectors, &state),
                Err(Error::InvalidArgument(message)) if message.contains("Unpaired")
            ));

            let paired = args(&["--summary", summary, "--thread", "1"]);
            let state = build_state(profile.clone(), &paired).unwrap();
            let selectors = registry.for_thread(&paired.thread);
            check_summary(&selectors, &state).unwrap();
            selectors
                .preview_filtered_samples_for_call_tree(&state)
                .unwrap();
        }

        let allocations = args(&["--summary", "native-allocations"]);
        let state = build_state(profile, &allocations).unwrap();
        check_summary(&registry.for_thread(&allocations.thread), &state).unwrap();
    }

    #[test]
    fn arguments_become_view_parameters() {
        let profile = ProfileBuilder::new()
            .thread(
                ThreadBuilder::new("Main")
                    .sample(100.0, "A")
                    .sample(200.0, "B"),
            )
            .build();
        let state = build_state(
            Rc::new(profile),
            &args(&[
                "--range",
                "10..50",
                "--preview",
                "20..30",
                "--search",
                "foo, bar",
                "--implementation",
                "cpp",
                "-x",
                "mf-0",
            ]),
        )
        .unwrap();

        assert_eq!(state.committed_range().start, 110.0);
        assert_eq!(state.committed_range().end, 150.0);
        let preview = state.preview_selection().unwrap();
        assert_eq!((preview.start, preview.end), (120.0, 130.0));
        assert_eq!(**state.search_strings(), ["foo", "bar"]);
        assert_eq!(state.implementation(), ImplementationFilter::Cpp);
        assert_eq!(state.transform_stack(&"0".parse().unwrap()).len(), 1);
    }
}
