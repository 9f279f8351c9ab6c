//! The dependency stack: the path from the root to the edge being resolved.
//!
//! Every branch owns its own copy, so concurrently resolving siblings never
//! see each other's frames.

use std::collections::BTreeMap;

use crate::version::Range;

/// One ancestor on the path: a resolved package and its dependency ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub name: String,
    pub version: String,
    pub dependencies: BTreeMap<String, String>,
}

/// Index of the first frame, counting from the root, that does not pin `name`
/// away from `matched`: the frame either has no opinion on `name` or asks for
/// a range `matched` satisfies. None when every frame rejects `matched`, and
/// always None for an empty stack.
pub fn deep_conflict_frame(stack: &[Frame], name: &str, matched: &str) -> Option<usize> {
    stack
        .iter()
        .position(|frame| match frame.dependencies.get(name) {
            None => true,
            Some(range) => Range::parse(range).is_ok_and(|r| r.satisfies_str(matched)),
        })
}

/// Parent path for a record found at `index`: the names of the two frames
/// preceding it joined with `/`. For `index` below 2 the window wraps to the
/// end of the stack, so index 0 yields the last two frames and index 1 the
/// last frame alone.
pub fn deep_conflict_parent(stack: &[Frame], index: usize) -> String {
    let start = if index >= 2 {
        index - 2
    } else {
        stack.len().saturating_sub(2 - index)
    };
    let end = (start + 2).min(stack.len());

    stack[start..end]
        .iter()
        .map(|frame| frame.name.as_str())
        .collect::<Vec<_>>()
        .join("/")
}

/// True when some frame already is `name` at a version inside `range`:
/// descending into the edge again would walk the same cycle forever.
pub fn closes_cycle(stack: &[Frame], name: &str, range: &str) -> bool {
    let Ok(range) = Range::parse(range) else {
        return false;
    };
    stack
        .iter()
        .any(|frame| frame.name == name && range.satisfies_str(&frame.version))
}
