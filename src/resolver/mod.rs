//! Greedy dependency resolution.
//!
//! Every edge `name@range` is resolved to the highest published version
//! inside `range`, preferring whatever the previous lock recorded for the
//! same edge. The first version of a name to be resolved claims the top
//! level of the install tree; later edges that the top-level version does
//! not satisfy become [`Unsatisfied`] records to be nested under a parent.
//!
//! Sibling edges are resolved concurrently, so which version claims the top
//! level depends on completion order. The plan is valid either way: every
//! name has exactly one top-level version, and every record carries a
//! version other than the top-level one.
//!
//! Each branch carries its own copy of the dependency stack (the path of
//! resolved ancestors). The stack serves two purposes:
//!
//! - an edge whose target is already on the stack at a satisfying version
//!   closes a cycle and is not descended into;
//! - an edge the top level does satisfy may still need its own copy when an
//!   intermediate ancestor pins a different version (a deep conflict).

mod plan;
mod stack;

pub use plan::{InstallPlan, PlannedPackage, Unsatisfied};
pub use stack::Frame;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use futures_util::future::{BoxFuture, FutureExt, try_join_all};
use log::{debug, info};

use crate::error::Error;
use crate::lock::{LockEntry, LockStore, resolution_key};
use crate::manifest::RootManifest;
use crate::registry::{Dist, ManifestSource, validate_name};
use crate::version::Range;
use stack::{closes_cycle, deep_conflict_frame, deep_conflict_parent};

#[derive(Debug, Default)]
struct ResolutionState {
    top_level: BTreeMap<String, PlannedPackage>,
    unsatisfied: Vec<Unsatisfied>,
}

/// Where an edge's resolved version ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// First of its name: claimed the top level.
    Hoisted,
    /// The top-level version is outside the requested range.
    Conflict,
    /// Satisfied by the top level, but an ancestor pins another version.
    Nested,
    /// Satisfied by the top level and nothing on the path objects.
    Shared,
    /// A root edge the top level already satisfies.
    Settled,
}

impl Placement {
    fn descends(self) -> bool {
        self != Placement::Settled
    }
}

/// One resolution run. Owns the top-level map and the unsatisfied list, so
/// runs never share state; consumed by [`Resolver::resolve`].
pub struct Resolver<'a, S: ?Sized> {
    source: &'a S,
    lock: &'a LockStore,
    state: Mutex<ResolutionState>,
}

impl<'a, S: ManifestSource + ?Sized> Resolver<'a, S> {
    pub fn new(source: &'a S, lock: &'a LockStore) -> Self {
        Self {
            source,
            lock,
            state: Mutex::new(ResolutionState::default()),
        }
    }

    /// Resolve every root edge of `root` and return the install plan.
    ///
    /// Every edge visited is recorded in the lock store's new lock. Fails on
    /// the first edge that cannot be resolved; the partial plan is dropped.
    #[tracing::instrument(skip_all)]
    pub async fn resolve(self, root: &RootManifest, include_dev: bool) -> Result<InstallPlan> {
        let edges = root.edges(include_dev);
        debug!("Resolving {} root dependencies of {}", edges.len(), root.label());

        try_join_all(
            edges
                .into_iter()
                .map(|(name, range)| self.resolve_edge(name, range, Vec::new())),
        )
        .await?;

        let state = self
            .state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(InstallPlan {
            top_level: state.top_level,
            unsatisfied: state.unsatisfied,
        })
    }

    fn resolve_edge(
        &self,
        name: String,
        range: String,
        stack: Vec<Frame>,
    ) -> BoxFuture<'_, Result<()>> {
        async move {
            let key = resolution_key(&name, &range);
            info!("Resolving: {}", key);

            validate_name(&name).with_context(|| format!("Failed to resolve {}", key))?;
            let requested =
                Range::parse(&range).with_context(|| format!("Failed to resolve {}", key))?;

            let manifest = match self.lock.get(&key) {
                Some(locked) => {
                    debug!("Using locked {} for {}", locked.version, key);
                    Arc::new(locked.to_manifest())
                }
                None => self
                    .source
                    .fetch(&name)
                    .await
                    .with_context(|| format!("Failed to resolve {}", key))?,
            };

            let (version, resolved) =
                manifest
                    .select(&requested)
                    .ok_or_else(|| Error::UnresolvableRange {
                        name: name.clone(),
                        range: range.clone(),
                    })?;

            let placement = self.place(&name, &requested, version, &resolved.dist, &stack);
            debug!("{}@{} placed as {:?}", name, version, placement);
            self.lock.put(key, LockEntry::new(version, resolved));

            if !placement.descends() {
                return Ok(());
            }

            let dependencies = resolved.dependencies();
            let mut stack = stack;
            stack.push(Frame {
                name,
                version: version.to_string(),
                dependencies: dependencies.clone(),
            });

            let children = dependencies
                .into_iter()
                .filter(|(dep, dep_range)| {
                    let cycle = closes_cycle(&stack, dep, dep_range);
                    if cycle {
                        debug!("Not descending into {}@{}: already on the path", dep, dep_range);
                    }
                    !cycle
                })
                .map(|(dep, dep_range)| self.resolve_edge(dep, dep_range, stack.clone()));

            try_join_all(children).await?;
            Ok(())
        }
        .boxed()
    }

    /// Decide where `name@version` goes and record it. The whole decision
    /// runs under one lock so concurrent edges of the same name cannot both
    /// claim the top level.
    fn place(
        &self,
        name: &str,
        requested: &Range,
        version: &str,
        dist: &Dist,
        stack: &[Frame],
    ) -> Placement {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = &mut *guard;

        if !state.top_level.contains_key(name) {
            state
                .top_level
                .insert(name.to_string(), PlannedPackage::new(version, dist));
            return Placement::Hoisted;
        }

        let existing = &state.top_level[name];
        let record = |parent: Option<String>| Unsatisfied {
            name: name.to_string(),
            parent,
            version: version.to_string(),
            url: dist.tarball.clone(),
        };

        if !requested.satisfies_str(&existing.version) {
            let parent = stack.last().map(|frame| frame.name.clone());
            state.unsatisfied.push(record(parent));
            return Placement::Conflict;
        }

        match deep_conflict_frame(stack, name, version) {
            None => Placement::Settled,
            Some(index) if index + 1 < stack.len() && existing.version != version => {
                let parent = deep_conflict_parent(stack, index);
                state.unsatisfied.push(record(Some(parent)));
                Placement::Nested
            }
            Some(_) => Placement::Shared,
        }
    }
}
