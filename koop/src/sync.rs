//! The `pull` and `push` commands.

use std::{io, path::Path};

use anyhow::{Context, Result};
use koop_core::{document, patch, Connector, Registry, RunConfig, WriteOutcome};

use crate::interrupt::InterruptState;
use crate::selector::Selector;
use crate::traverse::{Direction, Names, Scope, Traversal};

/// Everything a sync run needs, fixed before the first object.
pub struct SyncContext<'a> {
    /// Root of the local file tree.
    pub root: &'a Path,
    pub registry: &'a Registry,
    pub connector: &'a dyn Connector,
    pub run: RunConfig,
    pub interrupt: &'a InterruptState,
}

impl SyncContext<'_> {
    fn traversal(&self) -> Traversal<'_> {
        Traversal {
            root: self.root,
            registry: self.registry,
            connector: self.connector,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    /// Objects pulled or pushed.
    pub objects: usize,
}

/// Download the selected objects into the file tree.
///
/// A wildcard name replaces the whole kind directory, so files of objects
/// that no longer exist do not survive.
pub fn pull(ctx: &SyncContext<'_>, selector: &Selector) -> Result<Summary> {
    let mut summary = Summary::default();
    ctx.traversal()
        .walk(selector, Direction::Pull, &mut |scope| {
            if let Names::Wildcard(_) = scope.names {
                clean(&scope)?;
            }
            std::fs::create_dir_all(&scope.dir)
                .with_context(|| format!("creating directory {}", scope.dir.display()))?;
            for name in scope.names.as_slice() {
                ctx.interrupt.check_interrupted()?;
                pull_one(&scope, name)?;
                summary.objects += 1;
            }
            Ok(())
        })?;
    Ok(summary)
}

fn clean(scope: &Scope<'_>) -> Result<()> {
    tracing::info!("CLEAN: {}/{}/{}", scope.cluster, scope.namespace, scope.kind());
    match std::fs::remove_dir_all(&scope.dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("removing directory {}", scope.dir.display())),
    }
}

fn pull_one(scope: &Scope<'_>, name: &str) -> Result<()> {
    tracing::info!(
        "PULL: {}/{}/{}/{}",
        scope.cluster,
        scope.namespace,
        scope.kind(),
        name
    );
    let object = scope
        .descriptor
        .fetch(scope.store, scope.namespace, name)
        .with_context(|| {
            format!(
                "fetching {}/{}/{}/{}",
                scope.cluster,
                scope.namespace,
                scope.kind(),
                name
            )
        })?;
    let text = document::to_yaml(&patch::canonicalize(&object))?;
    let file = scope.file(name);
    std::fs::write(&file, text).with_context(|| format!("writing {}", file.display()))?;
    Ok(())
}

/// Upload the selected files to their clusters.
pub fn push(ctx: &SyncContext<'_>, selector: &Selector) -> Result<Summary> {
    let mut summary = Summary::default();
    ctx.traversal()
        .walk(selector, Direction::Push, &mut |scope| {
            for name in scope.names.as_slice() {
                ctx.interrupt.check_interrupted()?;
                push_one(&scope, name, ctx.run)?;
                summary.objects += 1;
            }
            Ok(())
        })?;
    Ok(summary)
}

fn push_one(scope: &Scope<'_>, name: &str, run: RunConfig) -> Result<()> {
    let file = scope.file(name);
    let text =
        std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
    let doc = document::from_yaml(&text).with_context(|| format!("parsing {}", file.display()))?;
    // Hand edits may have brought server-owned fields back.
    let doc = patch::strip_server_owned(&doc);
    let outcome = scope
        .descriptor
        .write(scope.store, scope.namespace, name, &doc, run)
        .with_context(|| {
            format!(
                "pushing {}/{}/{}/{}",
                scope.cluster,
                scope.namespace,
                scope.kind(),
                name
            )
        })?;
    match outcome {
        WriteOutcome::Skipped => tracing::info!(
            "SKIP: {}/{}/{}/{}: {}",
            scope.cluster,
            scope.namespace,
            scope.kind(),
            name,
            outcome
        ),
        _ => tracing::info!(
            "PUSH: {}/{}/{}/{}: {}",
            scope.cluster,
            scope.namespace,
            scope.kind(),
            name,
            outcome
        ),
    }
    Ok(())
}
