//! Walker stage
//!
//! Depth-first descent of the root directory. Every subdirectory is
//! enqueued for the filters before the walker descends into it, and a
//! directory's whole subtree is visited before its next sibling. Sibling
//! order is whatever `read_dir` returns.
//!
//! Directory symlinks are not followed, so a link cycle cannot trap the walk.

use crate::error::{QueueError, StageError, StageResult};
use crate::pipeline::queue::ProducerLease;
use crate::pipeline::stage::{display_name, skip_item, DirTask, Stage, StageContext, StageKind};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Single-threaded directory enumerator feeding the directory queue
pub struct Walker {
    root: PathBuf,
    include_root: bool,
    output: ProducerLease<DirTask>,
}

impl Walker {
    pub fn new(root: PathBuf, include_root: bool, output: ProducerLease<DirTask>) -> Self {
        Self {
            root,
            include_root,
            output,
        }
    }

    /// Enqueue one directory. Returns false once the filters are gone.
    fn emit(&self, ctx: &StageContext, task: &DirTask) -> StageResult<bool> {
        match self.output.enqueue(task.clone()) {
            Ok(()) => {
                trace!(
                    worker = ctx.id,
                    path = %task.path.display(),
                    depth = task.depth,
                    "Directory scouted"
                );
                ctx.stats.record_scouted();
                let name = display_name(&task.path);
                ctx.audit.record(|| {
                    format!(
                        "Walker on thread id {}: directory named {} was scouted",
                        ctx.id, name
                    )
                });
                Ok(true)
            }
            Err(QueueError::Abandoned { .. }) => {
                warn!(worker = ctx.id, "No filters remain, stopping walk");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Stage for Walker {
    fn kind(&self) -> StageKind {
        StageKind::Walker
    }

    fn run(self, ctx: StageContext) -> StageResult<()> {
        debug!(worker = ctx.id, root = %self.root.display(), "Walk starting");

        // Directories still to be listed, top of stack is visited next
        let mut pending = vec![DirTask::root(self.root.clone())];
        let mut first = true;

        while let Some(task) = pending.pop() {
            if ctx.is_shutting_down() {
                debug!(worker = ctx.id, "Shutdown requested, stopping walk");
                break;
            }

            let is_root = std::mem::take(&mut first);
            if (!is_root || self.include_root) && !self.emit(&ctx, &task)? {
                break;
            }

            let children = match list_subdirs(&task.path) {
                Ok(children) => children,
                Err(e) if e.is_recoverable() => {
                    skip_item(&ctx, StageKind::Walker, &e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            // Reverse so the first listed child is popped first
            pending.extend(
                children
                    .into_iter()
                    .rev()
                    .map(|path| DirTask::new(path, task.depth + 1)),
            );
        }

        Ok(())
    }
}

/// List the immediate subdirectories of `dir`, in `read_dir` order
pub fn list_subdirs(dir: &Path) -> StageResult<Vec<PathBuf>> {
    let list_err = |source| StageError::ListDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut subdirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(list_err)? {
        let entry = entry.map_err(list_err)?;
        let file_type = entry.file_type().map_err(list_err)?;
        if file_type.is_dir() {
            subdirs.push(entry.path());
        }
    }
    Ok(subdirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::audit::AuditLog;
    use crate::pipeline::queue::{BoundedSignalQueue, Dequeued};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn context() -> StageContext {
        StageContext::new(0, AuditLog::disabled(), Arc::new(AtomicBool::new(false)))
    }

    fn collect(queue: &BoundedSignalQueue<DirTask>) -> Vec<DirTask> {
        let mut out = Vec::new();
        while let Dequeued::Item(task) = queue.dequeue() {
            out.push(task);
        }
        out
    }

    #[test]
    fn test_walk_preorder() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("a/x/deep")).unwrap();
        fs::create_dir_all(root.join("b")).unwrap();
        fs::write(root.join("a/file.txt"), b"not a dir").unwrap();

        let queue = Arc::new(BoundedSignalQueue::new("directories", 16));
        let walker = Walker::new(root.to_path_buf(), false, queue.producer());
        walker.run(context()).unwrap();

        let tasks = collect(&queue);
        let rel: Vec<PathBuf> = tasks
            .iter()
            .map(|t| t.path.strip_prefix(root).unwrap().to_path_buf())
            .collect();

        assert_eq!(rel.len(), 4);
        assert!(!rel.contains(&PathBuf::new()), "root is not enqueued by default");

        // Every directory appears after its parent, and a/x/deep before any sibling of a
        let pos = |p: &str| rel.iter().position(|r| r == Path::new(p)).unwrap();
        assert!(pos("a") < pos("a/x"));
        assert!(pos("a/x") < pos("a/x/deep"));
        if pos("a") < pos("b") {
            assert!(pos("a/x/deep") < pos("b"));
        } else {
            assert!(pos("b") < pos("a"));
        }

        let deep = &tasks[pos("a/x/deep")];
        assert_eq!(deep.depth, 3);
    }

    #[test]
    fn test_walk_include_root() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("only")).unwrap();

        let queue = Arc::new(BoundedSignalQueue::new("directories", 4));
        Walker::new(dir.path().to_path_buf(), true, queue.producer())
            .run(context())
            .unwrap();

        let tasks = collect(&queue);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0], DirTask::root(dir.path().to_path_buf()));
        assert_eq!(tasks[1].path, dir.path().join("only"));
    }

    #[test]
    fn test_walk_empty_root_unregisters() {
        let dir = tempdir().unwrap();
        let queue = Arc::new(BoundedSignalQueue::new("directories", 1));

        Walker::new(dir.path().to_path_buf(), false, queue.producer())
            .run(context())
            .unwrap();

        assert_eq!(queue.producers(), 0);
        assert_eq!(queue.dequeue(), Dequeued::EndOfStream);
    }

    #[test]
    fn test_walk_stops_when_abandoned() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();

        let queue = Arc::new(BoundedSignalQueue::new("directories", 1));
        queue.abandon();

        let audit_queue: Arc<BoundedSignalQueue<String>> =
            Arc::new(BoundedSignalQueue::new("audit", 4));
        let ctx = StageContext::new(
            0,
            AuditLog::for_queue(Some(&audit_queue)),
            Arc::new(AtomicBool::new(false)),
        );
        let stats = Arc::clone(&ctx.stats);
        Walker::new(dir.path().to_path_buf(), false, queue.producer())
            .run(ctx)
            .unwrap();

        // A directory that never reached the queue is not reported as scouted
        assert_eq!(stats.snapshot().dirs_scouted, 0);
        assert_eq!(queue.producers(), 0);
        assert_eq!(audit_queue.producers(), 0);
        assert_eq!(audit_queue.dequeue(), Dequeued::EndOfStream);
    }

    #[test]
    fn test_walk_missing_root_is_skipped() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let queue: Arc<BoundedSignalQueue<DirTask>> =
            Arc::new(BoundedSignalQueue::new("directories", 1));

        let ctx = context();
        let stats = Arc::clone(&ctx.stats);
        Walker::new(missing, false, queue.producer()).run(ctx).unwrap();

        assert_eq!(stats.snapshot().skipped, 1);
        assert_eq!(queue.dequeue(), Dequeued::EndOfStream);
    }

    #[test]
    fn test_list_subdirs_ignores_files() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("data_1"), b"x").unwrap();

        let subdirs = list_subdirs(dir.path()).unwrap();
        assert_eq!(subdirs, vec![dir.path().join("sub")]);
    }
}
