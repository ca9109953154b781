//! Filter stage
//!
//! Takes directories off the directory queue and enqueues every direct,
//! non-directory child whose name starts with the prefix. Subdirectories are
//! never inspected here; the walker already covers them.

use crate::error::{QueueError, StageError, StageResult};
use crate::pipeline::queue::{ConsumerLease, ProducerLease};
use crate::pipeline::stage::{skip_item, DirTask, FileMatch, Stage, StageContext, StageKind};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{trace, warn};

/// Prefix matcher between the directory queue and the results queue
pub struct Filter {
    prefix: String,
    input: ConsumerLease<DirTask>,
    output: ProducerLease<FileMatch>,
}

impl Filter {
    pub fn new(
        prefix: impl Into<String>,
        input: ConsumerLease<DirTask>,
        output: ProducerLease<FileMatch>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            input,
            output,
        }
    }
}

impl Stage for Filter {
    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    fn run(self, ctx: StageContext) -> StageResult<()> {
        let mut downstream_open = true;

        for task in self.input.iter() {
            // Keep draining so the walker never blocks on a full queue
            if !downstream_open || ctx.is_shutting_down() {
                ctx.stats.record_skip();
                continue;
            }

            let matches = match matching_files(&task.path, &self.prefix) {
                Ok(matches) => matches,
                Err(e) if e.is_recoverable() => {
                    skip_item(&ctx, StageKind::Filter, &e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            ctx.stats.record_searched();

            for path in matches {
                let found = FileMatch::new(path);
                let name = found.display_name();

                match self.output.enqueue(found) {
                    Ok(()) => {
                        trace!(worker = ctx.id, dir = %task.path.display(), file = %name, "File matched");
                        ctx.stats.record_match();
                        ctx.audit.record(|| {
                            format!("Filter on thread id {}: file named {} was found", ctx.id, name)
                        });
                    }
                    Err(QueueError::Abandoned { .. }) => {
                        warn!(worker = ctx.id, "No sinks remain, draining without producing");
                        downstream_open = false;
                        break;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        Ok(())
    }
}

/// List direct children of `dir` that are not directories and whose names
/// start with `prefix`
///
/// Symlinks are resolved, so a link to a directory is excluded and a
/// dangling link is included (the copy will report it).
pub fn matching_files(dir: &Path, prefix: &str) -> StageResult<Vec<PathBuf>> {
    let list_err = |source| StageError::ListDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut matches = Vec::new();
    for entry in fs::read_dir(dir).map_err(list_err)? {
        let entry = entry.map_err(list_err)?;
        if !entry
            .file_name()
            .as_encoded_bytes()
            .starts_with(prefix.as_bytes())
        {
            continue;
        }

        let file_type = entry.file_type().map_err(list_err)?;
        let is_dir = if file_type.is_symlink() {
            fs::metadata(entry.path()).map(|m| m.is_dir()).unwrap_or(false)
        } else {
            file_type.is_dir()
        };

        if !is_dir {
            matches.push(entry.path());
        }
    }
    Ok(matches)
}
