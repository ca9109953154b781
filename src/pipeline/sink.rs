//! Sink stage
//!
//! Copies each matched file to a same-named file under the destination
//! directory through a fixed-size buffer. Only the bytes actually read are
//! written, so a short final read never carries stale buffer contents.
//!
//! Bytes go to a staging file private to the copying worker, which is then
//! renamed onto the target. Two sinks copying same-named files from
//! different directories therefore never interleave writes: the target
//! always holds one complete source, the last one renamed.

use crate::error::{StageError, StageResult};
use crate::pipeline::queue::ConsumerLease;
use crate::pipeline::stage::{skip_item, FileMatch, Stage, StageContext, StageKind};
use std::ffi::{OsStr, OsString};
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{debug, trace};

/// File copier draining the results queue
pub struct Sink {
    destination: PathBuf,
    buffer_size: usize,
    input: ConsumerLease<FileMatch>,
}

impl Sink {
    pub fn new(destination: PathBuf, buffer_size: usize, input: ConsumerLease<FileMatch>) -> Self {
        Self {
            destination,
            buffer_size,
            input,
        }
    }
}

impl Stage for Sink {
    fn kind(&self) -> StageKind {
        StageKind::Sink
    }

    fn run(self, ctx: StageContext) -> StageResult<()> {
        let mut buf = vec![0u8; self.buffer_size];

        for file in self.input.iter() {
            if ctx.is_shutting_down() {
                ctx.stats.record_skip();
                continue;
            }

            match copy_file(&file.path, &self.destination, ctx.id, &mut buf) {
                Ok(bytes) => {
                    let name = file.display_name();
                    trace!(worker = ctx.id, file = %name, bytes = bytes, "File copied");
                    ctx.stats.record_copy(bytes);
                    ctx.audit.record(|| {
                        format!("Sink on thread id {}: file named {} was copied", ctx.id, name)
                    });
                }
                Err(e) if e.is_recoverable() => skip_item(&ctx, StageKind::Sink, &e),
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}

/// Copy `source` into `destination_dir` under the same file name
///
/// The bytes are written to a staging file named after `worker` and renamed
/// onto the target once complete, replacing any existing file. `buf` sets
/// the chunk size and must not be empty. Returns the number of bytes
/// written.
pub fn copy_file(
    source: &Path,
    destination_dir: &Path,
    worker: usize,
    buf: &mut [u8],
) -> StageResult<u64> {
    debug_assert!(!buf.is_empty(), "copy buffer must not be empty");

    let name = source.file_name().ok_or_else(|| StageError::NoFileName {
        path: source.to_path_buf(),
    })?;
    let target = destination_dir.join(name);

    if is_same_file(source, &target) {
        return Err(StageError::SameFile {
            path: source.to_path_buf(),
        });
    }

    let mut reader = File::open(source).map_err(|e| StageError::Open {
        path: source.to_path_buf(),
        source: e,
    })?;

    let staging = destination_dir.join(staging_name(name, worker));
    let result = write_staged(&mut reader, source, &staging, buf).and_then(|total| {
        fs::rename(&staging, &target).map_err(|e| StageError::Rename {
            path: target.clone(),
            source: e,
        })?;
        Ok(total)
    });

    if result.is_err() {
        if let Err(e) = fs::remove_file(&staging) {
            if e.kind() != ErrorKind::NotFound {
                debug!(path = %staging.display(), error = %e, "Failed to remove staging file");
            }
        }
    }
    result
}

/// Hidden per-process, per-worker staging name for `name`
fn staging_name(name: &OsStr, worker: usize) -> OsString {
    let mut staged = OsString::from(".");
    staged.push(name);
    staged.push(format!(".{}-{}.tmp", process::id(), worker));
    staged
}

fn write_staged(reader: &mut File, source: &Path, staging: &Path, buf: &mut [u8]) -> StageResult<u64> {
    let mut writer = File::create(staging).map_err(|e| StageError::Create {
        path: staging.to_path_buf(),
        source: e,
    })?;

    let copy_err = |e| StageError::Copy {
        path: source.to_path_buf(),
        source: e,
    };

    let mut total = 0u64;
    loop {
        let n = match reader.read(buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(copy_err(e)),
        };
        writer.write_all(&buf[..n]).map_err(copy_err)?;
        total += n as u64;
    }
    writer.flush().map_err(copy_err)?;

    Ok(total)
}

fn is_same_file(source: &Path, target: &Path) -> bool {
    match (fs::canonicalize(source), fs::canonicalize(target)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
