//! Moves finished capture files into their organized location

use crate::utils::config::{FilerSettings, MAX_RETRY_ATTEMPTS, MAX_RETRY_DELAY_MS};
use crate::utils::error::RecorderError;
use crate::utils::organizer::FilingRequest;
use std::collections::HashSet;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// `EXDEV` on unix, `ERROR_NOT_SAME_DEVICE` on Windows
#[cfg(windows)]
const CROSS_DEVICE_ERROR: i32 = 17;
#[cfg(not(windows))]
const CROSS_DEVICE_ERROR: i32 = 18;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Executes filing requests
///
/// Holds no per-file state beyond the set of destination paths currently
/// being written, which keeps concurrent sessions from choosing the same name.
#[derive(Debug, Clone)]
pub struct Filer {
    settings: FilerSettings,
    reserved: Arc<Mutex<HashSet<PathBuf>>>,
}

/// A destination path claimed by an in-flight move
struct Reservation {
    path: PathBuf,
    reserved: Arc<Mutex<HashSet<PathBuf>>>,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.reserved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.path);
    }
}

impl Filer {
    pub fn new(settings: FilerSettings) -> Self {
        let settings = FilerSettings {
            retry_attempts: settings.retry_attempts.min(MAX_RETRY_ATTEMPTS),
            ..settings
        };
        Self {
            settings,
            reserved: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Move the request's source into its destination folder
    ///
    /// Returns the final path. On failure the source is left where it was.
    pub async fn file(&self, request: &FilingRequest) -> Result<PathBuf, RecorderError> {
        let source = &request.source_path;
        let wanted = request.destination_path();

        if *source == wanted {
            debug!("{:?} is already organized", source);
            return Ok(wanted);
        }
        if !source.exists() {
            return Err(RecorderError::SourceMissing(source.clone()));
        }

        let reservation = self.reserve(&request.destination_folder, &request.destination_filename);
        let target = reservation.path.clone();
        if target != wanted {
            info!("{:?} already exists, filing as {:?}", wanted, target);
        }

        let attempts = self.settings.retry_attempts.saturating_add(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            if attempt > 0 {
                sleep(self.backoff(attempt)).await;

                // A timed-out attempt may still have finished in the background
                if !source.exists() {
                    if target.exists() {
                        return Ok(target);
                    }
                    return Err(RecorderError::SourceMissing(source.clone()));
                }
            }

            let outcome = run_attempt(
                self.settings.operation_timeout(),
                &target,
                place(source, &request.destination_folder, &target),
            )
            .await;

            match outcome {
                Ok(()) => {
                    info!("Filed {:?} -> {:?}", source, target);
                    return Ok(target);
                }
                Err(e) => {
                    warn!("Moving {:?} failed (attempt {}): {}", source, attempt + 1, e);
                    last_error = e.to_string();
                }
            }
        }

        error!("Giving up on {:?} after {} attempt(s)", source, attempts);
        Err(RecorderError::MoveFailed {
            path: source.clone(),
            attempts,
            reason: last_error,
        })
    }

    /// Wait before retry number `attempt`: the base delay doubled per earlier
    /// failure, never longer than the largest configurable delay
    fn backoff(&self, attempt: usize) -> Duration {
        let ceiling = Duration::from_millis(MAX_RETRY_DELAY_MS);
        let factor = 1u32 << attempt.saturating_sub(1).min(6);
        self.settings
            .retry_delay()
            .checked_mul(factor)
            .map_or(ceiling, |delay| delay.min(ceiling))
    }

    /// Claim the first free name: `name.ext`, `name (1).ext`, `name (2).ext`, ...
    fn reserve(&self, folder: &Path, filename: &str) -> Reservation {
        let mut reserved = self.reserved.lock().unwrap_or_else(PoisonError::into_inner);

        let mut n = 0usize;
        loop {
            let name = if n == 0 {
                filename.to_string()
            } else {
                numbered_filename(filename, n)
            };
            let candidate = folder.join(name);

            if !reserved.contains(&candidate) && candidate.symlink_metadata().is_err() {
                reserved.insert(candidate.clone());
                return Reservation {
                    path: candidate,
                    reserved: Arc::clone(&self.reserved),
                };
            }
            n += 1;
        }
    }
}

/// `rec.mp4` -> `rec (n).mp4`
pub fn numbered_filename(filename: &str, n: usize) -> String {
    let path = Path::new(filename);
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) if !stem.is_empty() => format!(
            "{} ({}).{}",
            stem.to_string_lossy(),
            n,
            ext.to_string_lossy()
        ),
        _ => format!("{} ({})", filename, n),
    }
}

/// One move attempt bounded by `limit`
///
/// An attempt cut short may have left a partial copy next to `target`; it is
/// removed before the timeout is reported.
async fn run_attempt<F>(limit: Duration, target: &Path, attempt: F) -> Result<(), RecorderError>
where
    F: Future<Output = Result<(), RecorderError>>,
{
    match timeout(limit, attempt).await {
        Ok(result) => result,
        Err(_) => {
            discard_partial(&partial_path(target)).await;
            Err(RecorderError::Timeout(limit))
        }
    }
}

async fn place(source: &Path, folder: &Path, target: &Path) -> Result<(), RecorderError> {
    fs::create_dir_all(folder).await?;
    move_file(source, target).await
}

/// Move `source` to `target`, failing if `target` already exists
///
/// Copies and then deletes when the two are on different volumes.
pub async fn move_file(source: &Path, target: &Path) -> Result<(), RecorderError> {
    match link_into_place(source, target).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            debug!("{:?} and {:?} are on different volumes, copying", source, target);
            copy_then_remove(source, target).await
        }
        Err(e) => Err(e.into()),
    }
}

/// Link `from` at `to` and unlink `from`
///
/// Runs as a single blocking task, so an attempt that times out still
/// finishes or fails as a whole.
async fn link_into_place(from: &Path, to: &Path) -> io::Result<()> {
    let (from, to) = (from.to_path_buf(), to.to_path_buf());
    task::spawn_blocking(move || link_into_place_blocking(&from, &to))
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

fn link_into_place_blocking(from: &Path, to: &Path) -> io::Result<()> {
    match std::fs::hard_link(from, to) {
        Ok(()) => {
            if let Err(e) = std::fs::remove_file(from) {
                // The file must not end up in two places
                if let Err(undo) = std::fs::remove_file(to) {
                    warn!("{:?} is now also at {:?}: {}", from, to, undo);
                }
                return Err(e);
            }
            Ok(())
        }
        Err(e) if links_unsupported(&e) => {
            // FAT-style volumes: rename, after checking the name is still free
            if to.symlink_metadata().is_ok() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} already exists", to.display()),
                ));
            }
            std::fs::rename(from, to)
        }
        Err(e) => Err(e),
    }
}

fn is_cross_device(err: &io::Error) -> bool {
    err.raw_os_error() == Some(CROSS_DEVICE_ERROR)
}

fn links_unsupported(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Unsupported | io::ErrorKind::PermissionDenied
    )
}

async fn discard_partial(partial: &Path) {
    match fs::remove_file(partial).await {
        Ok(()) => debug!("Removed partial copy {:?}", partial),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial copy {:?}: {}", partial, e),
    }
}

/// Hidden sibling the copy is written to before it is linked into place
fn partial_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.partial", name))
}

/// Copy `source` next to `target`, verify it, link it into place and only
/// then delete `source`
///
/// On any failure before that the partial copy is removed and the source is
/// untouched.
pub async fn copy_then_remove(source: &Path, target: &Path) -> Result<(), RecorderError> {
    let partial = partial_path(target);
    let expected = fs::metadata(source).await?.len();

    let copied: Result<(), RecorderError> = async {
        let mut reader = File::open(source).await?;
        let mut writer = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&partial)
            .await?;

        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut bytes_copied = 0u64;
        loop {
            let bytes_read = reader.read(&mut buffer).await?;
            if bytes_read == 0 {
                break;
            }
            writer.write_all(&buffer[..bytes_read]).await?;
            bytes_copied += bytes_read as u64;
        }

        writer.flush().await?;
        writer.sync_all().await?;
        drop(writer);

        let written = fs::metadata(&partial).await?.len();
        if bytes_copied != expected || written != expected {
            return Err(RecorderError::CopyIncomplete {
                path: source.to_path_buf(),
                expected,
                actual: written,
            });
        }

        link_into_place(&partial, target).await?;
        Ok(())
    }
    .await;

    if let Err(e) = copied {
        discard_partial(&partial).await;
        return Err(e);
    }

    if let Err(e) = fs::remove_file(source).await {
        // The copy is complete, so the file now exists twice rather than never
        warn!("Copied {:?} but could not remove the original: {}", source, e);
    }
    Ok(())
}
