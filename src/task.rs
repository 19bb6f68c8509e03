use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::anyhow;
use tracing::debug;

use crate::config::RunConfig;
use crate::error::{VideoMakerError, VideoMakerResult};
use crate::{Progress, RunSummary, VideoMaker};

/// Shared cancellation flag.
///
/// The pipeline checks it before each image and while ffmpeg runs. Decoding or
/// resizing a single image is never interrupted halfway.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> VideoMakerResult<()> {
        if self.is_cancelled() {
            Err(VideoMakerError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A run executing on its own worker thread.
///
/// Progress snapshots arrive over a channel; the channel closes when the worker
/// is done, after which [`RunHandle::wait`] returns the outcome.
pub struct RunHandle {
    events: Receiver<Progress>,
    cancel: CancelToken,
    worker: JoinHandle<VideoMakerResult<RunSummary>>,
}

impl RunHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Next pending progress event without blocking. `Ok(None)` means nothing
    /// new yet, `Err(())` that the worker has finished sending.
    #[allow(clippy::result_unit_err)]
    pub fn poll(&self) -> Result<Option<Progress>, ()> {
        match self.events.try_recv() {
            Ok(p) => Ok(Some(p)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(()),
        }
    }

    /// Blocking iterator over progress events; ends when the run does.
    pub fn events(&self) -> impl Iterator<Item = Progress> + '_ {
        self.events.iter()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    pub fn wait(self) -> VideoMakerResult<RunSummary> {
        self.worker
            .join()
            .map_err(|_| VideoMakerError::Other(anyhow!("video worker thread panicked")))?
    }
}

pub fn spawn_run(maker: VideoMaker, run: RunConfig) -> VideoMakerResult<RunHandle> {
    let (tx, events) = mpsc::channel();
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();

    let worker = thread::Builder::new()
        .name("videomaker-run".into())
        .spawn(move || {
            debug!(input = %run.input_dir.display(), "run started");
            maker.create_video(&run, &worker_cancel, |p| {
                // The receiver may be gone if the front end stopped listening.
                let _ = tx.send(p);
            })
        })
        .map_err(|e| VideoMakerError::Other(anyhow!("failed to start worker thread: {e}")))?;

    Ok(RunHandle { events, cancel, worker })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProgressPhase;

    #[test]
    fn token_is_shared_between_clones() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(a.check().is_ok());
        b.cancel();
        assert!(a.is_cancelled());
        assert!(matches!(a.check(), Err(VideoMakerError::Cancelled)));
    }

    #[test]
    fn empty_folder_reports_through_wait() {
        let dir = tempfile::tempdir().unwrap();
        let run = RunConfig::new(dir.path(), None, 2.0, 24);
        let handle = spawn_run(VideoMaker::new(), run).unwrap();

        let phases: Vec<ProgressPhase> = handle.events().map(|p| p.phase).collect();
        assert_eq!(phases, vec![ProgressPhase::Searching]);
        assert!(matches!(handle.wait(), Err(VideoMakerError::NoImages(_))));
    }

    #[test]
    fn invalid_run_fails_without_events() {
        let dir = tempfile::tempdir().unwrap();
        let run = RunConfig::new(dir.path().join("missing"), None, 2.0, 24);
        let handle = spawn_run(VideoMaker::new(), run).unwrap();
        assert_eq!(handle.events().count(), 0);
        assert!(handle.poll().is_err());
        assert!(matches!(handle.wait(), Err(VideoMakerError::Config(_))));
    }
}
