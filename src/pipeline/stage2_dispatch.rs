use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::input::{SlideError, SlideReader, SlideSource};
use crate::model::{ClassList, ModelError, ModelLoader, PatchClassifier};
use crate::pipeline::stage1_grid::Patch;

const PROGRESS_EVERY: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchResult {
    #[serde(skip)]
    pub index: usize,
    pub x: u32,
    pub y: u32,
    pub prediction: String,
    pub probabilities: Vec<f32>,
    pub confidence: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("region read failed: {0}")]
    Slide(#[from] SlideError),
    #[error("{0}")]
    Model(#[from] ModelError),
    #[error("probability vector has {got} entries, class list has {expected}")]
    ProbabilityLength { expected: usize, got: usize },
    #[error("probability vector contains a non-finite value")]
    NonFinite,
    #[error("classifier panicked")]
    Panicked,
}

#[derive(Debug, Clone)]
pub struct DispatchParams {
    pub num_workers: usize,
    /// Longest wait for the next completed patch before the batch is
    /// declared stalled.
    pub patch_timeout: Duration,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub unprocessed: usize,
}

#[derive(Debug)]
pub struct DispatchOutput {
    pub results: Vec<PatchResult>,
    pub stats: DispatchStats,
}

struct WorkQueue {
    patches: Vec<Patch>,
    cursor: AtomicUsize,
    stop: AtomicBool,
}

impl WorkQueue {
    fn next(&self) -> Option<Patch> {
        if self.stop.load(Ordering::Relaxed) {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.patches.get(idx).copied()
    }
}

struct PatchOutcome {
    patch: Patch,
    result: Result<PatchResult, PatchError>,
}

/// Classifies every patch on a pool of `num_workers` threads. Results arrive
/// in completion order; with a single worker that is input order. Failed,
/// timed-out and unprocessed patches are counted and dropped.
pub fn run_stage2(
    patches: &[Patch],
    slide: Arc<dyn SlideSource>,
    model: Arc<dyn ModelLoader>,
    params: &DispatchParams,
) -> DispatchOutput {
    let requested = patches.len();
    let mut stats = DispatchStats {
        requested,
        ..DispatchStats::default()
    };
    if requested == 0 {
        return DispatchOutput {
            results: Vec::new(),
            stats,
        };
    }

    let n_workers = params.num_workers.clamp(1, requested);
    info!(
        patches = requested,
        workers = n_workers,
        "dispatching patches for classification"
    );

    let queue = Arc::new(WorkQueue {
        patches: patches.to_vec(),
        cursor: AtomicUsize::new(0),
        stop: AtomicBool::new(false),
    });
    let (tx, rx) = mpsc::channel::<PatchOutcome>();

    let mut handles = Vec::with_capacity(n_workers);
    for worker_id in 0..n_workers {
        let tx = tx.clone();
        let queue = Arc::clone(&queue);
        let slide = Arc::clone(&slide);
        let model = Arc::clone(&model);
        let max_retries = params.max_retries;
        let spawned = thread::Builder::new()
            .name(format!("patch-worker-{worker_id}"))
            .spawn(move || {
                worker_loop(
                    worker_id,
                    &queue,
                    slide.as_ref(),
                    model.as_ref(),
                    max_retries,
                    &tx,
                )
            });
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(err) => error!(worker = worker_id, "failed to spawn worker: {err}"),
        }
    }
    drop(tx);

    let mut results = Vec::with_capacity(requested);
    let mut completed = 0usize;
    let mut stalled = false;
    while completed < requested {
        match rx.recv_timeout(params.patch_timeout) {
            Ok(outcome) => {
                completed += 1;
                match outcome.result {
                    Ok(result) => results.push(result),
                    Err(err) => {
                        stats.failed += 1;
                        warn!(
                            x = outcome.patch.x,
                            y = outcome.patch.y,
                            "patch dropped: {err}"
                        );
                    }
                }
                if completed % PROGRESS_EVERY == 0 {
                    info!("processed patch {completed}/{requested}");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                queue.stop.store(true, Ordering::Relaxed);
                stats.timed_out = requested - completed;
                stalled = true;
                warn!(
                    timeout_secs = params.patch_timeout.as_secs_f64(),
                    outstanding = stats.timed_out,
                    "no patch completed within the timeout; continuing with partial results"
                );
                break;
            }
            Err(RecvTimeoutError::Disconnected) => {
                stats.unprocessed = requested - completed;
                warn!(
                    outstanding = stats.unprocessed,
                    "all workers exited before the batch finished; continuing with partial results"
                );
                break;
            }
        }
    }

    // A stalled worker cannot be interrupted; its thread is left detached.
    if !stalled {
        for handle in handles {
            if handle.join().is_err() {
                warn!("patch worker terminated abnormally");
            }
        }
    }

    stats.succeeded = results.len();
    info!(
        succeeded = stats.succeeded,
        failed = stats.failed,
        timed_out = stats.timed_out,
        unprocessed = stats.unprocessed,
        "patch classification finished"
    );
    DispatchOutput { results, stats }
}

fn worker_loop(
    worker_id: usize,
    queue: &WorkQueue,
    slide: &dyn SlideSource,
    model: &dyn ModelLoader,
    max_retries: u32,
    tx: &Sender<PatchOutcome>,
) {
    // Each worker owns its slide handle and classifier instance.
    let reader = match slide.open() {
        Ok(reader) => reader,
        Err(err) => {
            error!(worker = worker_id, "worker could not open slide: {err}");
            return;
        }
    };
    let mut classifier = match model.load_worker() {
        Ok(classifier) => classifier,
        Err(err) => {
            error!(worker = worker_id, "worker could not load model: {err}");
            return;
        }
    };
    debug!(worker = worker_id, "worker ready");

    let classes = model.class_list();
    while let Some(patch) = queue.next() {
        let result = classify_with_retries(
            reader.as_ref(),
            classifier.as_mut(),
            classes,
            patch,
            max_retries,
        );
        if tx.send(PatchOutcome { patch, result }).is_err() {
            break;
        }
    }
}

pub(crate) fn classify_with_retries(
    reader: &dyn SlideReader,
    classifier: &mut dyn PatchClassifier,
    classes: &ClassList,
    patch: Patch,
    max_retries: u32,
) -> Result<PatchResult, PatchError> {
    let mut attempt = 0u32;
    loop {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            classify_patch(reader, &mut *classifier, classes, patch)
        }))
        .unwrap_or(Err(PatchError::Panicked));
        match outcome {
            Ok(result) => return Ok(result),
            Err(err) if attempt < max_retries => {
                attempt += 1;
                debug!(x = patch.x, y = patch.y, attempt, "retrying patch: {err}");
            }
            Err(err) => return Err(err),
        }
    }
}

pub fn classify_patch(
    reader: &dyn SlideReader,
    classifier: &mut dyn PatchClassifier,
    classes: &ClassList,
    patch: Patch,
) -> Result<PatchResult, PatchError> {
    let region = reader.read_region(patch.x, patch.y, 0, patch.size)?;
    let probabilities = classifier.predict(&region)?;
    build_patch_result(patch, probabilities, classes)
}

pub fn build_patch_result(
    patch: Patch,
    probabilities: Vec<f32>,
    classes: &ClassList,
) -> Result<PatchResult, PatchError> {
    if probabilities.len() != classes.len() {
        return Err(PatchError::ProbabilityLength {
            expected: classes.len(),
            got: probabilities.len(),
        });
    }
    if probabilities.iter().any(|p| !p.is_finite()) {
        return Err(PatchError::NonFinite);
    }
    let mut class_index = 0usize;
    for (i, &p) in probabilities.iter().enumerate() {
        if p > probabilities[class_index] {
            class_index = i;
        }
    }
    let prediction = classes
        .name(class_index)
        .map(str::to_string)
        .ok_or(PatchError::ProbabilityLength {
            expected: classes.len(),
            got: probabilities.len(),
        })?;
    Ok(PatchResult {
        index: patch.index,
        x: patch.x,
        y: patch.y,
        prediction,
        confidence: probabilities[class_index],
        probabilities,
    })
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage2_dispatch.rs"]
mod tests;
