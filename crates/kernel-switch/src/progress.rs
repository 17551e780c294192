//! Progress reporting for kernel switch attempts.
//!
//! Each rebind attempt is wrapped in [`with_progress`], which emits a
//! [`SwitchProgressPhase::Shown`] event before the attempt and a matching
//! [`SwitchProgressPhase::Dismissed`] event once it finishes. Consumers
//! implement [`ProgressHandler`] to route these to their UI layer.

use std::future::Future;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Progress events for a single switch attempt.
///
/// Serializable for transport over IPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SwitchProgressPhase {
    /// The indicator is now visible.
    Shown { title: String, cancellable: bool },
    /// The indicator was dismissed.
    Dismissed { title: String, elapsed_ms: u64 },
}

/// How the progress indicator should be presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressOptions {
    pub title: String,
    pub cancellable: bool,
}

impl ProgressOptions {
    pub fn non_cancellable(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            cancellable: false,
        }
    }
}

/// Trait for receiving switch progress events.
pub trait ProgressHandler: Send + Sync {
    fn on_progress(&self, phase: SwitchProgressPhase);
}

/// Log-only progress handler.
///
/// Writes progress phases to the `log` crate at info level.
pub struct LogHandler;

impl ProgressHandler for LogHandler {
    fn on_progress(&self, phase: SwitchProgressPhase) {
        match &phase {
            SwitchProgressPhase::Shown { title, .. } => {
                log::info!("[kernel-switch] {title}...");
            }
            SwitchProgressPhase::Dismissed { title, elapsed_ms } => {
                log::info!("[kernel-switch] {title} finished after {elapsed_ms}ms");
            }
        }
    }
}

/// Dismisses the indicator when dropped, so it goes away whether the body
/// completed, failed, or was dropped mid-flight.
struct ProgressScope<'a> {
    handler: &'a dyn ProgressHandler,
    title: String,
    started: Instant,
}

impl Drop for ProgressScope<'_> {
    fn drop(&mut self) {
        self.handler.on_progress(SwitchProgressPhase::Dismissed {
            title: std::mem::take(&mut self.title),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        });
    }
}

/// Show a progress indicator for the duration of `body`.
pub async fn with_progress<F, T>(
    handler: &dyn ProgressHandler,
    options: ProgressOptions,
    body: F,
) -> T
where
    F: Future<Output = T>,
{
    handler.on_progress(SwitchProgressPhase::Shown {
        title: options.title.clone(),
        cancellable: options.cancellable,
    });
    let _scope = ProgressScope {
        handler,
        title: options.title,
        started: Instant::now(),
    };
    body.await
}
