//! Switch a session's kernel, re-prompting for a replacement when a locally
//! launched kernel fails to start.

use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::connection::KernelConnection;
use crate::error::KernelError;
use crate::progress::{with_progress, ProgressHandler, ProgressOptions};
use crate::session::{KernelPicker, NotebookSession};
use crate::settings::SwitchSettings;

pub struct KernelSwitcher {
    settings: SwitchSettings,
    picker: Arc<dyn KernelPicker>,
    progress: Arc<dyn ProgressHandler>,
}

impl KernelSwitcher {
    pub fn new(
        settings: SwitchSettings,
        picker: Arc<dyn KernelPicker>,
        progress: Arc<dyn ProgressHandler>,
    ) -> Self {
        Self {
            settings,
            picker,
            progress,
        }
    }

    pub fn settings(&self) -> &SwitchSettings {
        &self.settings
    }

    /// Bind `session` to `target`.
    ///
    /// Remote sessions get exactly one attempt. For local sessions, a
    /// recoverable failure asks the picker for a replacement and tries again
    /// with it, for as long as the user keeps picking kernels. Declining the
    /// picker returns the failure that prompted it. Errors are returned as
    /// they came from the session.
    pub async fn switch_kernel_with_retry(
        &self,
        session: &mut dyn NotebookSession,
        target: KernelConnection,
    ) -> Result<(), KernelError> {
        if !self.is_local_session(session) {
            debug!("[kernel-switch] Remote session, single attempt for {}", target.id);
            return self.switch_to_kernel(session, &target).await;
        }

        let resource: Option<PathBuf> = session.resource().map(PathBuf::from);
        let mut candidate = target;
        let mut attempt = 1u32;

        loop {
            let err = match self.switch_to_kernel(session, &candidate).await {
                Ok(()) => {
                    info!(
                        "[kernel-switch] Bound to {} after {} attempt(s)",
                        candidate.id, attempt
                    );
                    return Ok(());
                }
                Err(err) => err,
            };

            if !err.is_recoverable() {
                warn!(
                    "[kernel-switch] {} failed ({}), not retrying: {}",
                    candidate.id,
                    err.kind(),
                    err
                );
                return Err(err);
            }

            warn!(
                "[kernel-switch] {} failed to start ({}): {}",
                candidate.id,
                err.kind(),
                err
            );

            let replacement = self
                .picker
                .ask_for_replacement(resource.as_deref(), session.connection(), &candidate)
                .await
                .filter(|k| !k.is_empty());

            match replacement {
                Some(next) => {
                    info!(
                        "[kernel-switch] Retrying with {} (was {})",
                        next.id, candidate.id
                    );
                    candidate = next;
                    attempt += 1;
                }
                None => {
                    info!("[kernel-switch] No replacement picked for {}", candidate.id);
                    return Err(err);
                }
            }
        }
    }

    /// Locality comes from the session's current kernel. A session without
    /// one falls back to the configured server type.
    fn is_local_session(&self, session: &dyn NotebookSession) -> bool {
        match session.connection() {
            Some(current) => current.local_launch,
            None => {
                let local = self.settings.is_local_launch();
                debug!(
                    "[kernel-switch] Session has no kernel, using server type {} (local={})",
                    self.settings.jupyter_server_type, local
                );
                local
            }
        }
    }

    /// One rebind attempt, with a non-cancellable progress indicator shown
    /// while it runs.
    async fn switch_to_kernel(
        &self,
        session: &mut dyn NotebookSession,
        kernel: &KernelConnection,
    ) -> Result<(), KernelError> {
        let timeout = self.settings.launch_timeout_for(session.resource());
        let options = ProgressOptions::non_cancellable(format!("Connecting to kernel: {kernel}"));
        with_progress(
            self.progress.as_ref(),
            options,
            session.rebind_kernel(kernel, timeout),
        )
        .await
    }
}
