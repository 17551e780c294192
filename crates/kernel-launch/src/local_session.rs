//! A notebook session backed by a kernel process on this machine.
//!
//! Rebinding launches the new kernel from its kernelspec, waits for a
//! `kernel_info` handshake, and only then retires the previous kernel. If the
//! new kernel fails to come up, the session stays on the kernel it had.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use jupyter_protocol::{ConnectionInfo, JupyterMessage, KernelInfoRequest, ShutdownRequest};
use kernel_switch::{KernelConnection, KernelError, NotebookSession};
use log::{debug, info, warn};
use uuid::Uuid;

/// Prefix of connection files written by this crate.
pub const CONNECTION_FILE_PREFIX: &str = "runt-kernel-";

/// Releases what a launch attempt acquired when dropped: the kernel's process
/// group and its connection file.
struct KernelCleanup {
    connection_file: PathBuf,
    #[cfg(unix)]
    process_group_id: Option<i32>,
}

impl KernelCleanup {
    fn new(connection_file: PathBuf) -> Self {
        Self {
            connection_file,
            #[cfg(unix)]
            process_group_id: None,
        }
    }

    /// Kill every process the kernelspec command started, including kernels
    /// spawned by wrappers such as `uv run` or `conda run`.
    fn kill_process_group(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.process_group_id.take() {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;
            if let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                if e != nix::errno::Errno::ESRCH {
                    warn!(
                        "[local-session] Failed to kill process group {}: {}",
                        pgid, e
                    );
                }
            }
        }
    }
}

impl Drop for KernelCleanup {
    fn drop(&mut self) {
        self.kill_process_group();
        std::fs::remove_file(&self.connection_file).ok();
    }
}

/// A kernel process launched for a session.
struct RunningKernel {
    kernel_id: String,
    connection_info: ConnectionInfo,
    session_id: String,
    _process: tokio::process::Child,
    cleanup: KernelCleanup,
}

impl RunningKernel {
    fn connection_file(&self) -> &Path {
        &self.cleanup.connection_file
    }

    /// Ask the kernel to exit, then kill its process group.
    async fn shutdown(mut self) {
        match runtimelib::create_client_control_connection(&self.connection_info, &self.session_id)
            .await
        {
            Ok(mut control) => {
                let request: JupyterMessage = ShutdownRequest { restart: false }.into();
                control.send(request).await.ok();
            }
            Err(e) => {
                debug!(
                    "[local-session] No control connection to {}: {}",
                    self.kernel_id, e
                );
            }
        }
        self.cleanup.kill_process_group();
        info!("[local-session] Shut down kernel {}", self.kernel_id);
    }
}

pub struct LocalNotebookSession {
    notebook_path: Option<PathBuf>,
    connection: Option<KernelConnection>,
    kernel: Option<RunningKernel>,
}

impl LocalNotebookSession {
    /// A session without a kernel. `notebook_path` is `None` for untitled
    /// notebooks.
    pub fn new(notebook_path: Option<PathBuf>) -> Self {
        Self {
            notebook_path,
            connection: None,
            kernel: None,
        }
    }

    pub fn kernel_id(&self) -> Option<&str> {
        self.kernel.as_ref().map(|k| k.kernel_id.as_str())
    }

    pub fn connection_file(&self) -> Option<&Path> {
        self.kernel.as_ref().map(RunningKernel::connection_file)
    }

    pub fn is_running(&self) -> bool {
        self.kernel.is_some()
    }

    /// Shut down the bound kernel, leaving the session without one.
    pub async fn shutdown(&mut self) {
        if let Some(kernel) = self.kernel.take() {
            kernel.shutdown().await;
        }
        self.connection = None;
    }

    /// Kernels run next to the notebook; untitled notebooks use the home
    /// directory.
    fn working_dir(&self) -> PathBuf {
        working_dir_for(self.notebook_path.as_deref())
    }

    async fn launch(
        &self,
        connection: &KernelConnection,
        timeout: Duration,
    ) -> Result<RunningKernel, KernelError> {
        let name = connection.kernelspec_name.as_str();

        let kernelspec = runtimelib::find_kernelspec(name)
            .await
            .map_err(|e| KernelError::invalid_kernel(name, e))?;

        let ip = std::net::IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
        let ports = runtimelib::peek_ports(ip, 5)
            .await
            .map_err(|e| KernelError::session_start(name, e))?;

        let connection_info = ConnectionInfo {
            transport: jupyter_protocol::connection_info::Transport::TCP,
            ip: ip.to_string(),
            stdin_port: ports[0],
            control_port: ports[1],
            hb_port: ports[2],
            shell_port: ports[3],
            iopub_port: ports[4],
            signature_scheme: "hmac-sha256".to_string(),
            key: Uuid::new_v4().to_string(),
            kernel_name: Some(name.to_string()),
        };

        let runtime_dir = runtimelib::dirs::runtime_dir();
        tokio::fs::create_dir_all(&runtime_dir)
            .await
            .map_err(|e| KernelError::session_start(name, e))?;

        let kernel_id: String =
            petname::petname(2, "-").unwrap_or_else(|| Uuid::new_v4().to_string());
        #[cfg_attr(not(unix), allow(unused_mut))]
        let mut cleanup = KernelCleanup::new(connection_file_path(&runtime_dir, &kernel_id));

        let contents = serde_json::to_string_pretty(&connection_info)
            .map_err(|e| KernelError::session_start(name, e))?;
        tokio::fs::write(&cleanup.connection_file, contents)
            .await
            .map_err(|e| KernelError::session_start(name, e))?;

        info!(
            "[local-session] Starting kernel {} ({}) at {:?}",
            name, kernel_id, cleanup.connection_file
        );

        let mut cmd = kernelspec
            .command(
                &cleanup.connection_file,
                Some(Stdio::null()),
                Some(Stdio::null()),
            )
            .map_err(|e| KernelError::invalid_kernel(name, e))?;
        cmd.current_dir(self.working_dir());

        #[cfg(unix)]
        cmd.process_group(0);

        let mut process = cmd
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| KernelError::session_start(name, e))?;

        #[cfg(unix)]
        {
            cleanup.process_group_id = process.id().map(|pid| pid as i32);
        }

        let session_id = Uuid::new_v4().to_string();
        let outcome = tokio::time::timeout(timeout, async {
            tokio::select! {
                reply = kernel_info_handshake(&connection_info, &session_id) => {
                    reply.map_err(|e| KernelError::raw_session_start(name, e))
                }
                status = process.wait() => Err(match status {
                    Ok(status) => KernelError::session_start(
                        name,
                        format!("kernel process exited before responding ({status})"),
                    ),
                    Err(e) => KernelError::session_start(name, e),
                }),
            }
        })
        .await;

        let msg_type = match outcome {
            Ok(Ok(msg_type)) => msg_type,
            Ok(Err(e)) => {
                warn!("[local-session] Kernel {} failed to start: {}", kernel_id, e);
                return Err(e);
            }
            Err(_) => {
                warn!(
                    "[local-session] Kernel {} did not respond within {:?}",
                    kernel_id, timeout
                );
                return Err(KernelError::Timeout {
                    kernel: name.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        };
        info!("[local-session] Kernel {} alive: got {}", kernel_id, msg_type);

        Ok(RunningKernel {
            kernel_id,
            connection_info,
            session_id,
            _process: process,
            cleanup,
        })
    }
}

#[async_trait]
impl NotebookSession for LocalNotebookSession {
    fn resource(&self) -> Option<&Path> {
        self.notebook_path.as_deref()
    }

    fn connection(&self) -> Option<&KernelConnection> {
        self.connection.as_ref()
    }

    async fn rebind_kernel(
        &mut self,
        connection: &KernelConnection,
        timeout: Duration,
    ) -> Result<(), KernelError> {
        if !connection.local_launch {
            return Err(KernelError::Other(anyhow::anyhow!(
                "{} runs on a remote server; local sessions only launch local kernels",
                connection.id
            )));
        }

        let kernel = self.launch(connection, timeout).await?;

        if let Some(previous) = self.kernel.replace(kernel) {
            previous.shutdown().await;
        }
        self.connection = Some(connection.clone());
        Ok(())
    }
}

/// Open a shell channel and wait for the reply to a `kernel_info_request`.
///
/// Returns the reply's message type.
async fn kernel_info_handshake(
    connection_info: &ConnectionInfo,
    session_id: &str,
) -> anyhow::Result<String> {
    let identity = runtimelib::peer_identity_for_session(session_id)?;
    let mut shell = runtimelib::create_client_shell_connection_with_identity(
        connection_info,
        session_id,
        identity,
    )
    .await?;

    let request: JupyterMessage = KernelInfoRequest::default().into();
    shell.send(request).await?;

    let reply = shell.read().await?;
    if reply.header.msg_type != "kernel_info_reply" {
        anyhow::bail!("Unexpected reply to kernel_info_request: {}", reply.header.msg_type);
    }
    Ok(reply.header.msg_type)
}

fn connection_file_path(runtime_dir: &Path, kernel_id: &str) -> PathBuf {
    runtime_dir.join(format!("{CONNECTION_FILE_PREFIX}{kernel_id}.json"))
}

fn working_dir_for(notebook_path: Option<&Path>) -> PathBuf {
    match notebook_path.and_then(Path::parent) {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => dirs::home_dir().unwrap_or_else(std::env::temp_dir),
    }
}
