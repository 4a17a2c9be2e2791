// src/supervisor/handle.rs

//! Launching service processes, and the handle owning one OS process.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::info;

use crate::registry::ServiceDescriptor;
use crate::supervisor::escalation::{ManagedProcess, ProcessExit};
use crate::supervisor::terminate::terminate_tree;

/// One output channel of a launched process.
pub type OutputReader = Box<dyn AsyncRead + Unpin + Send>;

/// A freshly launched service process and its output channels.
pub struct Launched {
    pub process: Box<dyn ManagedProcess>,
    pub stdout: Option<OutputReader>,
    pub stderr: Option<OutputReader>,
}

/// Trait abstracting how service processes are launched.
///
/// Production code uses [`OsLauncher`]; tests substitute processes that
/// misbehave on purpose (for example ones that never die).
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, descriptor: Arc<ServiceDescriptor>) -> io::Result<Launched>;
}

/// Launches real OS processes through [`ProcessHandle::spawn`].
#[derive(Debug, Default, Clone, Copy)]
pub struct OsLauncher;

impl ProcessLauncher for OsLauncher {
    fn launch(&self, descriptor: Arc<ServiceDescriptor>) -> io::Result<Launched> {
        let (handle, output) = ProcessHandle::spawn(descriptor)?;
        Ok(Launched {
            process: Box::new(handle),
            stdout: output.stdout.map(|s| Box::new(s) as OutputReader),
            stderr: output.stderr.map(|s| Box::new(s) as OutputReader),
        })
    }
}

/// Output pipes taken from a freshly spawned child.
pub struct ChildOutput {
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
}

/// Exclusively owns the OS process of a live service.
pub struct ProcessHandle {
    descriptor: Arc<ServiceDescriptor>,
    child: Child,
    pid: Option<u32>,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("service", &self.descriptor.name)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl ProcessHandle {
    /// Spawn the service's command with piped stdout/stderr.
    pub fn spawn(descriptor: Arc<ServiceDescriptor>) -> io::Result<(Self, ChildOutput)> {
        let mut cmd = build_command(&descriptor)?;

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref cwd) = descriptor.cwd {
            cmd.current_dir(cwd);
        }
        cmd.envs(descriptor.env.iter());

        let mut child = cmd.spawn()?;
        let pid = child.id();

        info!(
            service = %descriptor.name,
            pid = ?pid,
            cmd = %descriptor.command_line(),
            "service process spawned"
        );

        let output = ChildOutput {
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
        };

        Ok((
            Self {
                descriptor,
                child,
                pid,
            },
            output,
        ))
    }
}

impl ManagedProcess for ProcessHandle {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn try_exit(&mut self) -> io::Result<Option<ProcessExit>> {
        Ok(self.child.try_wait()?.map(ProcessExit::from))
    }

    fn wait_for_exit(&mut self) -> Pin<Box<dyn Future<Output = io::Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.child.wait().await?;
            Ok(())
        })
    }

    fn force_terminate(&mut self) -> io::Result<()> {
        terminate_tree(&mut self.child)
    }
}

/// Build the OS command for a descriptor.
///
/// On unix the program is executed directly (so a missing binary is a spawn
/// error) in a new process group. On windows the command line goes through
/// `cmd /C` so `.cmd` shims such as `npx` resolve.
fn build_command(descriptor: &ServiceDescriptor) -> io::Result<Command> {
    let Some((program, args)) = descriptor.command.split_first() else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("service '{}' has an empty command", descriptor.name),
        ));
    };

    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(descriptor.command_line());
        c
    } else {
        let mut c = Command::new(program);
        c.args(args);
        c
    };

    #[cfg(unix)]
    cmd.process_group(0);

    Ok(cmd)
}
