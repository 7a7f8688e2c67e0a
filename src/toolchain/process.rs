//! Runs Tinker programs as child processes

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::{Invocation, ToolError, ToolOutput, Toolchain};
use crate::signal::SignalState;
use crate::timeout::{TimeoutConfig, TimeoutEnforcer};

/// Default interval between exit checks
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Toolchain backed by executables in one directory
#[derive(Debug, Clone)]
pub struct ProcessToolchain {
    bin_dir: PathBuf,
    timeout: TimeoutConfig,
    signal: Option<Arc<SignalState>>,
    poll_interval: Duration,
}

impl ProcessToolchain {
    pub fn new(bin_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin_dir: bin_dir.into(),
            timeout: TimeoutConfig::default(),
            signal: None,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_timeout(mut self, timeout: TimeoutConfig) -> Self {
        self.timeout = timeout;
        self
    }

    /// Kill running programs once the state asks for it
    pub fn with_signal_state(mut self, signal: Arc<SignalState>) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn program_path(&self, program: &str) -> PathBuf {
        self.bin_dir.join(program)
    }

    fn wait(&self, child: &mut Child, program: &str) -> Result<ExitStatus, ToolError> {
        let enforcer = TimeoutEnforcer::new(self.timeout);
        loop {
            let polled = child.try_wait().map_err(|source| ToolError::Io {
                program: program.to_string(),
                source,
            })?;
            if let Some(status) = polled {
                return Ok(status);
            }

            if enforcer.check().is_timeout() {
                warn!(
                    "{} exceeded {}s, killing it",
                    program, self.timeout.invocation_seconds
                );
                kill(child, program);
                return Err(ToolError::TimedOut {
                    program: program.to_string(),
                    seconds: self.timeout.invocation_seconds,
                });
            }

            if self.signal.as_ref().is_some_and(|s| s.is_kill_requested()) {
                warn!("Killing {} on interrupt", program);
                kill(child, program);
                return Err(ToolError::Cancelled {
                    program: program.to_string(),
                });
            }

            thread::sleep(self.poll_interval);
        }
    }
}

impl Toolchain for ProcessToolchain {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
        let program = invocation.program.as_str();
        let path = self.program_path(program);
        if !path.is_file() {
            return Err(ToolError::NotFound {
                program: program.to_string(),
                path,
            });
        }

        debug!("Running {} in {}", invocation, invocation.work_dir.display());
        let mut command = Command::new(&path);
        command
            .args(&invocation.args)
            .current_dir(&invocation.work_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group, so a kill reaches programs started by wrapper scripts
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command
            .spawn()
            .map_err(|source| ToolError::Spawn {
                program: program.to_string(),
                source,
            })?;

        // Pipes are drained on their own threads so a chatty program never
        // blocks on a full buffer while we poll for its exit.
        let stdin = child.stdin.take().map(|mut pipe| {
            let input = invocation.stdin.clone();
            thread::spawn(move || match pipe.write_all(input.as_bytes()) {
                Err(e) if e.kind() != io::ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            })
        });
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = match self.wait(&mut child, program) {
            Ok(status) => status,
            Err(e) => {
                // A descendant outside the group may still hold the pipes;
                // the threads finish on their own once it exits.
                drop((stdin, stdout, stderr));
                return Err(e);
            }
        };

        let io_error = |source| ToolError::Io {
            program: program.to_string(),
            source,
        };
        if let Some(handle) = stdin {
            join(handle).map_err(io_error)?;
        }
        let stdout = stdout.map(join).transpose().map_err(io_error)?.unwrap_or_default();
        let stderr = stderr.map(join).transpose().map_err(io_error)?.unwrap_or_default();

        trace!("{} stdout:\n{}", program, stdout);
        if !status.success() {
            return Err(ToolError::Failed {
                program: program.to_string(),
                status: status.code(),
                stderr: if stderr.trim().is_empty() { stdout } else { stderr },
            });
        }

        Ok(ToolOutput { stdout, stderr })
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<io::Result<String>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
}

fn join<T>(handle: JoinHandle<io::Result<T>>) -> io::Result<T> {
    handle
        .join()
        .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::Other, "pipe thread panicked")))
}

fn kill(child: &mut Child, program: &str) {
    #[cfg(unix)]
    {
        let group = -(child.id() as libc::pid_t);
        if unsafe { libc::kill(group, libc::SIGKILL) } != 0 {
            warn!("Failed to kill {}: {}", program, io::Error::last_os_error());
        }
    }
    #[cfg(not(unix))]
    if let Err(e) = child.kill() {
        warn!("Failed to kill {}: {}", program, e);
    }
    // Reap so the pipes close and no zombie is left behind
    let _ = child.wait();
}
