//! Console subprocess execution
//!
//! The console is started as `[sudo] <bin> -c <cfg> [-D <director>]` and
//! fed a short script on stdin. stdout and stderr are captured through one
//! pipe so lines keep their relative order.

use super::command::{prepare_output, CommandRequest, CommandResult};
use crate::config::ConsoleConfig;
use crate::error::{ApiError, Result};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// How often a running console is polled for exit
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Time a console gets to exit after SIGTERM before it is killed
const TERMINATE_GRACE: Duration = Duration::from_secs(1);

/// Time allowed for draining output after the console exited
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A fully prepared process invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program to start
    pub program: PathBuf,
    /// Program arguments
    pub args: Vec<String>,
    /// Data written to stdin, stdin is closed when `None`
    pub stdin: Option<String>,
    /// Maximum run time
    pub timeout: Duration,
}

impl Invocation {
    /// Command line for logs
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Raw result of a finished process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Merged stdout and stderr split into lines, trailing whitespace removed
    pub lines: Vec<String>,
    /// Exit status, -1 when terminated by a signal
    pub exitcode: i32,
}

/// Runs prepared invocations
pub trait Executor: Send + Sync {
    /// Run the invocation to completion
    fn run(&self, invocation: &Invocation) -> Result<ProcessOutput>;
}

/// Executor spawning real processes
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExecutor;

impl Executor for ProcessExecutor {
    fn run(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        let (mut child, mut reader) = spawn_merged(invocation)?;

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            let res = reader.read_to_end(&mut buf).map(|_| buf);
            let _ = tx.send(res);
        });

        // Past this point every failure must reap the child.
        let status = match write_script(&mut child, invocation)
            .and_then(|()| wait_with_timeout(&mut child, invocation))
        {
            Ok(status) => status,
            Err(err) => {
                terminate(&mut child);
                return Err(err);
            }
        };

        let bytes = match rx.recv_timeout(DRAIN_TIMEOUT) {
            Ok(res) => res.map_err(|e| ApiError::io(&invocation.program, e))?,
            Err(_) => {
                // A leftover descendant still holds the pipe
                signal_group(child.id(), GroupSignal::Kill);
                return Err(ApiError::internal("Console output was not closed after exit"));
            }
        };

        Ok(ProcessOutput {
            lines: split_lines(&bytes),
            exitcode: status.code().unwrap_or(-1),
        })
    }
}

fn write_script(child: &mut Child, invocation: &Invocation) -> Result<()> {
    // Dropping stdin at the end closes it
    if let Some(mut stdin) = child.stdin.take() {
        if let Some(ref script) = invocation.stdin {
            if let Err(e) = stdin.write_all(script.as_bytes()) {
                // The console may exit before reading all of its input
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(ApiError::io(&invocation.program, e));
                }
            }
        }
    }
    Ok(())
}

fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(|l| l.trim_end().to_string())
        .collect()
}

fn wait_with_timeout(child: &mut Child, invocation: &Invocation) -> Result<ExitStatus> {
    let deadline = Instant::now() + invocation.timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            tracing::warn!(
                target: "execute",
                "Console timed out after {}s: {}",
                invocation.timeout.as_secs(),
                invocation.display()
            );
            return Err(ApiError::ConsoleTimeout(invocation.timeout.as_secs()));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Term,
    Kill,
}

/// Signal the process group led by `pid`. Returns whether it was delivered.
#[cfg(unix)]
fn signal_group(pid: u32, signal: GroupSignal) -> bool {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let signal = match signal {
        GroupSignal::Term => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    match i32::try_from(pid) {
        Ok(pid) => killpg(Pid::from_raw(pid), signal).is_ok(),
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: u32, _signal: GroupSignal) -> bool {
    false
}

/// Stop a child and everything it started, politely first so sudo can
/// forward the signal. The child is always reaped.
fn terminate(child: &mut Child) {
    if signal_group(child.id(), GroupSignal::Term) {
        let grace = Instant::now() + TERMINATE_GRACE;
        while Instant::now() < grace {
            if let Ok(Some(_)) = child.try_wait() {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
    signal_group(child.id(), GroupSignal::Kill);
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn spawn_merged(invocation: &Invocation) -> Result<(Child, Box<dyn Read + Send>)> {
    use std::fs::File;

    let (read_end, write_end) = output_pipe()
        .map_err(|e| ApiError::internal(format!("Unable to create console pipe: {}", e)))?;
    let write_err = write_end.try_clone()?;

    // The Command holds the write ends until dropped, so it must not outlive
    // the spawn or the reader never sees end of file.
    let child = {
        use std::os::unix::process::CommandExt;

        let mut command = Command::new(&invocation.program);
        // Own process group, so a timeout can stop the console's descendants
        command
            .process_group(0)
            .args(&invocation.args)
            .stdin(stdin_mode(invocation))
            .stdout(Stdio::from(write_end))
            .stderr(Stdio::from(write_err));
        command
            .spawn()
            .map_err(|e| ApiError::io(&invocation.program, e))?
    };

    Ok((child, Box::new(File::from(read_end))))
}

#[cfg(target_os = "linux")]
fn output_pipe() -> nix::Result<(std::os::fd::OwnedFd, std::os::fd::OwnedFd)> {
    nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn output_pipe() -> nix::Result<(std::os::fd::OwnedFd, std::os::fd::OwnedFd)> {
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};
    use std::os::fd::AsRawFd;

    let (read_end, write_end) = nix::unistd::pipe()?;
    for fd in [&read_end, &write_end] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    Ok((read_end, write_end))
}

#[cfg(not(unix))]
fn spawn_merged(invocation: &Invocation) -> Result<(Child, Box<dyn Read + Send>)> {
    let mut child = Command::new(&invocation.program)
        .args(&invocation.args)
        .stdin(stdin_mode(invocation))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ApiError::io(&invocation.program, e))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ApiError::internal("Console stdout not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ApiError::internal("Console stderr not captured"))?;
    Ok((child, Box::new(stdout.chain(stderr))))
}

fn stdin_mode(invocation: &Invocation) -> Stdio {
    if invocation.stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    }
}

/// Console command runner
///
/// Holds the console configuration and an [`Executor`]. A console
/// configuration override (for example from an OAuth2 client) is passed per
/// call and never stored.
#[derive(Clone)]
pub struct Console {
    config: ConsoleConfig,
    executor: Arc<dyn Executor>,
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Console {
    /// Create a runner spawning real console processes
    pub fn new(config: ConsoleConfig) -> Self {
        Self::with_executor(config, Arc::new(ProcessExecutor))
    }

    /// Create a runner with a custom executor
    pub fn with_executor(config: ConsoleConfig, executor: Arc<dyn Executor>) -> Self {
        Self { config, executor }
    }

    /// Console configuration
    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    fn invocation(&self, cfg_override: Option<&Path>, extra: Vec<String>, stdin: Option<String>) -> Invocation {
        let cfg = cfg_override.unwrap_or(&self.config.cfg_path);
        let mut args = Vec::new();
        let program = if self.config.use_sudo {
            args.push(self.config.bin_path.display().to_string());
            PathBuf::from("sudo")
        } else {
            self.config.bin_path.clone()
        };
        args.push("-c".to_string());
        args.push(cfg.display().to_string());
        args.extend(extra);
        Invocation {
            program,
            args,
            stdin,
            timeout: Duration::from_secs(self.config.timeout_secs),
        }
    }

    /// List the directors defined in the console configuration
    pub fn directors(&self, cfg_override: Option<&Path>) -> Result<CommandResult> {
        if !self.config.enabled {
            return Err(ApiError::ConsoleDisabled);
        }

        let invocation = self.invocation(cfg_override, vec!["-l".to_string()], None);
        let out = self.executor.run(&invocation)?;
        tracing::debug!(
            target: "execute",
            command = %invocation.display(),
            exitcode = out.exitcode,
            output = ?out.lines,
            "Console directors"
        );

        if out.exitcode != 0 {
            return Err(ApiError::ConsoleConnection {
                output: out.lines,
                exitcode: out.exitcode,
            });
        }

        Ok(CommandResult {
            output: out.lines.into_iter().filter(|l| !l.is_empty()).collect(),
            exitcode: 0,
        })
    }

    /// Run a console command.
    ///
    /// Checks run in this order: console enabled, command allowed, director
    /// known. Nothing is spawned for a rejected command.
    pub fn execute(&self, request: &CommandRequest, cfg_override: Option<&Path>) -> Result<CommandResult> {
        if !self.config.enabled {
            return Err(ApiError::ConsoleDisabled);
        }
        request.validate()?;

        let mut extra = Vec::new();
        if let Some(ref director) = request.director {
            let directors = self.directors(cfg_override)?;
            if !directors.output.iter().any(|d| d == director) {
                return Err(ApiError::InvalidDirector);
            }
            extra.push("-D".to_string());
            extra.push(director.clone());
        }

        let script = request.script();
        let invocation = self.invocation(cfg_override, extra, Some(script.clone()));
        let out = self.executor.run(&invocation)?;
        tracing::debug!(
            target: "execute",
            command = %invocation.display(),
            script = %script,
            exitcode = out.exitcode,
            output = ?out.lines,
            "Console command"
        );

        if out.exitcode != 0 {
            return Err(ApiError::ConsoleConnection {
                output: out.lines,
                exitcode: out.exitcode,
            });
        }

        Ok(CommandResult {
            output: prepare_output(out.lines, &request.command_line()),
            exitcode: out.exitcode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Executor answering `-l` with a director list and commands with a
    /// canned transcript
    struct FakeExecutor {
        calls: AtomicUsize,
        seen: Mutex<Vec<Invocation>>,
        directors: Vec<String>,
        transcript: Vec<String>,
        exitcode: i32,
    }

    impl FakeExecutor {
        fn new(transcript: &[&str], exitcode: i32) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                directors: vec!["dir1".to_string(), "dir2".to_string()],
                transcript: transcript.iter().map(|s| s.to_string()).collect(),
                exitcode,
            }
        }
    }

    impl Executor for FakeExecutor {
        fn run(&self, invocation: &Invocation) -> Result<ProcessOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(invocation.clone());
            let lines = if invocation.args.iter().any(|a| a == "-l") {
                self.directors.clone()
            } else {
                self.transcript.clone()
            };
            Ok(ProcessOutput {
                lines,
                exitcode: self.exitcode,
            })
        }
    }

    fn console(fake: &Arc<FakeExecutor>) -> Console {
        Console::with_executor(ConsoleConfig::default(), fake.clone())
    }

    #[test]
    fn test_version_scenario() {
        let fake = Arc::new(FakeExecutor::new(
            &["login banner", "version Director v1.2.3 (1Jan2020)", "quit"],
            0,
        ));
        let result = console(&fake)
            .execute(&CommandRequest::new(["version"]), None)
            .unwrap();
        assert_eq!(result.output, vec!["version Director v1.2.3 (1Jan2020)"]);
        assert_eq!(result.exitcode, 0);

        let seen = fake.seen.lock().unwrap();
        assert_eq!(seen[0].program, PathBuf::from("/usr/sbin/bconsole"));
        assert_eq!(seen[0].args, vec!["-c", "/etc/bacula/bconsole.conf"]);
        assert_eq!(seen[0].stdin.as_deref(), Some("gui on\nversion\nquit\n"));
    }

    #[test]
    fn test_invalid_command_never_spawns() {
        let fake = Arc::new(FakeExecutor::new(&[], 0));
        let err = console(&fake)
            .execute(&CommandRequest::new(["sqlquery"]).on_director(Some("dir1")), None)
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidCommand));
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_disabled_console() {
        let fake = Arc::new(FakeExecutor::new(&[], 0));
        let config = ConsoleConfig {
            enabled: false,
            ..Default::default()
        };
        let console = Console::with_executor(config, fake.clone());
        let err = console.execute(&CommandRequest::new(["version"]), None).unwrap_err();
        assert_eq!(err.code(), 11);
        assert!(matches!(console.directors(None), Err(ApiError::ConsoleDisabled)));
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_director_validation() {
        let fake = Arc::new(FakeExecutor::new(&["status director", "ok", "quit"], 0));
        let console = console(&fake);

        let err = console
            .execute(&CommandRequest::new(["status", "director"]).on_director(Some("dir9")), None)
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidDirector));
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);

        let result = console
            .execute(&CommandRequest::new(["status", "director"]).on_director(Some("dir2")), None)
            .unwrap();
        assert_eq!(result.output, vec!["status director", "ok"]);

        let seen = fake.seen.lock().unwrap();
        let last = seen.last().unwrap();
        assert_eq!(last.args, vec!["-c", "/etc/bacula/bconsole.conf", "-D", "dir2"]);
    }

    #[test]
    fn test_nonzero_exit_is_connection_error() {
        let fake = Arc::new(FakeExecutor::new(&["Director authorization problem."], 1));
        let err = console(&fake)
            .execute(&CommandRequest::new(["version"]), None)
            .unwrap_err();
        match err {
            ApiError::ConsoleConnection { output, exitcode } => {
                assert_eq!(exitcode, 1);
                assert_eq!(output, vec!["Director authorization problem."]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_sudo_and_config_override() {
        let fake = Arc::new(FakeExecutor::new(&["version", "quit"], 0));
        let config = ConsoleConfig {
            use_sudo: true,
            ..Default::default()
        };
        let console = Console::with_executor(config, fake.clone());
        console
            .execute(
                &CommandRequest::new(["version"]).with_api_mode(),
                Some(Path::new("/etc/bacula/user1.conf")),
            )
            .unwrap();

        let seen = fake.seen.lock().unwrap();
        assert_eq!(seen[0].program, PathBuf::from("sudo"));
        assert_eq!(
            seen[0].args,
            vec!["/usr/sbin/bconsole", "-c", "/etc/bacula/user1.conf"]
        );
        assert!(seen[0].stdin.as_deref().unwrap().contains(".api 2 nosignal api_opts=o\n"));
        // override is per call only
        assert_eq!(console.config().cfg_path, PathBuf::from("/etc/bacula/bconsole.conf"));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-bconsole");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        fn test_real_process_merges_output() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(
                dir.path(),
                "echo 'Connecting to Director'\nwhile read line; do echo \"$line\"; done\necho 'warning' 1>&2",
            );
            let config = ConsoleConfig {
                bin_path: bin,
                timeout_secs: 10,
                ..Default::default()
            };
            let console = Console::new(config);
            let result = console
                .execute(&CommandRequest::new(["list", "pools"]), None)
                .unwrap();
            // the echoed "quit" is followed by stderr's line, which is the one dropped
            assert_eq!(result.output, vec!["list pools", "quit"]);
        }

        #[test]
        fn test_real_process_timeout() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(dir.path(), "sleep 30");
            let config = ConsoleConfig {
                bin_path: bin,
                timeout_secs: 1,
                ..Default::default()
            };
            let started = Instant::now();
            let err = Console::new(config)
                .execute(&CommandRequest::new(["version"]), None)
                .unwrap_err();
            assert!(matches!(err, ApiError::ConsoleTimeout(1)));
            assert_eq!(err.code(), 4);
            assert!(started.elapsed() < Duration::from_secs(10));
        }

        #[cfg(target_os = "linux")]
        #[test]
        fn test_timeout_stops_background_children() {
            let dir = tempfile::tempdir().unwrap();
            let pidfile = dir.path().join("child.pid");
            let bin = script(
                dir.path(),
                &format!("sleep 30 &\necho $! > {}\nwait", pidfile.display()),
            );
            let config = ConsoleConfig {
                bin_path: bin,
                timeout_secs: 1,
                ..Default::default()
            };
            let started = Instant::now();
            let err = Console::new(config)
                .execute(&CommandRequest::new(["version"]), None)
                .unwrap_err();
            assert!(matches!(err, ApiError::ConsoleTimeout(1)));
            assert!(started.elapsed() < Duration::from_secs(DRAIN_TIMEOUT.as_secs()));

            let pid = std::fs::read_to_string(&pidfile).unwrap();
            let stat = format!("/proc/{}/stat", pid.trim());
            let deadline = Instant::now() + Duration::from_secs(2);
            let stopped = loop {
                // gone, or a zombie waiting for its new parent
                let alive = std::fs::read_to_string(&stat)
                    .map(|s| !s.contains(") Z "))
                    .unwrap_or(false);
                if !alive {
                    break true;
                }
                if Instant::now() >= deadline {
                    break false;
                }
                thread::sleep(POLL_INTERVAL);
            };
            assert!(stopped, "background sleep outlived the console");
        }

        #[test]
        fn test_real_process_directors() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(dir.path(), "printf 'dir1\\ndir2\\n'");
            let config = ConsoleConfig {
                bin_path: bin,
                ..Default::default()
            };
            let result = Console::new(config).directors(None).unwrap();
            assert_eq!(result.output, vec!["dir1", "dir2"]);
        }
    }
}
