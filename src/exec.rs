use std::convert::Infallible;
use std::ffi::{self, CString, OsStr};
use std::fs;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::IntoRawFd;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{self, Signal};
use nix::sys::wait;
use nix::unistd::{self, ForkResult, Pid};
use thiserror::Error;

use crate::types::Pipeline;

#[derive(Debug, Error)]
pub enum ExecError {
	#[error("system error: {0}")]
	Sys(#[from] Errno),
	#[error("{0}")]
	Io(#[from] io::Error),
	#[error("nul byte in argument: {0}")]
	Nul(#[from] ffi::NulError),
	#[error("empty command in pipeline")]
	EmptyStage,
	#[error("command not found: {0}")]
	NotFound(String),
}

impl ExecError {
	/// Exit status for a child that failed before or during exec: 127 when
	/// the program does not exist, 126 for every other child-side failure.
	fn status(&self) -> libc::c_int {
		match *self {
			ExecError::NotFound(_) => 127,
			_ => 126,
		}
	}
}

/// Launches every stage of `pipeline` as its own process, connected
/// left-to-right by pipes, with the boundary redirections applied to the
/// first stage's stdin and the last stage's stdout. Blocks until all stages
/// have terminated unless the pipeline is marked background, in which case
/// one pid-pairing line is printed per stage and the call returns at once.
///
/// `Err` is returned only for parent-side failures (pipe or fork); any stage
/// already launched at that point is killed and reaped before returning.
pub fn execute(pipeline: &Pipeline) -> Result<(), ExecError> {
	let n = pipeline.stages.len();
	assert!(n > 0);

	let mut pids: Vec<Pid> = Vec::with_capacity(n);
	// Read end of the pipe feeding the stage about to be forked. Dropping an
	// OwnedFd closes it, so the parent can never finish this loop with a
	// pipe fd still open.
	let mut prev_read: Option<OwnedFd> = None;

	for i in 0 .. n {
		let pipe = if i + 1 < n {
			// O_CLOEXEC keeps the close discipline simple: every pipe fd a
			// child inherits vanishes at exec, and the dup2 copies on fds
			// 0/1 do not carry the flag.
			match unistd::pipe2(OFlag::O_CLOEXEC) {
				Ok(ends) => Some(ends),
				Err(e) => {
					drop(prev_read);
					kill_started(&pids);
					return Err(e.into());
				},
			}
		} else {
			None
		};

		match unsafe { unistd::fork() } {
			Ok(ForkResult::Child) => {
				let pipe_in = prev_read.as_ref().map(|fd| fd.as_raw_fd());
				let pipe_out = pipe.as_ref().map(|(_, write)| write.as_raw_fd());
				exec_stage(pipeline, i, pipe_in, pipe_out);
			},
			Ok(ForkResult::Parent { child }) => {
				pids.push(child);
				// The write end belongs to the child just forked; the read
				// end feeds the next stage. The previous read end is dropped
				// here, its consumer has been launched.
				prev_read = pipe.map(|(read, write)| {
					drop(write);
					read
				});
			},
			Err(e) => {
				drop(pipe);
				drop(prev_read);
				kill_started(&pids);
				return Err(e.into());
			},
		}
	}
	debug_assert!(prev_read.is_none());

	if pipeline.background {
		let stdout = io::stdout();
		notify_background(&mut stdout.lock(), &pids, unistd::getpid());
	} else {
		wait_all(&pids);
	}
	Ok(())
}

/// Background notification: one line per stage pairing the child pid with
/// the shell's own pid.
fn notify_background<W: Write>(out: &mut W, pids: &[Pid], shell: Pid) {
	for &pid in pids {
		let _ = writeln!(out, "[background] pid {} (shell pid {})", pid, shell);
	}
}

/// Child-side stage setup and exec. Never returns: either the process image
/// is replaced, or the failure is reported on stderr and the child leaves
/// through `_exit` so it cannot fall back into the shell's read-eval loop.
fn exec_stage(pipeline: &Pipeline, idx: usize, pipe_in: Option<RawFd>, pipe_out: Option<RawFd>) -> ! {
	let e = match run_stage(pipeline, idx, pipe_in, pipe_out) {
		Err(e) => e,
		Ok(never) => match never {},
	};
	let _ = writeln!(io::stderr(), "lsh: {}", e);
	unsafe { libc::_exit(e.status()) }
}

fn run_stage(pipeline: &Pipeline, idx: usize, pipe_in: Option<RawFd>, pipe_out: Option<RawFd>) -> Result<Infallible, ExecError> {
	// Stdin: the pipe from the previous stage, or the input redirection for
	// stage 0. An intermediate stage never sees a redirection path.
	if let Some(fd) = pipe_in {
		unistd::dup2(fd, libc::STDIN_FILENO)?;
	} else if let Some(path) = pipeline.stdin_redirect {
		let file = fs::File::open(OsStr::from_bytes(path))?;
		let fd = file.into_raw_fd();
		unistd::dup2(fd, libc::STDIN_FILENO)?;
		unistd::close(fd)?;
	}

	// Stdout: the pipe to the next stage, or the output redirection for the
	// last stage (create/truncate, 0666 before umask).
	if let Some(fd) = pipe_out {
		unistd::dup2(fd, libc::STDOUT_FILENO)?;
	} else if let Some(path) = pipeline.stdout_redirect {
		let file = fs::OpenOptions::new()
			.write(true)
			.create(true)
			.truncate(true)
			.open(OsStr::from_bytes(path))?;
		let fd = file.into_raw_fd();
		unistd::dup2(fd, libc::STDOUT_FILENO)?;
		unistd::close(fd)?;
	}

	let stage = &pipeline.stages[idx];
	if stage.argv.is_empty() {
		return Err(ExecError::EmptyStage);
	}
	let argv: Vec<CString> = stage.argv.iter()
		.map(|&word| CString::new(word.to_owned()))
		.collect::<Result<_, _>>()?;
	match unistd::execvp(&argv[0], &argv) {
		Err(Errno::ENOENT) => {
			Err(ExecError::NotFound(String::from_utf8_lossy(stage.argv[0]).into_owned()))
		},
		Err(e) => Err(e.into()),
		Ok(never) => match never {},
	}
}

/// Waits for each pid in launch order. `ECHILD` means the asynchronous
/// reaper got there first; that child is already gone, so move on.
fn wait_all(pids: &[Pid]) {
	for &pid in pids {
		loop {
			match wait::waitpid(pid, None) {
				Ok(_) => break,
				Err(Errno::EINTR) => continue,
				Err(Errno::ECHILD) => break,
				Err(e) => {
					let _ = writeln!(io::stderr(), "lsh: waitpid: {}", e);
					break;
				},
			}
		}
	}
}

/// Abort path for a pipeline that failed to launch completely: terminate the
/// stages already running and reap them, so a half-built pipeline leaves
/// neither runaway processes nor zombies behind.
fn kill_started(pids: &[Pid]) {
	for &pid in pids {
		let _ = signal::kill(pid, Signal::SIGKILL);
	}
	wait_all(pids);
}
