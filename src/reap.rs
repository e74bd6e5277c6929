use std::io;
use std::sync::mpsc;
use std::thread;

use nix::errno::Errno;
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use signal_hook::consts::SIGCHLD;
use signal_hook::iterator::Signals;

/// Installs asynchronous child reaping for the life of the process: a
/// watcher thread blocks on SIGCHLD delivery and forwards each one over a
/// channel to a reaper thread, which collects whatever children have
/// terminated. No signal handler runs any shell code.
///
/// Foreground waits race with this drain by design; `exec::wait_all` treats
/// `ECHILD` as "already reaped here".
pub fn install() -> io::Result<()> {
	let mut signals = Signals::new([SIGCHLD])?;
	let (tx, rx) = mpsc::channel::<()>();

	thread::spawn(move || {
		for _ in signals.forever() {
			if tx.send(()).is_err() {
				break;
			}
		}
	});
	thread::spawn(move || {
		for () in rx {
			drain();
		}
	});
	Ok(())
}

/// Non-blockingly reaps every terminated child, whichever pipeline it came
/// from, until none are left waiting.
pub fn drain() {
	loop {
		match wait::waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
			Ok(WaitStatus::StillAlive) => break,
			Ok(_) => continue,
			Err(Errno::EINTR) => continue,
			// ECHILD: no children at all.
			Err(_) => break,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use nix::sys::signal;
	use nix::unistd::{self, ForkResult};
	use std::thread::sleep;
	use std::time::Duration;

	#[test]
	fn drain_reaps_exited_children() {
		let pid = match unsafe { unistd::fork() }.unwrap() {
			ForkResult::Child => unsafe { libc::_exit(0) },
			ForkResult::Parent { child } => child,
		};

		// Give the child time to terminate, then drain and confirm its
		// process-table entry is gone.
		sleep(Duration::from_millis(200));
		drain();
		match wait::waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
			Err(Errno::ECHILD) => {},
			other => panic!("child {} not reaped: {:?}", pid, other),
		}
	}

	#[test]
	fn install_reaps_asynchronously_on_sigchld() {
		install().unwrap();
		let pid = match unsafe { unistd::fork() }.unwrap() {
			ForkResult::Child => unsafe { libc::_exit(0) },
			ForkResult::Parent { child } => child,
		};

		// No manual drain here: the SIGCHLD from the exiting child has to
		// travel through the watcher thread and the channel to the reaper.
		// Poll with signal 0, which keeps succeeding while the zombie still
		// occupies its process-table slot and fails with ESRCH once reaped.
		let mut reaped = false;
		for _ in 0 .. 40 {
			sleep(Duration::from_millis(50));
			if signal::kill(pid, None) == Err(Errno::ESRCH) {
				reaped = true;
				break;
			}
		}
		assert!(reaped, "child {} still unreaped after 2s", pid);
		assert_eq!(wait::waitpid(pid, Some(WaitPidFlag::WNOHANG)), Err(Errno::ECHILD));
	}
}
