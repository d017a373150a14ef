//! Child process launch and merged output capture.
//!
//! A [`ChildProcessLauncher`] owns exactly one OS process for its lifetime.
//! It is single-use: once started it never spawns again, and a second
//! `start` hands back another subscription to the same stream. Replace the
//! launcher, don't reuse it, for a subsequent run.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};

use stackwatch_core::{Error, ExitOutcome, LaunchSpec, OutputLine, Result};

/// One event on the merged output stream. `Line` events carry every line
/// of stdout and stderr as soon as its newline is observed; `Exited` is the
/// single terminal event, sent only after both pipes have drained.
#[derive(Debug, Clone)]
pub enum OutputEvent {
	Line(OutputLine),
	Exited(ExitOutcome),
}

type Subscribers = Mutex<Vec<mpsc::UnboundedSender<OutputEvent>>>;

struct Inner {
	started: bool,
	stopping: bool,
	pid: Option<u32>,
	command_line: Option<String>,
}

pub struct ChildProcessLauncher {
	term_grace: Duration,
	kill_join: Duration,
	subscribers: Arc<Subscribers>,
	exit_tx: Arc<watch::Sender<Option<ExitOutcome>>>,
	exit_rx: watch::Receiver<Option<ExitOutcome>>,
	inner: Arc<Mutex<Inner>>,
}

impl ChildProcessLauncher {
	/// `term_grace` bounds the cooperating-shutdown window after SIGTERM;
	/// `kill_join` bounds the join after the SIGKILL fallback.
	pub fn new(term_grace: Duration, kill_join: Duration) -> Self {
		let (exit_tx, exit_rx) = watch::channel(None);
		Self {
			term_grace,
			kill_join,
			subscribers: Arc::new(Mutex::new(Vec::new())),
			exit_tx: Arc::new(exit_tx),
			exit_rx,
			inner: Arc::new(Mutex::new(Inner {
				started: false,
				stopping: false,
				pid: None,
				command_line: None,
			})),
		}
	}

	/// Spawn the process and return a subscription to its merged output.
	///
	/// Mutually exclusive with itself: a second call while already started
	/// spawns nothing and returns another receiver for the existing stream.
	/// Each subscription is an unbounded queue, so a slow consumer buffers
	/// instead of missing lines. Subscribers see only events sent after they
	/// subscribe, so attach any additional consumers via
	/// [`subscribe`](Self::subscribe) before the first call.
	pub fn start(&self, spec: &LaunchSpec) -> Result<mpsc::UnboundedReceiver<OutputEvent>> {
		let mut inner = self.inner.lock().expect("launcher lock");
		if inner.started {
			return Ok(self.subscribe());
		}

		// subscribe before the pumps can run so the caller misses nothing
		let receiver = self.subscribe();

		let mut cmd = Command::new(&spec.program);
		cmd.args(&spec.args)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.process_group(0);
		for (key, val) in &spec.env {
			cmd.env(key, val);
		}

		let mut child = cmd.spawn().map_err(|e| Error::Launch {
			command: spec.command_line(),
			source: e,
		})?;

		inner.started = true;
		inner.pid = child.id();
		inner.command_line = Some(spec.command_line());
		tracing::info!(pid = ?inner.pid, command = %spec.command_line(), "spawned");

		let stdout = child.stdout.take().expect("stdout was piped");
		let stderr = child.stderr.take().expect("stderr was piped");

		let out_pump = tokio::spawn(pump_lines(stdout, false, Arc::clone(&self.subscribers)));
		let err_pump = tokio::spawn(pump_lines(stderr, true, Arc::clone(&self.subscribers)));

		let subscribers = Arc::clone(&self.subscribers);
		let exit_tx = Arc::clone(&self.exit_tx);
		let shared = Arc::clone(&self.inner);
		tokio::spawn(async move {
			let status = child.wait().await;

			// drain both pipes so every line precedes the terminal event
			let _ = out_pump.await;
			let _ = err_pump.await;

			let outcome = match status {
				Ok(status) => {
					let stopping = shared.lock().expect("launcher lock").stopping;
					if stopping && stop_accounts_for(&status) {
						ExitOutcome::cancelled()
					} else {
						ExitOutcome::from_code(exit_code_of(&status))
					}
				}
				Err(e) => {
					tracing::error!("wait on child failed: {}", e);
					ExitOutcome::from_code(-1)
				}
			};

			let _ = exit_tx.send(Some(outcome));
			fan_out(&subscribers, OutputEvent::Exited(outcome));
		});

		Ok(receiver)
	}

	/// Attach another consumer to the merged stream. The queue is unbounded:
	/// every event from this point on is delivered, however slowly it reads.
	pub fn subscribe(&self) -> mpsc::UnboundedReceiver<OutputEvent> {
		let (tx, rx) = mpsc::unbounded_channel();
		self.subscribers.lock().expect("subscriber lock").push(tx);
		rx
	}

	pub fn pid(&self) -> Option<u32> {
		self.inner.lock().expect("launcher lock").pid
	}

	/// Command line of the spawned process, for diagnostics.
	pub fn command_line(&self) -> String {
		self.inner
			.lock()
			.expect("launcher lock")
			.command_line
			.clone()
			.unwrap_or_default()
	}

	/// Exit outcome, readable any time after the stream terminated.
	pub fn last_exit(&self) -> Option<ExitOutcome> {
		*self.exit_rx.borrow()
	}

	pub fn is_running(&self) -> bool {
		self.inner.lock().expect("launcher lock").started && self.last_exit().is_none()
	}

	/// Block until the process has exited and return how.
	pub async fn wait_exited(&self) -> ExitOutcome {
		let mut rx = self.exit_rx.clone();
		loop {
			if let Some(outcome) = *rx.borrow() {
				return outcome;
			}
			if rx.changed().await.is_err() {
				// sender lives inside self, so this is unreachable while
				// the launcher exists; report a dead run if it happens
				return ExitOutcome::from_code(-1);
			}
		}
	}

	/// Shut the process down: SIGTERM to its process group, bounded by the
	/// grace window, then SIGKILL with a short join. No-op when nothing is
	/// running; callable any number of times.
	pub async fn stop(&self) {
		let pid = {
			let mut inner = self.inner.lock().expect("launcher lock");
			if !inner.started || self.exit_rx.borrow().is_some() {
				return;
			}
			inner.stopping = true;
			inner.pid
		};
		let Some(pid) = pid else { return };

		tracing::info!(pid, "stopping: sending SIGTERM");
		kill_group(pid, nix::sys::signal::Signal::SIGTERM);
		if self.exited_within(self.term_grace).await {
			return;
		}

		tracing::warn!(pid, "did not exit within grace window, sending SIGKILL");
		kill_group(pid, nix::sys::signal::Signal::SIGKILL);
		if !self.exited_within(self.kill_join).await {
			tracing::error!(pid, "process survived SIGKILL join window");
		}
	}

	async fn exited_within(&self, window: Duration) -> bool {
		let mut rx = self.exit_rx.clone();
		tokio::time::timeout(window, async move {
			loop {
				if rx.borrow().is_some() {
					return;
				}
				if rx.changed().await.is_err() {
					return;
				}
			}
		})
		.await
		.is_ok()
	}
}

impl Drop for ChildProcessLauncher {
	fn drop(&mut self) {
		let inner = self.inner.lock().expect("launcher lock");
		if inner.started && self.exit_rx.borrow().is_none() {
			if let Some(pid) = inner.pid {
				kill_group(pid, nix::sys::signal::Signal::SIGKILL);
			}
		}
	}
}

/// Deliver one event to every live subscriber. The lock is held across the
/// whole pass so all subscribers observe the same interleaving; unbounded
/// sends never block, and a dropped receiver is pruned here.
fn fan_out(subscribers: &Subscribers, event: OutputEvent) {
	let mut subs = subscribers.lock().expect("subscriber lock");
	subs.retain(|tx| tx.send(event.clone()).is_ok());
}

async fn pump_lines<R: AsyncRead + Unpin>(
	reader: R,
	is_error: bool,
	subscribers: Arc<Subscribers>,
) {
	let mut lines = BufReader::new(reader).lines();
	loop {
		match lines.next_line().await {
			Ok(Some(text)) => {
				let line = OutputLine { is_error, text: Some(text) };
				fan_out(&subscribers, OutputEvent::Line(line));
			}
			Ok(None) => break,
			Err(e) => {
				tracing::debug!(is_error, "output pump ended: {}", e);
				break;
			}
		}
	}
}

fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
	use std::os::unix::process::ExitStatusExt;
	match status.code() {
		Some(code) => code,
		None => status.signal().map(|s| 128 + s).unwrap_or(-1),
	}
}

/// Whether an exit during a stop is one our own signals account for: killed
/// by SIGTERM/SIGKILL, or a clean cooperating exit. A child that dies of an
/// unrelated error inside the stop window keeps its real exit code.
fn stop_accounts_for(status: &std::process::ExitStatus) -> bool {
	use std::os::unix::process::ExitStatusExt;
	use nix::sys::signal::Signal;
	match status.signal() {
		Some(sig) => sig == Signal::SIGTERM as i32 || sig == Signal::SIGKILL as i32,
		None => status.code() == Some(0),
	}
}

/// The child is spawned in its own process group, so its pid doubles as the
/// pgid and the whole tree gets the signal.
fn kill_group(pid: u32, signal: nix::sys::signal::Signal) {
	let _ = nix::sys::signal::killpg(nix::unistd::Pid::from_raw(pid as i32), signal);
}
