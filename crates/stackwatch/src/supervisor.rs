//! Lifecycle state machine over the launcher.
//!
//! `start()` wires three independent consumers onto the launcher's merged
//! stream — sink forwarding, startup detection, exit mapping — then parks in
//! a bounded wait for the started confirmation. The supervisor is
//! parameterized by the strategies that vary per product: how to assemble
//! the launch spec and how to read the console grammar.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use stackwatch_core::{
	ClassifiedEvent, Error, ExitOutcome, LaunchSpec, LineClassifier, Result, RunningState,
	ServerInfo, SupervisorConfig, TimeoutPolicy,
};

use crate::launcher::{ChildProcessLauncher, OutputEvent};
use crate::sink::OutputSink;

/// Assembles the fully resolved launch spec from installation and config
/// paths. Must fail with [`Error::Configuration`] before any spawn when a
/// required runtime or file is missing.
pub trait LaunchSpecProvider: Send + Sync {
	fn build(&self) -> Result<LaunchSpec>;
}

pub struct ProcessSupervisor {
	config: SupervisorConfig,
	provider: Arc<dyn LaunchSpecProvider>,
	classifier: Arc<dyn LineClassifier>,
	sink: Arc<dyn OutputSink>,
	state: Arc<Mutex<RunningState>>,
	info: Arc<Mutex<ServerInfo>>,
	launcher: Mutex<Option<Arc<ChildProcessLauncher>>>,
	tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ProcessSupervisor {
	pub fn new(
		config: SupervisorConfig,
		provider: Arc<dyn LaunchSpecProvider>,
		classifier: Arc<dyn LineClassifier>,
		sink: Arc<dyn OutputSink>,
	) -> Self {
		Self {
			config,
			provider,
			classifier,
			sink,
			state: Arc::new(Mutex::new(RunningState::Stopped)),
			info: Arc::new(Mutex::new(ServerInfo::default())),
			launcher: Mutex::new(None),
			tasks: Mutex::new(Vec::new()),
		}
	}

	pub fn state(&self) -> RunningState {
		*self.state.lock().expect("state lock")
	}

	/// True once the supervised process is confirmed or assumed started.
	pub fn started(&self) -> bool {
		self.state().is_started()
	}

	/// Facts recognized so far from the server's console output.
	pub fn server_info(&self) -> ServerInfo {
		self.info.lock().expect("info lock").clone()
	}

	/// Exit outcome of the current (or most recent) run, if it finished.
	pub fn last_exit(&self) -> Option<ExitOutcome> {
		let launcher = self.launcher.lock().expect("launcher slot").clone();
		launcher.and_then(|l| l.last_exit())
	}

	/// Launch the server and wait, bounded by the startup timeout, for it to
	/// announce readiness. Always stops any prior run first.
	///
	/// Returns the state reached: `ConfirmedStarted` when the console
	/// grammar recognized the confirmation in time, `AssumedStarted` when
	/// the window elapsed under [`TimeoutPolicy::AssumeStarted`], `Stopped`
	/// when the process exited cleanly before confirming. Spawn refusal,
	/// pre-spawn configuration problems, an error exit during startup, and
	/// a missed window under [`TimeoutPolicy::Fail`] are all errors.
	pub async fn start(&self) -> Result<RunningState> {
		self.stop().await;

		let spec = self.provider.build()?;
		self.set_state(RunningState::Starting);
		*self.info.lock().expect("info lock") = ServerInfo::default();

		let launcher = Arc::new(ChildProcessLauncher::new(
			self.config.term_grace(),
			self.config.kill_join(),
		));

		// all three consumers attach before the first line can arrive
		let rx_sink = launcher.subscribe();
		let rx_detect = launcher.subscribe();
		let rx_exit = launcher.subscribe();

		if let Err(e) = launcher.start(&spec) {
			self.set_state(RunningState::Stopped);
			return Err(e);
		}
		*self.launcher.lock().expect("launcher slot") = Some(Arc::clone(&launcher));

		let (confirm_tx, confirm_rx) = oneshot::channel();
		let handles = vec![
			tokio::spawn(forward_to_sink(rx_sink, Arc::clone(&self.sink))),
			tokio::spawn(detect_startup(
				rx_detect,
				Arc::clone(&self.classifier),
				Arc::clone(&self.state),
				Arc::clone(&self.info),
				confirm_tx,
			)),
			tokio::spawn(map_exit(rx_exit, Arc::clone(&self.state), spec.command_line())),
		];
		self.tasks.lock().expect("tasks lock").extend(handles);

		self.await_startup(&launcher, confirm_rx, &spec).await
	}

	async fn await_startup(
		&self,
		launcher: &Arc<ChildProcessLauncher>,
		confirm_rx: oneshot::Receiver<()>,
		spec: &LaunchSpec,
	) -> Result<RunningState> {
		let timeout = self.config.startup_timeout();
		tokio::select! {
			confirmed = confirm_rx => {
				if confirmed.is_ok() {
					tracing::info!("startup confirmed");
					self.set_state(RunningState::ConfirmedStarted);
					return Ok(RunningState::ConfirmedStarted);
				}
				// detection ended without confirming: the process exited
				self.startup_exit(launcher.wait_exited().await, spec)
			}
			outcome = launcher.wait_exited() => {
				self.startup_exit(outcome, spec)
			}
			_ = tokio::time::sleep(timeout) => {
				match self.config.on_timeout {
					TimeoutPolicy::AssumeStarted => {
						tracing::warn!(
							timeout_secs = self.config.startup_timeout_secs,
							"no startup confirmation within window, assuming started"
						);
						self.set_state(RunningState::AssumedStarted);
						Ok(RunningState::AssumedStarted)
					}
					TimeoutPolicy::Fail => {
						self.stop().await;
						Err(Error::StartupTimeout {
							seconds: self.config.startup_timeout_secs,
						})
					}
				}
			}
		}
	}

	/// The process terminated before it ever confirmed.
	fn startup_exit(&self, outcome: ExitOutcome, spec: &LaunchSpec) -> Result<RunningState> {
		self.set_state(RunningState::Stopped);
		if outcome.is_error {
			Err(Error::Runtime {
				code: outcome.exit_code,
				command: spec.command_line(),
			})
		} else {
			tracing::warn!(code = outcome.exit_code, "process exited before confirming startup");
			Ok(RunningState::Stopped)
		}
	}

	/// Block until the supervised process exits. An error exit code comes
	/// back as [`Error::Runtime`] with the offending command line.
	pub async fn wait(&self) -> Result<ExitOutcome> {
		let launcher = self.launcher.lock().expect("launcher slot").clone();
		let Some(launcher) = launcher else {
			return Err(Error::config("no supervised process is running"));
		};
		let outcome = launcher.wait_exited().await;
		if outcome.is_error {
			Err(Error::Runtime {
				code: outcome.exit_code,
				command: launcher.command_line(),
			})
		} else {
			Ok(outcome)
		}
	}

	/// Tear down the current run: stop the process, drop every consumer,
	/// reset to `Stopped`. Callable from any state, any number of times,
	/// and unblocks a `start()` parked in its startup wait.
	pub async fn stop(&self) {
		let launcher = self.launcher.lock().expect("launcher slot").take();
		if let Some(launcher) = launcher {
			self.set_state(RunningState::Stopping);
			launcher.stop().await;
		}

		// discard the subscription container; a new start builds fresh ones
		let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock().expect("tasks lock"));
		for task in tasks {
			task.abort();
		}

		self.set_state(RunningState::Stopped);
	}

	fn set_state(&self, next: RunningState) {
		*self.state.lock().expect("state lock") = next;
	}
}

impl Drop for ProcessSupervisor {
	fn drop(&mut self) {
		// dropping the launcher force-kills a still-running child
		for task in self.tasks.lock().expect("tasks lock").drain(..) {
			task.abort();
		}
	}
}

/// Pass-through consumer. The subscription queue is unbounded, so a sink
/// that writes slowly delays only this task and never costs a line. Display
/// problems must never abort supervision, so the sink API is infallible.
async fn forward_to_sink(mut rx: mpsc::UnboundedReceiver<OutputEvent>, sink: Arc<dyn OutputSink>) {
	while let Some(event) = rx.recv().await {
		match event {
			OutputEvent::Line(line) => sink.write_line(&line),
			OutputEvent::Exited(_) => return,
		}
	}
}

/// Startup-detection consumer. Classifies only until the confirmation
/// fires, then stops consuming entirely; later identical lines are never
/// re-classified.
async fn detect_startup(
	mut rx: mpsc::UnboundedReceiver<OutputEvent>,
	classifier: Arc<dyn LineClassifier>,
	state: Arc<Mutex<RunningState>>,
	info: Arc<Mutex<ServerInfo>>,
	confirm_tx: oneshot::Sender<()>,
) {
	let mut confirm_tx = Some(confirm_tx);
	while let Some(event) = rx.recv().await {
		match event {
			OutputEvent::Line(line) => {
				// classification only matters while starting up
				if *state.lock().expect("state lock") != RunningState::Starting {
					return;
				}
				// empty flush from the OS stream, not meaningful
				let Some(text) = line.text.as_deref() else { continue };
				let Some(event) = classifier.classify(text) else { continue };
				tracing::debug!(?event, "recognized console event");
				info.lock().expect("info lock").apply(&event);
				if matches!(event, ClassifiedEvent::Started { .. }) {
					if let Some(tx) = confirm_tx.take() {
						let _ = tx.send(());
					}
					return;
				}
			}
			OutputEvent::Exited(_) => return,
		}
	}
}

/// Completion consumer: records the terminal event in the supervisor state
/// and reports a mid-run death.
async fn map_exit(
	mut rx: mpsc::UnboundedReceiver<OutputEvent>,
	state: Arc<Mutex<RunningState>>,
	command: String,
) {
	while let Some(event) = rx.recv().await {
		match event {
			OutputEvent::Exited(outcome) => {
				if outcome.is_error {
					tracing::error!(
						code = outcome.exit_code,
						command = %command,
						"supervised process died"
					);
				} else {
					tracing::info!(code = outcome.exit_code, "supervised process exited");
				}
				// a natural exit leaves no teardown work, so the stopping
				// phase collapses into the stopped state in one step here;
				// an explicit stop() still passes through Stopping
				let mut state = state.lock().expect("state lock");
				if *state != RunningState::Stopping {
					*state = RunningState::Stopped;
				}
				return;
			}
			OutputEvent::Line(_) => {}
		}
	}
}
