use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Exit code a process reports when it was shut down on purpose.
/// Treated as success, never as a runtime failure.
pub const EXIT_CANCELLED: i32 = 130;

/// Everything needed to spawn a server process: resolved binary, argument
/// vector, and environment additions. Built fresh for every start, never
/// reused across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchSpec {
	pub program: PathBuf,
	pub args: Vec<String>,
	#[serde(default)]
	pub env: HashMap<String, String>,
}

impl LaunchSpec {
	pub fn new(program: impl Into<PathBuf>) -> Self {
		Self {
			program: program.into(),
			args: Vec::new(),
			env: HashMap::new(),
		}
	}

	pub fn arg(mut self, arg: impl Into<String>) -> Self {
		self.args.push(arg.into());
		self
	}

	pub fn args<I, S>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.args.extend(args.into_iter().map(Into::into));
		self
	}

	pub fn env(mut self, key: impl Into<String>, val: impl Into<String>) -> Self {
		self.env.insert(key.into(), val.into());
		self
	}

	/// Rendering of the full command line for diagnostics and error reports.
	pub fn command_line(&self) -> String {
		let mut out = self.program.display().to_string();
		for arg in &self.args {
			out.push(' ');
			if arg.contains(' ') {
				out.push('"');
				out.push_str(arg);
				out.push('"');
			} else {
				out.push_str(arg);
			}
		}
		out
	}
}

/// One line of merged child output. `text` is `None` when the OS stream
/// produced an empty flush; consumers ignore those. A `None` text never
/// means end-of-stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
	pub is_error: bool,
	pub text: Option<String>,
}

impl OutputLine {
	pub fn stdout(text: impl Into<String>) -> Self {
		Self { is_error: false, text: Some(text.into()) }
	}

	pub fn stderr(text: impl Into<String>) -> Self {
		Self { is_error: true, text: Some(text.into()) }
	}
}

/// Supervisor lifecycle. Owned exclusively by the supervisor; the launcher
/// and classifiers never touch it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunningState {
	Stopped,
	Starting,
	AssumedStarted,
	ConfirmedStarted,
	Stopping,
}

impl RunningState {
	pub fn is_started(&self) -> bool {
		matches!(self, RunningState::AssumedStarted | RunningState::ConfirmedStarted)
	}
}

/// How a supervised process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitOutcome {
	pub exit_code: i32,
	pub is_error: bool,
}

impl ExitOutcome {
	pub fn from_code(exit_code: i32) -> Self {
		Self {
			exit_code,
			is_error: exit_code != 0 && exit_code != EXIT_CANCELLED,
		}
	}

	pub fn cancelled() -> Self {
		Self::from_code(EXIT_CANCELLED)
	}
}

/// A recognized signal extracted from one console line. Lines matching no
/// grammar produce no event and flow to the sink untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassifiedEvent {
	/// Version and (optionally) pid announced by the node at boot.
	NodeIdentity { version: String, pid: Option<u32> },
	/// The address the server bound, announced before it is ready.
	ListeningAddress { host: Option<String>, port: Option<u16> },
	/// The server is accepting requests. The free-text grammar carries the
	/// bound address in the same line; the bracketed grammar does not.
	Started { host: Option<String>, port: Option<u16> },
}

/// Facts about the supervised server accumulated from classified events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
	pub version: Option<String>,
	pub pid: Option<u32>,
	pub host: Option<String>,
	pub port: Option<u16>,
}

impl ServerInfo {
	pub fn apply(&mut self, event: &ClassifiedEvent) {
		match event {
			ClassifiedEvent::NodeIdentity { version, pid } => {
				self.version = Some(version.clone());
				if pid.is_some() {
					self.pid = *pid;
				}
			}
			ClassifiedEvent::ListeningAddress { host, port }
			| ClassifiedEvent::Started { host, port } => {
				if host.is_some() {
					self.host = host.clone();
				}
				if port.is_some() {
					self.port = *port;
				}
			}
		}
	}
}
