use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy for launching and supervising a server process.
///
/// `Configuration` always surfaces before any OS process is spawned;
/// `Launch` is the OS refusing the spawn itself; `Runtime` is the process
/// dying with a non-success exit code after it ran.
#[derive(Debug, Error)]
pub enum Error {
	#[error("configuration error: {0}")]
	Configuration(String),

	#[error("failed to launch `{command}`: {source}")]
	Launch {
		command: String,
		#[source]
		source: std::io::Error,
	},

	#[error("process exited with code {code}: `{command}`")]
	Runtime { code: i32, command: String },

	#[error("no startup confirmation within {seconds}s")]
	StartupTimeout { seconds: u64 },
}

impl Error {
	pub fn config(msg: impl Into<String>) -> Self {
		Error::Configuration(msg.into())
	}
}
