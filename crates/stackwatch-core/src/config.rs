use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// What the supervisor does when the startup window closes without a
/// confirmation from the server log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TimeoutPolicy {
	/// Leave the process running and report it as started. Some startups
	/// legitimately overrun the window (shard recovery, first-run
	/// optimization) and are not worth failing over.
	#[default]
	AssumeStarted,
	/// Treat the missed confirmation as fatal: stop the process and fail.
	Fail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
	#[serde(default = "default_startup_timeout")]
	pub startup_timeout_secs: u64,
	#[serde(default)]
	pub on_timeout: TimeoutPolicy,
	#[serde(default = "default_term_grace")]
	pub term_grace_secs: u64,
	#[serde(default = "default_kill_join")]
	pub kill_join_secs: u64,
}

impl Default for SupervisorConfig {
	fn default() -> Self {
		Self {
			startup_timeout_secs: default_startup_timeout(),
			on_timeout: TimeoutPolicy::default(),
			term_grace_secs: default_term_grace(),
			kill_join_secs: default_kill_join(),
		}
	}
}

fn default_startup_timeout() -> u64 {
	120
}
fn default_term_grace() -> u64 {
	300
}
fn default_kill_join() -> u64 {
	2
}

impl SupervisorConfig {
	pub fn startup_timeout(&self) -> Duration {
		Duration::from_secs(self.startup_timeout_secs)
	}

	pub fn term_grace(&self) -> Duration {
		Duration::from_secs(self.term_grace_secs)
	}

	pub fn kill_join(&self) -> Duration {
		Duration::from_secs(self.kill_join_secs)
	}
}

/// Load supervisor settings from a TOML file, falling back to defaults on
/// any read or parse problem (with a warning, never an error).
pub fn load_config(path: &Path) -> SupervisorConfig {
	if path.exists() {
		match std::fs::read_to_string(path) {
			Ok(content) => match toml::from_str(&content) {
				Ok(config) => return config,
				Err(e) => eprintln!("warning: failed to parse {}: {}", path.display(), e),
			},
			Err(e) => eprintln!("warning: failed to read {}: {}", path.display(), e),
		}
	}
	SupervisorConfig::default()
}
