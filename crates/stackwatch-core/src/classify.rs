//! Console-line recognition.
//!
//! Two product grammars turn raw log lines into [`ClassifiedEvent`]s: the
//! bracketed grammar of the JVM server log and the free-text grammar of the
//! Node server. Both are pure and keep no state across lines, so they are
//! safe to run at full log rate on whatever task delivers the output.

use regex::Regex;
use std::sync::LazyLock;

use crate::types::ClassifiedEvent;

/// One raw line in, at most one recognized event out.
pub trait LineClassifier: Send + Sync {
	fn classify(&self, line: &str) -> Option<ClassifiedEvent>;
}

static BRACKETED: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^\[([^\]]+)\]\[([^\]]+)\]\[([^\]]+)\]\s*\[([^\]]+)\]\s?(.*)$")
		.expect("bracketed line regex")
});

static NODE_IDENTITY: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"version\[([^\[\]]+)\](?:.*?pid\[(\d+)\])?").expect("node identity regex")
});

static PUBLISH_ADDRESS: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"publish_address\s*\{([^}]+)\}").expect("publish address regex"));

static SERVER_RUNNING: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"Server running at https?://([^:/\s]+)(?::(\d*))?").expect("server running regex")
});

/// Display severity derived from the bracketed grammar's level field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
	Error,
	Warning,
	Debug,
	Info,
}

impl Severity {
	pub fn from_level(level: &str) -> Self {
		match level.trim() {
			"ERROR" | "FATAL" => Severity::Error,
			"WARN" => Severity::Warning,
			"DEBUG" | "TRACE" => Severity::Debug,
			_ => Severity::Info,
		}
	}
}

/// A bracketed log line split into its fields, for display purposes.
///
/// Format: `[date][LEVEL ][section] [node] message`, with level and section
/// padded by the producer. Fields come back trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BracketedLine {
	pub date: String,
	pub level: String,
	pub section: String,
	pub node: String,
	pub message: String,
}

impl BracketedLine {
	pub fn parse(line: &str) -> Option<Self> {
		let caps = BRACKETED.captures(line)?;
		Some(Self {
			date: caps[1].trim().to_string(),
			level: caps[2].trim().to_string(),
			section: caps[3].trim().to_string(),
			node: caps[4].trim().to_string(),
			message: caps[5].trim().to_string(),
		})
	}

	pub fn severity(&self) -> Severity {
		Severity::from_level(&self.level)
	}
}

/// Grammar of the JVM server: bracketed header, then one of three message
/// sub-patterns checked in priority order. First match wins; anything else
/// is unrecognized.
#[derive(Debug, Clone, Copy, Default)]
pub struct BracketedLogClassifier;

impl LineClassifier for BracketedLogClassifier {
	fn classify(&self, line: &str) -> Option<ClassifiedEvent> {
		let parsed = BracketedLine::parse(line)?;
		let message = parsed.message.as_str();

		if let Some(caps) = NODE_IDENTITY.captures(message) {
			let version = caps[1].to_string();
			let pid = caps.get(2).and_then(|m| m.as_str().parse().ok());
			return Some(ClassifiedEvent::NodeIdentity { version, pid });
		}

		if let Some(caps) = PUBLISH_ADDRESS.captures(message) {
			let (host, port) = parse_publish_address(&caps[1]);
			return Some(ClassifiedEvent::ListeningAddress { host, port });
		}

		if message == "started" {
			return Some(ClassifiedEvent::Started { host: None, port: None });
		}

		None
	}
}

/// Grammar of the Node server: a single `Server running at <url>` line is
/// simultaneously the started confirmation and the address announcement.
#[derive(Debug, Clone, Copy, Default)]
pub struct FreeTextClassifier;

impl LineClassifier for FreeTextClassifier {
	fn classify(&self, line: &str) -> Option<ClassifiedEvent> {
		let caps = SERVER_RUNNING.captures(line)?;
		let host = Some(caps[1].to_string());
		let port = caps.get(2).and_then(|m| m.as_str().parse().ok());
		Some(ClassifiedEvent::Started { host, port })
	}
}

/// Split an announced bind address into host and port. Handles both the
/// plain `127.0.0.1:9200` form and the wrapped `inet[/127.0.0.1:9200]` one.
fn parse_publish_address(addr: &str) -> (Option<String>, Option<u16>) {
	let addr = addr.trim().trim_end_matches(']');
	let addr = addr.rsplit('/').next().unwrap_or(addr);
	match addr.rsplit_once(':') {
		Some((host, port)) => {
			let host = if host.is_empty() { None } else { Some(host.to_string()) };
			(host, port.parse().ok())
		}
		None => {
			let host = if addr.is_empty() { None } else { Some(addr.to_string()) };
			(host, None)
		}
	}
}
