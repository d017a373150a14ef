//! Output sinks: where merged console lines go for display.
//!
//! Sinks are deliberately infallible; a broken terminal must never take the
//! supervised process down with it.

use std::sync::Mutex;

use owo_colors::OwoColorize;

use stackwatch_core::classify::{BracketedLine, Severity};
use stackwatch_core::OutputLine;

pub trait OutputSink: Send + Sync {
	fn write_line(&self, line: &OutputLine);
}

/// Prints lines to the terminal, colored by the severity parsed from the
/// bracketed grammar when present. stderr lines go to stderr.
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
	fn write_line(&self, line: &OutputLine) {
		let Some(text) = line.text.as_deref() else { return };
		let severity = BracketedLine::parse(text)
			.map(|parsed| parsed.severity())
			.unwrap_or(Severity::Info);

		if line.is_error {
			match severity {
				Severity::Error => eprintln!("{}", text.red()),
				Severity::Warning => eprintln!("{}", text.yellow()),
				Severity::Debug => eprintln!("{}", text.dimmed()),
				Severity::Info => eprintln!("{}", text),
			}
		} else {
			match severity {
				Severity::Error => println!("{}", text.red()),
				Severity::Warning => println!("{}", text.yellow()),
				Severity::Debug => println!("{}", text.dimmed()),
				Severity::Info => println!("{}", text),
			}
		}
	}
}

/// Discards everything.
pub struct NullSink;

impl OutputSink for NullSink {
	fn write_line(&self, _line: &OutputLine) {}
}

/// Buffers every line; used by tests to assert pass-through behavior.
#[derive(Default)]
pub struct MemorySink {
	lines: Mutex<Vec<OutputLine>>,
}

impl MemorySink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn snapshot(&self) -> Vec<OutputLine> {
		self.lines.lock().expect("sink lock").clone()
	}
}

impl OutputSink for MemorySink {
	fn write_line(&self, line: &OutputLine) {
		self.lines.lock().expect("sink lock").push(line.clone());
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn memory_sink_buffers_lines() {
		let sink = MemorySink::new();
		sink.write_line(&OutputLine::stdout("a"));
		sink.write_line(&OutputLine::stderr("b"));
		let lines = sink.snapshot();
		assert_eq!(lines.len(), 2);
		assert!(!lines[0].is_error);
		assert!(lines[1].is_error);
	}

	#[test]
	fn null_text_is_ignored_by_console_sink() {
		// a None text is a benign flush signal, never printed or an error
		ConsoleSink.write_line(&OutputLine { is_error: false, text: None });
	}
}
