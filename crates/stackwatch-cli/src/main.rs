use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use owo_colors::OwoColorize;

use stackwatch::launch::{ElasticsearchLaunch, KibanaLaunch};
use stackwatch::sink::{ConsoleSink, NullSink, OutputSink};
use stackwatch::supervisor::{LaunchSpecProvider, ProcessSupervisor};
use stackwatch_core::classify::{BracketedLogClassifier, FreeTextClassifier, LineClassifier};
use stackwatch_core::{config, SupervisorConfig, TimeoutPolicy};

#[derive(Parser)]
#[command(name = "stackwatch", version, about = "Supervise Elasticsearch and Kibana server processes")]
struct Cli {
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Launch a server, wait for it to announce readiness, and supervise it
	/// until it exits or Ctrl-C
	Run {
		#[arg(value_enum)]
		product: Product,
		/// Installation home of the server
		#[arg(long)]
		home: PathBuf,
		/// Config directory (Elasticsearch) or config file (Kibana)
		#[arg(long)]
		config: Option<PathBuf>,
		/// Supervisor settings file (TOML)
		#[arg(long)]
		settings: Option<PathBuf>,
		/// Override the startup confirmation window
		#[arg(long)]
		timeout_secs: Option<u64>,
		/// Treat a missed startup confirmation as fatal
		#[arg(long)]
		fail_on_timeout: bool,
		/// Suppress server console output
		#[arg(long, short)]
		quiet: bool,
		/// Print the discovered server identity as JSON once started
		#[arg(long)]
		json: bool,
		/// Extra arguments appended to the server command line
		#[arg(last = true)]
		extra: Vec<String>,
	},
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Product {
	Elasticsearch,
	Kibana,
}

#[tokio::main]
async fn main() -> ExitCode {
	tracing_subscriber::fmt().init();
	let cli = Cli::parse();

	match run(cli).await {
		Ok(code) => code,
		Err(e) => {
			eprintln!("{} {}", "error:".red().bold(), e);
			ExitCode::FAILURE
		}
	}
}

async fn run(cli: Cli) -> stackwatch_core::Result<ExitCode> {
	let Commands::Run {
		product,
		home,
		config: config_path,
		settings,
		timeout_secs,
		fail_on_timeout,
		quiet,
		json,
		extra,
	} = cli.command;

	let mut sup_config = match settings {
		Some(path) => config::load_config(&path),
		None => SupervisorConfig::default(),
	};
	if let Some(secs) = timeout_secs {
		sup_config.startup_timeout_secs = secs;
	}
	if fail_on_timeout {
		sup_config.on_timeout = TimeoutPolicy::Fail;
	}

	let provider: Arc<dyn LaunchSpecProvider> = match product {
		Product::Elasticsearch => {
			let mut launch = ElasticsearchLaunch::new(&home).extra_args(extra);
			if let Some(dir) = config_path {
				launch = launch.config_dir(dir);
			}
			Arc::new(launch)
		}
		Product::Kibana => {
			let mut launch = KibanaLaunch::new(&home).extra_args(extra);
			if let Some(file) = config_path {
				launch = launch.config_file(file);
			}
			Arc::new(launch)
		}
	};
	let classifier: Arc<dyn LineClassifier> = match product {
		Product::Elasticsearch => Arc::new(BracketedLogClassifier),
		Product::Kibana => Arc::new(FreeTextClassifier),
	};
	let sink: Arc<dyn OutputSink> = if quiet { Arc::new(NullSink) } else { Arc::new(ConsoleSink) };

	let supervisor = ProcessSupervisor::new(sup_config, provider, classifier, sink);
	let state = supervisor.start().await?;
	tracing::info!(?state, "supervisor started");

	if json {
		let info = supervisor.server_info();
		println!("{}", serde_json::to_string_pretty(&info).unwrap_or_default());
	}

	let outcome = tokio::select! {
		outcome = supervisor.wait() => outcome?,
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("interrupt received, shutting down");
			supervisor.stop().await;
			return Ok(ExitCode::SUCCESS);
		}
	};

	Ok(ExitCode::from(outcome.exit_code.clamp(0, u8::MAX as i32) as u8))
}
