//! Launch-argument assembly for the two supervised products.
//!
//! Each provider resolves its runtime and support files up front and fails
//! with a configuration error before anything is spawned; a missing runtime
//! is never allowed to surface as a spawn-time surprise. Resolution order
//! for every path is: explicit override on the builder, then the process
//! environment variable, then the location bundled under the installation
//! home.

use std::path::{Path, PathBuf};

use stackwatch_core::{Error, LaunchSpec, Result};

use crate::supervisor::LaunchSpecProvider;

const ES_MAIN_CLASS: &str = "org.elasticsearch.bootstrap.Elasticsearch";

/// JVM-hosted search server: `java -Delasticsearch -Des.path.home=<home>
/// <jvm options> -cp <libs> <main class> -E path.conf=<config>`.
#[derive(Debug, Clone)]
pub struct ElasticsearchLaunch {
	pub home: PathBuf,
	pub config_dir: Option<PathBuf>,
	pub java_home: Option<PathBuf>,
	pub extra_args: Vec<String>,
}

impl ElasticsearchLaunch {
	pub fn new(home: impl Into<PathBuf>) -> Self {
		Self {
			home: home.into(),
			config_dir: None,
			java_home: None,
			extra_args: Vec::new(),
		}
	}

	pub fn config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.config_dir = Some(dir.into());
		self
	}

	pub fn java_home(mut self, dir: impl Into<PathBuf>) -> Self {
		self.java_home = Some(dir.into());
		self
	}

	pub fn extra_args<I, S>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.extra_args.extend(args.into_iter().map(Into::into));
		self
	}

	fn resolve_config_dir(&self) -> PathBuf {
		self.config_dir
			.clone()
			.or_else(|| env_path("ES_CONF_DIR"))
			.unwrap_or_else(|| self.home.join("config"))
	}

	fn resolve_java(&self) -> Result<PathBuf> {
		let java_home = self
			.java_home
			.clone()
			.or_else(|| env_path("JAVA_HOME"))
			.or_else(|| {
				let bundled = self.home.join("jdk");
				bundled.is_dir().then_some(bundled)
			})
			.ok_or_else(|| {
				Error::config(format!(
					"cannot locate a Java runtime: set JAVA_HOME or bundle one under {}",
					self.home.join("jdk").display()
				))
			})?;

		let java = java_home.join("bin").join("java");
		if !java.is_file() {
			return Err(Error::config(format!(
				"Java runtime at {} has no bin/java",
				java_home.display()
			)));
		}
		Ok(java)
	}

	fn classpath(&self) -> Result<String> {
		let lib = self.home.join("lib");
		let entries = std::fs::read_dir(&lib).map_err(|e| {
			Error::config(format!("cannot read library directory {}: {}", lib.display(), e))
		})?;

		let mut jars: Vec<String> = entries
			.flatten()
			.map(|entry| entry.path())
			.filter(|path| path.extension().and_then(|e| e.to_str()) == Some("jar"))
			.map(|path| path.display().to_string())
			.collect();
		if jars.is_empty() {
			return Err(Error::config(format!(
				"no jar libraries under {}",
				lib.display()
			)));
		}
		jars.sort();
		Ok(jars.join(":"))
	}

	fn jvm_options(&self, config_dir: &Path) -> Result<Vec<String>> {
		let path = config_dir.join("jvm.options");
		let content = std::fs::read_to_string(&path).map_err(|e| {
			Error::config(format!("cannot read JVM options file {}: {}", path.display(), e))
		})?;
		Ok(content
			.lines()
			.map(str::trim)
			.filter(|line| !line.is_empty() && !line.starts_with('#'))
			.map(str::to_string)
			.collect())
	}
}

impl LaunchSpecProvider for ElasticsearchLaunch {
	fn build(&self) -> Result<LaunchSpec> {
		let config_dir = self.resolve_config_dir();
		let java = self.resolve_java()?;
		let classpath = self.classpath()?;
		let jvm_options = self.jvm_options(&config_dir)?;

		Ok(LaunchSpec::new(java)
			.arg("-Delasticsearch")
			.arg(format!("-Des.path.home={}", self.home.display()))
			.args(jvm_options)
			.arg("-cp")
			.arg(classpath)
			.arg(ES_MAIN_CLASS)
			.arg("-E")
			.arg(format!("path.conf={}", config_dir.display()))
			.args(self.extra_args.iter().cloned())
			.env("ES_HOME", self.home.display().to_string()))
	}
}

/// Node-hosted dashboard server: `node --no-warnings <entry script>
/// --config <config file>`.
#[derive(Debug, Clone)]
pub struct KibanaLaunch {
	pub home: PathBuf,
	pub config_file: Option<PathBuf>,
	pub node_home: Option<PathBuf>,
	pub extra_args: Vec<String>,
}

impl KibanaLaunch {
	pub fn new(home: impl Into<PathBuf>) -> Self {
		Self {
			home: home.into(),
			config_file: None,
			node_home: None,
			extra_args: Vec::new(),
		}
	}

	pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
		self.config_file = Some(path.into());
		self
	}

	pub fn node_home(mut self, dir: impl Into<PathBuf>) -> Self {
		self.node_home = Some(dir.into());
		self
	}

	pub fn extra_args<I, S>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.extra_args.extend(args.into_iter().map(Into::into));
		self
	}

	fn resolve_node(&self) -> Result<PathBuf> {
		let node_home = self
			.node_home
			.clone()
			.or_else(|| env_path("NODE_HOME"))
			.or_else(|| {
				let bundled = self.home.join("node");
				bundled.is_dir().then_some(bundled)
			})
			.ok_or_else(|| {
				Error::config(format!(
					"cannot locate a Node runtime: set NODE_HOME or bundle one under {}",
					self.home.join("node").display()
				))
			})?;

		let node = node_home.join("bin").join("node");
		if !node.is_file() {
			return Err(Error::config(format!(
				"Node runtime at {} has no bin/node",
				node_home.display()
			)));
		}
		Ok(node)
	}
}

impl LaunchSpecProvider for KibanaLaunch {
	fn build(&self) -> Result<LaunchSpec> {
		let node = self.resolve_node()?;

		let entry = self.home.join("src").join("cli");
		if !entry.exists() {
			return Err(Error::config(format!(
				"entry script missing at {}",
				entry.display()
			)));
		}

		let config_file = self
			.config_file
			.clone()
			.unwrap_or_else(|| self.home.join("config").join("kibana.yml"));
		if !config_file.is_file() {
			return Err(Error::config(format!(
				"config file missing at {}",
				config_file.display()
			)));
		}

		Ok(LaunchSpec::new(node)
			.arg("--no-warnings")
			.arg(entry.display().to_string())
			.arg("--config")
			.arg(config_file.display().to_string())
			.args(self.extra_args.iter().cloned()))
	}
}

fn env_path(name: &str) -> Option<PathBuf> {
	std::env::var_os(name)
		.filter(|v| !v.is_empty())
		.map(PathBuf::from)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};

	static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

	fn temp_dir(name: &str) -> PathBuf {
		let n = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
		let dir = std::env::temp_dir().join(format!("stackwatch-launch-{}-{}", n, name));
		let _ = std::fs::remove_dir_all(&dir);
		std::fs::create_dir_all(&dir).unwrap();
		dir
	}

	fn fake_es_home(name: &str) -> PathBuf {
		let home = temp_dir(name);
		std::fs::create_dir_all(home.join("lib")).unwrap();
		std::fs::write(home.join("lib/elasticsearch-5.6.3.jar"), b"").unwrap();
		std::fs::write(home.join("lib/lucene-core.jar"), b"").unwrap();
		std::fs::create_dir_all(home.join("config")).unwrap();
		std::fs::write(home.join("config/jvm.options"), "# heap\n-Xms1g\n\n-Xmx1g\n").unwrap();
		std::fs::create_dir_all(home.join("jdk/bin")).unwrap();
		std::fs::write(home.join("jdk/bin/java"), b"").unwrap();
		home
	}

	fn fake_kibana_home(name: &str) -> PathBuf {
		let home = temp_dir(name);
		std::fs::create_dir_all(home.join("src/cli")).unwrap();
		std::fs::create_dir_all(home.join("config")).unwrap();
		std::fs::write(home.join("config/kibana.yml"), "server.port: 5601\n").unwrap();
		std::fs::create_dir_all(home.join("node/bin")).unwrap();
		std::fs::write(home.join("node/bin/node"), b"").unwrap();
		home
	}

	#[test]
	fn es_spec_shape() {
		let home = fake_es_home("es-shape");
		let spec = ElasticsearchLaunch::new(&home)
			.java_home(home.join("jdk"))
			.config_dir(home.join("config"))
			.extra_args(["-E", "cluster.name=demo"])
			.build()
			.unwrap();

		assert_eq!(spec.program, home.join("jdk/bin/java"));
		assert_eq!(spec.args[0], "-Delasticsearch");
		assert_eq!(spec.args[1], format!("-Des.path.home={}", home.display()));
		// jvm.options lines, comments and blanks stripped
		assert!(spec.args.contains(&"-Xms1g".to_string()));
		assert!(spec.args.contains(&"-Xmx1g".to_string()));
		assert!(!spec.args.iter().any(|a| a.starts_with('#')));

		let cp_idx = spec.args.iter().position(|a| a == "-cp").unwrap();
		let cp = &spec.args[cp_idx + 1];
		assert!(cp.contains("elasticsearch-5.6.3.jar"));
		assert!(cp.contains("lucene-core.jar"));
		assert_eq!(spec.args[cp_idx + 2], ES_MAIN_CLASS);

		let e_idx = spec.args.iter().position(|a| a == "-E").unwrap();
		assert_eq!(
			spec.args[e_idx + 1],
			format!("path.conf={}", home.join("config").display())
		);
		assert_eq!(spec.args.last().unwrap(), "cluster.name=demo");
		assert_eq!(spec.env.get("ES_HOME").unwrap(), &home.display().to_string());

		let _ = std::fs::remove_dir_all(&home);
	}

	#[test]
	fn es_missing_libraries_is_configuration_error() {
		let home = fake_es_home("es-nolib");
		std::fs::remove_dir_all(home.join("lib")).unwrap();
		let err = ElasticsearchLaunch::new(&home)
			.java_home(home.join("jdk"))
			.build()
			.unwrap_err();
		assert!(matches!(err, Error::Configuration(_)), "got {:?}", err);
		let _ = std::fs::remove_dir_all(&home);
	}

	#[test]
	fn es_missing_jvm_options_is_configuration_error() {
		let home = fake_es_home("es-noopts");
		std::fs::remove_file(home.join("config/jvm.options")).unwrap();
		let err = ElasticsearchLaunch::new(&home)
			.java_home(home.join("jdk"))
			.config_dir(home.join("config"))
			.build()
			.unwrap_err();
		assert!(matches!(err, Error::Configuration(_)), "got {:?}", err);
		let _ = std::fs::remove_dir_all(&home);
	}

	#[test]
	fn es_java_home_without_binary_is_configuration_error() {
		let home = fake_es_home("es-badjava");
		std::fs::remove_file(home.join("jdk/bin/java")).unwrap();
		let err = ElasticsearchLaunch::new(&home)
			.java_home(home.join("jdk"))
			.build()
			.unwrap_err();
		match err {
			Error::Configuration(msg) => assert!(msg.contains("bin/java"), "msg: {}", msg),
			other => panic!("expected configuration error, got {:?}", other),
		}
		let _ = std::fs::remove_dir_all(&home);
	}

	#[test]
	fn es_bundled_jdk_fallback() {
		if std::env::var_os("JAVA_HOME").is_some() {
			// a real JAVA_HOME outranks the bundled fallback under test
			return;
		}
		let home = fake_es_home("es-bundled");
		// no override: the bundled jdk/ under home is picked up
		let spec = ElasticsearchLaunch::new(&home).build().unwrap();
		assert_eq!(spec.program, home.join("jdk/bin/java"));
		let _ = std::fs::remove_dir_all(&home);
	}

	#[test]
	fn kibana_spec_shape() {
		let home = fake_kibana_home("kb-shape");
		let spec = KibanaLaunch::new(&home)
			.node_home(home.join("node"))
			.build()
			.unwrap();

		assert_eq!(spec.program, home.join("node/bin/node"));
		assert_eq!(spec.args[0], "--no-warnings");
		assert_eq!(spec.args[1], home.join("src/cli").display().to_string());
		assert_eq!(spec.args[2], "--config");
		assert_eq!(spec.args[3], home.join("config/kibana.yml").display().to_string());
		let _ = std::fs::remove_dir_all(&home);
	}

	#[test]
	fn kibana_missing_entry_is_configuration_error() {
		let home = fake_kibana_home("kb-noentry");
		std::fs::remove_dir_all(home.join("src")).unwrap();
		let err = KibanaLaunch::new(&home)
			.node_home(home.join("node"))
			.build()
			.unwrap_err();
		assert!(matches!(err, Error::Configuration(_)), "got {:?}", err);
		let _ = std::fs::remove_dir_all(&home);
	}

	#[test]
	fn kibana_missing_config_is_configuration_error() {
		let home = fake_kibana_home("kb-noconf");
		std::fs::remove_file(home.join("config/kibana.yml")).unwrap();
		let err = KibanaLaunch::new(&home)
			.node_home(home.join("node"))
			.build()
			.unwrap_err();
		assert!(matches!(err, Error::Configuration(_)), "got {:?}", err);
		let _ = std::fs::remove_dir_all(&home);
	}
}
