//! Log writer modules and the logging section of the configuration.
//!
//! Logging participates in the module system as a consumer: the writers that
//! log output goes to are modules in the `trellis.logging.writers`
//! namespace, named inline under the `output` key. This module registers the
//! three built-in writers and provisions the `logging` section of a
//! configuration into opened writers; wiring those writers into a
//! subscriber is the host's job.

use std::fmt;
use std::io::{self, Write};

use anyhow::{Context as _, bail};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::value::RawValue;
use tracing::debug;

use crate::context::Context;
use crate::load::{Descriptor, RawModuleField};
use crate::module::{Module, ModuleInfo, ModuleRegistration, Provisioner};

/// Opens the byte stream a log writes to.
///
/// Modules in the `trellis.logging.writers` namespace implement this and
/// surface it through [`Module::as_writer_opener`].
pub trait WriterOpener {
	/// A stable key identifying the destination, so equivalent writer
	/// configs can be recognized across loads.
	fn writer_key(&self) -> String;

	/// Opens the destination.
	fn open_writer(&self) -> io::Result<Box<dyn Write + Send>>;
}

/// Writes logs to standard output.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StdoutWriter {}

impl Module for StdoutWriter {
	fn module_info(&self) -> ModuleInfo {
		ModuleInfo::of::<StdoutWriter>("trellis.logging.writers.stdout")
	}

	fn as_writer_opener(&self) -> Option<&dyn WriterOpener> {
		Some(self)
	}
}

impl WriterOpener for StdoutWriter {
	fn writer_key(&self) -> String {
		"std:out".to_string()
	}

	fn open_writer(&self) -> io::Result<Box<dyn Write + Send>> {
		Ok(Box::new(io::stdout()))
	}
}

/// Writes logs to standard error.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StderrWriter {}

impl Module for StderrWriter {
	fn module_info(&self) -> ModuleInfo {
		ModuleInfo::of::<StderrWriter>("trellis.logging.writers.stderr")
	}

	fn as_writer_opener(&self) -> Option<&dyn WriterOpener> {
		Some(self)
	}
}

impl WriterOpener for StderrWriter {
	fn writer_key(&self) -> String {
		"std:err".to_string()
	}

	fn open_writer(&self) -> io::Result<Box<dyn Write + Send>> {
		Ok(Box::new(io::stderr()))
	}
}

/// Discards all log output.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DiscardWriter {}

impl Module for DiscardWriter {
	fn module_info(&self) -> ModuleInfo {
		ModuleInfo::of::<DiscardWriter>("trellis.logging.writers.discard")
	}

	fn as_writer_opener(&self) -> Option<&dyn WriterOpener> {
		Some(self)
	}
}

impl WriterOpener for DiscardWriter {
	fn writer_key(&self) -> String {
		"discard".to_string()
	}

	fn open_writer(&self) -> io::Result<Box<dyn Write + Send>> {
		Ok(Box::new(io::sink()))
	}
}

inventory::submit! { ModuleRegistration::new(|| StdoutWriter::default().module_info()) }
inventory::submit! { ModuleRegistration::new(|| StderrWriter::default().module_info()) }
inventory::submit! { ModuleRegistration::new(|| DiscardWriter::default().module_info()) }

/// The sink log: where unstructured output from dependencies not built for
/// trellis ends up.
#[derive(Debug, Default, Deserialize)]
pub struct SinkLog {
	/// The writer module for the sink, named inline under `output`.
	#[serde(default)]
	pub writer: Option<Box<RawValue>>,
}

/// A named log and the entries it accepts.
///
/// A log accepts all entries by default. `include` and `exclude` filter by
/// logger name; a logger's name is its module's name, so `endpoint.handlers`
/// matches everything those handler modules emit. When both are populated
/// they must be mutually exclusive.
#[derive(Debug, Default, Deserialize)]
pub struct CustomLog {
	/// The writer module for this log, named inline under `output`.
	#[serde(default)]
	pub writer: Option<Box<RawValue>>,

	/// Minimum level accepted, e.g. `info`.
	#[serde(default)]
	pub level: Option<String>,

	/// Logger names to emit in this log.
	#[serde(default)]
	pub include: Vec<String>,

	/// Logger names to skip in this log.
	#[serde(default)]
	pub exclude: Vec<String>,
}

/// A provisioned log: the decoded parameters plus its opened writer.
pub struct OpenedLog {
	/// The log's name (`sink` for the sink log).
	pub name: String,
	/// Minimum accepted level, if configured.
	pub level: Option<String>,
	/// Logger-name include filter.
	pub include: Vec<String>,
	/// Logger-name exclude filter.
	pub exclude: Vec<String>,
	/// The writer module's stable destination key.
	pub writer_key: String,
	/// The opened destination.
	pub writer: Box<dyn Write + Send>,
}

impl fmt::Debug for OpenedLog {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("OpenedLog")
			.field("name", &self.name)
			.field("level", &self.level)
			.field("writer_key", &self.writer_key)
			.finish()
	}
}

/// The `logging` section of the configuration.
///
/// The default log can be customized by defining a log called `default`;
/// further logs filter what kinds of entries they accept. A log with no
/// writer goes to standard error.
#[derive(Debug, Default, Deserialize)]
pub struct Logging {
	/// The destination for unstructured dependency output.
	#[serde(default)]
	pub sink: Option<SinkLog>,

	/// Logs keyed by an arbitrary name of the operator's choosing.
	#[serde(default)]
	pub logs: IndexMap<String, CustomLog>,

	#[serde(skip)]
	opened: Vec<OpenedLog>,
}

impl Logging {
	/// Takes the logs opened during provisioning, for the host to wire into
	/// its subscriber.
	pub fn take_opened(&mut self) -> Vec<OpenedLog> {
		std::mem::take(&mut self.opened)
	}
}

/// Loads a log's writer module and opens its destination. A log with no
/// writer configured opens standard error.
fn open_writer(
	ctx: &mut Context,
	raw: Option<Box<RawValue>>,
) -> anyhow::Result<(String, Box<dyn Write + Send>)> {
	let fallback = StderrWriter {};
	let opener_module;
	let opener: &dyn WriterOpener = match raw {
		Some(raw) => {
			let desc = Descriptor::parse("namespace=trellis.logging.writers inline_key=output");
			opener_module = ctx.load_module(RawModuleField::Single(raw), &desc)?.into_single()?;
			opener_module
				.as_writer_opener()
				.context("writer module does not implement WriterOpener")?
		}
		None => &fallback,
	};

	let writer = opener
		.open_writer()
		.with_context(|| format!("opening log writer '{}'", opener.writer_key()))?;
	Ok((opener.writer_key(), writer))
}

impl Provisioner for Logging {
	fn provision(&mut self, ctx: &mut Context) -> anyhow::Result<()> {
		if let Some(mut sink) = self.sink.take() {
			let (writer_key, writer) = open_writer(ctx, sink.writer.take())?;
			debug!(writer = %writer_key, "opened sink log");
			self.opened.push(OpenedLog {
				name: "sink".to_string(),
				level: None,
				include: Vec::new(),
				exclude: Vec::new(),
				writer_key,
				writer,
			});
		}

		let logs = std::mem::take(&mut self.logs);
		for (name, mut log) in logs {
			for included in &log.include {
				if log.exclude.contains(included) {
					bail!("log '{name}': logger name '{included}' is both included and excluded");
				}
			}

			let (writer_key, writer) =
				open_writer(ctx, log.writer.take()).with_context(|| format!("log '{name}'"))?;
			debug!(log = %name, writer = %writer_key, "opened log");
			self.opened.push(OpenedLog {
				name,
				level: log.level,
				include: log.include,
				exclude: log.exclude,
				writer_key,
				writer,
			});
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::ConfigHandle;
	use crate::registry::register_provided_modules;
	use crate::strict::from_str_strict;

	#[test]
	fn test_writer_keys() {
		assert_eq!(StdoutWriter {}.writer_key(), "std:out");
		assert_eq!(StderrWriter {}.writer_key(), "std:err");
		assert_eq!(DiscardWriter {}.writer_key(), "discard");
	}

	#[test]
	fn test_writers_expose_opener_capability() {
		let writer = DiscardWriter {};
		let module: &dyn Module = &writer;
		assert!(module.as_writer_opener().is_some());
	}

	#[test]
	fn test_provision_opens_configured_writers() {
		register_provided_modules();

		let mut logging: Logging = from_str_strict(
			r#"{
				"sink": {"writer": {"output": "discard"}},
				"logs": {
					"default": {"writer": {"output": "discard"}, "level": "info"},
					"access": {"writer": {"output": "stderr"}, "include": ["endpoint.handlers"]}
				}
			}"#,
		)
		.unwrap();

		let mut ctx = Context::new(ConfigHandle::new());
		logging.provision(&mut ctx).unwrap();

		let opened = logging.take_opened();
		let summary: Vec<(&str, &str)> = opened
			.iter()
			.map(|log| (log.name.as_str(), log.writer_key.as_str()))
			.collect();
		assert_eq!(summary, [("sink", "discard"), ("default", "discard"), ("access", "std:err")]);

		// The writer instances belong to the load's context.
		assert_eq!(ctx.instances_of("trellis.logging.writers.discard").len(), 2);
		assert_eq!(ctx.instances_of("trellis.logging.writers.stderr").len(), 1);
		ctx.cancel();
	}

	#[test]
	fn test_provision_defaults_to_stderr() {
		let mut logging: Logging =
			from_str_strict(r#"{"logs": {"default": {}}}"#).unwrap();

		let mut ctx = Context::new(ConfigHandle::new());
		logging.provision(&mut ctx).unwrap();

		let opened = logging.take_opened();
		assert_eq!(opened.len(), 1);
		assert_eq!(opened[0].writer_key, "std:err");
	}

	#[test]
	fn test_provision_rejects_contradictory_filters() {
		register_provided_modules();

		let mut logging: Logging = from_str_strict(
			r#"{"logs": {"weird": {"include": ["a.b"], "exclude": ["a.b"]}}}"#,
		)
		.unwrap();

		let mut ctx = Context::new(ConfigHandle::new());
		let err = logging.provision(&mut ctx).unwrap_err();
		assert!(format!("{err:#}").contains("both included and excluded"), "{err:#}");
	}

	#[test]
	fn test_unknown_writer_module() {
		register_provided_modules();

		let mut logging: Logging = from_str_strict(
			r#"{"logs": {"default": {"writer": {"output": "syslog"}}}}"#,
		)
		.unwrap();

		let mut ctx = Context::new(ConfigHandle::new());
		let err = logging.provision(&mut ctx).unwrap_err();
		assert!(
			format!("{err:#}").contains("module not registered: trellis.logging.writers.syslog"),
			"{err:#}"
		);
	}

	#[test]
	fn test_writer_config_is_strict() {
		register_provided_modules();

		let mut logging: Logging = from_str_strict(
			r#"{"logs": {"default": {"writer": {"output": "discard", "color": true}}}}"#,
		)
		.unwrap();

		let mut ctx = Context::new(ConfigHandle::new());
		let err = logging.provision(&mut ctx).unwrap_err();
		assert!(format!("{err:#}").contains("unknown field"), "{err:#}");
	}
}
