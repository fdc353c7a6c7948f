//! The module trait, registration metadata, and capability contracts.
//!
//! A module is a component the trellis host can build from configuration. In
//! addition to [`Module`], most modules implement some trait expected by
//! their host module in order to be useful; see the host module's
//! documentation to learn which. At a bare minimum, [`Module`] only provides
//! the module's ID and constructor.
//!
//! When a module is loaded by a host module, the following happens:
//!
//! 1. The registered constructor is called to get a new instance.
//! 2. The module's configuration is strictly decoded into that instance.
//! 3. If the module is a [`Provisioner`], `provision` is called.
//! 4. If the module is a [`Validator`], `validate` is called.
//! 5. The instance is handed to the host module, which typically narrows it
//!    to a more useful trait through the capability accessors, or to its
//!    concrete type through [`std::any::Any`] upcasting.
//! 6. When the module's containing [`Context`](crate::context::Context) is
//!    canceled, if it is a [`CleanerUpper`], `cleanup` is called.

use std::any::Any;
use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::value::RawValue;

use crate::error::StrictError;
use crate::id::ModuleId;
use crate::logging::WriterOpener;
use crate::strict;

/// A component that can be registered and built from configuration.
///
/// The capability accessors all default to `None`; a module opts in to a
/// lifecycle step by implementing the matching trait and overriding the
/// accessor. Absence of a capability is never an error: the engine silently
/// skips that step.
pub trait Module: Any + Send + Sync {
	/// Returns the module's registration metadata. Must have no side effects.
	fn module_info(&self) -> ModuleInfo;

	/// Narrows to the provisioning capability, if implemented.
	fn as_provisioner(&mut self) -> Option<&mut dyn Provisioner> {
		None
	}

	/// Narrows to the validation capability, if implemented.
	fn as_validator(&self) -> Option<&dyn Validator> {
		None
	}

	/// Narrows to the resource-release capability, if implemented.
	fn as_cleaner(&self) -> Option<&dyn CleanerUpper> {
		None
	}

	/// Narrows to the app capability, if implemented.
	fn as_app(&self) -> Option<&dyn App> {
		None
	}

	/// Narrows to the event-emission capability, if implemented.
	fn as_event_emitter(&self) -> Option<&dyn EventEmitter> {
		None
	}

	/// Narrows to the log-writer capability, if implemented. Modules in the
	/// `trellis.logging.writers` namespace must implement it.
	fn as_writer_opener(&self) -> Option<&dyn WriterOpener> {
		None
	}
}

impl fmt::Debug for dyn Module {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Module").field("id", &self.module_info().id).finish()
	}
}

/// Initialization that depends on other modules or the surrounding context.
///
/// `provision` may itself load nested modules through the context. Any
/// resource acquired here should be released in [`CleanerUpper::cleanup`].
pub trait Provisioner {
	/// Prepares the module for use.
	fn provision(&mut self, ctx: &mut crate::context::Context) -> anyhow::Result<()>;
}

/// Invariant checks that run after provisioning.
pub trait Validator {
	/// Checks the module's configuration; must have no side effects beyond
	/// reporting.
	fn validate(&self) -> anyhow::Result<()>;
}

/// Resource release at the end of the module's lifetime.
pub trait CleanerUpper {
	/// Releases the module's resources. Called at most once per instance,
	/// during context cancellation or lifecycle rollback; never retried.
	fn cleanup(&self) -> anyhow::Result<()>;
}

/// A long-running component that trellis manages, as opposed to a passive
/// configuration object. App modules have single-label IDs and live in the
/// configuration's app table.
pub trait App {
	/// Starts the app.
	fn start(&self) -> anyhow::Result<()>;

	/// Stops the app.
	fn stop(&self) -> anyhow::Result<()>;
}

/// An event published by or through the host.
#[derive(Clone, Debug)]
pub struct Event {
	/// Event name, lowercase and underscored like a module label.
	pub name: String,
	/// Arbitrary payload.
	pub data: serde_json::Value,
}

/// Cross-component event emission.
///
/// The core never imports an event subsystem; an app module that also
/// implements this trait is recorded as the configuration's emitter, and
/// other components reach it through the configuration object.
pub trait EventEmitter {
	/// Emits an event to whatever subscribers the implementation manages.
	fn emit(&self, event: Event);
}

/// Registration metadata for a module: its ID paired with a constructor for
/// fresh, unconfigured instances and a strict-decode hook for configured
/// ones.
#[derive(Clone)]
pub struct ModuleInfo {
	/// The module's full, namespaced ID. Must be unique.
	pub id: ModuleId,
	new: fn() -> Box<dyn Module>,
	decode: fn(&RawValue) -> Result<Box<dyn Module>, StrictError>,
}

impl ModuleInfo {
	/// Builds the registration metadata for module type `T` under `id`.
	///
	/// The constructor is `T::default()` and must have no side effects; any
	/// initialization belongs in a `provision` method (see [`Provisioner`]).
	pub fn of<T>(id: impl Into<ModuleId>) -> Self
	where
		T: Module + Default + DeserializeOwned,
	{
		Self {
			id: id.into(),
			new: || Box::new(T::default()),
			decode: |raw| Ok(Box::new(strict::from_raw_strict::<T>(raw)?)),
		}
	}

	/// Constructs a new, empty instance of the module's type.
	pub fn new_instance(&self) -> Box<dyn Module> {
		(self.new)()
	}

	/// Constructs an instance with its configuration strictly decoded from
	/// `raw`.
	pub(crate) fn decode_instance(&self, raw: &RawValue) -> Result<Box<dyn Module>, StrictError> {
		(self.decode)(raw)
	}
}

impl fmt::Display for ModuleInfo {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&self.id, f)
	}
}

impl fmt::Debug for ModuleInfo {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ModuleInfo").field("id", &self.id).finish()
	}
}

/// Link-time registration entry collected via `inventory`.
///
/// Module crates submit one of these per module; the host drains them into
/// the registry with [`register_provided_modules`](crate::registry::register_provided_modules)
/// at process start.
pub struct ModuleRegistration {
	info: fn() -> ModuleInfo,
}

impl ModuleRegistration {
	/// Creates a registration entry from a metadata producer.
	pub const fn new(info: fn() -> ModuleInfo) -> Self {
		Self { info }
	}

	/// Produces the metadata to register.
	pub fn info(&self) -> ModuleInfo {
		(self.info)()
	}
}

inventory::collect!(ModuleRegistration);

/// Returns a module's name (the last label of its ID), or the empty string
/// when the instance declares no usable ID.
pub fn module_name(module: &dyn Module) -> String {
	module.module_info().id.name().to_string()
}

/// Returns a module's full ID.
pub fn module_id(module: &dyn Module) -> ModuleId {
	module.module_info().id
}

#[cfg(test)]
mod tests {
	use serde::Deserialize;

	use super::*;

	#[derive(Debug, Default, Deserialize)]
	struct Probe {
		#[serde(default)]
		level: u8,
	}

	impl Module for Probe {
		fn module_info(&self) -> ModuleInfo {
			ModuleInfo::of::<Probe>("t_module.probe")
		}
	}

	#[test]
	fn test_new_instance_is_unconfigured() {
		let info = ModuleInfo::of::<Probe>("t_module.probe");
		let module = info.new_instance();
		let any: &dyn std::any::Any = module.as_ref();
		assert_eq!(any.downcast_ref::<Probe>().unwrap().level, 0);
	}

	#[test]
	fn test_decode_instance_is_strict() {
		let info = ModuleInfo::of::<Probe>("t_module.probe");

		let raw = serde_json::value::RawValue::from_string(r#"{"level": 3}"#.to_string()).unwrap();
		let module = info.decode_instance(&raw).unwrap();
		let any: &dyn std::any::Any = module.as_ref();
		assert_eq!(any.downcast_ref::<Probe>().unwrap().level, 3);

		let raw = serde_json::value::RawValue::from_string(r#"{"levle": 3}"#.to_string()).unwrap();
		assert!(info.decode_instance(&raw).is_err());
	}

	#[test]
	fn test_module_name_and_id() {
		let probe = Probe::default();
		assert_eq!(module_name(&probe), "probe");
		assert_eq!(module_id(&probe), ModuleId::new("t_module.probe"));
	}

	#[test]
	fn test_capabilities_default_to_none() {
		let mut probe = Probe::default();
		assert!(probe.as_validator().is_none());
		assert!(probe.as_cleaner().is_none());
		assert!(probe.as_app().is_none());
		assert!(probe.as_event_emitter().is_none());
		assert!(probe.as_writer_opener().is_none());
		assert!(probe.as_provisioner().is_none());
	}
}
