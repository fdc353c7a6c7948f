//! The top of the trellis configuration structure.
//!
//! Many parts of the configuration are extensible through modules: fields
//! holding raw JSON are fulfilled by whatever modules are registered in the
//! field's namespace. Whenever a module is used, its name is given either
//! inline as part of the module's object, or as the key to the module's
//! value.
//!
//! [`Config`] is the decoded document. [`ConfigHandle`] is the runtime
//! object that outlives decoding: the table of app modules and the
//! configuration's event emitter, shared by every [`Context`] of the load.

use std::sync::{Arc, Mutex, RwLock};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::context::Context;
use crate::error::LoadError;
use crate::id::ModuleId;
use crate::load::{Descriptor, ModuleMap, RawModuleField};
use crate::logging::Logging;
use crate::module::{Module, Provisioner};
use crate::strict;

/// One entry in the configuration's app table.
///
/// App modules are published here as soon as they are constructed, before
/// provisioning completes, so modules provisioned later in the same load can
/// look them up.
#[derive(Clone)]
pub enum AppSlot {
	/// The app is constructed but not yet provisioned.
	Pending,
	/// The app finished its lifecycle and is usable.
	Ready(Arc<dyn Module>),
	/// The app's provisioning or validation failed with this message.
	Failed(String),
}

impl AppSlot {
	/// Returns the app instance if it is ready.
	pub fn instance(&self) -> Option<Arc<dyn Module>> {
		match self {
			AppSlot::Ready(module) => Some(module.clone()),
			_ => None,
		}
	}
}

/// The runtime configuration object contexts back-reference.
#[derive(Default)]
pub struct ConfigHandle {
	apps: RwLock<IndexMap<String, AppSlot>>,
	event_emitter: Mutex<Option<Arc<dyn Module>>>,
}

impl ConfigHandle {
	/// Creates an empty, shareable configuration object.
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Looks up an app slot by name.
	pub fn app(&self, name: &str) -> Option<AppSlot> {
		self.apps.read().expect("app table poisoned").get(name).cloned()
	}

	/// Returns the names of every app in the table, in registration order.
	pub fn app_names(&self) -> Vec<String> {
		self.apps.read().expect("app table poisoned").keys().cloned().collect()
	}

	/// Returns the configuration's event emitter, if one was loaded.
	pub fn event_emitter(&self) -> Option<Arc<dyn Module>> {
		self.event_emitter.lock().expect("event emitter poisoned").clone()
	}

	pub(crate) fn register_pending_app(&self, id: &str) {
		self.apps
			.write()
			.expect("app table poisoned")
			.insert(id.to_string(), AppSlot::Pending);
	}

	pub(crate) fn fail_app(&self, id: &str, message: &str) {
		self.apps
			.write()
			.expect("app table poisoned")
			.insert(id.to_string(), AppSlot::Failed(message.to_string()));
	}

	pub(crate) fn ready_app(&self, id: &str, module: Arc<dyn Module>) {
		self.apps
			.write()
			.expect("app table poisoned")
			.insert(id.to_string(), AppSlot::Ready(module));
	}

	pub(crate) fn set_event_emitter(&self, module: Arc<dyn Module>) {
		*self.event_emitter.lock().expect("event emitter poisoned") = Some(module);
	}
}

/// The decoded configuration document.
///
/// All settings are optional; absent sections simply load nothing.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
	/// Top-level app modules, keyed by name in the empty namespace.
	#[serde(default, rename = "apps")]
	pub apps_raw: Option<ModuleMap>,

	/// Structured-logging configuration.
	#[serde(default)]
	pub logging: Option<Logging>,
}

impl Config {
	/// Strictly decodes a configuration document.
	pub fn from_json_strict(json: &str) -> Result<Self, LoadError> {
		strict::from_str_strict(json).map_err(|err| LoadError::Config { err })
	}
}

/// Loads a configuration document: decodes it strictly, provisions logging,
/// and builds every declared app through the module lifecycle.
///
/// On success the returned context owns everything that was built; cancel it
/// to tear the configuration down. On failure the partially-built tree is
/// torn down (best effort) before the error is returned. Starting and
/// stopping apps stays the caller's job, via the app table on
/// [`Context::config`].
pub fn load_config(json: &str) -> Result<Context, LoadError> {
	let mut config = Config::from_json_strict(json)?;
	let mut ctx = Context::new(ConfigHandle::new());

	let result = load_into(&mut config, &mut ctx);
	match result {
		Ok(()) => Ok(ctx),
		Err(err) => {
			ctx.cancel();
			Err(err)
		}
	}
}

fn load_into(config: &mut Config, ctx: &mut Context) -> Result<(), LoadError> {
	if let Some(logging) = config.logging.as_mut() {
		logging.provision(ctx).map_err(|err| LoadError::Provision {
			id: ModuleId::new("logging"),
			message: format!("{err:#}"),
		})?;
	}

	if let Some(apps) = config.apps_raw.take() {
		ctx.load_module(RawModuleField::Map(apps), &Descriptor::top_level())?;
	}

	Ok(())
}
