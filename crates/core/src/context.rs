//! The lifecycle scope of one configuration load.
//!
//! A [`Context`] owns every module instance created while loading one
//! configuration and the cleanup obligations that go with them. It is
//! mutated only by the single instantiation sequence that owns it;
//! concurrent configuration loads must each use their own context. Canceling
//! a context is terminal and tears down everything it created.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::value::RawValue;
use tracing::error;

use crate::config::ConfigHandle;
use crate::error::LoadError;
use crate::id::ModuleId;
use crate::module::{Module, module_id};
use crate::registry;

type Callback = Arc<dyn Fn() + Send + Sync>;
type CallbackList = Arc<Mutex<Vec<Callback>>>;

/// Defines the lifetime of modules loaded from one configuration, and gives
/// them access to the enclosing configuration object.
///
/// Use [`Context::new`] for the root scope of a load and [`Context::child`]
/// to derive nested scopes. Most modules never create one themselves; they
/// receive `&mut Context` in their `provision` method.
pub struct Context {
	cfg: Arc<ConfigHandle>,
	instances: HashMap<String, Vec<Arc<dyn Module>>>,
	ancestry: Vec<ModuleId>,
	created: Vec<Arc<dyn Module>>,
	cleanup_funcs: CallbackList,
	exit_funcs: CallbackList,
	parent_cleanup: CallbackList,
	parent_exit: CallbackList,
}

impl std::fmt::Debug for Context {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Context")
			.field("instances", &self.instances)
			.field("ancestry", &self.ancestry)
			.field("created", &self.created)
			.finish_non_exhaustive()
	}
}

impl Context {
	/// Creates a root context for a fresh configuration load.
	pub fn new(cfg: Arc<ConfigHandle>) -> Self {
		Self {
			cfg,
			instances: HashMap::new(),
			ancestry: Vec::new(),
			created: Vec::new(),
			cleanup_funcs: CallbackList::default(),
			exit_funcs: CallbackList::default(),
			parent_cleanup: CallbackList::default(),
			parent_exit: CallbackList::default(),
		}
	}

	/// Derives a child scope. The child shares the enclosing configuration
	/// object, and canceling it runs the callbacks registered on this
	/// (parent) scope.
	pub fn child(&self) -> Context {
		Context {
			cfg: self.cfg.clone(),
			instances: HashMap::new(),
			ancestry: Vec::new(),
			created: Vec::new(),
			cleanup_funcs: CallbackList::default(),
			exit_funcs: CallbackList::default(),
			parent_cleanup: self.cleanup_funcs.clone(),
			parent_exit: self.exit_funcs.clone(),
		}
	}

	/// Returns the enclosing configuration object.
	pub fn config(&self) -> &Arc<ConfigHandle> {
		&self.cfg
	}

	/// Registers a callback to run when a scope derived from this one is
	/// canceled. Callbacks are appended, never deduplicated, and run in
	/// registration order.
	pub fn on_cancel(&self, f: impl Fn() + Send + Sync + 'static) {
		self.cleanup_funcs.lock().expect("callback list poisoned").push(Arc::new(f));
	}

	/// Registers a callback like [`on_cancel`](Context::on_cancel), but run
	/// only when the cancellation is part of a graceful process exit.
	pub fn on_exit(&self, f: impl Fn() + Send + Sync + 'static) {
		self.exit_funcs.lock().expect("callback list poisoned").push(Arc::new(f));
	}

	/// Loads and provisions a module by its full ID, decoding `raw` into it
	/// when present.
	///
	/// The instance is driven through the whole construction lifecycle:
	/// constructed, decoded, provisioned, validated. On a provision or
	/// validation failure the instance's `cleanup` (if implemented) runs
	/// exactly once before the error is returned, and any cleanup failure is
	/// folded into the error message. The returned instance is owned by this
	/// context and is torn down when the context is canceled.
	pub fn load_by_id(&mut self, id: &str, raw: Option<&RawValue>) -> Result<Arc<dyn Module>, LoadError> {
		let info = registry::get_module(id)?;

		let mut module = match raw {
			Some(raw) => info
				.decode_instance(raw)
				.map_err(|err| LoadError::Decode { id: info.id.clone(), err })?,
			None => info.new_instance(),
		};

		// App modules become visible in the configuration's app table before
		// provisioning completes: modules provisioned later in the same load
		// may need to look them up even though they are not yet ready.
		let is_app = module.as_app().is_some();
		if is_app {
			self.cfg.register_pending_app(id);
		}

		self.ancestry.push(info.id.clone());

		if let Some(provisioner) = module.as_provisioner()
			&& let Err(err) = provisioner.provision(self)
		{
			let message = Self::fold_cleanup(format!("{err:#}"), module.as_ref());
			if is_app {
				self.cfg.fail_app(id, &message);
			}
			return Err(LoadError::Provision { id: info.id, message });
		}

		if let Some(validator) = module.as_validator()
			&& let Err(err) = validator.validate()
		{
			let message = Self::fold_cleanup(format!("{err:#}"), module.as_ref());
			if is_app {
				self.cfg.fail_app(id, &message);
			}
			return Err(LoadError::Validate { id: info.id, message });
		}

		let module: Arc<dyn Module> = Arc::from(module);
		self.instances.entry(id.to_string()).or_default().push(module.clone());
		self.created.push(module.clone());

		if is_app {
			self.cfg.ready_app(id, module.clone());
			if module.as_event_emitter().is_some() {
				self.cfg.set_event_emitter(module.clone());
			}
		}

		Ok(module)
	}

	/// Runs the failed instance's cleanup at most once and folds any cleanup
	/// failure into the original message.
	fn fold_cleanup(message: String, module: &dyn Module) -> String {
		match module.as_cleaner().map(|cleaner| cleaner.cleanup()) {
			Some(Err(cleanup_err)) => {
				format!("{message}; additionally, cleanup: {cleanup_err:#}")
			}
			_ => message,
		}
	}

	/// Cancels this scope: runs the parent scope's cleanup callbacks, then
	/// releases every instance this scope created, in creation order.
	///
	/// Cancellation always completes: individual cleanup failures are logged
	/// and never abort the remaining cleanups. Consuming `self` makes a
	/// second cancellation unrepresentable.
	pub fn cancel(self) {
		self.teardown(false);
	}

	/// Cancels this scope as part of a graceful process exit: additionally
	/// runs the parent scope's exit callbacks before the ordinary cascade.
	pub fn cancel_for_exit(self) {
		self.teardown(true);
	}

	fn teardown(self, exiting: bool) {
		if exiting {
			let exit_funcs = self.parent_exit.lock().expect("callback list poisoned");
			for f in exit_funcs.iter() {
				f();
			}
		}

		let cleanup_funcs = self.parent_cleanup.lock().expect("callback list poisoned");
		for f in cleanup_funcs.iter() {
			f();
		}
		drop(cleanup_funcs);

		for module in &self.created {
			if let Some(cleaner) = module.as_cleaner()
				&& let Err(err) = cleaner.cleanup()
			{
				error!(module = %module_id(module.as_ref()), error = %format!("{err:#}"), "module cleanup failed");
			}
		}
	}

	/// Returns the IDs of every instance constructed in this scope, in
	/// construction order, including instances whose provisioning later
	/// failed. Diagnostic only.
	pub fn ancestry(&self) -> &[ModuleId] {
		&self.ancestry
	}

	/// Returns the successfully loaded instances of `id` in this scope.
	pub fn instances_of(&self, id: &str) -> &[Arc<dyn Module>] {
		self.instances.get(id).map(Vec::as_slice).unwrap_or(&[])
	}

	/// Shorthand for looking up an app slot on the enclosing configuration.
	pub fn app(&self, name: &str) -> Option<crate::config::AppSlot> {
		self.cfg.app(name)
	}

	/// Shorthand for the enclosing configuration's event emitter.
	pub fn event_emitter(&self) -> Option<Arc<dyn Module>> {
		self.cfg.event_emitter()
	}
}
