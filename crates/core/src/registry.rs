//! The process-wide module registry.
//!
//! Modules register once at process start and stay registered for the life
//! of the process; the table is append-only and there is no teardown.
//! Registration failures are contract violations by the module's author and
//! panic rather than returning an error: a silently-missing component is
//! worse than a crashed process. Lookups are read-locked and can run from
//! any number of concurrent configuration loads.

use std::collections::HashMap;
use std::sync::{LazyLock, Once, RwLock};

use crate::error::RegistryError;
use crate::module::{Module, ModuleInfo, ModuleRegistration};

/// Top-level IDs reserved for host internals.
const RESERVED_IDS: [&str; 2] = ["trellis", "admin"];

macro_rules! table {
	($lock:expr, $method:ident) => {
		if cfg!(any(test, debug_assertions)) {
			$lock.$method().unwrap_or_else(|e| e.into_inner())
		} else {
			$lock.$method().expect("module table lock poisoned")
		}
	};
}

/// The registry table. Kept as a type of its own so the matching semantics
/// are testable without the process-wide instance.
struct Registry {
	table: RwLock<HashMap<String, ModuleInfo>>,
}

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);
static PROVIDED: Once = Once::new();

impl Registry {
	fn new() -> Self {
		Self { table: RwLock::new(HashMap::new()) }
	}

	/// Validates and inserts a registration entry. Panics on any contract
	/// violation; see [`register_module`].
	fn register(&self, info: ModuleInfo) {
		if info.id.is_empty() {
			panic!("module ID missing");
		}
		if RESERVED_IDS.contains(&info.id.as_str()) {
			panic!("module ID '{}' is reserved", info.id);
		}

		// Registration-time sanity probe: the constructor must build an
		// instance declaring the same ID it is being registered under. The
		// probe instance is dropped, not retained.
		let probe_id = info.new_instance().module_info().id;
		if probe_id != info.id {
			panic!(
				"module constructor for '{}' built an instance declaring '{probe_id}'",
				info.id
			);
		}

		let mut table = table!(self.table, write);
		if table.contains_key(info.id.as_str()) {
			panic!("module already registered: {}", info.id);
		}
		table.insert(info.id.as_str().to_string(), info);
	}

	fn get(&self, id: &str) -> Result<ModuleInfo, RegistryError> {
		let table = table!(self.table, read);
		table
			.get(id)
			.cloned()
			.ok_or_else(|| RegistryError::NotRegistered(id.to_string()))
	}

	/// Returns all entries in the given scope, sorted by ID. Only the next
	/// level of nesting matches: scope `foo` returns `foo.bar` and `foo.loo`
	/// but not `bar` or `foo.bar.loo`, and partial labels never match
	/// (scope `foo.ba` does not match `foo.bar`). An empty scope returns the
	/// top-level modules.
	fn in_scope(&self, scope: &str) -> Vec<ModuleInfo> {
		let scope_labels: Vec<&str> = if scope.is_empty() {
			Vec::new()
		} else {
			scope.split('.').collect()
		};

		let table = table!(self.table, read);
		let mut mods: Vec<ModuleInfo> = table
			.values()
			.filter(|info| {
				let labels: Vec<&str> = info.id.as_str().split('.').collect();
				labels.len() == scope_labels.len() + 1
					&& labels.iter().zip(&scope_labels).all(|(a, b)| a == b)
			})
			.cloned()
			.collect();

		// The underlying store has no inherent order.
		mods.sort_by(|a, b| a.id.cmp(&b.id));
		mods
	}

	fn ids(&self) -> Vec<String> {
		let table = table!(self.table, read);
		let mut ids: Vec<String> = table.keys().cloned().collect();
		ids.sort();
		ids
	}
}

/// Registers a module by receiving a plain/empty value of it.
///
/// This should be called once per module during process initialization,
/// before any configuration load. Panics if the module's info is incomplete
/// or invalid: an empty ID, a reserved ID (`trellis`, `admin`), a
/// constructor whose instances declare a different ID, or an ID that is
/// already registered.
pub fn register_module(instance: &dyn Module) {
	REGISTRY.register(instance.module_info());
}

/// Drains every [`ModuleRegistration`] submitted via `inventory` into the
/// registry. Call once at process start; later calls are no-ops.
pub fn register_provided_modules() {
	PROVIDED.call_once(|| {
		for reg in inventory::iter::<ModuleRegistration> {
			REGISTRY.register(reg.info());
		}
	});
}

/// Returns module information from its full ID.
pub fn get_module(id: &str) -> Result<ModuleInfo, RegistryError> {
	REGISTRY.get(id)
}

/// Returns all modules in the given scope/namespace, sorted by ID.
pub fn get_modules(scope: &str) -> Vec<ModuleInfo> {
	REGISTRY.in_scope(scope)
}

/// Returns the IDs of all registered modules, sorted.
pub fn modules() -> Vec<String> {
	REGISTRY.ids()
}

#[cfg(test)]
mod tests {
	use serde::Deserialize;

	use super::*;
	use crate::id::ModuleId;

	macro_rules! test_module {
		($ty:ident, $id:expr) => {
			#[derive(Debug, Default, Deserialize)]
			struct $ty {}

			impl Module for $ty {
				fn module_info(&self) -> ModuleInfo {
					ModuleInfo::of::<$ty>($id)
				}
			}
		};
	}

	test_module!(GoodMod, "t_registry.good");
	test_module!(DupMod, "t_registry.dup");
	test_module!(DupModOther, "t_registry.dup");

	/// Builds a detached registry preloaded with the given IDs, bypassing
	/// the constructor probe the way the matching tests need.
	fn registry_with(ids: &[&str]) -> Registry {
		let registry = Registry::new();
		let mut table = registry.table.write().unwrap();
		for id in ids {
			table.insert(id.to_string(), ModuleInfo::of::<GoodMod>(*id));
		}
		drop(table);
		registry
	}

	#[test]
	fn test_register_then_get() {
		register_module(&GoodMod::default());
		let info = get_module("t_registry.good").unwrap();
		assert_eq!(info.id, ModuleId::new("t_registry.good"));
	}

	#[test]
	fn test_get_unregistered() {
		let err = get_module("t_registry.absent").unwrap_err();
		assert_eq!(err.to_string(), "module not registered: t_registry.absent");
	}

	#[test]
	fn test_get_empty_id() {
		assert!(get_module("").is_err());
	}

	#[test]
	fn test_duplicate_registration_panics() {
		register_module(&DupMod::default());

		// A different constructor makes no difference.
		let result = std::panic::catch_unwind(|| {
			register_module(&DupModOther::default());
		});
		assert!(result.is_err());
	}

	#[test]
	#[should_panic(expected = "module ID missing")]
	fn test_empty_id_panics() {
		test_module!(EmptyId, "");
		register_module(&EmptyId::default());
	}

	#[test]
	#[should_panic(expected = "is reserved")]
	fn test_reserved_id_panics() {
		test_module!(ReservedMod, "trellis");
		register_module(&ReservedMod::default());
	}

	#[test]
	#[should_panic(expected = "is reserved")]
	fn test_admin_id_panics() {
		test_module!(AdminMod, "admin");
		register_module(&AdminMod::default());
	}

	#[test]
	#[should_panic(expected = "built an instance declaring")]
	fn test_probe_id_mismatch_panics() {
		#[derive(Debug, Default, Deserialize)]
		struct Liar {}

		impl Module for Liar {
			fn module_info(&self) -> ModuleInfo {
				ModuleInfo::of::<Liar>("t_registry.liar")
			}
		}

		// Register under a different ID than the constructor's instances
		// will declare.
		REGISTRY.register(ModuleInfo::of::<Liar>("t_registry.other"));
	}

	#[test]
	fn test_scope_matching() {
		let registry = registry_with(&[
			"a", "a.b", "a.b.c", "a.b.cd", "a.c", "a.d", "b", "b.a", "b.b", "b.a.c", "c",
		]);

		let ids = |scope: &str| -> Vec<String> {
			registry
				.in_scope(scope)
				.into_iter()
				.map(|info| info.id.as_str().to_string())
				.collect()
		};

		assert_eq!(ids(""), ["a", "b", "c"]);
		assert_eq!(ids("a"), ["a.b", "a.c", "a.d"]);
		assert_eq!(ids("a.b"), ["a.b.c", "a.b.cd"]);
		assert!(ids("a.b.c").is_empty());
		assert_eq!(ids("b"), ["b.a", "b.b"]);
		assert!(ids("asdf").is_empty());
	}

	#[test]
	fn test_scope_is_not_a_prefix_match() {
		let registry = registry_with(&["a.bc", "a.b.c"]);
		assert!(registry.in_scope("a.b").iter().all(|info| info.id.as_str() != "a.bc"));
	}

	#[test]
	fn test_ids_sorted() {
		let registry = registry_with(&["b.b", "a", "a.b.c", "a.b", "c"]);
		assert_eq!(registry.ids(), ["a", "a.b", "a.b.c", "b.b", "c"]);
	}

	#[test]
	fn test_provided_modules_registered_once() {
		register_provided_modules();
		register_provided_modules();

		// The built-in log writers arrive through inventory.
		let info = get_module("trellis.logging.writers.stdout").unwrap();
		assert_eq!(info.id.name(), "stdout");

		let writers = get_modules("trellis.logging.writers");
		let names: Vec<&str> = writers.iter().map(|info| info.id.name()).collect();
		assert_eq!(names, ["discard", "stderr", "stdout"]);
	}
}
