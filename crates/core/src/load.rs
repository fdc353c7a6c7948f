//! Loading modules out of raw configuration fields.
//!
//! A host module declares a field of raw JSON plus a [`Descriptor`] saying
//! where the field's module names live: the namespace to resolve them in,
//! and optionally the property inside each object that carries the name.
//! The resolver extracts the names, finds the constructors, and drives each
//! instance through the construction lifecycle on the caller's [`Context`].
//!
//! Fields take one of five shapes, modeled by [`RawModuleField`]: a single
//! named object, a sequence of them, a sequence of sequences, a map of key
//! to object, or a sequence of maps. Loading consumes the raw field; callers
//! `take()` their `Option` field to hand it over, which leaves nothing
//! behind to rely on afterward.

use indexmap::IndexMap;
use serde_json::Value;
use serde_json::value::RawValue;

use crate::context::Context;
use crate::error::LoadError;
use crate::module::Module;

use std::sync::Arc;

/// Multiple raw module configs keyed by module name (or by an opaque,
/// caller-meaningful label when the descriptor carries an inline key).
pub type ModuleMap = IndexMap<String, Box<RawValue>>;

/// Where a field's module names are looked up.
///
/// The canonical written form is a space-separated `key=value` list, e.g.
/// `namespace=trellis.logging.writers inline_key=output`, attached to the
/// field that holds the raw config.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Descriptor {
	namespace: String,
	inline_key: Option<String>,
}

impl Descriptor {
	/// Creates a descriptor directly.
	pub fn new(namespace: impl Into<String>, inline_key: Option<&str>) -> Self {
		Self {
			namespace: namespace.into(),
			inline_key: inline_key.map(str::to_string),
		}
	}

	/// The descriptor for top-level app modules: empty namespace, names
	/// taken from map keys.
	pub fn top_level() -> Self {
		Self::new("", None)
	}

	/// Parses the written `key=value` form.
	///
	/// Recognized keys are `namespace` (required) and `inline_key`;
	/// unrecognized keys are ignored. Values cannot contain spaces. A
	/// malformed token or a missing namespace is a mistake in the host
	/// module's source, not in user configuration, so this panics rather
	/// than returning an error.
	pub fn parse(tag: &str) -> Self {
		let mut namespace = None;
		let mut inline_key = None;
		for token in tag.split_whitespace() {
			let Some((key, value)) = token.split_once('=') else {
				panic!("malformed module field descriptor: token '{token}' is not key=value");
			};
			match key {
				"namespace" => namespace = Some(value.to_string()),
				"inline_key" => inline_key = Some(value.to_string()),
				_ => {}
			}
		}
		let Some(namespace) = namespace else {
			panic!("malformed module field descriptor: missing 'namespace' key in '{tag}'");
		};
		Self { namespace, inline_key }
	}

	/// Returns the namespace names are resolved in.
	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	/// Returns the property that carries the module name inside each object,
	/// if one is declared.
	pub fn inline_key(&self) -> Option<&str> {
		self.inline_key.as_deref()
	}

	/// Qualifies a bare module name with the namespace.
	fn qualified(&self, name: &str) -> String {
		if self.namespace.is_empty() {
			name.to_string()
		} else {
			format!("{}.{name}", self.namespace)
		}
	}
}

/// A raw module field, one variant per shape the resolver understands.
///
/// Typed host fields convert with `From`; untyped fragments go through
/// [`RawModuleField::classify`].
pub enum RawModuleField {
	/// One named object; the name must be inline.
	Single(Box<RawValue>),
	/// A sequence of named objects.
	List(Vec<Box<RawValue>>),
	/// A sequence of sequences of named objects.
	Lists(Vec<Vec<Box<RawValue>>>),
	/// Module configs keyed by name, or by opaque label with an inline key.
	Map(ModuleMap),
	/// A sequence of such maps.
	MapList(Vec<ModuleMap>),
}

impl RawModuleField {
	/// Inspects an untyped fragment and assigns it a shape.
	///
	/// An object whose inline key holds a string is a [`Single`]; any other
	/// object is a [`Map`]. An array of arrays is [`Lists`]; an array of
	/// objects is a [`List`] when the descriptor has an inline key to name
	/// them, otherwise a [`MapList`]. Anything else has no shape a module
	/// field can take.
	///
	/// [`Single`]: RawModuleField::Single
	/// [`Map`]: RawModuleField::Map
	/// [`Lists`]: RawModuleField::Lists
	/// [`List`]: RawModuleField::List
	/// [`MapList`]: RawModuleField::MapList
	pub fn classify(raw: Box<RawValue>, desc: &Descriptor) -> Result<Self, LoadError> {
		let value: Value =
			serde_json::from_str(raw.get()).map_err(|err| LoadError::Fragment { err })?;

		match value {
			Value::Object(object) => {
				let named_inline = desc
					.inline_key()
					.and_then(|key| object.get(key))
					.is_some_and(Value::is_string);
				if named_inline {
					Ok(RawModuleField::Single(raw))
				} else {
					Ok(RawModuleField::Map(object_to_module_map(object)?))
				}
			}
			Value::Array(items) => {
				if items.is_empty() {
					return Ok(RawModuleField::List(Vec::new()));
				}
				if items.iter().all(Value::is_array) {
					let mut rows = Vec::with_capacity(items.len());
					for item in items {
						let Value::Array(row) = item else { unreachable!() };
						rows.push(row.iter().map(to_raw).collect::<Result<Vec<_>, _>>()?);
					}
					return Ok(RawModuleField::Lists(rows));
				}
				if items.iter().all(Value::is_object) {
					if desc.inline_key().is_some() {
						let raws = items.iter().map(to_raw).collect::<Result<Vec<_>, _>>()?;
						return Ok(RawModuleField::List(raws));
					}
					let mut maps = Vec::with_capacity(items.len());
					for item in items {
						let Value::Object(object) = item else { unreachable!() };
						maps.push(object_to_module_map(object)?);
					}
					return Ok(RawModuleField::MapList(maps));
				}
				Err(LoadError::UnrecognizedShape { found: "array of mixed values" })
			}
			Value::String(_) => Err(LoadError::UnrecognizedShape { found: "string" }),
			Value::Number(_) => Err(LoadError::UnrecognizedShape { found: "number" }),
			Value::Bool(_) => Err(LoadError::UnrecognizedShape { found: "boolean" }),
			Value::Null => Err(LoadError::UnrecognizedShape { found: "null" }),
		}
	}

	fn shape_name(&self) -> &'static str {
		match self {
			RawModuleField::Single(_) => "single",
			RawModuleField::List(_) => "list",
			RawModuleField::Lists(_) => "list-of-lists",
			RawModuleField::Map(_) => "map",
			RawModuleField::MapList(_) => "list-of-maps",
		}
	}
}

impl From<Box<RawValue>> for RawModuleField {
	fn from(raw: Box<RawValue>) -> Self {
		RawModuleField::Single(raw)
	}
}

impl From<Vec<Box<RawValue>>> for RawModuleField {
	fn from(raws: Vec<Box<RawValue>>) -> Self {
		RawModuleField::List(raws)
	}
}

impl From<Vec<Vec<Box<RawValue>>>> for RawModuleField {
	fn from(rows: Vec<Vec<Box<RawValue>>>) -> Self {
		RawModuleField::Lists(rows)
	}
}

impl From<ModuleMap> for RawModuleField {
	fn from(map: ModuleMap) -> Self {
		RawModuleField::Map(map)
	}
}

impl From<Vec<ModuleMap>> for RawModuleField {
	fn from(maps: Vec<ModuleMap>) -> Self {
		RawModuleField::MapList(maps)
	}
}

fn to_raw(value: &Value) -> Result<Box<RawValue>, LoadError> {
	serde_json::value::to_raw_value(value).map_err(|err| LoadError::Fragment { err })
}

fn object_to_module_map(object: serde_json::Map<String, Value>) -> Result<ModuleMap, LoadError> {
	let mut map = ModuleMap::with_capacity(object.len());
	for (key, value) in object {
		map.insert(key, to_raw(&value)?);
	}
	Ok(map)
}

/// Fully loaded module instances, mirroring the shape of the raw field.
#[derive(Debug)]
pub enum LoadedField {
	/// See [`RawModuleField::Single`].
	Single(Arc<dyn Module>),
	/// See [`RawModuleField::List`].
	List(Vec<Arc<dyn Module>>),
	/// See [`RawModuleField::Lists`].
	Lists(Vec<Vec<Arc<dyn Module>>>),
	/// See [`RawModuleField::Map`].
	Map(IndexMap<String, Arc<dyn Module>>),
	/// See [`RawModuleField::MapList`].
	MapList(Vec<IndexMap<String, Arc<dyn Module>>>),
}

impl LoadedField {
	/// Unpacks a single instance.
	pub fn into_single(self) -> Result<Arc<dyn Module>, LoadError> {
		match self {
			LoadedField::Single(module) => Ok(module),
			other => Err(other.wrong_shape("single")),
		}
	}

	/// Unpacks a sequence of instances.
	pub fn into_list(self) -> Result<Vec<Arc<dyn Module>>, LoadError> {
		match self {
			LoadedField::List(modules) => Ok(modules),
			other => Err(other.wrong_shape("list")),
		}
	}

	/// Unpacks a sequence of sequences.
	pub fn into_lists(self) -> Result<Vec<Vec<Arc<dyn Module>>>, LoadError> {
		match self {
			LoadedField::Lists(rows) => Ok(rows),
			other => Err(other.wrong_shape("list-of-lists")),
		}
	}

	/// Unpacks a map of instances.
	pub fn into_map(self) -> Result<IndexMap<String, Arc<dyn Module>>, LoadError> {
		match self {
			LoadedField::Map(map) => Ok(map),
			other => Err(other.wrong_shape("map")),
		}
	}

	/// Unpacks a sequence of maps.
	pub fn into_map_list(self) -> Result<Vec<IndexMap<String, Arc<dyn Module>>>, LoadError> {
		match self {
			LoadedField::MapList(maps) => Ok(maps),
			other => Err(other.wrong_shape("list-of-maps")),
		}
	}

	fn shape_name(&self) -> &'static str {
		match self {
			LoadedField::Single(_) => "single",
			LoadedField::List(_) => "list",
			LoadedField::Lists(_) => "list-of-lists",
			LoadedField::Map(_) => "map",
			LoadedField::MapList(_) => "list-of-maps",
		}
	}

	fn wrong_shape(self, expected: &'static str) -> LoadError {
		LoadError::WrongShape { expected, got: self.shape_name() }
	}
}

/// Extracts a module's name from the designated property of its raw object.
///
/// The key must be present, hold a non-empty string, and is removed from the
/// returned residual, which is re-serialized and ready for decoding.
pub fn module_name_inline(key: &str, raw: &RawValue) -> Result<(String, Box<RawValue>), LoadError> {
	let mut object: IndexMap<String, Value> =
		serde_json::from_str(raw.get()).map_err(|err| LoadError::InlineName { err })?;

	let Some(value) = object.shift_remove(key) else {
		return Err(LoadError::MissingInlineKey { key: key.to_string() });
	};
	let Value::String(name) = value else {
		return Err(LoadError::InlineNameNotString { key: key.to_string() });
	};
	if name.is_empty() {
		return Err(LoadError::EmptyInlineName { key: key.to_string() });
	}

	let residual =
		serde_json::value::to_raw_value(&object).map_err(|err| LoadError::InlineName { err })?;
	Ok((name, residual))
}

impl Context {
	/// Loads every module a raw field declares, dispatching on its shape.
	///
	/// Consumes the field; the raw config is gone once loading has happened.
	/// Errors are wrapped with the element index or map key they occurred
	/// at.
	pub fn load_module(
		&mut self,
		field: RawModuleField,
		desc: &Descriptor,
	) -> Result<LoadedField, LoadError> {
		match field {
			RawModuleField::Single(raw) => {
				Ok(LoadedField::Single(self.load_inline(&raw, desc)?))
			}
			RawModuleField::List(items) => {
				let mut loaded = Vec::with_capacity(items.len());
				for (index, raw) in items.iter().enumerate() {
					let module = self
						.load_inline(raw, desc)
						.map_err(|err| err.at(format!("index {index}")))?;
					loaded.push(module);
				}
				Ok(LoadedField::List(loaded))
			}
			RawModuleField::Lists(rows) => {
				let mut loaded = Vec::with_capacity(rows.len());
				for (row_index, row) in rows.iter().enumerate() {
					let mut loaded_row = Vec::with_capacity(row.len());
					for (index, raw) in row.iter().enumerate() {
						let module = self
							.load_inline(raw, desc)
							.map_err(|err| err.at(format!("index {index}")))
							.map_err(|err| err.at(format!("index {row_index}")))?;
						loaded_row.push(module);
					}
					loaded.push(loaded_row);
				}
				Ok(LoadedField::Lists(loaded))
			}
			RawModuleField::Map(map) => Ok(LoadedField::Map(self.load_map(map, desc)?)),
			RawModuleField::MapList(maps) => {
				let mut loaded = Vec::with_capacity(maps.len());
				for (index, map) in maps.into_iter().enumerate() {
					let loaded_map = self
						.load_map(map, desc)
						.map_err(|err| err.at(format!("index {index}")))?;
					loaded.push(loaded_map);
				}
				Ok(LoadedField::MapList(loaded))
			}
		}
	}

	/// Loads one module whose name is carried inside its own object.
	fn load_inline(
		&mut self,
		raw: &RawValue,
		desc: &Descriptor,
	) -> Result<Arc<dyn Module>, LoadError> {
		let Some(key) = desc.inline_key() else {
			return Err(LoadError::NoInlineKey { namespace: desc.namespace().to_string() });
		};
		let (name, residual) = module_name_inline(key, raw)?;
		let id = desc.qualified(&name);
		self.load_by_id(&id, Some(&residual))
	}

	/// Loads every module in a map. Without an inline key the map keys are
	/// the module names; with one, the keys are opaque labels and the names
	/// come from inside each object.
	fn load_map(
		&mut self,
		map: ModuleMap,
		desc: &Descriptor,
	) -> Result<IndexMap<String, Arc<dyn Module>>, LoadError> {
		let mut loaded = IndexMap::with_capacity(map.len());
		for (map_key, raw) in map {
			let module = match desc.inline_key() {
				None => {
					let id = desc.qualified(&map_key);
					self.load_by_id(&id, Some(&raw))
						.map_err(|err| err.at(format!("key '{map_key}'")))?
				}
				Some(_) => self
					.load_inline(&raw, desc)
					.map_err(|err| err.at(format!("key '{map_key}'")))?,
			};
			loaded.insert(map_key, module);
		}
		Ok(loaded)
	}
}
