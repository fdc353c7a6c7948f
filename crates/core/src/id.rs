//! Hierarchical module identifiers.
//!
//! A module ID is a string of dot-separated labels forming a simple hierarchy
//! from left to right. The last label is the module's name, and the labels
//! before it are its namespace (or scope). An ID with no dot has the empty
//! namespace, which is appropriate for app modules: the "top-level" modules
//! that trellis core loads and runs.
//!
//! Module IDs should be lowercase and use underscores instead of spaces.
//! Examples of valid IDs:
//! - `endpoint`
//! - `endpoint.socks`
//! - `trellis.logging.writers.stdout`
//! - `router.dpi`

use std::fmt;

/// Uniquely identifies a module in the registry.
///
/// IDs are immutable values compared by exact string equality; no
/// normalization occurs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(String);

impl ModuleId {
	/// Creates an ID from its string form.
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	/// Returns the full ID string.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Returns the namespace (or scope) portion of the ID: all but the last
	/// label. If the ID has only one label, the namespace is empty.
	pub fn namespace(&self) -> &str {
		match self.0.rfind('.') {
			Some(dot) => &self.0[..dot],
			None => "",
		}
	}

	/// Returns the name (last label) of the ID.
	pub fn name(&self) -> &str {
		match self.0.rfind('.') {
			Some(dot) => &self.0[dot + 1..],
			None => &self.0,
		}
	}

	/// Returns true if the ID is the empty string.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl fmt::Display for ModuleId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for ModuleId {
	fn from(id: &str) -> Self {
		Self(id.to_string())
	}
}

impl From<String> for ModuleId {
	fn from(id: String) -> Self {
		Self(id)
	}
}

impl AsRef<str> for ModuleId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_namespace() {
		for (id, want) in [
			("", ""),
			("endpoint", ""),
			("endpoint.socks", "endpoint"),
			("logging.encoders.json", "logging.encoders"),
			("a.b.c", "a.b"),
			("a.b.", "a.b"),
			(".hidden", ""),
			(".", ""),
		] {
			assert_eq!(ModuleId::new(id).namespace(), want, "id={id:?}");
		}
	}

	#[test]
	fn test_name() {
		for (id, want) in [
			("", ""),
			("module", "module"),
			("a.b", "b"),
			("a.b.c.d", "d"),
			(".a", "a"),
			("a.", ""),
			("a.b.", ""),
			(".", ""),
			("a..b", "b"),
		] {
			assert_eq!(ModuleId::new(id).name(), want, "id={id:?}");
		}
	}

	#[test]
	fn test_display_is_exact() {
		for id in ["a.b.c", "foo", "", "a.b."] {
			assert_eq!(ModuleId::new(id).to_string(), id);
		}
	}

	#[test]
	fn test_equality_is_exact() {
		assert_eq!(ModuleId::new("a.b"), ModuleId::new("a.b"));
		assert_ne!(ModuleId::new("a.b"), ModuleId::new("a.B"));
		assert_ne!(ModuleId::new("a.b"), ModuleId::new("a.b "));
	}
}
