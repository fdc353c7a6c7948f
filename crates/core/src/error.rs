//! Error types for the module system.
//!
//! Registration-time contract violations (empty or reserved IDs, duplicate
//! registration, malformed field descriptors) are not represented here: they
//! are programming mistakes by component authors and panic at startup rather
//! than surfacing as recoverable values. Everything that can go wrong while
//! loading a configuration is represented, and is wrapped with the identifier
//! or field position that caused it as it propagates.

use thiserror::Error;

use crate::id::ModuleId;

/// Errors from registry lookups.
#[derive(Error, Debug)]
pub enum RegistryError {
	/// No module is registered under the requested ID.
	#[error("module not registered: {0}")]
	NotRegistered(String),
}

/// Errors from strict JSON decoding.
#[derive(Error, Debug)]
pub enum StrictError {
	/// Malformed JSON or a type mismatch; the underlying error carries
	/// line/column detail.
	#[error(transparent)]
	Json(#[from] serde_json::Error),

	/// The input contained a property no schema field accepts.
	#[error("unknown field: {path}")]
	UnknownField {
		/// Dotted path of the first offending property.
		path: String,
	},
}

/// Errors from loading modules out of configuration.
#[derive(Error, Debug)]
pub enum LoadError {
	/// No module is registered under the resolved ID.
	#[error("module not registered: {0}")]
	NotRegistered(String),

	/// The module's raw configuration failed strict decoding.
	#[error("decoding module config: {id}: {err}")]
	Decode {
		/// The module being decoded.
		id: ModuleId,
		/// The underlying decode failure.
		err: StrictError,
	},

	/// The top-level configuration document failed strict decoding.
	#[error("decoding configuration: {err}")]
	Config {
		/// The underlying decode failure.
		err: StrictError,
	},

	/// The module's `provision` step failed. Any cleanup failure is folded
	/// into the message rather than replacing it.
	#[error("provision {id}: {message}")]
	Provision {
		/// The module that failed to provision.
		id: ModuleId,
		/// Provisioning failure, possibly with an appended cleanup failure.
		message: String,
	},

	/// The module's `validate` step failed.
	#[error("{id}: invalid configuration: {message}")]
	Validate {
		/// The module that failed validation.
		id: ModuleId,
		/// Validation failure, possibly with an appended cleanup failure.
		message: String,
	},

	/// A raw fragment had none of the shapes a module field can take.
	#[error("unrecognized type for module: {found}")]
	UnrecognizedShape {
		/// What the fragment actually was.
		found: &'static str,
	},

	/// A raw fragment was not parseable at all.
	#[error("parsing module field: {err}")]
	Fragment {
		/// The underlying JSON error.
		err: serde_json::Error,
	},

	/// A single-object field was resolved without an inline key to carry the
	/// module name.
	#[error("unable to determine module name: descriptor for namespace '{namespace}' has no inline key")]
	NoInlineKey {
		/// Namespace of the descriptor that was missing the key.
		namespace: String,
	},

	/// The designated inline key was absent from the module's object.
	#[error("module name not specified with key '{key}'")]
	MissingInlineKey {
		/// The inline key that was expected.
		key: String,
	},

	/// The inline key was present but its value was not a string.
	#[error("module name at key '{key}' must be a string")]
	InlineNameNotString {
		/// The inline key that was inspected.
		key: String,
	},

	/// The inline key held an empty string, which can never name a module.
	#[error("module name at key '{key}' is empty")]
	EmptyInlineName {
		/// The inline key that was inspected.
		key: String,
	},

	/// An inline-keyed object could not be parsed as a JSON object.
	#[error("decoding module name: {err}")]
	InlineName {
		/// The underlying JSON error.
		err: serde_json::Error,
	},

	/// A loaded field was unpacked as the wrong shape.
	#[error("expected {expected} module value, got {got}")]
	WrongShape {
		/// The shape the caller asked for.
		expected: &'static str,
		/// The shape that was actually loaded.
		got: &'static str,
	},

	/// Positional wrapper: the error happened at a known element or key of a
	/// compound field.
	#[error("{position}: {err}")]
	At {
		/// Human-readable position, e.g. `index 2` or `key 'metrics'`.
		position: String,
		/// The wrapped error.
		err: Box<LoadError>,
	},
}

impl LoadError {
	/// Wraps this error with the field position it occurred at.
	pub(crate) fn at(self, position: impl Into<String>) -> Self {
		LoadError::At {
			position: position.into(),
			err: Box::new(self),
		}
	}
}

impl From<RegistryError> for LoadError {
	fn from(err: RegistryError) -> Self {
		match err {
			RegistryError::NotRegistered(id) => LoadError::NotRegistered(id),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_positional_wrapping_chains() {
		let err = LoadError::NotRegistered("ns.missing".to_string())
			.at("index 2")
			.at("index 0");
		assert_eq!(err.to_string(), "index 0: index 2: module not registered: ns.missing");
	}

	#[test]
	fn test_provision_message_wording() {
		let err = LoadError::Provision {
			id: ModuleId::new("endpoint.socks"),
			message: "dial failed; additionally, cleanup: close failed".to_string(),
		};
		assert_eq!(
			err.to_string(),
			"provision endpoint.socks: dial failed; additionally, cleanup: close failed"
		);
	}

	#[test]
	fn test_validate_message_wording() {
		let err = LoadError::Validate {
			id: ModuleId::new("endpoint.socks"),
			message: "port out of range".to_string(),
		};
		assert_eq!(err.to_string(), "endpoint.socks: invalid configuration: port out of range");
	}
}
