//! Strict JSON decoding.
//!
//! Module configuration is decoded strictly: any input property that no
//! schema field accepts is an error, never a silent drop. Syntax and type
//! errors surface the underlying [`serde_json::Error`], which carries
//! line/column detail.

use serde::de::DeserializeOwned;
use serde_json::value::RawValue;

use crate::error::StrictError;

/// Decodes `data` into `T`, rejecting unknown input properties.
pub fn from_str_strict<T: DeserializeOwned>(data: &str) -> Result<T, StrictError> {
	let mut de = serde_json::Deserializer::from_str(data);
	let mut unknown: Option<String> = None;
	let value = serde_ignored::deserialize(&mut de, |path| {
		if unknown.is_none() {
			unknown = Some(path.to_string());
		}
	})?;
	de.end()?;
	if let Some(path) = unknown {
		return Err(StrictError::UnknownField { path });
	}
	Ok(value)
}

/// Decodes a raw fragment into `T`, rejecting unknown input properties.
pub fn from_raw_strict<T: DeserializeOwned>(raw: &RawValue) -> Result<T, StrictError> {
	from_str_strict(raw.get())
}

#[cfg(test)]
mod tests {
	use serde::Deserialize;

	use super::*;

	#[derive(Debug, Default, Deserialize, PartialEq)]
	struct Schema {
		#[serde(default)]
		name: String,
		#[serde(default)]
		count: u32,
	}

	#[test]
	fn test_known_fields_decode() {
		let got: Schema = from_str_strict(r#"{"name": "k", "count": 10}"#).unwrap();
		assert_eq!(got, Schema { name: "k".to_string(), count: 10 });
	}

	#[test]
	fn test_unknown_field_rejected() {
		let err = from_str_strict::<Schema>(r#"{"name": "k", "unknown": "v"}"#).unwrap_err();
		match err {
			StrictError::UnknownField { path } => assert_eq!(path, "unknown"),
			other => panic!("expected unknown field error, got {other}"),
		}
	}

	#[test]
	fn test_syntax_error_carries_position() {
		let err = from_str_strict::<Schema>(r#"{"name": "k" "count": 10}"#).unwrap_err();
		let msg = err.to_string();
		assert!(msg.contains("column"), "missing positional detail: {msg}");
	}

	#[test]
	fn test_type_mismatch_rejected() {
		let err = from_str_strict::<Schema>(r#"{"name": "k", "count": "ten"}"#).unwrap_err();
		assert!(matches!(err, StrictError::Json(_)));
	}

	#[test]
	fn test_trailing_garbage_rejected() {
		assert!(from_str_strict::<Schema>(r#"{"name": "k"} tail"#).is_err());
	}

	#[test]
	fn test_nested_unknown_field_path() {
		#[derive(Debug, Default, Deserialize)]
		struct Outer {
			#[serde(default)]
			inner: Schema,
		}

		let err = from_str_strict::<Outer>(r#"{"inner": {"name": "k", "bogus": 1}}"#).unwrap_err();
		match err {
			StrictError::UnknownField { path } => assert_eq!(path, "inner.bogus"),
			other => panic!("expected unknown field error, got {other}"),
		}
	}
}
