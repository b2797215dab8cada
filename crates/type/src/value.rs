// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// All value kinds a YANG leaf can carry.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
	/// A boolean: true or false.
	Bool,
	/// An 8-bit signed integer
	Int8,
	/// A 16-bit signed integer
	Int16,
	/// A 32-bit signed integer
	Int32,
	/// A 64-bit signed integer
	Int64,
	/// An 8-bit unsigned integer
	Uint8,
	/// A 16-bit unsigned integer
	Uint16,
	/// A 32-bit unsigned integer
	Uint32,
	/// A 64-bit unsigned integer
	Uint64,
	/// A 64-bit fixed-point decimal
	Decimal64,
	/// A UTF-8 encoded string
	Text,
	/// A named member of an enumeration
	Enum,
	/// An ordered set of named bits
	Bits,
	/// Arbitrary binary data, rendered base64
	Binary,
	/// A leaf of type empty carries no payload
	Empty,
	/// A reference to an identity, qualified by module
	IdentityRef,
	/// An instance-identifier path
	InstanceId,
}

impl Display for ValueKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			ValueKind::Bool => f.write_str("boolean"),
			ValueKind::Int8 => f.write_str("int8"),
			ValueKind::Int16 => f.write_str("int16"),
			ValueKind::Int32 => f.write_str("int32"),
			ValueKind::Int64 => f.write_str("int64"),
			ValueKind::Uint8 => f.write_str("uint8"),
			ValueKind::Uint16 => f.write_str("uint16"),
			ValueKind::Uint32 => f.write_str("uint32"),
			ValueKind::Uint64 => f.write_str("uint64"),
			ValueKind::Decimal64 => f.write_str("decimal64"),
			ValueKind::Text => f.write_str("string"),
			ValueKind::Enum => f.write_str("enumeration"),
			ValueKind::Bits => f.write_str("bits"),
			ValueKind::Binary => f.write_str("binary"),
			ValueKind::Empty => f.write_str("empty"),
			ValueKind::IdentityRef => f.write_str("identityref"),
			ValueKind::InstanceId => f.write_str("instance-identifier"),
		}
	}
}

/// A 64-bit fixed-point decimal with a fixed number of fraction digits.
///
/// The raw value holds the scaled integer; `fraction_digits` is in 1..=18 as
/// required by the YANG decimal64 built-in.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decimal64 {
	pub value: i64,
	pub fraction_digits: u8,
}

impl Display for Decimal64 {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		let digits = self.fraction_digits as u32;
		let scale = 10i64.pow(digits);
		let int = self.value / scale;
		let frac = (self.value % scale).abs();
		if self.value < 0 && int == 0 {
			write!(f, "-0.{:0width$}", frac, width = digits as usize)
		} else {
			write!(f, "{}.{:0width$}", int, frac, width = digits as usize)
		}
	}
}

/// A data-tree value, represented as a native Rust type.
///
/// `Display` renders the YANG canonical form: booleans lowercase, decimal64
/// with exactly `fraction_digits` fraction digits, bits joined by single
/// spaces in schema declaration order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
	Bool(bool),
	Int8(i8),
	Int16(i16),
	Int32(i32),
	Int64(i64),
	Uint8(u8),
	Uint16(u16),
	Uint32(u32),
	Uint64(u64),
	Decimal64(Decimal64),
	Text(String),
	Enum(String),
	Bits(Vec<String>),
	Binary(String),
	Empty,
	IdentityRef {
		module: String,
		identity: String,
	},
	InstanceId(String),
}

impl Value {
	pub fn kind(&self) -> ValueKind {
		match self {
			Value::Bool(_) => ValueKind::Bool,
			Value::Int8(_) => ValueKind::Int8,
			Value::Int16(_) => ValueKind::Int16,
			Value::Int32(_) => ValueKind::Int32,
			Value::Int64(_) => ValueKind::Int64,
			Value::Uint8(_) => ValueKind::Uint8,
			Value::Uint16(_) => ValueKind::Uint16,
			Value::Uint32(_) => ValueKind::Uint32,
			Value::Uint64(_) => ValueKind::Uint64,
			Value::Decimal64(_) => ValueKind::Decimal64,
			Value::Text(_) => ValueKind::Text,
			Value::Enum(_) => ValueKind::Enum,
			Value::Bits(_) => ValueKind::Bits,
			Value::Binary(_) => ValueKind::Binary,
			Value::Empty => ValueKind::Empty,
			Value::IdentityRef {
				..
			} => ValueKind::IdentityRef,
			Value::InstanceId(_) => ValueKind::InstanceId,
		}
	}

	/// Parse a canonical-form string into a value of the requested kind.
	pub fn parse(kind: ValueKind, text: &str) -> Option<Value> {
		match kind {
			ValueKind::Bool => match text {
				"true" => Some(Value::Bool(true)),
				"false" => Some(Value::Bool(false)),
				_ => None,
			},
			ValueKind::Int8 => text.parse().ok().map(Value::Int8),
			ValueKind::Int16 => text.parse().ok().map(Value::Int16),
			ValueKind::Int32 => text.parse().ok().map(Value::Int32),
			ValueKind::Int64 => text.parse().ok().map(Value::Int64),
			ValueKind::Uint8 => text.parse().ok().map(Value::Uint8),
			ValueKind::Uint16 => text.parse().ok().map(Value::Uint16),
			ValueKind::Uint32 => text.parse().ok().map(Value::Uint32),
			ValueKind::Uint64 => text.parse().ok().map(Value::Uint64),
			ValueKind::Decimal64 => {
				let (int, frac) = text.split_once('.')?;
				let digits = frac.len() as u8;
				if digits == 0 || digits > 18 {
					return None;
				}
				let negative = int.starts_with('-');
				let int: i64 = int.parse().ok()?;
				let frac: i64 = frac.parse().ok()?;
				let scale = 10i64.pow(digits as u32);
				let magnitude = int.unsigned_abs() as i64 * scale + frac;
				Some(Value::Decimal64(Decimal64 {
					value: if negative {
						-magnitude
					} else {
						magnitude
					},
					fraction_digits: digits,
				}))
			}
			ValueKind::Text => Some(Value::Text(text.to_string())),
			ValueKind::Enum => Some(Value::Enum(text.to_string())),
			ValueKind::Bits => Some(Value::Bits(
				text.split_whitespace().map(|s| s.to_string()).collect(),
			)),
			ValueKind::Binary => Some(Value::Binary(text.to_string())),
			ValueKind::Empty => {
				if text.is_empty() {
					Some(Value::Empty)
				} else {
					None
				}
			}
			ValueKind::IdentityRef => {
				let (module, identity) = text.split_once(':')?;
				Some(Value::IdentityRef {
					module: module.to_string(),
					identity: identity.to_string(),
				})
			}
			ValueKind::InstanceId => Some(Value::InstanceId(text.to_string())),
		}
	}
}

impl Display for Value {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Value::Bool(true) => f.write_str("true"),
			Value::Bool(false) => f.write_str("false"),
			Value::Int8(value) => Display::fmt(value, f),
			Value::Int16(value) => Display::fmt(value, f),
			Value::Int32(value) => Display::fmt(value, f),
			Value::Int64(value) => Display::fmt(value, f),
			Value::Uint8(value) => Display::fmt(value, f),
			Value::Uint16(value) => Display::fmt(value, f),
			Value::Uint32(value) => Display::fmt(value, f),
			Value::Uint64(value) => Display::fmt(value, f),
			Value::Decimal64(value) => Display::fmt(value, f),
			Value::Text(value) => Display::fmt(value, f),
			Value::Enum(value) => Display::fmt(value, f),
			Value::Bits(names) => f.write_str(&names.join(" ")),
			Value::Binary(value) => Display::fmt(value, f),
			Value::Empty => Ok(()),
			Value::IdentityRef {
				module,
				identity,
			} => write!(f, "{module}:{identity}"),
			Value::InstanceId(path) => Display::fmt(path, f),
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_bool_canonical_form() {
		assert_eq!(Value::Bool(true).to_string(), "true");
		assert_eq!(Value::Bool(false).to_string(), "false");
		assert_eq!(Value::parse(ValueKind::Bool, "true"), Some(Value::Bool(true)));
		assert_eq!(Value::parse(ValueKind::Bool, "True"), None);
	}

	#[test]
	fn test_decimal64_canonical_form() {
		let d = Decimal64 {
			value: 10250,
			fraction_digits: 3,
		};
		assert_eq!(Value::Decimal64(d).to_string(), "10.250");

		let neg = Decimal64 {
			value: -250,
			fraction_digits: 3,
		};
		assert_eq!(Value::Decimal64(neg).to_string(), "-0.250");
	}

	#[test]
	fn test_decimal64_round_trip() {
		let parsed = Value::parse(ValueKind::Decimal64, "10.250").unwrap();
		assert_eq!(
			parsed,
			Value::Decimal64(Decimal64 {
				value: 10250,
				fraction_digits: 3
			})
		);
		assert_eq!(parsed.to_string(), "10.250");
	}

	#[test]
	fn test_bits_joined_in_order() {
		let v = Value::Bits(vec!["lowlight".into(), "flash".into()]);
		assert_eq!(v.to_string(), "lowlight flash");
	}

	#[test]
	fn test_identityref_qualified() {
		let v = Value::parse(ValueKind::IdentityRef, "iana-if-type:ethernetCsmacd").unwrap();
		assert_eq!(v.to_string(), "iana-if-type:ethernetCsmacd");
	}

	#[test]
	fn test_integer_bounds() {
		assert_eq!(Value::parse(ValueKind::Uint8, "255"), Some(Value::Uint8(255)));
		assert_eq!(Value::parse(ValueKind::Uint8, "256"), None);
		assert_eq!(Value::parse(ValueKind::Int8, "-128"), Some(Value::Int8(-128)));
	}
}
