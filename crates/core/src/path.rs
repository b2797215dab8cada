// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! JSON-qualified data paths.
//!
//! A path addresses one node inside a module's data tree:
//! `/module:container/list[key='value']/leaf`. The first segment must carry a
//! module qualifier; descendants inherit it until overridden. List entries are
//! selected either by key predicates or by a 1-based position (`[3]`), the
//! latter being the only way to address keyless and duplicate-key lists.

use std::fmt::{Display, Formatter, Write};

use serde::{Deserialize, Serialize};
use yangstore_type::Error;

use crate::Result;

/// One step of a [`DataPath`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathSegment {
	/// Module qualifier; `None` inherits the nearest qualified ancestor.
	pub module: Option<String>,
	pub name: String,
	/// Key predicates in schema key order, `(key-leaf, value)`.
	pub keys: Vec<(String, String)>,
	/// 1-based positional predicate for keyless/duplicate-key lists.
	pub position: Option<usize>,
}

impl PathSegment {
	pub fn named(name: impl Into<String>) -> Self {
		Self {
			module: None,
			name: name.into(),
			keys: Vec::new(),
			position: None,
		}
	}

	pub fn qualified(module: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			module: Some(module.into()),
			name: name.into(),
			keys: Vec::new(),
			position: None,
		}
	}

	pub fn with_key(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.keys.push((key.into(), value.into()));
		self
	}

	pub fn with_position(mut self, position: usize) -> Self {
		self.position = Some(position);
		self
	}
}

impl Display for PathSegment {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		if let Some(module) = &self.module {
			write!(f, "{module}:")?;
		}
		f.write_str(&self.name)?;
		for (key, value) in &self.keys {
			write!(f, "[{key}='{value}']")?;
		}
		if let Some(position) = self.position {
			write!(f, "[{position}]")?;
		}
		Ok(())
	}
}

/// An absolute, JSON-qualified data path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataPath {
	pub segments: Vec<PathSegment>,
}

impl DataPath {
	pub fn root(module: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			segments: vec![PathSegment::qualified(module, name)],
		}
	}

	/// Parse a path of the form `/module:node/child[key='v']/other[2]`.
	pub fn parse(text: &str) -> Result<Self> {
		let text = text.trim();
		if !text.starts_with('/') {
			return Err(Error::inval_arg(format!("path '{text}' is not absolute")));
		}
		let mut segments = Vec::new();
		for raw in split_segments(&text[1..])? {
			segments.push(parse_segment(&raw)?);
		}
		if segments.is_empty() {
			return Err(Error::inval_arg("empty path"));
		}
		if segments[0].module.is_none() {
			return Err(Error::inval_arg(format!("path '{text}' has no module qualifier")));
		}
		Ok(Self {
			segments,
		})
	}

	/// The module owning this path, taken from the first segment.
	pub fn module(&self) -> &str {
		self.segments[0].module.as_deref().unwrap_or_default()
	}

	pub fn len(&self) -> usize {
		self.segments.len()
	}

	pub fn is_empty(&self) -> bool {
		self.segments.is_empty()
	}

	pub fn last(&self) -> &PathSegment {
		self.segments.last().expect("path has at least one segment")
	}

	/// The path without its final segment, or `None` at the root.
	pub fn parent(&self) -> Option<DataPath> {
		if self.segments.len() <= 1 {
			return None;
		}
		Some(DataPath {
			segments: self.segments[..self.segments.len() - 1].to_vec(),
		})
	}

	pub fn child(&self, segment: PathSegment) -> DataPath {
		let mut segments = self.segments.clone();
		segments.push(segment);
		DataPath {
			segments,
		}
	}

	/// Whether `self` addresses the wildcard children of its parent
	/// (final segment named `*`).
	pub fn is_wildcard(&self) -> bool {
		self.last().name == "*"
	}
}

impl Display for DataPath {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		for segment in &self.segments {
			f.write_char('/')?;
			Display::fmt(segment, f)?;
		}
		Ok(())
	}
}

/// Split on `/` outside any `[...]` predicate.
fn split_segments(text: &str) -> Result<Vec<String>> {
	let mut out = Vec::new();
	let mut current = String::new();
	let mut depth = 0usize;
	let mut quote: Option<char> = None;
	for ch in text.chars() {
		match ch {
			'\'' | '"' if quote == Some(ch) => {
				quote = None;
				current.push(ch);
			}
			'\'' | '"' if quote.is_none() && depth > 0 => {
				quote = Some(ch);
				current.push(ch);
			}
			'[' if quote.is_none() => {
				depth += 1;
				current.push(ch);
			}
			']' if quote.is_none() => {
				if depth == 0 {
					return Err(Error::inval_arg(format!("unbalanced ']' in '{text}'")));
				}
				depth -= 1;
				current.push(ch);
			}
			'/' if quote.is_none() && depth == 0 => {
				out.push(std::mem::take(&mut current));
				continue;
			}
			_ => current.push(ch),
		}
	}
	if depth != 0 || quote.is_some() {
		return Err(Error::inval_arg(format!("unterminated predicate in '{text}'")));
	}
	out.push(current);
	out.retain(|s| !s.is_empty());
	Ok(out)
}

fn parse_segment(raw: &str) -> Result<PathSegment> {
	let (head, predicates) = match raw.find('[') {
		Some(idx) => (&raw[..idx], &raw[idx..]),
		None => (raw, ""),
	};
	let (module, name) = match head.split_once(':') {
		Some((module, name)) => (Some(module.to_string()), name.to_string()),
		None => (None, head.to_string()),
	};
	if name.is_empty() {
		return Err(Error::inval_arg(format!("empty node name in segment '{raw}'")));
	}
	let mut segment = PathSegment {
		module,
		name,
		keys: Vec::new(),
		position: None,
	};
	let mut rest = predicates;
	while !rest.is_empty() {
		let end = find_predicate_end(rest)
			.ok_or_else(|| Error::inval_arg(format!("unterminated predicate in '{raw}'")))?;
		let body = &rest[1..end];
		rest = &rest[end + 1..];
		if let Ok(position) = body.parse::<usize>() {
			if position == 0 {
				return Err(Error::inval_arg("positional predicate is 1-based"));
			}
			segment.position = Some(position);
			continue;
		}
		let (key, value) = body
			.split_once('=')
			.ok_or_else(|| Error::inval_arg(format!("malformed predicate '[{body}]'")))?;
		let value = value.trim();
		let unquoted = value
			.strip_prefix('\'')
			.and_then(|v| v.strip_suffix('\''))
			.or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
			.ok_or_else(|| Error::inval_arg(format!("unquoted key value in '[{body}]'")))?;
		segment.keys.push((key.trim().to_string(), unquoted.to_string()));
	}
	Ok(segment)
}

/// Index of the `]` closing the predicate that starts at byte 0.
fn find_predicate_end(text: &str) -> Option<usize> {
	debug_assert!(text.starts_with('['));
	let mut quote: Option<char> = None;
	for (idx, ch) in text.char_indices().skip(1) {
		match ch {
			'\'' | '"' if quote == Some(ch) => quote = None,
			'\'' | '"' if quote.is_none() => quote = Some(ch),
			']' if quote.is_none() => return Some(idx),
			_ => {}
		}
	}
	None
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_parse_simple() {
		let path = DataPath::parse("/ietf-interfaces:interfaces/interface[name='eth0']/enabled").unwrap();
		assert_eq!(path.module(), "ietf-interfaces");
		assert_eq!(path.segments.len(), 3);
		assert_eq!(path.segments[1].keys, vec![("name".to_string(), "eth0".to_string())]);
	}

	#[test]
	fn test_render_round_trip() {
		let text = "/plugin:simple-cont/simple-cont2/ac1/acl1[acs1='a']/acs2";
		let path = DataPath::parse(text).unwrap();
		assert_eq!(path.to_string(), text);
	}

	#[test]
	fn test_positional_predicate() {
		let path = DataPath::parse("/m:cont/keyless[3]/leaf").unwrap();
		assert_eq!(path.segments[1].position, Some(3));
		assert_eq!(path.to_string(), "/m:cont/keyless[3]/leaf");
	}

	#[test]
	fn test_key_value_with_slash() {
		let path = DataPath::parse("/m:table[path='/a/b']/col").unwrap();
		assert_eq!(path.segments[0].keys[0].1, "/a/b");
	}

	#[test]
	fn test_multiple_keys_preserved_in_order() {
		let path = DataPath::parse("/m:l[a='1'][b='2']").unwrap();
		assert_eq!(
			path.segments[0].keys,
			vec![("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]
		);
	}

	#[test]
	fn test_rejects_relative_and_unqualified() {
		assert!(DataPath::parse("interfaces/interface").is_err());
		assert!(DataPath::parse("/interfaces").is_err());
		assert!(DataPath::parse("/").is_err());
	}

	#[test]
	fn test_wildcard() {
		let path = DataPath::parse("/state-module:bus/*").unwrap();
		assert!(path.is_wildcard());
	}
}
