// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Location-path atom extraction from when/must expressions.
//!
//! Dependency analysis does not evaluate XPath; it only needs the location
//! paths an expression touches and the module prefixes they carry. This is a
//! deliberately small lexer over XPath 1.0 text: quoted literals are opaque,
//! function names are unwrapped, predicates are recursed into.

use serde::{Deserialize, Serialize};

/// One step of an extracted location path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
	pub prefix: Option<String>,
	pub name: String,
}

/// One location path found inside an expression.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Atom {
	pub absolute: bool,
	/// Leading `..` steps of a relative path.
	pub parent_steps: usize,
	pub steps: Vec<Step>,
}

impl Atom {
	/// Module prefixes referenced by this atom, in step order.
	pub fn prefixes(&self) -> impl Iterator<Item = &str> {
		self.steps.iter().filter_map(|s| s.prefix.as_deref())
	}
}

const KEYWORDS: &[&str] = &["and", "or", "not", "div", "mod", "true", "false"];

/// Extract every location-path atom from `expr`.
pub fn atoms(expr: &str) -> Vec<Atom> {
	let mut out = Vec::new();
	let chars: Vec<char> = expr.chars().collect();
	let mut idx = 0usize;
	while idx < chars.len() {
		let ch = chars[idx];
		match ch {
			'\'' | '"' => {
				idx += 1;
				while idx < chars.len() && chars[idx] != ch {
					idx += 1;
				}
				idx += 1;
			}
			'/' | '.' => {
				let mut nested = Vec::new();
				let (atom, next) = scan_path(&chars, idx, &mut nested);
				out.extend(atom);
				out.extend(nested);
				idx = next;
			}
			c if is_name_start(c) => {
				let (token, next) = scan_name(&chars, idx);
				if next < chars.len() && chars[next] == '(' {
					// function name, arguments are scanned normally
					idx = next + 1;
					continue;
				}
				if KEYWORDS.contains(&token.as_str()) {
					idx = next;
					continue;
				}
				let mut nested = Vec::new();
				let (atom, next) = scan_path(&chars, idx, &mut nested);
				out.extend(atom);
				out.extend(nested);
				idx = next;
			}
			_ => idx += 1,
		}
	}
	out
}

/// All distinct module prefixes referenced anywhere in `expr`.
pub fn referenced_prefixes(expr: &str) -> Vec<String> {
	let mut out: Vec<String> = Vec::new();
	for atom in atoms(expr) {
		for prefix in atom.prefixes() {
			if !out.iter().any(|p| p == prefix) {
				out.push(prefix.to_string());
			}
		}
	}
	out
}

fn is_name_start(c: char) -> bool {
	c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
	c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn scan_name(chars: &[char], mut idx: usize) -> (String, usize) {
	let mut name = String::new();
	while idx < chars.len() && is_name_char(chars[idx]) {
		name.push(chars[idx]);
		idx += 1;
	}
	(name, idx)
}

/// Scan one location path starting at `idx`. Returns `None` when the text at
/// `idx` turns out not to be a path (a lone `.` or numeric literal). Atoms
/// found inside predicates are appended to `nested`.
fn scan_path(chars: &[char], mut idx: usize, nested: &mut Vec<Atom>) -> (Option<Atom>, usize) {
	let mut atom = Atom {
		absolute: false,
		parent_steps: 0,
		steps: Vec::new(),
	};
	if chars[idx] == '/' {
		atom.absolute = true;
		idx += 1;
	}
	loop {
		// leading ./ and ../ markers
		if idx < chars.len() && chars[idx] == '.' {
			if idx + 1 < chars.len() && chars[idx + 1] == '.' {
				atom.parent_steps += 1;
				idx += 2;
			} else {
				idx += 1;
			}
			if idx < chars.len() && chars[idx] == '/' {
				idx += 1;
				continue;
			}
			break;
		}
		if idx >= chars.len() || !is_name_start(chars[idx]) {
			break;
		}
		let (first, next) = scan_name(chars, idx);
		idx = next;
		let step = if idx < chars.len() && chars[idx] == ':' {
			let (name, next) = scan_name(chars, idx + 1);
			idx = next;
			Step {
				prefix: Some(first),
				name,
			}
		} else {
			Step {
				prefix: None,
				name: first,
			}
		};
		atom.steps.push(step);
		while idx < chars.len() && chars[idx] == '[' {
			let end = skip_predicate(chars, idx);
			if end > idx + 1 {
				let inner: String = chars[idx + 1..end - 1].iter().collect();
				nested.extend(atoms(&inner));
			}
			idx = end;
		}
		if idx < chars.len() && chars[idx] == '/' {
			idx += 1;
			continue;
		}
		break;
	}
	if atom.steps.is_empty() && atom.parent_steps == 0 {
		return (None, idx.max(1));
	}
	(Some(atom), idx)
}

/// Index just past the `]` matching the `[` at `idx`.
fn skip_predicate(chars: &[char], mut idx: usize) -> usize {
	debug_assert_eq!(chars[idx], '[');
	let mut depth = 0usize;
	let mut quote: Option<char> = None;
	while idx < chars.len() {
		let ch = chars[idx];
		match ch {
			'\'' | '"' if quote == Some(ch) => quote = None,
			'\'' | '"' if quote.is_none() => quote = Some(ch),
			'[' if quote.is_none() => depth += 1,
			']' if quote.is_none() => {
				depth -= 1;
				if depth == 0 {
					return idx + 1;
				}
			}
			_ => {}
		}
		idx += 1;
	}
	idx
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_absolute_prefixed_path() {
		let found = atoms("/ietf-interfaces:interfaces/interface/name = 'eth0'");
		assert_eq!(found.len(), 1);
		assert!(found[0].absolute);
		assert_eq!(found[0].steps[0].prefix.as_deref(), Some("ietf-interfaces"));
		assert_eq!(found[0].steps.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), vec![
			"interfaces",
			"interface",
			"name"
		]);
	}

	#[test]
	fn test_relative_with_parent_steps() {
		let found = atoms("../type = 'opt'");
		assert_eq!(found.len(), 1);
		assert!(!found[0].absolute);
		assert_eq!(found[0].parent_steps, 1);
		assert_eq!(found[0].steps[0].name, "type");
	}

	#[test]
	fn test_function_names_are_not_atoms() {
		let found = atoms("count(/m:list) > 2 and not(../flag)");
		assert_eq!(found.len(), 2);
		assert_eq!(found[0].steps[0].prefix.as_deref(), Some("m"));
		assert_eq!(found[1].steps[0].name, "flag");
	}

	#[test]
	fn test_quoted_literals_are_opaque() {
		let found = atoms("name = '/fake:path/inside/string'");
		assert_eq!(found.len(), 1);
		assert_eq!(found[0].steps[0].name, "name");
	}

	#[test]
	fn test_keywords_skipped() {
		let found = atoms("a or b and not(c)");
		let names: Vec<&str> = found.iter().map(|a| a.steps[0].name.as_str()).collect();
		assert_eq!(names, vec!["a", "b", "c"]);
	}

	#[test]
	fn test_predicate_contents_are_scanned() {
		let found = atoms("/m:list[other:id = current()/../ref]/value");
		let prefixes = referenced_prefixes("/m:list[other:id = 3]/value");
		assert_eq!(prefixes, vec!["m".to_string(), "other".to_string()]);
		assert!(found.iter().any(|a| a.steps.first().is_some_and(|s| s.prefix.as_deref() == Some("other"))));
	}

	#[test]
	fn test_referenced_prefixes_deduplicated() {
		let prefixes =
			referenced_prefixes("/fm:a/x = ../local and /fm:b/y != 'z' or /other:c = 1");
		assert_eq!(prefixes, vec!["fm".to_string(), "other".to_string()]);
	}
}
