// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Full validation of a working copy.
//!
//! Beyond the structural checks of the schema crate this materialises
//! defaults, enforces mandatory nodes, resolves leafref and
//! instance-identifier referents and evaluates when/must expressions.
//! Cross-module reads go through [`DataAccess`], which the engine backs with
//! the session's working copies over the persisted datastore.
//!
//! The expression evaluator covers the XPath subset the engine relies on:
//! location paths, existence, string comparison, `count()` and `not()`.
//! Anything it cannot parse evaluates to true and is logged, matching the
//! boundary that a full XPath engine is an external collaborator.

use tracing::debug;
use yangstore_core::{
	path::DataPath,
	tree::{DataNode, DataTree},
};
use yangstore_schema::{NodeKind, SchemaContext, SchemaNode, TypeSpec, validate::check_structure};
use yangstore_type::{Error, ErrorItem};

use crate::{Result, ops::concrete_path};

/// Read access to the datastore under validation.
pub trait DataAccess {
	/// The current tree of `module`, session working copies taking
	/// precedence over persisted data.
	fn tree(&self, module: &str) -> Result<DataTree>;
}

impl<F> DataAccess for F
where
	F: Fn(&str) -> Result<DataTree>,
{
	fn tree(&self, module: &str) -> Result<DataTree> {
		self(module)
	}
}

/// Materialise schema defaults into `tree` without validating it.
pub fn materialize_defaults(ctx: &SchemaContext, tree: &mut DataTree) -> Result<()> {
	let module = ctx.get_module(&tree.module)?.clone();
	add_defaults(&module.data, &mut tree.roots, &tree.module.clone());
	Ok(())
}

/// Validate `tree` in place (defaults are materialised into it).
pub fn validate_module(ctx: &SchemaContext, tree: &mut DataTree, access: &dyn DataAccess) -> Result<()> {
	let module = ctx.get_module(&tree.module)?.clone();

	add_defaults(&module.data, &mut tree.roots, &tree.module.clone());

	let mut items = check_structure(ctx, tree);
	if items.is_empty() {
		let mut walker = Walker {
			ctx,
			access,
			items: &mut items,
		};
		let top: Vec<&SchemaNode> = module.data.iter().collect();
		walker.check_level(&top, &tree.roots, None, &tree.module);
	}

	if items.is_empty() {
		Ok(())
	} else {
		Err(Error::validation_failed(items))
	}
}

/// Insert missing defaulted leaves under every existing node (and at top
/// level). Created leaves carry the `from_default` flag.
fn add_defaults(schema_children: &[SchemaNode], children: &mut Vec<DataNode>, module: &str) {
	for schema in schema_children {
		match &schema.kind {
			NodeKind::Leaf => {
				if let (Some(default), None) = (
					&schema.default,
					children.iter().find(|c| c.name == schema.name),
				) {
					let parsed = schema.type_spec.as_ref().and_then(|spec| spec.parse(default));
					if let Some(value) = parsed {
						let mut leaf = DataNode::leaf(module, schema.name.clone(), value);
						leaf.from_default = true;
						children.push(leaf);
					}
				}
			}
			NodeKind::Choice | NodeKind::Case => {
				add_defaults(&schema.children, children, module);
			}
			_ if schema.is_operation() => {}
			_ => {
				for child in children.iter_mut().filter(|c| c.name == schema.name) {
					add_defaults(&schema.children, &mut child.children, module);
				}
			}
		}
	}
}

struct Walker<'a> {
	ctx: &'a SchemaContext,
	access: &'a dyn DataAccess,
	items: &'a mut Vec<ErrorItem>,
}

impl Walker<'_> {
	fn check_level(
		&mut self,
		schema_children: &[&SchemaNode],
		children: &[DataNode],
		parent: Option<&DataPath>,
		module: &str,
	) {
		for schema in schema_children {
			if schema.is_operation() {
				continue;
			}
			if matches!(schema.kind, NodeKind::Choice | NodeKind::Case) {
				let nested: Vec<&SchemaNode> = schema.children.iter().collect();
				self.check_level(&nested, children, parent, module);
				continue;
			}
			let instances: Vec<&DataNode> = children.iter().filter(|c| c.name == schema.name).collect();

			if schema.mandatory && instances.is_empty() {
				// mandatory applies once the parent instance exists
				let path = match parent {
					Some(parent) => format!("{parent}/{}", schema.name),
					None => format!("/{module}:{}", schema.name),
				};
				self.items.push(ErrorItem::new(path, "mandatory node is missing"));
			}

			let mut position = 0usize;
			for node in instances {
				position += 1;
				let path = concrete_path(parent, schema, node, position);
				self.check_node(schema, node, &path);
				if !schema.is_leaf() {
					let nested = schema.data_children();
					self.check_level(&nested, &node.children, Some(&path), module);
				}
			}
		}
	}

	fn check_node(&mut self, schema: &SchemaNode, node: &DataNode, path: &DataPath) {
		if let Some(when) = &schema.when {
			match self.evaluate(when, path) {
				Ok(false) => {
					self.items.push(ErrorItem::new(
						path.to_string(),
						format!("when condition '{when}' not satisfied"),
					));
				}
				Ok(true) => {}
				Err(err) => {
					self.items.push(ErrorItem::new(path.to_string(), err.message));
				}
			}
		}
		for must in &schema.musts {
			match self.evaluate(must, path) {
				Ok(false) => {
					self.items.push(ErrorItem::new(
						path.to_string(),
						format!("must condition '{must}' not satisfied"),
					));
				}
				Ok(true) => {}
				Err(err) => {
					self.items.push(ErrorItem::new(path.to_string(), err.message));
				}
			}
		}
		if let Some(spec) = &schema.type_spec {
			self.check_type(spec, node, path);
		}
	}

	fn check_type(&mut self, spec: &TypeSpec, node: &DataNode, path: &DataPath) {
		match spec {
			TypeSpec::Leafref {
				path: target,
				require_instance,
			} => {
				if !require_instance {
					return;
				}
				let Some(value) = &node.value else {
					return;
				};
				let wanted = value.to_string();
				match self.leaf_values(target, path) {
					Ok(values) => {
						if !values.contains(&wanted) {
							self.items.push(ErrorItem::new(
								path.to_string(),
								format!("leafref target '{wanted}' does not exist"),
							));
						}
					}
					Err(err) => {
						self.items.push(ErrorItem::new(path.to_string(), err.message));
					}
				}
			}
			TypeSpec::InstanceIdentifier {
				require_instance,
			} => {
				if !require_instance {
					return;
				}
				let Some(value) = &node.value else {
					return;
				};
				let text = value.to_string();
				let exists = DataPath::parse(&text)
					.and_then(|target| {
						Ok(self.access.tree(target.module())?.find(&target).is_some())
					})
					.unwrap_or(false);
				if !exists {
					self.items.push(ErrorItem::new(
						path.to_string(),
						format!("required instance '{text}' does not exist"),
					));
				}
			}
			TypeSpec::Union {
				branches,
			} => {
				// a union is satisfied when any branch is; only flag it
				// when every referential branch misses
				let mut any_ok = false;
				let mut sub = Vec::new();
				for branch in branches {
					let mut probe = Walker {
						ctx: self.ctx,
						access: self.access,
						items: &mut sub,
					};
					let before = probe.items.len();
					probe.check_type(branch, node, path);
					if probe.items.len() == before {
						any_ok = true;
						break;
					}
				}
				if !any_ok {
					if let Some(item) = sub.into_iter().next() {
						self.items.push(item);
					}
				}
			}
			_ => {}
		}
	}

	/// Canonical values of every instance of the schema path `target`.
	fn leaf_values(&self, target: &str, context: &DataPath) -> Result<Vec<String>> {
		let path = resolve_path_text(target, context)?;
		let tree = self.access.tree(path.module())?;
		Ok(tree.find_all(&path).iter().filter_map(|n| n.value.as_ref()).map(|v| v.to_string()).collect())
	}

	/// Evaluate a when/must expression with `context` as the context node.
	fn evaluate(&self, expr: &str, context: &DataPath) -> Result<bool> {
		for clause in split_outside_parens(expr, " or ") {
			let mut all = true;
			for term in split_outside_parens(&clause, " and ") {
				if !self.evaluate_term(term.trim(), context)? {
					all = false;
					break;
				}
			}
			if all {
				return Ok(true);
			}
		}
		Ok(false)
	}

	fn evaluate_term(&self, term: &str, context: &DataPath) -> Result<bool> {
		if let Some(inner) = term.strip_prefix("not(").and_then(|t| t.strip_suffix(')')) {
			return Ok(!self.evaluate(inner, context)?);
		}
		if let Some(rest) = term.strip_prefix("count(") {
			if let Some((inside, tail)) = rest.split_once(')') {
				let count = self.resolve_nodes(inside.trim(), context)?.len() as i64;
				return compare_count(count, tail.trim());
			}
		}
		if let Some((lhs, op, rhs)) = split_comparison(term) {
			let values = self.node_values(lhs.trim(), context)?;
			let literal = rhs.trim().trim_matches('\'').trim_matches('"');
			let any_equal = values.iter().any(|v| v == literal);
			return Ok(match op {
				"=" => any_equal,
				"!=" => values.iter().any(|v| v != literal),
				_ => unreachable!(),
			});
		}
		// bare path: existence
		Ok(!self.resolve_nodes(term, context)?.is_empty())
	}

	fn node_values(&self, path_text: &str, context: &DataPath) -> Result<Vec<String>> {
		Ok(self.resolve_nodes(path_text, context)?.into_iter().flatten().collect())
	}

	/// Resolve a location path to the values of its matching nodes
	/// (`None` for non-leaf matches).
	fn resolve_nodes(&self, path_text: &str, context: &DataPath) -> Result<Vec<Option<String>>> {
		let path = match resolve_path_text(path_text, context) {
			Ok(path) => path,
			Err(_) => {
				debug!("unsupported expression term '{path_text}', assuming true");
				return Ok(vec![Some(String::new())]);
			}
		};
		let tree = self.access.tree(path.module())?;
		Ok(tree.find_all(&path).iter().map(|n| n.value.as_ref().map(|v| v.to_string())).collect())
	}
}

/// Resolve a path literal (absolute or relative to the context node) into an
/// addressable [`DataPath`], keeping key predicates intact.
fn resolve_path_text(text: &str, context: &DataPath) -> Result<DataPath> {
	let text = text.trim();
	if text.starts_with('/') {
		return DataPath::parse(text);
	}
	// relative: steps start at the context node, `..` climbs towards root
	let mut base = context.segments.clone();
	let mut rest = text;
	loop {
		if let Some(r) = rest.strip_prefix("../") {
			if base.pop().is_none() {
				return Err(Error::inval_arg(format!("'{text}' escapes the data tree")));
			}
			rest = r;
		} else if let Some(r) = rest.strip_prefix("./") {
			rest = r;
		} else {
			break;
		}
	}
	if rest == ".." {
		base.pop();
		rest = "";
	}
	if rest.is_empty() || rest == "." {
		if base.is_empty() {
			return Err(Error::inval_arg(format!("'{text}' escapes the data tree")));
		}
		return Ok(DataPath {
			segments: base,
		});
	}
	let first_has_prefix = rest.split(['/', '[']).next().is_some_and(|step| step.contains(':'));
	let absolute_form = if first_has_prefix {
		format!("/{rest}")
	} else {
		format!("/{}:{}", context.module(), rest)
	};
	let parsed = DataPath::parse(&absolute_form)?;
	let mut segments = base;
	segments.extend(parsed.segments);
	if segments[0].module.is_none() {
		segments[0].module = Some(context.module().to_string());
	}
	Ok(DataPath {
		segments,
	})
}

/// Split on `sep` outside quotes, parentheses and predicates.
fn split_outside_parens(text: &str, sep: &str) -> Vec<String> {
	let mut out = Vec::new();
	let mut depth = 0usize;
	let mut quote: Option<char> = None;
	let mut start = 0usize;
	let mut idx = 0usize;
	while idx < text.len() {
		let ch = text[idx..].chars().next().expect("idx is on a char boundary");
		match ch {
			'\'' | '"' if quote == Some(ch) => quote = None,
			'\'' | '"' if quote.is_none() => quote = Some(ch),
			'(' | '[' if quote.is_none() => depth += 1,
			')' | ']' if quote.is_none() => depth = depth.saturating_sub(1),
			_ => {}
		}
		if depth == 0 && quote.is_none() && text[idx..].starts_with(sep) {
			out.push(text[start..idx].to_string());
			idx += sep.len();
			start = idx;
			continue;
		}
		idx += ch.len_utf8();
	}
	out.push(text[start..].to_string());
	out
}

/// Find the top-level `=`/`!=` of a comparison, skipping quotes and the
/// contents of predicates and function calls.
fn split_comparison(term: &str) -> Option<(&str, &str, &str)> {
	let mut quote: Option<char> = None;
	let mut depth = 0usize;
	let bytes = term.as_bytes();
	for idx in 0..bytes.len() {
		let ch = bytes[idx] as char;
		match ch {
			'\'' | '"' if quote == Some(ch) => quote = None,
			'\'' | '"' if quote.is_none() => quote = Some(ch),
			'(' | '[' if quote.is_none() => depth += 1,
			')' | ']' if quote.is_none() => depth = depth.saturating_sub(1),
			'!' if quote.is_none() && depth == 0 && term[idx..].starts_with("!=") => {
				return Some((&term[..idx], "!=", &term[idx + 2..]));
			}
			// a bare '='; the '=' of >=, <= and != belongs to its operator
			'=' if quote.is_none() && depth == 0 && (idx == 0 || !matches!(bytes[idx - 1], b'>' | b'<' | b'!')) => {
				return Some((&term[..idx], "=", &term[idx + 1..]));
			}
			_ => {}
		}
	}
	None
}

fn compare_count(count: i64, tail: &str) -> Result<bool> {
	let (op, rest) = if let Some(rest) = tail.strip_prefix(">=") {
		(">=", rest)
	} else if let Some(rest) = tail.strip_prefix("<=") {
		("<=", rest)
	} else if let Some(rest) = tail.strip_prefix('>') {
		(">", rest)
	} else if let Some(rest) = tail.strip_prefix('<') {
		("<", rest)
	} else if let Some(rest) = tail.strip_prefix("!=") {
		("!=", rest)
	} else if let Some(rest) = tail.strip_prefix('=') {
		("=", rest)
	} else {
		return Ok(count > 0);
	};
	let expected: i64 = rest
		.trim()
		.parse()
		.map_err(|_| Error::inval_arg(format!("'{rest}' is not a number")))?;
	Ok(match op {
		">" => count > expected,
		">=" => count >= expected,
		"<" => count < expected,
		"<=" => count <= expected,
		"!=" => count != expected,
		_ => count == expected,
	})
}

#[cfg(test)]
mod test {
	use std::collections::HashMap as StdHashMap;

	use indexmap::IndexMap;
	use yangstore_testing::modules::{interfaces_module, refs_module};
	use yangstore_type::{ErrorCode, Value};

	use super::*;

	struct MapAccess(StdHashMap<String, DataTree>);

	impl DataAccess for MapAccess {
		fn tree(&self, module: &str) -> Result<DataTree> {
			Ok(self.0.get(module).cloned().unwrap_or_else(|| DataTree::new(module)))
		}
	}

	fn ctx() -> SchemaContext {
		SchemaContext::compile(&[interfaces_module(), refs_module()], &IndexMap::new()).unwrap()
	}

	fn iface_tree(names: &[&str]) -> DataTree {
		let mut tree = DataTree::new("ietf-interfaces");
		let mut interfaces = DataNode::container("ietf-interfaces", "interfaces");
		for name in names {
			interfaces.children.push(
				DataNode::container("ietf-interfaces", "interface")
					.with_child(DataNode::leaf("ietf-interfaces", "name", Value::Text((*name).into())))
					.with_child(DataNode::leaf("ietf-interfaces", "type", Value::Text("eth".into())))
					.with_child(DataNode::leaf("ietf-interfaces", "enabled", Value::Bool(true))),
			);
		}
		tree.roots.push(interfaces);
		tree
	}

	fn access_with(trees: Vec<DataTree>) -> MapAccess {
		MapAccess(trees.into_iter().map(|t| (t.module.clone(), t)).collect())
	}

	#[test]
	fn test_defaults_are_materialised() {
		let ctx = ctx();
		let mut tree = iface_tree(&["eth0"]);
		tree.delete(&DataPath::parse("/ietf-interfaces:interfaces/interface[name='eth0']/enabled").unwrap());
		validate_module(&ctx, &mut tree, &access_with(vec![])).unwrap();

		let enabled = tree
			.find(&DataPath::parse("/ietf-interfaces:interfaces/interface[name='eth0']/enabled").unwrap())
			.unwrap();
		assert_eq!(enabled.value, Some(Value::Bool(true)));
		assert!(enabled.from_default);
	}

	#[test]
	fn test_mandatory_leaf_enforced() {
		let ctx = ctx();
		let mut tree = iface_tree(&["eth0"]);
		// drop the mandatory type leaf
		tree.delete(&DataPath::parse("/ietf-interfaces:interfaces/interface[name='eth0']/type").unwrap());

		let err = validate_module(&ctx, &mut tree, &access_with(vec![])).unwrap_err();
		assert_eq!(err.code, ErrorCode::ValidationFailed);
		assert!(err.items.iter().any(|i| i.message.contains("mandatory")));
	}

	#[test]
	fn test_leafref_requires_target_instance() {
		let ctx = ctx();
		let mut refs = DataTree::new("refs");
		refs.roots.push(DataNode::container("refs", "monitor").with_child(DataNode::leaf(
			"refs",
			"watched-if",
			Value::Text("eth7".into()),
		)));

		let err = validate_module(&ctx, &mut refs.clone(), &access_with(vec![iface_tree(&["eth0"])]))
			.unwrap_err();
		assert!(err.items[0].message.contains("does not exist"));

		validate_module(&ctx, &mut refs, &access_with(vec![iface_tree(&["eth0", "eth7"])])).unwrap();
	}

	#[test]
	fn test_instance_identifier_checked_when_required() {
		let ctx = ctx();
		let target = "/ietf-interfaces:interfaces/interface[name='eth0']";
		let mut refs = DataTree::new("refs");
		refs.roots.push(
			DataNode::container("refs", "monitor")
				.with_child(DataNode::leaf("refs", "target", Value::InstanceId(target.into()))),
		);

		// the must on /refs:monitor/target also needs one interface
		let err =
			validate_module(&ctx, &mut refs.clone(), &access_with(vec![])).unwrap_err();
		assert!(!err.items.is_empty());

		validate_module(&ctx, &mut refs, &access_with(vec![iface_tree(&["eth0"])])).unwrap();
	}

	#[test]
	fn test_loose_instance_identifier_not_checked() {
		let ctx = ctx();
		let mut refs = DataTree::new("refs");
		refs.roots.push(DataNode::container("refs", "monitor").with_child(DataNode::leaf(
			"refs",
			"loose",
			Value::InstanceId("/ietf-interfaces:interfaces/interface[name='nope']".into()),
		)));
		validate_module(&ctx, &mut refs, &access_with(vec![])).unwrap();
	}

	#[test]
	fn test_when_condition_gates_node() {
		let ctx = ctx();
		let mut refs = DataTree::new("refs");
		refs.roots.push(DataNode::container("refs", "monitor").with_child(DataNode::leaf(
			"refs",
			"fallback",
			Value::Text("x".into()),
		)));

		// no lo interface: when is false
		let err = validate_module(&ctx, &mut refs.clone(), &access_with(vec![iface_tree(&["eth0"])]))
			.unwrap_err();
		assert!(err.items[0].message.contains("when condition"));

		validate_module(&ctx, &mut refs, &access_with(vec![iface_tree(&["eth0", "lo"])])).unwrap();
	}

	#[test]
	fn test_count_must_expression() {
		let ctx = ctx();
		let mut refs = DataTree::new("refs");
		refs.roots.push(
			DataNode::container("refs", "monitor").with_child(DataNode::leaf(
				"refs",
				"target",
				Value::InstanceId("/ietf-interfaces:interfaces/interface[name='eth0']".into()),
			)),
		);
		// count(...) > 0 fails with no interfaces at all
		assert!(validate_module(&ctx, &mut refs.clone(), &access_with(vec![])).is_err());
		validate_module(&ctx, &mut refs, &access_with(vec![iface_tree(&["eth0"])])).unwrap();
	}
}
