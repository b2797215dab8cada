// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! The compiled schema context.
//!
//! A [`SchemaContext`] is immutable once compiled and shared behind an `Arc`;
//! module lifecycle builds a tentative replacement off to the side and swaps
//! it in only after the registry commit succeeds.

use indexmap::IndexMap;
use yangstore_core::path::DataPath;
use yangstore_type::Error;

use crate::{
	Result,
	module::ModuleDef,
	node::{NodeKind, SchemaNode},
};

/// One module after compilation: features pruned, nodes partitioned.
#[derive(Clone, Debug, PartialEq)]
pub struct ModuleSchema {
	pub name: String,
	pub revision: Option<String>,
	pub imports: Vec<String>,
	pub includes: Vec<String>,
	pub enabled_features: Vec<String>,
	/// Top-level data nodes in declaration order.
	pub data: Vec<SchemaNode>,
	pub rpcs: Vec<SchemaNode>,
	pub notifications: Vec<SchemaNode>,
}

impl ModuleSchema {
	/// Find a top-level data node, descending through choice/case.
	pub fn top_data_node(&self, name: &str) -> Option<&SchemaNode> {
		let mut out = Vec::new();
		crate::node::collect_data_children(&self.data, &mut out);
		out.into_iter().find(|n| n.name == name)
	}

	pub fn rpc(&self, name: &str) -> Option<&SchemaNode> {
		self.rpcs.iter().find(|n| n.name == name)
	}

	pub fn notification(&self, name: &str) -> Option<&SchemaNode> {
		self.notifications.iter().find(|n| n.name == name)
	}
}

/// An immutable set of compiled modules, indexed by name.
#[derive(Clone, Debug, Default)]
pub struct SchemaContext {
	modules: IndexMap<String, ModuleSchema>,
}

impl SchemaContext {
	/// Compile `defs` with the given per-module enabled features.
	///
	/// Fails when an import names a module outside the set, when a list key
	/// does not exist, or when a leafref target module is unknown. Feature
	/// pruning drops every subtree whose `if-feature`s are not all enabled.
	pub fn compile(defs: &[ModuleDef], features: &IndexMap<String, Vec<String>>) -> Result<SchemaContext> {
		let mut modules = IndexMap::new();
		for def in defs {
			for import in &def.imports {
				if !defs.iter().any(|d| d.name == *import) {
					return Err(Error::schema(format!(
						"module '{}' imports unknown module '{}'",
						def.name, import
					)));
				}
			}
			for include in &def.includes {
				if !defs.iter().any(|d| d.name == *include) {
					return Err(Error::schema(format!(
						"module '{}' includes unknown module '{}'",
						def.name, include
					)));
				}
			}
			let enabled = features.get(&def.name).cloned().unwrap_or_default();
			for feature in &enabled {
				if !def.features.contains(feature) {
					return Err(Error::schema(format!(
						"module '{}' does not declare feature '{}'",
						def.name, feature
					)));
				}
			}

			let mut data = Vec::new();
			let mut rpcs = Vec::new();
			let mut notifications = Vec::new();
			for node in &def.nodes {
				let Some(pruned) = prune(node, &enabled) else {
					continue;
				};
				match pruned.kind {
					NodeKind::Rpc => rpcs.push(pruned),
					NodeKind::Notification => notifications.push(pruned),
					_ => data.push(pruned),
				}
			}
			check_nodes(&def.name, &data, defs)?;

			modules.insert(def.name.clone(), ModuleSchema {
				name: def.name.clone(),
				revision: def.revision.clone(),
				imports: def.imports.clone(),
				includes: def.includes.clone(),
				enabled_features: enabled,
				data,
				rpcs,
				notifications,
			});
		}
		Ok(SchemaContext {
			modules,
		})
	}

	pub fn module(&self, name: &str) -> Option<&ModuleSchema> {
		self.modules.get(name)
	}

	pub fn get_module(&self, name: &str) -> Result<&ModuleSchema> {
		self.module(name).ok_or_else(|| Error::not_found(format!("module '{name}' is not installed")))
	}

	pub fn modules(&self) -> impl Iterator<Item = &ModuleSchema> {
		self.modules.values()
	}

	pub fn has_module(&self, name: &str) -> bool {
		self.modules.contains_key(name)
	}

	/// Resolve a data path to its schema node.
	///
	/// The final segment may also name an rpc or action (for operation
	/// dispatch); interior segments must be data nodes.
	pub fn resolve(&self, path: &DataPath) -> Result<&SchemaNode> {
		let module = self.get_module(path.module())?;
		let mut current: Option<&SchemaNode> = None;
		for segment in &path.segments {
			let next = match current {
				None => {
					let top = module.top_data_node(&segment.name).or_else(|| {
						module.rpc(&segment.name).or_else(|| module.notification(&segment.name))
					});
					top
				}
				Some(node) => node.data_child(&segment.name).or_else(|| {
					// actions nest under data nodes
					node.children.iter().find(|c| {
						matches!(c.kind, NodeKind::Action) && c.name == segment.name
					})
				}),
			};
			current = Some(next.ok_or_else(|| {
				Error::schema(format!("path '{path}' does not match the schema of '{}'", module.name))
			})?);
		}
		current.ok_or_else(|| Error::inval_arg("empty path"))
	}

	/// Canonical JSON-qualified schema path of `trail` within `module`
	/// (no predicates, module prefix on the first segment only).
	pub fn schema_path(module: &str, trail: &[&str]) -> String {
		let mut out = String::new();
		for (idx, name) in trail.iter().enumerate() {
			out.push('/');
			if idx == 0 {
				out.push_str(module);
				out.push(':');
			}
			out.push_str(name);
		}
		out
	}
}

/// Clone `node` minus feature-disabled subtrees. `None` when the node itself
/// is disabled.
fn prune(node: &SchemaNode, enabled: &[String]) -> Option<SchemaNode> {
	if !node.if_features.iter().all(|f| enabled.contains(f)) {
		return None;
	}
	let mut pruned = node.clone();
	pruned.children = node.children.iter().filter_map(|c| prune(c, enabled)).collect();
	Some(pruned)
}

/// Structural checks after pruning: list keys exist, leafref targets name
/// known modules.
fn check_nodes(module: &str, nodes: &[SchemaNode], defs: &[ModuleDef]) -> Result<()> {
	for node in nodes {
		if let NodeKind::List {
			keys, ..
		} = &node.kind
		{
			for key in keys {
				if node.data_child(key).is_none_or(|k| !k.is_leaf()) {
					return Err(Error::schema(format!(
						"list '{}' in module '{}' is missing key leaf '{}'",
						node.name, module, key
					)));
				}
			}
		}
		if let Some(crate::node::TypeSpec::Leafref {
			path, ..
		}) = &node.type_spec
		{
			if let Some(target) = leafref_target_module(path) {
				if target != module && !defs.iter().any(|d| d.name == target) {
					return Err(Error::schema(format!(
						"leafref '{}' in module '{}' targets unknown module '{}'",
						path, module, target
					)));
				}
			}
		}
		check_nodes(module, &node.children, defs)?;
	}
	Ok(())
}

/// The module prefix of the first qualified step of a leafref path, if any.
pub fn leafref_target_module(path: &str) -> Option<String> {
	for step in path.split('/') {
		if let Some((prefix, _)) = step.split_once(':') {
			if !prefix.is_empty() && !prefix.starts_with('.') {
				return Some(prefix.to_string());
			}
		}
	}
	None
}
