// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Session reads: items, subtrees and subtree chunks.
//!
//! Reads see the persisted datastore under a shared lock; the operational
//! datastore is assembled by the composer. Matched nodes come back with
//! concrete, re-addressable paths (key predicates for keyed lists, 1-based
//! positions for keyless lists and leaf-lists).

use std::collections::HashMap;

use yangstore_core::{
	interface::Datastore,
	path::DataPath,
	tree::{DataNode, DataTree},
};
use yangstore_schema::{SchemaContext, SchemaNode};
use yangstore_transaction::{LockMode, concrete_path};
use yangstore_type::{Error, Origin, Value};

use crate::{Result, session::Session};

/// One matched node of a read.
#[derive(Clone, Debug, PartialEq)]
pub struct Item {
	pub path: DataPath,
	pub value: Option<Value>,
	pub origin: Option<Origin>,
}

impl Session {
	/// The single node at `path`.
	pub fn get_item(&self, path: &str) -> Result<Item> {
		let path = DataPath::parse(path)?;
		let tree = self.read_tree(path.module())?;
		let ctx = self.engine.registry.context();
		let mut matches = matches_with_paths(&ctx, &tree, &path)?;
		match matches.len() {
			0 => Err(Error::not_found(format!("'{path}' does not exist"))),
			1 => {
				let (path, node) = matches.remove(0);
				Ok(Item {
					path,
					value: node.value.clone(),
					origin: node.origin,
				})
			}
			_ => Err(Error::inval_arg(format!("'{path}' matches more than one node"))),
		}
	}

	/// Every node matched by `xpath` (the final segment may be `*`).
	pub fn get_items(&self, xpath: &str) -> Result<Vec<Item>> {
		let path = DataPath::parse(xpath)?;
		let tree = self.read_tree(path.module())?;
		let ctx = self.engine.registry.context();
		Ok(matches_with_paths(&ctx, &tree, &path)?
			.into_iter()
			.map(|(path, node)| Item {
				path,
				value: node.value.clone(),
				origin: node.origin,
			})
			.collect())
	}

	/// The subtree rooted at every match of `path`, with ancestors.
	pub fn get_subtree(&self, path: &str) -> Result<DataTree> {
		let path = DataPath::parse(path)?;
		let tree = self.read_tree(path.module())?;
		let subtree = tree.extract(std::slice::from_ref(&path));
		if subtree.is_empty() {
			return Err(Error::not_found(format!("'{path}' does not exist")));
		}
		Ok(subtree)
	}

	/// A bounded cut of the subtree at `xpath`.
	///
	/// The returned root is the node at `xpath`; the second level skips
	/// `offset` children and carries at most `child_limit`, deeper levels
	/// at most `child_limit` from index 0; the total depth is bounded by
	/// `depth_limit` with the root counting as level one. Zero limits mean
	/// unbounded. Children follow schema declaration order.
	pub fn get_subtree_chunk(
		&self,
		xpath: &str,
		single: bool,
		offset: usize,
		child_limit: usize,
		depth_limit: usize,
	) -> Result<DataTree> {
		let path = DataPath::parse(xpath)?;
		let tree = self.read_tree(path.module())?;
		let ctx = self.engine.registry.context();

		let matches = matches_with_paths(&ctx, &tree, &path)?;
		if matches.is_empty() {
			return Err(Error::not_found(format!("'{xpath}' does not exist")));
		}
		if single && matches.len() > 1 {
			return Err(Error::inval_arg(format!(
				"'{xpath}' matches {} nodes but a single chunk root was requested",
				matches.len()
			)));
		}

		let (root_path, root) = &matches[0];
		let root_schema = ctx.resolve(root_path)?;
		let mut chunk = (*root).clone();
		trim_chunk(root_schema, &mut chunk, 2, offset, child_limit, depth_limit);

		let mut out = DataTree::new(tree.module.clone());
		out.roots.push(chunk);
		Ok(out)
	}

	/// The full tree of `module` as this session sees it: persisted data
	/// for conventional datastores, the composed view for operational.
	pub(crate) fn read_tree(&self, module: &str) -> Result<DataTree> {
		self.check_access(module, false)?;
		if self.datastore() == Datastore::Operational {
			return crate::oper::compose(&self.engine, module);
		}
		self.engine.locks.acquire(
			self.id(),
			module,
			self.datastore(),
			LockMode::Shared,
			self.engine.config.read_lock_timeout,
		)?;
		let result = self.load_store(module);
		self.engine.locks.release(self.id(), module, self.datastore(), LockMode::Shared);
		result
	}
}

/// Trim `node`'s children in place. `level` is the depth of the children
/// being trimmed (the chunk root is level 1).
fn trim_chunk(
	schema: &SchemaNode,
	node: &mut DataNode,
	level: usize,
	offset: usize,
	child_limit: usize,
	depth_limit: usize,
) {
	if depth_limit != 0 && level > depth_limit {
		node.children.clear();
		return;
	}
	sort_by_schema(schema, &mut node.children);
	let skip = if level == 2 {
		offset
	} else {
		0
	};
	if skip > 0 {
		node.children.drain(..skip.min(node.children.len()));
	}
	if child_limit != 0 && node.children.len() > child_limit {
		node.children.truncate(child_limit);
	}
	for child in &mut node.children {
		if let Some(child_schema) = schema.data_child(&child.name) {
			trim_chunk(child_schema, child, level + 1, offset, child_limit, depth_limit);
		}
	}
}

/// Stable-sort `children` into schema declaration order.
fn sort_by_schema(schema: &SchemaNode, children: &mut [DataNode]) {
	let order: HashMap<&str, usize> =
		schema.data_children().iter().enumerate().map(|(idx, s)| (s.name.as_str(), idx)).collect();
	children.sort_by_key(|c| order.get(c.name.as_str()).copied().unwrap_or(usize::MAX));
}

/// Resolve `xpath` against `tree`, producing concrete paths alongside the
/// matched nodes. Traversal order is document order.
pub(crate) fn matches_with_paths<'t>(
	ctx: &SchemaContext,
	tree: &'t DataTree,
	xpath: &DataPath,
) -> Result<Vec<(DataPath, &'t DataNode)>> {
	let module = ctx.get_module(&tree.module)?;
	let mut frontier: Vec<(Option<DataPath>, Option<&SchemaNode>, &'t [DataNode], String)> =
		vec![(None, None, tree.roots.as_slice(), tree.module.clone())];
	let mut out = Vec::new();

	for (idx, segment) in xpath.segments.iter().enumerate() {
		let last = idx + 1 == xpath.segments.len();
		let mut next = Vec::new();
		for (parent_path, parent_schema, children, inherited) in &frontier {
			let mut matched_count: HashMap<&str, usize> = HashMap::new();
			for child in children.iter() {
				let wildcard = segment.name == "*";
				if !wildcard && !segment_matches(child, segment, inherited) {
					continue;
				}
				let schema = match parent_schema {
					Some(schema) => schema.data_child(&child.name),
					None => module.top_data_node(&child.name),
				};
				let Some(schema) = schema else {
					continue;
				};
				let count = matched_count.entry(child.name.as_str()).or_insert(0);
				*count += 1;
				if !wildcard {
					if let Some(position) = segment.position {
						if *count != position {
							continue;
						}
					}
				}
				let path = concrete_path(parent_path.as_ref(), schema, child, *count);
				if last {
					out.push((path, child));
				} else {
					next.push((
						Some(path),
						Some(schema),
						child.children.as_slice(),
						child.module.clone(),
					));
				}
			}
		}
		frontier = next;
	}
	Ok(out)
}

fn segment_matches(node: &DataNode, segment: &yangstore_core::path::PathSegment, inherited: &str) -> bool {
	if node.name != segment.name {
		return false;
	}
	let wanted = segment.module.as_deref().unwrap_or(inherited);
	if node.module != wanted {
		return false;
	}
	segment.keys.iter().all(|(key, value)| {
		node.children
			.iter()
			.find(|c| c.name == *key && c.value.is_some())
			.and_then(|c| c.value.as_ref())
			.is_some_and(|v| v.to_string() == *value)
	})
}
