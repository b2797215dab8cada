// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Application of buffered session operations to a working copy.
//!
//! Every operation is schema-checked at application time so a bad edit is
//! rejected while buffering, not at commit. The same code path serves
//! op replay when a session refreshes against a changed baseline.

use std::collections::HashMap;

use yangstore_core::{
	edit::{DefaultOp, EditOp},
	path::DataPath,
	tree::{DataNode, DataTree},
};
use yangstore_schema::{NodeKind, SchemaContext, SchemaNode};
use yangstore_type::Error;

use crate::Result;

/// One buffered operation plus its replay error flag.
#[derive(Clone, Debug)]
pub struct BufferedOp {
	pub op: EditOp,
	pub has_error: bool,
}

impl BufferedOp {
	pub fn new(op: EditOp) -> Self {
		Self {
			op,
			has_error: false,
		}
	}
}

/// Apply one operation to the working copy of its module.
pub fn apply_op(ctx: &SchemaContext, tree: &mut DataTree, op: &EditOp) -> Result<()> {
	debug_assert_eq!(op.module(), tree.module);
	match op {
		EditOp::Set {
			path,
			value,
			options,
		} => {
			let schema = ctx.resolve(path)?;
			match &schema.kind {
				NodeKind::Leaf => {
					let value = value
						.clone()
						.ok_or_else(|| Error::inval_arg(format!("'{path}' requires a value")))?;
					let accepted = schema.type_spec.as_ref().is_none_or(|spec| spec.accepts(&value));
					if !accepted {
						return Err(Error::inval_arg(format!(
							"value '{value}' is invalid for '{path}'"
						)));
					}
					if let Some(existing) = tree.find(path) {
						if options.strict {
							return Err(Error::data_exists(format!("'{path}' already exists")));
						}
						let unchanged = existing.value.as_ref() == Some(&value);
						if existing.from_default && unchanged && !options.default_may_replace_default
						{
							return Ok(());
						}
					}
					let node = tree.ensure(path, options.non_recursive)?;
					node.value = Some(value);
					node.from_default = false;
					coerce_path_keys(ctx, tree, path)?;
				}
				NodeKind::LeafList {
					..
				} => {
					let value = value
						.clone()
						.ok_or_else(|| Error::inval_arg(format!("'{path}' requires a value")))?;
					let exists = tree
						.find_all(path)
						.iter()
						.any(|n| n.value.as_ref() == Some(&value));
					if exists {
						if options.strict {
							return Err(Error::data_exists(format!(
								"'{path}' already holds '{value}'"
							)));
						}
						return Ok(());
					}
					let parent = path.parent();
					let (module, name) = (
						path.last().module.clone().unwrap_or_else(|| path.module().to_string()),
						path.last().name.clone(),
					);
					let children = match &parent {
						Some(parent_path) => {
							&mut tree.ensure(parent_path, options.non_recursive)?.children
						}
						None => &mut tree.roots,
					};
					children.push(DataNode::leaf(module, name, value));
					if let Some(parent_path) = &parent {
						coerce_path_keys(ctx, tree, parent_path)?;
					}
				}
				NodeKind::List {
					..
				}
				| NodeKind::Container {
					..
				} => {
					if value.is_some() {
						return Err(Error::inval_arg(format!("'{path}' does not take a value")));
					}
					if tree.find(path).is_some() {
						if options.strict {
							return Err(Error::data_exists(format!("'{path}' already exists")));
						}
						return Ok(());
					}
					tree.ensure(path, options.non_recursive)?;
					coerce_path_keys(ctx, tree, path)?;
				}
				_ => {
					return Err(Error::inval_arg(format!("'{path}' is not an editable node")));
				}
			}
			Ok(())
		}
		EditOp::Delete {
			path,
			options,
		} => {
			ctx.resolve(path)?;
			let removed = tree.delete(path);
			if !removed && options.strict {
				return Err(Error::data_missing(format!("'{path}' does not exist")));
			}
			Ok(())
		}
		EditOp::Move {
			path,
			position,
			options: _,
		} => {
			let schema = ctx.resolve(path)?;
			if !schema.is_user_ordered() {
				return Err(Error::inval_arg(format!("'{path}' is not user-ordered")));
			}
			tree.move_entry(path, position)
		}
		EditOp::EditBatch {
			tree: batch,
			default_op,
		} => {
			let module = ctx.get_module(&batch.module)?;
			for root in &batch.roots {
				let schema = module.top_data_node(&root.name).ok_or_else(|| {
					Error::schema(format!(
						"'/{}:{}' does not match the schema",
						root.module, root.name
					))
				})?;
				apply_batch_node(schema, &mut tree.roots, root, *default_op)?;
			}
			Ok(())
		}
		EditOp::ReplaceConfig {
			tree: replacement,
		} => {
			let mut roots = replacement.roots.clone();
			for root in &mut roots {
				root.strip_meta();
			}
			tree.roots = roots;
			Ok(())
		}
	}
}

/// Key predicates create key leaves as text; re-type them per the schema so
/// canonical comparison and validation see properly typed values.
fn coerce_path_keys(ctx: &SchemaContext, tree: &mut DataTree, path: &DataPath) -> Result<()> {
	for depth in 1..=path.segments.len() {
		if path.segments[depth - 1].keys.is_empty() {
			continue;
		}
		let sub = DataPath {
			segments: path.segments[..depth].to_vec(),
		};
		let schema = ctx.resolve(&sub)?;
		let Some(keys) = schema.list_keys() else {
			continue;
		};
		let Some(node) = tree.get_mut(&sub) else {
			continue;
		};
		for key in keys {
			let Some(spec) =
				schema.data_child(key).and_then(|leaf_schema| leaf_schema.type_spec.clone())
			else {
				continue;
			};
			let Some(leaf) = node.children.iter_mut().find(|c| c.name == *key) else {
				continue;
			};
			if let Some(yangstore_type::Value::Text(text)) = leaf.value.clone() {
				if let Some(parsed) = spec.parse(&text) {
					leaf.value = Some(parsed);
				}
			}
		}
	}
	Ok(())
}

/// Merge/replace/remove one batch node into the sibling set `dst`.
fn apply_batch_node(
	schema: &SchemaNode,
	dst: &mut Vec<DataNode>,
	src: &DataNode,
	default_op: DefaultOp,
) -> Result<()> {
	let existing = find_instance(schema, dst, src);
	match default_op {
		DefaultOp::Remove => {
			if let Some(idx) = existing {
				if src.children.iter().any(|c| !is_key_leaf(schema, c)) {
					// descend: only the listed descendants are removed
					let node = &mut dst[idx];
					for child in &src.children {
						if is_key_leaf(schema, child) {
							continue;
						}
						let child_schema = schema.data_child(&child.name).ok_or_else(|| {
							Error::schema(format!("'{}' does not match the schema", child.name))
						})?;
						apply_batch_node(child_schema, &mut node.children, child, default_op)?;
					}
				} else {
					dst.remove(idx);
				}
			}
			Ok(())
		}
		DefaultOp::Replace => {
			if let Some(idx) = existing {
				dst.remove(idx);
			}
			let mut clone = src.clone();
			clone.strip_meta();
			dst.push(clone);
			Ok(())
		}
		DefaultOp::Merge => {
			let idx = match existing {
				Some(idx) => idx,
				None => {
					let mut clone = src.clone();
					clone.strip_meta();
					dst.push(clone);
					return Ok(());
				}
			};
			if schema.is_leaf() {
				dst[idx].value = src.value.clone();
				dst[idx].from_default = false;
				return Ok(());
			}
			for child in &src.children {
				let child_schema = schema.data_child(&child.name).ok_or_else(|| {
					Error::schema(format!("'{}' does not match the schema", child.name))
				})?;
				let node = &mut dst[idx];
				apply_batch_node(child_schema, &mut node.children, child, default_op)?;
			}
			Ok(())
		}
	}
}

/// Locate the instance of `src` among `dst` siblings: lists by key values,
/// leaf-lists by value, everything else by name.
fn find_instance(schema: &SchemaNode, dst: &[DataNode], src: &DataNode) -> Option<usize> {
	match &schema.kind {
		NodeKind::List {
			keys, ..
		} if !keys.is_empty() => dst.iter().position(|d| {
			d.name == src.name
				&& keys.iter().all(|key| {
					let a = d.child_leaf(key).and_then(|l| l.value.as_ref());
					let b = src.child_leaf(key).and_then(|l| l.value.as_ref());
					a.is_some() && a == b
				})
		}),
		// keyless list entries cannot be identified; merge appends
		NodeKind::List {
			..
		} => None,
		NodeKind::LeafList {
			..
		} => dst.iter().position(|d| d.name == src.name && d.value == src.value),
		_ => dst.iter().position(|d| d.name == src.name && d.module == src.module),
	}
}

fn is_key_leaf(list_schema: &SchemaNode, node: &DataNode) -> bool {
	list_schema.list_keys().is_some_and(|keys| keys.iter().any(|k| *k == node.name))
}

/// Re-apply buffered operations against freshly loaded baselines.
///
/// With `continue_on_error`, failing operations are flagged and reported but
/// the rest still apply; otherwise the first failure aborts the replay.
pub fn replay_ops(
	ctx: &SchemaContext,
	trees: &mut HashMap<String, DataTree>,
	ops: &mut [BufferedOp],
	continue_on_error: bool,
) -> Result<Vec<(usize, Error)>> {
	let mut failures = Vec::new();
	for (idx, buffered) in ops.iter_mut().enumerate() {
		buffered.has_error = false;
		let module = buffered.op.module().to_string();
		let tree = trees
			.entry(module.clone())
			.or_insert_with(|| DataTree::new(module));
		match apply_op(ctx, tree, &buffered.op) {
			Ok(()) => {}
			Err(err) => {
				buffered.has_error = true;
				if !continue_on_error {
					return Err(err);
				}
				failures.push((idx, err));
			}
		}
	}
	Ok(failures)
}

/// Render the concrete data path of `node`, a child of `parent` (`None` for
/// a top-level node). Keyed list entries carry key predicates, keyless list
/// and leaf-list entries a 1-based position.
pub fn concrete_path(
	parent: Option<&DataPath>,
	schema: &SchemaNode,
	node: &DataNode,
	position: usize,
) -> DataPath {
	let mut segment = match parent {
		Some(parent) if node.module == parent.module() => {
			yangstore_core::path::PathSegment::named(node.name.clone())
		}
		_ => yangstore_core::path::PathSegment::qualified(node.module.clone(), node.name.clone()),
	};
	match schema.list_keys() {
		Some(keys) if !keys.is_empty() => {
			for key in keys {
				if let Some(value) = node.child_leaf(key).and_then(|l| l.value.as_ref()) {
					segment.keys.push((key.clone(), value.to_string()));
				}
			}
		}
		Some(_) => {
			segment.position = Some(position);
		}
		None if matches!(schema.kind, NodeKind::LeafList { .. }) => {
			segment.position = Some(position);
		}
		None => {}
	}
	match parent {
		Some(parent) => parent.child(segment),
		None => DataPath {
			segments: vec![segment],
		},
	}
}
