// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Ordered tree diff.
//!
//! Compares a session's working copy against the persisted baseline and
//! produces the change list delivered to subscribers. Traversal follows
//! schema declaration order, so two diffs of the same edit are identical.
//! For every schema child the order is: creations and modifications in
//! working-copy order, then deletions in baseline order, then moves of
//! user-ordered entries.

use yangstore_core::{
	change::Change,
	path::DataPath,
	tree::{DataNode, DataTree},
};
use yangstore_schema::{ModuleSchema, NodeKind, SchemaNode};

use crate::{Result, ops::concrete_path};

/// Diff one module's trees.
pub fn diff_module(module: &ModuleSchema, old: &DataTree, new: &DataTree) -> Result<Vec<Change>> {
	let mut changes = Vec::new();
	let schema_children: Vec<&SchemaNode> = {
		let mut out = Vec::new();
		for node in &module.data {
			if node.is_data_node() {
				out.push(node);
			} else {
				out.extend(node.data_children());
			}
		}
		out
	};
	diff_level(&schema_children, &old.roots, &new.roots, None, &mut changes);
	Ok(changes)
}

fn diff_level(
	schema_children: &[&SchemaNode],
	old: &[DataNode],
	new: &[DataNode],
	parent: Option<&DataPath>,
	changes: &mut Vec<Change>,
) {
	for schema in schema_children {
		if schema.is_operation() {
			continue;
		}
		let old_instances: Vec<&DataNode> = old.iter().filter(|n| n.name == schema.name).collect();
		let new_instances: Vec<&DataNode> = new.iter().filter(|n| n.name == schema.name).collect();
		match &schema.kind {
			NodeKind::Leaf => diff_leaf(schema, &old_instances, &new_instances, parent, changes),
			NodeKind::Container {
				..
			} => diff_container(schema, &old_instances, &new_instances, parent, changes),
			NodeKind::List {
				keys, ..
			} if !keys.is_empty() => {
				diff_keyed_list(schema, keys, &old_instances, &new_instances, parent, changes)
			}
			NodeKind::List {
				..
			} => diff_positional(schema, &old_instances, &new_instances, parent, changes),
			NodeKind::LeafList {
				..
			} => diff_leaf_list(schema, &old_instances, &new_instances, parent, changes),
			_ => {}
		}
	}
}

fn diff_leaf(
	schema: &SchemaNode,
	old: &[&DataNode],
	new: &[&DataNode],
	parent: Option<&DataPath>,
	changes: &mut Vec<Change>,
) {
	match (old.first(), new.first()) {
		(None, Some(node)) => {
			let path = concrete_path(parent, schema, node, 1);
			changes.push(Change::created(path, node.value.clone()));
		}
		(Some(node), None) => {
			let path = concrete_path(parent, schema, node, 1);
			changes.push(Change::deleted(path, node.value.clone()));
		}
		(Some(before), Some(after)) => {
			if before.value != after.value {
				let path = concrete_path(parent, schema, after, 1);
				changes.push(Change::modified(path, before.value.clone(), after.value.clone()));
			}
		}
		(None, None) => {}
	}
}

fn diff_container(
	schema: &SchemaNode,
	old: &[&DataNode],
	new: &[&DataNode],
	parent: Option<&DataPath>,
	changes: &mut Vec<Change>,
) {
	match (old.first(), new.first()) {
		(None, Some(node)) => emit_created(schema, node, parent, 1, changes),
		(Some(node), None) => emit_deleted(schema, node, parent, 1, changes),
		(Some(before), Some(after)) => {
			let path = concrete_path(parent, schema, after, 1);
			diff_level(&schema.data_children(), &before.children, &after.children, Some(&path), changes);
		}
		(None, None) => {}
	}
}

fn diff_keyed_list(
	schema: &SchemaNode,
	keys: &[String],
	old: &[&DataNode],
	new: &[&DataNode],
	parent: Option<&DataPath>,
	changes: &mut Vec<Change>,
) {
	let key_of = |node: &DataNode| -> Vec<String> {
		keys.iter()
			.map(|k| node.child_leaf(k).and_then(|l| l.value.as_ref()).map(|v| v.to_string()).unwrap_or_default())
			.collect()
	};

	for after in new {
		let id = key_of(after);
		match old.iter().find(|n| key_of(n) == id) {
			Some(before) => {
				let path = concrete_path(parent, schema, after, 1);
				diff_level(
					&schema.data_children(),
					&before.children,
					&after.children,
					Some(&path),
					changes,
				);
			}
			None => emit_created(schema, after, parent, 1, changes),
		}
	}
	for before in old {
		let id = key_of(before);
		if !new.iter().any(|n| key_of(n) == id) {
			emit_deleted(schema, before, parent, 1, changes);
		}
	}

	if schema.is_user_ordered() {
		let old_order: Vec<Vec<String>> =
			old.iter().map(|n| key_of(n)).filter(|id| new.iter().any(|n| key_of(n) == *id)).collect();
		let new_order: Vec<Vec<String>> =
			new.iter().map(|n| key_of(n)).filter(|id| old.iter().any(|n| key_of(n) == *id)).collect();
		for id in moved_entries(&old_order, &new_order) {
			if let Some(node) = new.iter().find(|n| key_of(n) == id) {
				changes.push(Change::moved(concrete_path(parent, schema, node, 1)));
			}
		}
	}
}

fn diff_positional(
	schema: &SchemaNode,
	old: &[&DataNode],
	new: &[&DataNode],
	parent: Option<&DataPath>,
	changes: &mut Vec<Change>,
) {
	let common = old.len().min(new.len());
	for idx in 0..common {
		let path = concrete_path(parent, schema, new[idx], idx + 1);
		diff_level(&schema.data_children(), &old[idx].children, &new[idx].children, Some(&path), changes);
	}
	for (idx, node) in new.iter().enumerate().skip(common) {
		emit_created(schema, node, parent, idx + 1, changes);
	}
	for (idx, node) in old.iter().enumerate().skip(common) {
		emit_deleted(schema, node, parent, idx + 1, changes);
	}
}

fn diff_leaf_list(
	schema: &SchemaNode,
	old: &[&DataNode],
	new: &[&DataNode],
	parent: Option<&DataPath>,
	changes: &mut Vec<Change>,
) {
	for (idx, after) in new.iter().enumerate() {
		if !old.iter().any(|n| n.value == after.value) {
			let path = concrete_path(parent, schema, after, idx + 1);
			changes.push(Change::created(path, after.value.clone()));
		}
	}
	for (idx, before) in old.iter().enumerate() {
		if !new.iter().any(|n| n.value == before.value) {
			let path = concrete_path(parent, schema, before, idx + 1);
			changes.push(Change::deleted(path, before.value.clone()));
		}
	}
	if schema.is_user_ordered() {
		let value_of = |n: &&DataNode| n.value.as_ref().map(|v| v.to_string()).unwrap_or_default();
		let old_order: Vec<String> =
			old.iter().filter(|n| new.iter().any(|m| m.value == n.value)).map(value_of).collect();
		let new_order: Vec<String> =
			new.iter().filter(|n| old.iter().any(|m| m.value == n.value)).map(value_of).collect();
		for value in moved_entries(&old_order, &new_order) {
			if let Some(idx) = new.iter().position(|n| value_of(&n) == value) {
				changes.push(Change::moved(concrete_path(parent, schema, new[idx], idx + 1)));
			}
		}
	}
}

/// Entries whose relative order changed: everything outside the longest
/// common subsequence of the two orders.
fn moved_entries<T: Clone + PartialEq>(old_order: &[T], new_order: &[T]) -> Vec<T> {
	let kept = longest_common_subsequence(old_order, new_order);
	new_order.iter().filter(|id| !kept.contains(id)).cloned().collect()
}

fn longest_common_subsequence<T: Clone + PartialEq>(a: &[T], b: &[T]) -> Vec<T> {
	let mut table = vec![vec![0usize; b.len() + 1]; a.len() + 1];
	for i in (0..a.len()).rev() {
		for j in (0..b.len()).rev() {
			table[i][j] = if a[i] == b[j] {
				table[i + 1][j + 1] + 1
			} else {
				table[i + 1][j].max(table[i][j + 1])
			};
		}
	}
	let mut out = Vec::new();
	let (mut i, mut j) = (0, 0);
	while i < a.len() && j < b.len() {
		if a[i] == b[j] {
			out.push(a[i].clone());
			i += 1;
			j += 1;
		} else if table[i + 1][j] >= table[i][j + 1] {
			i += 1;
		} else {
			j += 1;
		}
	}
	out
}

fn emit_created(
	schema: &SchemaNode,
	node: &DataNode,
	parent: Option<&DataPath>,
	position: usize,
	changes: &mut Vec<Change>,
) {
	let path = concrete_path(parent, schema, node, position);
	changes.push(Change::created(path.clone(), node.value.clone()));
	emit_subtree(schema, node, &path, changes, true);
}

fn emit_deleted(
	schema: &SchemaNode,
	node: &DataNode,
	parent: Option<&DataPath>,
	position: usize,
	changes: &mut Vec<Change>,
) {
	let path = concrete_path(parent, schema, node, position);
	changes.push(Change::deleted(path.clone(), node.value.clone()));
	emit_subtree(schema, node, &path, changes, false);
}

/// Emit created/deleted entries for every descendant, in schema order.
fn emit_subtree(schema: &SchemaNode, node: &DataNode, path: &DataPath, changes: &mut Vec<Change>, created: bool) {
	for child_schema in schema.data_children() {
		let mut position = 0usize;
		for child in node.children_named(&child_schema.name) {
			position += 1;
			let child_path = concrete_path(Some(path), child_schema, child, position);
			if created {
				changes.push(Change::created(child_path.clone(), child.value.clone()));
			} else {
				changes.push(Change::deleted(child_path.clone(), child.value.clone()));
			}
			emit_subtree(child_schema, child, &child_path, changes, created);
		}
	}
}

#[cfg(test)]
mod test {
	use indexmap::IndexMap;
	use yangstore_core::change::ChangeKind;
	use yangstore_schema::SchemaContext;
	use yangstore_testing::modules::{interfaces_module, solo_module};
	use yangstore_type::Value;

	use super::*;

	fn iface_tree(entries: &[(&str, bool)]) -> DataTree {
		let mut tree = DataTree::new("ietf-interfaces");
		let mut interfaces = DataNode::container("ietf-interfaces", "interfaces");
		for (name, enabled) in entries {
			interfaces.children.push(
				DataNode::container("ietf-interfaces", "interface")
					.with_child(DataNode::leaf("ietf-interfaces", "name", Value::Text((*name).into())))
					.with_child(DataNode::leaf("ietf-interfaces", "type", Value::Text("eth".into())))
					.with_child(DataNode::leaf("ietf-interfaces", "enabled", Value::Bool(*enabled))),
			);
		}
		tree.roots.push(interfaces);
		tree
	}

	fn module() -> ModuleSchema {
		SchemaContext::compile(&[interfaces_module()], &IndexMap::new())
			.unwrap()
			.module("ietf-interfaces")
			.unwrap()
			.clone()
	}

	#[test]
	fn test_no_changes_for_equal_trees() {
		let tree = iface_tree(&[("eth0", true)]);
		assert!(diff_module(&module(), &tree, &tree).unwrap().is_empty());
	}

	#[test]
	fn test_created_entry_reports_subtree() {
		let old = iface_tree(&[("eth0", true)]);
		let new = iface_tree(&[("eth0", true), ("eth1", false)]);
		let changes = diff_module(&module(), &old, &new).unwrap();

		assert_eq!(changes[0].kind, ChangeKind::Created);
		assert_eq!(
			changes[0].path.to_string(),
			"/ietf-interfaces:interfaces/interface[name='eth1']"
		);
		// descendants follow the entry itself, in schema order
		let paths: Vec<String> = changes.iter().map(|c| c.path.to_string()).collect();
		assert!(paths.contains(&"/ietf-interfaces:interfaces/interface[name='eth1']/name".to_string()));
		assert!(paths.contains(&"/ietf-interfaces:interfaces/interface[name='eth1']/enabled".to_string()));
	}

	#[test]
	fn test_modified_leaf_carries_both_values() {
		let old = iface_tree(&[("eth0", true)]);
		let new = iface_tree(&[("eth0", false)]);
		let changes = diff_module(&module(), &old, &new).unwrap();

		assert_eq!(changes.len(), 1);
		assert_eq!(changes[0].kind, ChangeKind::Modified);
		assert_eq!(changes[0].old_value, Some(Value::Bool(true)));
		assert_eq!(changes[0].new_value, Some(Value::Bool(false)));
	}

	#[test]
	fn test_deleted_entry_reports_subtree() {
		let old = iface_tree(&[("eth0", true), ("eth1", true)]);
		let new = iface_tree(&[("eth0", true)]);
		let changes = diff_module(&module(), &old, &new).unwrap();

		assert!(changes.iter().all(|c| c.kind == ChangeKind::Deleted));
		assert_eq!(
			changes[0].path.to_string(),
			"/ietf-interfaces:interfaces/interface[name='eth1']"
		);
		assert_eq!(changes.len(), 4);
	}

	#[test]
	fn test_user_ordered_move_detected() {
		let solo = SchemaContext::compile(&[solo_module()], &IndexMap::new())
			.unwrap()
			.module("solo")
			.unwrap()
			.clone();

		let entry = |id: u32| {
			DataNode::container("solo", "item")
				.with_child(DataNode::leaf("solo", "id", Value::Uint32(id)))
		};
		let mut old = DataTree::new("solo");
		old.roots.push(DataNode::container("solo", "box").with_child(entry(1)).with_child(entry(2)).with_child(entry(3)));
		let mut new = DataTree::new("solo");
		new.roots.push(DataNode::container("solo", "box").with_child(entry(3)).with_child(entry(1)).with_child(entry(2)));

		let changes = diff_module(&solo, &old, &new).unwrap();
		assert_eq!(changes.len(), 1);
		assert_eq!(changes[0].kind, ChangeKind::Moved);
		assert_eq!(changes[0].path.to_string(), "/solo:box/item[id='3']");
	}
}
