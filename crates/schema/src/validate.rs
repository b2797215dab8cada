// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Context-free structural validation of a data tree against its schema.
//!
//! Checks node existence, value shapes and list-key presence. Cross-node
//! rules (mandatory, when/must, leafref referents) need datastore context and
//! live with the change transaction engine.

use yangstore_core::tree::{DataNode, DataTree};
use yangstore_type::ErrorItem;

use crate::{
	context::SchemaContext,
	node::{NodeKind, SchemaNode},
};

/// Structural findings for `tree`, empty when it fits the schema.
pub fn check_structure(ctx: &SchemaContext, tree: &DataTree) -> Vec<ErrorItem> {
	let mut items = Vec::new();
	let Some(module) = ctx.module(&tree.module) else {
		items.push(ErrorItem::new(format!("/{}:", tree.module), "module is not installed"));
		return items;
	};
	for root in &tree.roots {
		let path = format!("/{}:{}", root.module, root.name);
		match module.top_data_node(&root.name) {
			Some(schema) => check_node(schema, root, &path, &mut items),
			None => items.push(ErrorItem::new(path, "node not found in schema")),
		}
	}
	items
}

/// Structural findings for one subtree rooted at `node`, validated against
/// `schema`. Used for rpc input/output blocks and notification bodies,
/// which never appear as datastore roots.
pub fn check_subtree(schema: &SchemaNode, node: &DataNode, base_path: &str) -> Vec<ErrorItem> {
	let mut items = Vec::new();
	check_node(schema, node, base_path, &mut items);
	items
}

fn check_node(schema: &SchemaNode, node: &DataNode, path: &str, items: &mut Vec<ErrorItem>) {
	match &schema.kind {
		NodeKind::Leaf | NodeKind::LeafList {
			..
		} => {
			if !node.children.is_empty() {
				items.push(ErrorItem::new(path.to_string(), "leaf carries child nodes"));
			}
			match (&node.value, &schema.type_spec) {
				(Some(value), Some(spec)) => {
					if !spec.accepts(value) {
						items.push(ErrorItem::new(
							path.to_string(),
							format!("value '{value}' does not match type {}", spec.value_kind()),
						));
					}
				}
				(None, _) => {
					items.push(ErrorItem::new(path.to_string(), "leaf without a value"));
				}
				_ => {}
			}
		}
		NodeKind::List {
			keys, ..
		} => {
			for key in keys {
				if node.child_leaf(key).is_none() {
					items.push(ErrorItem::new(
						path.to_string(),
						format!("list entry is missing key leaf '{key}'"),
					));
				}
			}
			check_children(schema, node, path, items);
		}
		NodeKind::Container {
			..
		}
		| NodeKind::Notification
		| NodeKind::Input
		| NodeKind::Output => {
			if node.value.is_some() {
				items.push(ErrorItem::new(path.to_string(), "container carries a value"));
			}
			check_children(schema, node, path, items);
		}
		NodeKind::Rpc | NodeKind::Action => {
			check_children(schema, node, path, items);
		}
		NodeKind::Choice | NodeKind::Case => {
			// schema-only nodes never appear in data
			items.push(ErrorItem::new(path.to_string(), "choice/case cannot be instantiated"));
		}
	}
}

fn check_children(schema: &SchemaNode, node: &DataNode, path: &str, items: &mut Vec<ErrorItem>) {
	for child in &node.children {
		let child_path = format!("{}/{}", path, child.name);
		let child_schema = schema.data_child(&child.name).or_else(|| {
			schema.children.iter().find(|c| {
				matches!(c.kind, NodeKind::Action | NodeKind::Notification | NodeKind::Input | NodeKind::Output)
					&& c.name == child.name
			})
		});
		match child_schema {
			Some(child_schema) => check_node(child_schema, child, &child_path, items),
			None => items.push(ErrorItem::new(child_path, "node not found in schema")),
		}
	}
}

#[cfg(test)]
mod test {
	use indexmap::IndexMap;
	use yangstore_core::tree::DataNode;
	use yangstore_type::Value;

	use super::*;
	use crate::{ModuleDef, node::TypeSpec};

	fn ctx() -> SchemaContext {
		let def = ModuleDef::new("m").with_node(
			SchemaNode::container("cont")
				.with_child(SchemaNode::leaf("count", TypeSpec::Uint8))
				.with_child(
					SchemaNode::list("entry", vec!["id"])
						.with_child(SchemaNode::leaf("id", TypeSpec::Text)),
				),
		);
		SchemaContext::compile(&[def], &IndexMap::new()).unwrap()
	}

	#[test]
	fn test_valid_tree_passes() {
		let mut tree = DataTree::new("m");
		tree.roots.push(
			DataNode::container("m", "cont")
				.with_child(DataNode::leaf("m", "count", Value::Uint8(4)))
				.with_child(
					DataNode::container("m", "entry")
						.with_child(DataNode::leaf("m", "id", Value::Text("a".into()))),
				),
		);
		assert!(check_structure(&ctx(), &tree).is_empty());
	}

	#[test]
	fn test_unknown_node_reported() {
		let mut tree = DataTree::new("m");
		tree.roots.push(DataNode::container("m", "cont").with_child(DataNode::leaf(
			"m",
			"bogus",
			Value::Bool(true),
		)));
		let items = check_structure(&ctx(), &tree);
		assert_eq!(items.len(), 1);
		assert!(items[0].path.ends_with("bogus"));
	}

	#[test]
	fn test_type_mismatch_reported() {
		let mut tree = DataTree::new("m");
		tree.roots.push(
			DataNode::container("m", "cont").with_child(DataNode::leaf("m", "count", Value::Text("x".into()))),
		);
		let items = check_structure(&ctx(), &tree);
		assert!(items[0].message.contains("does not match type"));
	}

	#[test]
	fn test_missing_list_key_reported() {
		let mut tree = DataTree::new("m");
		tree.roots.push(DataNode::container("m", "cont").with_child(DataNode::container("m", "entry")));
		let items = check_structure(&ctx(), &tree);
		assert!(items[0].message.contains("missing key leaf"));
	}
}
