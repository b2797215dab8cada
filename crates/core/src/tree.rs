// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! In-memory data trees.
//!
//! A [`DataTree`] holds the instantiated data of one module in one datastore.
//! The tree is schema-free: identity of list entries is carried by the key
//! predicates (or 1-based positions) of the [`DataPath`] used to address them.
//! Schema-aware concerns such as canonical child order, list identity during
//! merges and default materialisation live in the layers that own a compiled
//! schema context.

use serde::{Deserialize, Serialize};
use yangstore_type::{Error, Origin, Value};

use crate::{
	Result,
	change::MovePosition,
	path::{DataPath, PathSegment},
};

/// One node of a data tree.
///
/// Leafs and leaf-list entries carry a value; containers and list entries
/// carry children. List entries appear as repeated children with the same
/// name under their parent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataNode {
	pub module: String,
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub origin: Option<Origin>,
	#[serde(default, skip_serializing_if = "std::ops::Not::not")]
	pub from_default: bool,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub children: Vec<DataNode>,
}

impl DataNode {
	pub fn container(module: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			module: module.into(),
			name: name.into(),
			value: None,
			origin: None,
			from_default: false,
			children: Vec::new(),
		}
	}

	pub fn leaf(module: impl Into<String>, name: impl Into<String>, value: Value) -> Self {
		Self {
			module: module.into(),
			name: name.into(),
			value: Some(value),
			origin: None,
			from_default: false,
			children: Vec::new(),
		}
	}

	pub fn with_origin(mut self, origin: Origin) -> Self {
		self.origin = Some(origin);
		self
	}

	pub fn with_child(mut self, child: DataNode) -> Self {
		self.children.push(child);
		self
	}

	pub fn is_leaf(&self) -> bool {
		self.value.is_some()
	}

	/// The child leaf named `name`, if any.
	pub fn child_leaf(&self, name: &str) -> Option<&DataNode> {
		self.children.iter().find(|c| c.name == name && c.is_leaf())
	}

	pub fn children_named(&self, name: &str) -> impl Iterator<Item = &DataNode> {
		self.children.iter().filter(move |c| c.name == name)
	}

	/// Whether this node matches one path segment (name, module, keys,
	/// position are checked by the caller for positional segments).
	fn matches_segment(&self, segment: &PathSegment, inherited_module: &str) -> bool {
		if self.name != segment.name {
			return false;
		}
		let wanted = segment.module.as_deref().unwrap_or(inherited_module);
		if self.module != wanted {
			return false;
		}
		segment.keys.iter().all(|(key, value)| {
			self.child_leaf(key).and_then(|leaf| leaf.value.as_ref()).is_some_and(|v| v.to_string() == *value)
		})
	}

	/// Recursively tag this subtree with `origin` where none is set.
	pub fn fill_origin(&mut self, origin: Origin) {
		if self.origin.is_none() {
			self.origin = Some(origin);
		}
		for child in &mut self.children {
			child.fill_origin(origin);
		}
	}

	/// Strip origin tags and default flags, leaving pure config data.
	pub fn strip_meta(&mut self) {
		self.origin = None;
		self.from_default = false;
		for child in &mut self.children {
			child.strip_meta();
		}
	}
}

/// The data of one module in one datastore.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataTree {
	pub module: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub roots: Vec<DataNode>,
}

impl DataTree {
	pub fn new(module: impl Into<String>) -> Self {
		Self {
			module: module.into(),
			roots: Vec::new(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.roots.is_empty()
	}

	/// Resolve a path to a single node. Positional and key predicates must
	/// narrow every list step down to one instance.
	pub fn find(&self, path: &DataPath) -> Option<&DataNode> {
		let mut nodes: Vec<&DataNode> = self.roots.iter().collect();
		let mut module = path.module().to_string();
		let mut current: Option<&DataNode> = None;
		for segment in &path.segments {
			let matches: Vec<&DataNode> =
				nodes.iter().copied().filter(|n| n.matches_segment(segment, &module)).collect();
			let picked = match segment.position {
				Some(position) => matches.get(position - 1).copied(),
				None => matches.first().copied(),
			}?;
			module = picked.module.clone();
			nodes = picked.children.iter().collect();
			current = Some(picked);
		}
		current
	}

	/// Resolve a path to every matching node; the final segment may be a
	/// `*` wildcard or an under-specified list selector.
	pub fn find_all(&self, path: &DataPath) -> Vec<&DataNode> {
		let mut frontier: Vec<&DataNode> = self.roots.iter().collect();
		let mut module = path.module().to_string();
		let mut out: Vec<&DataNode> = Vec::new();
		for (idx, segment) in path.segments.iter().enumerate() {
			let last = idx + 1 == path.segments.len();
			let mut matched: Vec<&DataNode> = if segment.name == "*" {
				frontier.clone()
			} else {
				frontier.iter().copied().filter(|n| n.matches_segment(segment, &module)).collect()
			};
			if let Some(position) = segment.position {
				matched = matched.get(position - 1).copied().into_iter().collect();
			}
			if last {
				out = matched;
				break;
			}
			if let Some(first) = matched.first() {
				module = first.module.clone();
			}
			frontier = matched.iter().flat_map(|n| n.children.iter()).collect();
		}
		out
	}

	/// Walk to `path`, creating missing interior nodes.
	///
	/// With `non_recursive` set, every ancestor must already exist; only the
	/// final node may be created. Created list entries materialise their key
	/// leaves from the path predicates.
	pub fn ensure(&mut self, path: &DataPath, non_recursive: bool) -> Result<&mut DataNode> {
		if path.segments.is_empty() {
			return Err(Error::inval_arg("empty path"));
		}
		let mut trail: Vec<usize> = Vec::new();
		let count = path.segments.len();
		for (idx, segment) in path.segments.iter().enumerate() {
			let (children, inherited) = self.descend(&trail, path.module());
			let child_idx = match find_child_index(children, segment, &inherited) {
				Some(found) => found,
				None => {
					if non_recursive && idx + 1 < count {
						return Err(Error::data_missing(format!(
							"parent of '{path}' does not exist"
						)));
					}
					if let Some(position) = segment.position {
						let existing =
							children.iter().filter(|c| c.name == segment.name).count();
						if position != existing + 1 {
							return Err(Error::data_missing(format!(
								"no instance {position} of '{}'",
								segment.name
							)));
						}
					}
					let module = segment.module.clone().unwrap_or_else(|| inherited.clone());
					let mut node = DataNode::container(module, segment.name.clone());
					for (key, value) in &segment.keys {
						node.children.push(DataNode::leaf(
							node.module.clone(),
							key.clone(),
							Value::Text(value.clone()),
						));
					}
					children.push(node);
					children.len() - 1
				}
			};
			trail.push(child_idx);
		}
		let (parent, _) = self.descend(&trail[..trail.len() - 1], path.module());
		Ok(&mut parent[*trail.last().expect("path has at least one segment")])
	}

	/// Follow an index trail down the tree, returning the children vector at
	/// that depth plus the module inherited from the nearest ancestor.
	fn descend(&mut self, trail: &[usize], root_module: &str) -> (&mut Vec<DataNode>, String) {
		let mut children = &mut self.roots;
		let mut inherited = root_module.to_string();
		for &idx in trail {
			inherited = children[idx].module.clone();
			children = &mut children[idx].children;
		}
		(children, inherited)
	}

	/// Remove the node at `path`. Returns whether anything was removed.
	pub fn delete(&mut self, path: &DataPath) -> bool {
		let Some(parent_path) = path.parent() else {
			return delete_from(&mut self.roots, path.last(), path.module());
		};
		let Some(parent) = self.find_mut(&parent_path) else {
			return false;
		};
		let inherited = parent.module.clone();
		delete_from(&mut parent.children, path.last(), &inherited)
	}

	/// Mutable counterpart of [`DataTree::find`].
	pub fn get_mut(&mut self, path: &DataPath) -> Option<&mut DataNode> {
		self.find_mut(path)
	}

	fn find_mut(&mut self, path: &DataPath) -> Option<&mut DataNode> {
		if path.segments.is_empty() {
			return None;
		}
		let mut trail: Vec<usize> = Vec::new();
		for segment in &path.segments {
			let (children, inherited) = self.descend(&trail, path.module());
			let idx = find_child_index(children, segment, &inherited)?;
			trail.push(idx);
		}
		let (parent, _) = self.descend(&trail[..trail.len() - 1], path.module());
		Some(&mut parent[*trail.last()?])
	}

	/// Reorder one entry of a user-ordered list or leaf-list.
	///
	/// `path` addresses the entry to move; `relative` (a rendered key
	/// predicate or leaf-list value) selects the anchor for
	/// `Before`/`After`.
	pub fn move_entry(&mut self, path: &DataPath, position: &MovePosition) -> Result<()> {
		let entry_segment = path.last().clone();
		let module = path.module().to_string();
		let (children, inherited) = match path.parent() {
			Some(parent_path) => {
				let parent = self
					.find_mut(&parent_path)
					.ok_or_else(|| Error::data_missing(format!("parent of '{path}' not found")))?;
				let inherited = parent.module.clone();
				(&mut parent.children, inherited)
			}
			None => (&mut self.roots, module),
		};
		let from = find_child_index(children, &entry_segment, &inherited)
			.ok_or_else(|| Error::data_missing(format!("'{path}' not found")))?;
		let name = children[from].name.clone();
		let entry = children.remove(from);

		let siblings: Vec<usize> =
			children.iter().enumerate().filter(|(_, c)| c.name == name).map(|(i, _)| i).collect();
		let insert_at = match position {
			MovePosition::First => siblings.first().copied().unwrap_or(children.len()),
			MovePosition::Last => siblings.last().map(|i| i + 1).unwrap_or(children.len()),
			MovePosition::Before(anchor) | MovePosition::After(anchor) => {
				let anchor_idx = siblings
					.iter()
					.copied()
					.find(|&i| entry_matches_anchor(&children[i], anchor))
					.ok_or_else(|| {
						Error::data_missing(format!("move anchor '{anchor}' not found"))
					})?;
				match position {
					MovePosition::Before(_) => anchor_idx,
					_ => anchor_idx + 1,
				}
			}
		};
		children.insert(insert_at, entry);
		Ok(())
	}

	/// Build a new tree containing the subtrees selected by `paths`
	/// (deep-cloned) plus the ancestors leading to them.
	///
	/// Ancestor list entries keep the key leaves named by the selecting
	/// path so the result stays addressable; keyed ancestors reached by
	/// several paths are shared, keyless ancestors are appended per path.
	pub fn extract(&self, paths: &[DataPath]) -> DataTree {
		let suffixes: Vec<&[PathSegment]> = paths
			.iter()
			.filter(|p| p.module() == self.module)
			.map(|p| p.segments.as_slice())
			.collect();
		let mut out = DataTree::new(self.module.clone());
		extract_level(&self.roots, &suffixes, &self.module, &mut out.roots);
		out
	}

	/// Deep config equality, ignoring origin tags and default flags.
	pub fn data_eq(&self, other: &DataTree) -> bool {
		fn node_eq(a: &DataNode, b: &DataNode) -> bool {
			a.module == b.module
				&& a.name == b.name && a.value == b.value
				&& a.children.len() == b.children.len()
				&& a.children.iter().zip(&b.children).all(|(x, y)| node_eq(x, y))
		}
		self.module == other.module
			&& self.roots.len() == other.roots.len()
			&& self.roots.iter().zip(&other.roots).all(|(a, b)| node_eq(a, b))
	}
}

fn find_child_index(children: &[DataNode], segment: &PathSegment, inherited: &str) -> Option<usize> {
	let mut seen = 0usize;
	for (idx, child) in children.iter().enumerate() {
		if !child.matches_segment(segment, inherited) {
			continue;
		}
		seen += 1;
		match segment.position {
			Some(position) if seen == position => return Some(idx),
			Some(_) => continue,
			None => return Some(idx),
		}
	}
	None
}

/// One level of multi-path extraction: every source child is visited once,
/// matched against all active path suffixes at this depth.
fn extract_level(
	src_children: &[DataNode],
	suffixes: &[&[PathSegment]],
	inherited: &str,
	dst_children: &mut Vec<DataNode>,
) {
	let mut occurrences = vec![0usize; suffixes.len()];
	for child in src_children {
		let mut deep = false;
		let mut next: Vec<&[PathSegment]> = Vec::new();
		let mut key_names: Vec<&str> = Vec::new();
		for (idx, suffix) in suffixes.iter().enumerate() {
			let segment = &suffix[0];
			let wildcard = segment.name == "*";
			if !wildcard {
				if !child.matches_segment(segment, inherited) {
					continue;
				}
				occurrences[idx] += 1;
				if let Some(position) = segment.position {
					if occurrences[idx] != position {
						continue;
					}
				}
			}
			if suffix.len() == 1 {
				deep = true;
			} else {
				next.push(&suffix[1..]);
				for (key, _) in &segment.keys {
					if !key_names.contains(&key.as_str()) {
						key_names.push(key);
					}
				}
			}
		}
		if deep {
			// key leaves may already be present as ancestor keys
			if !dst_children.contains(child) {
				dst_children.push(child.clone());
			}
		} else if !next.is_empty() {
			let mut copy = DataNode {
				module: child.module.clone(),
				name: child.name.clone(),
				value: child.value.clone(),
				origin: child.origin,
				from_default: child.from_default,
				children: Vec::new(),
			};
			for key in key_names {
				if let Some(leaf) = child.child_leaf(key) {
					copy.children.push(leaf.clone());
				}
			}
			extract_level(&child.children, &next, &child.module, &mut copy.children);
			dst_children.push(copy);
		}
	}
}

fn delete_from(children: &mut Vec<DataNode>, segment: &PathSegment, inherited: &str) -> bool {
	match find_child_index(children, segment, inherited) {
		Some(idx) => {
			children.remove(idx);
			true
		}
		None => false,
	}
}

/// Match a move anchor against a list entry or leaf-list entry.
///
/// For leaf-lists the anchor is the entry value; for keyed lists it is the
/// rendered key predicate(s) `[k='v']`.
fn entry_matches_anchor(node: &DataNode, anchor: &str) -> bool {
	if let Some(value) = &node.value {
		return value.to_string() == anchor;
	}
	let mut rest = anchor;
	let mut matched_any = false;
	while rest.starts_with('[') {
		let Some(end) = rest.find(']') else {
			return false;
		};
		let body = &rest[1..end];
		rest = &rest[end + 1..];
		let Some((key, value)) = body.split_once('=') else {
			return false;
		};
		let value = value.trim().trim_matches('\'').trim_matches('"');
		let ok = node
			.child_leaf(key.trim())
			.and_then(|leaf| leaf.value.as_ref())
			.is_some_and(|v| v.to_string() == value);
		if !ok {
			return false;
		}
		matched_any = true;
	}
	matched_any && rest.is_empty()
}

#[cfg(test)]
mod test {
	use yangstore_type::Value;

	use super::*;

	fn sample() -> DataTree {
		let mut tree = DataTree::new("net");
		let entry = DataNode::container("net", "iface")
			.with_child(DataNode::leaf("net", "name", Value::Text("eth0".into())))
			.with_child(DataNode::leaf("net", "mtu", Value::Uint16(1500)));
		let entry2 = DataNode::container("net", "iface")
			.with_child(DataNode::leaf("net", "name", Value::Text("eth1".into())))
			.with_child(DataNode::leaf("net", "mtu", Value::Uint16(9000)));
		tree.roots.push(DataNode::container("net", "ifaces").with_child(entry).with_child(entry2));
		tree
	}

	#[test]
	fn test_find_by_key() {
		let tree = sample();
		let path = DataPath::parse("/net:ifaces/iface[name='eth1']/mtu").unwrap();
		let node = tree.find(&path).unwrap();
		assert_eq!(node.value, Some(Value::Uint16(9000)));
	}

	#[test]
	fn test_find_by_position() {
		let tree = sample();
		let path = DataPath::parse("/net:ifaces/iface[2]").unwrap();
		let node = tree.find(&path).unwrap();
		assert_eq!(node.child_leaf("name").unwrap().value, Some(Value::Text("eth1".into())));
	}

	#[test]
	fn test_find_all_wildcard() {
		let tree = sample();
		let path = DataPath::parse("/net:ifaces/*").unwrap();
		assert_eq!(tree.find_all(&path).len(), 2);
	}

	#[test]
	fn test_ensure_creates_keys() {
		let mut tree = DataTree::new("net");
		let path = DataPath::parse("/net:ifaces/iface[name='lo']/mtu").unwrap();
		tree.ensure(&path, false).unwrap().value = Some(Value::Uint16(65535));

		let entry = tree.find(&DataPath::parse("/net:ifaces/iface[name='lo']").unwrap()).unwrap();
		assert_eq!(entry.child_leaf("name").unwrap().value, Some(Value::Text("lo".into())));
		assert_eq!(entry.child_leaf("mtu").unwrap().value, Some(Value::Uint16(65535)));
	}

	#[test]
	fn test_ensure_non_recursive_requires_parent() {
		let mut tree = DataTree::new("net");
		let path = DataPath::parse("/net:ifaces/iface[name='lo']").unwrap();
		let err = tree.ensure(&path, true).unwrap_err();
		assert_eq!(err.code, yangstore_type::ErrorCode::DataMissing);

		tree.ensure(&DataPath::parse("/net:ifaces").unwrap(), true).unwrap();
		assert!(tree.ensure(&path, true).is_ok());
	}

	#[test]
	fn test_delete() {
		let mut tree = sample();
		let path = DataPath::parse("/net:ifaces/iface[name='eth0']").unwrap();
		assert!(tree.delete(&path));
		assert!(!tree.delete(&path));
		assert!(tree.find(&DataPath::parse("/net:ifaces/iface[name='eth1']").unwrap()).is_some());
	}

	#[test]
	fn test_move_before_anchor() {
		let mut tree = sample();
		let path = DataPath::parse("/net:ifaces/iface[name='eth1']").unwrap();
		tree.move_entry(&path, &MovePosition::Before("[name='eth0']".into())).unwrap();
		let first = tree.find(&DataPath::parse("/net:ifaces/iface[1]").unwrap()).unwrap();
		assert_eq!(first.child_leaf("name").unwrap().value, Some(Value::Text("eth1".into())));
	}

	#[test]
	fn test_extract_keeps_ancestors_and_keys() {
		let tree = sample();
		let filtered = tree.extract(&[DataPath::parse("/net:ifaces/iface[name='eth1']/mtu").unwrap()]);
		assert_eq!(filtered.roots.len(), 1);
		let entries: Vec<&DataNode> = filtered.roots[0].children_named("iface").collect();
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].child_leaf("name").unwrap().value, Some(Value::Text("eth1".into())));
		assert_eq!(entries[0].child_leaf("mtu").unwrap().value, Some(Value::Uint16(9000)));
	}

	#[test]
	fn test_extract_unpredicated_list_matches_all_entries() {
		let tree = sample();
		let filtered = tree.extract(&[DataPath::parse("/net:ifaces/iface/name").unwrap()]);
		let entries: Vec<&DataNode> = filtered.roots[0].children_named("iface").collect();
		assert_eq!(entries.len(), 2);
		assert!(entries.iter().all(|e| e.child_leaf("mtu").is_none()));
	}

	#[test]
	fn test_data_eq_ignores_origin() {
		let tree = sample();
		let mut tagged = tree.clone();
		for root in &mut tagged.roots {
			root.fill_origin(yangstore_type::Origin::Intended);
		}
		assert!(tree.data_eq(&tagged));
	}
}
