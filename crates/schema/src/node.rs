// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use serde::{Deserialize, Serialize};
use yangstore_type::{Value, ValueKind};

/// The type of a leaf or leaf-list, as resolved by the schema parser.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TypeSpec {
	Bool,
	Int8,
	Int16,
	Int32,
	Int64,
	Uint8,
	Uint16,
	Uint32,
	Uint64,
	Decimal64 {
		fraction_digits: u8,
	},
	Text,
	Enumeration {
		names: Vec<String>,
	},
	Bits {
		names: Vec<String>,
	},
	Binary,
	Empty,
	IdentityRef {
		base: String,
	},
	Leafref {
		/// Target schema path, canonicalised to JSON-qualified form.
		path: String,
		require_instance: bool,
	},
	InstanceIdentifier {
		require_instance: bool,
	},
	Union {
		branches: Vec<TypeSpec>,
	},
}

impl TypeSpec {
	/// The value kind instances of this type carry. Leafrefs answer for
	/// their target's textual shape, unions for their first branch.
	pub fn value_kind(&self) -> ValueKind {
		match self {
			TypeSpec::Bool => ValueKind::Bool,
			TypeSpec::Int8 => ValueKind::Int8,
			TypeSpec::Int16 => ValueKind::Int16,
			TypeSpec::Int32 => ValueKind::Int32,
			TypeSpec::Int64 => ValueKind::Int64,
			TypeSpec::Uint8 => ValueKind::Uint8,
			TypeSpec::Uint16 => ValueKind::Uint16,
			TypeSpec::Uint32 => ValueKind::Uint32,
			TypeSpec::Uint64 => ValueKind::Uint64,
			TypeSpec::Decimal64 {
				..
			} => ValueKind::Decimal64,
			TypeSpec::Text => ValueKind::Text,
			TypeSpec::Enumeration {
				..
			} => ValueKind::Enum,
			TypeSpec::Bits {
				..
			} => ValueKind::Bits,
			TypeSpec::Binary => ValueKind::Binary,
			TypeSpec::Empty => ValueKind::Empty,
			TypeSpec::IdentityRef {
				..
			} => ValueKind::IdentityRef,
			TypeSpec::Leafref {
				..
			} => ValueKind::Text,
			TypeSpec::InstanceIdentifier {
				..
			} => ValueKind::InstanceId,
			TypeSpec::Union {
				branches,
			} => branches.first().map(|b| b.value_kind()).unwrap_or(ValueKind::Text),
		}
	}

	/// Whether `value` is acceptable for this type. Leafref targets and
	/// instance-identifier referents are checked by validation, not here.
	pub fn accepts(&self, value: &Value) -> bool {
		match self {
			TypeSpec::Enumeration {
				names,
			} => matches!(value, Value::Enum(name) if names.contains(name)),
			TypeSpec::Bits {
				names,
			} => match value {
				Value::Bits(set) => set.iter().all(|bit| names.contains(bit)),
				_ => false,
			},
			TypeSpec::Union {
				branches,
			} => branches.iter().any(|b| b.accepts(value)),
			// Leafref referents are checked during validation; any shape
			// the target accepts is representable as text here.
			TypeSpec::Leafref {
				..
			} => true,
			_ => value.kind() == self.value_kind(),
		}
	}

	/// Parse `text` as a value of this type, trying union branches in
	/// declaration order.
	pub fn parse(&self, text: &str) -> Option<Value> {
		match self {
			TypeSpec::Union {
				branches,
			} => branches.iter().find_map(|b| b.parse(text)),
			TypeSpec::Enumeration {
				names,
			} => names.contains(&text.to_string()).then(|| Value::Enum(text.to_string())),
			_ => Value::parse(self.value_kind(), text),
		}
	}
}

/// Statement kind of a schema node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
	Container {
		presence: bool,
	},
	List {
		keys: Vec<String>,
		user_ordered: bool,
	},
	Leaf,
	LeafList {
		user_ordered: bool,
	},
	Choice,
	Case,
	Rpc,
	Action,
	Notification,
	/// Implicit input block of an rpc or action.
	Input,
	/// Implicit output block of an rpc or action.
	Output,
}

/// One compiled schema node.
///
/// The same shape serves as parser output (pre feature pruning) and as the
/// compiled form held by the context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaNode {
	pub name: String,
	pub kind: NodeKind,
	/// `config true` data; operations and notification bodies are state.
	pub config: bool,
	pub mandatory: bool,
	/// Canonical default text for leaves / leaf-lists.
	pub default: Option<String>,
	pub type_spec: Option<TypeSpec>,
	pub when: Option<String>,
	pub musts: Vec<String>,
	pub if_features: Vec<String>,
	pub children: Vec<SchemaNode>,
}

impl SchemaNode {
	fn new(name: impl Into<String>, kind: NodeKind) -> Self {
		Self {
			name: name.into(),
			kind,
			config: true,
			mandatory: false,
			default: None,
			type_spec: None,
			when: None,
			musts: Vec::new(),
			if_features: Vec::new(),
			children: Vec::new(),
		}
	}

	pub fn container(name: impl Into<String>) -> Self {
		Self::new(name, NodeKind::Container {
			presence: false,
		})
	}

	pub fn presence_container(name: impl Into<String>) -> Self {
		Self::new(name, NodeKind::Container {
			presence: true,
		})
	}

	pub fn list(name: impl Into<String>, keys: Vec<&str>) -> Self {
		Self::new(name, NodeKind::List {
			keys: keys.into_iter().map(|k| k.to_string()).collect(),
			user_ordered: false,
		})
	}

	pub fn keyless_list(name: impl Into<String>) -> Self {
		Self::new(name, NodeKind::List {
			keys: Vec::new(),
			user_ordered: false,
		})
	}

	pub fn leaf(name: impl Into<String>, type_spec: TypeSpec) -> Self {
		let mut node = Self::new(name, NodeKind::Leaf);
		node.type_spec = Some(type_spec);
		node
	}

	pub fn leaf_list(name: impl Into<String>, type_spec: TypeSpec) -> Self {
		let mut node = Self::new(name, NodeKind::LeafList {
			user_ordered: false,
		});
		node.type_spec = Some(type_spec);
		node
	}

	pub fn choice(name: impl Into<String>) -> Self {
		Self::new(name, NodeKind::Choice)
	}

	pub fn case(name: impl Into<String>) -> Self {
		Self::new(name, NodeKind::Case)
	}

	pub fn rpc(name: impl Into<String>) -> Self {
		let mut node = Self::new(name, NodeKind::Rpc);
		node.config = false;
		node.children = vec![Self::new("input", NodeKind::Input), Self::new("output", NodeKind::Output)];
		node
	}

	pub fn action(name: impl Into<String>) -> Self {
		let mut node = Self::new(name, NodeKind::Action);
		node.config = false;
		node.children = vec![Self::new("input", NodeKind::Input), Self::new("output", NodeKind::Output)];
		node
	}

	pub fn notification(name: impl Into<String>) -> Self {
		let mut node = Self::new(name, NodeKind::Notification);
		node.config = false;
		node
	}

	pub fn user_ordered(mut self) -> Self {
		match &mut self.kind {
			NodeKind::List {
				user_ordered, ..
			}
			| NodeKind::LeafList {
				user_ordered,
			} => *user_ordered = true,
			_ => {}
		}
		self
	}

	pub fn state(mut self) -> Self {
		self.config = false;
		self
	}

	pub fn mandatory(mut self) -> Self {
		self.mandatory = true;
		self
	}

	pub fn with_default(mut self, default: impl Into<String>) -> Self {
		self.default = Some(default.into());
		self
	}

	pub fn with_when(mut self, expr: impl Into<String>) -> Self {
		self.when = Some(expr.into());
		self
	}

	pub fn with_must(mut self, expr: impl Into<String>) -> Self {
		self.musts.push(expr.into());
		self
	}

	pub fn if_feature(mut self, feature: impl Into<String>) -> Self {
		self.if_features.push(feature.into());
		self
	}

	pub fn with_child(mut self, child: SchemaNode) -> Self {
		self.children.push(child);
		self
	}

	pub fn with_input(mut self, nodes: Vec<SchemaNode>) -> Self {
		if let Some(input) = self.children.iter_mut().find(|c| matches!(c.kind, NodeKind::Input)) {
			input.children = nodes;
		}
		self
	}

	pub fn with_output(mut self, nodes: Vec<SchemaNode>) -> Self {
		if let Some(output) = self.children.iter_mut().find(|c| matches!(c.kind, NodeKind::Output)) {
			output.children = nodes;
		}
		self
	}

	pub fn is_operation(&self) -> bool {
		matches!(self.kind, NodeKind::Rpc | NodeKind::Action | NodeKind::Notification)
	}

	/// Whether instances of this node appear in data trees. Choice, case,
	/// input and output are schema-only structure.
	pub fn is_data_node(&self) -> bool {
		!matches!(self.kind, NodeKind::Choice | NodeKind::Case | NodeKind::Input | NodeKind::Output)
	}

	pub fn is_list(&self) -> bool {
		matches!(self.kind, NodeKind::List { .. })
	}

	pub fn is_leaf(&self) -> bool {
		matches!(self.kind, NodeKind::Leaf | NodeKind::LeafList { .. })
	}

	pub fn list_keys(&self) -> Option<&[String]> {
		match &self.kind {
			NodeKind::List {
				keys, ..
			} => Some(keys),
			_ => None,
		}
	}

	pub fn is_user_ordered(&self) -> bool {
		matches!(
			self.kind,
			NodeKind::List {
				user_ordered: true,
				..
			} | NodeKind::LeafList {
				user_ordered: true
			}
		)
	}

	/// Children as they appear in data trees: choice and case layers are
	/// flattened away.
	pub fn data_children(&self) -> Vec<&SchemaNode> {
		let mut out = Vec::new();
		collect_data_children(&self.children, &mut out);
		out
	}

	/// Find a direct data child by name, descending through choice/case.
	pub fn data_child(&self, name: &str) -> Option<&SchemaNode> {
		self.data_children().into_iter().find(|c| c.name == name)
	}
}

pub(crate) fn collect_data_children<'a>(children: &'a [SchemaNode], out: &mut Vec<&'a SchemaNode>) {
	for child in children {
		if child.is_data_node() {
			out.push(child);
		} else {
			collect_data_children(&child.children, out);
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_choice_is_flattened_for_data() {
		let node = SchemaNode::container("cont").with_child(
			SchemaNode::choice("transport")
				.with_child(SchemaNode::case("tcp").with_child(SchemaNode::leaf("port", TypeSpec::Uint16)))
				.with_child(SchemaNode::case("tls").with_child(SchemaNode::leaf("cert", TypeSpec::Text))),
		);
		let children = node.data_children();
		assert_eq!(children.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), vec!["port", "cert"]);
		assert!(node.data_child("port").is_some());
	}

	#[test]
	fn test_union_parse_prefers_first_branch() {
		let spec = TypeSpec::Union {
			branches: vec![TypeSpec::Uint16, TypeSpec::Text],
		};
		assert_eq!(spec.parse("80"), Some(Value::Uint16(80)));
		assert_eq!(spec.parse("http"), Some(Value::Text("http".into())));
	}

	#[test]
	fn test_enumeration_rejects_unknown_name() {
		let spec = TypeSpec::Enumeration {
			names: vec!["up".into(), "down".into()],
		};
		assert!(spec.parse("up").is_some());
		assert!(spec.parse("sideways").is_none());
		assert!(spec.accepts(&Value::Enum("down".into())));
		assert!(!spec.accepts(&Value::Enum("sideways".into())));
	}

	#[test]
	fn test_rpc_has_input_output_blocks() {
		let rpc = SchemaNode::rpc("restart").with_input(vec![SchemaNode::leaf("delay", TypeSpec::Uint32)]);
		assert!(rpc.is_operation());
		let input = rpc.children.iter().find(|c| matches!(c.kind, NodeKind::Input)).unwrap();
		assert_eq!(input.children.len(), 1);
	}
}
