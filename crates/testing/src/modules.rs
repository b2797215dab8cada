// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Module definitions shared across crate test suites.

use yangstore_schema::{ModuleDef, SchemaNode, TypeSpec};

/// A config module with nested containers and a keyed list:
/// `/plugin:simple-cont/simple-cont2/ac1/acl1[acs1]/{acs1,acs2,acs3}`.
pub fn plugin_module() -> ModuleDef {
	ModuleDef::new("plugin").with_node(
		SchemaNode::container("simple-cont").with_child(
			SchemaNode::container("simple-cont2").with_child(
				SchemaNode::container("ac1").with_child(
					SchemaNode::list("acl1", vec!["acs1"])
						.with_child(SchemaNode::leaf("acs1", TypeSpec::Text))
						.with_child(SchemaNode::leaf("acs2", TypeSpec::Text))
						.with_child(SchemaNode::leaf("acs3", TypeSpec::Text))
						.with_child(SchemaNode::action("acd1").with_input(vec![SchemaNode::leaf(
							"acds1",
							TypeSpec::Text,
						)])),
				),
			),
		),
	)
}

/// A pure state module: `/state-module:bus/{gps_located,distance_travelled}`.
pub fn state_module() -> ModuleDef {
	ModuleDef::new("state-module").with_node(
		SchemaNode::container("bus")
			.state()
			.with_child(SchemaNode::leaf("gps_located", TypeSpec::Bool).state())
			.with_child(SchemaNode::leaf("distance_travelled", TypeSpec::Uint32).state()),
	)
}

/// An interfaces module in the shape of ietf-interfaces, plus a notification
/// and an rpc for dispatch tests.
pub fn interfaces_module() -> ModuleDef {
	ModuleDef::new("ietf-interfaces")
		.with_revision("2018-02-20")
		.with_node(
			SchemaNode::container("interfaces").with_child(
				SchemaNode::list("interface", vec!["name"])
					.with_child(SchemaNode::leaf("name", TypeSpec::Text))
					.with_child(SchemaNode::leaf("type", TypeSpec::Text).mandatory())
					.with_child(SchemaNode::leaf("enabled", TypeSpec::Bool).with_default("true"))
					.with_child(SchemaNode::leaf("mtu", TypeSpec::Uint16).if_feature("mtu")),
			),
		)
		.with_feature("mtu")
		.with_node(
			SchemaNode::notification("link-state-change")
				.with_child(SchemaNode::leaf("if-name", TypeSpec::Text).state())
				.with_child(SchemaNode::leaf("up", TypeSpec::Bool).state()),
		)
		.with_node(SchemaNode::rpc("reset-interface").with_input(vec![SchemaNode::leaf(
			"name",
			TypeSpec::Text,
		)
		.state()])
		.with_output(vec![SchemaNode::leaf("took-ms", TypeSpec::Uint32).state()]))
}

/// A module referencing `ietf-interfaces` through a leafref, a when
/// expression, a must expression and an instance-identifier, both in data
/// and inside an rpc.
pub fn refs_module() -> ModuleDef {
	ModuleDef::new("refs")
		.with_import("ietf-interfaces")
		.with_node(
			SchemaNode::container("monitor")
				.with_child(SchemaNode::leaf(
					"watched-if",
					TypeSpec::Leafref {
						path: "/ietf-interfaces:interfaces/interface/name".to_string(),
						require_instance: true,
					},
				))
				.with_child(
					SchemaNode::leaf("fallback", TypeSpec::Text)
						.with_when("/ietf-interfaces:interfaces/interface[name='lo']/enabled = 'true'"),
				)
				.with_child(
					SchemaNode::leaf("target", TypeSpec::InstanceIdentifier {
						require_instance: true,
					})
					.with_must("count(/ietf-interfaces:interfaces/interface) > 0"),
				)
				.with_child(SchemaNode::leaf("loose", TypeSpec::InstanceIdentifier {
					require_instance: false,
				})),
		)
		.with_node(SchemaNode::rpc("probe").with_input(vec![SchemaNode::leaf(
			"if-ref",
			TypeSpec::Leafref {
				path: "/ietf-interfaces:interfaces/interface/name".to_string(),
				require_instance: true,
			},
		)
		.state()]))
}

/// A small standalone module used where cross-module noise is unwanted.
pub fn solo_module() -> ModuleDef {
	ModuleDef::new("solo").with_node(
		SchemaNode::container("box")
			.with_child(SchemaNode::leaf("label", TypeSpec::Text))
			.with_child(SchemaNode::leaf_list("tags", TypeSpec::Text).user_ordered())
			.with_child(
				SchemaNode::list("item", vec!["id"])
					.user_ordered()
					.with_child(SchemaNode::leaf("id", TypeSpec::Uint32))
					.with_child(SchemaNode::leaf("note", TypeSpec::Text)),
			),
	)
}
