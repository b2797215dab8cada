// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Provenance tag carried by every node of the operational datastore.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
	/// Came from the running configuration.
	Intended,
	/// Supplied by an operational pull provider.
	Dynamic,
	/// Created by the system itself.
	System,
	/// Learned from a remote peer or protocol.
	Learned,
	/// Materialised from a schema default.
	Default,
	/// No origin was declared.
	#[default]
	Unknown,
}

impl Origin {
	pub fn parse(text: &str) -> Option<Origin> {
		match text {
			"intended" => Some(Origin::Intended),
			"dynamic" => Some(Origin::Dynamic),
			"system" => Some(Origin::System),
			"learned" => Some(Origin::Learned),
			"default" => Some(Origin::Default),
			"unknown" => Some(Origin::Unknown),
			_ => None,
		}
	}
}

impl Display for Origin {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Origin::Intended => f.write_str("intended"),
			Origin::Dynamic => f.write_str("dynamic"),
			Origin::System => f.write_str("system"),
			Origin::Learned => f.write_str("learned"),
			Origin::Default => f.write_str("default"),
			Origin::Unknown => f.write_str("unknown"),
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_parse_round_trip() {
		for origin in [
			Origin::Intended,
			Origin::Dynamic,
			Origin::System,
			Origin::Learned,
			Origin::Default,
			Origin::Unknown,
		] {
			assert_eq!(Origin::parse(&origin.to_string()), Some(origin));
		}
		assert_eq!(Origin::parse("bogus"), None);
	}
}
