// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

pub use json_file::{JsonFilePlugin, JsonlNotificationPlugin};
pub use memory::{MemoryNotificationPlugin, MemoryPlugin};

pub mod json_file;
pub mod memory;

pub type Result<T> = std::result::Result<T, yangstore_type::Error>;
