// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

pub use engine::{Engine, EngineConfig};
pub use read::Item;
pub use session::Session;

pub mod engine;
pub mod oper;
pub mod read;
pub mod rpc;
pub mod session;
pub mod test_utils;

pub type Result<T> = std::result::Result<T, yangstore_type::Error>;
