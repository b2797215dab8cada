// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

pub use record::{DepRecord, DsBindings, ModuleRecord, OpDeps, RegistryDoc, ReplaySupport};
pub use registry::{InstallRequest, ModuleRegistry, PluginSet};
pub use self_module::{SELF_MODULE_NAME, self_module_def};

pub mod deps;
pub mod record;
pub mod registry;
pub mod self_module;

pub type Result<T> = std::result::Result<T, yangstore_type::Error>;
