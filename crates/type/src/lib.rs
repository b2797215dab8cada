// Copyright (c) yangstore.dev 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

pub use error::{Error, ErrorCode, ErrorItem};
pub use origin::Origin;
pub use value::{Decimal64, Value, ValueKind};

mod error;
mod origin;
mod value;

pub type Result<T> = std::result::Result<T, Error>;
