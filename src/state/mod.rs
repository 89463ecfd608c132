// SPDX-License-Identifier: MPL-2.0

mod session;
pub mod settings;

pub use session::{MemoryVault, SecretServiceVault, SessionError, SessionVault};
pub use settings::{AppSettings, BackendSettings};
