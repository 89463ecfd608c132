// SPDX-License-Identifier: MPL-2.0

pub mod app;
pub mod backend;
pub mod config;
pub mod runtime;
pub mod scan;
pub mod state;
pub mod store;
pub mod ui;
