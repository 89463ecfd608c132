// SPDX-License-Identifier: MPL-2.0

use std::time::Duration;

pub const APP_ID: &str = "io.github.faxthat.FaxThat";
pub const APP_NAME: &str = "FaxThat";

#[cfg(feature = "devel")]
pub const IS_DEVEL: bool = true;
#[cfg(not(feature = "devel"))]
pub const IS_DEVEL: bool = false;

/// Upper bound for every remote call issued by a store.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for restoring a session before the first screen is picked.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Duration of the feed dropdown fade-in.
pub const MENU_FADE: Duration = Duration::from_millis(200);

pub const POSTS_TABLE: &str = "posts";
pub const PROFILES_TABLE: &str = "profiles";

/// Conflict key that makes profile saves insert-or-overwrite.
pub const PROFILE_CONFLICT_KEY: &str = "user_id";

/// Author name used when the signed-in user has no email.
pub const ANONYMOUS_AUTHOR: &str = "Anonymous";
