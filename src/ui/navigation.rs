// SPDX-License-Identifier: MPL-2.0

use crate::store::Entry;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Home,
    Camera,
    Shop,
    Feed,
    Profile,
}

/// Where every logout ends up, from the feed menu and the profile screen alike.
pub const POST_LOGOUT_ROUTE: Route = Route::Login;

impl Route {
    pub fn title(self) -> &'static str {
        match self {
            Route::Login => "FaxThat Login",
            Route::Home => "FaxThat",
            Route::Camera => "Scan Barcode",
            Route::Shop => "Shop",
            Route::Feed => "Social Feed",
            Route::Profile => "Profile",
        }
    }

    /// Whether the screen needs a signed-in user.
    pub fn requires_session(self) -> bool {
        !matches!(self, Route::Login)
    }
}

impl From<Entry> for Route {
    fn from(entry: Entry) -> Self {
        match entry {
            Entry::Home => Route::Home,
            Entry::Login => Route::Login,
        }
    }
}

/// Screen stack. Never empty.
#[derive(Debug, Clone)]
pub struct Navigator {
    stack: Vec<Route>,
}

impl Navigator {
    pub fn new(root: Route) -> Self {
        Self { stack: vec![root] }
    }

    pub fn current(&self) -> Route {
        self.stack.last().copied().unwrap_or(POST_LOGOUT_ROUTE)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Push `route`, unless it is already on top.
    pub fn navigate(&mut self, route: Route) {
        if self.current() != route {
            debug!(?route, "navigate");
            self.stack.push(route);
        }
    }

    /// Pop one screen. Returns false at the root.
    pub fn back(&mut self) -> bool {
        if self.stack.len() > 1 {
            self.stack.pop();
            true
        } else {
            false
        }
    }

    /// Swap the top screen for `route`.
    pub fn replace(&mut self, route: Route) {
        self.stack.pop();
        self.stack.push(route);
    }

    /// Throw away the whole stack and start again at `route`.
    pub fn reset(&mut self, route: Route) {
        debug!(?route, "navigation reset");
        self.stack.clear();
        self.stack.push(route);
    }
}
