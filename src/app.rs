// SPDX-License-Identifier: MPL-2.0

//! Terminal front-end: reads one command per line, dispatches it to the
//! stores and prints the current screen.

use crate::backend::{AuthEvent, RemoteService};
use crate::runtime;
use crate::scan::{BarcodeType, ScanEvent, ScanFlow, ScanState, UrlOpener};
use crate::state::AppSettings;
use crate::store::{SignOutOutcome, Stores, SubmitOutcome};
use crate::ui::links::first_link;
use crate::ui::screens;
use crate::ui::{
    DropdownMenu, HOME_ENTRIES, LoginForm, MenuItem, Navigator, Notice, Notices, POST_LOGOUT_ROUTE,
    ProfileForm, Route, Theme,
};
use chrono::Utc;
use std::io::BufRead;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

const HELP: &str = "\
global:  back | ok | help | quit
login:   email <address> | password <secret> | login | signup
home:    1 | 2 | 3 | logout
feed:    write <text> | post | refresh | menu | profile | logout | open <n>
profile: username <name> | bio <text> | avatar <url> | save | logout
camera:  grant | deny | flip | scan <type> <data> | again";

/// Everything one running client shows and edits.
pub struct App {
    stores: Stores,
    theme: Theme,
    nav: Navigator,
    notices: Notices,
    login: LoginForm,
    profile: ProfileForm,
    menu: DropdownMenu,
    scan: ScanFlow,
    opener: Arc<dyn UrlOpener>,
}

impl App {
    pub fn new(stores: Stores, theme: Theme, opener: Arc<dyn UrlOpener>, root: Route) -> Self {
        let menu = DropdownMenu::new(theme.fade());
        Self {
            stores,
            theme,
            nav: Navigator::new(root),
            notices: Notices::default(),
            login: LoginForm::default(),
            profile: ProfileForm::default(),
            menu,
            scan: ScanFlow::new(Arc::clone(&opener)),
            opener,
        }
    }

    pub fn route(&self) -> Route {
        self.nav.current()
    }

    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    pub fn render(&self) -> String {
        let theme = &self.theme;
        let body = match self.route() {
            Route::Login => screens::login(theme, &self.login),
            Route::Home => screens::home(theme),
            Route::Camera => screens::camera(theme, &self.scan),
            Route::Shop => screens::shop(theme),
            Route::Feed => screens::feed(
                theme,
                &self.stores.feed.snapshot(),
                &self.menu,
                Instant::now(),
                Utc::now(),
            ),
            Route::Profile => {
                screens::profile(theme, &self.stores.profile.snapshot(), &self.profile)
            }
        };
        match self.notices.current() {
            Some(notice) => format!("{}\n\n{body}", screens::notice(theme, notice)),
            None => body,
        }
    }

    async fn go(&mut self, route: Route) {
        self.nav.navigate(route);
        self.enter().await;
    }

    /// Fetch whatever the screen now on top needs.
    pub async fn enter(&mut self) {
        match self.route() {
            Route::Feed => {
                if let Err(e) = self.stores.feed.refresh().await {
                    self.notices.push(Notice::from_store_error(&e));
                }
            }
            Route::Profile => match self.stores.profile.load().await {
                Ok(profile) => self.profile = ProfileForm::from_profile(&profile),
                Err(e) => {
                    let mut notice = Notice::from_store_error(&e);
                    notice.message = format!("Error loading profile: {}", notice.message);
                    self.notices.push(notice);
                }
            },
            Route::Login | Route::Home | Route::Camera | Route::Shop => {}
        }
    }

    async fn logout(&mut self) {
        if self.stores.sign_out().await == SignOutOutcome::AlreadySignedOut {
            debug!("logout while already signed out");
        }
        self.after_sign_out();
    }

    fn after_sign_out(&mut self) {
        self.menu.close();
        self.notices.clear();
        self.login = LoginForm::default();
        self.profile = ProfileForm::default();
        self.nav.reset(POST_LOGOUT_ROUTE);
    }

    /// React to a session transition reported by the service.
    pub async fn on_auth_event(&mut self, event: AuthEvent) {
        match event {
            AuthEvent::SignedOut => {
                if self.route().requires_session() {
                    info!("session ended elsewhere");
                    self.stores.sign_out().await;
                    self.after_sign_out();
                    self.notices
                        .push(Notice::info("Signed out", "Please log in again."));
                }
            }
            AuthEvent::SignedIn(_) => {
                if self.route() == Route::Login {
                    self.nav.replace(Route::Home);
                }
            }
            AuthEvent::TokenRefreshed(_) => debug!("token refreshed"),
        }
    }

    /// Handle one line of input.
    pub async fn handle(&mut self, line: &str) -> Control {
        let line = line.trim();
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "" => {}
            "quit" | "q" => return Control::Quit,
            "help" | "?" => self.notices.push(Notice::info("Commands", HELP)),
            "ok" => {
                self.notices.dismiss();
            }
            "back" => {
                self.menu.close();
                self.nav.back();
            }
            _ => match self.route() {
                Route::Login => self.handle_login(command, rest).await,
                Route::Home => self.handle_home(command).await,
                Route::Feed => self.handle_feed(command, rest).await,
                Route::Profile => self.handle_profile(command, rest).await,
                Route::Camera => self.handle_camera(command, rest),
                Route::Shop => self.unknown(command),
            },
        }
        Control::Continue
    }

    fn unknown(&mut self, command: &str) {
        self.notices.push(Notice::info(
            "Unknown command",
            &format!("{command} (type help)"),
        ));
    }

    async fn handle_login(&mut self, command: &str, rest: &str) {
        match command {
            "email" => self.login.email = rest.to_string(),
            "password" => self.login.password = rest.to_string(),
            "login" => {
                let LoginForm { email, password } = self.login.clone();
                match self.stores.session.login(&email, &password).await {
                    Ok(_) => {
                        self.login.password.clear();
                        self.nav.replace(Route::Home);
                    }
                    Err(e) => self.notices.push(Notice::from_store_error(&e)),
                }
            }
            "signup" => {
                let LoginForm { email, password } = self.login.clone();
                match self.stores.session.register(&email, &password).await {
                    Ok(_) => self.notices.push(Notice::success(
                        "Success",
                        "Account created! You can now log in.",
                    )),
                    Err(e) => self.notices.push(Notice::from_store_error(&e)),
                }
            }
            other => self.unknown(other),
        }
    }

    async fn handle_home(&mut self, command: &str) {
        if command == "logout" {
            self.logout().await;
            return;
        }
        let picked = command
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| HOME_ENTRIES.get(i));
        match picked {
            Some((_, route)) => self.go(*route).await,
            None => self.unknown(command),
        }
    }

    async fn handle_feed(&mut self, command: &str, rest: &str) {
        match command {
            "write" => self.stores.feed.set_draft(rest),
            "post" => {
                let draft = self.stores.feed.snapshot().draft;
                match self.stores.feed.submit_post(&draft).await {
                    Ok(SubmitOutcome::Posted) => {}
                    Ok(SubmitOutcome::Ignored) => debug!("blank post ignored"),
                    Err(e) => self.notices.push(Notice::from_store_error(&e)),
                }
            }
            "refresh" => {
                self.stores.feed.dismiss_error();
                self.enter().await;
            }
            "menu" => {
                self.menu.toggle(Instant::now());
            }
            "profile" | "logout" => {
                let item = if command == "profile" {
                    MenuItem::Profile
                } else {
                    MenuItem::Logout
                };
                match self.menu.select(item) {
                    Some(MenuItem::Profile) => self.go(Route::Profile).await,
                    Some(MenuItem::Logout) => self.logout().await,
                    None => self
                        .notices
                        .push(Notice::info("Menu", "Open the menu first (menu).")),
                }
            }
            "open" => self.open_post_link(rest),
            other => self.unknown(other),
        }
    }

    fn open_post_link(&mut self, rest: &str) {
        let posts = self.stores.feed.snapshot().posts;
        let link = rest
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| posts.get(i))
            .and_then(|post| first_link(&post.caption));

        match link {
            Some(url) => {
                if let Err(e) = self.opener.open(&url) {
                    self.notices.push(Notice::from_open_error(&e));
                }
            }
            None => self
                .notices
                .push(Notice::info("No link", "That post has no link to open.")),
        }
    }

    async fn handle_profile(&mut self, command: &str, rest: &str) {
        match command {
            "username" => self.profile.username = rest.to_string(),
            "bio" => self.profile.bio = rest.to_string(),
            "avatar" => self.profile.avatar_url = rest.to_string(),
            "save" => match self.stores.profile.save(self.profile.to_profile()).await {
                Ok(saved) => {
                    self.profile = ProfileForm::from_profile(&saved);
                    self.notices
                        .push(Notice::success("Success", "Profile updated!"));
                }
                Err(e) => {
                    let mut notice = Notice::from_store_error(&e);
                    notice.title = "Update failed".to_string();
                    self.notices.push(notice);
                }
            },
            "logout" => self.logout().await,
            other => self.unknown(other),
        }
    }

    fn handle_camera(&mut self, command: &str, rest: &str) {
        match command {
            "grant" => {
                self.scan.retry_permission();
                self.scan.resolve_permission(true);
            }
            "deny" => self.scan.resolve_permission(false),
            "flip" => {
                self.scan.flip();
            }
            "again" => self.scan.scan_again(),
            "scan" => {
                let (kind, data) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                let kind = match kind.parse::<BarcodeType>() {
                    Ok(kind) => kind,
                    Err(e) => {
                        self.notices.push(Notice::error("Error", &e.to_string()));
                        return;
                    }
                };
                if let ScanEvent::Captured(capture) = self.scan.on_scanned(kind, data.trim()) {
                    if let Some(e) = &capture.open_error {
                        self.notices.push(Notice::from_open_error(e));
                    }
                } else if matches!(self.scan.state(), ScanState::Captured(_)) {
                    debug!("scan ignored while a result is shown");
                }
            }
            other => self.unknown(other),
        }
    }
}

/// Forward stdin lines until it closes or nobody is listening.
fn read_lines(tx: mpsc::UnboundedSender<String>) {
    for line in std::io::stdin().lock().lines() {
        match line {
            Ok(line) => {
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to read input");
                break;
            }
        }
    }
}

/// Run the client until the user quits or input ends.
pub async fn run(
    remote: Arc<dyn RemoteService>,
    settings: &AppSettings,
    theme: Theme,
    opener: Arc<dyn UrlOpener>,
) -> anyhow::Result<()> {
    let stores = Stores::new(remote, settings);
    let startup = stores.session.initialize().await;
    info!(entry = ?startup.entry, "starting");

    let (auth_tx, mut auth_rx) = mpsc::unbounded_channel();
    let subscription = stores.session.subscribe(move |event| {
        let _ = auth_tx.send(event);
    });

    let (input_tx, mut input_rx) = mpsc::unbounded_channel();
    // Blocking reads can't be cancelled; the task ends with stdin or the process.
    let _reader = runtime::spawn_blocking(move || read_lines(input_tx));

    let mut app = App::new(stores, theme, opener, Route::from(startup.entry));
    app.enter().await;
    println!("{}\n", app.render());

    loop {
        tokio::select! {
            Some(event) = auth_rx.recv() => app.on_auth_event(event).await,
            line = input_rx.recv() => {
                let Some(line) = line else { break };
                if app.handle(&line).await == Control::Quit {
                    break;
                }
            }
        }
        println!("{}\n", app.render());
    }

    subscription.unsubscribe().await;
    Ok(())
}
