//! Route table and two-tier access gating.

use std::fmt;

use coopmarket_remote::Session;

use crate::session::Role;

pub const LOGIN_PATH: &str = "/login";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    Login,
    Register,
    Marketplace,
    Dashboard,
    Cooperative,
    Csr,
    Compliance,
    Analytics,
    MemberArea,
}

/// Who may open a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
    Admin,
}

impl Route {
    pub const ALL: [Route; 10] = [
        Route::Home,
        Route::Login,
        Route::Register,
        Route::Marketplace,
        Route::Dashboard,
        Route::Cooperative,
        Route::Csr,
        Route::Compliance,
        Route::Analytics,
        Route::MemberArea,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Login => "/login",
            Route::Register => "/register",
            Route::Marketplace => "/marketplace",
            Route::Dashboard => "/dashboard",
            Route::Cooperative => "/cooperative",
            Route::Csr => "/csr",
            Route::Compliance => "/compliance",
            Route::Analytics => "/analytics",
            Route::MemberArea => "/member-area",
        }
    }

    /// Resolve a path, ignoring a trailing slash and any query string.
    pub fn from_path(path: &str) -> Option<Route> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = path.trim_end_matches('/');
        let normalised = if trimmed.is_empty() { "/" } else { trimmed };
        Self::ALL.into_iter().find(|route| route.path() == normalised)
    }

    pub fn access(&self) -> Access {
        match self {
            Route::Home | Route::Login | Route::Register | Route::Marketplace => Access::Public,
            Route::Cooperative => Access::Admin,
            Route::Dashboard
            | Route::Csr
            | Route::Compliance
            | Route::Analytics
            | Route::MemberArea => Access::Authenticated,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    /// Not signed in: send to the given path.
    Redirect(&'static str),
    /// Signed in without the required role.
    Denied,
}

pub fn gate(route: Route, session: Option<&Session>) -> AccessDecision {
    match (route.access(), session) {
        (Access::Public, _) => AccessDecision::Allow,
        (_, None) => AccessDecision::Redirect(LOGIN_PATH),
        (Access::Authenticated, Some(_)) => AccessDecision::Allow,
        (Access::Admin, Some(session)) => match Role::of(session) {
            Role::Admin => AccessDecision::Allow,
            Role::Member => AccessDecision::Denied,
        },
    }
}
