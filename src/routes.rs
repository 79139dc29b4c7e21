//! Route access rules and the guard that enforces them.
//!
//! The guard is re-evaluated on every navigation; nothing is cached between
//! calls, so a logout or a role change is picked up on the next check. This is
//! a UX guard only: the backend still enforces access on every request.

use crate::session::{Role, SessionManager};
use tracing::debug;

pub const LOGIN_ROUTE: &str = "/login";
pub const CALLBACK_ROUTE: &str = "/auth/callback";

const STUDENT_PAGES: &[&str] = &[
    "dashboard",
    "cours",
    "cours/:id",
    "etudiants",
    "etudiants/:id",
    "seances",
    "specialites",
    "groupes",
    "mes-notes",
    "emploi-du-temps",
];

const INSTRUCTOR_PAGES: &[&str] = &[
    "dashboard",
    "cours",
    "cours/:id",
    "etudiants",
    "etudiants/:id",
    "seances",
    "specialites",
    "groupes",
];

const ADMIN_PAGES: &[&str] = &["dashboard"];

/// A protected area of the application and the roles allowed in it.
#[derive(Debug)]
pub struct Section {
    pub prefix: &'static str,
    pub roles: &'static [Role],
    pages: &'static [&'static str],
}

impl Section {
    #[must_use]
    pub fn dashboard(&self) -> String {
        format!("{}/dashboard", self.prefix)
    }

    fn has_page(&self, rest: &str) -> bool {
        self.pages.iter().any(|pattern| matches_pattern(pattern, rest))
    }
}

pub const SECTIONS: &[Section] = &[
    Section {
        prefix: "/etudiant",
        roles: &[Role::Etudiant, Role::Admin],
        pages: STUDENT_PAGES,
    },
    Section {
        prefix: "/formateur",
        roles: &[Role::Formateur, Role::Admin],
        pages: INSTRUCTOR_PAGES,
    },
    Section {
        prefix: "/admin",
        roles: &[Role::Admin],
        pages: ADMIN_PAGES,
    },
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardDecision {
    Render,
    Redirect(String),
}

#[derive(Debug, PartialEq, Eq)]
pub enum RouteAccess {
    Public,
    /// Authentication required; a non-empty list also restricts roles.
    Protected(&'static [Role]),
    /// Anything the router does not know is sent to the login route.
    Unknown,
}

/// Access rule for a path. Query strings and fragments are ignored.
#[must_use]
pub fn access_for(path: &str) -> RouteAccess {
    let path = normalize(path);
    if path == LOGIN_ROUTE {
        return RouteAccess::Public;
    }
    if path == CALLBACK_ROUTE {
        return RouteAccess::Protected(&[]);
    }
    match section_for(&path) {
        Some((section, _)) => RouteAccess::Protected(section.roles),
        None => RouteAccess::Unknown,
    }
}

fn section_for(path: &str) -> Option<(&'static Section, &str)> {
    SECTIONS.iter().find_map(|section| {
        let rest = path.strip_prefix(section.prefix)?;
        if rest.is_empty() {
            Some((section, rest))
        } else {
            rest.strip_prefix('/').map(|rest| (section, rest))
        }
    })
}

/// Trims, drops query and fragment, and makes the path absolute.
#[must_use]
pub fn normalize(path: &str) -> String {
    let path = path.trim();
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// `:name` segments match any single non-empty segment.
fn matches_pattern(pattern: &str, path: &str) -> bool {
    let pattern_segments: Vec<&str> = pattern.split('/').collect();
    let path_segments: Vec<&str> = path.split('/').collect();
    pattern_segments.len() == path_segments.len()
        && pattern_segments
            .iter()
            .zip(&path_segments)
            .all(|(expected, actual)| {
                if expected.starts_with(':') {
                    !actual.is_empty()
                } else {
                    expected == actual
                }
            })
}

#[derive(Clone)]
pub struct RouteGuard {
    session: SessionManager,
    login_route: String,
}

impl RouteGuard {
    #[must_use]
    pub fn new(session: SessionManager) -> Self {
        Self {
            session,
            login_route: LOGIN_ROUTE.to_string(),
        }
    }

    #[must_use]
    pub fn with_login_route(mut self, login_route: &str) -> Self {
        self.login_route = login_route.to_string();
        self
    }

    /// Decides whether protected content requiring one of `required` roles
    /// may render. An empty list only requires authentication.
    #[must_use]
    pub fn check(&self, required: &[Role]) -> GuardDecision {
        if !self.session.is_authenticated() {
            debug!("not authenticated, redirecting to login");
            return GuardDecision::Redirect(self.login_route.clone());
        }

        let Some(user) = self.session.current_user() else {
            return GuardDecision::Redirect(self.login_route.clone());
        };

        if !required.is_empty() && !required.contains(&user.role) {
            debug!(role = %user.role, ?required, "role not allowed, redirecting to landing route");
            return GuardDecision::Redirect(user.role.landing_route().to_string());
        }

        GuardDecision::Render
    }

    /// Resolves a navigation to `path`: public pages render, unknown paths go
    /// to login, protected pages go through [`Self::check`], and unknown pages
    /// inside a section fall back to that section's dashboard.
    #[must_use]
    pub fn navigate(&self, path: &str) -> GuardDecision {
        let normalized = normalize(path);
        match access_for(&normalized) {
            RouteAccess::Public => GuardDecision::Render,
            RouteAccess::Unknown => GuardDecision::Redirect(self.login_route.clone()),
            RouteAccess::Protected(roles) => {
                let decision = self.check(roles);
                if decision != GuardDecision::Render {
                    return decision;
                }
                match section_for(&normalized) {
                    Some((section, rest)) if !section.has_page(rest) => {
                        GuardDecision::Redirect(section.dashboard())
                    }
                    _ => GuardDecision::Render,
                }
            }
        }
    }

    /// Where the post-login callback sends the user.
    #[must_use]
    pub fn callback_target(&self) -> String {
        if !self.session.is_authenticated() {
            return self.login_route.clone();
        }
        self.session
            .landing_route()
            .map_or_else(|| self.login_route.clone(), str::to_string)
    }
}
