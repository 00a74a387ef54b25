//! Unauthorized-response guard.
//!
//! Any 401 drops the stored session and sends the user to the login route,
//! once. Concurrent 401s race on a single flag; only the winner redirects.
//! Nothing happens while the user is already on the login route.

use crate::auth::AuthStore;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

pub const LOGIN_ROUTE: &str = "/login";

/// Where the user currently is, and how to send them elsewhere.
pub trait Navigator: Send + Sync {
    fn current_route(&self) -> String;
    fn redirect(&self, route: &str);
}

/// Navigator that only records the route.
pub struct MemoryNavigator {
    route: Mutex<String>,
    redirects: AtomicUsize,
}

impl MemoryNavigator {
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: Mutex::new(route.into()),
            redirects: AtomicUsize::new(0),
        }
    }

    pub fn set_route(&self, route: impl Into<String>) {
        *self.route.lock().unwrap_or_else(PoisonError::into_inner) = route.into();
    }

    pub fn redirects(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }
}

impl Navigator for MemoryNavigator {
    fn current_route(&self) -> String {
        self.route
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn redirect(&self, route: &str) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
        self.set_route(route);
    }
}

impl<N: Navigator + ?Sized> Navigator for Arc<N> {
    fn current_route(&self) -> String {
        (**self).current_route()
    }

    fn redirect(&self, route: &str) {
        (**self).redirect(route)
    }
}

pub struct UnauthorizedGuard {
    navigator: Box<dyn Navigator>,
    redirected: AtomicBool,
}

impl UnauthorizedGuard {
    pub fn new(navigator: impl Navigator + 'static) -> Self {
        Self {
            navigator: Box::new(navigator),
            redirected: AtomicBool::new(false),
        }
    }

    pub fn navigator(&self) -> &dyn Navigator {
        self.navigator.as_ref()
    }

    /// Handle one 401. Returns true if this call performed the redirect.
    pub fn handle_unauthorized(&self, auth: &AuthStore) -> bool {
        if self.navigator.current_route() == LOGIN_ROUTE {
            tracing::debug!("401 on the login route, not redirecting");
            return false;
        }
        if self.redirected.swap(true, Ordering::SeqCst) {
            return false;
        }
        auth.revoke();
        tracing::warn!("session rejected by server, redirecting to login");
        self.navigator.redirect(LOGIN_ROUTE);
        true
    }

    /// Re-arm after a successful login.
    pub fn rearm(&self) {
        self.redirected.store(false, Ordering::SeqCst);
    }

    pub fn has_redirected(&self) -> bool {
        self.redirected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthSession;

    #[test]
    fn test_concurrent_401s_redirect_once() {
        let nav = Arc::new(MemoryNavigator::new("/departments"));
        let guard = Arc::new(UnauthorizedGuard::new(nav.clone()));
        let auth = Arc::new(AuthStore::in_memory(Some(AuthSession::new("stale"))));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (guard, auth) = (guard.clone(), auth.clone());
                std::thread::spawn(move || guard.handle_unauthorized(&auth))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(nav.redirects(), 1);
        assert_eq!(nav.current_route(), LOGIN_ROUTE);
        assert!(!auth.is_logged_in());
    }

    #[test]
    fn test_no_redirect_from_login_route() {
        let nav = Arc::new(MemoryNavigator::new(LOGIN_ROUTE));
        let guard = UnauthorizedGuard::new(nav.clone());
        let auth = AuthStore::in_memory(None);
        assert!(!guard.handle_unauthorized(&auth));
        assert_eq!(nav.redirects(), 0);
        assert!(!guard.has_redirected());
    }

    #[test]
    fn test_rearm_after_login() {
        let nav = Arc::new(MemoryNavigator::new("/groups"));
        let guard = UnauthorizedGuard::new(nav.clone());
        let auth = AuthStore::in_memory(Some(AuthSession::new("one")));
        assert!(guard.handle_unauthorized(&auth));

        nav.set_route("/groups");
        assert!(!guard.handle_unauthorized(&auth));
        guard.rearm();
        assert!(guard.handle_unauthorized(&auth));
        assert_eq!(nav.redirects(), 2);
    }
}
