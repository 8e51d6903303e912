//! Request routing for intercepted fetches.
//!
//! The router is an ordered list of (matcher, strategy) pairs evaluated
//! first-match-wins. Requests that match nothing (cross-origin or non-`GET`)
//! are passed through untouched.

use std::collections::BTreeSet;

use reqwest::{Method, Url};

use crate::cache::CacheGeneration;
use crate::config::WorkerConfig;
use crate::error::Result;
use crate::http::Request;

/// Which requests a route applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMatcher {
    /// Every same-origin request, used while running on a development host.
    DevelopmentHost,
    /// The version descriptor path, any query.
    VersionDescriptor,
    /// Top-level document loads.
    Navigation,
    /// A path from the precached shell manifest.
    ShellAsset,
    /// Any other same-origin request.
    SameOrigin,
}

/// How a matched request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Always go to the network, answering `503 Offline` on failure.
    NetworkOnly,
    /// Cache-busted network fetch, stored into `cache`; fall back to the
    /// cached copy, else propagate the failure.
    NetworkFirst {
        /// Generation fresh responses are stored in.
        cache: CacheGeneration,
    },
    /// Serve the cached shell document, else fetch and store it into the
    /// runtime generation, else `503 Offline`.
    ShellFirst,
    /// Serve from `cache`, else fetch and store, else `503 Offline`.
    CacheFirst {
        /// Generation consulted and filled.
        cache: CacheGeneration,
    },
}

/// One routing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Predicate.
    pub matcher: RouteMatcher,
    /// Handler.
    pub strategy: Strategy,
}

/// Outcome of routing a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Answer with this route.
    Handle(Route),
    /// Do not intercept.
    Passthrough,
}

/// Ordered routing table.
#[derive(Debug, Clone)]
pub struct Router {
    origin: Url,
    version_path: String,
    shell_paths: BTreeSet<String>,
    routes: Vec<Route>,
}

impl Router {
    /// Build the routing table for a worker configuration.
    pub fn from_config(config: &WorkerConfig) -> Result<Self> {
        let origin = config.origin_url()?;

        let routes = if config.is_bypassed() {
            vec![Route {
                matcher: RouteMatcher::DevelopmentHost,
                strategy: Strategy::NetworkOnly,
            }]
        } else {
            vec![
                Route {
                    matcher: RouteMatcher::VersionDescriptor,
                    strategy: Strategy::NetworkFirst {
                        cache: CacheGeneration::Runtime,
                    },
                },
                Route {
                    matcher: RouteMatcher::Navigation,
                    strategy: Strategy::ShellFirst,
                },
                Route {
                    matcher: RouteMatcher::ShellAsset,
                    strategy: Strategy::CacheFirst {
                        cache: CacheGeneration::Static,
                    },
                },
                Route {
                    matcher: RouteMatcher::SameOrigin,
                    strategy: Strategy::CacheFirst {
                        cache: CacheGeneration::Static,
                    },
                },
            ]
        };

        Ok(Self {
            origin,
            version_path: config.version_path.clone(),
            shell_paths: config.shell_manifest.iter().cloned().collect(),
            routes,
        })
    }

    /// The routes in evaluation order.
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Whether `url` shares scheme, host and port with the worker origin.
    #[must_use]
    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.origin.origin()
    }

    /// Whether the request targets the version descriptor.
    #[must_use]
    pub fn is_version_descriptor(&self, request: &Request) -> bool {
        self.is_same_origin(&request.url) && request.url.path() == self.version_path
    }

    /// Pick the first route that matches.
    #[must_use]
    pub fn resolve(&self, request: &Request) -> RouteDecision {
        if request.method != Method::GET || !self.is_same_origin(&request.url) {
            return RouteDecision::Passthrough;
        }

        self.routes
            .iter()
            .find(|route| self.matches(route.matcher, request))
            .map_or(RouteDecision::Passthrough, |route| RouteDecision::Handle(*route))
    }

    fn matches(&self, matcher: RouteMatcher, request: &Request) -> bool {
        match matcher {
            RouteMatcher::DevelopmentHost | RouteMatcher::SameOrigin => true,
            RouteMatcher::VersionDescriptor => request.url.path() == self.version_path,
            RouteMatcher::Navigation => request.is_navigation(),
            RouteMatcher::ShellAsset => self.shell_paths.contains(request.url.path()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "https://budget.example";

    fn router() -> Router {
        Router::from_config(&WorkerConfig::for_origin(ORIGIN)).unwrap()
    }

    fn get(path: &str) -> Request {
        Request::get(Url::parse(ORIGIN).unwrap().join(path).unwrap())
    }

    fn matcher_for(router: &Router, request: &Request) -> Option<RouteMatcher> {
        match router.resolve(request) {
            RouteDecision::Handle(route) => Some(route.matcher),
            RouteDecision::Passthrough => None,
        }
    }

    #[test]
    fn test_descriptor_wins_over_shell_manifest() {
        let router = router();
        // The descriptor is also in the shell manifest; the descriptor route
        // comes first.
        let req = get("/public/version.json?t=123");
        assert_eq!(matcher_for(&router, &req), Some(RouteMatcher::VersionDescriptor));
        assert!(router.is_version_descriptor(&req));
    }

    #[test]
    fn test_navigation_before_static() {
        let router = router();
        let nav = Request::navigate(Url::parse("https://budget.example/").unwrap());
        assert_eq!(matcher_for(&router, &nav), Some(RouteMatcher::Navigation));
        assert_eq!(matcher_for(&router, &get("/")), Some(RouteMatcher::ShellAsset));
    }

    #[test]
    fn test_shell_and_catch_all() {
        let router = router();
        assert_eq!(
            matcher_for(&router, &get("/public/icons/icon-192.png")),
            Some(RouteMatcher::ShellAsset)
        );
        assert_eq!(
            matcher_for(&router, &get("/assets/app-3f9a.js")),
            Some(RouteMatcher::SameOrigin)
        );
    }

    #[test]
    fn test_passthrough() {
        let router = router();
        let cross = Request::get(Url::parse("https://fonts.example/inter.woff2").unwrap());
        assert_eq!(router.resolve(&cross), RouteDecision::Passthrough);

        let other_port = Request::get(Url::parse("https://budget.example:8443/").unwrap());
        assert_eq!(router.resolve(&other_port), RouteDecision::Passthrough);

        let mut post = get("/api/export");
        post.method = Method::POST;
        assert_eq!(router.resolve(&post), RouteDecision::Passthrough);
    }

    #[test]
    fn test_development_host_routes_everything_to_network() {
        let router = Router::from_config(&WorkerConfig::for_origin("http://localhost:3000")).unwrap();
        assert_eq!(router.routes().len(), 1);
        let req = Request::get(Url::parse("http://localhost:3000/public/version.json").unwrap());
        assert_eq!(
            router.resolve(&req),
            RouteDecision::Handle(Route {
                matcher: RouteMatcher::DevelopmentHost,
                strategy: Strategy::NetworkOnly,
            })
        );
    }

    #[test]
    fn test_route_order() {
        let matchers: Vec<_> = router().routes().iter().map(|r| r.matcher).collect();
        assert_eq!(
            matchers,
            vec![
                RouteMatcher::VersionDescriptor,
                RouteMatcher::Navigation,
                RouteMatcher::ShellAsset,
                RouteMatcher::SameOrigin,
            ]
        );
    }
}
