//! HTTP mount layer: the connector's inbound webhook plus application routes
//! with `{name}` / `{name:regex}` path variables.

pub mod error;
pub mod route;
pub mod server;

pub use {
    error::{Error, Result},
    route::{PathPattern, Route, RouteAction, RouteVars},
    server::{bind, build_app, serve},
};
