//! Router assembly and the listener loop.

use std::sync::Arc;

use {
    axum::{
        Router,
        extract::Request,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    courier_channels::IncomingWebhook,
    tokio::net::TcpListener,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    Error, Result,
    route::{PathPattern, Route, RouteAction},
};

struct CompiledRoute<S> {
    pattern: PathPattern,
    route: Route<S>,
    action: RouteAction<S>,
}

struct RouteTable<S> {
    routes: Vec<CompiledRoute<S>>,
    state: S,
}

impl<S: Clone> RouteTable<S> {
    /// First route whose pattern and method both match wins.
    async fn dispatch(&self, mut req: Request) -> Response {
        let path = req.uri().path().to_string();
        let mut wrong_method = false;

        for compiled in &self.routes {
            let Some(vars) = compiled.pattern.matches(&path) else {
                continue;
            };
            if !compiled.route.allows(req.method()) {
                wrong_method = true;
                continue;
            }

            debug!(route = %compiled.pattern, method = %req.method(), %path, "route matched");
            req.extensions_mut().insert(vars);
            return match (compiled.action)(self.state.clone(), req).await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(route = %compiled.pattern, error = %e, "route action failed");
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                },
            };
        }

        if wrong_method {
            StatusCode::METHOD_NOT_ALLOWED.into_response()
        } else {
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Build the HTTP application.
///
/// The webhook, if any, is mounted at its exact path. Every other request is
/// matched against `routes` in declaration order. An empty pattern, a
/// malformed pattern or a route without an action fails here rather than at
/// request time.
pub fn build_app<S>(
    webhook: Option<IncomingWebhook>,
    routes: &[Route<S>],
    state: S,
) -> Result<Router>
where
    S: Clone + Send + Sync + 'static,
{
    let mut compiled = Vec::with_capacity(routes.len());
    for route in routes {
        let pattern = PathPattern::compile(&route.pattern)?;
        let action = route.action.clone().ok_or_else(|| Error::MissingAction {
            pattern: route.pattern.clone(),
        })?;
        compiled.push(CompiledRoute {
            pattern,
            route: route.clone(),
            action,
        });
    }

    let mut router = Router::new();
    if let Some(hook) = webhook {
        let path = hook.mount_path().to_string();
        if !path.starts_with('/') {
            return Err(Error::invalid_pattern(path, "webhook path must start with '/'"));
        }
        debug!(%path, "mounting connector webhook");
        router = router.route(&path, hook.handler);
    }

    let table = Arc::new(RouteTable {
        routes: compiled,
        state,
    });
    Ok(router.fallback(move |req: Request| {
        let table = Arc::clone(&table);
        async move { table.dispatch(req).await }
    }))
}

pub async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr).await.map_err(|source| Error::Bind {
        addr: addr.to_string(),
        source,
    })
}

/// Serve `app` until `shutdown` is cancelled. In-flight requests finish
/// before this returns.
pub async fn serve(listener: TcpListener, app: Router, shutdown: CancellationToken) -> Result<()> {
    match listener.local_addr() {
        Ok(addr) => info!(%addr, "http server listening"),
        Err(e) => warn!(error = %e, "http server listening on unknown address"),
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(Error::Serve)?;
    info!("http server stopped");
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::RouteVars,
        axum::{
            body::{Body, to_bytes},
            http::Method,
            routing::post,
        },
        tokio::io::{AsyncReadExt, AsyncWriteExt},
        tower::ServiceExt,
    };

    async fn call(app: &Router, method: Method, uri: &str) -> (StatusCode, String) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn text_route(pattern: &str, text: &'static str) -> Route<String> {
        Route::new(pattern).action(move |_state: String, _req| async move {
            Ok(text.into_response())
        })
    }

    fn app(routes: &[Route<String>]) -> Router {
        let hook = IncomingWebhook {
            path: Some("/hook".into()),
            handler: post(|| async { "hooked" }),
        };
        build_app(Some(hook), routes, "state".to_string()).unwrap()
    }

    #[tokio::test]
    async fn routes_and_webhook_are_mounted() {
        let app = app(&[text_route("/hello", "hello!")]);
        assert_eq!(call(&app, Method::GET, "/hello").await, (StatusCode::OK, "hello!".to_string()));
        assert_eq!(call(&app, Method::POST, "/hook").await, (StatusCode::OK, "hooked".to_string()));
        assert_eq!(call(&app, Method::GET, "/nope").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn first_matching_route_wins() {
        let app = app(&[
            text_route("/items/special", "special"),
            text_route("/items/{id}", "generic"),
        ]);
        assert_eq!(call(&app, Method::GET, "/items/special").await.1, "special");
        assert_eq!(call(&app, Method::GET, "/items/7").await.1, "generic");
    }

    #[tokio::test]
    async fn method_mismatch_is_405() {
        let route = text_route("/only-get", "ok").method(Method::GET);
        let app = app(&[route]);
        assert_eq!(call(&app, Method::GET, "/only-get").await.0, StatusCode::OK);
        assert_eq!(
            call(&app, Method::POST, "/only-get").await.0,
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[tokio::test]
    async fn actions_see_state_and_vars() {
        let route = Route::new("/articles/{category}/{id:[0-9]+}").action(
            |state: String, req: Request| async move {
                let vars = RouteVars::of(&req);
                let body = format!(
                    "{state}:{}:{}",
                    vars.get("category").unwrap_or_default(),
                    vars.get("id").unwrap_or_default()
                );
                Ok(body.into_response())
            },
        );
        let app = app(&[route]);
        assert_eq!(
            call(&app, Method::GET, "/articles/rust/42").await,
            (StatusCode::OK, "state:rust:42".to_string())
        );
        assert_eq!(call(&app, Method::GET, "/articles/rust/x").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn failing_action_is_500() {
        let route = Route::new("/boom")
            .action(|_state: String, _req| async move { Err(anyhow::anyhow!("boom")) });
        let app = app(&[route]);
        assert_eq!(
            call(&app, Method::GET, "/boom").await.0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn registration_errors_are_synchronous() {
        let empty = text_route("", "x");
        assert!(matches!(
            build_app(None, &[empty], String::new()),
            Err(Error::EmptyPattern)
        ));

        let no_action: Route<String> = Route::new("/x");
        assert!(matches!(
            build_app(None, &[no_action], String::new()),
            Err(Error::MissingAction { .. })
        ));
    }

    #[tokio::test]
    async fn webhook_defaults_to_root() {
        let hook = IncomingWebhook {
            path: None,
            handler: post(|| async { "root" }),
        };
        let app = build_app::<String>(Some(hook), &[], String::new()).unwrap();
        assert_eq!(call(&app, Method::POST, "/").await.1, "root");
    }

    #[tokio::test]
    async fn serve_stops_on_cancel() {
        let listener = bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let app = app(&[text_route("/ping", "pong")]);
        let handle = tokio::spawn(serve(listener, app, cancel.clone()));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /ping HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut buf = String::new();
        stream.read_to_string(&mut buf).await.unwrap();
        assert!(buf.starts_with("HTTP/1.1 200"));
        assert!(buf.ends_with("pong"));

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let taken = bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        assert!(matches!(bind(&addr).await, Err(Error::Bind { .. })));
    }
}
