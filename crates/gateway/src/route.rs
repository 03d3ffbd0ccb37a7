//! Application routes and the path pattern compiler.

use std::{collections::HashMap, fmt, future::Future, sync::Arc};

use {
    axum::{
        extract::Request,
        http::{self, Method},
        response::Response,
    },
    futures::future::BoxFuture,
    regex::Regex,
};

use crate::{Error, Result};

/// Action run for a matched route. Receives the shared state (the robot) and
/// the request, with [`RouteVars`] attached as an extension.
pub type RouteAction<S> =
    Arc<dyn Fn(S, Request) -> BoxFuture<'static, anyhow::Result<Response>> + Send + Sync>;

/// An HTTP route declared by the application.
pub struct Route<S> {
    /// Allowed methods; empty allows every method.
    pub methods: Vec<Method>,
    /// e.g. `/articles/{category}/{id:[0-9]+}`
    pub pattern: String,
    pub action: Option<RouteAction<S>>,
}

impl<S> Route<S> {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            methods: Vec::new(),
            pattern: pattern.into(),
            action: None,
        }
    }

    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    #[must_use]
    pub fn action<F, Fut>(mut self, action: F) -> Self
    where
        F: Fn(S, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Response>> + Send + 'static,
    {
        self.action = Some(Arc::new(move |state, req| {
            Box::pin(action(state, req)) as BoxFuture<'static, anyhow::Result<Response>>
        }));
        self
    }

    #[must_use]
    pub fn allows(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }
}

impl<S> Clone for Route<S> {
    fn clone(&self) -> Self {
        Self {
            methods: self.methods.clone(),
            pattern: self.pattern.clone(),
            action: self.action.clone(),
        }
    }
}

impl<S> fmt::Debug for Route<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("methods", &self.methods)
            .field("pattern", &self.pattern)
            .field("action", &self.action.is_some())
            .finish()
    }
}

/// Path variables captured by the matched route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteVars(HashMap<String, String>);

impl RouteVars {
    /// Variables attached to `req`, empty if it did not pass through a route.
    #[must_use]
    pub fn of<B>(req: &http::Request<B>) -> Self {
        req.extensions().get::<Self>().cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn into_map(self) -> HashMap<String, String> {
        self.0
    }
}

/// A compiled route pattern, anchored at both ends.
///
/// `{name}` matches one path segment; `{name:regex}` matches `regex`.
/// Each variable becomes a generated named group so capture groups inside
/// user regexes do not shift the variable positions.
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
    /// (variable name, group name) in declaration order.
    vars: Vec<(String, String)>,
}

impl PathPattern {
    pub fn compile(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(Error::EmptyPattern);
        }
        if !pattern.starts_with('/') {
            return Err(Error::invalid_pattern(pattern, "must start with '/'"));
        }

        let mut out = String::from("^");
        let mut vars: Vec<(String, String)> = Vec::new();
        let mut literal_start = 0;
        let mut rest = pattern.char_indices();

        while let Some((open, c)) = rest.next() {
            match c {
                '{' => {
                    out.push_str(&regex::escape(&pattern[literal_start..open]));

                    let mut depth = 1;
                    let mut close = None;
                    for (i, c) in rest.by_ref() {
                        match c {
                            '{' => depth += 1,
                            '}' => {
                                depth -= 1;
                                if depth == 0 {
                                    close = Some(i);
                                    break;
                                }
                            },
                            _ => {},
                        }
                    }
                    let close = close
                        .ok_or_else(|| Error::invalid_pattern(pattern, "unclosed '{'"))?;

                    let inner = &pattern[open + 1..close];
                    let (name, re) = inner.split_once(':').unwrap_or((inner, "[^/]+"));
                    if name.is_empty() {
                        return Err(Error::invalid_pattern(pattern, "variable without a name"));
                    }
                    if re.is_empty() {
                        return Err(Error::invalid_pattern(
                            pattern,
                            format!("variable {name:?} has an empty regex"),
                        ));
                    }
                    if vars.iter().any(|(n, _)| n == name) {
                        return Err(Error::invalid_pattern(
                            pattern,
                            format!("duplicate variable {name:?}"),
                        ));
                    }

                    let group = format!("v{}", vars.len());
                    out.push_str(&format!("(?P<{group}>{re})"));
                    vars.push((name.to_string(), group));
                    literal_start = close + 1;
                },
                '}' => return Err(Error::invalid_pattern(pattern, "unbalanced '}'")),
                _ => {},
            }
        }
        out.push_str(&regex::escape(&pattern[literal_start..]));
        out.push('$');

        let regex = Regex::new(&out).map_err(|e| Error::invalid_pattern(pattern, e))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
            vars,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Variables captured from `path`, or `None` when it does not match.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<RouteVars> {
        let caps = self.regex.captures(path)?;
        let vars = self
            .vars
            .iter()
            .filter_map(|(name, group)| {
                caps.name(group)
                    .map(|m| (name.clone(), m.as_str().to_string()))
            })
            .collect();
        Some(RouteVars(vars))
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
