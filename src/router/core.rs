//! Route registry and request matching.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use once_cell::sync::OnceCell;
use regex::Regex;
use smallvec::SmallVec;
use tracing::{debug, info, warn};

use super::controller::{bind, Controller, Operations};
use super::definition::{ApiDefinition, RegistrationError};
use crate::meta::{has_marker, meta_for};
use crate::openapi::{parameters_for, schema_for};

/// Maximum number of path parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Path parameters extracted from a matched URL.
///
/// Names are shared with the compiled route, values are per request.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Methods an operation may declare.
const SUPPORTED_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
];

/// Result of matching a request to a registered operation.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub definition: Arc<ApiDefinition>,
    pub path_params: ParamVec,
}

impl RouteMatch {
    /// Last value bound to `name`.
    #[inline]
    #[must_use]
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Collects controllers at startup and freezes them into a [`Router`].
#[derive(Default)]
pub struct RouterBuilder {
    definitions: Vec<ApiDefinition>,
    controllers: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl RouterBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every marked operation of `controller` under `prefix`.
    ///
    /// Operations whose request type carries no marker field are skipped.
    /// Any other problem aborts registration of the whole controller.
    pub fn register_controller<C: Controller>(
        &mut self,
        prefix: &str,
        controller: C,
    ) -> Result<&mut Self, RegistrationError> {
        let controller_name = controller.name();
        if prefix.trim().is_empty() {
            return Err(RegistrationError::MissingPrefix {
                controller: controller_name.to_string(),
            });
        }

        let mut ops = Operations::<C>::new();
        C::operations(&mut ops);
        let instance = Arc::new(controller);

        let mut staged: Vec<ApiDefinition> = Vec::with_capacity(ops.entries.len());
        for entry in &ops.entries {
            let handler_name = format!("{controller_name}.{}", entry.name);
            if !has_marker(entry.request) {
                debug!(
                    handler_name = %handler_name,
                    request_type = entry.request.name,
                    "Operation skipped: request type has no route marker"
                );
                continue;
            }

            let meta = meta_for(entry.request).map_err(|source| RegistrationError::Meta {
                handler: handler_name.clone(),
                source,
            })?;
            let method = Method::from_bytes(meta.method.as_bytes())
                .ok()
                .filter(|m| SUPPORTED_METHODS.contains(m))
                .ok_or_else(|| RegistrationError::UnsupportedMethod {
                    handler: handler_name.clone(),
                    method: meta.method.clone(),
                })?;

            let path = join_path(prefix, &meta.path);
            let path_vars = path_variables(&path);

            if self
                .definitions
                .iter()
                .chain(staged.iter())
                .any(|d: &ApiDefinition| d.handler_name == handler_name)
            {
                return Err(RegistrationError::DuplicateHandler {
                    handler: handler_name,
                });
            }
            if let Some(existing) = self
                .definitions
                .iter()
                .chain(staged.iter())
                .find(|d: &&ApiDefinition| d.method == method && same_route(&d.path, &path))
            {
                return Err(RegistrationError::DuplicateRoute {
                    method,
                    path,
                    existing: existing.handler_name.clone(),
                    handler: handler_name,
                });
            }

            debug!(
                handler_name = %handler_name,
                method = %method,
                path = %path,
                request_type = entry.request.name,
                response_type = entry.response.name,
                "Operation registered"
            );

            staged.push(ApiDefinition {
                controller: controller_name.to_string(),
                operation: entry.name.to_string(),
                parameters: parameters_for(entry.request, &path_vars),
                response_schema: schema_for(entry.response),
                meta: meta.clone(),
                request: entry.request,
                response: entry.response,
                invoker: bind(&instance, entry),
                handler_name,
                method,
                path,
                path_vars,
            });
        }

        info!(
            controller = controller_name,
            prefix = %prefix,
            operations = staged.len(),
            skipped = ops.entries.len() - staged.len(),
            "Controller registered"
        );
        self.definitions.extend(staged);
        self.controllers
            .insert(controller_name.to_string(), instance as Arc<dyn Any + Send + Sync>);
        Ok(self)
    }

    /// Compile the route table.
    pub fn build(self) -> Result<Router, RegistrationError> {
        let mut routes = Vec::with_capacity(self.definitions.len());
        let mut by_name = HashMap::with_capacity(self.definitions.len());
        let mut definitions = Vec::with_capacity(self.definitions.len());

        for (idx, definition) in self.definitions.into_iter().enumerate() {
            let (regex, param_names) = path_to_regex(&definition.path)?;
            let definition = Arc::new(definition);
            by_name.insert(definition.handler_name.clone(), idx);
            routes.push(CompiledRoute {
                method: definition.method.clone(),
                regex,
                param_names,
                definition: Arc::clone(&definition),
            });
            definitions.push(definition);
        }

        // Static segments win over parameters: try routes with fewer variables first.
        routes.sort_by_key(|r| r.param_names.len());

        let routes_summary: Vec<String> = definitions
            .iter()
            .take(10)
            .map(|d| format!("{} {}", d.method, d.path))
            .collect();
        info!(
            routes_count = definitions.len(),
            controllers = self.controllers.len(),
            routes_summary = ?routes_summary,
            "Routing table loaded"
        );

        Ok(Router {
            definitions,
            by_name,
            routes,
            controllers: self.controllers,
        })
    }
}

struct CompiledRoute {
    method: Method,
    regex: Regex,
    param_names: Vec<Arc<str>>,
    definition: Arc<ApiDefinition>,
}

/// Immutable route registry.
///
/// Built once at startup and shared by `Arc`; lookups take no locks.
pub struct Router {
    definitions: Vec<Arc<ApiDefinition>>,
    by_name: HashMap<String, usize>,
    routes: Vec<CompiledRoute>,
    controllers: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("definitions", &self.definitions)
            .field("controllers", &self.controllers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Router {
    #[must_use]
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Find the operation serving `method` on `path`.
    #[must_use]
    pub fn route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        for route in self.routes.iter().filter(|r| r.method == *method) {
            let Some(caps) = route.regex.captures(path) else {
                continue;
            };
            let mut path_params = ParamVec::new();
            for (i, name) in route.param_names.iter().enumerate() {
                if let Some(value) = caps.get(i + 1) {
                    path_params.push((Arc::clone(name), decode_segment(value.as_str())));
                }
            }
            debug!(
                method = %method,
                path = %path,
                handler_name = %route.definition.handler_name,
                path_params = ?path_params,
                "Route matched"
            );
            return Some(RouteMatch {
                definition: Arc::clone(&route.definition),
                path_params,
            });
        }
        warn!(method = %method, path = %path, "No route matched");
        None
    }

    /// Whether any method is registered for `path`.
    #[must_use]
    pub fn has_path(&self, path: &str) -> bool {
        self.routes.iter().any(|r| r.regex.is_match(path))
    }

    /// Methods registered for `path`, in registration order.
    #[must_use]
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        let mut methods: Vec<Method> = Vec::new();
        for route in self.routes.iter().filter(|r| r.regex.is_match(path)) {
            if !methods.contains(&route.method) {
                methods.push(route.method.clone());
            }
        }
        methods
    }

    #[must_use]
    pub fn definition(&self, handler_name: &str) -> Option<&Arc<ApiDefinition>> {
        self.by_name
            .get(handler_name)
            .and_then(|&idx| self.definitions.get(idx))
    }

    /// All definitions in registration order.
    #[must_use]
    pub fn definitions(&self) -> &[Arc<ApiDefinition>] {
        &self.definitions
    }

    /// The registered instance of controller `name`, if it is a `C`.
    #[must_use]
    pub fn controller<C: Controller>(&self, name: &str) -> Option<Arc<C>> {
        self.controllers
            .get(name)
            .cloned()
            .and_then(|c| c.downcast::<C>().ok())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// Single-execution gate around router construction.
///
/// The first successful `get_or_init` builds the router; every later call,
/// from any coroutine, returns the same instance without running `init`.
#[derive(Debug, Default)]
pub struct RouterCell {
    cell: OnceCell<Arc<Router>>,
}

impl RouterCell {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    pub fn get_or_init<F>(&self, init: F) -> Result<Arc<Router>, RegistrationError>
    where
        F: FnOnce() -> Result<Router, RegistrationError>,
    {
        self.cell
            .get_or_try_init(|| init().map(Arc::new))
            .map(Arc::clone)
    }

    #[must_use]
    pub fn get(&self) -> Option<Arc<Router>> {
        self.cell.get().cloned()
    }
}

/// Join a registration prefix and an annotated path with single slashes.
#[must_use]
pub fn join_path(prefix: &str, path: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + path.len() + 1);
    for segment in prefix.split('/').chain(path.split('/')) {
        if segment.is_empty() {
            continue;
        }
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Names of `{var}` segments in a path pattern.
#[must_use]
pub fn path_variables(path: &str) -> Vec<String> {
    path.split('/')
        .filter_map(|s| s.strip_prefix('{').and_then(|s| s.strip_suffix('}')))
        .map(str::to_string)
        .collect()
}

/// Two patterns collide when they differ only in variable names.
fn same_route(a: &str, b: &str) -> bool {
    let shape = |p: &str| -> Vec<String> {
        p.split('/')
            .map(|s| {
                if s.starts_with('{') && s.ends_with('}') {
                    "{}".to_string()
                } else {
                    s.to_string()
                }
            })
            .collect()
    };
    shape(a) == shape(b)
}

/// Compile `/users/{id}` into `^/users/([^/]+)$` plus its variable names.
pub(crate) fn path_to_regex(path: &str) -> Result<(Regex, Vec<Arc<str>>), RegistrationError> {
    let mut pattern = String::with_capacity(path.len() + 8);
    pattern.push('^');
    let mut names = Vec::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        pattern.push('/');
        match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) if !name.is_empty() => {
                pattern.push_str("([^/]+)");
                names.push(Arc::from(name));
            }
            Some(_) => {
                return Err(RegistrationError::InvalidPath {
                    path: path.to_string(),
                    reason: "empty path variable".to_string(),
                })
            }
            None => pattern.push_str(&regex::escape(segment)),
        }
    }
    if names.is_empty() && pattern.len() == 1 {
        pattern.push('/');
    }
    // Tolerate one trailing slash on incoming paths.
    pattern.push_str("/?$");
    let regex = Regex::new(&pattern).map_err(|e| RegistrationError::InvalidPath {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    Ok((regex, names))
}

fn decode_segment(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}
