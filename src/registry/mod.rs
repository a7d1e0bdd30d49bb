//! Route registry.
//!
//! Routes are declarative: a name (the URL path segment), a parameter list,
//! a request template producing the store-request encoding, and response
//! templates keyed by content type. The registry is populated once at
//! startup and is read-only afterward; all configuration errors surface at
//! registration, never per request.

use std::collections::{BTreeMap, HashMap};

use crate::template::Template;

/// Context roots bound from the store's native result, available to
/// response templates in addition to the declared parameters.
pub const RESULT_BINDINGS: &[&str] = &["item", "items", "count", "last_key"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSource {
    Path,
    Query,
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub source: ParamSource,
    pub required: bool,
    /// Pinned value: always bound, never overridable by the caller (the
    /// unfurl route pins its lookup parameters this way).
    pub default: Option<String>,
}

impl ParamSpec {
    pub fn required(name: &str, source: ParamSource) -> Self {
        Self { name: name.to_string(), source, required: true, default: None }
    }

    pub fn optional(name: &str, source: ParamSource) -> Self {
        Self { name: name.to_string(), source, required: false, default: None }
    }

    pub fn fixed(name: &str, source: ParamSource, default: &str) -> Self {
        Self {
            name: name.to_string(),
            source,
            required: false,
            default: Some(default.to_string()),
        }
    }
}

pub struct RouteDefinition {
    /// Unique name; also the URL path segment.
    pub name: String,
    pub parameters: Vec<ParamSpec>,
    pub request_template: Template,
    /// Response templates by content type. A route with no template for a
    /// content type passes the native store output through as JSON.
    pub response_templates: BTreeMap<String, Template>,
    pub requires_credential: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate route name '{0}'")]
    DuplicateRoute(String),

    #[error("route '{route}': template references undeclared parameter '{name}'")]
    UndeclaredReference { route: String, name: String },
}

#[derive(Default)]
pub struct Registry {
    routes: HashMap<String, RouteDefinition>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route, validating name uniqueness and that every context
    /// root the templates read is either a declared parameter or a result
    /// binding. Fail fast: a bad route definition is a startup error.
    pub fn register(&mut self, route: RouteDefinition) -> Result<(), RegistryError> {
        if self.routes.contains_key(&route.name) {
            return Err(RegistryError::DuplicateRoute(route.name));
        }

        let declared: Vec<&str> = route.parameters.iter().map(|p| p.name.as_str()).collect();

        for root in route.request_template.referenced_roots() {
            if !declared.contains(&root.as_str()) {
                return Err(RegistryError::UndeclaredReference { route: route.name, name: root });
            }
        }
        for template in route.response_templates.values() {
            for root in template.referenced_roots() {
                if !declared.contains(&root.as_str()) && !RESULT_BINDINGS.contains(&root.as_str())
                {
                    return Err(RegistryError::UndeclaredReference {
                        route: route.name,
                        name: root,
                    });
                }
            }
        }

        self.routes.insert(route.name.clone(), route);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<&RouteDefinition> {
        self.routes.get(name)
    }

    pub fn route_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
