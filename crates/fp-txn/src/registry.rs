//! Request construction by type tag.
//!
//! The registry maps a string tag to a factory that turns loosely-typed
//! arguments into a request body. Built-in tags cover generic field edits
//! and aggregates; plugin code registers its own leaf types on top.

use crate::error::{Result, TxnError};
use crate::request::{Request, RequestHandle, RequestType};
use fp_core::{FieldAccess, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Builds a request body from forwarded arguments. Receives the registry so
/// aggregate factories can construct nested children.
pub type RequestFactory<C> =
    Box<dyn Fn(&RequestRegistry<C>, Vec<Value>) -> Result<Box<dyn Request<C>>> + Send + Sync>;

/// A serializable construction call: tag plus arguments.
///
/// Nested specs inside aggregate arguments use the list form
/// `["Tag", [args...]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    #[serde(rename = "type")]
    pub request_type: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl RequestSpec {
    pub fn new(request_type: &str, args: Vec<Value>) -> Self {
        Self {
            request_type: request_type.to_string(),
            args,
        }
    }

    /// The nested list form, `["Tag", [args...]]`.
    pub fn to_value(&self) -> Value {
        Value::List(vec![
            Value::Text(self.request_type.clone()),
            Value::List(self.args.clone()),
        ])
    }

    /// Parse the nested list form. The argument list may be omitted.
    pub fn from_value(value: Value, context: &str) -> Result<Self> {
        let mut items = value
            .into_list()
            .ok_or_else(|| TxnError::invalid(context, "nested request must be a list"))?
            .into_iter();
        let request_type = match items.next() {
            Some(Value::Text(tag)) => tag,
            _ => {
                return Err(TxnError::invalid(
                    context,
                    "nested request must start with its type tag",
                ));
            }
        };
        let args = match items.next() {
            None => Vec::new(),
            Some(Value::List(args)) => args,
            Some(other) => {
                return Err(TxnError::invalid(
                    context,
                    format!("arguments of '{request_type}' must be a list, got {}", other.type_name()),
                ));
            }
        };
        if items.next().is_some() {
            return Err(TxnError::invalid(
                context,
                format!("nested '{request_type}' has trailing items"),
            ));
        }
        Ok(Self { request_type, args })
    }
}

/// Tag → factory map.
pub struct RequestRegistry<C> {
    factories: HashMap<String, RequestFactory<C>>,
}

impl<C> Default for RequestRegistry<C> {
    fn default() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }
}

impl<C> std::fmt::Debug for RequestRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}

impl<C> RequestRegistry<C> {
    /// An empty registry; see [`RequestRegistry::with_builtins`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for `tag`.
    pub fn register<F>(&mut self, tag: &str, factory: F)
    where
        F: Fn(&RequestRegistry<C>, Vec<Value>) -> Result<Box<dyn Request<C>>> + Send + Sync + 'static,
    {
        if self
            .factories
            .insert(tag.to_string(), Box::new(factory))
            .is_some()
        {
            log::warn!("request type '{tag}' re-registered; previous factory replaced");
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Construct a pending request of type `tag`.
    ///
    /// # Errors
    /// `UnknownRequestType` for unregistered tags, or whatever the factory
    /// reports for malformed arguments.
    pub fn create(&self, tag: &str, args: Vec<Value>) -> Result<RequestHandle<C>> {
        let factory = self
            .factories
            .get(tag)
            .ok_or_else(|| TxnError::UnknownRequestType(tag.to_string()))?;
        let body = factory(self, args)?;
        Ok(RequestHandle::from_boxed(RequestType::from_tag(tag), body))
    }

    pub fn create_from_spec(&self, spec: &RequestSpec) -> Result<RequestHandle<C>> {
        self.create(&spec.request_type, spec.args.clone())
    }
}

impl<C: FieldAccess + Send + 'static> RequestRegistry<C> {
    /// A registry with `Composite`, `CompositeState`, `Data`, `ChangeFlag`
    /// and `Batch` registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::builtin::register_builtins(&mut registry);
        registry
    }
}
