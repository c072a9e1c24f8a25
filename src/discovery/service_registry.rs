//! # Backend Service Registry
//!
//! Resolves a mapping's `serviceName`/`methodName` to a callable. Local services are
//! looked up first; otherwise the method is looked up among the remote methods
//! registered under the mapping's resolver namespace (`serviceResolver`).
//!
//! ## Rust Concepts Used
//! - `DashMap` for concurrent registration and lookup without an outer lock
//! - Service methods are `Arc`'d async closures so one resolved reference can be
//!   shared by every request of a mapping

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::core::failure::Failure;
use crate::mapping::hooks::define_hook;
use crate::middleware::options::RequestOptions;

define_hook! {
    /// A backend method: request data and options in, result out
    ServiceMethod(data: Value, options: Arc<RequestOptions>) -> Result<Value, Failure>
}

/// A resolved method reference
#[derive(Debug, Clone)]
pub struct MethodRef {
    pub method: ServiceMethod,
    /// Resolved through a resolver namespace rather than a local service
    pub is_remote: bool,
}

/// Lookup of backend methods
pub trait ServiceSelector: Send + Sync {
    fn lookup_method(
        &self,
        service_resolver: &str,
        service_name: &str,
        method_name: &str,
    ) -> Option<MethodRef>;
}

/// In-process [`ServiceSelector`]
#[derive(Default)]
pub struct ServiceRegistry {
    local: DashMap<String, ServiceMethod>,
    remote: DashMap<String, ServiceMethod>,
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("local", &self.local.len())
            .field("remote", &self.remote.len())
            .finish()
    }
}

fn local_key(service_name: &str, method_name: &str) -> String {
    format!("{}#{}", service_name, method_name)
}

fn remote_key(service_resolver: &str, service_name: &str, method_name: &str) -> String {
    format!("{}:{}#{}", service_resolver, service_name, method_name)
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a local service method
    pub fn register_method<F, Fut>(&self, service_name: &str, method_name: &str, method: F) -> &Self
    where
        F: Fn(Value, Arc<RequestOptions>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Failure>> + Send + 'static,
    {
        debug!(service = service_name, method = method_name, "Registered service method");
        self.local
            .insert(local_key(service_name, method_name), ServiceMethod::new(method));
        self
    }

    /// Register a method reachable through a resolver namespace
    pub fn register_remote<F, Fut>(
        &self,
        service_resolver: &str,
        service_name: &str,
        method_name: &str,
        method: F,
    ) -> &Self
    where
        F: Fn(Value, Arc<RequestOptions>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Failure>> + Send + 'static,
    {
        debug!(
            resolver = service_resolver,
            service = service_name,
            method = method_name,
            "Registered remote service method"
        );
        self.remote.insert(
            remote_key(service_resolver, service_name, method_name),
            ServiceMethod::new(method),
        );
        self
    }

    pub fn len(&self) -> usize {
        self.local.len() + self.remote.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ServiceSelector for ServiceRegistry {
    fn lookup_method(
        &self,
        service_resolver: &str,
        service_name: &str,
        method_name: &str,
    ) -> Option<MethodRef> {
        if let Some(method) = self.local.get(&local_key(service_name, method_name)) {
            return Some(MethodRef {
                method: method.value().clone(),
                is_remote: false,
            });
        }
        self.remote
            .get(&remote_key(service_resolver, service_name, method_name))
            .map(|method| MethodRef {
                method: method.value().clone(),
                is_remote: true,
            })
    }
}
