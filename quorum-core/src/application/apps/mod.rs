//! App registry.
//!
//! Apps implement `App` with a closed method enum; the blanket `AppModule` impl parses the wire
//! method name through that enum, so the registry dispatches over one object-safe trait and an
//! unknown method is rejected before any app code runs.

pub mod deployment;

pub use deployment::{DeploymentApp, DeploymentMethod};

use crate::application::party_manager::PartyManager;
use crate::domain::app::{AppMethod, ConfirmAudience, MemWrite, TypedValue};
use crate::domain::AppRequest;
use crate::foundation::{AppId, NodeId, ThresholdError};
use crate::infrastructure::config::TssConfig;
use crate::infrastructure::shared_memory::SharedMemory;
use crate::infrastructure::storage::ContextRepository;
use async_trait::async_trait;
use log::info;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything app code may touch, passed explicitly into every hook.
pub struct AppCallContext<'a> {
    pub node_id: &'a NodeId,
    pub repository: &'a ContextRepository,
    pub memory: &'a dyn SharedMemory,
    pub parties: &'a PartyManager,
    /// Every node of the network, sorted.
    pub network: &'a [NodeId],
    pub tss: &'a TssConfig,
    pub now_nanos: u64,
}

#[async_trait]
pub trait App: Send + Sync + 'static {
    type Method: AppMethod;

    const NAME: &'static str;
    /// Fixed id; apps without one use the keccak of their name.
    const APP_ID: Option<&'static str> = None;
    const AUDIENCE: ConfirmAudience = ConfirmAudience::Party;

    /// Fail-fast precondition, run by the coordinator and by every partner.
    async fn validate_request(&self, _ctx: &AppCallContext<'_>, _method: Self::Method, _request: &AppRequest) -> Result<(), ThresholdError> {
        Ok(())
    }

    /// Coordinator-only step; the returned value travels to partners as `data.init`.
    async fn on_arrive(&self, _ctx: &AppCallContext<'_>, _method: Self::Method, _request: &AppRequest) -> Result<Option<Value>, ThresholdError> {
        Ok(None)
    }

    async fn on_request(&self, ctx: &AppCallContext<'_>, method: Self::Method, request: &AppRequest) -> Result<Value, ThresholdError>;

    fn sign_params(&self, method: Self::Method, request: &AppRequest, result: &Value) -> Result<Vec<TypedValue>, ThresholdError>;

    /// Runs once per node of the confirm audience after the group signature checks out.
    async fn on_confirm(&self, _ctx: &AppCallContext<'_>, _method: Self::Method, _request: &AppRequest) -> Result<(), ThresholdError> {
        Ok(())
    }

    fn on_mem_write(&self, _method: Self::Method, _request: &AppRequest) -> Result<Vec<MemWrite>, ThresholdError> {
        Ok(Vec::new())
    }

    /// Coordinator-only; runs when a signed request it started fails, whatever step failed.
    async fn on_failed(&self, _ctx: &AppCallContext<'_>, _method: Self::Method, _request: &AppRequest) -> Result<(), ThresholdError> {
        Ok(())
    }
}

#[async_trait]
pub trait AppModule: Send + Sync {
    fn name(&self) -> &'static str;
    fn app_id(&self) -> AppId;
    fn audience(&self) -> ConfirmAudience;
    fn methods(&self) -> Vec<&'static str>;
    /// Rejects unknown method names.
    fn check_method(&self, method: &str) -> Result<(), ThresholdError>;
    async fn validate_request(&self, ctx: &AppCallContext<'_>, request: &AppRequest) -> Result<(), ThresholdError>;
    async fn on_arrive(&self, ctx: &AppCallContext<'_>, request: &AppRequest) -> Result<Option<Value>, ThresholdError>;
    async fn on_request(&self, ctx: &AppCallContext<'_>, request: &AppRequest) -> Result<Value, ThresholdError>;
    fn sign_params(&self, request: &AppRequest, result: &Value) -> Result<Vec<TypedValue>, ThresholdError>;
    async fn on_confirm(&self, ctx: &AppCallContext<'_>, request: &AppRequest) -> Result<(), ThresholdError>;
    fn on_mem_write(&self, request: &AppRequest) -> Result<Vec<MemWrite>, ThresholdError>;
    async fn on_failed(&self, ctx: &AppCallContext<'_>, request: &AppRequest) -> Result<(), ThresholdError>;
}

fn method_of<A: App>(method: &str) -> Result<A::Method, ThresholdError> {
    A::Method::parse(method).ok_or_else(|| ThresholdError::UnknownMethod { app: A::NAME.to_string(), method: method.to_string() })
}

#[async_trait]
impl<A: App> AppModule for A {
    fn name(&self) -> &'static str {
        A::NAME
    }

    fn app_id(&self) -> AppId {
        match A::APP_ID {
            Some(id) => AppId::from(id),
            None => AppId::for_app_name(A::NAME),
        }
    }

    fn audience(&self) -> ConfirmAudience {
        A::AUDIENCE
    }

    fn methods(&self) -> Vec<&'static str> {
        A::Method::names()
    }

    fn check_method(&self, method: &str) -> Result<(), ThresholdError> {
        method_of::<A>(method).map(|_| ())
    }

    async fn validate_request(&self, ctx: &AppCallContext<'_>, request: &AppRequest) -> Result<(), ThresholdError> {
        App::validate_request(self, ctx, method_of::<A>(&request.method)?, request).await
    }

    async fn on_arrive(&self, ctx: &AppCallContext<'_>, request: &AppRequest) -> Result<Option<Value>, ThresholdError> {
        App::on_arrive(self, ctx, method_of::<A>(&request.method)?, request).await
    }

    async fn on_request(&self, ctx: &AppCallContext<'_>, request: &AppRequest) -> Result<Value, ThresholdError> {
        App::on_request(self, ctx, method_of::<A>(&request.method)?, request).await
    }

    fn sign_params(&self, request: &AppRequest, result: &Value) -> Result<Vec<TypedValue>, ThresholdError> {
        App::sign_params(self, method_of::<A>(&request.method)?, request, result)
    }

    async fn on_confirm(&self, ctx: &AppCallContext<'_>, request: &AppRequest) -> Result<(), ThresholdError> {
        App::on_confirm(self, ctx, method_of::<A>(&request.method)?, request).await
    }

    fn on_mem_write(&self, request: &AppRequest) -> Result<Vec<MemWrite>, ThresholdError> {
        App::on_mem_write(self, method_of::<A>(&request.method)?, request)
    }

    async fn on_failed(&self, ctx: &AppCallContext<'_>, request: &AppRequest) -> Result<(), ThresholdError> {
        App::on_failed(self, ctx, method_of::<A>(&request.method)?, request).await
    }
}

#[derive(Default)]
pub struct AppRegistry {
    by_name: HashMap<String, Arc<dyn AppModule>>,
    by_id: HashMap<AppId, String>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in deployment app.
    pub fn with_deployment() -> Result<Self, ThresholdError> {
        let mut registry = Self::new();
        registry.register(DeploymentApp)?;
        Ok(registry)
    }

    pub fn register<A: App>(&mut self, app: A) -> Result<(), ThresholdError> {
        self.register_module(Arc::new(app))
    }

    pub fn register_module(&mut self, module: Arc<dyn AppModule>) -> Result<(), ThresholdError> {
        let name = module.name().to_string();
        let app_id = module.app_id();
        if self.by_name.contains_key(&name) {
            return Err(ThresholdError::ConfigError(format!("app {} registered twice", name)));
        }
        if let Some(other) = self.by_id.get(&app_id) {
            return Err(ThresholdError::ConfigError(format!("app id {} of {} already used by {}", app_id, name, other)));
        }
        info!("app registered name={} app_id={} methods={:?}", name, app_id, module.methods());
        self.by_id.insert(app_id, name.clone());
        self.by_name.insert(name, module);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn AppModule>, ThresholdError> {
        self.by_name.get(name).cloned().ok_or_else(|| ThresholdError::UnknownApp(name.to_string()))
    }

    pub fn get_by_id(&self, app_id: &AppId) -> Option<Arc<dyn AppModule>> {
        self.by_id.get(app_id).and_then(|name| self.by_name.get(name)).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::DEPLOYMENT_APP_ID;

    #[test]
    fn test_registry_rejects_duplicates_and_unknowns() {
        let mut registry = AppRegistry::with_deployment().expect("registry");
        assert!(registry.register(DeploymentApp).is_err());
        let deployment = registry.get("deployment").expect("deployment");
        assert_eq!(deployment.app_id(), AppId::from(DEPLOYMENT_APP_ID));
        assert_eq!(deployment.audience(), ConfirmAudience::Network);
        assert!(matches!(registry.get("nope"), Err(ThresholdError::UnknownApp(_))));
        assert!(matches!(deployment.check_method("tss-sign"), Err(ThresholdError::UnknownMethod { .. })));
        deployment.check_method("tss-rotate").expect("known method");
        assert!(registry.get_by_id(&AppId::from(DEPLOYMENT_APP_ID)).is_some());
    }
}
