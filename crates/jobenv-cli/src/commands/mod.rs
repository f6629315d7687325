//! CLI command implementations.

pub mod mask_check;
pub mod resolve;

use async_trait::async_trait;
use jobenv_builder::{AgentKubeconfigGenerator, BuildRequest, VariableBuilder};
use jobenv_config::{JobContext, ResolverConfig};
use jobenv_core::VariableCollection;
use jobenv_core::deployer::DeploymentVariables;
use jobenv_core::job::Project;
use jobenv_store::{
    GroupVariableStore, InstanceVariableStore, MemoryRecordSource, ProjectVariableStore,
    specificity,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub struct Settings {
    pub config: ResolverConfig,
    pub agent_server: url::Url,
}

impl Settings {
    pub fn load(path: Option<&Path>, agent_server: url::Url) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => ResolverConfig::load(path)?,
            None => ResolverConfig::default(),
        };
        Ok(Self {
            config,
            agent_server,
        })
    }
}

/// Deployment variables taken from the context file.
struct ContextDeployments(HashMap<String, VariableCollection>);

#[async_trait]
impl DeploymentVariables for ContextDeployments {
    async fn variables_for(
        &self,
        _project: &Project,
        environment: &str,
        _kubernetes_namespace: Option<&str>,
    ) -> jobenv_core::Result<VariableCollection> {
        Ok(self.0.get(environment).cloned().unwrap_or_default())
    }
}

/// Load a context file and resolve its job.
pub async fn resolve_context(
    settings: &Settings,
    path: &Path,
    environment: Option<String>,
    dependencies: bool,
) -> anyhow::Result<(JobContext, VariableCollection)> {
    let ctx = JobContext::load(path)?;
    let environment = environment.or_else(|| ctx.environment.clone());

    let source = Arc::new(MemoryRecordSource::with_records(ctx.secrets.clone()));
    let instance = InstanceVariableStore::new(source.clone())
        .with_ttl(settings.config.cache.instance_ttl)
        .with_max_value_length(settings.config.limits.max_value_length);
    let builder = VariableBuilder::new(
        Arc::new(instance),
        Arc::new(GroupVariableStore::new(source.clone())),
        Arc::new(ProjectVariableStore::new(source)),
        Arc::new(ContextDeployments(ctx.deployments.clone())),
        Arc::new(AgentKubeconfigGenerator::new(settings.agent_server.as_str())),
    );

    info!(job = %ctx.job.name, environment = ?environment, "Resolving variables");
    let mut request = BuildRequest::new(&ctx.project, &ctx.pipeline, &ctx.job)
        .environment(environment.as_deref());
    if dependencies {
        request = request.with_dependencies();
    }
    let variables = builder.scoped_variables(request).await?;

    Ok((ctx, variables))
}

pub fn scope_match(pattern: &str, environment: &str) {
    if jobenv_store::matches(pattern, environment) {
        println!("match ({:?})", specificity(pattern));
    } else {
        println!("no match");
    }
}
