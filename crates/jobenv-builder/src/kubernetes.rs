//! Kubeconfig generation for jobs authorized to use cluster agents.

use async_trait::async_trait;
use jobenv_core::deployer::{KubeconfigGenerator, KubeconfigTemplate};
use jobenv_core::job::Job;
use jobenv_core::{Error, Result};
use kube::config::Kubeconfig;
use serde_json::json;

const CLUSTER_NAME: &str = "gitlab";

/// Builds a kubeconfig with one context per authorized agent, all pointing at
/// the agent server. The first agent's context is the current one.
pub struct AgentKubeconfigGenerator {
    server_url: String,
}

impl AgentKubeconfigGenerator {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
        }
    }

    /// Assemble the typed kubeconfig for `job`.
    pub fn kubeconfig(&self, job: &Job) -> Result<Kubeconfig> {
        let clusters = if job.agents.is_empty() {
            vec![]
        } else {
            vec![json!({ "name": CLUSTER_NAME, "cluster": { "server": self.server_url } })]
        };

        let users: Vec<_> = job
            .agents
            .iter()
            .map(|agent| {
                json!({
                    "name": format!("agent:{}", agent.agent_id),
                    "user": { "token": format!("ci:{}:{}", agent.agent_id, job.token) },
                })
            })
            .collect();

        let contexts: Vec<_> = job
            .agents
            .iter()
            .map(|agent| {
                let mut context = json!({
                    "cluster": CLUSTER_NAME,
                    "user": format!("agent:{}", agent.agent_id),
                });
                if let Some(namespace) = &agent.default_namespace {
                    context["namespace"] = json!(namespace);
                }
                json!({ "name": agent.context_name(), "context": context })
            })
            .collect();

        let mut document = json!({
            "apiVersion": "v1",
            "kind": "Config",
            "clusters": clusters,
            "users": users,
            "contexts": contexts,
        });
        if let Some(first) = job.agents.first() {
            document["current-context"] = json!(first.context_name());
        }

        serde_json::from_value(document).map_err(|e| Error::Kubeconfig(e.to_string()))
    }
}

/// A kubeconfig is usable when it has a cluster and its current context exists.
pub fn is_valid(config: &Kubeconfig) -> bool {
    let Some(current) = &config.current_context else {
        return false;
    };
    !config.clusters.is_empty() && config.contexts.iter().any(|c| &c.name == current)
}

#[async_trait]
impl KubeconfigGenerator for AgentKubeconfigGenerator {
    async fn generate(&self, job: &Job) -> Result<KubeconfigTemplate> {
        let config = self.kubeconfig(job)?;
        let document =
            serde_json::to_string_pretty(&config).map_err(|e| Error::Kubeconfig(e.to_string()))?;
        Ok(KubeconfigTemplate {
            valid: is_valid(&config),
            document,
        })
    }
}
