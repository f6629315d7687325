//! Collaborators that contribute deployment-related variables.
//!
//! Both may reach out over the network; the builder treats any failure as
//! "no contribution" for the step.

use async_trait::async_trait;

use crate::job::{Job, Project};
use crate::{Result, VariableCollection};

/// Resolves variables for a deployment target.
#[async_trait]
pub trait DeploymentVariables: Send + Sync {
    async fn variables_for(
        &self,
        project: &Project,
        environment: &str,
        kubernetes_namespace: Option<&str>,
    ) -> Result<VariableCollection>;
}

/// A generated kubeconfig document plus whether it is usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeconfigTemplate {
    pub document: String,
    pub valid: bool,
}

/// Generates a kubeconfig for a job.
#[async_trait]
pub trait KubeconfigGenerator: Send + Sync {
    async fn generate(&self, job: &Job) -> Result<KubeconfigTemplate>;
}

/// Deployment resolver for installations without deployment targets.
pub struct NoDeployments;

#[async_trait]
impl DeploymentVariables for NoDeployments {
    async fn variables_for(
        &self,
        _project: &Project,
        _environment: &str,
        _kubernetes_namespace: Option<&str>,
    ) -> Result<VariableCollection> {
        Ok(VariableCollection::new())
    }
}
