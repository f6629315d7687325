//! Read-only descriptors of the job being resolved and its pipeline and project.
//!
//! These are supplied by the caller fully materialized; nothing here is
//! computed lazily or fetched.

use serde::{Deserialize, Serialize};

use crate::{ResourceId, VariableCollection};

/// The branch or tag a pipeline runs for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRef {
    pub name: String,
    #[serde(default)]
    pub tag: bool,
    /// Protection is decided outside this crate.
    #[serde(default)]
    pub protected: bool,
}

impl GitRef {
    pub fn branch(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: false,
            protected: false,
        }
    }

    pub fn tag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: true,
            protected: false,
        }
    }

    pub fn protected(mut self) -> Self {
        self.protected = true;
        self
    }
}

/// A group in a project's namespace hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: ResourceId,
    pub full_path: String,
}

#[derive(Debug, Clone, Default)]
pub struct Project {
    pub id: ResourceId,
    pub name: String,
    pub full_path: String,
    pub web_url: Option<String>,
    /// Ancestor groups, root first. Empty for personal projects.
    pub groups: Vec<Group>,
    /// Extra predefined variables the caller already computed.
    pub predefined: VariableCollection,
}

impl Project {
    /// Namespace part of the full path.
    pub fn namespace(&self) -> &str {
        self.full_path
            .rsplit_once('/')
            .map(|(ns, _)| ns)
            .unwrap_or_default()
    }
}

/// What created a pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineSource {
    #[default]
    Push,
    Web,
    Trigger,
    Schedule,
    Api,
    MergeRequestEvent,
}

impl PipelineSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineSource::Push => "push",
            PipelineSource::Web => "web",
            PipelineSource::Trigger => "trigger",
            PipelineSource::Schedule => "schedule",
            PipelineSource::Api => "api",
            PipelineSource::MergeRequestEvent => "merge_request_event",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineSchedule {
    pub id: ResourceId,
    pub description: String,
    pub variables: VariableCollection,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    pub id: ResourceId,
    /// Per-project sequence number.
    pub iid: u64,
    pub source: PipelineSource,
    pub sha: String,
    pub git_ref: GitRef,
    /// Variables entered by a user when the pipeline was created.
    pub variables: VariableCollection,
    pub schedule: Option<PipelineSchedule>,
    pub predefined: VariableCollection,
}

impl Pipeline {
    pub fn new(iid: u64, sha: impl Into<String>, git_ref: GitRef) -> Self {
        Self {
            id: ResourceId::new(),
            iid,
            source: PipelineSource::default(),
            sha: sha.into(),
            git_ref,
            variables: VariableCollection::new(),
            schedule: None,
            predefined: VariableCollection::new(),
        }
    }

    pub fn short_sha(&self) -> &str {
        let end = self
            .sha
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.sha.len());
        &self.sha[..end]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: ResourceId,
    pub email: String,
    pub username: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runner {
    pub id: ResourceId,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Request that launched a job through a pipeline trigger.
#[derive(Debug, Clone, Default)]
pub struct TriggerRequest {
    pub id: ResourceId,
    pub variables: VariableCollection,
}

/// Parallel configuration of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parallel {
    Count(u32),
    Matrix { total: u32 },
}

impl Parallel {
    pub fn total(&self) -> u32 {
        match self {
            Parallel::Count(n) => *n,
            Parallel::Matrix { total } => *total,
        }
    }
}

/// A cluster agent the job is authorized to use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentAuthorization {
    pub agent_id: ResourceId,
    pub agent_name: String,
    pub config_project_path: String,
    #[serde(default)]
    pub default_namespace: Option<String>,
}

impl AgentAuthorization {
    /// Name used for the kubeconfig cluster, user and context.
    pub fn context_name(&self) -> String {
        format!("{}:{}", self.config_project_path, self.agent_name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Job {
    pub id: ResourceId,
    pub name: String,
    pub stage: String,
    /// Job token used to authenticate against cluster agents.
    pub token: String,
    /// Requires a manual action to start.
    pub manual: bool,
    pub trigger: Option<TriggerRequest>,
    pub node_index: Option<u32>,
    pub parallel: Option<Parallel>,
    /// Whether the job can be picked by a runner right now.
    pub runnable: bool,
    pub runner: Option<Runner>,
    pub user: Option<User>,
    pub kubernetes_namespace: Option<String>,
    pub agents: Vec<AgentAuthorization>,
    pub yaml_variables: VariableCollection,
    pub dependency_variables: VariableCollection,
}

impl Job {
    pub fn new(name: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stage: stage.into(),
            ..Default::default()
        }
    }

    /// Value of `CI_NODE_TOTAL`.
    pub fn node_total(&self) -> u32 {
        self.parallel.map(|p| p.total()).unwrap_or(1)
    }
}
