//! Job context documents.
//!
//! A context describes one job, together with its pipeline, project and the
//! secret variables configured around it:
//!
//! ```kdl
//! project "acme/platform/api" url="https://git.example.com/acme/platform/api"
//! group "acme"
//! group "acme/platform"
//!
//! pipeline iid=42 sha="0f3c9a1b7d" source="push" {
//!     ref "main" protected=#true
//!     variable "DEPLOY_MODE" "canary"
//! }
//!
//! job "deploy" stage="deploy" runnable=#true {
//!     environment "production"
//!     variable "RAILS_ENV" "production"
//! }
//!
//! secret "API_KEY" "s3cr3t-value" level="project" masked=#true
//! ```

use jobenv_core::ResourceId;
use jobenv_core::job::{
    AgentAuthorization, GitRef, Group, Job, Parallel, Pipeline, PipelineSchedule, PipelineSource,
    Project, Runner, TriggerRequest, User,
};
use jobenv_core::secret::{DEFAULT_ENVIRONMENT_SCOPE, SecretVariable, VariableLevel};
use jobenv_core::{VariableCollection, VariableEntry};
use kdl::{KdlDocument, KdlNode};
use std::collections::HashMap;
use std::path::Path;

use crate::kdl_util::{
    bool_prop, children, first_integer_arg, first_string_arg, integer_prop, string_args,
    string_prop, unsigned,
};
use crate::{ConfigError, ConfigResult};

/// Everything needed to resolve the variables of one job.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub project: Project,
    pub pipeline: Pipeline,
    pub job: Job,
    pub environment: Option<String>,
    /// Variables each deployment environment contributes.
    pub deployments: HashMap<String, VariableCollection>,
    pub secrets: Vec<SecretVariable>,
}

impl JobContext {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        parse_job_context(&text)
    }
}

/// A secret whose group owner is still a path.
struct PendingSecret {
    variable: SecretVariable,
    group_path: Option<String>,
}

/// Parse a job context from KDL text.
pub fn parse_job_context(kdl: &str) -> ConfigResult<JobContext> {
    let doc: KdlDocument = kdl.parse()?;

    let mut project: Option<Project> = None;
    let mut groups = Vec::new();
    let mut pipeline: Option<Pipeline> = None;
    let mut job: Option<(Job, Option<String>)> = None;
    let mut deployments = HashMap::new();
    let mut pending = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "project" => project = Some(parse_project(node)?),
            "group" => {
                let full_path = first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("group path".to_string()))?;
                groups.push(Group {
                    id: ResourceId::new(),
                    full_path,
                });
            }
            "pipeline" => pipeline = Some(parse_pipeline(node)?),
            "job" => job = Some(parse_job(node)?),
            "deployment" => {
                let environment = first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("deployment environment".to_string()))?;
                deployments.insert(environment, parse_variables(node, "variable")?);
            }
            "secret" => pending.push(parse_secret(node)?),
            _ => {} // Ignore unknown nodes
        }
    }

    let mut project = project.ok_or_else(|| ConfigError::MissingField("project".to_string()))?;
    let pipeline = pipeline.ok_or_else(|| ConfigError::MissingField("pipeline".to_string()))?;
    let (job, environment) = job.ok_or_else(|| ConfigError::MissingField("job".to_string()))?;
    project.groups = groups;

    let secrets = pending
        .into_iter()
        .map(|p| resolve_owner(p, &project))
        .collect::<ConfigResult<Vec<_>>>()?;

    Ok(JobContext {
        project,
        pipeline,
        job,
        environment,
        deployments,
        secrets,
    })
}

fn parse_project(node: &KdlNode) -> ConfigResult<Project> {
    let full_path = first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("project path".to_string()))?;
    let name = full_path
        .rsplit('/')
        .next()
        .unwrap_or(full_path.as_str())
        .to_string();

    Ok(Project {
        id: ResourceId::new(),
        name,
        web_url: string_prop(node, "url"),
        predefined: parse_variables(node, "predefined")?,
        full_path,
        groups: Vec::new(),
    })
}

fn parse_pipeline(node: &KdlNode) -> ConfigResult<Pipeline> {
    let iid = match integer_prop(node, "iid") {
        Some(value) => unsigned(value, "pipeline iid")?,
        None => 1,
    };
    let sha = string_prop(node, "sha").unwrap_or_default();
    let source = match string_prop(node, "source") {
        Some(source) => parse_source(&source)?,
        None => PipelineSource::default(),
    };

    let mut git_ref = None;
    let mut schedule = None;
    for child in children(node) {
        match child.name().value() {
            "ref" => {
                let name = first_string_arg(child)
                    .ok_or_else(|| ConfigError::MissingField("pipeline ref".to_string()))?;
                git_ref = Some(GitRef {
                    name,
                    tag: bool_prop(child, "tag"),
                    protected: bool_prop(child, "protected"),
                });
            }
            "schedule" => {
                schedule = Some(PipelineSchedule {
                    id: ResourceId::new(),
                    description: first_string_arg(child).unwrap_or_default(),
                    variables: parse_variables(child, "variable")?,
                });
            }
            _ => {}
        }
    }

    let git_ref = git_ref.ok_or_else(|| ConfigError::MissingField("pipeline ref".to_string()))?;
    let mut pipeline = Pipeline::new(iid, sha, git_ref);
    pipeline.source = source;
    pipeline.schedule = schedule;
    pipeline.variables = parse_variables(node, "variable")?;
    pipeline.predefined = parse_variables(node, "predefined")?;
    Ok(pipeline)
}

fn parse_source(source: &str) -> ConfigResult<PipelineSource> {
    Ok(match source {
        "push" => PipelineSource::Push,
        "web" => PipelineSource::Web,
        "trigger" => PipelineSource::Trigger,
        "schedule" => PipelineSource::Schedule,
        "api" => PipelineSource::Api,
        "merge_request_event" => PipelineSource::MergeRequestEvent,
        other => {
            return Err(ConfigError::InvalidValue {
                field: "pipeline source".to_string(),
                message: format!("unknown source: {other}"),
            });
        }
    })
}

fn parse_job(node: &KdlNode) -> ConfigResult<(Job, Option<String>)> {
    let name = first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("job name".to_string()))?;
    let stage = string_prop(node, "stage").unwrap_or_else(|| "test".to_string());

    let mut job = Job::new(name, stage);
    job.manual = bool_prop(node, "manual");
    job.runnable = bool_prop(node, "runnable");
    job.yaml_variables = parse_variables(node, "variable")?;
    job.dependency_variables = parse_variables(node, "dependency")?;

    let mut environment = None;
    for child in children(node) {
        match child.name().value() {
            "environment" => environment = first_string_arg(child),
            "namespace" => job.kubernetes_namespace = first_string_arg(child),
            "token" => job.token = first_string_arg(child).unwrap_or_default(),
            "node-index" => {
                let value = first_integer_arg(child)
                    .ok_or_else(|| ConfigError::MissingField("job node-index".to_string()))?;
                job.node_index = Some(unsigned(value, "job node-index")?);
            }
            "parallel" => {
                job.parallel = Some(match integer_prop(child, "matrix") {
                    Some(total) => Parallel::Matrix {
                        total: unsigned(total, "job parallel matrix")?,
                    },
                    None => {
                        let count = first_integer_arg(child)
                            .ok_or_else(|| ConfigError::MissingField("job parallel".to_string()))?;
                        Parallel::Count(unsigned(count, "job parallel")?)
                    }
                });
            }
            "trigger" => {
                job.trigger = Some(TriggerRequest {
                    id: ResourceId::new(),
                    variables: parse_variables(child, "variable")?,
                });
            }
            "runner" => {
                job.runner = Some(Runner {
                    id: ResourceId::new(),
                    description: first_string_arg(child).unwrap_or_default(),
                    tags: children(child)
                        .filter(|c| c.name().value() == "tag")
                        .flat_map(string_args)
                        .collect(),
                });
            }
            "user" => {
                let username = first_string_arg(child)
                    .ok_or_else(|| ConfigError::MissingField("user login".to_string()))?;
                job.user = Some(User {
                    id: ResourceId::new(),
                    email: string_prop(child, "email").unwrap_or_default(),
                    name: string_prop(child, "name").unwrap_or_else(|| username.clone()),
                    username,
                });
            }
            "agent" => {
                let agent_name = first_string_arg(child)
                    .ok_or_else(|| ConfigError::MissingField("agent name".to_string()))?;
                let config_project_path = string_prop(child, "project")
                    .ok_or_else(|| ConfigError::MissingField(format!("project for agent '{agent_name}'")))?;
                job.agents.push(AgentAuthorization {
                    agent_id: ResourceId::new(),
                    agent_name,
                    config_project_path,
                    default_namespace: string_prop(child, "namespace"),
                });
            }
            _ => {}
        }
    }

    Ok((job, environment))
}

/// Collect `<node_name> "KEY" "value"` children into a collection, in order.
fn parse_variables(node: &KdlNode, node_name: &str) -> ConfigResult<VariableCollection> {
    children(node)
        .filter(|c| c.name().value() == node_name)
        .map(parse_variable)
        .collect()
}

fn parse_variable(node: &KdlNode) -> ConfigResult<VariableEntry> {
    let args = string_args(node);
    let (key, value) = match args.as_slice() {
        [key, value, ..] => (key.clone(), value.clone()),
        [key] => (key.clone(), String::new()),
        [] => return Err(ConfigError::MissingField("variable key".to_string())),
    };

    let mut entry = VariableEntry::new(key, value)?;
    if bool_prop(node, "secret") {
        entry = entry.secret();
    }
    if bool_prop(node, "masked") {
        entry = entry.masked();
    }
    if bool_prop(node, "file") {
        entry = entry.file();
    }
    if bool_prop(node, "raw") {
        entry = entry.raw();
    }
    Ok(entry)
}

fn parse_secret(node: &KdlNode) -> ConfigResult<PendingSecret> {
    let args = string_args(node);
    let [key, value] = args.as_slice() else {
        return Err(ConfigError::MissingField("secret key and value".to_string()));
    };
    if key.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "secret key".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    let level = string_prop(node, "level").unwrap_or_else(|| "project".to_string());
    let group_path = match level.as_str() {
        "group" => Some(
            string_prop(node, "group")
                .ok_or_else(|| ConfigError::MissingField(format!("group for secret '{key}'")))?,
        ),
        "instance" | "project" => None,
        other => {
            return Err(ConfigError::InvalidValue {
                field: "secret level".to_string(),
                message: format!("unknown level: {other}"),
            });
        }
    };
    // Placeholder owner until the project and groups are known.
    let owner = if level == "instance" {
        VariableLevel::Instance
    } else {
        VariableLevel::Project(ResourceId::default())
    };

    let variable = SecretVariable {
        key: key.clone(),
        value: value.clone(),
        protected: bool_prop(node, "protected"),
        masked: bool_prop(node, "masked"),
        raw: bool_prop(node, "raw"),
        file: bool_prop(node, "file"),
        environment_scope: string_prop(node, "scope")
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT_SCOPE.to_string()),
        owner,
    };
    Ok(PendingSecret {
        variable,
        group_path,
    })
}

fn resolve_owner(pending: PendingSecret, project: &Project) -> ConfigResult<SecretVariable> {
    let PendingSecret {
        mut variable,
        group_path,
    } = pending;

    variable.owner = match (variable.owner, group_path) {
        (VariableLevel::Instance, _) => VariableLevel::Instance,
        (_, Some(path)) => {
            let group = project
                .groups
                .iter()
                .find(|g| g.full_path == path)
                .ok_or_else(|| {
                    ConfigError::InvalidReference(format!(
                        "secret '{}' belongs to unknown group '{path}'",
                        variable.key
                    ))
                })?;
            VariableLevel::Group(group.id)
        }
        (_, None) => VariableLevel::Project(project.id),
    };
    Ok(variable)
}
