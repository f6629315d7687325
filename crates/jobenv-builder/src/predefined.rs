//! System-computed variables.

use jobenv_core::job::{Job, Pipeline, Project, Runner, User};
use jobenv_core::{Result, VariableCollection, VariableEntry};

fn entry(key: &str, value: impl Into<String>) -> Result<VariableEntry> {
    VariableEntry::new(key, value)
}

/// Job-intrinsic variables, followed by their legacy `CI_BUILD_*` aliases.
pub fn job_variables(job: &Job) -> Result<VariableCollection> {
    let mut vars = VariableCollection::new();
    vars.append(entry("CI_JOB_NAME", &job.name)?);
    vars.append(entry("CI_JOB_STAGE", &job.stage)?);
    if job.manual {
        vars.append(entry("CI_JOB_MANUAL", "true")?);
    }
    if job.trigger.is_some() {
        vars.append(entry("CI_PIPELINE_TRIGGERED", "true")?);
    }
    if let Some(index) = job.node_index {
        vars.append(entry("CI_NODE_INDEX", index.to_string())?);
    }
    vars.append(entry("CI_NODE_TOTAL", job.node_total().to_string())?);

    // legacy variables
    vars.append(entry("CI_BUILD_NAME", &job.name)?);
    vars.append(entry("CI_BUILD_STAGE", &job.stage)?);
    if job.trigger.is_some() {
        vars.append(entry("CI_BUILD_TRIGGERED", "true")?);
    }
    if job.manual {
        vars.append(entry("CI_BUILD_MANUAL", "true")?);
    }
    Ok(vars)
}

pub fn project_variables(project: &Project) -> Result<VariableCollection> {
    let mut vars = VariableCollection::new();
    vars.append(entry("CI_PROJECT_ID", project.id.to_string())?);
    vars.append(entry("CI_PROJECT_NAME", &project.name)?);
    vars.append(entry("CI_PROJECT_PATH", &project.full_path)?);
    vars.append(entry("CI_PROJECT_NAMESPACE", project.namespace())?);
    if let Some(url) = &project.web_url {
        vars.append(entry("CI_PROJECT_URL", url)?);
    }
    vars.concat(&project.predefined);
    Ok(vars)
}

pub fn pipeline_variables(pipeline: &Pipeline) -> Result<VariableCollection> {
    let mut vars = VariableCollection::new();
    vars.append(entry("CI_PIPELINE_ID", pipeline.id.to_string())?);
    vars.append(entry("CI_PIPELINE_IID", pipeline.iid.to_string())?);
    vars.append(entry("CI_PIPELINE_SOURCE", pipeline.source.as_str())?);
    vars.append(entry("CI_COMMIT_SHA", &pipeline.sha)?);
    vars.append(entry("CI_COMMIT_SHORT_SHA", pipeline.short_sha())?);
    vars.append(entry("CI_COMMIT_REF_NAME", &pipeline.git_ref.name)?);
    if pipeline.git_ref.tag {
        vars.append(entry("CI_COMMIT_TAG", &pipeline.git_ref.name)?);
    } else {
        vars.append(entry("CI_COMMIT_BRANCH", &pipeline.git_ref.name)?);
    }
    vars.append(entry(
        "CI_COMMIT_REF_PROTECTED",
        pipeline.git_ref.protected.to_string(),
    )?);
    vars.concat(&pipeline.predefined);
    Ok(vars)
}

pub fn runner_variables(runner: &Runner) -> Result<VariableCollection> {
    let mut vars = VariableCollection::new();
    vars.append(entry("CI_RUNNER_ID", runner.id.to_string())?);
    vars.append(entry("CI_RUNNER_DESCRIPTION", &runner.description)?);
    vars.append(entry("CI_RUNNER_TAGS", runner.tags.join(", "))?);
    Ok(vars)
}

pub fn user_variables(user: &User) -> Result<VariableCollection> {
    let mut vars = VariableCollection::new();
    vars.append(entry("GITLAB_USER_ID", user.id.to_string())?);
    vars.append(entry("GITLAB_USER_EMAIL", &user.email)?);
    vars.append(entry("GITLAB_USER_LOGIN", &user.username)?);
    vars.append(entry("GITLAB_USER_NAME", &user.name)?);
    Ok(vars)
}
