//! Assembles the variable collection of a job.
//!
//! Every source is a [`Step`]; [`PRECEDENCE`] lists them from lowest to
//! highest priority. Each step's output is appended to one collection, so a
//! later step overrides an earlier one on the same key once the collection is
//! resolved last-wins.

use jobenv_core::deployer::{DeploymentVariables, KubeconfigGenerator};
use jobenv_core::job::{Job, Pipeline, Project};
use jobenv_core::secret::{SecretVariableStore, VariableQuery};
use jobenv_core::{Error, Result, VariableCollection, VariableEntry};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::predefined;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    JobPredefined,
    ProjectPredefined,
    PipelinePredefined,
    RunnerPredefined,
    Kubeconfig,
    Deployment,
    JobYaml,
    User,
    Dependencies,
    InstanceSecrets,
    GroupSecrets,
    ProjectSecrets,
    TriggerVariables,
    PipelineVariables,
    ScheduleVariables,
}

/// Lowest priority first.
pub const PRECEDENCE: [Step; 15] = [
    Step::JobPredefined,
    Step::ProjectPredefined,
    Step::PipelinePredefined,
    Step::RunnerPredefined,
    Step::Kubeconfig,
    Step::Deployment,
    Step::JobYaml,
    Step::User,
    Step::Dependencies,
    Step::InstanceSecrets,
    Step::GroupSecrets,
    Step::ProjectSecrets,
    Step::TriggerVariables,
    Step::PipelineVariables,
    Step::ScheduleVariables,
];

/// The job to resolve, with its pipeline and project.
#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
    pub project: &'a Project,
    pub pipeline: &'a Pipeline,
    pub job: &'a Job,
    pub environment: Option<&'a str>,
    /// Include the outputs of the job's dependencies.
    pub dependencies: bool,
}

impl<'a> BuildRequest<'a> {
    pub fn new(project: &'a Project, pipeline: &'a Pipeline, job: &'a Job) -> Self {
        Self {
            project,
            pipeline,
            job,
            environment: None,
            dependencies: false,
        }
    }

    pub fn environment(mut self, environment: Option<&'a str>) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_dependencies(mut self) -> Self {
        self.dependencies = true;
        self
    }

    fn query(&self) -> VariableQuery<'a> {
        let pipeline: &'a Pipeline = self.pipeline;
        VariableQuery {
            project: self.project,
            git_ref: &pipeline.git_ref,
            environment: self.environment,
        }
    }
}

pub struct VariableBuilder {
    instance: Arc<dyn SecretVariableStore>,
    group: Arc<dyn SecretVariableStore>,
    project: Arc<dyn SecretVariableStore>,
    deployments: Arc<dyn DeploymentVariables>,
    kubeconfig: Arc<dyn KubeconfigGenerator>,
}

impl VariableBuilder {
    pub fn new(
        instance: Arc<dyn SecretVariableStore>,
        group: Arc<dyn SecretVariableStore>,
        project: Arc<dyn SecretVariableStore>,
        deployments: Arc<dyn DeploymentVariables>,
        kubeconfig: Arc<dyn KubeconfigGenerator>,
    ) -> Self {
        Self {
            instance,
            group,
            project,
            deployments,
            kubeconfig,
        }
    }

    /// Build the variable collection for a job.
    ///
    /// A failing step contributes nothing and the build continues, except for
    /// secret store failures: those are returned, since silently dropping
    /// secret variables would change what the job runs with.
    pub async fn scoped_variables(&self, request: BuildRequest<'_>) -> Result<VariableCollection> {
        let mut variables = VariableCollection::new();

        for step in PRECEDENCE {
            match self.run_step(step, &request).await {
                Ok(Some(contribution)) => {
                    debug!(job = %request.job.name, ?step, count = contribution.len(), "Step contributed variables");
                    variables.concat(&contribution);
                }
                Ok(None) => {
                    debug!(job = %request.job.name, ?step, "Step skipped");
                }
                Err(e) if e.is_fatal() => {
                    error!(job = %request.job.name, ?step, error = %e, "Variable resolution failed");
                    return Err(e);
                }
                Err(e) => {
                    warn!(job = %request.job.name, ?step, error = %e, "Step failed, contributing no variables");
                }
            }
        }

        Ok(variables)
    }

    /// `Ok(None)` means the step does not apply to this job.
    async fn run_step(
        &self,
        step: Step,
        request: &BuildRequest<'_>,
    ) -> Result<Option<VariableCollection>> {
        let job = request.job;
        let pipeline = request.pipeline;

        match step {
            Step::JobPredefined => predefined::job_variables(job).map(Some),
            Step::ProjectPredefined => predefined::project_variables(request.project).map(Some),
            Step::PipelinePredefined => predefined::pipeline_variables(pipeline).map(Some),
            Step::RunnerPredefined => match &job.runner {
                Some(runner) if job.runnable => predefined::runner_variables(runner).map(Some),
                _ => Ok(None),
            },
            Step::Kubeconfig => self.kubernetes_variables(job).await,
            Step::Deployment => {
                let Some(environment) = request.environment else {
                    return Ok(None);
                };
                self.deployments
                    .variables_for(
                        request.project,
                        environment,
                        job.kubernetes_namespace.as_deref(),
                    )
                    .await
                    .map(Some)
            }
            Step::JobYaml => Ok(Some(job.yaml_variables.clone())),
            Step::User => match &job.user {
                Some(user) => predefined::user_variables(user).map(Some),
                None => Ok(None),
            },
            Step::Dependencies => {
                if !request.dependencies {
                    return Ok(None);
                }
                Ok(Some(job.dependency_variables.clone()))
            }
            Step::InstanceSecrets => self.secret_variables(&self.instance, request).await,
            Step::GroupSecrets => {
                if request.project.groups.is_empty() {
                    return Ok(None);
                }
                self.secret_variables(&self.group, request).await
            }
            Step::ProjectSecrets => self.secret_variables(&self.project, request).await,
            Step::TriggerVariables => Ok(job.trigger.as_ref().map(|t| t.variables.clone())),
            Step::PipelineVariables => Ok(Some(pipeline.variables.clone())),
            Step::ScheduleVariables => Ok(pipeline.schedule.as_ref().map(|s| s.variables.clone())),
        }
    }

    async fn kubernetes_variables(&self, job: &Job) -> Result<Option<VariableCollection>> {
        let template = self.kubeconfig.generate(job).await?;
        if !template.valid {
            return Ok(None);
        }
        let entry = VariableEntry::new("KUBECONFIG", template.document)?
            .secret()
            .file();
        Ok(Some(VariableCollection::from(vec![entry])))
    }

    async fn secret_variables(
        &self,
        store: &Arc<dyn SecretVariableStore>,
        request: &BuildRequest<'_>,
    ) -> Result<Option<VariableCollection>> {
        let records = store.variables_for(request.query()).await?;
        // A record that cannot become an entry fails the level as a whole.
        let entries = records
            .iter()
            .map(|record| record.to_entry())
            .collect::<Result<VariableCollection>>()
            .map_err(|e| Error::SecretStore {
                level: store.level_name().to_string(),
                message: e.to_string(),
            })?;
        Ok(Some(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kubernetes::AgentKubeconfigGenerator;
    use async_trait::async_trait;
    use jobenv_core::deployer::{KubeconfigTemplate, NoDeployments};
    use jobenv_core::job::{
        AgentAuthorization, GitRef, Group, PipelineSchedule, Runner, TriggerRequest, User,
    };
    use jobenv_core::secret::{SecretVariable, VariableLevel};
    use jobenv_core::ResourceId;
    use jobenv_store::{
        GroupVariableStore, InstanceVariableStore, MemoryRecordSource, ProjectVariableStore,
    };

    struct Fixture {
        project: Project,
        pipeline: Pipeline,
        job: Job,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                project: Project {
                    name: "api".to_string(),
                    full_path: "acme/api".to_string(),
                    ..Default::default()
                },
                pipeline: Pipeline::new(1, "0123456789abcdef", GitRef::branch("feature")),
                job: Job::new("rspec", "test"),
            }
        }

        fn request(&self) -> BuildRequest<'_> {
            BuildRequest::new(&self.project, &self.pipeline, &self.job)
        }
    }

    fn entry(key: &str, value: &str) -> VariableEntry {
        VariableEntry::new(key, value).unwrap()
    }

    fn builder_with(secrets: Vec<SecretVariable>) -> VariableBuilder {
        builder_with_collaborators(
            secrets,
            Arc::new(NoDeployments),
            Arc::new(AgentKubeconfigGenerator::new("https://kas.example.com")),
        )
    }

    fn builder_with_collaborators(
        secrets: Vec<SecretVariable>,
        deployments: Arc<dyn DeploymentVariables>,
        kubeconfig: Arc<dyn KubeconfigGenerator>,
    ) -> VariableBuilder {
        let source = Arc::new(MemoryRecordSource::with_records(secrets));
        VariableBuilder::new(
            Arc::new(InstanceVariableStore::new(source.clone())),
            Arc::new(GroupVariableStore::new(source.clone())),
            Arc::new(ProjectVariableStore::new(source)),
            deployments,
            kubeconfig,
        )
    }

    struct StaticDeployments(VariableCollection);

    #[async_trait]
    impl DeploymentVariables for StaticDeployments {
        async fn variables_for(
            &self,
            _project: &Project,
            _environment: &str,
            _namespace: Option<&str>,
        ) -> Result<VariableCollection> {
            Ok(self.0.clone())
        }
    }

    struct BrokenDeployments;

    #[async_trait]
    impl DeploymentVariables for BrokenDeployments {
        async fn variables_for(
            &self,
            _project: &Project,
            _environment: &str,
            _namespace: Option<&str>,
        ) -> Result<VariableCollection> {
            Err(Error::Deployment("cluster unreachable".to_string()))
        }
    }

    struct BrokenKubeconfig;

    #[async_trait]
    impl KubeconfigGenerator for BrokenKubeconfig {
        async fn generate(&self, _job: &Job) -> Result<KubeconfigTemplate> {
            Err(Error::Kubeconfig("malformed template".to_string()))
        }
    }

    struct FailingStore;

    #[async_trait]
    impl SecretVariableStore for FailingStore {
        fn level_name(&self) -> &'static str {
            "instance"
        }

        async fn variables_for(&self, _query: VariableQuery<'_>) -> Result<Vec<SecretVariable>> {
            Err(Error::SecretStore {
                level: "instance".to_string(),
                message: "connection refused".to_string(),
            })
        }
    }

    #[test]
    fn test_precedence_order() {
        assert_eq!(PRECEDENCE.len(), 15);
        assert_eq!(PRECEDENCE[0], Step::JobPredefined);
        assert_eq!(PRECEDENCE[9], Step::InstanceSecrets);
        assert_eq!(PRECEDENCE[11], Step::ProjectSecrets);
        assert_eq!(PRECEDENCE[14], Step::ScheduleVariables);
    }

    #[tokio::test]
    async fn test_minimal_job_only_has_intrinsic_sources() {
        let mut fixture = Fixture::new();
        fixture.job.yaml_variables.append(entry("RAILS_ENV", "test"));
        fixture
            .job
            .dependency_variables
            .append(entry("BUILD_VERSION", "1.0"));

        let vars = builder_with(vec![])
            .scoped_variables(fixture.request())
            .await
            .unwrap();

        let mut expected = predefined::job_variables(&fixture.job).unwrap();
        expected.concat(&predefined::project_variables(&fixture.project).unwrap());
        expected.concat(&predefined::pipeline_variables(&fixture.pipeline).unwrap());
        expected.concat(&fixture.job.yaml_variables);
        assert_eq!(vars, expected);

        assert!(vars.get("GITLAB_USER_ID").is_none());
        assert!(vars.get("BUILD_VERSION").is_none());
        assert!(vars.get("KUBECONFIG").is_none());
    }

    #[tokio::test]
    async fn test_schedule_variable_overrides_project_secret() {
        let mut fixture = Fixture::new();
        fixture.pipeline.schedule = Some(PipelineSchedule {
            variables: vec![entry("API_KEY", "secret2")].into(),
            ..Default::default()
        });
        let secrets = vec![SecretVariable::new(
            VariableLevel::Project(fixture.project.id),
            "API_KEY",
            "secret1",
        )];

        let vars = builder_with(secrets)
            .scoped_variables(fixture.request())
            .await
            .unwrap();

        assert_eq!(vars.to_effective_map()["API_KEY"].value(), "secret2");
        // Both definitions are present, in precedence order.
        let values: Vec<_> = vars
            .iter()
            .filter(|e| e.key() == "API_KEY")
            .map(|e| e.value())
            .collect();
        assert_eq!(values, vec!["secret1", "secret2"]);
    }

    #[tokio::test]
    async fn test_protected_secret_hidden_from_unprotected_ref() {
        let fixture = Fixture::new();
        let secrets = vec![
            SecretVariable::new(
                VariableLevel::Project(fixture.project.id),
                "DEPLOY_TOKEN",
                "token-value",
            )
            .protected(),
        ];

        let vars = builder_with(secrets.clone())
            .scoped_variables(fixture.request())
            .await
            .unwrap();
        assert!(!vars.to_effective_map().contains_key("DEPLOY_TOKEN"));

        let mut protected = Fixture::new();
        protected.project.id = fixture.project.id;
        protected.pipeline.git_ref = GitRef::branch("main").protected();
        let vars = builder_with(secrets)
            .scoped_variables(protected.request())
            .await
            .unwrap();
        assert_eq!(vars.get("DEPLOY_TOKEN").unwrap().value(), "token-value");
    }

    #[tokio::test]
    async fn test_secret_levels_layer_instance_group_project() {
        let mut fixture = Fixture::new();
        let group = Group {
            id: ResourceId::new(),
            full_path: "acme".to_string(),
        };
        fixture.project.groups = vec![group.clone()];
        let secrets = vec![
            SecretVariable::new(VariableLevel::Project(fixture.project.id), "REGISTRY", "project"),
            SecretVariable::new(VariableLevel::Group(group.id), "REGISTRY", "group"),
            SecretVariable::new(VariableLevel::Instance, "REGISTRY", "instance"),
            SecretVariable::new(VariableLevel::Instance, "ONLY_INSTANCE", "i").masked(),
        ];

        let vars = builder_with(secrets)
            .scoped_variables(fixture.request())
            .await
            .unwrap();

        let values: Vec<_> = vars
            .iter()
            .filter(|e| e.key() == "REGISTRY")
            .map(|e| e.value())
            .collect();
        assert_eq!(values, vec!["instance", "group", "project"]);

        let only = vars.get("ONLY_INSTANCE").unwrap();
        assert!(only.is_masked());
        assert!(!only.is_public());
    }

    #[tokio::test]
    async fn test_environment_scoped_secrets() {
        let fixture = Fixture::new();
        let owner = VariableLevel::Project(fixture.project.id);
        let secrets = vec![
            SecretVariable::new(owner, "DB_URL", "exact").scoped("review/app"),
            SecretVariable::new(owner, "DB_URL", "wildcard").scoped("review/*"),
            SecretVariable::new(owner, "DB_URL", "default"),
            SecretVariable::new(owner, "STAGING_ONLY", "s").scoped("staging"),
        ];
        let builder = builder_with(secrets);

        let vars = builder
            .scoped_variables(fixture.request().environment(Some("review/app")))
            .await
            .unwrap();
        assert_eq!(vars.get("DB_URL").unwrap().value(), "exact");
        assert!(vars.get("STAGING_ONLY").is_none());

        let vars = builder
            .scoped_variables(fixture.request().environment(Some("review/other")))
            .await
            .unwrap();
        assert_eq!(vars.get("DB_URL").unwrap().value(), "wildcard");

        let vars = builder.scoped_variables(fixture.request()).await.unwrap();
        assert_eq!(vars.get("DB_URL").unwrap().value(), "default");
    }

    #[tokio::test]
    async fn test_full_precedence() {
        let mut fixture = Fixture::new();
        fixture.job.runnable = true;
        fixture.job.runner = Some(Runner {
            id: ResourceId::new(),
            description: "shared".to_string(),
            tags: vec![],
        });
        fixture.job.user = Some(User {
            id: ResourceId::new(),
            email: "jdoe@example.com".to_string(),
            username: "jdoe".to_string(),
            name: "Jane Doe".to_string(),
        });
        fixture.job.agents = vec![AgentAuthorization {
            agent_id: ResourceId::new(),
            agent_name: "primary".to_string(),
            config_project_path: "acme/agents".to_string(),
            default_namespace: None,
        }];
        fixture.job.yaml_variables = vec![entry("SHARED", "yaml")].into();
        fixture.job.dependency_variables = vec![entry("SHARED", "dependency")].into();
        fixture.job.trigger = Some(TriggerRequest {
            variables: vec![entry("SHARED", "trigger")].into(),
            ..Default::default()
        });
        fixture.pipeline.variables = vec![entry("SHARED", "pipeline")].into();

        let deployments = Arc::new(StaticDeployments(
            vec![entry("KUBE_NAMESPACE", "api-prod"), entry("SHARED", "deployment")].into(),
        ));
        let builder = builder_with_collaborators(
            vec![SecretVariable::new(
                VariableLevel::Project(fixture.project.id),
                "SHARED",
                "project-secret",
            )],
            deployments,
            Arc::new(AgentKubeconfigGenerator::new("https://kas.example.com")),
        );

        let vars = builder
            .scoped_variables(
                fixture
                    .request()
                    .environment(Some("production"))
                    .with_dependencies(),
            )
            .await
            .unwrap();

        let shared: Vec<_> = vars
            .iter()
            .filter(|e| e.key() == "SHARED")
            .map(|e| e.value())
            .collect();
        assert_eq!(
            shared,
            vec!["deployment", "yaml", "dependency", "project-secret", "trigger", "pipeline"]
        );
        assert_eq!(vars.get("SHARED").unwrap().value(), "pipeline");
        assert!(vars.get("CI_RUNNER_ID").is_some());
        assert_eq!(vars.get("GITLAB_USER_LOGIN").unwrap().value(), "jdoe");
        assert_eq!(vars.get("KUBE_NAMESPACE").unwrap().value(), "api-prod");
        assert_eq!(vars.get("CI_PIPELINE_TRIGGERED").unwrap().value(), "true");

        let kubeconfig = vars.get("KUBECONFIG").unwrap();
        assert!(kubeconfig.is_file());
        assert!(!kubeconfig.is_public());
    }

    #[tokio::test]
    async fn test_runner_requires_runnable_job() {
        let mut fixture = Fixture::new();
        fixture.job.runner = Some(Runner {
            id: ResourceId::new(),
            description: "shared".to_string(),
            tags: vec![],
        });

        let vars = builder_with(vec![])
            .scoped_variables(fixture.request())
            .await
            .unwrap();
        assert!(vars.get("CI_RUNNER_ID").is_none());
    }

    #[tokio::test]
    async fn test_failing_collaborators_degrade() {
        let mut fixture = Fixture::new();
        fixture.job.yaml_variables = vec![entry("RAILS_ENV", "test")].into();
        let builder = builder_with_collaborators(
            vec![],
            Arc::new(BrokenDeployments),
            Arc::new(BrokenKubeconfig),
        );

        let vars = builder
            .scoped_variables(fixture.request().environment(Some("production")))
            .await
            .unwrap();
        assert_eq!(vars.get("RAILS_ENV").unwrap().value(), "test");
        assert!(vars.get("KUBECONFIG").is_none());
    }

    #[tokio::test]
    async fn test_secret_store_failure_propagates() {
        let fixture = Fixture::new();
        let source = Arc::new(MemoryRecordSource::new());
        let builder = VariableBuilder::new(
            Arc::new(FailingStore),
            Arc::new(GroupVariableStore::new(source.clone())),
            Arc::new(ProjectVariableStore::new(source)),
            Arc::new(NoDeployments),
            Arc::new(BrokenKubeconfig),
        );

        let result = builder.scoped_variables(fixture.request()).await;
        assert!(matches!(result, Err(Error::SecretStore { .. })));
    }

    #[tokio::test]
    async fn test_unusable_secret_record_fails_its_level() {
        let mut fixture = Fixture::new();
        let group = Group {
            id: ResourceId::new(),
            full_path: "acme".to_string(),
        };
        fixture.project.groups = vec![group.clone()];
        let project = VariableLevel::Project(fixture.project.id);
        let secrets = vec![
            SecretVariable::new(VariableLevel::Group(group.id), "DB_PASSWORD", "group-default"),
            SecretVariable::new(project, "DB_PASSWORD", "project-override"),
            SecretVariable::new(project, "", "orphaned"),
        ];

        let result = builder_with(secrets)
            .scoped_variables(fixture.request())
            .await;

        match result {
            Err(Error::SecretStore { level, .. }) => assert_eq!(level, "project"),
            other => panic!("expected a project store failure, got {other:?}"),
        }
    }
}
