//! Project-level secret variables.

use async_trait::async_trait;
use jobenv_core::secret::{SecretVariable, SecretVariableStore, VariableLevel, VariableQuery};
use std::sync::Arc;

use crate::scope::select_visible;
use crate::source::VariableRecordSource;

pub struct ProjectVariableStore {
    source: Arc<dyn VariableRecordSource>,
}

impl ProjectVariableStore {
    pub fn new(source: Arc<dyn VariableRecordSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl SecretVariableStore for ProjectVariableStore {
    fn level_name(&self) -> &'static str {
        "project"
    }

    async fn variables_for(
        &self,
        query: VariableQuery<'_>,
    ) -> jobenv_core::Result<Vec<SecretVariable>> {
        let records = self
            .source
            .load(VariableLevel::Project(query.project.id))
            .await
            .map_err(|e| e.into_core(self.level_name()))?;
        Ok(select_visible(records, query.git_ref, query.environment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryRecordSource;
    use jobenv_core::job::{GitRef, Project};

    #[tokio::test]
    async fn test_scoped_selection() {
        let project = Project::default();
        let owner = VariableLevel::Project(project.id);
        let source = Arc::new(MemoryRecordSource::with_records(vec![
            SecretVariable::new(owner, "DB_URL", "prod").scoped("production"),
            SecretVariable::new(owner, "DB_URL", "default"),
            SecretVariable::new(owner, "DB_URL", "review").scoped("review/*"),
        ]));
        let store = ProjectVariableStore::new(source);
        let git_ref = GitRef::branch("main");

        let query = |environment| VariableQuery {
            project: &project,
            git_ref: &git_ref,
            environment,
        };

        let prod = store.variables_for(query(Some("production"))).await.unwrap();
        assert_eq!(prod.last().unwrap().value, "prod");

        let review = store.variables_for(query(Some("review/feature-1"))).await.unwrap();
        assert_eq!(review.last().unwrap().value, "review");

        let none = store.variables_for(query(None)).await.unwrap();
        assert_eq!(none.len(), 1);
        assert_eq!(none[0].value, "default");
    }
}
