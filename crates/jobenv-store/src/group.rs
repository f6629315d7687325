//! Group-level secret variables.

use async_trait::async_trait;
use jobenv_core::secret::{SecretVariable, SecretVariableStore, VariableLevel, VariableQuery};
use std::sync::Arc;
use tracing::debug;

use crate::scope::select_visible;
use crate::source::VariableRecordSource;

/// Reads the variables of every group in the project's ancestry, root first,
/// so that the closest group has the final say on a shared key.
pub struct GroupVariableStore {
    source: Arc<dyn VariableRecordSource>,
}

impl GroupVariableStore {
    pub fn new(source: Arc<dyn VariableRecordSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl SecretVariableStore for GroupVariableStore {
    fn level_name(&self) -> &'static str {
        "group"
    }

    async fn variables_for(
        &self,
        query: VariableQuery<'_>,
    ) -> jobenv_core::Result<Vec<SecretVariable>> {
        let mut visible = Vec::new();
        for group in &query.project.groups {
            let records = self
                .source
                .load(VariableLevel::Group(group.id))
                .await
                .map_err(|e| e.into_core(self.level_name()))?;
            let selected = select_visible(records, query.git_ref, query.environment);
            debug!(group = %group.full_path, count = selected.len(), "Selected group variables");
            visible.extend(selected);
        }
        Ok(visible)
    }
}
