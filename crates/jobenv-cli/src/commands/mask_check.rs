//! `jobenv mask-check`

use jobenv_builder::MaskingChecker;
use std::path::Path;

use super::{Settings, resolve_context};

pub async fn run(settings: &Settings, context: &Path, environment: Option<String>) -> anyhow::Result<()> {
    let (_, variables) = resolve_context(settings, context, environment, false).await?;
    let report = MaskingChecker::new(settings.config.masking.clone()).report(&variables);

    for accepted in &report.accepted {
        println!("masked      {}", accepted.key);
    }
    for rejected in &report.rejected {
        println!("NOT MASKED  {}: {}", rejected.key, rejected.reason);
    }

    if !report.is_clean() {
        anyhow::bail!(
            "{} masked variable(s) cannot be redacted from job logs",
            report.rejected.len()
        );
    }
    Ok(())
}
