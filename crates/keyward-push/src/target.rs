use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::{info, instrument};

use crate::plan::PushPlan;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Hands a push plan to whatever performs the remote work.
#[async_trait]
pub trait PushTarget: Send + Sync {
    /// Short target name (e.g., "noop", "file").
    fn name(&self) -> &'static str;

    async fn push(&self, plan: &PushPlan) -> Result<()>;
}

/// Discards plans.
pub struct NoopPush;

#[async_trait]
impl PushTarget for NoopPush {
    fn name(&self) -> &'static str {
        "noop"
    }

    #[instrument(skip_all, fields(plan = %plan.id))]
    async fn push(&self, plan: &PushPlan) -> Result<()> {
        info!(hosts = plan.hosts.len(), "dropping push plan");
        Ok(())
    }
}

/// Writes each plan as `<dir>/<plan id>.json` for an external orchestrator.
///
/// Plans hold clear-text passwords, so files are owner-only.
pub struct FilePush {
    dir: PathBuf,
}

impl FilePush {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, plan: &PushPlan) -> PathBuf {
        self.dir.join(format!("{}.json", plan.id))
    }
}

#[async_trait]
impl PushTarget for FilePush {
    fn name(&self) -> &'static str {
        "file"
    }

    #[instrument(skip_all, fields(plan = %plan.id, dir = %self.dir.display()))]
    async fn push(&self, plan: &PushPlan) -> Result<()> {
        let body = serde_json::to_vec_pretty(plan).context("serialize push plan")?;
        let path = self.path_for(plan);
        write_atomic(&self.dir, &path, &body)?;
        info!(path = %path.display(), hosts = plan.hosts.len(), "wrote push plan");
        Ok(())
    }
}

fn write_atomic(dir: &Path, path: &Path, body: &[u8]) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let mut tmp = NamedTempFile::new_in(dir).context("create temp plan file")?;
    #[cfg(unix)]
    tmp.as_file()
        .set_permissions(fs::Permissions::from_mode(0o600))
        .context("restrict plan file")?;
    tmp.write_all(body).context("write plan")?;
    tmp.as_file().sync_all().context("sync plan")?;
    tmp.persist(path)
        .with_context(|| format!("persist {}", path.display()))?;
    Ok(())
}
