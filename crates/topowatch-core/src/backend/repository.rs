// ── Persistence contract ──

use async_trait::async_trait;

use crate::error::CoreError;
use crate::model::{
    Device, DeviceConfig, DevicePatch, DeviceProfile, Link, Project, ProjectSettings, ProjectStatus,
};

/// Project storage. Every call reports failure through `CoreError`.
#[async_trait]
pub trait ProjectRepository: Send + Sync + 'static {
    /// The operation (live) copy of a project.
    async fn project(&self, project_id: i64) -> Result<Project, CoreError>;

    /// The activated baseline the operation copy is reset from on Start.
    async fn activated_baseline(&self, project_id: i64) -> Result<Project, CoreError>;

    async fn update_project_status(
        &self,
        project_id: i64,
        status: ProjectStatus,
    ) -> Result<(), CoreError>;

    /// Overwrite the operation copy with `project`.
    async fn update_full_project(&self, project: &Project) -> Result<(), CoreError>;

    /// Overwrite only the operation copy's settings.
    async fn update_project_settings(
        &self,
        project_id: i64,
        settings: &ProjectSettings,
    ) -> Result<(), CoreError>;

    async fn device_profiles(&self) -> Result<Vec<DeviceProfile>, CoreError>;

    /// Persist a new device; the returned copy carries the assigned id.
    async fn create_device(&self, project_id: i64, device: Device) -> Result<Device, CoreError>;

    async fn delete_device(&self, project_id: i64, device_id: i64) -> Result<(), CoreError>;

    /// Persist a new link; the returned copy carries the assigned id.
    async fn create_link(&self, project_id: i64, link: Link) -> Result<Link, CoreError>;

    async fn delete_link(&self, project_id: i64, link_id: i64) -> Result<(), CoreError>;

    async fn update_link(&self, project_id: i64, link: &Link) -> Result<(), CoreError>;

    async fn partial_update_device(
        &self,
        project_id: i64,
        patch: &DevicePatch,
    ) -> Result<(), CoreError>;

    async fn update_device_config(
        &self,
        project_id: i64,
        config: &DeviceConfig,
    ) -> Result<(), CoreError>;
}
