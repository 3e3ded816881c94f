use std::collections::HashMap;

use chrono::{DateTime, Utc};
use keyward_core::{
    bundle::{AdminAuth, SecretBundle},
    models::{AssetGroup, SystemUser},
    storage::RecordStore,
    CredentialError,
};
use keyward_inventory::{Inventory, InventoryError};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::projector::SecretProjector;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
}

/// Everything the push agent needs to create system users on a set of hosts.
#[derive(Debug, Clone, Serialize)]
pub struct PushPlan {
    pub id: Uuid,
    pub group: String,
    pub created_at: DateTime<Utc>,
    pub hosts: Vec<HostPlan>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostPlan {
    pub asset_id: Uuid,
    pub hostname: String,
    pub ip: String,
    pub port: u16,
    /// `None` when neither the asset nor its cluster has an admin user.
    pub admin: Option<AdminAuth>,
    pub system_users: Vec<SecretBundle>,
}

impl PushPlan {
    pub fn is_empty(&self) -> bool {
        self.hosts.iter().all(|h| h.system_users.is_empty())
    }

    /// Plan pushing the group's system users to every active asset in the group.
    #[instrument(skip_all, fields(group = %group.id))]
    pub async fn for_group<S: RecordStore>(
        inventory: &Inventory<S>,
        projector: &SecretProjector,
        group: &AssetGroup,
    ) -> Result<Self, PlanError> {
        let mut bundles = Vec::with_capacity(group.system_users.len());
        for id in &group.system_users {
            let user = inventory.get::<SystemUser>(*id).await?;
            bundles.push(projector.project(&user)?);
        }

        let mut admins: HashMap<Uuid, AdminAuth> = HashMap::new();
        let mut hosts = Vec::new();
        for asset in inventory.group_assets(group.id).await? {
            if !asset.is_active {
                continue;
            }
            let admin = match inventory.admin_user_for_asset(&asset).await? {
                Some(admin) => match admins.get(&admin.id) {
                    Some(auth) => Some(auth.clone()),
                    None => {
                        let auth = projector.project_admin(&admin)?;
                        admins.insert(admin.id, auth.clone());
                        Some(auth)
                    }
                },
                None => {
                    warn!(asset = %asset.id, "no admin user for asset");
                    None
                }
            };
            hosts.push(HostPlan {
                asset_id: asset.id,
                hostname: asset.hostname.clone(),
                ip: asset.ip.clone(),
                port: asset.port,
                admin,
                system_users: bundles.clone(),
            });
        }

        info!(
            hosts = hosts.len(),
            system_users = bundles.len(),
            "built push plan"
        );
        Ok(Self {
            id: Uuid::new_v4(),
            group: group.name.clone(),
            created_at: Utc::now(),
            hosts,
        })
    }
}
