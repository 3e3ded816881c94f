use std::fmt;

use keyward_core::{
    models::{AdminUser, Asset, AssetGroup, Cluster, SystemUser},
    validation::ValidationError,
};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

/// Table kinds held by the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Asset,
    AssetGroup,
    Cluster,
    AdminUser,
    SystemUser,
}

impl RecordKind {
    /// Store key of the table.
    pub fn table(&self) -> &'static str {
        match self {
            RecordKind::Asset => "assets",
            RecordKind::AssetGroup => "groups",
            RecordKind::Cluster => "clusters",
            RecordKind::AdminUser => "admin_users",
            RecordKind::SystemUser => "system_users",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordKind::Asset => "asset",
            RecordKind::AssetGroup => "asset group",
            RecordKind::Cluster => "cluster",
            RecordKind::AdminUser => "admin user",
            RecordKind::SystemUser => "system user",
        })
    }
}

/// A row type stored as one JSON table.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: RecordKind;

    fn id(&self) -> Uuid;

    /// Human-facing name; unique within the table when `NAME_UNIQUE`.
    fn name(&self) -> &str;

    const NAME_UNIQUE: bool = true;

    fn validate(&self) -> Result<(), ValidationError>;

    /// Other records this one points at; they must exist.
    fn references(&self) -> Vec<(RecordKind, Uuid)> {
        Vec::new()
    }
}

impl Record for Asset {
    const KIND: RecordKind = RecordKind::Asset;
    const NAME_UNIQUE: bool = false;

    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.hostname
    }

    fn validate(&self) -> Result<(), ValidationError> {
        Asset::validate(self)
    }

    fn references(&self) -> Vec<(RecordKind, Uuid)> {
        let mut refs = Vec::new();
        refs.extend(self.cluster.map(|id| (RecordKind::Cluster, id)));
        refs.extend(self.admin_user.map(|id| (RecordKind::AdminUser, id)));
        refs.extend(self.groups.iter().map(|id| (RecordKind::AssetGroup, *id)));
        refs.extend(self.system_users.iter().map(|id| (RecordKind::SystemUser, *id)));
        refs
    }
}

impl Record for AssetGroup {
    const KIND: RecordKind = RecordKind::AssetGroup;

    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), ValidationError> {
        AssetGroup::validate(self)
    }

    fn references(&self) -> Vec<(RecordKind, Uuid)> {
        self.system_users
            .iter()
            .map(|id| (RecordKind::SystemUser, *id))
            .collect()
    }
}

impl Record for Cluster {
    const KIND: RecordKind = RecordKind::Cluster;

    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), ValidationError> {
        Cluster::validate(self)
    }

    fn references(&self) -> Vec<(RecordKind, Uuid)> {
        self.admin_user
            .map(|id| (RecordKind::AdminUser, id))
            .into_iter()
            .collect()
    }
}

impl Record for AdminUser {
    const KIND: RecordKind = RecordKind::AdminUser;

    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), ValidationError> {
        AdminUser::validate(self)
    }
}

impl Record for SystemUser {
    const KIND: RecordKind = RecordKind::SystemUser;

    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), ValidationError> {
        SystemUser::validate(self)
    }

    fn references(&self) -> Vec<(RecordKind, Uuid)> {
        self.clusters
            .iter()
            .map(|id| (RecordKind::Cluster, *id))
            .collect()
    }
}
