//! Inventory repository: assets, groups, clusters, admin users and system
//! users kept as JSON tables in a `RecordStore`.
//!
//! Secret columns are opaque here; records arrive with their credentials
//! already sealed.

mod error;
mod patch;
mod record;

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use keyward_core::{
    models::{AdminUser, Asset, AssetGroup, Cluster, SystemUser},
    storage::{RecordStore, RecordStoreError},
};
use serde::Deserialize;
use tracing::{debug, instrument};
use uuid::Uuid;

pub use error::InventoryError;
pub use patch::AssetPatch;
pub use record::{Record, RecordKind};

pub type Result<T> = std::result::Result<T, InventoryError>;

/// Inventory backed by a `RecordStore`.
pub struct Inventory<S: RecordStore> {
    store: Arc<S>,
}

impl<S: RecordStore> Clone for Inventory<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

#[derive(Deserialize)]
struct IdOnly {
    id: Uuid,
}

impl<S: RecordStore> Inventory<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    async fn load<T: Record>(&self) -> Result<Vec<T>> {
        let table = T::KIND.table();
        match self.store.get(table).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| InventoryError::Codec {
                table,
                reason: e.to_string(),
            }),
            Err(RecordStoreError::NotFound { .. }) => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save<T: Record>(&self, rows: &[T]) -> Result<()> {
        let table = T::KIND.table();
        let bytes = serde_json::to_vec(rows).map_err(|e| InventoryError::Codec {
            table,
            reason: e.to_string(),
        })?;
        self.store.put(table, &bytes).await?;
        debug!(table, rows = rows.len(), "saved table");
        Ok(())
    }

    async fn ids(&self, kind: RecordKind) -> Result<BTreeSet<Uuid>> {
        let table = kind.table();
        match self.store.get(table).await {
            Ok(bytes) => {
                let rows: Vec<IdOnly> =
                    serde_json::from_slice(&bytes).map_err(|e| InventoryError::Codec {
                        table,
                        reason: e.to_string(),
                    })?;
                Ok(rows.into_iter().map(|r| r.id).collect())
            }
            Err(RecordStoreError::NotFound { .. }) => Ok(BTreeSet::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn check_references(&self, refs: Vec<(RecordKind, Uuid)>) -> Result<()> {
        let mut known: HashMap<RecordKind, BTreeSet<Uuid>> = HashMap::new();
        for (kind, id) in refs {
            if !known.contains_key(&kind) {
                let ids = self.ids(kind).await?;
                known.insert(kind, ids);
            }
            if !known.get(&kind).is_some_and(|ids| ids.contains(&id)) {
                return Err(InventoryError::NotFound { kind, id });
            }
        }
        Ok(())
    }

    fn check_unique<T: Record>(rows: &[T], candidate: &T) -> Result<()> {
        if !T::NAME_UNIQUE {
            return Ok(());
        }
        let taken = rows
            .iter()
            .any(|r| r.id() != candidate.id() && r.name() == candidate.name());
        if taken {
            return Err(InventoryError::DuplicateName {
                kind: T::KIND,
                name: candidate.name().to_string(),
            });
        }
        Ok(())
    }

    /// All rows of a table, ordered by name.
    #[instrument(skip(self), fields(table = T::KIND.table()))]
    pub async fn list<T: Record>(&self) -> Result<Vec<T>> {
        let mut rows = self.load::<T>().await?;
        rows.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(rows)
    }

    #[instrument(skip(self), fields(table = T::KIND.table()))]
    pub async fn get<T: Record>(&self, id: Uuid) -> Result<T> {
        self.load::<T>()
            .await?
            .into_iter()
            .find(|r| r.id() == id)
            .ok_or(InventoryError::NotFound { kind: T::KIND, id })
    }

    /// Look a record up by id or, failing that, by exact name.
    #[instrument(skip(self), fields(table = T::KIND.table()))]
    pub async fn resolve<T: Record>(&self, ident: &str) -> Result<T> {
        let rows = self.load::<T>().await?;
        let by_id = Uuid::parse_str(ident)
            .ok()
            .and_then(|id| rows.iter().find(|r| r.id() == id));
        by_id
            .or_else(|| rows.iter().find(|r| r.name() == ident))
            .cloned()
            .ok_or_else(|| InventoryError::UnknownName {
                kind: T::KIND,
                ident: ident.to_string(),
            })
    }

    /// Insert a new record after validation, reference and uniqueness checks.
    #[instrument(skip_all, fields(table = T::KIND.table(), id = %record.id()))]
    pub async fn create<T: Record>(&self, record: T) -> Result<T> {
        record.validate()?;
        let mut rows = self.load::<T>().await?;
        if rows.iter().any(|r| r.id() == record.id()) {
            return Err(InventoryError::DuplicateId {
                kind: T::KIND,
                id: record.id(),
            });
        }
        Self::check_unique(&rows, &record)?;
        self.check_references(record.references()).await?;
        rows.push(record.clone());
        self.save(&rows).await?;
        Ok(record)
    }

    /// Replace an existing record.
    #[instrument(skip_all, fields(table = T::KIND.table(), id = %record.id()))]
    pub async fn update<T: Record>(&self, record: T) -> Result<T> {
        record.validate()?;
        let mut rows = self.load::<T>().await?;
        Self::check_unique(&rows, &record)?;
        self.check_references(record.references()).await?;
        let slot = rows
            .iter_mut()
            .find(|r| r.id() == record.id())
            .ok_or(InventoryError::NotFound {
                kind: T::KIND,
                id: record.id(),
            })?;
        *slot = record.clone();
        self.save(&rows).await?;
        Ok(record)
    }

    async fn remove<T: Record>(&self, id: Uuid) -> Result<T> {
        let mut rows = self.load::<T>().await?;
        let pos = rows
            .iter()
            .position(|r| r.id() == id)
            .ok_or(InventoryError::NotFound { kind: T::KIND, id })?;
        let removed = rows.remove(pos);
        self.save(&rows).await?;
        Ok(removed)
    }

    async fn update_assets(&self, mut f: impl FnMut(&mut Asset) -> bool) -> Result<()> {
        let mut assets = self.load::<Asset>().await?;
        let mut changed = false;
        for asset in &mut assets {
            changed |= f(asset);
        }
        if changed {
            self.save(&assets).await?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_asset(&self, id: Uuid) -> Result<Asset> {
        self.remove::<Asset>(id).await
    }

    /// Delete a group and drop it from every asset.
    #[instrument(skip(self))]
    pub async fn delete_group(&self, id: Uuid) -> Result<AssetGroup> {
        self.get::<AssetGroup>(id).await?;
        self.update_assets(|a| a.groups.remove(&id)).await?;
        self.remove::<AssetGroup>(id).await
    }

    /// Delete a cluster, detaching its assets and system users.
    #[instrument(skip(self))]
    pub async fn delete_cluster(&self, id: Uuid) -> Result<Cluster> {
        self.get::<Cluster>(id).await?;
        self.update_assets(|a| {
            if a.cluster == Some(id) {
                a.cluster = None;
                true
            } else {
                false
            }
        })
        .await?;
        let mut users = self.load::<SystemUser>().await?;
        if users.iter_mut().fold(false, |acc, u| u.clusters.remove(&id) | acc) {
            self.save(&users).await?;
        }
        self.remove::<Cluster>(id).await
    }

    /// Delete an admin user, unlinking it from assets and clusters.
    #[instrument(skip(self))]
    pub async fn delete_admin_user(&self, id: Uuid) -> Result<AdminUser> {
        self.get::<AdminUser>(id).await?;
        self.update_assets(|a| {
            if a.admin_user == Some(id) {
                a.admin_user = None;
                true
            } else {
                false
            }
        })
        .await?;
        let mut clusters = self.load::<Cluster>().await?;
        let mut changed = false;
        for cluster in clusters.iter_mut().filter(|c| c.admin_user == Some(id)) {
            cluster.admin_user = None;
            changed = true;
        }
        if changed {
            self.save(&clusters).await?;
        }
        self.remove::<AdminUser>(id).await
    }

    /// Delete a system user, removing it from assets and groups.
    #[instrument(skip(self))]
    pub async fn delete_system_user(&self, id: Uuid) -> Result<SystemUser> {
        self.get::<SystemUser>(id).await?;
        self.update_assets(|a| a.system_users.remove(&id)).await?;
        let mut groups = self.load::<AssetGroup>().await?;
        if groups
            .iter_mut()
            .fold(false, |acc, g| g.system_users.remove(&id) | acc)
        {
            self.save(&groups).await?;
        }
        self.remove::<SystemUser>(id).await
    }

    /// Replace the groups an asset belongs to.
    #[instrument(skip(self, groups))]
    pub async fn set_asset_groups(&self, asset_id: Uuid, groups: BTreeSet<Uuid>) -> Result<Asset> {
        let mut asset = self.get::<Asset>(asset_id).await?;
        asset.groups = groups;
        self.update(asset).await
    }

    /// Replace the system users assigned directly to an asset.
    #[instrument(skip(self, users))]
    pub async fn set_asset_system_users(
        &self,
        asset_id: Uuid,
        users: BTreeSet<Uuid>,
    ) -> Result<Asset> {
        let mut asset = self.get::<Asset>(asset_id).await?;
        asset.system_users = users;
        self.update(asset).await
    }

    /// Make `assets` exactly the set of assets the system user is directly assigned to.
    #[instrument(skip(self, assets))]
    pub async fn set_system_user_assets(
        &self,
        user_id: Uuid,
        assets: BTreeSet<Uuid>,
    ) -> Result<Vec<Asset>> {
        self.get::<SystemUser>(user_id).await?;
        self.check_references(assets.iter().map(|id| (RecordKind::Asset, *id)).collect())
            .await?;
        self.update_assets(|a| {
            if assets.contains(&a.id) {
                a.system_users.insert(user_id)
            } else {
                a.system_users.remove(&user_id)
            }
        })
        .await?;
        self.system_user_direct_assets(user_id).await
    }

    async fn system_user_direct_assets(&self, user_id: Uuid) -> Result<Vec<Asset>> {
        Ok(self
            .list::<Asset>()
            .await?
            .into_iter()
            .filter(|a| a.system_users.contains(&user_id))
            .collect())
    }

    /// Make `groups` exactly the set of groups the system user is attached to.
    #[instrument(skip(self, groups))]
    pub async fn set_system_user_groups(
        &self,
        user_id: Uuid,
        groups: BTreeSet<Uuid>,
    ) -> Result<Vec<AssetGroup>> {
        self.get::<SystemUser>(user_id).await?;
        self.check_references(
            groups
                .iter()
                .map(|id| (RecordKind::AssetGroup, *id))
                .collect(),
        )
        .await?;
        let mut rows = self.load::<AssetGroup>().await?;
        for group in &mut rows {
            if groups.contains(&group.id) {
                group.system_users.insert(user_id);
            } else {
                group.system_users.remove(&user_id);
            }
        }
        self.save(&rows).await?;
        Ok(rows
            .into_iter()
            .filter(|g| g.system_users.contains(&user_id))
            .collect())
    }

    /// Make `assets` exactly the members of the group.
    #[instrument(skip(self, assets))]
    pub async fn set_group_assets(&self, group_id: Uuid, assets: BTreeSet<Uuid>) -> Result<Vec<Asset>> {
        self.get::<AssetGroup>(group_id).await?;
        self.check_references(assets.iter().map(|id| (RecordKind::Asset, *id)).collect())
            .await?;
        self.update_assets(|a| {
            if assets.contains(&a.id) {
                a.groups.insert(group_id)
            } else {
                a.groups.remove(&group_id)
            }
        })
        .await?;
        self.group_assets(group_id).await
    }

    /// Replace the system users attached to a group.
    #[instrument(skip(self, users))]
    pub async fn set_group_system_users(
        &self,
        group_id: Uuid,
        users: BTreeSet<Uuid>,
    ) -> Result<AssetGroup> {
        let mut group = self.get::<AssetGroup>(group_id).await?;
        group.system_users = users;
        self.update(group).await
    }

    /// Make `assets` exactly the members of the cluster. Assets moved in leave their old cluster.
    #[instrument(skip(self, assets))]
    pub async fn set_cluster_assets(
        &self,
        cluster_id: Uuid,
        assets: BTreeSet<Uuid>,
    ) -> Result<Vec<Asset>> {
        self.get::<Cluster>(cluster_id).await?;
        self.check_references(assets.iter().map(|id| (RecordKind::Asset, *id)).collect())
            .await?;
        self.update_assets(|a| {
            if assets.contains(&a.id) {
                let changed = a.cluster != Some(cluster_id);
                a.cluster = Some(cluster_id);
                changed
            } else if a.cluster == Some(cluster_id) {
                a.cluster = None;
                true
            } else {
                false
            }
        })
        .await?;
        self.cluster_assets(cluster_id).await
    }

    /// Apply many asset patches at once. Nothing is written unless every patch applies.
    #[instrument(skip(self, patches), fields(count = patches.len()))]
    pub async fn bulk_update_assets(&self, patches: &[AssetPatch]) -> Result<Vec<Asset>> {
        let mut assets = self.load::<Asset>().await?;
        let mut updated = Vec::with_capacity(patches.len());
        let mut refs = Vec::new();
        for patch in patches {
            let asset = assets
                .iter_mut()
                .find(|a| a.id == patch.id)
                .ok_or(InventoryError::NotFound {
                    kind: RecordKind::Asset,
                    id: patch.id,
                })?;
            patch.apply(asset);
            asset.validate()?;
            refs.extend(Record::references(&*asset));
            updated.push(asset.id);
        }
        self.check_references(refs).await?;
        self.save(&assets).await?;
        Ok(assets
            .into_iter()
            .filter(|a| updated.contains(&a.id))
            .collect())
    }

    pub async fn group_assets(&self, group_id: Uuid) -> Result<Vec<Asset>> {
        Ok(self
            .list::<Asset>()
            .await?
            .into_iter()
            .filter(|a| a.groups.contains(&group_id))
            .collect())
    }

    pub async fn cluster_assets(&self, cluster_id: Uuid) -> Result<Vec<Asset>> {
        Ok(self
            .list::<Asset>()
            .await?
            .into_iter()
            .filter(|a| a.cluster == Some(cluster_id))
            .collect())
    }

    /// Assets reachable by an admin user: assigned directly, or through a
    /// cluster that uses it. Each asset appears once.
    #[instrument(skip(self))]
    pub async fn admin_user_assets(&self, admin_id: Uuid) -> Result<Vec<Asset>> {
        self.get::<AdminUser>(admin_id).await?;
        let clusters: BTreeSet<Uuid> = self
            .load::<Cluster>()
            .await?
            .into_iter()
            .filter(|c| c.admin_user == Some(admin_id))
            .map(|c| c.id)
            .collect();
        Ok(self
            .list::<Asset>()
            .await?
            .into_iter()
            .filter(|a| {
                a.admin_user == Some(admin_id)
                    || a.cluster.is_some_and(|c| clusters.contains(&c))
            })
            .collect())
    }

    /// Assets a system user lands on: through its clusters, direct assignment,
    /// or a group it is attached to. Each asset appears once.
    #[instrument(skip(self))]
    pub async fn system_user_assets(&self, user_id: Uuid) -> Result<Vec<Asset>> {
        let user = self.get::<SystemUser>(user_id).await?;
        let groups: BTreeSet<Uuid> = self
            .load::<AssetGroup>()
            .await?
            .into_iter()
            .filter(|g| g.system_users.contains(&user_id))
            .map(|g| g.id)
            .collect();
        Ok(self
            .list::<Asset>()
            .await?
            .into_iter()
            .filter(|a| {
                a.cluster.is_some_and(|c| user.clusters.contains(&c))
                    || a.system_users.contains(&user_id)
                    || !a.groups.is_disjoint(&groups)
            })
            .collect())
    }

    pub async fn admin_user_assets_amount(&self, admin_id: Uuid) -> Result<usize> {
        Ok(self.admin_user_assets(admin_id).await?.len())
    }

    pub async fn system_user_assets_amount(&self, user_id: Uuid) -> Result<usize> {
        Ok(self.system_user_assets(user_id).await?.len())
    }

    /// System users that should exist on an asset, by the same rules as `system_user_assets`.
    #[instrument(skip(self))]
    pub async fn asset_system_users(&self, asset_id: Uuid) -> Result<Vec<SystemUser>> {
        let asset = self.get::<Asset>(asset_id).await?;
        let via_groups: BTreeSet<Uuid> = self
            .load::<AssetGroup>()
            .await?
            .into_iter()
            .filter(|g| asset.groups.contains(&g.id))
            .flat_map(|g| g.system_users)
            .collect();
        Ok(self
            .list::<SystemUser>()
            .await?
            .into_iter()
            .filter(|u| {
                asset.system_users.contains(&u.id)
                    || via_groups.contains(&u.id)
                    || asset.cluster.is_some_and(|c| u.clusters.contains(&c))
            })
            .collect())
    }

    /// Admin user used to connect to an asset: its own, else its cluster's.
    #[instrument(skip(self, asset), fields(asset = %asset.id))]
    pub async fn admin_user_for_asset(&self, asset: &Asset) -> Result<Option<AdminUser>> {
        let admin_id = match asset.admin_user {
            Some(id) => Some(id),
            None => match asset.cluster {
                Some(cluster) => self.get::<Cluster>(cluster).await?.admin_user,
                None => None,
            },
        };
        match admin_id {
            Some(id) => self.get::<AdminUser>(id).await.map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use keyward_core::storage::InMemoryRecordStore;

    use super::*;

    fn inventory() -> Inventory<InMemoryRecordStore> {
        Inventory::new(InMemoryRecordStore::new())
    }

    #[tokio::test]
    async fn creates_and_lists_sorted_by_name() {
        let inv = inventory();
        inv.create(SystemUser::new("web", "web")).await.expect("create");
        inv.create(SystemUser::new("db", "postgres")).await.expect("create");

        let names: Vec<String> = inv
            .list::<SystemUser>()
            .await
            .expect("list")
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, ["db", "web"]);
    }

    #[tokio::test]
    async fn rejects_duplicate_names() {
        let inv = inventory();
        inv.create(AdminUser::new("ops", "root")).await.expect("create");
        let err = inv
            .create(AdminUser::new("ops", "admin"))
            .await
            .expect_err("duplicate");
        assert_eq!(
            err,
            InventoryError::DuplicateName {
                kind: RecordKind::AdminUser,
                name: "ops".into()
            }
        );
    }

    #[tokio::test]
    async fn assets_may_share_hostnames() {
        let inv = inventory();
        inv.create(Asset::new("10.0.0.1", "web")).await.expect("first");
        inv.create(Asset::new("10.0.0.2", "web")).await.expect("second");
        assert_eq!(inv.list::<Asset>().await.expect("list").len(), 2);
    }

    #[tokio::test]
    async fn update_rejects_rename_onto_existing_name() {
        let inv = inventory();
        inv.create(Cluster::new("east")).await.expect("create");
        let mut west = inv.create(Cluster::new("west")).await.expect("create");
        west.name = "east".into();
        let err = inv.update(west).await.expect_err("duplicate");
        assert!(matches!(err, InventoryError::DuplicateName { .. }));
    }

    #[tokio::test]
    async fn dangling_references_are_rejected() {
        let inv = inventory();
        let mut asset = Asset::new("10.0.0.1", "web");
        asset.cluster = Some(Uuid::new_v4());
        let err = inv.create(asset).await.expect_err("unknown cluster");
        assert!(matches!(
            err,
            InventoryError::NotFound {
                kind: RecordKind::Cluster,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn invalid_records_are_rejected() {
        let inv = inventory();
        let err = inv
            .create(SystemUser::new("web", "has space"))
            .await
            .expect_err("invalid username");
        assert!(matches!(err, InventoryError::Invalid(_)));
        assert!(inv.list::<SystemUser>().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn resolve_by_id_or_name() {
        let inv = inventory();
        let user = inv.create(SystemUser::new("web", "web")).await.expect("create");
        assert_eq!(
            inv.resolve::<SystemUser>("web").await.expect("by name").id,
            user.id
        );
        assert_eq!(
            inv.resolve::<SystemUser>(&user.id.to_string())
                .await
                .expect("by id")
                .id,
            user.id
        );
        assert!(matches!(
            inv.resolve::<SystemUser>("nope").await,
            Err(InventoryError::UnknownName { .. })
        ));
    }

    #[tokio::test]
    async fn admin_user_assets_are_deduplicated() {
        let inv = inventory();
        let admin = inv.create(AdminUser::new("ops", "root")).await.expect("admin");
        let mut cluster = Cluster::new("east");
        cluster.admin_user = Some(admin.id);
        let cluster = inv.create(cluster).await.expect("cluster");

        // Reachable both directly and through the cluster.
        let mut both = Asset::new("10.0.0.1", "both");
        both.cluster = Some(cluster.id);
        both.admin_user = Some(admin.id);
        inv.create(both).await.expect("asset");
        let mut via_cluster = Asset::new("10.0.0.2", "via-cluster");
        via_cluster.cluster = Some(cluster.id);
        inv.create(via_cluster).await.expect("asset");
        inv.create(Asset::new("10.0.0.3", "unrelated"))
            .await
            .expect("asset");

        let hosts: Vec<String> = inv
            .admin_user_assets(admin.id)
            .await
            .expect("assets")
            .into_iter()
            .map(|a| a.hostname)
            .collect();
        assert_eq!(hosts, ["both", "via-cluster"]);
        assert_eq!(inv.admin_user_assets_amount(admin.id).await.expect("amount"), 2);
    }

    #[tokio::test]
    async fn system_user_assets_union_all_paths() {
        let inv = inventory();
        let cluster = inv.create(Cluster::new("east")).await.expect("cluster");
        let group = inv.create(AssetGroup::new("web")).await.expect("group");
        let mut user = SystemUser::new("deploy", "deploy");
        user.clusters.insert(cluster.id);
        let user = inv.create(user).await.expect("user");

        let mut in_cluster = Asset::new("10.0.0.1", "a-cluster");
        in_cluster.cluster = Some(cluster.id);
        let in_cluster = inv.create(in_cluster).await.expect("asset");
        let direct = inv.create(Asset::new("10.0.0.2", "b-direct")).await.expect("asset");
        let grouped = inv.create(Asset::new("10.0.0.3", "c-group")).await.expect("asset");
        inv.create(Asset::new("10.0.0.4", "d-none")).await.expect("asset");

        inv.set_system_user_assets(user.id, BTreeSet::from([direct.id, in_cluster.id]))
            .await
            .expect("assign");
        inv.set_group_assets(group.id, BTreeSet::from([grouped.id]))
            .await
            .expect("group members");
        inv.set_system_user_groups(user.id, BTreeSet::from([group.id]))
            .await
            .expect("attach group");

        let hosts: Vec<String> = inv
            .system_user_assets(user.id)
            .await
            .expect("assets")
            .into_iter()
            .map(|a| a.hostname)
            .collect();
        assert_eq!(hosts, ["a-cluster", "b-direct", "c-group"]);
        assert_eq!(inv.system_user_assets_amount(user.id).await.expect("amount"), 3);

        let on_grouped = inv.asset_system_users(grouped.id).await.expect("users");
        assert_eq!(on_grouped.len(), 1);
        assert_eq!(on_grouped[0].id, user.id);
    }

    #[tokio::test]
    async fn set_system_user_assets_replaces_previous_assignment() {
        let inv = inventory();
        let user = inv.create(SystemUser::new("deploy", "deploy")).await.expect("user");
        let a = inv.create(Asset::new("10.0.0.1", "a")).await.expect("a");
        let b = inv.create(Asset::new("10.0.0.2", "b")).await.expect("b");

        inv.set_system_user_assets(user.id, BTreeSet::from([a.id]))
            .await
            .expect("first");
        let now = inv
            .set_system_user_assets(user.id, BTreeSet::from([b.id]))
            .await
            .expect("second");
        assert_eq!(now.len(), 1);
        assert_eq!(now[0].id, b.id);
        assert!(!inv.get::<Asset>(a.id).await.expect("a").system_users.contains(&user.id));
    }

    #[tokio::test]
    async fn set_cluster_assets_moves_membership() {
        let inv = inventory();
        let east = inv.create(Cluster::new("east")).await.expect("east");
        let west = inv.create(Cluster::new("west")).await.expect("west");
        let mut asset = Asset::new("10.0.0.1", "web");
        asset.cluster = Some(west.id);
        let asset = inv.create(asset).await.expect("asset");
        let other = inv.create(Asset::new("10.0.0.2", "db")).await.expect("asset");

        inv.set_cluster_assets(east.id, BTreeSet::from([asset.id]))
            .await
            .expect("move");
        assert_eq!(
            inv.get::<Asset>(asset.id).await.expect("asset").cluster,
            Some(east.id)
        );
        assert!(inv.cluster_assets(west.id).await.expect("west").is_empty());

        inv.set_cluster_assets(east.id, BTreeSet::from([other.id]))
            .await
            .expect("replace");
        assert_eq!(inv.get::<Asset>(asset.id).await.expect("asset").cluster, None);
    }

    #[tokio::test]
    async fn deleting_system_user_cleans_associations() {
        let inv = inventory();
        let user = inv.create(SystemUser::new("deploy", "deploy")).await.expect("user");
        let mut group = AssetGroup::new("web");
        group.system_users.insert(user.id);
        let group = inv.create(group).await.expect("group");
        let mut asset = Asset::new("10.0.0.1", "web");
        asset.system_users.insert(user.id);
        let asset = inv.create(asset).await.expect("asset");

        inv.delete_system_user(user.id).await.expect("delete");
        assert!(inv.get::<AssetGroup>(group.id).await.expect("group").system_users.is_empty());
        assert!(inv.get::<Asset>(asset.id).await.expect("asset").system_users.is_empty());
        assert!(matches!(
            inv.delete_system_user(user.id).await,
            Err(InventoryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn deleting_admin_user_unlinks_clusters_and_assets() {
        let inv = inventory();
        let admin = inv.create(AdminUser::new("ops", "root")).await.expect("admin");
        let mut cluster = Cluster::new("east");
        cluster.admin_user = Some(admin.id);
        let cluster = inv.create(cluster).await.expect("cluster");
        let mut asset = Asset::new("10.0.0.1", "web");
        asset.admin_user = Some(admin.id);
        let asset = inv.create(asset).await.expect("asset");

        inv.delete_admin_user(admin.id).await.expect("delete");
        assert_eq!(inv.get::<Cluster>(cluster.id).await.expect("c").admin_user, None);
        assert_eq!(inv.get::<Asset>(asset.id).await.expect("a").admin_user, None);
    }

    #[tokio::test]
    async fn deleting_cluster_detaches_members() {
        let inv = inventory();
        let cluster = inv.create(Cluster::new("east")).await.expect("cluster");
        let mut user = SystemUser::new("deploy", "deploy");
        user.clusters.insert(cluster.id);
        let user = inv.create(user).await.expect("user");
        let mut asset = Asset::new("10.0.0.1", "web");
        asset.cluster = Some(cluster.id);
        let asset = inv.create(asset).await.expect("asset");

        inv.delete_cluster(cluster.id).await.expect("delete");
        assert!(inv.get::<SystemUser>(user.id).await.expect("u").clusters.is_empty());
        assert_eq!(inv.get::<Asset>(asset.id).await.expect("a").cluster, None);
    }

    #[tokio::test]
    async fn deleting_group_removes_it_from_assets() {
        let inv = inventory();
        let group = inv.create(AssetGroup::new("web")).await.expect("group");
        let mut asset = Asset::new("10.0.0.1", "web");
        asset.groups.insert(group.id);
        let asset = inv.create(asset).await.expect("asset");

        inv.delete_group(group.id).await.expect("delete");
        assert!(inv.get::<Asset>(asset.id).await.expect("a").groups.is_empty());
    }

    #[tokio::test]
    async fn bulk_update_is_all_or_nothing() {
        let inv = inventory();
        let a = inv.create(Asset::new("10.0.0.1", "a")).await.expect("a");
        let b = inv.create(Asset::new("10.0.0.2", "b")).await.expect("b");

        let bad = [
            AssetPatch {
                id: a.id,
                comment: Some("patched".into()),
                ..AssetPatch::default()
            },
            AssetPatch {
                id: b.id,
                port: Some(0),
                ..AssetPatch::default()
            },
        ];
        assert!(matches!(
            inv.bulk_update_assets(&bad).await,
            Err(InventoryError::Invalid(_))
        ));
        assert_eq!(inv.get::<Asset>(a.id).await.expect("a").comment, "");

        let good = [
            AssetPatch {
                id: a.id,
                is_active: Some(false),
                ..AssetPatch::default()
            },
            AssetPatch {
                id: b.id,
                port: Some(2222),
                ..AssetPatch::default()
            },
        ];
        let updated = inv.bulk_update_assets(&good).await.expect("bulk");
        assert_eq!(updated.len(), 2);
        assert!(!inv.get::<Asset>(a.id).await.expect("a").is_active);
        assert_eq!(inv.get::<Asset>(b.id).await.expect("b").port, 2222);
    }

    #[tokio::test]
    async fn admin_user_for_asset_falls_back_to_cluster() {
        let inv = inventory();
        let cluster_admin = inv.create(AdminUser::new("cluster-ops", "root")).await.expect("a");
        let own_admin = inv.create(AdminUser::new("host-ops", "admin")).await.expect("b");
        let mut cluster = Cluster::new("east");
        cluster.admin_user = Some(cluster_admin.id);
        let cluster = inv.create(cluster).await.expect("cluster");

        let mut inherits = Asset::new("10.0.0.1", "inherits");
        inherits.cluster = Some(cluster.id);
        let mut overrides = inherits.clone();
        overrides.id = Uuid::new_v4();
        overrides.admin_user = Some(own_admin.id);
        let orphan = Asset::new("10.0.0.3", "orphan");

        let resolved = inv.admin_user_for_asset(&inherits).await.expect("inherits");
        assert_eq!(resolved.map(|a| a.id), Some(cluster_admin.id));
        let resolved = inv.admin_user_for_asset(&overrides).await.expect("overrides");
        assert_eq!(resolved.map(|a| a.id), Some(own_admin.id));
        assert_eq!(inv.admin_user_for_asset(&orphan).await.expect("orphan"), None);
    }

    #[tokio::test]
    async fn sealed_secrets_survive_storage() {
        use keyward_storage::{key_provider::generate_key, signer::AesGcmSigner};

        let signer = AesGcmSigner::new(&generate_key()).expect("signer");
        let inv = inventory();
        let mut user = SystemUser::new("deploy", "deploy");
        user.credential.set_password("hunter2", &signer).expect("seal");
        let user = inv.create(user).await.expect("create");

        let loaded = inv.get::<SystemUser>(user.id).await.expect("get");
        assert_eq!(
            loaded.credential.password(&signer).expect("open").as_deref(),
            Some("hunter2")
        );
    }
}
