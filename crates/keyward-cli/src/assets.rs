use std::{fs, path::PathBuf};

use color_eyre::{eyre::WrapErr, Result};
use keyward_core::{
    models::{AdminUser, Asset, AssetGroup, Cluster, SystemUser},
    storage::RecordStore,
};
use keyward_inventory::{AssetPatch, Inventory};
use keyward_push::{FilePush, NoopPush, PushPlan, PushTarget};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::{
    cli::{AssetArgs, AssetCommand, ClusterArgs, ClusterCommand, GroupArgs, GroupCommand, PushTargetArg},
    config::Config,
    output, storage,
    storage::Vault,
    users::{assets_json, resolve_ids},
};

pub async fn handle_asset(cmd: AssetCommand, config: &Config) -> Result<()> {
    let vault = storage::open(config).await?;
    output::print(&run_asset(cmd, &vault).await?)
}

pub async fn handle_group(cmd: GroupCommand, config: &Config) -> Result<()> {
    let vault = storage::open(config).await?;
    let push_dir = push_dir(config)?;
    output::print(&run_group(cmd, &vault, push_dir).await?)
}

pub async fn handle_cluster(cmd: ClusterCommand, config: &Config) -> Result<()> {
    let vault = storage::open(config).await?;
    output::print(&run_cluster(cmd, &vault).await?)
}

fn push_dir(config: &Config) -> Result<PathBuf> {
    match &config.push_dir {
        Some(dir) => Ok(dir.clone()),
        None => Ok(storage::data_dir_from_config(config)?.join("push")),
    }
}

pub(crate) async fn run_asset<S: RecordStore>(cmd: AssetCommand, vault: &Vault<S>) -> Result<Value> {
    let inv = &vault.inventory;
    let value = match cmd {
        AssetCommand::List => assets_json(inv.list::<Asset>().await?),
        AssetCommand::Show { id } => inv.get::<Asset>(parse_id(&id)?).await?.to_json(),
        AssetCommand::Create(args) => {
            let ip = args
                .ip
                .clone()
                .ok_or_else(|| color_eyre::eyre::eyre!("--ip is required"))?;
            let hostname = args
                .hostname
                .clone()
                .ok_or_else(|| color_eyre::eyre::eyre!("--hostname is required"))?;
            let mut asset = Asset::new(ip, hostname);
            apply_asset_args(inv, &mut asset, args).await?;
            inv.create(asset).await?.to_json()
        }
        AssetCommand::Update { id, args } => {
            let mut asset = inv.get::<Asset>(parse_id(&id)?).await?;
            apply_asset_args(inv, &mut asset, args).await?;
            inv.update(asset).await?.to_json()
        }
        AssetCommand::Delete { id } => {
            let asset = inv.delete_asset(parse_id(&id)?).await?;
            json!({ "deleted": asset.id })
        }
        AssetCommand::SetGroups { id, groups } => {
            let ids = resolve_ids::<AssetGroup, S>(inv, &groups).await?;
            inv.set_asset_groups(parse_id(&id)?, ids).await?.to_json()
        }
        AssetCommand::SetSystemUsers { id, users } => {
            let ids = resolve_ids::<SystemUser, S>(inv, &users).await?;
            inv.set_asset_system_users(parse_id(&id)?, ids).await?.to_json()
        }
        AssetCommand::BulkUpdate { file } => {
            let body = fs::read_to_string(&file)
                .wrap_err_with(|| format!("reading {}", file.display()))?;
            let patches: Vec<AssetPatch> =
                serde_json::from_str(&body).wrap_err("parsing asset patches")?;
            assets_json(inv.bulk_update_assets(&patches).await?)
        }
    };
    Ok(value)
}

pub(crate) async fn run_group<S: RecordStore>(
    cmd: GroupCommand,
    vault: &Vault<S>,
    push_dir: PathBuf,
) -> Result<Value> {
    let inv = &vault.inventory;
    let value = match cmd {
        GroupCommand::List => Value::Array(
            inv.list::<AssetGroup>()
                .await?
                .iter()
                .map(AssetGroup::to_json)
                .collect(),
        ),
        GroupCommand::Show { ident } => inv.resolve::<AssetGroup>(&ident).await?.to_json(),
        GroupCommand::Create(args) => {
            let name = args
                .name
                .clone()
                .ok_or_else(|| color_eyre::eyre::eyre!("--name is required"))?;
            let mut group = AssetGroup::new(name);
            apply_group_args(&mut group, args);
            inv.create(group).await?.to_json()
        }
        GroupCommand::Update { ident, args } => {
            let mut group = inv.resolve::<AssetGroup>(&ident).await?;
            apply_group_args(&mut group, args);
            inv.update(group).await?.to_json()
        }
        GroupCommand::Delete { ident } => {
            let group = inv.resolve::<AssetGroup>(&ident).await?;
            inv.delete_group(group.id).await?;
            json!({ "deleted": group.id })
        }
        GroupCommand::Assets { ident } => {
            let group = inv.resolve::<AssetGroup>(&ident).await?;
            assets_json(inv.group_assets(group.id).await?)
        }
        GroupCommand::SetAssets { ident, assets } => {
            let group = inv.resolve::<AssetGroup>(&ident).await?;
            let ids = resolve_ids::<Asset, S>(inv, &assets).await?;
            assets_json(inv.set_group_assets(group.id, ids).await?)
        }
        GroupCommand::SetSystemUsers { ident, users } => {
            let group = inv.resolve::<AssetGroup>(&ident).await?;
            let ids = resolve_ids::<SystemUser, S>(inv, &users).await?;
            inv.set_group_system_users(group.id, ids).await?.to_json()
        }
        GroupCommand::PushSystemUser { ident, target } => {
            let group = inv.resolve::<AssetGroup>(&ident).await?;
            let plan = PushPlan::for_group(inv, &vault.projector, &group).await?;
            let target: Box<dyn PushTarget> = match target {
                PushTargetArg::Noop => Box::new(NoopPush),
                PushTargetArg::File => Box::new(FilePush::new(push_dir)),
            };
            info!(target = target.name(), plan = %plan.id, "pushing system users");
            target
                .push(&plan)
                .await
                .map_err(|e| color_eyre::eyre::eyre!("{e:#}"))?;
            json!({
                "plan": plan.id,
                "target": target.name(),
                "hosts": plan.hosts.len(),
                "system_users": group.system_users.len(),
            })
        }
    };
    Ok(value)
}

pub(crate) async fn run_cluster<S: RecordStore>(
    cmd: ClusterCommand,
    vault: &Vault<S>,
) -> Result<Value> {
    let inv = &vault.inventory;
    let value = match cmd {
        ClusterCommand::List => Value::Array(
            inv.list::<Cluster>()
                .await?
                .iter()
                .map(Cluster::to_json)
                .collect(),
        ),
        ClusterCommand::Show { ident } => inv.resolve::<Cluster>(&ident).await?.to_json(),
        ClusterCommand::Create(args) => {
            let name = args
                .name
                .clone()
                .ok_or_else(|| color_eyre::eyre::eyre!("--name is required"))?;
            let mut cluster = Cluster::new(name);
            apply_cluster_args(inv, &mut cluster, args).await?;
            inv.create(cluster).await?.to_json()
        }
        ClusterCommand::Update { ident, args } => {
            let mut cluster = inv.resolve::<Cluster>(&ident).await?;
            apply_cluster_args(inv, &mut cluster, args).await?;
            inv.update(cluster).await?.to_json()
        }
        ClusterCommand::Delete { ident } => {
            let cluster = inv.resolve::<Cluster>(&ident).await?;
            inv.delete_cluster(cluster.id).await?;
            json!({ "deleted": cluster.id })
        }
        ClusterCommand::SetAssets { ident, assets } => {
            let cluster = inv.resolve::<Cluster>(&ident).await?;
            let ids = resolve_ids::<Asset, S>(inv, &assets).await?;
            assets_json(inv.set_cluster_assets(cluster.id, ids).await?)
        }
    };
    Ok(value)
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).wrap_err_with(|| format!("invalid asset id `{id}`"))
}

/// An empty string clears an optional link.
async fn optional_link<T: keyward_inventory::Record, S: RecordStore>(
    inv: &Inventory<S>,
    ident: &str,
) -> Result<Option<Uuid>> {
    if ident.is_empty() {
        return Ok(None);
    }
    Ok(Some(inv.resolve::<T>(ident).await?.id()))
}

async fn apply_asset_args<S: RecordStore>(
    inv: &Inventory<S>,
    asset: &mut Asset,
    args: AssetArgs,
) -> Result<()> {
    if let Some(ip) = args.ip {
        asset.ip = ip;
    }
    if let Some(hostname) = args.hostname {
        asset.hostname = hostname;
    }
    if let Some(port) = args.port {
        asset.port = port;
    }
    if let Some(cluster) = args.cluster {
        asset.cluster = optional_link::<Cluster, S>(inv, &cluster).await?;
    }
    if let Some(admin) = args.admin_user {
        asset.admin_user = optional_link::<AdminUser, S>(inv, &admin).await?;
    }
    if let Some(active) = args.active {
        asset.is_active = active;
    }
    if let Some(comment) = args.comment {
        asset.comment = comment;
    }
    Ok(())
}

fn apply_group_args(group: &mut AssetGroup, args: GroupArgs) {
    if let Some(name) = args.name {
        group.name = name;
    }
    if let Some(comment) = args.comment {
        group.comment = comment;
    }
}

async fn apply_cluster_args<S: RecordStore>(
    inv: &Inventory<S>,
    cluster: &mut Cluster,
    args: ClusterArgs,
) -> Result<()> {
    if let Some(name) = args.name {
        cluster.name = name;
    }
    if let Some(admin) = args.admin_user {
        cluster.admin_user = optional_link::<AdminUser, S>(inv, &admin).await?;
    }
    if let Some(comment) = args.comment {
        cluster.comment = comment;
    }
    Ok(())
}
