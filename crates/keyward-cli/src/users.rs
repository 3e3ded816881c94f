use std::{
    collections::BTreeSet,
    fs,
    io::{self, BufRead},
    path::Path,
};

use color_eyre::{eyre::WrapErr, Result};
use keyward_core::{
    models::{AdminUser, Asset, AssetGroup, AuthMethod, BecomeMethod, Cluster, Credential, SystemUser},
    storage::RecordStore,
    EncryptedField, FieldCipher,
};
use keyward_inventory::{Inventory, Record};
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::{
    cli::{
        AdminUserArgs, AdminUserCommand, AuthMethodArg, BecomeMethodArg, CredentialArgs,
        SystemUserArgs, SystemUserCommand,
    },
    config::Config,
    output, storage,
    storage::Vault,
};

pub async fn handle_admin(mut cmd: AdminUserCommand, config: &Config) -> Result<()> {
    if let AdminUserCommand::Create(args) | AdminUserCommand::Update { args, .. } = &mut cmd {
        read_admin_secrets(args, &mut io::stdin().lock())?;
    }
    let vault = storage::open(config).await?;
    output::print(&run_admin(cmd, &vault).await?)
}

pub async fn handle_system(mut cmd: SystemUserCommand, config: &Config) -> Result<()> {
    if let SystemUserCommand::Create(args) | SystemUserCommand::Update { args, .. } = &mut cmd {
        read_credential_secrets(&mut args.credential, &mut io::stdin().lock())?;
    }
    let vault = storage::open(config).await?;
    output::print(&run_system(cmd, &vault).await?)
}

pub(crate) async fn run_admin<S: RecordStore>(
    cmd: AdminUserCommand,
    vault: &Vault<S>,
) -> Result<Value> {
    let inv = &vault.inventory;
    let value = match cmd {
        AdminUserCommand::List => {
            let mut rows = Vec::new();
            for admin in inv.list::<AdminUser>().await? {
                rows.push(admin_summary(inv, &admin).await?);
            }
            Value::Array(rows)
        }
        AdminUserCommand::Show { ident } => {
            let admin = inv.resolve::<AdminUser>(&ident).await?;
            admin_summary(inv, &admin).await?
        }
        AdminUserCommand::Create(args) => {
            let (name, username) = required_names(&args.name, &args.username)?;
            let mut admin = AdminUser::new(name, username);
            apply_admin_args(&mut admin, args, vault.cipher())?;
            let admin = inv.create(admin).await?;
            warn_if_unusable(admin.id, &admin.credential);
            admin.to_json()
        }
        AdminUserCommand::Update { ident, args } => {
            let mut admin = inv.resolve::<AdminUser>(&ident).await?;
            apply_admin_args(&mut admin, args, vault.cipher())?;
            let admin = inv.update(admin).await?;
            warn_if_unusable(admin.id, &admin.credential);
            admin.to_json()
        }
        AdminUserCommand::Delete { ident } => {
            let admin = inv.resolve::<AdminUser>(&ident).await?;
            inv.delete_admin_user(admin.id).await?;
            json!({ "deleted": admin.id })
        }
        AdminUserCommand::Assets { ident } => {
            let admin = inv.resolve::<AdminUser>(&ident).await?;
            assets_json(inv.admin_user_assets(admin.id).await?)
        }
    };
    Ok(value)
}

pub(crate) async fn run_system<S: RecordStore>(
    cmd: SystemUserCommand,
    vault: &Vault<S>,
) -> Result<Value> {
    let inv = &vault.inventory;
    let value = match cmd {
        SystemUserCommand::List => {
            let mut rows = Vec::new();
            for user in inv.list::<SystemUser>().await? {
                rows.push(system_summary(inv, &user).await?);
            }
            Value::Array(rows)
        }
        SystemUserCommand::Show { ident } => {
            let user = inv.resolve::<SystemUser>(&ident).await?;
            system_summary(inv, &user).await?
        }
        SystemUserCommand::Create(args) => {
            let (name, username) = required_names(&args.name, &args.username)?;
            let mut user = SystemUser::new(name, username);
            apply_system_args(inv, &mut user, args, vault.cipher()).await?;
            let user = inv.create(user).await?;
            warn_if_unusable(user.id, &user.credential);
            user.to_json()
        }
        SystemUserCommand::Update { ident, args } => {
            let mut user = inv.resolve::<SystemUser>(&ident).await?;
            apply_system_args(inv, &mut user, args, vault.cipher()).await?;
            let user = inv.update(user).await?;
            warn_if_unusable(user.id, &user.credential);
            user.to_json()
        }
        SystemUserCommand::Delete { ident } => {
            let user = inv.resolve::<SystemUser>(&ident).await?;
            inv.delete_system_user(user.id).await?;
            json!({ "deleted": user.id })
        }
        SystemUserCommand::AuthInfo { ident } => {
            let user = inv.resolve::<SystemUser>(&ident).await?;
            serde_json::to_value(vault.projector.auth_info(&user)?)?
        }
        SystemUserCommand::Assets { ident } => {
            let user = inv.resolve::<SystemUser>(&ident).await?;
            assets_json(inv.system_user_assets(user.id).await?)
        }
        SystemUserCommand::SetAssets { ident, assets } => {
            let user = inv.resolve::<SystemUser>(&ident).await?;
            let ids = resolve_ids::<Asset, S>(inv, &assets).await?;
            assets_json(inv.set_system_user_assets(user.id, ids).await?)
        }
        SystemUserCommand::SetGroups { ident, groups } => {
            let user = inv.resolve::<SystemUser>(&ident).await?;
            let ids = resolve_ids::<AssetGroup, S>(inv, &groups).await?;
            let groups = inv.set_system_user_groups(user.id, ids).await?;
            Value::Array(groups.iter().map(AssetGroup::to_json).collect())
        }
    };
    Ok(value)
}

/// Resolve every identifier (id or name) to a record id.
pub(crate) async fn resolve_ids<T: Record, S: RecordStore>(
    inv: &Inventory<S>,
    idents: &[String],
) -> Result<BTreeSet<Uuid>> {
    let mut ids = BTreeSet::new();
    for ident in idents {
        ids.insert(inv.resolve::<T>(ident).await?.id());
    }
    Ok(ids)
}

pub(crate) fn assets_json(assets: Vec<Asset>) -> Value {
    Value::Array(assets.iter().map(Asset::to_json).collect())
}

fn required_names(name: &Option<String>, username: &Option<String>) -> Result<(String, String)> {
    let name = name
        .clone()
        .ok_or_else(|| color_eyre::eyre::eyre!("--name is required"))?;
    let username = username
        .clone()
        .ok_or_else(|| color_eyre::eyre::eyre!("--username is required"))?;
    Ok((name, username))
}

async fn admin_summary<S: RecordStore>(inv: &Inventory<S>, admin: &AdminUser) -> Result<Value> {
    let mut value = admin.to_json();
    value["assets_amount"] = json!(inv.admin_user_assets_amount(admin.id).await?);
    Ok(value)
}

async fn system_summary<S: RecordStore>(inv: &Inventory<S>, user: &SystemUser) -> Result<Value> {
    let mut value = user.to_json();
    value["assets_amount"] = json!(inv.system_user_assets_amount(user.id).await?);
    Ok(value)
}

/// Logs a warning for a saved user that has neither a password nor a private key.
fn warn_if_unusable(id: Uuid, credential: &Credential) -> bool {
    if credential.can_login() {
        return false;
    }
    warn!(user = %id, "credential has neither password nor private key; login will fail");
    true
}

fn read_admin_secrets(args: &mut AdminUserArgs, input: &mut impl BufRead) -> Result<()> {
    read_credential_secrets(&mut args.credential, input)?;
    if args.become_password_stdin {
        args.become_password = Some(read_secret_line(input)?);
    }
    Ok(())
}

fn read_credential_secrets(args: &mut CredentialArgs, input: &mut impl BufRead) -> Result<()> {
    if args.password_stdin {
        args.password = Some(read_secret_line(input)?);
    }
    Ok(())
}

fn read_secret_line(input: &mut impl BufRead) -> Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line).wrap_err("reading secret from stdin")? == 0 {
        color_eyre::eyre::bail!("stdin closed before a secret was read");
    }
    let secret = line.strip_suffix('\n').unwrap_or(line.as_str());
    Ok(secret.strip_suffix('\r').unwrap_or(secret).to_string())
}

fn apply_credential(
    credential: &mut Credential,
    args: CredentialArgs,
    cipher: &dyn FieldCipher,
) -> Result<()> {
    if let Some(password) = args.password {
        credential.set_password(&password, cipher)?;
    }
    if let Some(path) = args.private_key_file {
        credential.set_private_key(&read_key_file(&path)?, cipher)?;
    }
    if args.clear_private_key {
        credential.private_key = EncryptedField::empty();
    }
    if let Some(public_key) = args.public_key {
        credential.set_public_key(&public_key, cipher)?;
    }
    Ok(())
}

fn read_key_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).wrap_err_with(|| format!("reading private key {}", path.display()))
}

fn apply_admin_args(admin: &mut AdminUser, args: AdminUserArgs, cipher: &dyn FieldCipher) -> Result<()> {
    if let Some(name) = args.name {
        admin.name = name;
    }
    if let Some(username) = args.username {
        admin.credential.username = username;
    }
    apply_credential(&mut admin.credential, args.credential, cipher)?;
    if let Some(enabled) = args.escalate {
        admin.escalation.enabled = enabled;
    }
    if let Some(method) = args.become_method {
        admin.escalation.method = match method {
            BecomeMethodArg::Sudo => BecomeMethod::Sudo,
            BecomeMethodArg::Su => BecomeMethod::Su,
        };
    }
    if let Some(user) = args.become_user {
        admin.escalation.user = user;
    }
    if let Some(password) = args.become_password {
        admin.set_become_password(&password, cipher)?;
    }
    if let Some(comment) = args.comment {
        admin.comment = comment;
    }
    Ok(())
}

async fn apply_system_args<S: RecordStore>(
    inv: &Inventory<S>,
    user: &mut SystemUser,
    args: SystemUserArgs,
    cipher: &dyn FieldCipher,
) -> Result<()> {
    if let Some(name) = args.name {
        user.name = name;
    }
    if let Some(username) = args.username {
        user.credential.username = username;
    }
    apply_credential(&mut user.credential, args.credential, cipher)?;
    if let Some(method) = args.auth_method {
        user.auth_method = match method {
            AuthMethodArg::Password => AuthMethod::Password,
            AuthMethodArg::Key => AuthMethod::PublicKey,
        };
    }
    if let Some(auto_push) = args.auto_push {
        user.auto_push = auto_push;
    }
    if let Some(sudo) = args.sudo {
        user.sudo = sudo;
    }
    if let Some(shell) = args.shell {
        user.shell = shell;
    }
    if let Some(clusters) = args.clusters {
        user.clusters = resolve_ids::<Cluster, S>(inv, &clusters).await?;
    }
    if let Some(comment) = args.comment {
        user.comment = comment;
    }
    Ok(())
}
