use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "keyward",
    about = "Asset inventory and credential vault for SSH push automation",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print version and exit.
    Version,
    /// Check the field cipher, record store and key directory.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Accounts used to connect to assets.
    #[command(subcommand)]
    AdminUser(AdminUserCommand),
    /// Accounts pushed onto assets.
    #[command(subcommand)]
    SystemUser(SystemUserCommand),
    #[command(subcommand)]
    Asset(AssetCommand),
    #[command(subcommand)]
    Group(GroupCommand),
    #[command(subcommand)]
    Cluster(ClusterCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file (with a fresh secret key) if one does not exist.
    Init,
}

/// Secret inputs shared by admin and system users. An empty `--password` or
/// `--public-key` clears that field.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialArgs {
    /// Visible in the process list; prefer `--password-stdin`.
    #[arg(long)]
    pub password: Option<String>,
    /// Read the password from the first line of stdin.
    #[arg(long, conflicts_with = "password")]
    pub password_stdin: bool,
    /// Path to a PEM private key.
    #[arg(long)]
    pub private_key_file: Option<PathBuf>,
    /// Remove the stored private key.
    #[arg(long, conflicts_with = "private_key_file")]
    pub clear_private_key: bool,
    #[arg(long)]
    pub public_key: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum BecomeMethodArg {
    Sudo,
    Su,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminUserArgs {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub username: Option<String>,
    #[command(flatten)]
    pub credential: CredentialArgs,
    /// Enable or disable privilege escalation.
    #[arg(long = "become")]
    pub escalate: Option<bool>,
    #[arg(long, value_enum)]
    pub become_method: Option<BecomeMethodArg>,
    #[arg(long)]
    pub become_user: Option<String>,
    #[arg(long)]
    pub become_password: Option<String>,
    /// Read the become password from stdin, after the login password if
    /// `--password-stdin` is also given.
    #[arg(long, conflicts_with = "become_password")]
    pub become_password_stdin: bool,
    #[arg(long)]
    pub comment: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum AdminUserCommand {
    List,
    Show { ident: String },
    Create(AdminUserArgs),
    Update {
        ident: String,
        #[command(flatten)]
        args: AdminUserArgs,
    },
    Delete { ident: String },
    /// Assets reachable with this admin user, directly or through a cluster.
    Assets { ident: String },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum AuthMethodArg {
    Password,
    Key,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemUserArgs {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub username: Option<String>,
    #[command(flatten)]
    pub credential: CredentialArgs,
    #[arg(long, value_enum)]
    pub auth_method: Option<AuthMethodArg>,
    #[arg(long)]
    pub auto_push: Option<bool>,
    /// Sudo rule, e.g. `/sbin/ifconfig,/bin/ls`.
    #[arg(long)]
    pub sudo: Option<String>,
    #[arg(long)]
    pub shell: Option<String>,
    /// Clusters the user is pushed to (replaces the current set when given).
    #[arg(long = "cluster")]
    pub clusters: Option<Vec<String>>,
    #[arg(long)]
    pub comment: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SystemUserCommand {
    List,
    Show { ident: String },
    Create(SystemUserArgs),
    Update {
        ident: String,
        #[command(flatten)]
        args: SystemUserArgs,
    },
    Delete { ident: String },
    /// Print the decrypted credential.
    AuthInfo { ident: String },
    /// Assets the user lands on through clusters, direct assignment and groups.
    Assets { ident: String },
    /// Replace the assets the user is directly assigned to.
    SetAssets { ident: String, assets: Vec<String> },
    /// Replace the groups the user is attached to.
    SetGroups { ident: String, groups: Vec<String> },
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetArgs {
    #[arg(long)]
    pub ip: Option<String>,
    #[arg(long)]
    pub hostname: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub cluster: Option<String>,
    #[arg(long)]
    pub admin_user: Option<String>,
    #[arg(long)]
    pub active: Option<bool>,
    #[arg(long)]
    pub comment: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum AssetCommand {
    List,
    Show { id: String },
    Create(AssetArgs),
    Update {
        id: String,
        #[command(flatten)]
        args: AssetArgs,
    },
    Delete { id: String },
    SetGroups { id: String, groups: Vec<String> },
    SetSystemUsers { id: String, users: Vec<String> },
    /// Apply a JSON array of partial asset updates; nothing changes if any fails.
    BulkUpdate { file: PathBuf },
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupArgs {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub comment: Option<String>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum PushTargetArg {
    #[default]
    Noop,
    File,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum GroupCommand {
    List,
    Show { ident: String },
    Create(GroupArgs),
    Update {
        ident: String,
        #[command(flatten)]
        args: GroupArgs,
    },
    Delete { ident: String },
    Assets { ident: String },
    SetAssets { ident: String, assets: Vec<String> },
    SetSystemUsers { ident: String, users: Vec<String> },
    /// Push the group's system users to its assets.
    PushSystemUser {
        ident: String,
        #[arg(long, value_enum, default_value_t = PushTargetArg::Noop)]
        target: PushTargetArg,
    },
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterArgs {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub admin_user: Option<String>,
    #[arg(long)]
    pub comment: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ClusterCommand {
    List,
    Show { ident: String },
    Create(ClusterArgs),
    Update {
        ident: String,
        #[command(flatten)]
        args: ClusterArgs,
    },
    Delete { ident: String },
    SetAssets { ident: String, assets: Vec<String> },
}
