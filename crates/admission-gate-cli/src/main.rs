// crates/admission-gate-cli/src/main.rs
// ============================================================================
// Module: Admission Gate CLI Entry Point
// Description: Command dispatcher for serving and operating the admission gate.
// Purpose: Run the gateway and manage policy, flags, and allow-list ranges.
// Dependencies: admission-gate-{config, core, http, store-sqlite}, clap, tokio
// ============================================================================

//! ## Overview
//! `admission-gate serve` runs the HTTP gateway. The remaining commands work
//! offline against the configured `SQLite` policy store or the configured
//! range publishers, so operators can grant roles, toggle feature flags, and
//! check range availability without a running server. Command results go to
//! stdout as JSON; logs and errors go to stderr.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod logging;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use admission_gate_config::AdmissionGateConfig;
use admission_gate_config::ConfigError;
use admission_gate_config::PolicyStoreType;
use admission_gate_config::config_toml_example;
use admission_gate_core::Action;
use admission_gate_core::AuthorizationEngine;
use admission_gate_core::FeatureFlag;
use admission_gate_core::IpAllowList;
use admission_gate_core::PolicyRule;
use admission_gate_core::PolicyStore;
use admission_gate_core::ResourceName;
use admission_gate_core::RoleAssignment;
use admission_gate_core::RoleName;
use admission_gate_core::SubjectId;
use admission_gate_core::SystemClock;
use admission_gate_http::GatewayServer;
use admission_gate_http::ServerError;
use admission_gate_http::TracingAuditSink;
use admission_gate_http::http_range_sources;
use admission_gate_store_sqlite::SqlitePolicyStore;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::logging::LogFormat;
use crate::logging::init_logging;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "admission-gate", version, disable_help_subcommand = true)]
struct Cli {
    /// Log line format written to stderr.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the admission gateway HTTP server.
    Serve(ConfigArgs),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Role assignments, policy rules, and authorization checks.
    Policy {
        /// Selected policy subcommand.
        #[command(subcommand)]
        command: PolicyCommand,
    },
    /// Feature flag management.
    Flag {
        /// Selected flag subcommand.
        #[command(subcommand)]
        command: FlagCommand,
    },
    /// Payment-processor range utilities.
    Ranges {
        /// Selected ranges subcommand.
        #[command(subcommand)]
        command: RangesCommand,
    },
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate an admission gate configuration file.
    Validate(ConfigArgs),
    /// Print an annotated example configuration.
    Example,
}

/// Policy subcommands.
#[derive(Subcommand, Debug)]
enum PolicyCommand {
    /// Assign a role to a subject or role.
    Grant(AssignmentArgs),
    /// Remove a role assignment.
    Revoke(AssignmentArgs),
    /// Add a rule granting a role an action on a resource.
    Allow(RuleArgs),
    /// Remove a policy rule.
    Deny(RuleArgs),
    /// Print every assignment and rule.
    List(ConfigArgs),
    /// Evaluate an authorization decision.
    Check(CheckArgs),
}

/// Flag subcommands.
#[derive(Subcommand, Debug)]
enum FlagCommand {
    /// Create or replace a feature flag.
    Set(FlagSetArgs),
    /// Delete a feature flag.
    Remove(FlagNameArgs),
    /// Print every feature flag.
    List(ConfigArgs),
}

/// Ranges subcommands.
#[derive(Subcommand, Debug)]
enum RangesCommand {
    /// Fetch every configured source once and print the allow-list status.
    Refresh(ConfigArgs),
}

/// Config file selection shared by every command.
#[derive(Args, Debug)]
struct ConfigArgs {
    /// Config file path (defaults to admission-gate.toml or `ADMISSION_GATE_CONFIG`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments naming a role assignment.
#[derive(Args, Debug)]
struct AssignmentArgs {
    /// Config selection.
    #[command(flatten)]
    config: ConfigArgs,
    /// Subject id, or `role:<name>` to make one role inherit another.
    #[arg(long)]
    member: String,
    /// Role being assigned.
    #[arg(long)]
    role: String,
}

/// Arguments naming a policy rule.
#[derive(Args, Debug)]
struct RuleArgs {
    /// Config selection.
    #[command(flatten)]
    config: ConfigArgs,
    /// Role receiving the grant.
    #[arg(long)]
    role: String,
    /// Resource name, or `*`.
    #[arg(long)]
    resource: String,
    /// Action name, or `*`.
    #[arg(long)]
    action: String,
}

/// Arguments for an authorization check.
#[derive(Args, Debug)]
struct CheckArgs {
    /// Config selection.
    #[command(flatten)]
    config: ConfigArgs,
    /// Subject to evaluate; omit for an anonymous caller.
    #[arg(long)]
    subject: Option<String>,
    /// Resource name.
    #[arg(long)]
    resource: String,
    /// Action name.
    #[arg(long, default_value = "read")]
    action: String,
    /// Use the flexible chain (public flags and declared fallbacks).
    #[arg(long)]
    flexible: bool,
}

/// Arguments for `flag set`.
#[derive(Args, Debug)]
struct FlagSetArgs {
    /// Config selection.
    #[command(flatten)]
    config: ConfigArgs,
    /// Flag name; doubles as the resource it opens.
    #[arg(long)]
    name: String,
    /// Store the flag switched off.
    #[arg(long)]
    disabled: bool,
    /// Open the feature to every caller.
    #[arg(long)]
    public: bool,
    /// Role allowed to use the feature (repeatable).
    #[arg(long = "role", value_name = "ROLE")]
    roles: Vec<String>,
    /// Operator-facing description.
    #[arg(long)]
    description: Option<String>,
}

/// Arguments naming a feature flag.
#[derive(Args, Debug)]
struct FlagNameArgs {
    /// Config selection.
    #[command(flatten)]
    config: ConfigArgs,
    /// Flag name.
    #[arg(long)]
    name: String,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI failures reported on stderr.
#[derive(Debug, Error)]
enum CliError {
    /// Configuration could not be loaded or is invalid.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    /// The policy store could not be opened or written.
    #[error("policy store error: {0}")]
    Store(String),
    /// The gateway server failed.
    #[error(transparent)]
    Server(#[from] ServerError),
    /// The async runtime could not start.
    #[error("runtime error: {0}")]
    Runtime(String),
    /// Writing command output failed.
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_format);
    match run(cli.command) {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the selected command.
fn run(command: Commands) -> CliResult<ExitCode> {
    match command {
        Commands::Serve(args) => command_serve(&args),
        Commands::Config {
            command,
        } => command_config(command),
        Commands::Policy {
            command,
        } => command_policy(command),
        Commands::Flag {
            command,
        } => command_flag(command),
        Commands::Ranges {
            command: RangesCommand::Refresh(args),
        } => command_ranges_refresh(&args),
    }
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
///
/// The server is built before the runtime starts; range sources hold
/// blocking HTTP clients that must not be created on a runtime thread.
fn command_serve(args: &ConfigArgs) -> CliResult<ExitCode> {
    let config = load_config(args)?;
    let server = GatewayServer::from_config(config)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("ag-http")
        .build()
        .map_err(|err| CliError::Runtime(err.to_string()))?;
    runtime.block_on(server.serve())?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Executes `config` subcommands.
fn command_config(command: ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate(args) => {
            let config = load_config(&args)?;
            write_json(&json!({
                "valid": true,
                "bind": config.server.bind,
                "policy_store": store_type_label(config.policy_store.store_type),
                "ip_filter_enabled": config.ip_allowlist.filter_enabled,
                "rate_limit_policies": config
                    .rate_limit
                    .policies
                    .iter()
                    .map(|policy| policy.name.as_str())
                    .collect::<Vec<_>>(),
            }))?;
        }
        ConfigCommand::Example => write_stdout_line(config_toml_example().trim_end())?,
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Policy Commands
// ============================================================================

/// Executes `policy` subcommands.
fn command_policy(command: PolicyCommand) -> CliResult<ExitCode> {
    match command {
        PolicyCommand::Grant(args) => {
            let store = open_policy_store(&load_config(&args.config)?)?;
            let assignment = RoleAssignment::new(args.member, args.role.as_str());
            let changed = store.grant_role(&assignment).map_err(store_error)?;
            info!(member = %assignment.member, role = %assignment.role, changed, "role granted");
            write_json(&json!({ "changed": changed, "assignment": assignment }))?;
        }
        PolicyCommand::Revoke(args) => {
            let store = open_policy_store(&load_config(&args.config)?)?;
            let assignment = RoleAssignment::new(args.member, args.role.as_str());
            let changed = store.revoke_role(&assignment).map_err(store_error)?;
            info!(member = %assignment.member, role = %assignment.role, changed, "role revoked");
            write_json(&json!({ "changed": changed, "assignment": assignment }))?;
        }
        PolicyCommand::Allow(args) => {
            let store = open_policy_store(&load_config(&args.config)?)?;
            let rule = rule_from_args(&args);
            let changed = store.add_rule(&rule).map_err(store_error)?;
            write_json(&json!({ "changed": changed, "rule": rule }))?;
        }
        PolicyCommand::Deny(args) => {
            let store = open_policy_store(&load_config(&args.config)?)?;
            let rule = rule_from_args(&args);
            let changed = store.remove_rule(&rule).map_err(store_error)?;
            write_json(&json!({ "changed": changed, "rule": rule }))?;
        }
        PolicyCommand::List(args) => {
            let store = open_policy_store(&load_config(&args)?)?;
            let snapshot = store.load_snapshot().map_err(store_error)?;
            write_json(&to_value(&snapshot)?)?;
        }
        PolicyCommand::Check(args) => return command_policy_check(&args),
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes `policy check`.
fn command_policy_check(args: &CheckArgs) -> CliResult<ExitCode> {
    let config = load_config(&args.config)?;
    let store = open_policy_store(&config)?;
    let engine = AuthorizationEngine::new(store, config.authz_settings());
    let subject = args.subject.as_deref().map(SubjectId::new);
    let resource = ResourceName::new(args.resource.as_str());
    let action = Action::parse(&args.action);
    let decision = if args.flexible {
        engine.flexible_decide(subject.as_ref(), &resource, &action)
    } else {
        engine.decide(subject.as_ref(), &resource, &action)
    };
    write_json(&json!({
        "subject": args.subject,
        "resource": resource.as_str(),
        "action": action.as_str(),
        "allowed": decision.allowed,
        "reason": decision.reason.as_str(),
    }))?;
    Ok(ExitCode::SUCCESS)
}

/// Builds a policy rule from command arguments.
fn rule_from_args(args: &RuleArgs) -> PolicyRule {
    PolicyRule::new(args.role.as_str(), args.resource.as_str(), Action::parse(&args.action))
}

// ============================================================================
// SECTION: Flag Commands
// ============================================================================

/// Executes `flag` subcommands.
fn command_flag(command: FlagCommand) -> CliResult<ExitCode> {
    match command {
        FlagCommand::Set(args) => {
            let store = open_policy_store(&load_config(&args.config)?)?;
            let flag = flag_from_args(&args);
            store.upsert_flag(&flag).map_err(store_error)?;
            info!(
                flag = %flag.name,
                enabled = flag.enabled,
                public = flag.public_access,
                "flag set"
            );
            write_json(&to_value(&flag)?)?;
        }
        FlagCommand::Remove(args) => {
            let store = open_policy_store(&load_config(&args.config)?)?;
            let changed = store.remove_flag(&args.name).map_err(store_error)?;
            write_json(&json!({ "changed": changed, "name": args.name }))?;
        }
        FlagCommand::List(args) => {
            let store = open_policy_store(&load_config(&args)?)?;
            let flags = store.list_flags().map_err(store_error)?;
            write_json(&to_value(&flags)?)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Builds a feature flag from command arguments.
fn flag_from_args(args: &FlagSetArgs) -> FeatureFlag {
    FeatureFlag {
        name: args.name.clone(),
        enabled: !args.disabled,
        public_access: args.public,
        allowed_roles: args.roles.iter().map(|role| RoleName::new(role.as_str())).collect(),
        description: args.description.clone(),
    }
}

// ============================================================================
// SECTION: Ranges Command
// ============================================================================

/// Executes `ranges refresh`; fails when no source answered.
fn command_ranges_refresh(args: &ConfigArgs) -> CliResult<ExitCode> {
    let config = load_config(args)?;
    let sources = http_range_sources(&config)?;
    let allowlist =
        IpAllowList::new(Arc::new(SystemClock), sources, Arc::new(TracingAuditSink));
    let outcome = allowlist.refresh();
    write_json(&json!({
        "outcome": outcome.label(),
        "status": to_value(&allowlist.status())?,
    }))?;
    if outcome.replaced() { Ok(ExitCode::SUCCESS) } else { Ok(ExitCode::FAILURE) }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads and validates configuration.
fn load_config(args: &ConfigArgs) -> CliResult<AdmissionGateConfig> {
    Ok(AdmissionGateConfig::load(args.config.as_deref().map(Path::new))?)
}

/// Opens the configured durable policy store and applies seed records.
fn open_policy_store(config: &AdmissionGateConfig) -> CliResult<Arc<dyn PolicyStore>> {
    if config.policy_store.store_type != PolicyStoreType::Sqlite {
        return Err(CliError::Store(
            "policy commands require policy_store.type = \"sqlite\"".to_string(),
        ));
    }
    let sqlite = config
        .policy_store
        .sqlite_config()
        .ok_or_else(|| CliError::Store("sqlite policy_store requires path".to_string()))?;
    let store = SqlitePolicyStore::open(&sqlite).map_err(store_error)?;
    let (snapshot, flags) = config.policy_seed();
    store.seed(&snapshot, &flags).map_err(store_error)?;
    Ok(Arc::new(store))
}

/// Returns the config label for a store type.
const fn store_type_label(store_type: PolicyStoreType) -> &'static str {
    match store_type {
        PolicyStoreType::Memory => "memory",
        PolicyStoreType::Sqlite => "sqlite",
    }
}

/// Maps store errors into CLI errors.
fn store_error(err: impl std::fmt::Display) -> CliError {
    CliError::Store(err.to_string())
}

/// Serializes command output.
fn to_value<T: serde::Serialize>(value: &T) -> CliResult<Value> {
    serde_json::to_value(value).map_err(|err| CliError::Output(std::io::Error::other(err)))
}

/// Writes pretty JSON to stdout.
fn write_json(value: &Value) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::Output(std::io::Error::other(err)))?;
    Ok(write_stdout_line(&text)?)
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
