use std::io::Read;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tokio::runtime::Runtime;

use crate::aws::AwsServices;
use crate::config::OperatorConfig;
use crate::conversation::conversation_dispatcher;
use crate::error::LifecycleError;
use crate::lifecycle::AccountLifecycle;
use crate::operator_log::{self, Level};
use crate::report::{self, CreationReport, DeletionReport};
use crate::schedule::{ScheduleRuleManager, cron_expression};
use crate::webhook::{WebhookConfig, WebhookServer};
use crate::workshop::{DeleteRequest, WorkshopRequest};

#[derive(Parser)]
#[command(
    name = "workshop-operator",
    version,
    about = "Create and expire batches of workshop accounts."
)]
pub struct Cli {
    /// YAML configuration (default: ./workshop-operator.yaml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Serve(ServeArgs),
    Create(CreateArgs),
    Delete(DeleteArgs),
    Cron(CronArgs),
}

#[derive(Parser)]
#[command(
    about = "Run the fulfilment webhook until Ctrl-C.",
    after_help = "Optional options:\n  --bind <ADDR> (default: server.bind_addr from config)"
)]
struct ServeArgs {
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[derive(Parser)]
#[command(
    about = "Create a batch of workshop accounts and schedule their deletion.",
    after_help = "Main options:\n  --workshop <NAME>\n  --count <N>\n  --delete-at <RFC3339>\n  --group <GROUP>\n\nOptional options:\n  --contact <EMAIL>\n  --report <PATH> (default: print to stdout)"
)]
struct CreateArgs {
    #[arg(long)]
    workshop: String,
    #[arg(long)]
    count: u32,
    #[arg(long)]
    delete_at: String,
    #[arg(long)]
    group: Option<String>,
    #[arg(long)]
    contact: Option<String>,
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Parser)]
#[command(
    about = "Delete workshop accounts and their deletion rule.",
    long_about = "Either replays a scheduled trigger payload ({\"workshopName\", \"usernames\"}) or names the accounts directly.",
    after_help = "Main options:\n  --payload <PATH|-> or --workshop <NAME> --user <U>...\n\nOptional options:\n  --report <PATH> (default: print to stdout)"
)]
struct DeleteArgs {
    #[arg(long, conflicts_with_all = ["workshop", "users"])]
    payload: Option<String>,
    #[arg(long, required_unless_present = "payload")]
    workshop: Option<String>,
    #[arg(long = "user", required_unless_present = "payload")]
    users: Vec<String>,
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Parser)]
#[command(about = "Print the schedule expression for a deletion time.")]
struct CronArgs {
    #[arg(long)]
    at: String,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        if let Command::Cron(args) = &self.command {
            return args.run();
        }
        let config = OperatorConfig::load(self.config.as_deref())?;
        let level = config.log_level()?;
        operator_log::init(config.log.dir.clone(), level)?;
        // SDK chatter stays at warn unless debugging was asked for.
        let sdk_level = if level <= Level::Debug { level } else { Level::Warn };
        operator_log::init_sdk_tracing(sdk_level);
        let runtime = Runtime::new().context("failed to create tokio runtime")?;
        runtime.block_on(async move {
            match self.command {
                Command::Serve(args) => args.run(&config).await,
                Command::Create(args) => args.run(&config).await,
                Command::Delete(args) => args.run(&config).await,
                Command::Cron(_) => Ok(()),
            }
        })
    }
}

/// Wires the AWS backends into a lifecycle orchestrator.
pub async fn connect_lifecycle(config: &OperatorConfig) -> anyhow::Result<AccountLifecycle> {
    if config.delete_target_arn.trim().is_empty() {
        anyhow::bail!("delete_target_arn (LAMBDA_ARN_TO_DELETE) is not configured");
    }
    let services = AwsServices::connect(config).await;
    let policy = config.batch_policy();
    let rules = ScheduleRuleManager::new(
        services.triggers,
        config.delete_target_arn.clone(),
        policy.call_timeout,
    );
    Ok(AccountLifecycle::new(
        services.access,
        rules,
        services.notifier,
        config.notice_settings(),
        policy,
    ))
}

impl ServeArgs {
    async fn run(self, config: &OperatorConfig) -> anyhow::Result<()> {
        let lifecycle = Arc::new(connect_lifecycle(config).await?);
        let dispatcher = Arc::new(conversation_dispatcher(
            lifecycle.clone(),
            config.conversation_defaults(),
        ));
        let server = WebhookServer::start(WebhookConfig {
            bind_addr: self.bind.unwrap_or(config.server.bind_addr),
            dispatcher,
            lifecycle,
        })
        .await?;
        println!("webhook listening on http://{}", server.local_addr());
        tokio::signal::ctrl_c()
            .await
            .context("failed to wait for Ctrl-C")?;
        operator_log::info(module_path!(), "shutdown requested");
        server.stop().await
    }
}

impl CreateArgs {
    async fn run(self, config: &OperatorConfig) -> anyhow::Result<()> {
        let lifecycle = connect_lifecycle(config).await?;
        let request = WorkshopRequest {
            workshop_name: Some(self.workshop.clone()),
            account_count: Some(self.count),
            delete_at: Some(self.delete_at),
            group_name: self.group,
            responsible_contact: self
                .contact
                .or_else(|| config.conversation.responsible_contact.clone()),
        };
        let accounts = match lifecycle.create_batch(&request).await {
            Ok(accounts) => accounts,
            Err(LifecycleError::Schedule {
                rule,
                accounts,
                source,
            }) => {
                emit(
                    self.report.as_deref(),
                    &CreationReport::new(&self.workshop, &accounts),
                )?;
                anyhow::bail!(
                    "accounts were created but deletion rule {rule} could not be installed: {source}"
                );
            }
            Err(err) => return Err(err.into()),
        };
        let report = CreationReport::new(&self.workshop, &accounts);
        emit(self.report.as_deref(), &report)?;
        if report.failed > 0 {
            anyhow::bail!("{} of {} accounts failed", report.failed, accounts.len());
        }
        Ok(())
    }
}

impl DeleteArgs {
    async fn run(self, config: &OperatorConfig) -> anyhow::Result<()> {
        let request = match self.payload.as_deref() {
            Some(source) => read_payload(source)?,
            None => DeleteRequest::new(self.workshop.unwrap_or_default(), self.users),
        };
        let lifecycle = connect_lifecycle(config).await?;
        let deletions = lifecycle.delete_batch(&request).await?;
        let workshop_name = request.workshop_name.as_deref().unwrap_or_default();
        let report = DeletionReport::new(workshop_name, &deletions);
        emit(self.report.as_deref(), &report)?;
        if !report.complete {
            anyhow::bail!("some accounts of {workshop_name} could not be deleted");
        }
        Ok(())
    }
}

impl CronArgs {
    fn run(&self) -> anyhow::Result<()> {
        let at = DateTime::parse_from_rfc3339(&self.at)
            .with_context(|| format!("invalid RFC3339 date {}", self.at))?;
        println!("{}", cron_expression(at.with_timezone(&Utc)));
        Ok(())
    }
}

fn read_payload(source: &str) -> anyhow::Result<DeleteRequest> {
    let contents = if source == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read payload from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(source).with_context(|| format!("failed to read {source}"))?
    };
    serde_json::from_str(&contents).with_context(|| format!("invalid delete payload in {source}"))
}

fn emit<T: serde::Serialize>(path: Option<&Path>, value: &T) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            report::write_json(path, value)?;
            println!("report written to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_requires_payload_or_names() {
        assert!(Cli::try_parse_from(["workshop-operator", "delete"]).is_err());
        assert!(Cli::try_parse_from(["workshop-operator", "delete", "--payload", "-"]).is_ok());
        assert!(
            Cli::try_parse_from([
                "workshop-operator",
                "delete",
                "--workshop",
                "kata",
                "--user",
                "kata-1",
                "--user",
                "kata-2",
            ])
            .is_ok()
        );
        assert!(
            Cli::try_parse_from([
                "workshop-operator",
                "delete",
                "--payload",
                "p.json",
                "--workshop",
                "kata",
            ])
            .is_err()
        );
    }

    #[test]
    fn payload_file_uses_trigger_shape() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("payload.json");
        std::fs::write(&path, r#"{"workshopName":"kata","usersToDelete":["kata-1"]}"#)?;
        let request = read_payload(path.to_str().unwrap())?;
        let (name, users) = request.validate()?;
        assert_eq!(name, "kata");
        assert_eq!(users, ["kata-1".to_string()]);
        Ok(())
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from([
            "workshop-operator",
            "cron",
            "--at",
            "2024-03-15T00:00:00Z",
            "--config",
            "ops.yaml",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("ops.yaml")));
    }
}
