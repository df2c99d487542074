pub mod config;
pub mod decide;
pub mod doctor;
pub mod list;
pub mod migrate;
pub mod seed;
pub mod show;
pub mod submit;
pub mod summary;

use clap::Args;
use serde::Serialize;
use serde_json::Value;

use bushidage_core::approvals::ApprovalService;
use bushidage_core::audit::TracingAuditSink;
use bushidage_core::config::{AppConfig, LoadOptions};
use bushidage_core::domain::approval::Identity;
use bushidage_core::errors::ApplicationError;
use bushidage_db::{connect_with_config, migrations, DbPool, SqlApprovalRepository};

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// `(error_class, message, exit_code)` carried out of a command's async block.
pub(crate) type CommandError = (&'static str, String, u8);

/// The acting user for commands that submit or decide.
#[derive(Debug, Clone, Args)]
pub struct ActorArgs {
    #[arg(long, help = "Identifier of the acting user")]
    pub user_id: String,
    #[arg(long, help = "Display name of the acting user")]
    pub user_name: String,
    #[arg(long, default_value = "", help = "Department of the acting user")]
    pub department: String,
    #[arg(long, help = "Role key the user may act under, e.g. general_manager")]
    pub role: Option<String>,
}

impl ActorArgs {
    pub fn identity(&self) -> Identity {
        let identity = Identity::new(&self.user_id, &self.user_name, &self.department);
        match self.role.as_deref().map(str::trim).filter(|role| !role.is_empty()) {
            Some(role) => identity.with_role(role),
            None => identity,
        }
    }
}

pub(crate) type CliService = ApprovalService<SqlApprovalRepository, TracingAuditSink>;

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })
}

pub(crate) fn build_runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })
}

pub(crate) async fn open_pool(config: &AppConfig) -> Result<DbPool, CommandError> {
    let pool = connect_with_config(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
    migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string(), 5u8))?;
    Ok(pool)
}

pub(crate) async fn open_service(config: &AppConfig) -> Result<(CliService, DbPool), CommandError> {
    let pool = open_pool(config).await?;
    let service = ApprovalService::from_config(
        SqlApprovalRepository::new(pool.clone()),
        TracingAuditSink,
        &config.workflow,
    );
    Ok((service, pool))
}

pub(crate) fn application_failure(error: &ApplicationError) -> CommandError {
    let class = error.error_class();
    let exit_code = match class {
        "validation" => 6,
        "not_found" => 7,
        "invalid_state" => 8,
        "concurrency_conflict" => 9,
        "unauthorized" => 10,
        "configuration" => 2,
        _ => 11,
    };
    (class, error.to_string(), exit_code)
}

pub(crate) fn validation_failure(message: impl Into<String>) -> CommandError {
    ("validation", message.into(), 6)
}

pub(crate) fn to_data<T: Serialize>(value: &T) -> Result<Value, CommandError> {
    serde_json::to_value(value).map_err(|error| ("serialization", error.to_string(), 11u8))
}

/// Runs `body` against a freshly opened service and closes the pool afterwards.
pub(crate) fn with_service<F, Fut>(command: &str, body: F) -> CommandResult
where
    F: FnOnce(CliService) -> Fut,
    Fut: std::future::Future<Output = Result<(String, Option<Value>), CommandError>>,
{
    let config = match load_config(command) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime(command) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let (service, pool) = open_service(&config).await?;
        let outcome = body(service).await;
        pool.close().await;
        outcome
    });

    match result {
        Ok((message, data)) => CommandResult::success_with_data(command, message, data),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure(command, error_class, message, exit_code)
        }
    }
}
