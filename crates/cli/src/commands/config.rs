use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use bushidage_core::approvals::FlowTemplates;
use bushidage_core::config::{AppConfig, LoadOptions};
use bushidage_core::domain::approval::RequestType;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", &["BUSHIDAGE_DATABASE_URL"]),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", &["BUSHIDAGE_DATABASE_MAX_CONNECTIONS"]),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", &["BUSHIDAGE_DATABASE_TIMEOUT_SECS"]),
    ));
    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["BUSHIDAGE_LOGGING_LEVEL", "BUSHIDAGE_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format).to_ascii_lowercase(),
        source("logging.format", &["BUSHIDAGE_LOGGING_FORMAT", "BUSHIDAGE_LOG_FORMAT"]),
    ));
    lines.push(render_line(
        "workflow.enforce_approver_authority",
        &config.workflow.enforce_approver_authority.to_string(),
        source(
            "workflow.enforce_approver_authority",
            &["BUSHIDAGE_WORKFLOW_ENFORCE_APPROVER_AUTHORITY"],
        ),
    ));

    for (role, rank) in &config.workflow.role_ranks {
        let key = format!("workflow.role_ranks.{role}");
        lines.push(render_line(&key, &rank.to_string(), source(&key, &[])));
    }

    let templates = FlowTemplates::with_overrides(config.workflow.templates.clone());
    for request_type in RequestType::ALL {
        let key = format!("workflow.templates.{}", request_type.as_str());
        let chain = templates
            .template_for(request_type)
            .steps
            .iter()
            .map(|step| format!("{} ({})", step.approver, step.role))
            .collect::<Vec<_>>()
            .join(" -> ");
        lines.push(render_line(&key, &chain, source(&key, &[])));
    }

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("bushidage.toml"), PathBuf::from("config/bushidage.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    if key_path.starts_with("workflow.role_ranks.") || key_path.starts_with("workflow.templates.")
    {
        return "builtin".to_string();
    }
    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
