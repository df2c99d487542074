use bushidage_core::config::{AppConfig, LoadOptions};
use bushidage_db::{connect_with_config, migrations, ping, DbPool};
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let (report, exit_code) = build_report();

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> (DoctorReport, u8) {
    let mut checks = Vec::new();

    let exit_code = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_workflow(&config));
            let (database_checks, database_exit_code) = check_database(&config);
            checks.extend(database_checks);
            database_exit_code
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["workflow_templates", "database_connectivity", "schema_migrations"] {
                checks.push(DoctorCheck::skipped(name, "configuration did not load"));
            }
            2
        }
    };

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    (DoctorReport { overall_status, summary, checks }, exit_code)
}

fn check_workflow(config: &AppConfig) -> DoctorCheck {
    let overrides = config
        .workflow
        .templates
        .iter()
        .map(|template| template.request_type.as_str())
        .collect::<Vec<_>>();
    let authority = if config.workflow.enforce_approver_authority { "enforced" } else { "off" };
    let details = if overrides.is_empty() {
        format!("builtin templates for all request types; approver authority {authority}")
    } else {
        format!("overrides for {}; approver authority {authority}", overrides.join(", "))
    };

    DoctorCheck { name: "workflow_templates", status: CheckStatus::Pass, details }
}

/// Connectivity and schema checks plus the exit code they imply
/// (4 unreachable, 5 migrations pending).
fn check_database(config: &AppConfig) -> (Vec<DoctorCheck>, u8) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            let checks = vec![
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("failed to initialize async runtime: {error}"),
                },
                DoctorCheck::skipped("schema_migrations", "the runtime did not start"),
            ];
            return (checks, 4);
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                let checks = vec![
                    DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Fail,
                        details: format!("failed to connect to database: {error}"),
                    },
                    DoctorCheck::skipped("schema_migrations", "the database is unreachable"),
                ];
                return (checks, 4);
            }
        };

        let connectivity = match ping(&pool).await {
            Ok(()) => DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Pass,
                details: format!("connected using `{}`", config.database.url),
            },
            Err(error) => DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("connection opened but query failed: {error}"),
            },
        };
        let schema = check_schema(&pool).await;
        pool.close().await;

        let exit_code = if connectivity.status == CheckStatus::Fail {
            4
        } else if schema.status == CheckStatus::Fail {
            5
        } else {
            0
        };
        (vec![connectivity, schema], exit_code)
    })
}

async fn check_schema(pool: &DbPool) -> DoctorCheck {
    let missing = match migrations::pending_count(pool).await {
        Ok(missing) => missing,
        Err(error) => {
            return DoctorCheck {
                name: "schema_migrations",
                status: CheckStatus::Fail,
                details: format!("could not read migration ledger: {error}"),
            };
        }
    };

    if missing == 0 {
        DoctorCheck {
            name: "schema_migrations",
            status: CheckStatus::Pass,
            details: "all migrations applied".to_string(),
        }
    } else {
        DoctorCheck {
            name: "schema_migrations",
            status: CheckStatus::Fail,
            details: format!("{missing} migration(s) pending; run `bushidage migrate`"),
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
