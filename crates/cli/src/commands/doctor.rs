use dialroute_core::config::{AppConfig, LlmProvider, LoadOptions};
use dialroute_core::domain::conversation::OrganizationId;
use dialroute_core::sources::RoutingConfigSource;
use dialroute_db::{connect_with_config, migrations, RoutingSeedDataset, SqlRoutingConfigRepository};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
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
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            ));
            checks.push(check_model_readiness(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::new("config_validation", CheckStatus::Fail, error.to_string()));
            for name in ["model_readiness", "database_connectivity", "routing_rules"] {
                checks.push(DoctorCheck::new(
                    name,
                    CheckStatus::Skipped,
                    "skipped because configuration did not load",
                ));
            }
        }
    }

    // Warnings (no model, no rules yet) do not fail the report.
    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_model_readiness(config: &AppConfig) -> DoctorCheck {
    let llm = &config.llm;
    if !llm.enabled {
        return DoctorCheck::new(
            "model_readiness",
            CheckStatus::Warn,
            "model fallback disabled; classification is deterministic only",
        );
    }
    if llm.provider != LlmProvider::Ollama && llm.api_key.is_none() {
        return DoctorCheck::new(
            "model_readiness",
            CheckStatus::Fail,
            format!("{} requires llm.api_key", llm.provider.as_str()),
        );
    }
    DoctorCheck::new(
        "model_readiness",
        CheckStatus::Pass,
        format!("{} model `{}` configured", llm.provider.as_str(), llm.model),
    )
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck::new(
                    "database_connectivity",
                    CheckStatus::Fail,
                    format!("failed to initialize async runtime: {error}"),
                ),
                DoctorCheck::new("routing_rules", CheckStatus::Skipped, "no async runtime"),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::new(
                        "database_connectivity",
                        CheckStatus::Fail,
                        format!("failed to connect to database: {error}"),
                    ),
                    DoctorCheck::new(
                        "routing_rules",
                        CheckStatus::Skipped,
                        "skipped because the database is unreachable",
                    ),
                ];
            }
        };
        let connectivity = DoctorCheck::new(
            "database_connectivity",
            CheckStatus::Pass,
            format!("connected using `{}`", config.database.url),
        );

        let rules = match migrations::pending_versions(&pool).await {
            Ok(pending) if !pending.is_empty() => DoctorCheck::new(
                "routing_rules",
                CheckStatus::Warn,
                format!("{} migrations pending; run `dialroute migrate`", pending.len()),
            ),
            Ok(_) => count_rules(&pool, &config.routing.domain).await,
            Err(error) => DoctorCheck::new("routing_rules", CheckStatus::Fail, error.to_string()),
        };

        pool.close().await;
        vec![connectivity, rules]
    })
}

async fn count_rules(pool: &dialroute_db::DbPool, domain: &str) -> DoctorCheck {
    let repo = SqlRoutingConfigRepository::new(pool.clone());
    let organization = OrganizationId(RoutingSeedDataset::ORGANIZATION_ID);
    match repo.get_configs(&organization, domain).await {
        Ok(rules) if rules.is_empty() => DoctorCheck::new(
            "routing_rules",
            CheckStatus::Warn,
            format!("no rules for organization {organization} domain `{domain}`; run `dialroute seed`"),
        ),
        Ok(rules) => DoctorCheck::new(
            "routing_rules",
            CheckStatus::Pass,
            format!("{} rules for organization {organization} domain `{domain}`", rules.len()),
        ),
        Err(error) => DoctorCheck::new("routing_rules", CheckStatus::Fail, error.to_string()),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
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
