use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use portal_auth::{AuthConfig, AuthUser, RestRoleStore, RoleResolver};
use portal_core::{ReconcileConfig, ReconciledView};
use portal_reports::reconcile_str;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "portal-cli",
    about = "Hợp nhất báo cáo bệnh nhân và tra cứu vai trò người dùng cổng."
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Hợp nhất các báo cáo và snapshot sức khỏe (nếu có) thành một view.
    Reconcile {
        /// File JSON chứa mảng các dòng báo cáo.
        #[arg(short, long)]
        reports: PathBuf,
        /// File JSON chứa dòng snapshot sức khỏe.
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
        /// In toàn bộ view dạng JSON thay vì bản tóm tắt.
        #[arg(long)]
        json: bool,
    },
    /// Tra cứu vai trò của người dùng trên backend.
    Role {
        #[arg(short, long)]
        user_id: String,
        /// Access token của người dùng; bỏ trống thì dùng anon key.
        #[arg(short, long)]
        token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("portal=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match Args::parse().command {
        Command::Reconcile {
            reports,
            snapshot,
            json,
        } => run_reconcile(&reports, snapshot.as_deref(), json),
        Command::Role { user_id, token } => run_role(user_id, token).await,
    }
}

fn run_reconcile(reports: &Path, snapshot: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let reports_json = read_file(reports)?;
    let snapshot_json = snapshot.map(read_file).transpose()?;

    let view = reconcile_str(
        &reports_json,
        snapshot_json.as_deref(),
        &ReconcileConfig::default(),
    )?;
    tracing::info!(
        parameters = view.parameters.len(),
        flagged = view.flagged_parameters().count(),
        "reconciled reports"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print_summary(&view);
    }
    Ok(())
}

async fn run_role(user_id: String, token: Option<String>) -> anyhow::Result<()> {
    let config = AuthConfig::from_env().context("Thiếu cấu hình backend của cổng")?;
    let mut store = RestRoleStore::new(&config)?;
    if let Some(token) = token {
        store = store.with_access_token(token);
    }

    let resolver = RoleResolver::from_config(store, &config);
    let enriched = resolver.resolve(&AuthUser::new(user_id)).await;

    println!(
        "User: {}\nRole: {}\nLinked record: {}",
        enriched.user.id,
        enriched.role.as_str(),
        enriched.patient_id.as_deref().unwrap_or("none")
    );
    Ok(())
}

fn read_file(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Không đọc được file {path:?}"))
}

fn print_summary(view: &ReconciledView) {
    let patient = view
        .profile
        .as_ref()
        .and_then(|profile| profile.name.as_deref())
        .unwrap_or("unknown");
    println!(
        "Patient: {patient}\nParameters: {}\nConditions: {}\nMedications: {}",
        view.parameters.len(),
        view.conditions.len(),
        view.medications.len()
    );

    for parameter in view.flagged_parameters() {
        println!(
            "  ! {}: {} {} ({:?})",
            parameter.name,
            parameter.value,
            parameter.unit.as_deref().unwrap_or(""),
            parameter.status
        );
    }
}
