use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kube::CustomResourceExt;
use log::info;
use serde_json::{json, Map, Value};

use iam_role_operator_reconciler::{controller, desired_role, IamRole, OperatorConfig};

/// Kubernetes operator managing AWS IAM roles for OIDC-federated service accounts
#[derive(Parser, Debug)]
#[command(name = "iam-role-operator", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch IamRole resources and reconcile their IAM roles
    Run(RunArgs),

    /// Print the IamRole CustomResourceDefinition as JSON
    Crd,

    /// Print the trust and inline policies an IamRole manifest produces
    ///
    /// Nothing is sent to AWS or the cluster.
    Render(RenderArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the operator's JSON configuration file
    #[arg(short = 'c', long)]
    config: PathBuf,

    /// AWS region for IAM calls, overriding the config file
    #[arg(long, env = "IAM_ROLE_OPERATOR_REGION")]
    region: Option<String>,

    /// Only watch IamRole resources in this namespace
    #[arg(long, env = "IAM_ROLE_OPERATOR_WATCH_NAMESPACE")]
    watch_namespace: Option<String>,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Path to the operator's JSON configuration file
    #[arg(short = 'c', long)]
    config: PathBuf,

    /// Path to an IamRole manifest in JSON
    #[arg(short = 'f', long)]
    file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Crd => print_crd(),
        Commands::Render(args) => render(&args),
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let mut config = OperatorConfig::from_file(&args.config)?;
    if let Some(region) = args.region {
        config.region = Some(region);
    }

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    info!("Starting IAM role operator");
    controller::run(client, config, args.watch_namespace).await?;
    Ok(())
}

fn print_crd() -> Result<()> {
    let crd = serde_json::to_string_pretty(&IamRole::crd()).context("Failed to serialize CRD")?;
    println!("{crd}");
    Ok(())
}

fn render(args: &RenderArgs) -> Result<()> {
    let config = OperatorConfig::from_file(&args.config)?;
    let manifest = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let role: IamRole = serde_json::from_str(&manifest)
        .with_context(|| format!("{} is not a valid IamRole manifest", args.file.display()))?;
    anyhow::ensure!(
        role.metadata.name.is_some(),
        "{} has no metadata.name",
        args.file.display()
    );

    let desired = desired_role(&config, &role.to_definition())?;
    let inline_policies = desired
        .inline_policies
        .iter()
        .map(|(name, document)| -> Result<(String, Value)> {
            Ok((name.clone(), serde_json::from_str(document)?))
        })
        .collect::<Result<Map<String, Value>>>()?;

    let output = json!({
        "roleName": desired.role_name,
        "trustPolicy": serde_json::from_str::<Value>(&desired.trust_policy)?,
        "inlinePolicies": inline_policies,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
