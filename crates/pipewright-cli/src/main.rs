//! CLI binary for assembling, validating, and exporting Pipewright workflows.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use pipewright_types::PipelineInput;
use pipewright_workflow::{
    assemble, validate, BackendTarget, DeployContext, NodeFactory, PipelineFamily,
    PipelineRegistry, Severity, Stage, Workflow, WorkflowDefinition,
};

#[derive(Parser)]
#[command(name = "pipewright", version, about = "Evaluation workflow graph assembler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Deployment-time environment shared by every subcommand.
#[derive(Args, Clone)]
struct DeployArgs {
    /// Deployment stage: dev, beta, gamma, or prod
    #[arg(long, default_value = "dev")]
    stage: String,

    /// Service account id
    #[arg(long, default_value = "000000000000")]
    account_id: String,

    /// Deployment region
    #[arg(long, default_value = "us-west-2")]
    region: String,

    /// ARN partition
    #[arg(long, default_value = "aws")]
    partition: String,

    /// Region routing code passed to every backend job
    #[arg(long, default_value = "PDX")]
    routing_code: String,

    /// Knowledge-base runtime account id (retrieval-augmented family)
    #[arg(long, default_value = "000000000000")]
    kb_account_id: String,

    /// Backend task definition name
    #[arg(long, default_value = "evaluation-runner")]
    task_definition: String,

    /// Backend image URI for the isolated-network invoke variants
    #[arg(long, default_value = "evaluation-runner:latest")]
    image_uri: String,

    /// Execution role for the isolated-network invoke variants
    #[arg(long, default_value = "evaluation-runner-execution")]
    execution_role: String,

    /// Log group for the isolated-network invoke variants
    #[arg(long, default_value = "/evaluation/runner")]
    log_group: String,

    /// Credential role for the isolated-network invoke variants
    #[arg(long, default_value = "evaluation-runner-credentials")]
    credential_role: String,

    /// Service subnet ids (repeatable)
    #[arg(long = "subnet")]
    subnets: Vec<String>,

    /// Service security group ids (repeatable)
    #[arg(long = "security-group")]
    security_groups: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble every family and write engine definition documents
    Export {
        #[command(flatten)]
        deploy: DeployArgs,

        /// Output directory for definition JSON files and the manifest
        #[arg(short, long, default_value = ".pipewright")]
        output: PathBuf,
    },

    /// Assemble every family and report invariant diagnostics
    Validate {
        #[command(flatten)]
        deploy: DeployArgs,
    },

    /// Show information about one family's assembled workflow
    Info {
        /// Pipeline family: model, rag, or agent
        family: String,

        #[command(flatten)]
        deploy: DeployArgs,
    },

    /// Print the success path the engine would take for a given input
    Trace {
        /// Pipeline family: model, rag, or agent
        family: String,

        #[command(flatten)]
        deploy: DeployArgs,

        /// Instance declares a customer network-isolation configuration
        #[arg(long)]
        vpc: bool,

        /// Skip the inference node
        #[arg(long)]
        skip_inference: bool,

        /// Job type (compared case-sensitively to "Automated")
        #[arg(long, default_value = "Automated")]
        job_type: String,

        /// An evaluator model is configured
        #[arg(long)]
        evaluator_model: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Export { deploy, output } => cmd_export(&deploy, &output)?,
        Commands::Validate { deploy } => cmd_validate(&deploy)?,
        Commands::Info { family, deploy } => cmd_info(&family, &deploy)?,
        Commands::Trace {
            family,
            deploy,
            vpc,
            skip_inference,
            job_type,
            evaluator_model,
        } => cmd_trace(&family, &deploy, vpc, skip_inference, &job_type, evaluator_model)?,
    }

    Ok(())
}

fn parse_stage(s: &str) -> anyhow::Result<Stage> {
    match s.to_lowercase().as_str() {
        "dev" => Ok(Stage::Dev),
        "beta" => Ok(Stage::Beta),
        "gamma" => Ok(Stage::Gamma),
        "prod" => Ok(Stage::Prod),
        other => anyhow::bail!("unknown stage '{other}' (expected dev, beta, gamma, or prod)"),
    }
}

fn parse_family(s: &str) -> anyhow::Result<PipelineFamily> {
    match s.to_lowercase().as_str() {
        "model" => Ok(PipelineFamily::ModelEvaluation),
        "rag" => Ok(PipelineFamily::RagEvaluation),
        "agent" => Ok(PipelineFamily::AgentEvaluation),
        other => anyhow::bail!("unknown family '{other}' (expected model, rag, or agent)"),
    }
}

fn deploy_context(args: &DeployArgs) -> anyhow::Result<DeployContext> {
    Ok(DeployContext {
        stage: parse_stage(&args.stage)?,
        account_id: args.account_id.clone(),
        region: args.region.clone(),
        partition: args.partition.clone(),
        routing_code: args.routing_code.clone(),
        kb_account_id: args.kb_account_id.clone(),
    })
}

fn backend_target(args: &DeployArgs) -> BackendTarget {
    BackendTarget {
        task_definition: args.task_definition.clone(),
        image_uri: args.image_uri.clone(),
        execution_role: args.execution_role.clone(),
        log_group: args.log_group.clone(),
        credential_role: args.credential_role.clone(),
        subnets: args.subnets.clone(),
        security_groups: args.security_groups.clone(),
    }
}

fn build_workflow(family: PipelineFamily, args: &DeployArgs) -> anyhow::Result<Workflow> {
    let factory = NodeFactory::new(family, deploy_context(args)?, backend_target(args));
    Ok(assemble(&factory)?)
}

fn cmd_export(args: &DeployArgs, output: &Path) -> anyhow::Result<()> {
    let registry = PipelineRegistry::build(deploy_context(args)?, backend_target(args))?;
    std::fs::create_dir_all(output)?;

    let mut written = Vec::new();
    for workflow in registry.workflows() {
        let definition = WorkflowDefinition::from_workflow(workflow, &args.task_definition);
        let path = output.join(format!("{}.json", workflow.name));
        std::fs::write(&path, serde_json::to_string_pretty(&definition)?)?;
        println!("Wrote {}", path.display());
        written.push(workflow.name.clone());
    }

    let manifest = serde_json::json!({
        "generatedAt": chrono::Utc::now().to_rfc3339(),
        "stage": args.stage,
        "workflows": written,
        "grants": registry.grants(),
    });
    let manifest_path = output.join("manifest.json");
    std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;
    println!("Wrote {}", manifest_path.display());

    Ok(())
}

fn cmd_validate(args: &DeployArgs) -> anyhow::Result<()> {
    let mut has_error = false;
    for family in PipelineFamily::ALL {
        let workflow = build_workflow(*family, args)?;
        let diagnostics = validate(&workflow);
        if diagnostics.is_empty() {
            println!("{}: valid", workflow.name);
            continue;
        }
        for diag in &diagnostics {
            let severity = match diag.severity {
                Severity::Error => {
                    has_error = true;
                    "ERROR"
                }
                Severity::Warning => "WARN",
            };
            println!("{}: [{}] {}: {}", workflow.name, severity, diag.rule, diag.message);
        }
    }

    if has_error {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_info(family: &str, args: &DeployArgs) -> anyhow::Result<()> {
    let workflow = build_workflow(parse_family(family)?, args)?;

    println!("Workflow: {}", workflow.name);
    println!("Nodes: {}", workflow.node_count());
    if let Some(entry) = workflow.node(workflow.entry()) {
        println!("Entry: {}", entry.name());
    }
    if let Some(terminal) = workflow.node(workflow.terminal()) {
        println!("Terminal: {}", terminal.name());
    }

    println!("\nTask nodes:");
    for (_, node) in workflow.all_nodes() {
        if let Some(task) = node.as_task() {
            println!(
                "  {} timeout={}s mode={:?} retry_rules={}",
                task.name,
                task.timeout.as_secs(),
                task.completion_mode,
                task.retry_rules.len()
            );
        }
    }

    println!("\nBranch nodes:");
    for (_, node) in workflow.all_nodes() {
        if let Some(branch) = node.as_branch() {
            println!("  {} reads {}", branch.name, branch.condition.input_path());
        }
    }

    Ok(())
}

fn cmd_trace(
    family: &str,
    args: &DeployArgs,
    vpc: bool,
    skip_inference: bool,
    job_type: &str,
    evaluator_model: bool,
) -> anyhow::Result<()> {
    let workflow = build_workflow(parse_family(family)?, args)?;
    let input = PipelineInput {
        has_vpc_config: vpc,
        should_skip_inference: skip_inference.then_some(true),
        has_evaluator_model_config: evaluator_model.then_some(true),
        job_type: job_type.to_string(),
    };

    println!("Workflow: {}", workflow.name);
    println!("Input: {}", serde_json::to_string(&input)?);
    println!("\nPath:");
    for id in workflow.trace(&input) {
        if let Some(node) = workflow.node(id) {
            let marker = if node.as_branch().is_some() { "?" } else { ">" };
            println!("  {marker} {}", node.name());
        }
    }

    Ok(())
}
