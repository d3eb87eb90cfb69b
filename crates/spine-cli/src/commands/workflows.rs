//! `spine workflows <verb>` — registry inspection + synchronous runs
//! (spec.md §6 `/workflows`).

use clap::Subcommand;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{Client, ClientError};
use crate::error::{CliError, CliResult};
use crate::output::{print_field, print_table_header, print_table_row, OutputFormat};

#[derive(Subcommand)]
pub enum WorkflowsCommand {
    /// List registered workflow names
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show a workflow's step breakdown
    Get {
        name: String,
        #[arg(long)]
        json: bool,
    },
    /// Run a workflow synchronously
    Run {
        name: String,
        #[arg(long, default_value = "{}")]
        params: String,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Deserialize, Serialize)]
struct DataResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize, Serialize)]
struct Step {
    name: String,
    depends_on: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Workflow {
    name: String,
    steps: Vec<Step>,
}

#[derive(Debug, Serialize)]
struct RunWorkflowRequest {
    params: Value,
    dry_run: bool,
}

#[derive(Debug, Deserialize, Serialize)]
struct WorkflowResult {
    status: String,
    error_step: Option<String>,
    error: Option<String>,
}

pub async fn run(command: WorkflowsCommand, client: &Client, _quiet: bool) -> CliResult<()> {
    match command {
        WorkflowsCommand::List { json } => list(client, json).await,
        WorkflowsCommand::Get { name, json } => get(client, name, json).await,
        WorkflowsCommand::Run { name, params, dry_run, json } => run_workflow(client, name, params, dry_run, json).await,
    }
}

async fn list(client: &Client, json: bool) -> CliResult<()> {
    let resp: DataResponse<Vec<String>> = client.get("/workflows").await?;
    if json {
        OutputFormat::Json.print_value(&resp);
        return Ok(());
    }
    if resp.data.is_empty() {
        println!("No workflows registered");
        return Ok(());
    }
    for name in &resp.data {
        println!("{name}");
    }
    Ok(())
}

async fn get(client: &Client, name: String, json: bool) -> CliResult<()> {
    let resp: DataResponse<Workflow> = client
        .get(&format!("/workflows/{name}"))
        .await
        .map_err(|e| match e {
            ClientError::NotFound => CliError::user(format!("workflow not found: {name}")),
            other => other.into(),
        })?;
    if json {
        OutputFormat::Json.print_value(&resp);
        return Ok(());
    }
    print_field("Name", &resp.data.name);
    print_table_header(&[("STEP", 24), ("DEPENDS_ON", 40)]);
    for step in &resp.data.steps {
        print_table_row(&[(&step.name, 24), (&step.depends_on.join(", "), 40)]);
    }
    Ok(())
}

async fn run_workflow(client: &Client, name: String, params: String, dry_run: bool, json: bool) -> CliResult<()> {
    let params: Value = serde_json::from_str(&params).map_err(|e| CliError::user(format!("invalid --params JSON: {e}")))?;
    let req = RunWorkflowRequest { params, dry_run };
    let resp: DataResponse<WorkflowResult> = client
        .post(&format!("/workflows/{name}/run"), &req)
        .await
        .map_err(|e| match e {
            ClientError::NotFound => CliError::user(format!("workflow not found: {name}")),
            other => other.into(),
        })?;
    if json {
        OutputFormat::Json.print_value(&resp);
        return Ok(());
    }
    print_field("Status", &resp.data.status);
    if let Some(step) = &resp.data.error_step {
        print_field("Error step", step);
    }
    if let Some(err) = &resp.data.error {
        print_field("Error", err);
    }
    if resp.data.status == "FAILED" {
        return Err(CliError::user(format!("workflow '{name}' run failed")));
    }
    Ok(())
}
