//! `spine runs <verb>` — execution ledger (spec.md §6 `/runs`).

use clap::Subcommand;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::Client;
use crate::error::{CliError, CliResult};
use crate::output::{print_field, print_table_header, print_table_row, OutputFormat};

#[derive(Subcommand)]
pub enum RunsCommand {
    /// Submit an operation or workflow step for execution
    Submit {
        /// Operation/workflow name to run
        name: String,
        /// JSON params (default `{}`)
        #[arg(long, default_value = "{}")]
        params: String,
        /// Idempotency key
        #[arg(long)]
        idempotency_key: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List executions
    List {
        #[arg(long)]
        workflow: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        lane: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
        #[arg(long)]
        json: bool,
    },
    /// Get a single execution
    Get {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// List an execution's event log
    Events {
        id: String,
        #[arg(long, default_value_t = 50)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
        #[arg(long)]
        json: bool,
    },
    /// Cancel a non-terminal execution
    Cancel { id: String },
    /// Retry a FAILED execution under a new run
    Retry { id: String },
    /// Bulk-reset FAILED work items back to PENDING
    RetryFailed {
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        workflow: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Serialize)]
struct SubmitRunRequest {
    kind: String,
    name: String,
    params: Value,
    idempotency_key: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
struct SubmitRunResponse {
    run_id: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct Execution {
    id: String,
    workflow: String,
    status: String,
    lane: String,
    trigger_source: String,
    retry_count: i32,
    error: Option<String>,
    created_at: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct ExecutionEvent {
    id: String,
    execution_id: String,
    event_type: String,
    detail: Value,
    created_at: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct ListResponse<T> {
    data: Vec<T>,
    page: Page,
}

#[derive(Debug, Deserialize, Serialize)]
struct Page {
    total: i64,
    limit: i64,
    offset: i64,
    has_more: bool,
}

#[derive(Debug, Deserialize, Serialize)]
struct DataResponse<T> {
    data: T,
}

#[derive(Debug, Serialize)]
struct RetryFailedRequest {
    domain: Option<String>,
    workflow: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
struct RetryFailedResponse {
    reset_count: i64,
}

pub async fn run(command: RunsCommand, client: &Client, quiet: bool) -> CliResult<()> {
    match command {
        RunsCommand::Submit { name, params, idempotency_key, json } => submit(client, name, params, idempotency_key, json).await,
        RunsCommand::List { workflow, status, lane, limit, offset, json } => list(client, workflow, status, lane, limit, offset, json).await,
        RunsCommand::Get { id, json } => get(client, id, json).await,
        RunsCommand::Events { id, limit, offset, json } => events(client, id, limit, offset, json).await,
        RunsCommand::Cancel { id } => cancel(client, id, quiet).await,
        RunsCommand::Retry { id } => retry(client, id, quiet).await,
        RunsCommand::RetryFailed { domain, workflow, json } => retry_failed(client, domain, workflow, json).await,
    }
}

async fn submit(client: &Client, name: String, params: String, idempotency_key: Option<String>, json: bool) -> CliResult<()> {
    let params: Value = serde_json::from_str(&params).map_err(|e| CliError::user(format!("invalid --params JSON: {e}")))?;
    let req = SubmitRunRequest { kind: "operation".to_string(), name, params, idempotency_key };
    let resp: SubmitRunResponse = client.post("/runs", &req).await?;
    if json {
        OutputFormat::Json.print_value(&resp);
    } else {
        println!("Submitted run: {}", resp.run_id);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn list(client: &Client, workflow: Option<String>, status: Option<String>, lane: Option<String>, limit: i64, offset: i64, json: bool) -> CliResult<()> {
    let mut query = format!("limit={limit}&offset={offset}");
    if let Some(w) = &workflow {
        query.push_str(&format!("&workflow={w}"));
    }
    if let Some(s) = &status {
        query.push_str(&format!("&status={s}"));
    }
    if let Some(l) = &lane {
        query.push_str(&format!("&lane={l}"));
    }
    let resp: ListResponse<Execution> = client.get(&format!("/runs?{query}")).await?;
    if json {
        OutputFormat::Json.print_value(&resp);
        return Ok(());
    }
    if resp.data.is_empty() {
        println!("No runs found");
        return Ok(());
    }
    print_table_header(&[("ID", 36), ("WORKFLOW", 24), ("STATUS", 10), ("LANE", 10), ("RETRIES", 7)]);
    for run in &resp.data {
        print_table_row(&[
            (&run.id, 36),
            (&run.workflow, 24),
            (&run.status, 10),
            (&run.lane, 10),
            (&run.retry_count.to_string(), 7),
        ]);
    }
    Ok(())
}

async fn get(client: &Client, id: String, json: bool) -> CliResult<()> {
    let resp: DataResponse<Execution> = client.get(&format!("/runs/{id}")).await.map_err(not_found("execution", &id))?;
    if json {
        OutputFormat::Json.print_value(&resp);
        return Ok(());
    }
    let run = resp.data;
    print_field("ID", &run.id);
    print_field("Workflow", &run.workflow);
    print_field("Status", &run.status);
    print_field("Lane", &run.lane);
    print_field("Trigger", &run.trigger_source);
    print_field("Retries", &run.retry_count.to_string());
    if let Some(err) = &run.error {
        print_field("Error", err);
    }
    print_field("Created", &run.created_at);
    Ok(())
}

async fn events(client: &Client, id: String, limit: i64, offset: i64, json: bool) -> CliResult<()> {
    let resp: ListResponse<ExecutionEvent> = client.get(&format!("/runs/{id}/events?limit={limit}&offset={offset}")).await?;
    if json {
        OutputFormat::Json.print_value(&resp);
        return Ok(());
    }
    if resp.data.is_empty() {
        println!("No events found");
        return Ok(());
    }
    print_table_header(&[("EVENT", 24), ("CREATED", 26)]);
    for event in &resp.data {
        print_table_row(&[(&event.event_type, 24), (&event.created_at, 26)]);
    }
    Ok(())
}

async fn cancel(client: &Client, id: String, quiet: bool) -> CliResult<()> {
    let resp: DataResponse<Execution> = client.post_empty(&format!("/runs/{id}/cancel")).await.map_err(not_found("execution", &id))?;
    if !quiet {
        println!("Cancelled run: {}", resp.data.id);
    }
    Ok(())
}

async fn retry(client: &Client, id: String, quiet: bool) -> CliResult<()> {
    let resp: SubmitRunResponse = client.post_empty(&format!("/runs/{id}/retry")).await.map_err(not_found("execution", &id))?;
    if !quiet {
        println!("Retry submitted: {}", resp.run_id);
    }
    Ok(())
}

async fn retry_failed(client: &Client, domain: Option<String>, workflow: Option<String>, json: bool) -> CliResult<()> {
    let req = RetryFailedRequest { domain, workflow };
    let resp: RetryFailedResponse = client.post("/runs/retry-failed", &req).await?;
    if json {
        OutputFormat::Json.print_value(&resp);
    } else {
        println!("Reset {} work item(s) to PENDING", resp.reset_count);
    }
    Ok(())
}

fn not_found(kind: &'static str, id: &str) -> impl Fn(crate::client::ClientError) -> CliError + '_ {
    move |e| match e {
        crate::client::ClientError::NotFound => CliError::user(format!("{kind} not found: {id}")),
        other => other.into(),
    }
}
