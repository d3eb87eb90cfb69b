//! `spine schedules <verb>` — periodic triggers (spec.md §6 `/schedules`).

use clap::Subcommand;
use serde::{Deserialize, Serialize};

use crate::client::{Client, ClientError};
use crate::error::{CliError, CliResult};
use crate::output::{print_field, print_table_header, print_table_row, OutputFormat};

#[derive(Subcommand)]
pub enum SchedulesCommand {
    /// Create a schedule
    Create {
        name: String,
        /// "operation" or "workflow"
        #[arg(long)]
        target_type: String,
        #[arg(long)]
        target_name: String,
        #[arg(long)]
        cron: Option<String>,
        #[arg(long)]
        interval_seconds: Option<i64>,
        #[arg(long, default_value = "UTC")]
        timezone: String,
        #[arg(long, default_value_t = 1)]
        max_instances: i32,
        #[arg(long)]
        json: bool,
    },
    /// List enabled schedules
    List {
        #[arg(long)]
        json: bool,
    },
    /// Get a schedule
    Get {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Recompute a schedule's next occurrence
    Touch { id: String },
    /// Delete a schedule
    Delete {
        id: String,
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Deserialize, Serialize)]
struct DataResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize, Serialize)]
struct Schedule {
    id: String,
    name: String,
    target_type: String,
    target_name: String,
    cron_expression: Option<String>,
    interval_seconds: Option<i64>,
    enabled: bool,
    next_run_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateScheduleRequest {
    name: String,
    target_type: String,
    target_name: String,
    cron_expression: Option<String>,
    interval_seconds: Option<i64>,
    timezone: String,
    max_instances: i32,
}

pub async fn run(command: SchedulesCommand, client: &Client, quiet: bool) -> CliResult<()> {
    match command {
        SchedulesCommand::Create { name, target_type, target_name, cron, interval_seconds, timezone, max_instances, json } => {
            create(client, name, target_type, target_name, cron, interval_seconds, timezone, max_instances, json).await
        }
        SchedulesCommand::List { json } => list(client, json).await,
        SchedulesCommand::Get { id, json } => get(client, id, json).await,
        SchedulesCommand::Touch { id } => touch(client, id, quiet).await,
        SchedulesCommand::Delete { id, force } => delete(client, id, force, quiet).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn create(
    client: &Client,
    name: String,
    target_type: String,
    target_name: String,
    cron: Option<String>,
    interval_seconds: Option<i64>,
    timezone: String,
    max_instances: i32,
    json: bool,
) -> CliResult<()> {
    if cron.is_none() && interval_seconds.is_none() {
        return Err(CliError::user("schedule must set --cron or --interval-seconds"));
    }
    let req = CreateScheduleRequest {
        name,
        target_type,
        target_name,
        cron_expression: cron,
        interval_seconds,
        timezone,
        max_instances,
    };
    let resp: DataResponse<Schedule> = client.post("/schedules", &req).await?;
    if json {
        OutputFormat::Json.print_value(&resp);
    } else {
        println!("Created schedule: {}", resp.data.id);
    }
    Ok(())
}

async fn list(client: &Client, json: bool) -> CliResult<()> {
    let resp: DataResponse<Vec<Schedule>> = client.get("/schedules").await?;
    if json {
        OutputFormat::Json.print_value(&resp);
        return Ok(());
    }
    if resp.data.is_empty() {
        println!("No schedules found");
        return Ok(());
    }
    print_table_header(&[("ID", 36), ("NAME", 20), ("TARGET", 24), ("NEXT_RUN", 26)]);
    for schedule in &resp.data {
        print_table_row(&[
            (&schedule.id, 36),
            (&schedule.name, 20),
            (&schedule.target_name, 24),
            (schedule.next_run_at.as_deref().unwrap_or("-"), 26),
        ]);
    }
    Ok(())
}

async fn get(client: &Client, id: String, json: bool) -> CliResult<()> {
    let resp: DataResponse<Schedule> = client.get(&format!("/schedules/{id}")).await.map_err(not_found(&id))?;
    if json {
        OutputFormat::Json.print_value(&resp);
        return Ok(());
    }
    let schedule = resp.data;
    print_field("ID", &schedule.id);
    print_field("Name", &schedule.name);
    print_field("Target type", &schedule.target_type);
    print_field("Target", &schedule.target_name);
    if let Some(cron) = &schedule.cron_expression {
        print_field("Cron", cron);
    }
    if let Some(interval) = schedule.interval_seconds {
        print_field("Interval (s)", &interval.to_string());
    }
    print_field("Enabled", &schedule.enabled.to_string());
    print_field("Next run", schedule.next_run_at.as_deref().unwrap_or("-"));
    Ok(())
}

async fn touch(client: &Client, id: String, quiet: bool) -> CliResult<()> {
    let resp: DataResponse<Schedule> = client.put_empty(&format!("/schedules/{id}")).await.map_err(not_found(&id))?;
    if !quiet {
        println!("Next run: {}", resp.data.next_run_at.as_deref().unwrap_or("-"));
    }
    Ok(())
}

async fn delete(client: &Client, id: String, force: bool, quiet: bool) -> CliResult<()> {
    if !force {
        return Err(CliError::user("pass --force to confirm deletion"));
    }
    client.delete(&format!("/schedules/{id}")).await.map_err(not_found(&id))?;
    if !quiet {
        println!("Deleted schedule: {id}");
    }
    Ok(())
}

fn not_found(id: &str) -> impl Fn(ClientError) -> CliError + '_ {
    move |e| match e {
        ClientError::NotFound => CliError::user(format!("schedule not found: {id}")),
        other => other.into(),
    }
}
