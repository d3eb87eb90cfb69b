//! `spine alerts <verb>` — alert channels and delivered alerts
//! (spec.md §6 `/alerts`).

use clap::Subcommand;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::Client;
use crate::error::CliResult;
use crate::output::{print_field, print_table_header, print_table_row, OutputFormat};

#[derive(Subcommand)]
pub enum AlertsCommand {
    /// List raised alerts
    List {
        #[arg(long)]
        domain: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
        #[arg(long)]
        json: bool,
    },
    /// List alert channels
    Channels {
        #[arg(long)]
        json: bool,
    },
    /// Register an alert channel
    ChannelCreate {
        name: String,
        #[arg(long = "type")]
        channel_type: String,
        #[arg(long, default_value = "{}")]
        config: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Deserialize, Serialize)]
struct DataResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize, Serialize)]
struct ListResponse<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Alert {
    id: String,
    domain: String,
    severity: String,
    message: String,
    created_at: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct AlertChannel {
    id: String,
    name: String,
    channel_type: String,
    enabled: bool,
}

#[derive(Debug, Serialize)]
struct CreateChannelRequest {
    id: String,
    name: String,
    channel_type: String,
    config: Value,
    enabled: bool,
    created_at: chrono::DateTime<chrono::Utc>,
}

pub async fn run(command: AlertsCommand, client: &Client, _quiet: bool) -> CliResult<()> {
    match command {
        AlertsCommand::List { domain, limit, offset, json } => list(client, domain, limit, offset, json).await,
        AlertsCommand::Channels { json } => channels(client, json).await,
        AlertsCommand::ChannelCreate { name, channel_type, config, json } => channel_create(client, name, channel_type, config, json).await,
    }
}

async fn list(client: &Client, domain: Option<String>, limit: i64, offset: i64, json: bool) -> CliResult<()> {
    let mut query = format!("limit={limit}&offset={offset}");
    if let Some(d) = &domain {
        query.push_str(&format!("&domain={d}"));
    }
    let resp: ListResponse<Alert> = client.get(&format!("/alerts?{query}")).await?;
    if json {
        OutputFormat::Json.print_value(&resp);
        return Ok(());
    }
    if resp.data.is_empty() {
        println!("No alerts found");
        return Ok(());
    }
    print_table_header(&[("ID", 36), ("DOMAIN", 16), ("SEVERITY", 10), ("MESSAGE", 40)]);
    for alert in &resp.data {
        print_table_row(&[(&alert.id, 36), (&alert.domain, 16), (&alert.severity, 10), (&alert.message, 40)]);
    }
    Ok(())
}

async fn channels(client: &Client, json: bool) -> CliResult<()> {
    let resp: DataResponse<Vec<AlertChannel>> = client.get("/alerts/channels").await?;
    if json {
        OutputFormat::Json.print_value(&resp);
        return Ok(());
    }
    if resp.data.is_empty() {
        println!("No channels configured");
        return Ok(());
    }
    print_table_header(&[("ID", 36), ("NAME", 20), ("TYPE", 12), ("ENABLED", 8)]);
    for channel in &resp.data {
        print_table_row(&[(&channel.id, 36), (&channel.name, 20), (&channel.channel_type, 12), (&channel.enabled.to_string(), 8)]);
    }
    Ok(())
}

async fn channel_create(client: &Client, name: String, channel_type: String, config: String, json: bool) -> CliResult<()> {
    let config: Value = serde_json::from_str(&config).map_err(|e| crate::error::CliError::user(format!("invalid --config JSON: {e}")))?;
    let req = CreateChannelRequest {
        id: uuid::Uuid::now_v7().to_string(),
        name,
        channel_type,
        config,
        enabled: true,
        created_at: chrono::Utc::now(),
    };
    let resp: DataResponse<AlertChannel> = client.post("/alerts/channels", &req).await?;
    if json {
        OutputFormat::Json.print_value(&resp);
    } else {
        print_field("ID", &resp.data.id);
        print_field("Name", &resp.data.name);
    }
    Ok(())
}
