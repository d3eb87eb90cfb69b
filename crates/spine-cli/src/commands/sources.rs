//! `spine sources <verb>` — registered input sources and fetch history
//! (spec.md §6 `/sources`).

use clap::Subcommand;
use serde::{Deserialize, Serialize};

use crate::client::{Client, ClientError};
use crate::error::{CliError, CliResult};
use crate::output::{print_field, print_table_header, print_table_row, OutputFormat};

#[derive(Subcommand)]
pub enum SourcesCommand {
    /// List registered sources
    List {
        #[arg(long)]
        json: bool,
    },
    /// Get a source
    Get {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// List a source's fetch history
    Fetches {
        id: String,
        #[arg(long, default_value_t = 50)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
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
struct Source {
    id: String,
    name: String,
    source_type: String,
    enabled: bool,
}

#[derive(Debug, Deserialize, Serialize)]
struct SourceFetch {
    id: String,
    fetched_at: String,
    row_count: i64,
    status: String,
}

pub async fn run(command: SourcesCommand, client: &Client, _quiet: bool) -> CliResult<()> {
    match command {
        SourcesCommand::List { json } => list(client, json).await,
        SourcesCommand::Get { id, json } => get(client, id, json).await,
        SourcesCommand::Fetches { id, limit, offset, json } => fetches(client, id, limit, offset, json).await,
    }
}

async fn list(client: &Client, json: bool) -> CliResult<()> {
    let resp: DataResponse<Vec<Source>> = client.get("/sources").await?;
    if json {
        OutputFormat::Json.print_value(&resp);
        return Ok(());
    }
    if resp.data.is_empty() {
        println!("No sources registered");
        return Ok(());
    }
    print_table_header(&[("ID", 36), ("NAME", 20), ("TYPE", 12), ("ENABLED", 8)]);
    for source in &resp.data {
        print_table_row(&[(&source.id, 36), (&source.name, 20), (&source.source_type, 12), (&source.enabled.to_string(), 8)]);
    }
    Ok(())
}

async fn get(client: &Client, id: String, json: bool) -> CliResult<()> {
    let resp: DataResponse<Source> = client.get(&format!("/sources/{id}")).await.map_err(not_found(&id))?;
    if json {
        OutputFormat::Json.print_value(&resp);
        return Ok(());
    }
    print_field("ID", &resp.data.id);
    print_field("Name", &resp.data.name);
    print_field("Type", &resp.data.source_type);
    print_field("Enabled", &resp.data.enabled.to_string());
    Ok(())
}

async fn fetches(client: &Client, id: String, limit: i64, offset: i64, json: bool) -> CliResult<()> {
    let resp: ListResponse<SourceFetch> = client.get(&format!("/sources/{id}/fetches?limit={limit}&offset={offset}")).await?;
    if json {
        OutputFormat::Json.print_value(&resp);
        return Ok(());
    }
    if resp.data.is_empty() {
        println!("No fetches recorded");
        return Ok(());
    }
    print_table_header(&[("FETCHED_AT", 26), ("ROWS", 10), ("STATUS", 10)]);
    for fetch in &resp.data {
        print_table_row(&[(&fetch.fetched_at, 26), (&fetch.row_count.to_string(), 10), (&fetch.status, 10)]);
    }
    Ok(())
}

fn not_found(id: &str) -> impl Fn(ClientError) -> CliError + '_ {
    move |e| match e {
        ClientError::NotFound => CliError::user(format!("source not found: {id}")),
        other => other.into(),
    }
}
