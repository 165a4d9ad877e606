mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use flakesql_client::{load_dotenv, Client, ClientConfig, QueryOptions, Row};

use crate::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    let config = ClientConfig::from_env().context("failed to load configuration")?;
    config.log_summary();
    let client = Client::new(config).context("failed to create client")?;

    let options = query_options(&args);
    if args.streaming {
        let mut stream = client
            .query_streaming(&args.statement, options)
            .await
            .context("query failed")?;

        let names: Vec<String> = stream.columns().iter().map(|c| c.name.clone()).collect();
        if !args.json {
            println!("{}", names.join("\t"));
        }
        let mut rows = 0usize;
        while let Some(row) = stream.next().await {
            let row = row.context("failed reading streamed row")?;
            print_row(&row, args.json)?;
            rows += 1;
        }
        info!(rows, "Streaming finished");
    } else {
        let result = client
            .query(&args.statement, options)
            .await
            .context("query failed")?;

        if args.json {
            for row in &result {
                print_row(&row, true)?;
            }
        } else {
            println!("{result}");
        }
    }

    Ok(())
}

fn query_options(args: &CliArgs) -> QueryOptions {
    let mut options = QueryOptions::new().asynchronous(args.asynchronous);
    options.warehouse = args.warehouse.clone();
    options.database = args.database.clone();
    options.schema = args.schema.clone();
    options.role = args.role.clone();
    options.statement_count = args.statement_count;
    options.timeout = args.timeout;
    options
}

fn print_row(row: &Row<'_>, json: bool) -> Result<()> {
    if json {
        let map = row.to_map().context("failed decoding row")?;
        println!("{}", serde_json::to_string(&map)?);
    } else {
        let cells = (0..row.len())
            .map(|i| row.get(i).map(|v| v.to_string()))
            .collect::<flakesql_client::Result<Vec<_>>>()
            .context("failed decoding row")?;
        println!("{}", cells.join("\t"));
    }
    Ok(())
}
