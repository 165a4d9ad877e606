use clap::Parser;

/// Run one SQL statement against the account configured in the environment.
///
/// Connection settings come from `SNOWFLAKE_*` variables (a `.env` file in the
/// working directory is loaded first).
#[derive(Parser, Debug)]
#[command(name = "flakesql", about = "Run SQL statements over the REST API")]
pub struct CliArgs {
    /// SQL statement to execute
    pub statement: String,

    /// Warehouse override (defaults to SNOWFLAKE_DEFAULT_WAREHOUSE)
    #[arg(long)]
    pub warehouse: Option<String>,

    /// Database override
    #[arg(long)]
    pub database: Option<String>,

    /// Schema override
    #[arg(long)]
    pub schema: Option<String>,

    /// Role override
    #[arg(long)]
    pub role: Option<String>,

    /// Number of statements in the text (counted from `;` when omitted)
    #[arg(long)]
    pub statement_count: Option<usize>,

    /// Server-side execution timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Submit asynchronously and poll for completion
    #[arg(long = "async")]
    pub asynchronous: bool,

    /// Print rows as they arrive instead of loading the whole result
    #[arg(long)]
    pub streaming: bool,

    /// Print one JSON object per row instead of a table
    #[arg(long)]
    pub json: bool,
}
