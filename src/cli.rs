use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "openai-proxy",
    version,
    about = "OpenAI-compatible HTTP proxy with API key rotation",
    long_about = "An OpenAI-compatible HTTP proxy that rotates requests over a pool of upstream API keys, retrying on rate limits, rejected keys and transient failures."
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Server port (overrides config and PORT)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Enable JSON logging
    #[arg(long, env = "JSON_LOGS")]
    pub json_logs: bool,
}
