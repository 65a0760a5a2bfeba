use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Data directory. Defaults to BLOGD_BASE_PATH or ~/.local/share/blogd
    #[clap(long)]
    pub data_dir: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start blogd as a service.
    Daemon {},

    /// Set the admin username and password used by the web API.
    SetPassword {},

    /// Print the effective configuration.
    Config {},
}
