use clap::Parser;
use homedir::my_home;

mod ai;
mod app;
mod articles;
mod auth;
mod cli;
mod config;
mod eid;
mod storage;
#[cfg(test)]
mod tests;
mod uploads;
mod web;

use config::Config;

fn base_path(args: &cli::Args) -> String {
    if let Some(dir) = &args.data_dir {
        return dir.clone();
    }

    std::env::var("BLOGD_BASE_PATH").unwrap_or(format!(
        "{}/.local/share/blogd",
        my_home()
            .expect("couldnt find home dir")
            .expect("couldnt find home dir")
            .to_string_lossy()
    ))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = cli::Args::parse();
    let config = Config::load_with(&base_path(&args));

    match args.command {
        cli::Command::Daemon {} => {
            let app = app::App::new(config)?;
            web::start_daemon(app);
            Ok(())
        }

        cli::Command::SetPassword {} => {
            let mut config = config;

            let default_username = if config.admin.username.is_empty() {
                "admin".to_string()
            } else {
                config.admin.username.clone()
            };
            let username = inquire::Text::new("Admin username:")
                .with_default(&default_username)
                .prompt()?;
            let password = inquire::Password::new("Admin password:").prompt()?;

            config.admin.username = username;
            config.admin.password_sha256 = auth::password_digest(&password);
            config.save();

            println!("admin credentials updated");
            Ok(())
        }

        cli::Command::Config {} => {
            println!("{}", serde_yml::to_string(&config)?);
            Ok(())
        }
    }
}
