// ABOUTME: Entry point for the legate CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;

use clap::Parser;
use cli::{Cli, Commands, ConnectArgs, Format};
use legate::connect::{ConnectParams, ConnectionPool, Session};
use legate::error::{Error, Result};
use legate::exec::{Elevation, ExecRequest, Executor};
use legate::transfer;
use legate::transport::RusshTransport;
use legate::trust::TrustStore;
use legate::types::Target;
use serde::Serialize;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run {
            connect,
            command,
            shell,
            sudo,
            sudo_user,
            ask_sudo_pass,
            format,
        } => {
            run_command(
                connect,
                command,
                shell,
                sudo,
                sudo_user,
                ask_sudo_pass,
                format,
            )
            .await
        }
        Commands::Put {
            connect,
            local,
            remote,
        } => put_file(connect, local, remote).await,
        Commands::Get {
            connect,
            remote,
            local,
        } => get_file(connect, remote, local).await,
    }
}

/// Connect to the target described by the shared CLI arguments.
async fn establish(args: &ConnectArgs) -> Result<(ConnectionPool, Arc<Session>)> {
    let target = Target::parse(&args.target).map_err(|e| Error::Usage {
        message: format!("invalid target {:?}: {e}", args.target),
    })?;
    let user = target
        .user
        .clone()
        .unwrap_or_else(|| env::var("USER").unwrap_or_else(|_| "root".to_string()));

    let trust_path = match &args.trust_file {
        Some(path) => path.clone(),
        None => TrustStore::default_path()?,
    };
    let pool = ConnectionPool::new(
        Arc::new(RusshTransport::new()),
        Arc::new(TrustStore::new(trust_path)),
    );

    let mut params = ConnectParams::new(target.host.clone(), user.clone())
        .connect_timeout(Duration::from_secs(args.timeout))
        .host_key_checking(!args.no_host_key_checking);
    if let Some(key_file) = &args.key_file {
        params = params.key_file(key_file.clone());
    }
    if args.ask_pass {
        let password = rpassword::prompt_password(format!(
            "SSH password for {user}@{}: ",
            target.host
        ))
        .map_err(|e| Error::Usage {
            message: format!("failed to read password: {e}"),
        })?;
        params = params.password(password);
    }

    let session = pool.acquire(params).await?;
    Ok((pool, session))
}

#[derive(Serialize)]
struct RunReport<'a> {
    exit_status: u32,
    stdout: &'a str,
    stderr: &'a str,
}

async fn run_command(
    connect: ConnectArgs,
    command: String,
    shell: Option<String>,
    sudo: bool,
    sudo_user: String,
    ask_sudo_pass: bool,
    format: Format,
) -> Result<i32> {
    let (pool, session) = establish(&connect).await?;

    let mut request = ExecRequest::new(command);
    if let Some(shell) = shell {
        request = request.shell(shell);
    }
    if sudo {
        let mut elevation = Elevation::to_user(sudo_user);
        if ask_sudo_pass {
            let secret =
                rpassword::prompt_password("sudo password: ").map_err(|e| Error::Usage {
                    message: format!("failed to read password: {e}"),
                })?;
            elevation = elevation.secret(secret);
        }
        request = request.elevation(elevation);
    }

    let result = Executor::new().run(&session, &request).await;
    pool.release_all().await;
    let output = result?;

    match format {
        Format::Text => {
            print!("{}", output.stdout_lossy());
            eprint!("{}", output.stderr_lossy());
        }
        Format::Json => {
            let stdout = output.stdout_lossy();
            let stderr = output.stderr_lossy();
            let report = RunReport {
                exit_status: output.exit_status,
                stdout: &stdout,
                stderr: &stderr,
            };
            let rendered =
                serde_json::to_string(&report).expect("report serialization cannot fail");
            println!("{rendered}");
        }
    }

    Ok(output.exit_status as i32)
}

async fn put_file(connect: ConnectArgs, local: PathBuf, remote: String) -> Result<i32> {
    let (pool, session) = establish(&connect).await?;

    let result = transfer::put(&session, &local, &remote).await;
    pool.release_all().await;
    result?;

    println!(
        "Uploaded {} to {}:{}",
        local.display(),
        session.target().hostname,
        remote
    );
    Ok(0)
}

async fn get_file(connect: ConnectArgs, remote: String, local: PathBuf) -> Result<i32> {
    let (pool, session) = establish(&connect).await?;

    let result = transfer::get(&session, &remote, &local).await;
    pool.release_all().await;
    result?;

    println!(
        "Downloaded {}:{} to {}",
        session.target().hostname,
        remote,
        local.display()
    );
    Ok(0)
}
