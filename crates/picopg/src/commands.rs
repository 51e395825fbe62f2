//! Subcommand handlers.

use std::process::ExitCode;

use picopg_core::{ConnectionProfile, PicoError, PicoState, SslMode};

use crate::cli::{AddArgs, Command, ConnectionsCommand, OutputFormat, UpdateArgs};
use crate::{render, shell};

pub fn run(state: &PicoState, command: Command) -> Result<ExitCode, PicoError> {
    match command {
        Command::Connections(command) => connections(state, command),
        Command::Query { profile, sql, file, format } => {
            let sql = match (sql, file) {
                (Some(sql), _) => sql,
                (None, Some(path)) => std::fs::read_to_string(&path).map_err(|e| {
                    PicoError::validation(format!("Cannot read {}: {e}", path.display()))
                })?,
                (None, None) => return Err(PicoError::validation("No SQL given")),
            };
            let result = state.run_query(&profile, &sql)?;
            match format {
                OutputFormat::Table => println!("{}", render::query_result(&result)),
                OutputFormat::Json => println!("{}", render::json(&result)?),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Tables { profile, format } => {
            let tables = state.fetch_tables(&profile)?;
            match format {
                OutputFormat::Table => println!("{}", render::tables(&tables)),
                OutputFormat::Json => println!("{}", render::json(&tables)?),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Columns { profile, table, schema, format } => {
            let columns = state.fetch_columns(&profile, &table, Some(&schema))?;
            if columns.is_empty() {
                return Err(PicoError::validation(format!("Table {schema}.{table} not found")));
            }
            match format {
                OutputFormat::Table => println!("{}", render::columns(&columns)),
                OutputFormat::Json => println!("{}", render::json(&columns)?),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Preview { profile, table, schema, limit, format } => {
            let result = state.preview_table(&profile, &table, Some(&schema), Some(limit))?;
            match format {
                OutputFormat::Table => println!("{}", render::query_result(&result)),
                OutputFormat::Json => println!("{}", render::json(&result)?),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Databases { profile, format } => {
            let databases = state.fetch_databases(&profile)?;
            match format {
                OutputFormat::Table => println!("{}", render::databases(&databases)),
                OutputFormat::Json => println!("{}", render::json(&databases)?),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Shell { profile } => {
            shell::run(state, &profile)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn connections(state: &PicoState, command: ConnectionsCommand) -> Result<ExitCode, PicoError> {
    match command {
        ConnectionsCommand::List { format } => {
            let profiles = state.profiles()?;
            match format {
                OutputFormat::Table => println!("{}", render::profiles(&profiles)),
                OutputFormat::Json => println!("{}", render::profiles_json(&profiles)?),
            }
        }
        ConnectionsCommand::Add(args) => {
            let verify = !args.no_verify;
            let profile = state.create_profile(profile_from_args(args)?, verify)?;
            println!("Saved connection \"{}\" ({})", profile.name, profile.id);
        }
        ConnectionsCommand::Update(args) => {
            let profile = apply_update(state.profile(&args.profile)?, args);
            let profile = state.update_profile(profile)?;
            println!("Updated connection \"{}\"", profile.name);
        }
        ConnectionsCommand::Remove { profile } => {
            let removed = state.delete_profile(&profile)?;
            println!("Removed connection \"{}\"", removed.name);
        }
        ConnectionsCommand::Test { profile } => {
            let result = state.test_connection(&profile)?;
            if !result.success {
                eprintln!(
                    "Connection failed after {} ms: {}",
                    result.latency_ms,
                    result.error.unwrap_or_default()
                );
                return Ok(ExitCode::FAILURE);
            }
            println!("Connected in {} ms", result.latency_ms);
            if let Some(version) = result.server_version {
                println!("{version}");
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn profile_from_args(args: AddArgs) -> Result<ConnectionProfile, PicoError> {
    let mut profile = match args.url {
        Some(url) => ConnectionProfile::from_url(args.name, &url)?,
        None => {
            let mut builder = ConnectionProfile::builder().name(args.name);
            if let Some(host) = args.host {
                builder = builder.host(host);
            }
            if let Some(database) = args.database {
                builder = builder.database(database);
            }
            if let Some(username) = args.username {
                builder = builder.username(username);
            }
            if let Some(port) = args.port {
                builder = builder.port(port);
            }
            builder.build()?
        }
    };
    if let Some(password) = args.password {
        profile.password = password;
    }
    if let Some(ssl_mode) = args.ssl_mode {
        profile.ssl_mode = Some(SslMode::from(ssl_mode));
    }
    Ok(profile)
}

fn apply_update(mut profile: ConnectionProfile, args: UpdateArgs) -> ConnectionProfile {
    if let Some(name) = args.name {
        profile.name = name;
    }
    if let Some(host) = args.host {
        profile.host = host;
    }
    if let Some(port) = args.port {
        profile.port = port;
    }
    if let Some(database) = args.database {
        profile.database = database;
    }
    if let Some(username) = args.username {
        profile.username = username;
    }
    if let Some(password) = args.password {
        profile.password = password;
    }
    if let Some(ssl_mode) = args.ssl_mode {
        profile.ssl_mode = Some(ssl_mode.into());
    }
    profile
}
