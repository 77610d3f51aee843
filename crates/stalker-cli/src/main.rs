use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use stalker_core::control::{
    decode_frame, default_socket_path, encode_frame, ControlRequest, ControlResponse,
    ProfileEntry, DEFAULT_MAX_FRAME_BYTES,
};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

#[derive(Parser, Debug)]
#[command(name = "stalker", about = "Operator console for the stalkerd watch daemon")]
struct Cli {
    /// Control socket of the running daemon
    #[arg(long)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Command {
    /// Start tracking a profile (SteamID64 or community link)
    Add {
        query: String,
        /// Free-text note stored with the record
        #[arg(long)]
        notes: Option<String>,
    },
    /// Stop tracking a profile
    Remove { id: String },
    /// Show every tracked profile
    List,
    /// Re-fetch one profile right away and show its record
    Check { query: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let socket = cli.socket.unwrap_or_else(default_socket_path);

    let request = match &cli.command {
        Command::Add { query, notes } => ControlRequest::Add {
            query: query.clone(),
            notes: notes.clone(),
        },
        Command::Remove { id } => ControlRequest::Remove { id: id.clone() },
        Command::List => ControlRequest::List,
        Command::Check { query } => ControlRequest::Check {
            query: query.clone(),
        },
    };

    let response = exchange(&socket, &request).await?;
    print_response(response)
}

async fn exchange(socket: &Path, request: &ControlRequest) -> Result<ControlResponse> {
    let stream = UnixStream::connect(socket).await.with_context(|| {
        format!(
            "could not connect to {} (is stalkerd running?)",
            socket.display()
        )
    })?;
    let (read_half, mut write_half) = stream.into_split();

    let frame = encode_frame(request, DEFAULT_MAX_FRAME_BYTES)?;
    write_half.write_all(&frame).await?;

    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    let read = reader.read_line(&mut line).await?;
    if read == 0 {
        bail!("daemon closed the connection without answering");
    }
    Ok(decode_frame(line.as_bytes(), DEFAULT_MAX_FRAME_BYTES)?)
}

fn print_response(response: ControlResponse) -> Result<()> {
    match response {
        ControlResponse::Added { id, name } => println!("Tracking {id} ({name})."),
        ControlResponse::AlreadyTracked { id } => println!("{id} is already tracked."),
        ControlResponse::Removed { id } => println!("Removed {id}."),
        ControlResponse::NotTracked { id } => println!("{id} is not tracked."),
        ControlResponse::Listing { profiles } => {
            if profiles.is_empty() {
                println!("No profiles tracked.");
            }
            for entry in &profiles {
                print_entry(entry);
            }
        }
        ControlResponse::Checked { profile } => print_entry(&profile),
        ControlResponse::Error { message, .. } => bail!("{message}"),
    }
    Ok(())
}

fn print_entry(entry: &ProfileEntry) {
    let current = entry.profile.current_name().unwrap_or("?");
    match entry.profile.original_name() {
        Some(original) if entry.profile.has_prior_changes() => {
            println!("{}  {current} (og: {original})", entry.id)
        }
        _ => println!("{}  {current}", entry.id),
    }

    let data = &entry.profile.data;
    let mut details = Vec::new();
    if let Some(level) = data.steam_level {
        details.push(format!("level {level}"));
    }
    if let Some(hours) = data.rust_hours {
        details.push(format!("rust {hours:.1}h"));
    }
    if let Some(friends) = data.friends_count {
        details.push(format!("friends {friends}"));
    }
    if let Some(vac) = data.vac_bans {
        details.push(format!("vac bans {vac}"));
    }
    if let Some(game) = data.game_bans {
        details.push(format!("game bans {game}"));
    }
    if let Some(status) = data.profile_status {
        details.push(status.to_string());
    }
    if !details.is_empty() {
        println!("    {}", details.join(" | "));
    }
    if let Some(notes) = &entry.profile.notes {
        println!("    notes: {notes}");
    }
}
