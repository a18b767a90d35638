//! `zonesigner`: control client for `zonesignerd`'s command socket
//! (SPEC_FULL §6 ADDED daemon surface detail). Relays one command over a
//! length-prefixed `UnixStream` and prints the response.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

#[derive(Parser, Debug)]
#[command(name = "zonesigner", about = "Control client for zonesignerd")]
struct Args {
    /// Path to the daemon's control socket.
    #[arg(short, long, default_value = "/run/zonesignerd.sock")]
    socket: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Start,
    Stop,
    Reload,
    Sign {
        zone: String,
    },
    Queue,
    Shell {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

impl Command {
    fn to_wire(&self) -> String {
        match self {
            Command::Start => "start".to_string(),
            Command::Stop => "stop".to_string(),
            Command::Reload => "reload".to_string(),
            Command::Sign { zone } => format!("sign {zone}"),
            Command::Queue => "queue".to_string(),
            Command::Shell { args } => format!("shell {}", args.join(" ")),
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(&args).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(args: &Args) -> std::io::Result<()> {
    let mut stream = UnixStream::connect(&args.socket).await?;
    let command = args.command.to_wire();
    write_framed(&mut stream, &command).await?;
    let response = read_framed(&mut stream).await?;
    println!("{response}");
    Ok(())
}

async fn write_framed(stream: &mut UnixStream, text: &str) -> std::io::Result<()> {
    let bytes = text.as_bytes();
    stream.write_all(&(bytes.len() as u32).to_be_bytes()).await?;
    stream.write_all(bytes).await?;
    stream.flush().await
}

async fn read_framed(stream: &mut UnixStream) -> std::io::Result<String> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
