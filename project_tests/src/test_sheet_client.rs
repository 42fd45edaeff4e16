use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use clap::Parser;
use futures_util::StreamExt;
use lib_sheetcast::{Change, Snapshot, WireMessage};
use std::sync::{Arc, Mutex};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Mirrors a server_sheet stream and reports what it sees", long_about = None)]
struct Args {
    /// WebSocket endpoint of the server
    #[clap(short, long, default_value = "ws://127.0.0.1:8080/ws")]
    url: String,

    /// Report interval in seconds
    #[clap(short, long, default_value_t = 60)]
    report_interval_seconds: u64,

    /// Print every frame as it arrives
    #[clap(short, long)]
    verbose: bool,
}

#[derive(Default)]
struct Stats {
    mirror: Snapshot,
    full_frames: usize,
    update_frames: usize,
    changed_items: usize,
    removed_items: usize,
    last_frame: Option<DateTime<Local>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let stats = Arc::new(Mutex::new(Stats::default()));

    // Clone for the reporter task
    let stats_reporter = Arc::clone(&stats);
    let report_interval = std::time::Duration::from_secs(args.report_interval_seconds.max(1));
    tokio::spawn(async move {
        loop {
            sleep(report_interval).await;
            let data = match stats_reporter.lock() {
                Ok(data) => data,
                Err(poisoned) => poisoned.into_inner(),
            };
            println!("\n----- Summary -----");
            println!("Items mirrored: {}", data.mirror.len());
            println!("Full frames: {}, update frames: {}", data.full_frames, data.update_frames);
            println!("Changed: {}, removed: {}", data.changed_items, data.removed_items);
            println!(
                "Last frame: {}",
                data.last_frame
                    .map(|t| t.format("%H:%M:%S").to_string())
                    .unwrap_or_else(|| "none".to_string())
            );
            println!("-------------------\n");
        }
    });

    println!("Connecting to {}...", args.url);
    let (ws_stream, _) = connect_async(args.url.as_str())
        .await
        .with_context(|| format!("Failed to connect to {}", args.url))?;
    let (_write, mut read) = ws_stream.split();
    println!("Connected. Press Ctrl+C to stop.");

    let mut first = true;
    while let Some(msg) = read.next().await {
        let text = match msg.context("WebSocket error")? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let message: WireMessage =
            serde_json::from_str(&text).with_context(|| format!("Unexpected frame: {}", text.as_str()))?;

        let mut data = match stats.lock() {
            Ok(data) => data,
            Err(poisoned) => poisoned.into_inner(),
        };
        data.last_frame = Some(Local::now());
        match message {
            WireMessage::Full(snapshot) => {
                if !first {
                    bail!("Received a second full snapshot on the same connection");
                }
                println!("Full snapshot with {} items", snapshot.len());
                data.full_frames += 1;
                data.mirror = snapshot;
            }
            WireMessage::Update(changes) => {
                if first {
                    bail!("Received an update before the full snapshot");
                }
                for (name, change) in changes.iter() {
                    match change {
                        Change::Changed(_) => data.changed_items += 1,
                        Change::Removed => data.removed_items += 1,
                    }
                    if args.verbose {
                        println!("{} -> {:?}", name, change);
                    }
                }
                data.update_frames += 1;
                let next = changes.apply_to(&data.mirror);
                data.mirror = next;
            }
        }
        first = false;
    }

    println!("Server closed the connection.");
    Ok(())
}
