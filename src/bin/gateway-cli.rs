use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use video_gateway::stream::Packet;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Test client for the video gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "ws://localhost:9999/ws")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a stream and print every packet received
    Play {
        /// Camera endpoint name
        endpoint: String,

        #[arg(long, default_value = "mjpeg")]
        format: String,

        #[arg(long, default_value = "cli")]
        stream_id: String,

        /// Archive start time (YYYYMMDDThhmmss); plays live when absent
        #[arg(long)]
        begin_time: Option<String>,

        #[arg(long)]
        archive: Option<String>,

        #[arg(long, default_value_t = 0)]
        speed: i64,

        /// Stop after this many packets
        #[arg(long)]
        count: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let (socket, _) = connect_async(cli.url.as_str()).await?;
    let (mut sink, mut inbound) = socket.split();

    match cli.command {
        Commands::Play {
            endpoint,
            format,
            stream_id,
            begin_time,
            archive,
            speed,
            count,
        } => {
            let play = json!({
                "Method": "play",
                "Endpoint": endpoint,
                "Format": format,
                "StreamId": stream_id,
                "BeginTime": begin_time.unwrap_or_default(),
                "Archive": archive.unwrap_or_default(),
                "Speed": speed,
            });
            sink.send(Message::text(play.to_string())).await?;

            let mut received = 0usize;
            while let Some(message) = inbound.next().await {
                let data = match message? {
                    Message::Binary(data) => data,
                    Message::Close(_) => break,
                    _ => continue,
                };
                match Packet::parse(data) {
                    Ok(packet) => println!(
                        "{:>6}  endpoint={}  ts={}  bytes={}",
                        received,
                        packet.endpoint,
                        packet.timestamp,
                        packet.payload.len()
                    ),
                    Err(e) => eprintln!("unparseable packet: {}", e),
                }
                received += 1;
                if count.is_some_and(|max| received >= max) {
                    break;
                }
            }

            let stop = json!({ "Method": "stop", "StreamId": stream_id });
            sink.send(Message::text(stop.to_string())).await?;
            sink.send(Message::Close(None)).await?;
            println!("{} packets", received);
        }
    }

    Ok(())
}
