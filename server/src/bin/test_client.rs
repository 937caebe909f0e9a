use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use shared::{ClientEvent, ServerEvent};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Scripted WebSocket client for poking at a running server
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// WebSocket endpoint of the server
    #[arg(short, long, default_value = "ws://127.0.0.1:3000/ws")]
    url: String,
    /// Username to join with
    #[arg(short = 'n', long, default_value = "test_student")]
    username: String,
    /// Create a poll as this teacher after joining
    #[arg(short, long)]
    teacher: Option<String>,
    /// Seconds to keep listening before disconnecting
    #[arg(short, long, default_value = "10")]
    seconds: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    println!("Connecting to {}", args.url);
    let (socket, _) = connect_async(args.url.as_str()).await?;
    let (mut sink, mut stream) = socket.split();

    let join = ClientEvent::JoinChat(json!({ "username": args.username }));
    sink.send(Message::Text(join.encode()?.into())).await?;
    println!("Joined as {}", args.username);

    if let Some(teacher) = &args.teacher {
        let poll = ClientEvent::CreatePoll(json!({
            "teacherUsername": teacher,
            "question": "2+2?",
            "timer": 30,
            "options": [{ "text": "3" }, { "text": "4", "correct": true }]
        }));
        sink.send(Message::Text(poll.encode()?.into())).await?;
        println!("Created poll as {}", teacher);
    }

    let listen = async {
        while let Some(message) = stream.next().await {
            let text = match message? {
                Message::Text(text) => text,
                Message::Close(frame) => {
                    println!("Server closed the connection: {:?}", frame);
                    break;
                }
                _ => continue,
            };

            match ServerEvent::decode(text.as_str()) {
                Ok(ServerEvent::PollCreated(poll)) => {
                    println!("Poll {}: {}", poll.id, poll.question);
                    // Vote for the first option so results come back
                    if let Some(option) = poll.options.first() {
                        let vote = ClientEvent::SubmitAnswer(json!({
                            "username": args.username,
                            "pollId": poll.id,
                            "option": option.text
                        }));
                        sink.send(Message::Text(vote.encode()?.into())).await?;
                    }
                }
                Ok(event) => println!("Received: {:?}", event),
                Err(e) => println!("Undecodable frame {}: {}", text.as_str(), e),
            }
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    };

    match timeout(Duration::from_secs(args.seconds), listen).await {
        Ok(result) => result?,
        Err(_) => println!("Listened for {}s, disconnecting", args.seconds),
    }

    sink.send(Message::Close(None)).await.ok();
    println!("Test client finished");
    Ok(())
}
