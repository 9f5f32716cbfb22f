//! Example: Print every keypad line with its decoded status bits.

use std::sync::Arc;

use ad2sock::{Client, ClientConfig, Message, MessageKind, Parser};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // Also pass RF receiver lines through as raw text.
    let mut parser = Parser::new();
    parser.register(
        MessageKind::Rfx,
        Arc::new(|line: &str| Ok(Message::Rfx(line.to_string()))),
    );

    let config = ClientConfig::builder()
        .host("192.168.0.100")
        .port(10000)
        .parser(parser)
        .build();

    let client = Client::connect(config).await?;
    let mut messages = client.subscribe();

    println!("Listening for keypad messages (Ctrl+C to stop)...\n");

    loop {
        tokio::select! {
            msg = messages.recv() => {
                match msg.as_deref() {
                    Some(Message::Keypad(keypad)) => {
                        let f = &keypad.fields;
                        println!(
                            "[{:03}] {:<32} ready={} away={} home={} ac={} beeps={}",
                            keypad.zone(),
                            keypad.text,
                            f.ready(),
                            f.armed_away(),
                            f.armed_home(),
                            f.ac_power(),
                            f.beep_count,
                        );
                    }
                    Some(other) => println!("{}: {}", other.kind(), other),
                    None => {
                        println!("Connection closed");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nDisconnecting...");
                break;
            }
        }
    }

    drop(messages);
    client.shutdown().await?;
    Ok(())
}
