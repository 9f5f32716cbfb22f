//! Example: Track zone faults and print each fault and restore.

use ad2sock::{Client, ClientConfig, ZoneTracker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = ClientConfig::builder()
        .host("192.168.0.100")
        .port(10000)
        .build();

    let client = Client::connect(config).await?;
    println!("Connected: {}", client.banner());

    let tracker = ZoneTracker::spawn(
        &client,
        |zone| println!("Zone {} FAULT", zone),
        |zone| println!("Zone {} RESTORE", zone),
    );

    println!("Listening for zone events (Ctrl+C to stop)...\n");

    let mut status = tokio::time::interval(std::time::Duration::from_secs(10));
    loop {
        tokio::select! {
            _ = status.tick() => {
                println!("Faulted zones: {:?}", tracker.faulted_zones());
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nDisconnecting...");
                break;
            }
        }
    }

    tracker.stop().await;
    client.shutdown().await?;
    Ok(())
}
