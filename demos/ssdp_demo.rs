use rssdp::logging::{LogFacade, LogLevel, SsdpLogger};
use rssdp::{DeviceProperties, LocatorEvent, SsdpConfig, SsdpDevice, SsdpRuntime, SsdpService};
use rand::Rng;
use std::time::Duration;
use url::Url;

#[tokio::main]
async fn main() -> rssdp::Result<()> {
    env_logger::init();

    let runtime = match std::env::args().nth(1) {
        Some(path) => SsdpRuntime::load(path)?,
        None => SsdpRuntime::from_config(SsdpConfig::default(), LogFacade::new())?,
    };
    let logger = runtime.logger();

    let (stop_tx, mut stop_rx) = tokio::sync::mpsc::unbounded_channel::<()>();
    let l = logger.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        l.log(LogLevel::Info, "Main", "Shutting down...");
        let _ = stop_tx.send(());
    }) {
        logger.log(LogLevel::Warn, "Main", &format!("Failed to install Ctrl-C handler: {}", e));
    }

    let uuid = format!("{:032x}", rand::rng().random::<u128>());
    let device = SsdpDevice::new_root(
        DeviceProperties::new(&uuid, "Basic"),
        Url::parse("http://127.0.0.1:8080/description.xml").map_err(|e| rssdp::SsdpError::argument(e.to_string()))?,
        Duration::from_secs(1800),
    )?;
    device.add_service(SsdpService::new(&uuid, "schemas-upnp-org", "Dummy", 1)?);
    runtime.publisher().add_device(device.clone()).await?;
    logger.log(LogLevel::Info, "Main", &format!("Published uuid:{}", uuid));

    let mut events = runtime.locator().subscribe();
    runtime.locator().start_listening_for_notifications()?;

    let mut ticker = tokio::time::interval(Duration::from_secs(15));
    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            Some(event) = events.recv() => match event {
                LocatorEvent::DeviceAvailable { device, is_new_device: true } => {
                    println!("+ {} {}", device.usn, device.description_location.map(|u| u.to_string()).unwrap_or_default());
                }
                LocatorEvent::DeviceUnavailable { device, expired } => {
                    println!("- {} (expired: {})", device.usn, expired);
                }
                _ => {}
            },
            _ = ticker.tick() => {
                match runtime.locator().search().await {
                    Ok(found) => println!("search: {} devices", found.len()),
                    Err(e) => logger.log(LogLevel::Warn, "Main", &format!("Search failed: {}", e)),
                }
            }
        }
    }

    runtime.shutdown().await;
    Ok(())
}
