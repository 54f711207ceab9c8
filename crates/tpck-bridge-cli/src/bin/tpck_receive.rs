//! TPCK packet terminal
//!
//! Connects to a running bridge and prints every packet it relays, one line
//! per packet, until interrupted or the bridge goes away.

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::signal;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use tpck_bridge_core::packet::{PacketFormatter, TextFormatter};
use tpck_bridge_core::{BridgeClient, BridgeError};

/// Print the packets relayed by a TPCK bridge.
#[derive(Parser)]
#[command(name = "tpck-receive")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bridge host [default: $TRPC_HOST or localhost].
    host: Option<String>,

    /// Bridge port [default: $TRPC_PORT or 55444].
    port: Option<u16>,

    /// Exit after this many packets.
    #[arg(short = 'n', long)]
    count: Option<usize>,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let mut client = BridgeClient::connect(args.host.as_deref(), args.port)
        .await
        .context("could not connect to the bridge")?;

    let mut stdout = tokio::io::stdout();
    tokio::select! {
        result = relay(&mut client, &mut stdout, args.count) => {
            let printed = result?;
            info!(packets = printed, "bridge stream ended");
        }
        _ = signal::ctrl_c() => {
            info!("interrupted");
        }
    }

    client.close().await?;
    Ok(())
}

/// Copy packets from the bridge to `out` until end of stream or `limit`.
///
/// Lines that are not packets are logged and skipped. Returns the number of
/// packets written.
async fn relay<W>(client: &mut BridgeClient, out: &mut W, limit: Option<usize>) -> anyhow::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let mut printed = 0;
    while limit.map_or(true, |n| printed < n) {
        let packet = match client.read_packet().await {
            Ok(Some(packet)) => packet,
            Ok(None) => break,
            Err(BridgeError::Decode(e)) => {
                warn!(error = %e, "skipping undecodable line");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let mut line = TextFormatter.format(&packet);
        line.push('\n');
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
        printed += 1;
    }
    Ok(printed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tpck_bridge_core::packet::{Method, Packet, Service};
    use tpck_bridge_core::testing::BridgeTestHarness;

    #[test]
    fn test_arguments() {
        let args = Args::try_parse_from(["tpck-receive", "bridge.local", "6000", "-n", "3"]).unwrap();
        assert_eq!(args.host.as_deref(), Some("bridge.local"));
        assert_eq!(args.port, Some(6000));
        assert_eq!(args.count, Some(3));

        let args = Args::try_parse_from(["tpck-receive"]).unwrap();
        assert!(args.host.is_none() && args.port.is_none());
    }

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[tokio::test]
    async fn test_relay_prints_packets() {
        let mut harness = BridgeTestHarness::new().await;
        let mut client = harness.connect_bridge_client().await;

        let mut packet = Packet::new(Service::Report, Method::CurrentTemp);
        packet.set_address(0x0102).unwrap();
        harness.device.send_packet(&packet).await.unwrap();
        harness
            .device
            .send_packet(&Packet::new(Service::Update, Method::NullMethod))
            .await
            .unwrap();

        let mut out = Vec::new();
        let printed = relay(&mut client, &mut out, Some(2)).await.unwrap();
        assert_eq!(printed, 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Report           CurrentTemp      <0201>\n\
             Update           NullMethod       <>\n"
        );

        client.close().await.unwrap();
        harness.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_relay_stops_when_bridge_exits() {
        let mut harness = BridgeTestHarness::new().await;
        let mut client = harness.connect_bridge_client().await;

        harness
            .device
            .send_packet(&Packet::new(Service::Request, Method::DateTime))
            .await
            .unwrap();
        let mut out = Vec::new();
        assert_eq!(relay(&mut client, &mut out, Some(1)).await.unwrap(), 1);

        harness.shutdown().await.unwrap();
        assert_eq!(relay(&mut client, &mut out, None).await.unwrap(), 0);
    }
}
