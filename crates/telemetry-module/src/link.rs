//! Relay server link
//!
//! Runs the module's cooperative loop over one connection: server lines
//! and the 100 ms tick are multiplexed with `select!`, and whatever the
//! controller produced is written out after each step.

use crate::controller::Controller;
use crate::host::OutboundBuffer;
use crate::sim::EcuSimulator;
use obd_protocol::MockCanBus;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::interval;
use tracing::warn;

/// Main loop period; the 1 s ticker runs every tenth pass
pub const TICK: Duration = Duration::from_millis(100);

/// Serve one connection until it fails or a reboot is requested.
///
/// Returns `Ok` only for a reboot.
pub async fn serve<R, W>(
    reader: R,
    mut writer: W,
    controller: &mut Controller<MockCanBus>,
    ecu: &mut EcuSimulator,
    timer: u16,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut outbound = OutboundBuffer::new();

    controller.on_connected(&mut outbound, timer)?;
    flush(&mut writer, &mut outbound).await?;

    let mut ticker = interval(TICK);
    let mut tenths = 0u8;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    anyhow::bail!("Server closed the connection");
                };
                if let Err(e) = controller.on_server_line(&line, &mut outbound) {
                    flush(&mut writer, &mut outbound).await?;
                    if e.drops_link() {
                        return Err(e.into());
                    }
                    warn!("Server message failed: {}", e);
                }
            }
            _ = ticker.tick() => {
                ecu.step(controller.bus_mut());
                controller.on_can_interrupt();
                controller.idle_poll();
                controller.ticker_10th();

                tenths += 1;
                if tenths == 10 {
                    tenths = 0;
                    if let Err(e) = controller.ticker_1s(&mut outbound) {
                        flush(&mut writer, &mut outbound).await?;
                        if e.drops_link() {
                            return Err(e.into());
                        }
                        warn!("Ticker failed: {}", e);
                    }
                }
            }
        }

        flush(&mut writer, &mut outbound).await?;
        if controller.reboot_requested() {
            return Ok(());
        }
    }
}

async fn flush<W: AsyncWrite + Unpin>(writer: &mut W, outbound: &mut OutboundBuffer) -> anyhow::Result<()> {
    if !outbound.is_empty() {
        writer.write_all(&outbound.take()).await?;
        writer.flush().await?;
    }
    Ok(())
}
