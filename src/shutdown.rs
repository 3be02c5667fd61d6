use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::lifecycle::Lifecycle;

/// Install the SIGINT handler.
///
/// The signal is registered once, here; every interrupt received afterwards
/// is forwarded to the lifecycle. Other signals keep their default handling.
pub fn install_interrupt_handler(lifecycle: Lifecycle) -> Result<JoinHandle<()>> {
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(tokio::spawn(async move {
        while sigint.recv().await.is_some() {
            tracing::info!("Received SIGINT");
            lifecycle.on_interrupt();
        }
    }))
}
