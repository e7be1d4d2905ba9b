use crate::surface::Surface;
use crate::visual::capture_frame;
use mentor_realtime::MessageSender;
use mentor_realtime_types::ClientMessage;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Periodic visual context capture. The first capture fires as soon as the
/// scheduler starts; dropping the handle stops the timer.
pub(crate) struct VisualScheduler {
    task: JoinHandle<()>,
}

impl VisualScheduler {
    pub(crate) fn spawn(surface: Arc<dyn Surface>, sender: MessageSender, period: Duration) -> Self {
        tracing::info!(period_ms = period.as_millis() as u64, "starting visual context capture");
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // A slow render must not cause a burst of catch-up captures.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !sender.is_open() {
                    tracing::trace!("channel not open; skipping visual capture");
                    continue;
                }
                let surface = surface.clone();
                let frame = match tokio::task::spawn_blocking(move || capture_frame(&*surface)).await {
                    Ok(Ok(frame)) => frame,
                    Ok(Err(e)) => {
                        tracing::warn!("visual capture failed: {:#}", e);
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("visual capture task failed: {}", e);
                        continue;
                    }
                };
                tracing::debug!(dimensions = ?frame.dimensions(), "sending visual context");
                if let Err(e) = sender.try_send(ClientMessage::screenshot(frame.into_data())) {
                    tracing::debug!("dropping visual frame: {}", e);
                }
            }
        });
        Self { task }
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for VisualScheduler {
    fn drop(&mut self) {
        self.task.abort();
    }
}
