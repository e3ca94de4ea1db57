use std::time::Duration;

use taskdeck_engine::EngineHandle;
use tokio::task::JoinHandle;

/// Dismisses the presented reminder after a grace period, for headless runs
/// where nobody clicks. Re-arming cancels the previous timer, so a timer
/// armed for an earlier reminder can never cut a later one's presentation
/// short.
pub struct AutoDismiss {
    delay: Duration,
    timer: Option<JoinHandle<()>>,
}

impl AutoDismiss {
    pub fn new(delay: Duration) -> Self {
        Self { delay, timer: None }
    }

    pub fn arm(&mut self, engine: EngineHandle) {
        if let Some(previous) = self.timer.take() {
            previous.abort();
        }
        let delay = self.delay;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = engine.dismiss_reminder().await;
        }));
    }
}
