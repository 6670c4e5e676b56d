use std::sync::Arc;
use std::thread::{self, JoinHandle};

use macrodyne_config::ConfigurationCache;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ParserError;
use crate::events::FrameEvents;

/// One-shot publish of the cached configuration when a parser starts.
///
/// Runs on its own thread so `start` never waits on it. Cancelling and
/// joining guarantees nothing is published after the owning parser stopped.
#[derive(Debug)]
pub struct StartupPublish {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl StartupPublish {
    /// Schedule the publish. Failures, including failure to spawn, go to the
    /// error channel.
    pub fn spawn(cache: Arc<ConfigurationCache>, events: Arc<FrameEvents>) -> Self {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let task_events = Arc::clone(&events);

        let spawned = thread::Builder::new()
            .name("macrodyne-startup-publish".to_string())
            .spawn(move || {
                if task_token.is_cancelled() {
                    return;
                }
                let Some(configuration) = cache.configuration() else {
                    debug!("no cached configuration to publish at startup");
                    return;
                };
                if let Err(err) = configuration.validate() {
                    task_events.publish_error(ParserError::Config(err));
                    return;
                }
                if !task_token.is_cancelled() {
                    debug!(id_code = configuration.id_code, "publishing cached configuration");
                    task_events.publish_configuration(&configuration);
                }
            });

        let handle = match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(error = %err, "failed to schedule startup publish");
                events.publish_error(ParserError::Startup(err));
                None
            }
        };

        Self { token, handle }
    }

    /// Cancel the publish if it has not run and wait for the thread to finish.
    pub fn cancel(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }
}
