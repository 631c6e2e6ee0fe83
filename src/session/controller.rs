//! Session controller
//!
//! Composes one capture session out of a feed, a media session and the ROI
//! overlay. The controller holds at most one [`SessionContext`]; everything
//! that belongs to a session lives there and goes away on `stop()`.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::capture::{CaptureConstraints, Feed, FeedSource, Resolution};
use crate::config::AgentConfig;
use crate::error::{AppError, Result};
use crate::events::{AgentEvent, EventBus, StatusSource};
use crate::roi::{DisplaySize, RoiOverlay, RoiProjector};
use crate::signaling::{HandlerId, SignalingChannel, SignalingMessage};
use crate::webrtc::{MediaSession, TransportFactory};

use super::display::NumbersDisplay;

/// Everything owned by one active session
pub struct SessionContext {
    id: String,
    feed: Feed,
    /// `None` when the transport could not be set up (degraded session)
    media: Option<MediaSession>,
    roi_tracker: JoinHandle<()>,
}

impl SessionContext {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn feed(&self) -> &Feed {
        &self.feed
    }

    pub fn media(&self) -> Option<&MediaSession> {
        self.media.as_ref()
    }

    /// Last resolution reported by the feed
    pub fn source_resolution(&self) -> Option<Resolution> {
        self.feed.resolution()
    }
}

/// Start/stop orchestration over a shared signaling channel
pub struct SessionController {
    channel: SignalingChannel,
    feeds: Arc<dyn FeedSource>,
    transports: Arc<dyn TransportFactory>,
    events: Arc<EventBus>,
    projector: RoiProjector,
    constraints: CaptureConstraints,
    notify_service: bool,
    roi_enabled: watch::Sender<bool>,
    display: watch::Sender<DisplaySize>,
    display_handler: HandlerId,
    context: Option<SessionContext>,
}

impl SessionController {
    /// Create an idle controller
    ///
    /// Registers the numbers display on `channel`; it stays registered for
    /// the controller's lifetime, across sessions.
    pub fn new(
        config: &AgentConfig,
        channel: SignalingChannel,
        feeds: Arc<dyn FeedSource>,
        transports: Arc<dyn TransportFactory>,
        events: Arc<EventBus>,
    ) -> Self {
        let display_handler = channel.on_message(Arc::new(NumbersDisplay::new(events.clone())));
        let (roi_enabled, _) = watch::channel(config.roi.enabled);
        let (display, _) = watch::channel(config.display.size());

        Self {
            channel,
            feeds,
            transports,
            events,
            projector: RoiProjector::new(config.roi.roi_config()),
            constraints: config.capture.clone(),
            notify_service: config.roi.notify_service,
            roi_enabled,
            display,
            display_handler,
            context: None,
        }
    }

    /// Start a session and return its id
    ///
    /// Fails with [`AppError::SessionActive`] while another session is
    /// active, and with the feed's error if acquisition fails (no session is
    /// created then). A negotiation failure leaves the session active but
    /// degraded; `stop()` cleans it up.
    pub async fn start(&mut self) -> Result<String> {
        if let Some(ctx) = &self.context {
            warn!("Session {} already active, rejecting start", ctx.id);
            return Err(AppError::SessionActive(ctx.id.clone()));
        }

        let id = uuid::Uuid::new_v4().to_string();
        info!("Starting session {}", id);

        let feed = match self.feeds.acquire(&self.constraints).await {
            Ok(feed) => feed,
            Err(e) => {
                error!("Feed acquisition failed: {}", e);
                self.events.status(StatusSource::Capture, e.to_string());
                return Err(e);
            }
        };
        debug!("Session {} bound to feed {}", id, feed.id());

        let roi_tracker = tokio::spawn(track_roi(
            self.projector,
            feed.metadata_watch(),
            self.display.subscribe(),
            self.roi_enabled.subscribe(),
            self.events.clone(),
        ));

        let media = match MediaSession::start(
            &id,
            feed.local_tracks(),
            self.channel.clone(),
            self.transports.as_ref(),
            self.events.clone(),
        )
        .await
        {
            Ok(media) => {
                // Failures are already reported by the session
                if let Err(e) = media.negotiate().await {
                    debug!("Session {} negotiation did not complete: {}", id, e);
                }
                Some(media)
            }
            Err(e) => {
                error!("Failed to set up media session {}: {}", id, e);
                self.events
                    .status(StatusSource::Webrtc, "negotiation error");
                None
            }
        };

        self.context = Some(SessionContext {
            id: id.clone(),
            feed,
            media,
            roi_tracker,
        });

        self.events.publish(AgentEvent::SessionStarted {
            session_id: id.clone(),
        });
        Ok(id)
    }

    /// Tear down the active session, if any
    pub async fn stop(&mut self) {
        let Some(ctx) = self.context.take() else {
            debug!("No active session to stop");
            return;
        };

        info!("Stopping session {}", ctx.id);
        ctx.feed.release();
        if let Some(media) = &ctx.media {
            media.stop().await;
        }
        ctx.roi_tracker.abort();

        self.events.publish(AgentEvent::RoiChanged {
            overlay: RoiOverlay::Hidden,
        });
        self.events.publish(AgentEvent::SessionStopped {
            session_id: ctx.id,
        });
    }

    /// Flip the ROI overlay and return the new overlay
    pub fn toggle_roi(&mut self) -> RoiOverlay {
        let mut enabled = false;
        self.roi_enabled.send_modify(|flag| {
            *flag = !*flag;
            enabled = *flag;
        });
        info!("ROI overlay {}", if enabled { "enabled" } else { "disabled" });

        if self.notify_service {
            self.channel.send(&SignalingMessage::RoiToggle { enabled });
        }

        self.overlay()
    }

    /// Update the display surface size; the overlay follows
    pub fn set_display_size(&self, size: DisplaySize) {
        self.display.send_replace(size);
    }

    /// Overlay for the current inputs
    pub fn overlay(&self) -> RoiOverlay {
        let source = self.context.as_ref().and_then(|c| c.source_resolution());
        self.projector
            .project(source, *self.display.borrow(), *self.roi_enabled.borrow())
    }

    pub fn roi_enabled(&self) -> bool {
        *self.roi_enabled.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.context.is_some()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.context.as_ref().map(|c| c.id.as_str())
    }

    pub fn context(&self) -> Option<&SessionContext> {
        self.context.as_ref()
    }

    pub fn channel(&self) -> &SignalingChannel {
        &self.channel
    }

    /// Stop the session and unregister from the channel
    pub async fn shutdown(&mut self) {
        self.stop().await;
        self.channel.remove_handler(self.display_handler);
    }
}

/// Re-project whenever the source, display or enabled flag changes
async fn track_roi(
    projector: RoiProjector,
    mut source: watch::Receiver<Option<Resolution>>,
    mut display: watch::Receiver<DisplaySize>,
    mut enabled: watch::Receiver<bool>,
    events: Arc<EventBus>,
) {
    let mut last: Option<RoiOverlay> = None;
    // The feed may drop its sender once the resolution is final
    let mut source_open = true;

    loop {
        let overlay = projector.project(
            *source.borrow_and_update(),
            *display.borrow_and_update(),
            *enabled.borrow_and_update(),
        );
        if last != Some(overlay) {
            debug!("ROI overlay: {:?}", overlay);
            events.publish(AgentEvent::RoiChanged { overlay });
            last = Some(overlay);
        }

        tokio::select! {
            changed = source.changed(), if source_open => {
                if changed.is_err() {
                    source_open = false;
                }
            }
            changed = display.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = enabled.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}
