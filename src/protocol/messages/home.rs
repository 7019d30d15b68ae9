use std::time::SystemTime;

use futures::future::BoxFuture;
use tracing::debug;

use crate::error::Result;
use crate::protocol::message::{ClientMessage, HandlerContext};
use crate::service::EventService;
use crate::transport::session::ConnectionSession;

/// Client returning to the home screen after a battle or offline period.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoHomeFromOfflineMessage;

impl ClientMessage for GoHomeFromOfflineMessage {
    fn name(&self) -> &'static str {
        "GoHomeFromOffline"
    }

    fn decode(&mut self, _payload: &[u8]) -> Result<()> {
        Ok(())
    }

    fn process<'a>(
        self: Box<Self>,
        session: &'a mut ConnectionSession,
        ctx: &'a HandlerContext,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if !session.is_active() {
                debug!(conn_id = session.id(), "go home before login ignored");
                return Ok(());
            }

            // home data is not served yet; record which events the player would see
            let now = SystemTime::now();
            let events = &ctx.services.events;
            for slot in 0..events.slot_count() {
                if let Some(event) = events.current_event(slot) {
                    debug!(
                        conn_id = session.id(),
                        slot,
                        game_mode = %event.config.game_mode,
                        location = event.location_id,
                        seconds_left = event.seconds_left(now),
                        "event visible at home"
                    );
                }
            }
            Ok(())
        })
    }
}
