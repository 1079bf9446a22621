//! `tracing` bridge: a subscriber layer shipping events.

use std::{fmt::Write as _, sync::Arc};

use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::layer::{Context, Layer};

use crate::{
    is_own_target,
    manager::{ShippingManager, is_sender_thread},
    token::Token,
    transport::{Connector, TcpConnector},
};

/// Layer forwarding events at or above `level` to a [`ShippingManager`].
///
/// Events render as `"{LEVEL} {target} {message} key=value ..."`.
pub struct ShipperLayer<C: Connector = TcpConnector> {
    manager: Arc<ShippingManager<C>>,
    token: Token,
    level: Level,
}

impl<C: Connector> ShipperLayer<C> {
    pub fn new(manager: Arc<ShippingManager<C>>, token: Token) -> Self {
        Self {
            manager,
            token,
            level: Level::INFO,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

#[derive(Default)]
struct EventText {
    message: String,
    fields: String,
}

impl Visit for EventText {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }
}

impl<S, C> Layer<S> for ShipperLayer<C>
where
    S: Subscriber,
    C: Connector,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > self.level
            || is_own_target(meta.target())
            || is_sender_thread()
        {
            return;
        }
        let mut text = EventText::default();
        event.record(&mut text);
        let rendered = format!(
            "{} {} {}{}",
            meta.level(),
            meta.target(),
            text.message,
            text.fields
        );
        let _ = self.manager.send(&self.token, rendered);
    }
}
