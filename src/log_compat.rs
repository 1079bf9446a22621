//! Compatibility bridge for the Rust `log` crate.
//!
//! [`ShipperLogAdapter`] implements `log::Log` and forwards every enabled
//! record to a [`ShippingManager`] under a fixed token. Records emitted by
//! this crate, or on one of its sender threads, are never shipped: a worker
//! logging into its own full queue would wait on itself.

use std::sync::Arc;

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::{
    is_own_target,
    manager::{ShippingManager, is_sender_thread},
    token::Token,
    transport::{Connector, TcpConnector},
};

/// Adapter implementing the Rust `log::Log` trait.
pub struct ShipperLogAdapter<C: Connector = TcpConnector> {
    manager: Arc<ShippingManager<C>>,
    token: Token,
    level: LevelFilter,
}

impl<C: Connector> ShipperLogAdapter<C> {
    /// Ship records at `Info` and above under `token`.
    pub fn new(manager: Arc<ShippingManager<C>>, token: Token) -> Self {
        Self {
            manager,
            token,
            level: LevelFilter::Info,
        }
    }

    pub fn with_level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    /// Text shipped for `record`: `"{LEVEL} {target} {message}"`.
    pub fn render(record: &Record<'_>) -> String {
        format!("{} {} {}", record.level(), record.target(), record.args())
    }
}

impl<C: Connector> Log for ShipperLogAdapter<C> {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level && !is_own_target(metadata.target())
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) || is_sender_thread() {
            return;
        }
        // Rejection after shutdown is already counted by the manager.
        let _ = self.manager.send(&self.token, Self::render(record));
    }

    // Entries are shipped asynchronously; `ShippingManager::close` drains.
    fn flush(&self) {}
}

/// Install `adapter` as the global Rust logger.
///
/// Fails when another global logger is already set.
pub fn install_global_logger<C: Connector>(
    adapter: ShipperLogAdapter<C>,
) -> Result<(), SetLoggerError> {
    let level = adapter.level;
    log::set_boxed_logger(Box::new(adapter))?;
    log::set_max_level(level);
    Ok(())
}

#[cfg(test)]
mod tests {
    //! Unit tests for the `log` crate bridge.

    use super::*;
    use crate::{config::ShipperConfig, test_utils::FakeConnector};
    use rstest::rstest;

    fn adapter(connector: &FakeConnector) -> ShipperLogAdapter<FakeConnector> {
        let manager = ShippingManager::with_connector(ShipperConfig::default(), connector.clone())
            .expect("manager starts");
        ShipperLogAdapter::new(Arc::new(manager), Token::new("tok").expect("token"))
    }

    fn emit(adapter: &ShipperLogAdapter<FakeConnector>, level: log::Level, target: &str, msg: &str) {
        adapter.log(
            &Record::builder()
                .args(format_args!("{msg}"))
                .level(level)
                .target(target)
                .build(),
        );
    }

    #[rstest]
    fn ships_rendered_records() {
        let connector = FakeConnector::healthy();
        let adapter = adapter(&connector);
        emit(&adapter, log::Level::Warn, "app::db", "pool exhausted\nretrying");
        adapter.manager.close();
        assert_eq!(
            connector.records(),
            vec!["tokWARN app::db pool exhausted\u{2028}retrying"]
        );
    }

    #[rstest]
    fn respects_level_filter() {
        let connector = FakeConnector::healthy();
        let adapter = adapter(&connector).with_level(LevelFilter::Warn);
        emit(&adapter, log::Level::Info, "app", "chatty");
        emit(&adapter, log::Level::Error, "app", "broken");
        adapter.manager.close();
        assert_eq!(connector.records(), vec!["tokERROR app broken"]);
    }

    #[rstest]
    fn skips_own_records() {
        let connector = FakeConnector::healthy();
        let adapter = adapter(&connector);
        emit(&adapter, log::Level::Warn, "logship::manager", "dropped 3 entries");
        adapter.manager.close();
        assert!(connector.records().is_empty());
    }

    #[rstest]
    fn logging_after_close_is_silent() {
        let connector = FakeConnector::healthy();
        let adapter = adapter(&connector);
        adapter.manager.close();
        emit(&adapter, log::Level::Error, "app", "too late");
        assert!(connector.records().is_empty());
    }
}
