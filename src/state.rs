use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::db::Db;
use crate::models::{BookingEvent, StatusTaxonomy};
use crate::services::attributes::{AttributePricing, TableAttributePricing};
use crate::services::commerce::sqlite::SqliteOrders;
use crate::services::commerce::{OrderObserver, OrderSubsystem};
use crate::services::sync::Synchronizer;

pub struct AppState {
    pub db: Db,
    pub config: AppConfig,
    pub taxonomy: Arc<StatusTaxonomy>,
    pub orders: Arc<dyn OrderSubsystem>,
    pub attributes: Arc<dyn AttributePricing>,
    pub sync: Arc<Synchronizer>,
    pub events: broadcast::Sender<BookingEvent>,
}

impl AppState {
    /// Wires the synchronizer to `orders` and subscribes it to order events.
    pub fn new(config: AppConfig, db: Db, orders: Arc<dyn OrderSubsystem>) -> anyhow::Result<Self> {
        let taxonomy = Arc::new(config.load_taxonomy()?);
        let attributes: Arc<dyn AttributePricing> = Arc::new(TableAttributePricing);
        let (events, _) = broadcast::channel(256);

        let sync = Arc::new(Synchronizer::new(
            db.clone(),
            orders.clone(),
            taxonomy.clone(),
            attributes.clone(),
            config.tax_convention(),
            events.clone(),
        ));
        let observer: Arc<dyn OrderObserver> = sync.clone();
        orders.subscribe(Arc::downgrade(&observer));

        Ok(Self {
            db,
            config,
            taxonomy,
            orders,
            attributes,
            sync,
            events,
        })
    }
}

/// State backed by the bundled SQLite order subsystem.
pub fn build_state(config: AppConfig, conn: Connection) -> anyhow::Result<Arc<AppState>> {
    let db: Db = Arc::new(Mutex::new(conn));
    let orders: Arc<dyn OrderSubsystem> = Arc::new(SqliteOrders::new(db.clone()));
    Ok(Arc::new(AppState::new(config, db, orders)?))
}
