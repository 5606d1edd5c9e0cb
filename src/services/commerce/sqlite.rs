use std::sync::{Arc, RwLock, Weak};

use rust_decimal::Decimal;

use crate::db::{self, queries, Db};
use crate::models::{CustomerInfo, LineItemMeta, NewLineItem, Order};

use super::{OrderEvent, OrderObserver, OrderSubsystem, RefundLine};

/// Order subsystem stored in the service's own database.
///
/// The connection lock is released before observers run, since observers
/// read and write bookings through the same connection.
pub struct SqliteOrders {
    db: Db,
    observers: RwLock<Vec<Weak<dyn OrderObserver>>>,
}

impl SqliteOrders {
    pub fn new(db: Db) -> Self {
        Self {
            db,
            observers: RwLock::new(Vec::new()),
        }
    }

    fn notify(&self, event: OrderEvent) -> anyhow::Result<()> {
        let live: Vec<Arc<dyn OrderObserver>> = {
            let observers = self
                .observers
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        for observer in live {
            observer.on_order_event(&event)?;
        }
        Ok(())
    }

    fn require_order(&self, order_id: i64) -> anyhow::Result<Order> {
        let conn = db::lock(&self.db);
        queries::get_order(&conn, order_id)?.ok_or_else(|| anyhow::anyhow!("order {order_id} not found"))
    }
}

impl OrderSubsystem for SqliteOrders {
    fn create_order(&self, customer: &CustomerInfo) -> anyhow::Result<i64> {
        let conn = db::lock(&self.db);
        let id = queries::insert_order(&conn, "pending", customer)?;
        tracing::debug!(order_id = id, "order created");
        Ok(id)
    }

    fn get_order(&self, order_id: i64) -> anyhow::Result<Option<Order>> {
        let conn = db::lock(&self.db);
        queries::get_order(&conn, order_id)
    }

    fn add_line_item(&self, order_id: i64, item: &NewLineItem) -> anyhow::Result<i64> {
        let conn = db::lock(&self.db);
        anyhow::ensure!(queries::get_order(&conn, order_id)?.is_some(), "order {order_id} not found");
        queries::insert_order_item(&conn, order_id, item)
    }

    fn set_line_item_meta(&self, order_id: i64, item_id: i64, meta: &LineItemMeta) -> anyhow::Result<()> {
        let conn = db::lock(&self.db);
        let updated = queries::update_order_item_meta(&conn, order_id, item_id, meta)?;
        anyhow::ensure!(updated, "line item {item_id} not found on order {order_id}");
        Ok(())
    }

    fn set_line_item_total(&self, order_id: i64, item_id: i64, total: Decimal) -> anyhow::Result<()> {
        let conn = db::lock(&self.db);
        let updated = queries::update_order_item_total(&conn, order_id, item_id, total)?;
        anyhow::ensure!(updated, "line item {item_id} not found on order {order_id}");
        Ok(())
    }

    fn remove_line_item(&self, order_id: i64, item_id: i64) -> anyhow::Result<()> {
        let conn = db::lock(&self.db);
        let removed = queries::delete_order_item(&conn, order_id, item_id)?;
        anyhow::ensure!(removed, "line item {item_id} not found on order {order_id}");
        Ok(())
    }

    fn refund(&self, order_id: i64, lines: &[RefundLine], reason: &str) -> anyhow::Result<Vec<i64>> {
        let order = self.require_order(order_id)?;

        let mut refund_ids = vec![];
        let mut item_ids = vec![];
        {
            let mut conn = db::lock(&self.db);
            let tx = conn.transaction()?;
            for line in lines {
                let Some(item) = order.items.iter().find(|i| i.id == line.item_id) else {
                    anyhow::bail!("line item {} not found on order {order_id}", line.item_id);
                };
                anyhow::ensure!(
                    line.quantity > 0 && line.quantity <= item.unrefunded_quantity(),
                    "cannot refund {} of line item {} ({} left)",
                    line.quantity,
                    item.id,
                    item.unrefunded_quantity()
                );
                anyhow::ensure!(line.amount >= Decimal::ZERO, "refund amount must not be negative");
                refund_ids.push(queries::insert_refund(&tx, order_id, item.id, line.amount, reason)?);
                queries::set_item_refunded_quantity(&tx, item.id, item.refunded_quantity + line.quantity)?;
                item_ids.push(item.id);
            }
            tx.commit()?;
        }

        tracing::info!(order_id, items = ?item_ids, "refund recorded");
        self.notify(OrderEvent::Refunded { order_id, item_ids })?;
        Ok(refund_ids)
    }

    fn set_status(&self, order_id: i64, status: &str) -> anyhow::Result<()> {
        let from = {
            let conn = db::lock(&self.db);
            let order = queries::get_order(&conn, order_id)?
                .ok_or_else(|| anyhow::anyhow!("order {order_id} not found"))?;
            if order.status == status {
                return Ok(());
            }
            queries::update_order_status(&conn, order_id, status)?;
            order.status
        };
        self.notify(OrderEvent::StatusChanged {
            order_id,
            from,
            to: status.to_string(),
        })
    }

    fn recalculate(&self, order_id: i64) -> anyhow::Result<Decimal> {
        let conn = db::lock(&self.db);
        let total: Decimal = queries::get_order_items(&conn, order_id)?
            .iter()
            .map(|i| i.total)
            .sum();
        queries::update_order_total(&conn, order_id, total)?;
        Ok(total)
    }

    fn add_note(&self, order_id: i64, note: &str) -> anyhow::Result<()> {
        let conn = db::lock(&self.db);
        queries::insert_order_note(&conn, order_id, note)
    }

    fn notes(&self, order_id: i64) -> anyhow::Result<Vec<String>> {
        let conn = db::lock(&self.db);
        queries::get_order_notes(&conn, order_id)
    }

    fn trash(&self, order_id: i64) -> anyhow::Result<()> {
        {
            let conn = db::lock(&self.db);
            anyhow::ensure!(queries::set_order_trashed(&conn, order_id)?, "order {order_id} not found");
        }
        self.notify(OrderEvent::Trashed { order_id })
    }

    fn delete(&self, order_id: i64) -> anyhow::Result<()> {
        self.require_order(order_id)?;
        self.notify(OrderEvent::Deleted { order_id })?;
        let conn = db::lock(&self.db);
        queries::delete_order(&conn, order_id)?;
        tracing::debug!(order_id, "order deleted");
        Ok(())
    }

    fn subscribe(&self, observer: Weak<dyn OrderObserver>) {
        self.observers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(observer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use rust_decimal_macros::dec;

    struct Recorder(Mutex<Vec<OrderEvent>>);

    impl OrderObserver for Recorder {
        fn on_order_event(&self, event: &OrderEvent) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn setup() -> (SqliteOrders, Arc<Recorder>) {
        let conn = db::init_db(":memory:").unwrap();
        let orders = SqliteOrders::new(Arc::new(Mutex::new(conn)));
        let recorder = Arc::new(Recorder(Mutex::new(vec![])));
        let observer: Arc<dyn OrderObserver> = recorder.clone();
        orders.subscribe(Arc::downgrade(&observer));
        (orders, recorder)
    }

    fn item(total: Decimal) -> NewLineItem {
        NewLineItem {
            name: "Room".to_string(),
            quantity: 1,
            total,
        }
    }

    #[test]
    fn test_recalculate_sums_items() {
        let (orders, _) = setup();
        let id = orders.create_order(&CustomerInfo::default()).unwrap();
        orders.add_line_item(id, &item(dec!(100))).unwrap();
        orders.add_line_item(id, &item(dec!(49.90))).unwrap();
        assert_eq!(orders.recalculate(id).unwrap(), dec!(149.90));
        assert_eq!(orders.get_order(id).unwrap().unwrap().total, dec!(149.90));
    }

    #[test]
    fn test_status_change_notifies_only_on_change() {
        let (orders, recorder) = setup();
        let id = orders.create_order(&CustomerInfo::default()).unwrap();
        orders.set_status(id, "pending").unwrap();
        orders.set_status(id, "processing").unwrap();

        let events = recorder.0.lock().unwrap();
        assert_eq!(
            *events,
            vec![OrderEvent::StatusChanged {
                order_id: id,
                from: "pending".to_string(),
                to: "processing".to_string(),
            }]
        );
    }

    #[test]
    fn test_refund_cannot_exceed_quantity() {
        let (orders, recorder) = setup();
        let id = orders.create_order(&CustomerInfo::default()).unwrap();
        let item_id = orders.add_line_item(id, &item(dec!(100))).unwrap();
        let line = RefundLine {
            item_id,
            quantity: 1,
            amount: dec!(100),
        };

        orders.refund(id, &[line.clone()], "guest cancelled").unwrap();
        assert!(orders.refund(id, &[line], "again").is_err());

        let order = orders.get_order(id).unwrap().unwrap();
        assert_eq!(order.items[0].unrefunded_quantity(), 0);
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_delete_notifies_before_removal() {
        struct SeesOrder(Arc<SqliteOrders>, Mutex<Option<bool>>);
        impl OrderObserver for SeesOrder {
            fn on_order_event(&self, event: &OrderEvent) -> anyhow::Result<()> {
                if let OrderEvent::Deleted { order_id } = event {
                    *self.1.lock().unwrap() = Some(self.0.get_order(*order_id)?.is_some());
                }
                Ok(())
            }
        }

        let conn = db::init_db(":memory:").unwrap();
        let orders = Arc::new(SqliteOrders::new(Arc::new(Mutex::new(conn))));
        let watcher = Arc::new(SeesOrder(orders.clone(), Mutex::new(None)));
        let observer: Arc<dyn OrderObserver> = watcher.clone();
        orders.subscribe(Arc::downgrade(&observer));

        let id = orders.create_order(&CustomerInfo::default()).unwrap();
        orders.delete(id).unwrap();

        assert_eq!(*watcher.1.lock().unwrap(), Some(true));
        assert!(orders.get_order(id).unwrap().is_none());
    }
}
