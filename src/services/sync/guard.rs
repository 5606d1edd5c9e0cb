//! Call-stack scoped suppression of the synchronizer's listeners.
//!
//! A forward write (booking → order) raises a suppression for the reverse
//! listener before touching the order subsystem; any event the write echoes
//! back on the same thread is then ignored. Suppressions nest and are
//! released on drop.

use std::cell::Cell;
use std::marker::PhantomData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listener {
    /// Order-side events (status change, trash, delete, refund) reaching the synchronizer.
    OrderEvents,
    /// Booking updates routed to `on_booking_updated`.
    BookingEvents,
    /// Line item removal for deleted bookings.
    LineItemRemoval,
}

impl Listener {
    fn slot(self) -> usize {
        match self {
            Listener::OrderEvents => 0,
            Listener::BookingEvents => 1,
            Listener::LineItemRemoval => 2,
        }
    }
}

thread_local! {
    static DEPTH: [Cell<u32>; 3] = const { [Cell::new(0), Cell::new(0), Cell::new(0)] };
}

/// Active while alive. Not `Send`, so it cannot be held across an `.await`
/// and resumed on another thread.
#[must_use = "the listener is only suppressed while the guard is alive"]
pub struct Suppression {
    listener: Listener,
    _not_send: PhantomData<*const ()>,
}

pub fn suppress(listener: Listener) -> Suppression {
    DEPTH.with(|depth| {
        let cell = &depth[listener.slot()];
        cell.set(cell.get() + 1);
    });
    Suppression {
        listener,
        _not_send: PhantomData,
    }
}

pub fn is_suppressed(listener: Listener) -> bool {
    DEPTH.with(|depth| depth[listener.slot()].get() > 0)
}

impl Drop for Suppression {
    fn drop(&mut self) {
        DEPTH.with(|depth| {
            let cell = &depth[self.listener.slot()];
            cell.set(cell.get().saturating_sub(1));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suppression_nests_and_releases() {
        assert!(!is_suppressed(Listener::OrderEvents));
        {
            let _outer = suppress(Listener::OrderEvents);
            {
                let _inner = suppress(Listener::OrderEvents);
                assert!(is_suppressed(Listener::OrderEvents));
            }
            assert!(is_suppressed(Listener::OrderEvents));
            assert!(!is_suppressed(Listener::BookingEvents));
        }
        assert!(!is_suppressed(Listener::OrderEvents));
    }

    #[test]
    fn test_suppression_is_per_thread() {
        let _guard = suppress(Listener::LineItemRemoval);
        let other = std::thread::spawn(|| is_suppressed(Listener::LineItemRemoval))
            .join()
            .unwrap();
        assert!(!other);
        assert!(is_suppressed(Listener::LineItemRemoval));
    }
}
