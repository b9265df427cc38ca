use crm::ContactEmail;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slots = Mutex<HashMap<ContactEmail, Arc<AsyncMutex<()>>>>;

/// Serializes work on the same contact. Each email gets its own async lock, created on first
/// use and dropped again once nobody holds or waits for it.
#[derive(Clone, Default)]
pub(crate) struct InFlight {
    slots: Arc<Slots>,
}

impl InFlight {
    pub async fn acquire(&self, email: &ContactEmail) -> InFlightGuard {
        let slot = self.slots.lock().entry(email.clone()).or_default().clone();
        let guard = slot.lock_owned().await;

        InFlightGuard {
            slots: self.slots.clone(),
            email: email.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

pub(crate) struct InFlightGuard {
    slots: Arc<Slots>,
    email: ContactEmail,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        // Release the lock first so its reference to the slot is gone before counting.
        drop(self.guard.take());

        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(&self.email)
            && Arc::strong_count(slot) == 1
        {
            slots.remove(&self.email);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn email(raw: &str) -> ContactEmail {
        ContactEmail::parse(raw).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn same_email_is_serialized() {
        let in_flight = InFlight::default();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let in_flight = in_flight.clone();
            let order = order.clone();
            tokio::spawn(async move {
                let _guard = in_flight.acquire(&email("a@example.com")).await;
                order.lock().push("first:start");
                tokio::time::sleep(Duration::from_secs(1)).await;
                order.lock().push("first:end");
            })
        };
        tokio::task::yield_now().await;

        let second = {
            let in_flight = in_flight.clone();
            let order = order.clone();
            tokio::spawn(async move {
                let _guard = in_flight.acquire(&email("a@example.com")).await;
                order.lock().push("second");
            })
        };

        first.await.unwrap();
        second.await.unwrap();

        assert_eq!(*order.lock(), vec!["first:start", "first:end", "second"]);
        assert_eq!(in_flight.len(), 0);
    }

    #[tokio::test]
    async fn different_emails_do_not_block() {
        let in_flight = InFlight::default();

        let a = in_flight.acquire(&email("a@example.com")).await;
        let _b = in_flight.acquire(&email("b@example.com")).await;
        assert_eq!(in_flight.len(), 2);

        drop(a);
        assert_eq!(in_flight.len(), 1);
    }
}
