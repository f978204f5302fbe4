use std::future::Future;
use std::time::Duration;
use tokio::task::AbortHandle;

/// Identifies one scheduled attempt; stale tickets are refused by [`ReconnectScheduler::fire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket(u64);

struct Pending {
    ticket: Ticket,
    handle: AbortHandle,
}

/// Single-slot delayed reconnect: `Idle` when `pending` is empty, `Scheduled` otherwise.
#[derive(Default)]
pub(crate) struct ReconnectScheduler {
    pending: Option<Pending>,
    issued: u64,
}

impl ReconnectScheduler {
    pub fn is_scheduled(&self) -> bool {
        self.pending.is_some()
    }

    /// Arms the timer unless one is already pending. Returns whether it was armed.
    ///
    /// `make` receives the ticket the spawned future must pass to [`fire`](Self::fire)
    /// before doing any work.
    pub fn schedule<F, Fut>(&mut self, delay: Duration, make: F) -> bool
    where
        F: FnOnce(Ticket) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.pending.is_some() {
            return false;
        }
        self.issued += 1;
        let ticket = Ticket(self.issued);
        let attempt = make(ticket);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            attempt.await;
        });
        self.pending = Some(Pending {
            ticket,
            handle: task.abort_handle(),
        });
        true
    }

    /// Moves back to idle if `ticket` is the pending one.
    pub fn fire(&mut self, ticket: Ticket) -> bool {
        match &self.pending {
            Some(p) if p.ticket == ticket => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(p) => {
                p.handle.abort();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    type Shared = Arc<Mutex<ReconnectScheduler>>;

    fn arm(scheduler: &Shared, attempts: &Arc<AtomicUsize>) -> bool {
        let (s, a) = (Arc::clone(scheduler), Arc::clone(attempts));
        scheduler
            .lock()
            .unwrap()
            .schedule(Duration::from_millis(3000), move |ticket| async move {
                if s.lock().unwrap().fire(ticket) {
                    a.fetch_add(1, Ordering::SeqCst);
                }
            })
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_closes_keep_a_single_timer() {
        let scheduler: Shared = Arc::default();
        let attempts = Arc::new(AtomicUsize::new(0));

        assert!(arm(&scheduler, &attempts));
        for _ in 0..5 {
            assert!(!arm(&scheduler, &attempts));
        }
        assert!(scheduler.lock().unwrap().is_scheduled());

        tokio::time::sleep(Duration::from_millis(3100)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(!scheduler.lock().unwrap().is_scheduled());

        // Idle again, so the next close arms a new timer.
        assert!(arm(&scheduler, &attempts));
        tokio::time::sleep(Duration::from_millis(3100)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_fires_before_the_delay() {
        let scheduler: Shared = Arc::default();
        let attempts = Arc::new(AtomicUsize::new(0));

        arm(&scheduler, &attempts);
        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
        assert!(scheduler.lock().unwrap().is_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_the_attempt() {
        let scheduler: Shared = Arc::default();
        let attempts = Arc::new(AtomicUsize::new(0));

        arm(&scheduler, &attempts);
        assert!(scheduler.lock().unwrap().cancel());
        assert!(!scheduler.lock().unwrap().cancel());
        assert!(!scheduler.lock().unwrap().is_scheduled());

        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stale_ticket_is_refused() {
        let mut scheduler = ReconnectScheduler::default();
        assert!(!scheduler.fire(Ticket(1)));
    }
}
