use crate::error::SessionError;
use tokio::sync::watch;

/// Shared fate of one session generation. The first recorded failure wins and
/// wakes every [`CancelToken`]; later failures are ignored.
#[derive(Debug)]
pub struct CancelScope {
    tx: watch::Sender<Option<SessionError>>,
}

impl CancelScope {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Returns whether `err` became the outcome of the scope.
    pub fn fail(&self, err: SessionError) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(err);
            true
        })
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    pub fn outcome(&self) -> Option<SessionError> {
        self.tx.borrow().clone()
    }
}

impl Default for CancelScope {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<Option<SessionError>>,
}

impl CancelToken {
    /// Resolves once any unit of the scope has failed.
    pub async fn cancelled(&mut self) {
        // The scope outlives every token it hands out, so the sender cannot
        // close while a unit is waiting here.
        let _ = self.rx.wait_for(Option::is_some).await;
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.borrow().is_some()
    }
}
