use tokio::sync::watch;

/// Creates a linked handle/signal pair for cooperative shutdown.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// Owned by whoever decides to stop a run (Ctrl-C handler, tests).
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Cheap to clone; checked at safe points rather than interrupting in-flight I/O.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_propagates_cancellation() {
        let (handle, signal) = cancel_pair();
        assert!(!signal.is_cancelled());
        handle.cancel();
        assert!(signal.is_cancelled());
    }

    #[test]
    fn never_signal_stays_quiet() {
        let signal = CancelSignal::never();
        assert!(!signal.is_cancelled());
    }
}
