use tokio::sync::watch;

/// Count of payloads accepted by the reader whose record has not been drained by a writer.
///
/// The count starts at one, held by the reader until it has pushed its last payload, so
/// it can only reach zero once every accepted payload has been written.
#[derive(Debug)]
pub struct PendingWork {
    count: watch::Sender<usize>,
}

impl Default for PendingWork {
    fn default() -> Self {
        PendingWork::new()
    }
}

impl PendingWork {
    pub fn new() -> PendingWork {
        let (count, _rx) = watch::channel(1);
        PendingWork { count }
    }

    pub fn add(&self) {
        self.count.send_modify(|c| *c += 1);
    }

    pub fn done(&self) {
        self.count.send_modify(|c| *c = c.saturating_sub(1));
    }

    pub fn get(&self) -> usize {
        *self.count.borrow()
    }

    /// Resolves once the count reaches zero.
    pub async fn drained(&self) {
        let mut rx = self.count.subscribe();
        let _ = rx.wait_for(|c| *c == 0).await;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn drains_only_after_reader_releases_its_hold() {
        let p = Arc::new(PendingWork::new());
        p.add();
        p.add();
        p.done();
        p.done();
        assert_eq!(p.get(), 1);
        assert!(
            tokio::time::timeout(Duration::from_millis(20), p.drained())
                .await
                .is_err()
        );

        let waiter = {
            let p = p.clone();
            tokio::spawn(async move { p.drained().await })
        };
        p.done();
        assert_eq!(p.get(), 0);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn never_underflows() {
        let p = PendingWork::new();
        p.done();
        p.done();
        assert_eq!(p.get(), 0);
    }
}
