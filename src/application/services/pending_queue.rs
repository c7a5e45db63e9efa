use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub submitted: usize,
    pub failed: usize,
}

/// ある保存の副産物として作られ、後から別パスで送信されるエンティティの列
pub struct PendingSubmissionQueue<T> {
    items: Arc<Mutex<VecDeque<T>>>,
}

impl<T> Clone for PendingSubmissionQueue<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> Default for PendingSubmissionQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PendingSubmissionQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub async fn push(&self, item: T) {
        self.items.lock().await.push_back(item);
    }

    pub async fn extend(&self, items: impl IntoIterator<Item = T>) {
        self.items.lock().await.extend(items);
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    pub async fn clear(&self) -> usize {
        let mut items = self.items.lock().await;
        let dropped = items.len();
        items.clear();
        dropped
    }

    /// 1 件ずつ送信し、完了を待ってから次へ進む。失敗したものは順序を保って列に戻す
    pub async fn drain_sequential<F, Fut, E>(&self, mut submit: F) -> DrainReport
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = Result<(), (T, E)>>,
        E: Display,
    {
        let batch: Vec<T> = self.items.lock().await.drain(..).collect();
        let mut report = DrainReport::default();
        let mut failed = Vec::new();

        for item in batch {
            match submit(item).await {
                Ok(()) => report.submitted += 1,
                Err((item, err)) => {
                    tracing::warn!(error = %err, "Pending submission failed, keeping it queued");
                    failed.push(item);
                }
            }
        }

        report.failed = failed.len();
        if !failed.is_empty() {
            let mut items = self.items.lock().await;
            for item in failed.into_iter().rev() {
                items.push_front(item);
            }
        }
        report
    }
}
