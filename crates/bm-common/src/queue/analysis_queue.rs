use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{Instrument, error, info, info_span, instrument};

use super::ProcessingCounter;
use crate::ActivityLog;
use crate::analysis::{AnalysisError, BookAnalyzer};
use crate::library::{LibraryError, add_analyzed_book};
use crate::run_id;
use crate::store::LibraryStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRequest {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("analysis failed: {0}")]
    Analysis(#[from] AnalysisError),
    #[error("failed to save analysed book: {0}")]
    Save(#[from] LibraryError),
}

impl JobError {
    fn outcome(&self) -> &'static str {
        match self {
            JobError::Analysis(_) => "analysis_failed",
            JobError::Save(_) => "save_failed",
        }
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("analysis queue worker has stopped")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueReceipt {
    pub batch_id: String,
    pub accepted: usize,
}

struct QueuedBook {
    batch_id: String,
    user_id: String,
    book: BookRequest,
}

/// 1冊分の処理: 分析 → ログ保存 → ステータス更新
#[instrument(skip(analyzer, store, book), fields(title = %book.title))]
pub async fn process_book<A, S>(
    analyzer: &A,
    store: &S,
    user_id: &str,
    book: &BookRequest,
) -> Result<ActivityLog, JobError>
where
    A: BookAnalyzer + ?Sized,
    S: LibraryStore + ?Sized,
{
    let author = book.author.as_deref().filter(|a| !a.trim().is_empty());
    let analysis = analyzer.analyze(&book.title, author).await?;
    let log = add_analyzed_book(store, user_id, &book.title, &analysis).await?;
    Ok(log)
}

/// Sequential analysis queue. A single worker drains submissions in FIFO order, one book at a time.
///
/// Failed books are logged and skipped; the submitter is not told about them.
#[derive(Clone)]
pub struct AnalysisQueue {
    tx: mpsc::UnboundedSender<QueuedBook>,
    counter: ProcessingCounter,
}

impl AnalysisQueue {
    /// Starts the worker on the current tokio runtime. It stops once every queue handle is dropped.
    pub fn spawn(
        analyzer: Arc<dyn BookAnalyzer>,
        store: Arc<dyn LibraryStore>,
        counter: ProcessingCounter,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(rx, analyzer, store, counter.clone()));
        Self { tx, counter }
    }

    /// Queues `books` for `user_id`. The counter is raised by `books.len()` before this returns.
    pub fn enqueue(
        &self,
        user_id: &str,
        books: Vec<BookRequest>,
    ) -> Result<EnqueueReceipt, QueueError> {
        let batch_id = run_id::generate();
        let total = books.len();
        self.counter.add(total);

        let mut sent = 0usize;
        for book in books {
            let queued = QueuedBook {
                batch_id: batch_id.clone(),
                user_id: user_id.to_string(),
                book,
            };
            if self.tx.send(queued).is_err() {
                self.counter.release(total - sent);
                error!(%batch_id, "analysis queue closed; submission rejected");
                return Err(QueueError::Closed);
            }
            sent += 1;
        }

        info!(%batch_id, books = total, remaining = self.counter.current(), "books queued");
        Ok(EnqueueReceipt {
            batch_id,
            accepted: total,
        })
    }

    pub fn remaining(&self) -> usize {
        self.counter.current()
    }

    pub fn counter(&self) -> &ProcessingCounter {
        &self.counter
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<QueuedBook>,
    analyzer: Arc<dyn BookAnalyzer>,
    store: Arc<dyn LibraryStore>,
    counter: ProcessingCounter,
) {
    while let Some(queued) = rx.recv().await {
        let span = info_span!(
            "analysis_job",
            batch_id = %queued.batch_id,
            user_id = %queued.user_id,
        );

        let analyzer = analyzer.clone();
        let store = store.clone();
        let title = queued.book.title.clone();
        let batch_id = queued.batch_id.clone();

        // Run each book in its own task so a panic still releases the counter.
        let job = tokio::spawn(
            async move {
                process_book(
                    analyzer.as_ref(),
                    store.as_ref(),
                    &queued.user_id,
                    &queued.book,
                )
                .await
            }
            .instrument(span),
        );

        let outcome = match job.await {
            Ok(Ok(log)) => {
                info!(%batch_id, %title, log_id = %log.id, "book processed");
                "completed"
            }
            Ok(Err(err)) => {
                error!(%batch_id, %title, error = %err, "book processing failed; skipping");
                err.outcome()
            }
            Err(join_err) => {
                error!(%batch_id, %title, error = %join_err, "book processing task aborted");
                "panicked"
            }
        };

        metrics::counter!("bookmatch_queue_jobs_total", "outcome" => outcome).increment(1);
        counter.complete_one();
    }

    info!("analysis queue worker stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::SkillVector;
    use crate::analysis::BookAnalysis;
    use crate::store::{MemoryStore, ProfileStore};

    #[derive(Default)]
    struct FakeAnalyzer {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        seen: Mutex<Vec<String>>,
        gate: Option<Arc<Semaphore>>,
    }

    #[async_trait]
    impl BookAnalyzer for FakeAnalyzer {
        async fn analyze(
            &self,
            book_title: &str,
            _author: Option<&str>,
        ) -> Result<BookAnalysis, AnalysisError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.seen.lock().unwrap().push(book_title.to_string());

            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            } else {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if book_title == "boom" {
                return Err(AnalysisError::EmptyResponse);
            }
            if book_title == "crash" {
                panic!("analyzer crashed on {book_title}");
            }
            Ok(BookAnalysis {
                author: Some("someone".into()),
                summary: None,
                tags: vec![book_title.to_string()],
                points: SkillVector {
                    os_logic: 1,
                    ..SkillVector::default()
                },
            })
        }
    }

    fn books(titles: &[&str]) -> Vec<BookRequest> {
        titles
            .iter()
            .map(|t| BookRequest {
                title: t.to_string(),
                author: None,
            })
            .collect()
    }

    async fn wait_idle(counter: &ProcessingCounter) {
        tokio::time::timeout(Duration::from_secs(5), counter.wait_idle())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn enqueue_raises_counter_before_processing() {
        let gate = Arc::new(Semaphore::new(0));
        let analyzer = Arc::new(FakeAnalyzer {
            gate: Some(gate.clone()),
            ..FakeAnalyzer::default()
        });
        let store = Arc::new(MemoryStore::new());
        let counter = ProcessingCounter::new();
        let queue = AnalysisQueue::spawn(analyzer, store.clone(), counter.clone());

        let receipt = queue.enqueue("u1", books(&["a", "b", "c"])).unwrap();

        assert_eq!(receipt.accepted, 3);
        assert_eq!(receipt.batch_id.len(), 26);
        assert_eq!(counter.current(), 3);

        gate.add_permits(3);
        wait_idle(&counter).await;
        assert_eq!(store.logs().len(), 3);
    }

    #[tokio::test]
    async fn processes_fifo_across_batches_one_at_a_time() {
        let analyzer = Arc::new(FakeAnalyzer::default());
        let store = Arc::new(MemoryStore::new());
        let counter = ProcessingCounter::new();
        let queue = AnalysisQueue::spawn(analyzer.clone(), store.clone(), counter.clone());

        queue.enqueue("u1", books(&["first", "second"])).unwrap();
        queue.enqueue("u2", books(&["third"])).unwrap();
        wait_idle(&counter).await;

        assert_eq!(
            *analyzer.seen.lock().unwrap(),
            vec!["first", "second", "third"]
        );
        assert_eq!(analyzer.max_in_flight.load(Ordering::SeqCst), 1);
        let titles: Vec<String> = store.logs().into_iter().map(|l| l.book_title).collect();
        assert_eq!(titles, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn failed_book_is_skipped_and_still_counted_down() {
        let analyzer = Arc::new(FakeAnalyzer::default());
        let store = Arc::new(MemoryStore::new());
        let counter = ProcessingCounter::new();
        let queue = AnalysisQueue::spawn(analyzer, store.clone(), counter.clone());

        queue.enqueue("u1", books(&["a", "boom", "c"])).unwrap();
        wait_idle(&counter).await;

        let titles: Vec<String> = store.logs().into_iter().map(|l| l.book_title).collect();
        assert_eq!(titles, vec!["a", "c"]);
        assert_eq!(
            store.get_skill_vector("u1").await.unwrap().map(|s| s.os_logic),
            Some(2)
        );
        assert_eq!(queue.remaining(), 0);
    }

    #[tokio::test]
    async fn panicking_job_releases_counter_and_worker_keeps_going() {
        let analyzer = Arc::new(FakeAnalyzer::default());
        let store = Arc::new(MemoryStore::new());
        let counter = ProcessingCounter::new();
        let queue = AnalysisQueue::spawn(analyzer.clone(), store.clone(), counter.clone());

        queue.enqueue("u1", books(&["a", "crash", "c"])).unwrap();
        wait_idle(&counter).await;
        assert_eq!(queue.remaining(), 0);

        queue.enqueue("u1", books(&["after"])).unwrap();
        wait_idle(&counter).await;

        let titles: Vec<String> = store.logs().into_iter().map(|l| l.book_title).collect();
        assert_eq!(titles, vec!["a", "c", "after"]);
        assert_eq!(
            *analyzer.seen.lock().unwrap(),
            vec!["a", "crash", "c", "after"]
        );
        assert_eq!(queue.remaining(), 0);
    }

    #[tokio::test]
    async fn closed_queue_rolls_back_counter() {
        let counter = ProcessingCounter::new();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let queue = AnalysisQueue {
            tx,
            counter: counter.clone(),
        };

        let result = queue.enqueue("u1", books(&["a", "b"]));

        assert!(matches!(result, Err(QueueError::Closed)));
        assert_eq!(counter.current(), 0);
    }

    #[tokio::test]
    async fn process_book_reports_store_failure() {
        let analyzer = FakeAnalyzer::default();
        let store = MemoryStore::new();
        store.set_unavailable(true);

        let result = process_book(&analyzer, &store, "u1", &books(&["a"])[0]).await;

        assert!(matches!(result, Err(JobError::Save(_))));
    }
}
