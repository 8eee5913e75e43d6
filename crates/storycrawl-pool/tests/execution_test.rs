//! Integration tests for ExecutionService using in-memory workers.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use storycrawl_pool::{ExecutionError, ExecutionService, Worker};
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
enum TestError {
  #[error("render failed for {0}")]
  Render(String),
  #[error("worker {0} refused to boot")]
  Boot(usize),
  #[error("worker {0} refused to close")]
  Close(usize),
}

#[derive(Debug, Clone)]
struct TestTask {
  id: String,
  delay_ms: u64,
}

fn tasks(count: usize) -> Vec<TestTask> {
  (0..count)
    .map(|i| TestTask {
      id: format!("T{}", i),
      // Later tasks finish first so completion order differs from input order.
      delay_ms: ((count - i) * 3) as u64,
    })
    .collect()
}

/// A worker that records what it processed and fails the test if it is ever
/// asked to run two jobs at once.
struct TestWorker {
  slot: usize,
  busy: AtomicBool,
  processed: Mutex<Vec<String>>,
  closed: AtomicBool,
  fail_close: bool,
}

impl TestWorker {
  fn new(slot: usize) -> Self {
    Self {
      slot,
      busy: AtomicBool::new(false),
      processed: Mutex::new(Vec::new()),
      closed: AtomicBool::new(false),
      fail_close: false,
    }
  }

  async fn render(&self, task: &TestTask) -> Result<String, TestError> {
    assert!(
      !self.busy.swap(true, Ordering::SeqCst),
      "worker {} ran two tasks concurrently",
      self.slot
    );
    tokio::time::sleep(Duration::from_millis(task.delay_ms)).await;
    self.processed.lock().unwrap().push(task.id.clone());
    self.busy.store(false, Ordering::SeqCst);
    Ok(format!("<html>{}</html>", task.id))
  }
}

#[async_trait]
impl Worker for TestWorker {
  type Error = TestError;

  fn slot(&self) -> usize {
    self.slot
  }

  async fn close(&self) -> Result<(), TestError> {
    self.closed.store(true, Ordering::SeqCst);
    if self.fail_close {
      return Err(TestError::Close(self.slot));
    }
    Ok(())
  }
}

fn pool(size: usize) -> ExecutionService<TestWorker> {
  ExecutionService::new((0..size).map(TestWorker::new).collect())
}

/// Binds a task to a job that renders it on whichever worker claims it.
fn render(task: &TestTask) -> impl FnOnce(Arc<TestWorker>) -> RenderFuture + use<> {
  let task = task.clone();
  move |worker: Arc<TestWorker>| -> RenderFuture { Box::pin(async move { worker.render(&task).await }) }
}

type RenderFuture = Pin<Box<dyn Future<Output = Result<String, TestError>> + Send>>;
type RenderJob = Box<dyn FnOnce(Arc<TestWorker>) -> RenderFuture + Send>;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_outcomes_follow_task_order() {
  let service = pool(2);

  let outcomes = service
    .execute(tasks(4), render, CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(
    outcomes,
    vec![
      "<html>T0</html>",
      "<html>T1</html>",
      "<html>T2</html>",
      "<html>T3</html>",
    ]
  );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_task_processed_exactly_once() {
  for workers in 1..=5 {
    for count in [0, 1, 2, 3, 7, 16] {
      let service = pool(workers);
      let claims: Arc<Vec<AtomicUsize>> = Arc::new((0..count).map(|_| AtomicUsize::new(0)).collect());

      let counter = Arc::clone(&claims);
      let outcomes = service
        .execute(
          (0..count).collect::<Vec<usize>>(),
          move |index: &usize| {
            let index = *index;
            let claims = Arc::clone(&counter);
            move |_worker: Arc<TestWorker>| async move {
              claims[index].fetch_add(1, Ordering::SeqCst);
              tokio::time::sleep(Duration::from_millis((index % 3) as u64)).await;
              Ok::<_, TestError>(index)
            }
          },
          CancellationToken::new(),
        )
        .await
        .unwrap();

      assert_eq!(outcomes, (0..count).collect::<Vec<_>>());
      for (index, claim) in claims.iter().enumerate() {
        assert_eq!(
          claim.load(Ordering::SeqCst),
          1,
          "task {} claimed wrong number of times with {} workers",
          index,
          workers
        );
      }
    }
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_work_is_shared_between_workers() {
  let service = pool(2);

  service
    .execute(tasks(6), render, CancellationToken::new())
    .await
    .unwrap();

  let mut all: Vec<String> = Vec::new();
  for worker in service.workers() {
    let processed = worker.processed.lock().unwrap().clone();
    assert!(!processed.is_empty(), "worker {} did no work", worker.slot);
    all.extend(processed);
  }
  all.sort();
  assert_eq!(all, vec!["T0", "T1", "T2", "T3", "T4", "T5"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_surplus_workers_stay_idle() {
  let service = pool(5);

  let outcomes = service
    .execute(tasks(2), render, CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(outcomes, vec!["<html>T0</html>", "<html>T1</html>"]);
  let idle = service
    .workers()
    .iter()
    .filter(|w| w.processed.lock().unwrap().is_empty())
    .count();
  assert_eq!(idle, 3);
}

#[tokio::test]
async fn test_empty_input_invokes_no_worker() {
  let invoked = Arc::new(AtomicUsize::new(0));

  for size in [0, 3] {
    let service = pool(size);
    let counter = Arc::clone(&invoked);
    let outcomes = service
      .execute(
        Vec::<TestTask>::new(),
        move |task: &TestTask| {
          counter.fetch_add(1, Ordering::SeqCst);
          render(task)
        },
        CancellationToken::new(),
      )
      .await
      .unwrap();

    assert!(outcomes.is_empty());
  }

  assert_eq!(invoked.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_pool_rejects_tasks() {
  let service = pool(0);

  let result = service
    .execute(tasks(2), render, CancellationToken::new())
    .await;

  assert!(matches!(result, Err(ExecutionError::EmptyPool { tasks: 2 })));
}

fn render_failing_on(failing: &'static str) -> impl Fn(&TestTask) -> RenderJob + Send + Sync + 'static {
  move |task: &TestTask| -> RenderJob {
    let task = task.clone();
    Box::new(move |worker: Arc<TestWorker>| -> RenderFuture {
      Box::pin(async move {
        if task.id == failing {
          return Err(TestError::Render(task.id));
        }
        worker.render(&task).await
      })
    })
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_aborts_whole_batch() {
  let service = pool(2);

  let result = service
    .execute(tasks(4), render_failing_on("T2"), CancellationToken::new())
    .await;

  match result {
    Err(ExecutionError::Task { index, source, .. }) => {
      assert_eq!(index, 2);
      assert_eq!(source.to_string(), "render failed for T2");
    }
    other => panic!("expected task failure, got {:?}", other.map(|o| o.len())),
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_stops_other_lanes() {
  let service = pool(2);
  let started = Arc::new(AtomicUsize::new(0));

  let counter = Arc::clone(&started);
  let result = service
    .execute(
      (0..50).collect::<Vec<usize>>(),
      move |index: &usize| {
        let index = *index;
        let started = Arc::clone(&counter);
        move |_worker: Arc<TestWorker>| async move {
          started.fetch_add(1, Ordering::SeqCst);
          if index == 0 {
            return Err(TestError::Render(index.to_string()));
          }
          tokio::time::sleep(Duration::from_millis(20)).await;
          Ok(index)
        }
      },
      CancellationToken::new(),
    )
    .await;

  assert!(matches!(result, Err(ExecutionError::Task { index: 0, .. })));
  assert!(started.load(Ordering::SeqCst) < 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_collect_keeps_every_outcome() {
  let service = pool(2);

  let outcomes = service
    .execute_collect(tasks(4), render_failing_on("T2"), CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(outcomes.len(), 4);
  assert_eq!(outcomes[0].as_deref().unwrap(), "<html>T0</html>");
  assert_eq!(outcomes[1].as_deref().unwrap(), "<html>T1</html>");
  assert!(matches!(&outcomes[2], Err(TestError::Render(id)) if id == "T2"));
  assert_eq!(outcomes[3].as_deref().unwrap(), "<html>T3</html>");
}

#[tokio::test]
async fn test_cancelled_before_start() {
  let service = pool(2);
  let cancel = CancellationToken::new();
  cancel.cancel();

  let result = service.execute(tasks(4), render, cancel).await;

  assert!(matches!(result, Err(ExecutionError::Cancelled)));
  for worker in service.workers() {
    assert!(worker.processed.lock().unwrap().is_empty());
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancelled_during_execution() {
  let service = pool(2);
  let cancel = CancellationToken::new();

  let canceller = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(10)).await;
    canceller.cancel();
  });

  let result = service
    .execute(
      (0..10).collect::<Vec<usize>>(),
      |index: &usize| {
        let index = *index;
        move |_worker: Arc<TestWorker>| async move {
          tokio::time::sleep(Duration::from_secs(5)).await;
          Ok::<_, TestError>(index)
        }
      },
      cancel,
    )
    .await;

  assert!(matches!(result, Err(ExecutionError::Cancelled)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panicking_job_fails_the_call() {
  let service = pool(2);

  let result = service
    .execute(
      (0..4).collect::<Vec<usize>>(),
      |index: &usize| {
        let index = *index;
        move |_worker: Arc<TestWorker>| async move {
          if index == 1 {
            panic!("job exploded");
          }
          Ok::<_, TestError>(index)
        }
      },
      CancellationToken::new(),
    )
    .await;

  assert!(matches!(result, Err(ExecutionError::LanePanicked { .. })));
}

#[tokio::test]
async fn test_boot_failure_closes_booted_workers() {
  let booted: Arc<Mutex<Vec<Arc<AtomicBool>>>> = Arc::new(Mutex::new(Vec::new()));

  let registry = Arc::clone(&booted);
  let result = ExecutionService::<ClosingWorker>::boot(3, move |slot| {
    let registry = Arc::clone(&registry);
    async move {
      if slot == 1 {
        return Err(TestError::Boot(slot));
      }
      let closed = Arc::new(AtomicBool::new(false));
      registry.lock().unwrap().push(Arc::clone(&closed));
      Ok(ClosingWorker { slot, closed })
    }
  })
  .await;

  assert!(matches!(result, Err(TestError::Boot(1))));
  let booted = booted.lock().unwrap();
  assert_eq!(booted.len(), 2);
  assert!(booted.iter().all(|closed| closed.load(Ordering::SeqCst)));
}

struct ClosingWorker {
  slot: usize,
  closed: Arc<AtomicBool>,
}

#[async_trait]
impl Worker for ClosingWorker {
  type Error = TestError;

  fn slot(&self) -> usize {
    self.slot
  }

  async fn close(&self) -> Result<(), TestError> {
    self.closed.store(true, Ordering::SeqCst);
    Ok(())
  }
}

#[tokio::test]
async fn test_shutdown_closes_every_worker_despite_errors() {
  let mut workers: Vec<TestWorker> = (0..3).map(TestWorker::new).collect();
  workers[0].fail_close = true;
  let service = ExecutionService::new(workers);
  let handles: Vec<Arc<TestWorker>> = service.workers().to_vec();

  let result = service.shutdown().await;

  assert!(matches!(result, Err(TestError::Close(0))));
  assert!(handles.iter().all(|w| w.closed.load(Ordering::SeqCst)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_service_is_reusable_across_batches() {
  let service = pool(3);

  let first = service
    .execute(tasks(5), render, CancellationToken::new())
    .await
    .unwrap();
  let second = service
    .execute(tasks(2), render, CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(first.len(), 5);
  assert_eq!(second, vec!["<html>T0</html>", "<html>T1</html>"]);
}
