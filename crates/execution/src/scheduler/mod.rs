//! Scheduler for agent task timing.
//!
//! Provides tag-addressable scheduling for:
//! - Recurring tasks at fixed intervals
//! - One-shot tasks that remove themselves when dispatched
//! - Bulk enable/disable/cancel of every task sharing a tag

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Future returned by a task handler.
pub type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Handler invoked each time a task runs.
pub type TaskHandler = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// Identifier of a scheduled task.
pub type TaskId = Uuid;

/// Wraps an async closure into a [`TaskHandler`].
pub fn task_handler<F, Fut>(f: F) -> TaskHandler
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

/// Schedule type for task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Run at fixed intervals.
    Interval(Duration),
    /// Run once after delay.
    Once(Duration),
}

impl Schedule {
    fn delay(&self) -> Duration {
        match self {
            Self::Interval(d) | Self::Once(d) => *d,
        }
    }

    /// Whether the task runs more than once.
    pub fn is_recurring(&self) -> bool {
        matches!(self, Self::Interval(_))
    }
}

struct ScheduledTask {
    id: TaskId,
    name: String,
    handler: TaskHandler,
    schedule: Schedule,
    next_run: Instant,
    last_run: Option<Instant>,
    tags: Vec<String>,
    enabled: bool,
    /// Set while a previous run of this task is still executing.
    in_flight: Arc<AtomicBool>,
}

impl ScheduledTask {
    fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.id,
            name: self.name.clone(),
            schedule: self.schedule,
            next_run: self.next_run,
            last_run: self.last_run,
            tags: self.tags.clone(),
            enabled: self.enabled,
            in_flight: self.in_flight.load(Ordering::SeqCst),
        }
    }

    fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Read-only view of a scheduled task.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    /// Task id.
    pub id: TaskId,
    /// Task name.
    pub name: String,
    /// Schedule.
    pub schedule: Schedule,
    /// Next scheduled run.
    pub next_run: Instant,
    /// Last run time.
    pub last_run: Option<Instant>,
    /// Tags.
    pub tags: Vec<String>,
    /// Whether task is enabled.
    pub enabled: bool,
    /// Whether a run is currently executing.
    pub in_flight: bool,
}

/// A task picked for execution in the current tick.
struct DueTask {
    id: TaskId,
    name: String,
    handler: TaskHandler,
    scheduled_at: Instant,
    in_flight: Arc<AtomicBool>,
}

/// Cooperative scheduler dispatching due tasks onto their own Tokio tasks.
///
/// The loop never waits on a handler, so a slow task of one agent does not
/// hold back the tasks of another. A task whose previous run is still
/// executing is skipped until that run finishes.
pub struct ScheduledTaskManager {
    /// Scheduled tasks by id.
    tasks: Arc<RwLock<HashMap<TaskId, ScheduledTask>>>,
    /// Handler runs that have been dispatched and not yet reaped.
    runs: Mutex<JoinSet<()>>,
    /// Loop period.
    tick: Duration,
    /// Running flag.
    running: Arc<AtomicBool>,
}

impl ScheduledTaskManager {
    /// Creates a scheduler ticking every second.
    pub fn new() -> Self {
        Self::with_tick(Duration::from_secs(1))
    }

    /// Creates a scheduler with a custom loop period.
    pub fn with_tick(tick: Duration) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            runs: Mutex::new(JoinSet::new()),
            tick,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Adds a task, returning its id.
    pub async fn schedule(
        &self,
        name: impl Into<String>,
        schedule: Schedule,
        tags: Vec<String>,
        handler: TaskHandler,
    ) -> TaskId {
        let task = ScheduledTask {
            id: Uuid::new_v4(),
            name: name.into(),
            handler,
            schedule,
            next_run: Instant::now() + schedule.delay(),
            last_run: None,
            tags,
            enabled: true,
            in_flight: Arc::new(AtomicBool::new(false)),
        };
        let id = task.id;

        info!(
            task = %task.name,
            task_id = %id,
            schedule = ?task.schedule,
            tags = ?task.tags,
            "Adding task to scheduler"
        );
        self.tasks.write().await.insert(id, task);
        id
    }

    /// Adds a task that runs every `every`.
    pub async fn schedule_recurring(
        &self,
        name: impl Into<String>,
        every: Duration,
        tags: Vec<String>,
        handler: TaskHandler,
    ) -> TaskId {
        self.schedule(name, Schedule::Interval(every), tags, handler)
            .await
    }

    /// Adds a task that runs once after `delay`.
    pub async fn schedule_once(
        &self,
        name: impl Into<String>,
        delay: Duration,
        tags: Vec<String>,
        handler: TaskHandler,
    ) -> TaskId {
        self.schedule(name, Schedule::Once(delay), tags, handler)
            .await
    }

    /// Removes a task. Returns `false` if it did not exist.
    pub async fn cancel(&self, id: TaskId) -> bool {
        let removed = self.tasks.write().await.remove(&id);
        if let Some(task) = &removed {
            debug!(task = %task.name, task_id = %id, "Task cancelled");
        }
        removed.is_some()
    }

    /// Removes every task carrying `tag`, returning how many were removed.
    pub async fn cancel_by_tag(&self, tag: &str) -> usize {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, task| !task.has_tag(tag));
        let removed = before - tasks.len();
        info!(tag = tag, removed = removed, "Cancelled tasks by tag");
        removed
    }

    /// Enables a task by id.
    pub async fn enable_task(&self, id: TaskId) -> bool {
        self.set_enabled(id, true).await
    }

    /// Disables a task by id.
    pub async fn disable_task(&self, id: TaskId) -> bool {
        self.set_enabled(id, false).await
    }

    async fn set_enabled(&self, id: TaskId, enabled: bool) -> bool {
        match self.tasks.write().await.get_mut(&id) {
            Some(task) => {
                task.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Enables every task carrying `tag`.
    pub async fn enable_by_tag(&self, tag: &str) -> usize {
        self.set_enabled_by_tag(tag, true).await
    }

    /// Disables every task carrying `tag`.
    pub async fn disable_by_tag(&self, tag: &str) -> usize {
        self.set_enabled_by_tag(tag, false).await
    }

    async fn set_enabled_by_tag(&self, tag: &str, enabled: bool) -> usize {
        let mut tasks = self.tasks.write().await;
        let mut changed = 0;
        for task in tasks.values_mut().filter(|t| t.has_tag(tag)) {
            task.enabled = enabled;
            changed += 1;
        }
        debug!(tag = tag, enabled = enabled, changed = changed, "Toggled tasks by tag");
        changed
    }

    /// Gets all tasks carrying `tag`.
    pub async fn tasks_with_tag(&self, tag: &str) -> Vec<TaskInfo> {
        self.tasks
            .read()
            .await
            .values()
            .filter(|t| t.has_tag(tag))
            .map(ScheduledTask::info)
            .collect()
    }

    /// Gets all tasks.
    pub async fn tasks(&self) -> Vec<TaskInfo> {
        self.tasks
            .read()
            .await
            .values()
            .map(ScheduledTask::info)
            .collect()
    }

    /// Number of scheduled tasks.
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Whether no task is scheduled.
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    /// Dispatches every enabled task due at `now`, returning how many were
    /// dispatched.
    ///
    /// Recurring tasks are rescheduled to `now + interval` at dispatch, so a
    /// late tick never produces catch-up runs. One-shot tasks are removed at
    /// dispatch. Handlers run on their own Tokio tasks; errors and panics are
    /// logged when the run finishes.
    pub async fn run_pending(&self, now: Instant) -> usize {
        let mut due = {
            let mut tasks = self.tasks.write().await;
            let mut due = Vec::new();
            let mut finished = Vec::new();

            for task in tasks.values_mut() {
                if !task.enabled || task.next_run > now {
                    continue;
                }
                if task.in_flight.swap(true, Ordering::SeqCst) {
                    debug!(task = %task.name, task_id = %task.id, "Previous run still active, skipping");
                    continue;
                }

                due.push(DueTask {
                    id: task.id,
                    name: task.name.clone(),
                    handler: Arc::clone(&task.handler),
                    scheduled_at: task.next_run,
                    in_flight: Arc::clone(&task.in_flight),
                });

                task.last_run = Some(now);
                match task.schedule {
                    Schedule::Interval(every) => task.next_run = now + every,
                    Schedule::Once(_) => finished.push(task.id),
                }
            }
            for id in finished {
                tasks.remove(&id);
            }
            due
        };
        due.sort_by_key(|t| t.scheduled_at);

        let dispatched = due.len();
        let mut runs = self.runs.lock().await;
        Self::reap(&mut runs);
        for task in due {
            debug!(task = %task.name, task_id = %task.id, "Task triggered");
            runs.spawn(async move {
                match tokio::spawn((task.handler)()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(task = %task.name, task_id = %task.id, error = %e, "Task handler failed");
                    }
                    Err(e) => {
                        error!(task = %task.name, task_id = %task.id, error = %e, "Task handler panicked");
                    }
                }
                task.in_flight.store(false, Ordering::SeqCst);
            });
        }

        dispatched
    }

    fn reap(runs: &mut JoinSet<()>) {
        while let Some(result) = runs.try_join_next() {
            if let Err(e) = result {
                error!(error = %e, "Task run aborted");
            }
        }
    }

    /// Waits for every dispatched run to finish.
    pub async fn wait_idle(&self) {
        let mut runs = self.runs.lock().await;
        while let Some(result) = runs.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Task run aborted");
            }
        }
    }

    /// Starts the scheduler loop on a Tokio task.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let manager = Arc::clone(self);

        tokio::spawn(async move {
            info!(tick_ms = manager.tick.as_millis() as u64, "Starting scheduler");

            let mut ticker = interval(manager.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            while manager.running.load(Ordering::SeqCst) {
                ticker.tick().await;
                manager.run_pending(Instant::now()).await;
            }

            info!("Scheduler stopped");
        })
    }

    /// Stops the scheduler after the current tick.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Checks if the scheduler is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for ScheduledTaskManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting(counter: &Arc<AtomicUsize>) -> TaskHandler {
        let counter = Arc::clone(counter);
        task_handler(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    fn tags(tag: &str) -> Vec<String> {
        vec![tag.to_string()]
    }

    #[tokio::test]
    async fn test_recurring_task_runs_once_per_due_tick() {
        let scheduler = ScheduledTaskManager::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let every = Duration::from_secs(60);
        scheduler
            .schedule_recurring("check", every, tags("agent:a"), counting(&counter))
            .await;

        assert_eq!(scheduler.run_pending(Instant::now()).await, 0);

        let later = Instant::now() + every + Duration::from_secs(1);
        assert_eq!(scheduler.run_pending(later).await, 1);
        scheduler.wait_idle().await;
        assert_eq!(scheduler.run_pending(later).await, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let info = &scheduler.tasks().await[0];
        assert_eq!(info.next_run, later + every);
    }

    #[tokio::test]
    async fn test_missed_ticks_do_not_burst() {
        let scheduler = ScheduledTaskManager::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let every = Duration::from_secs(10);
        scheduler
            .schedule_recurring("check", every, vec![], counting(&counter))
            .await;

        let much_later = Instant::now() + every * 10;
        assert_eq!(scheduler.run_pending(much_later).await, 1);
        scheduler.wait_idle().await;
        assert_eq!(scheduler.run_pending(much_later).await, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_one_shot_task_removes_itself() {
        let scheduler = ScheduledTaskManager::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .schedule_once("once", Duration::ZERO, vec![], counting(&counter))
            .await;

        assert_eq!(scheduler.run_pending(Instant::now()).await, 1);
        assert!(scheduler.is_empty().await);
        scheduler.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_and_panicking_handlers_do_not_stop_others() {
        let scheduler = ScheduledTaskManager::new();
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler
            .schedule_once(
                "fails",
                Duration::ZERO,
                vec![],
                task_handler(|| async { anyhow::bail!("boom") }),
            )
            .await;
        scheduler
            .schedule_once(
                "panics",
                Duration::ZERO,
                vec![],
                task_handler(|| async { panic!("handler panic") }),
            )
            .await;
        scheduler
            .schedule_once("counts", Duration::ZERO, vec![], counting(&counter))
            .await;

        assert_eq!(scheduler.run_pending(Instant::now()).await, 3);
        assert!(scheduler.is_empty().await);
        scheduler.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_by_tag_leaves_other_tags_untouched() {
        let scheduler = ScheduledTaskManager::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let every = Duration::from_secs(30);

        for name in ["health", "market", "optimize"] {
            scheduler
                .schedule_recurring(name, every, tags("agent:x"), counting(&counter))
                .await;
            scheduler
                .schedule_recurring(name, every, tags("agent:y"), counting(&counter))
                .await;
        }

        assert_eq!(scheduler.cancel_by_tag("agent:x").await, 3);
        assert!(scheduler.tasks_with_tag("agent:x").await.is_empty());
        assert_eq!(scheduler.tasks_with_tag("agent:y").await.len(), 3);
    }

    #[tokio::test]
    async fn test_disable_by_tag_suppresses_runs() {
        let scheduler = ScheduledTaskManager::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let every = Duration::from_secs(5);
        scheduler
            .schedule_recurring("a", every, tags("agent:x"), counting(&counter))
            .await;
        scheduler
            .schedule_recurring("b", every, tags("agent:x"), counting(&counter))
            .await;

        assert_eq!(scheduler.disable_by_tag("agent:x").await, 2);
        let later = Instant::now() + every * 2;
        assert_eq!(scheduler.run_pending(later).await, 0);

        assert_eq!(scheduler.enable_by_tag("agent:x").await, 2);
        assert_eq!(scheduler.run_pending(later).await, 2);
        scheduler.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancel_suppresses_future_runs_only() {
        let scheduler = Arc::new(ScheduledTaskManager::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let every = Duration::from_secs(10);

        let victim = scheduler
            .schedule_recurring("victim", every, vec![], counting(&counter))
            .await;
        let handle = Arc::clone(&scheduler);
        scheduler
            .schedule_once(
                "canceller",
                every,
                vec![],
                task_handler(move || {
                    let handle = Arc::clone(&handle);
                    async move {
                        handle.cancel(victim).await;
                        Ok(())
                    }
                }),
            )
            .await;

        let later = Instant::now() + every;
        assert_eq!(scheduler.run_pending(later).await, 2);
        scheduler.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        assert_eq!(scheduler.run_pending(later + every * 2).await, 0);
        assert!(scheduler.is_empty().await);
    }

    #[tokio::test]
    async fn test_task_is_not_dispatched_while_previous_run_is_active() {
        let scheduler = ScheduledTaskManager::new();
        let release = Arc::new(tokio::sync::Notify::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let every = Duration::from_secs(1);

        let gate = Arc::clone(&release);
        let starts = Arc::clone(&counter);
        scheduler
            .schedule_recurring(
                "slow",
                every,
                tags("agent:a"),
                task_handler(move || {
                    let gate = Arc::clone(&gate);
                    let starts = Arc::clone(&starts);
                    async move {
                        starts.fetch_add(1, Ordering::SeqCst);
                        gate.notified().await;
                        Ok(())
                    }
                }),
            )
            .await;

        let first = Instant::now() + every;
        assert_eq!(scheduler.run_pending(first).await, 1);
        assert!(scheduler.tasks().await[0].in_flight);
        assert_eq!(scheduler.run_pending(first + every * 5).await, 0);

        release.notify_one();
        scheduler.wait_idle().await;
        assert!(!scheduler.tasks().await[0].in_flight);
        assert_eq!(scheduler.run_pending(first + every * 10).await, 1);
        release.notify_one();
        scheduler.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_agent_does_not_starve_other_agents() {
        let scheduler = Arc::new(ScheduledTaskManager::new());
        let slow_starts = Arc::new(AtomicUsize::new(0));
        let fast_runs = Arc::new(AtomicUsize::new(0));
        let every = Duration::from_secs(1);

        let starts = Arc::clone(&slow_starts);
        scheduler
            .schedule_recurring(
                "awaiting-confirmation",
                every,
                tags("agent:a"),
                task_handler(move || {
                    let starts = Arc::clone(&starts);
                    async move {
                        starts.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(())
                    }
                }),
            )
            .await;
        scheduler
            .schedule_recurring("health", every, tags("agent:b"), counting(&fast_runs))
            .await;

        let _loop = scheduler.start();
        tokio::time::sleep(Duration::from_secs(30)).await;
        scheduler.stop();

        assert!(fast_runs.load(Ordering::SeqCst) >= 25);
        assert_eq!(slow_starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_loop_runs_due_tasks() {
        let scheduler = Arc::new(ScheduledTaskManager::new());
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .schedule_recurring("tick", Duration::from_secs(5), vec![], counting(&counter))
            .await;

        let handle = scheduler.start();
        assert!(scheduler.is_running());

        tokio::time::sleep(Duration::from_millis(12_500)).await;
        scheduler.stop();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(handle.is_finished());
    }
}
