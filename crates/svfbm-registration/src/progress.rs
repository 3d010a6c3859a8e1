//! Progress reporting for registration runs.
//!
//! The run owns a [`ProgressSink`] that counts finished block-matching
//! iterations and forwards events to every registered [`ProgressObserver`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use indicatif::{ProgressBar, ProgressStyle};
use crate::bridge::RegistrationState;

/// Snapshot passed to observers after each iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressInfo {
    /// Iterations finished so far, over all levels.
    pub completed: usize,
    /// Planned iterations: processed levels times the per-level cap.
    pub total: usize,
    /// Pyramid level, 0 is the coarsest.
    pub level: usize,
    /// Iteration inside the level, starting at 1.
    pub iteration: usize,
    /// Largest update vector of the iteration, in physical units.
    pub update_norm: f64,
    /// Blocks that produced an estimate in the iteration.
    pub matched_blocks: usize,
    pub elapsed: Duration,
}

impl ProgressInfo {
    pub fn progress_percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.completed.min(self.total) as f64 / self.total as f64) * 100.0
    }

    pub fn estimated_remaining(&self) -> Option<Duration> {
        if self.completed == 0 {
            return None;
        }
        let per_iteration = self.elapsed.as_secs_f64() / self.completed as f64;
        let remaining = self.total.saturating_sub(self.completed);
        Some(Duration::from_secs_f64(per_iteration * remaining as f64))
    }
}

/// Receives run events. Implementations must return quickly.
pub trait ProgressObserver: Send + Sync {
    /// Called once iteration progress is known.
    fn on_progress(&self, info: &ProgressInfo);

    fn on_start(&self, _total: usize) {}

    fn on_level_start(&self, _level: usize, _levels: usize, _size: [usize; 3]) {}

    fn on_complete(&self, _state: RegistrationState) {}

    fn on_error(&self, _error: &str) {}
}

/// Progress counter shared by the stages of one run.
#[derive(Clone)]
pub struct ProgressSink {
    observers: Vec<Arc<dyn ProgressObserver>>,
    completed: Arc<AtomicUsize>,
    total: usize,
    started: Instant,
}

impl ProgressSink {
    pub fn new(observers: Vec<Arc<dyn ProgressObserver>>, total: usize) -> Self {
        Self {
            observers,
            completed: Arc::new(AtomicUsize::new(0)),
            total,
            started: Instant::now(),
        }
    }

    /// A sink without observers.
    pub fn silent(total: usize) -> Self {
        Self::new(Vec::new(), total)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn start(&self) {
        for observer in &self.observers {
            observer.on_start(self.total);
        }
    }

    pub fn level_start(&self, level: usize, levels: usize, size: [usize; 3]) {
        for observer in &self.observers {
            observer.on_level_start(level, levels, size);
        }
    }

    /// Count one finished iteration and notify observers.
    pub fn iteration_done(&self, level: usize, iteration: usize, update_norm: f64, matched_blocks: usize) {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        let info = ProgressInfo {
            completed,
            total: self.total,
            level,
            iteration,
            update_norm,
            matched_blocks,
            elapsed: self.started.elapsed(),
        };
        for observer in &self.observers {
            observer.on_progress(&info);
        }
    }

    /// Account for iterations a level did not need after converging early.
    pub fn skip(&self, iterations: usize) {
        self.completed.fetch_add(iterations, Ordering::SeqCst);
    }

    pub fn complete(&self, state: RegistrationState) {
        for observer in &self.observers {
            observer.on_complete(state);
        }
    }

    pub fn error(&self, error: &str) {
        for observer in &self.observers {
            observer.on_error(error);
        }
    }
}

/// Logs progress through `tracing`.
#[derive(Debug, Clone)]
pub struct TracingProgressObserver {
    /// Log every n-th iteration.
    pub log_interval: usize,
}

impl Default for TracingProgressObserver {
    fn default() -> Self {
        Self { log_interval: 1 }
    }
}

impl TracingProgressObserver {
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
        }
    }
}

impl ProgressObserver for TracingProgressObserver {
    fn on_progress(&self, info: &ProgressInfo) {
        if info.completed % self.log_interval != 0 && info.completed != info.total {
            return;
        }
        let remaining = info
            .estimated_remaining()
            .map(|d| format!("{:.2}s", d.as_secs_f64()))
            .unwrap_or_else(|| "N/A".to_string());
        tracing::info!(
            "Level {} iter {} | {}/{} ({:.1}%) | max update: {:.6} | blocks: {} | Elapsed: {:.2}s | ETA: {}",
            info.level,
            info.iteration,
            info.completed,
            info.total,
            info.progress_percent(),
            info.update_norm,
            info.matched_blocks,
            info.elapsed.as_secs_f64(),
            remaining
        );
    }

    fn on_start(&self, total: usize) {
        tracing::info!(total_iterations = total, "Registration started");
    }

    fn on_level_start(&self, level: usize, levels: usize, size: [usize; 3]) {
        tracing::info!("Processing pyramid level {}/{} (size {:?})", level + 1, levels, size);
    }

    fn on_complete(&self, state: RegistrationState) {
        tracing::info!(?state, "Registration finished");
    }

    fn on_error(&self, error: &str) {
        tracing::error!("Registration failed: {}", error);
    }
}

/// Records every progress event.
#[derive(Debug, Clone, Default)]
pub struct HistoryObserver {
    history: Arc<Mutex<Vec<ProgressInfo>>>,
    levels: Arc<Mutex<Vec<usize>>>,
    outcome: Arc<Mutex<Option<RegistrationState>>>,
    errors: Arc<Mutex<Vec<String>>>,
}

impl HistoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<ProgressInfo> {
        lock(&self.history).clone()
    }

    /// Levels in the order they started.
    pub fn levels(&self) -> Vec<usize> {
        lock(&self.levels).clone()
    }

    pub fn outcome(&self) -> Option<RegistrationState> {
        *lock(&self.outcome)
    }

    pub fn errors(&self) -> Vec<String> {
        lock(&self.errors).clone()
    }

    pub fn clear(&self) {
        lock(&self.history).clear();
        lock(&self.levels).clear();
        lock(&self.errors).clear();
        *lock(&self.outcome) = None;
    }
}

impl ProgressObserver for HistoryObserver {
    fn on_progress(&self, info: &ProgressInfo) {
        lock(&self.history).push(info.clone());
    }

    fn on_level_start(&self, level: usize, _levels: usize, _size: [usize; 3]) {
        lock(&self.levels).push(level);
    }

    fn on_complete(&self, state: RegistrationState) {
        *lock(&self.outcome) = Some(state);
    }

    fn on_error(&self, error: &str) {
        lock(&self.errors).push(error.to_string());
    }
}

/// A poisoned lock only means another observer call panicked; the data is
/// still a valid log.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Terminal progress bar.
#[derive(Clone)]
pub struct ProgressBarObserver {
    bar: ProgressBar,
}

impl ProgressBarObserver {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg} ({eta})")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self { bar }
    }

    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }
}

impl Default for ProgressBarObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for ProgressBarObserver {
    fn on_progress(&self, info: &ProgressInfo) {
        self.bar.set_position(info.completed as u64);
        self.bar.set_message(format!("level {} | max update {:.4}", info.level, info.update_norm));
    }

    fn on_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
    }

    fn on_complete(&self, state: RegistrationState) {
        self.bar.finish_with_message(format!("{:?}", state));
    }

    fn on_error(&self, error: &str) {
        self.bar.abandon_with_message(error.to_string());
    }
}
