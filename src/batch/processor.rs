use super::window::merge_window;
use crate::event::CapturedEvent;
use crate::sink::FlowSink;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

const MIN_INTERVAL: Duration = Duration::from_millis(1);
/// Longest supported window
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// The two window buffers and which one is accepting inserts.
///
/// Guarded as a unit: the index and the append are never observed apart.
struct WindowBuffers {
    slots: [Vec<CapturedEvent>; 2],
    active: usize,
}

/// Outcome of one rotation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationSummary {
    /// Events drained from the retired buffer
    pub events: usize,
    /// Records handed to the sink
    pub flows: usize,
    /// Sink calls that panicked
    pub failed: usize,
}

/// Double-buffered event batcher.
///
/// `insert` appends to the active buffer; `rotate` retires it, merges its
/// events per flow and hands each record to a sink. The merge and sink calls
/// run without holding the buffer lock, so inserts continue into the other
/// buffer while a slow sink is being served.
pub struct BatchProcessor {
    buffers: Mutex<WindowBuffers>,
    /// Serializes rotations (timer tick vs. manual drain)
    rotation: Mutex<()>,
}

impl BatchProcessor {
    pub fn new() -> Self {
        Self {
            buffers: Mutex::new(WindowBuffers {
                slots: [Vec::new(), Vec::new()],
                active: 0,
            }),
            rotation: Mutex::new(()),
        }
    }

    /// Admit one event into the current window
    pub fn insert(&self, event: CapturedEvent) {
        let mut buffers = self.lock_buffers();
        let active = buffers.active;
        buffers.slots[active].push(event);
    }

    /// Number of events waiting in the active buffer
    pub fn pending(&self) -> usize {
        let buffers = self.lock_buffers();
        buffers.slots[buffers.active].len()
    }

    /// Close the current window and emit one record per flow to `sink`.
    ///
    /// A panic inside the sink is contained to that record; the remaining
    /// records are still delivered and the processor stays usable.
    pub fn rotate(&self, sink: &dyn FlowSink) -> RotationSummary {
        let _rotation = self.rotation.lock().unwrap_or_else(PoisonError::into_inner);
        let started = std::time::Instant::now();

        let (retired, mut drained) = {
            let mut buffers = self.lock_buffers();
            let retired = buffers.active;
            buffers.active = 1 - retired;
            (retired, std::mem::take(&mut buffers.slots[retired]))
        };

        let events = drained.len();
        let flows = merge_window(&mut drained);
        let mut summary = RotationSummary {
            events,
            flows: flows.len(),
            failed: 0,
        };

        for record in flows {
            let key = record.key.clone();
            if panic::catch_unwind(AssertUnwindSafe(|| sink.accept(record))).is_err() {
                summary.failed += 1;
                log::warn!("⚠️  Sink panicked while handling flow {}", key);
            }
        }

        // hand the emptied allocation back so the slot is reused next window
        {
            let mut buffers = self.lock_buffers();
            if buffers.slots[retired].is_empty() {
                buffers.slots[retired] = drained;
            }
        }

        log::debug!(
            "🔄 Rotated window: {} events → {} flows ({} sink failures) in {}µs",
            summary.events,
            summary.flows,
            summary.failed,
            started.elapsed().as_micros()
        );

        summary
    }

    /// Rotate every `interval` on a background task until the handle is stopped.
    ///
    /// The first rotation happens one full interval after the call. Intervals
    /// outside `[1ms, MAX_INTERVAL]` are clamped. Must be called from within a
    /// tokio runtime. Dropping the handle stops the timer.
    pub fn start(self: &Arc<Self>, interval: Duration, sink: Arc<dyn FlowSink>) -> RotationHandle {
        let period = clamp_interval(interval);

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let processor = Arc::clone(self);

        let task = tokio::spawn(async move {
            log::info!("⏰ Starting window rotation (interval: {:?})", period);

            let now = Instant::now();
            let first_tick = now.checked_add(period).unwrap_or(now);
            let mut timer = interval_at(first_tick, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;

                    _ = stop_rx.changed() => break,

                    _ = timer.tick() => {
                        let processor = Arc::clone(&processor);
                        let sink = Arc::clone(&sink);
                        // sink calls are synchronous, keep them off the async workers
                        let rotation =
                            tokio::task::spawn_blocking(move || processor.rotate(sink.as_ref()));
                        match rotation.await {
                            Ok(summary) if summary.events > 0 => {
                                log::info!(
                                    "📊 Window flushed: {} events, {} flows",
                                    summary.events,
                                    summary.flows
                                );
                            }
                            Ok(_) => {}
                            Err(e) => log::error!("❌ Rotation task failed: {}", e),
                        }
                    }
                }
            }

            log::info!("✅ Window rotation stopped");
        });

        RotationHandle {
            stop: stop_tx,
            task: Some(task),
        }
    }

    fn lock_buffers(&self) -> MutexGuard<'_, WindowBuffers> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn clamp_interval(interval: Duration) -> Duration {
    if interval < MIN_INTERVAL {
        log::warn!(
            "Rotation interval {:?} is not positive, using {:?}",
            interval,
            MIN_INTERVAL
        );
        MIN_INTERVAL
    } else if interval > MAX_INTERVAL {
        log::warn!(
            "Rotation interval {:?} is too long, using {:?}",
            interval,
            MAX_INTERVAL
        );
        MAX_INTERVAL
    } else {
        interval
    }
}

impl Default for BatchProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Control handle for a running rotation timer
pub struct RotationHandle {
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl RotationHandle {
    /// Stop scheduling ticks. A rotation already in progress completes.
    ///
    /// Calling this more than once has no further effect.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Whether the timer task is still alive
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop and wait for the timer task to exit.
    ///
    /// Returns once any rotation in progress has delivered its last record.
    /// An error means the timer task died before it was stopped.
    pub async fn shutdown(mut self) -> Result<(), JoinError> {
        self.stop();
        match self.task.take() {
            Some(task) => task.await,
            None => Ok(()),
        }
    }
}
