//! Discipline - client interface for producers' owners and handlers

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tracing::debug;

use crate::divider::Divider;
use crate::safe;
use crate::types::{Distribution, Prioritized, Priority, normalize};
use crate::verify;

use super::config::DisciplineConfig;
use super::core::Dispatcher;
use super::error::DisciplineError;
use super::messages::{DisciplineMetrics, Outcome};

/// Options the discipline is created with
pub struct Opts<T> {
    /// Divides handlers between priorities
    pub divider: Arc<dyn Divider>,

    /// Number of handlers reading the output, the in-flight ceiling
    pub handlers_quantity: u64,

    /// One input per priority; closing an input drains its priority.
    /// Capacity-one inputs are waited on for two interrupt ticks before
    /// being considered empty
    pub inputs: HashMap<Priority, mpsc::Receiver<T>>,

    /// Pause between cycles that dispatched nothing
    pub idle_delay: Duration,

    /// Tick period used when waiting on capacity-one inputs
    pub interrupt_interval: Duration,
}

impl<T> Opts<T> {
    pub fn new(divider: Arc<dyn Divider>, handlers_quantity: u64) -> Self {
        let defaults = DisciplineConfig::default();

        Self {
            divider,
            handlers_quantity,
            inputs: HashMap::new(),
            idle_delay: defaults.idle_delay(),
            interrupt_interval: defaults.interrupt_interval(),
        }
    }

    pub fn from_config(config: &DisciplineConfig) -> Self {
        Self {
            divider: config.divider.divider(),
            handlers_quantity: config.handlers_quantity,
            inputs: HashMap::new(),
            idle_delay: config.idle_delay(),
            interrupt_interval: config.interrupt_interval(),
        }
    }

    /// Add the input for a priority, replacing any previous one
    pub fn input(mut self, priority: Priority, input: mpsc::Receiver<T>) -> Self {
        self.inputs.insert(priority, input);
        self
    }

    /// Check the options and compute the strategic allocation
    fn strategic(&self) -> Result<Distribution, DisciplineError> {
        if self.handlers_quantity == 0 {
            return Err(DisciplineError::ZeroHandlersQuantity);
        }

        if self.inputs.is_empty() {
            return Err(DisciplineError::NoInputs);
        }

        let priorities = normalize(&self.inputs.keys().copied().collect::<Vec<_>>());

        let mut strategic = Distribution::new();
        self.divider.divide(&priorities, self.handlers_quantity, &mut strategic);

        let distributed = safe::sum(&strategic)?;
        if distributed != self.handlers_quantity {
            return Err(DisciplineError::DividerNotConserving {
                dividend: self.handlers_quantity,
                distributed,
            });
        }

        if !verify::is_non_fatal_config(&priorities, self.divider.as_ref(), self.handlers_quantity) {
            return Err(DisciplineError::QuantityNotEnough {
                quantity: self.handlers_quantity,
            });
        }

        Ok(strategic)
    }
}

/// Shared receiving end of the discipline output
///
/// Cloneable, every handler can hold one; each item goes to exactly one of them.
pub struct Output<T> {
    rx: Arc<Mutex<mpsc::Receiver<Prioritized<T>>>>,
}

impl<T> Clone for Output<T> {
    fn clone(&self) -> Self {
        Self { rx: self.rx.clone() }
    }
}

impl<T> Output<T> {
    /// Receive the next dispatched item
    ///
    /// Returns None once the discipline has terminated and the output is empty.
    /// Receives are serialized: concurrent callers wait in turn on the lock.
    pub async fn recv(&self) -> Option<Prioritized<T>> {
        let mut rx_guard = self.rx.lock().await;
        rx_guard.recv().await
    }

    /// Try to receive an item without waiting
    ///
    /// Returns None if no item is ready or another handler is receiving.
    pub fn try_recv(&self) -> Option<Prioritized<T>> {
        let mut rx_guard = self.rx.try_lock().ok()?;
        rx_guard.try_recv().ok()
    }
}

/// Priority discipline
///
/// Distributes a fixed number of handlers across priorities, each fed by
/// its own input, in proportions set by the divider. Items come out of
/// [`output`](Self::output) tagged with their priority; every received item
/// must be [`release`](Self::release)d once handled, or its handler slot stays
/// occupied forever.
///
/// The handle is cloneable. Dispatching stops once every input is closed and
/// every item released, or on an internal error; the outcome is available
/// from [`err`](Self::err).
pub struct Discipline<T> {
    output: Output<T>,
    feedback: mpsc::Sender<Priority>,
    outcome: Arc<Mutex<Option<oneshot::Receiver<Outcome>>>>,
    metrics: watch::Receiver<DisciplineMetrics>,
}

impl<T> Clone for Discipline<T> {
    fn clone(&self) -> Self {
        Self {
            output: self.output.clone(),
            feedback: self.feedback.clone(),
            outcome: self.outcome.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<T: Send + 'static> Discipline<T> {
    /// Validate the options and start dispatching on a new task
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(opts: Opts<T>) -> Result<Self, DisciplineError> {
        debug!(
            handlers_quantity = opts.handlers_quantity,
            inputs = opts.inputs.len(),
            "Discipline::new: called"
        );
        let strategic = opts.strategic()?;

        // At most handlers_quantity items are in flight, so neither channel
        // holds more than that
        let capacity = usize::try_from(opts.handlers_quantity).unwrap_or(usize::MAX).min(MAX_CAPACITY);

        let (output_tx, output_rx) = mpsc::channel(capacity);
        let (feedback_tx, feedback_rx) = mpsc::channel(capacity);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (metrics_tx, metrics_rx) = watch::channel(DisciplineMetrics::default());

        let dispatcher = Dispatcher::new(opts, strategic, output_tx, feedback_rx, metrics_tx);
        tokio::spawn(dispatcher.run(outcome_tx));

        Ok(Self {
            output: Output {
                rx: Arc::new(Mutex::new(output_rx)),
            },
            feedback: feedback_tx,
            outcome: Arc::new(Mutex::new(Some(outcome_rx))),
            metrics: metrics_rx,
        })
    }
}

/// Upper bound on channel buffers, tokio rejects larger ones
const MAX_CAPACITY: usize = usize::MAX >> 3;

impl<T> Discipline<T> {
    /// Output of dispatched items
    pub fn output(&self) -> Output<T> {
        self.output.clone()
    }

    /// Mark one item of `priority` as handled, freeing its handler slot
    pub async fn release(&self, priority: Priority) -> Result<(), DisciplineError> {
        self.feedback
            .send(priority)
            .await
            .map_err(|_| DisciplineError::Terminated)
    }

    /// Wait for the outcome of the run
    ///
    /// Returns None after a clean shutdown and the error otherwise. The
    /// outcome is delivered once; every later call returns None.
    pub async fn err(&self) -> Option<DisciplineError> {
        let mut outcome_guard = self.outcome.lock().await;
        let rx = outcome_guard.as_mut()?;

        let outcome = match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Some(DisciplineError::Terminated),
        };

        outcome_guard.take();
        outcome
    }

    /// Snapshot of the discipline counters
    pub fn metrics(&self) -> DisciplineMetrics {
        self.metrics.borrow().clone()
    }
}
