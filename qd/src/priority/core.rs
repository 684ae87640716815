//! Dispatch loop of the priority discipline
//!
//! A single task owns every per-priority counter, so nothing here is locked.
//! Each cycle:
//!
//! 1. takes at most one pending release without waiting
//! 2. computes the tactic, parking on releases while no handler is vacant
//! 3. dispatches items in descending priority order within the tactic
//! 4. hands tactic left unused by empty or closed inputs to priorities that
//!    consumed theirs, and dispatches once more
//!
//! The loop ends once every input is closed, nothing was dispatched and no
//! item is in flight.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::divider::Divider;
use crate::safe;
use crate::types::{Distribution, Prioritized, Priority, normalize};

use super::error::DisciplineError;
use super::handle::Opts;
use super::messages::{DisciplineMetrics, Outcome};

/// Ticks without an item after which a capacity-one input counts as empty
const UNBUFFERED_TICKS: u32 = 2;

/// Result of polling one input
enum Received<T> {
    Item(T),
    Empty,
    Drained,
}

/// What woke the wait on a capacity-one input
enum Wake<T> {
    Input(Option<T>),
    Released(Option<Priority>),
    Tick,
}

pub(crate) struct Dispatcher<T> {
    divider: Arc<dyn Divider>,
    handlers_quantity: u64,

    /// Sorted descending
    priorities: Vec<Priority>,
    inputs: HashMap<Priority, mpsc::Receiver<T>>,
    unbuffered: HashSet<Priority>,

    /// Dropped to close the output
    output: Option<mpsc::Sender<Prioritized<T>>>,
    feedback: mpsc::Receiver<Priority>,

    strategic: Distribution,
    actual: Distribution,
    tactic: Distribution,
    drained: HashSet<Priority>,

    interrupter: Interval,
    idle_delay: Duration,

    metrics: DisciplineMetrics,
    metrics_tx: watch::Sender<DisciplineMetrics>,
}

impl<T: Send + 'static> Dispatcher<T> {
    /// Must be called within a Tokio runtime
    pub(crate) fn new(
        opts: Opts<T>,
        strategic: Distribution,
        output: mpsc::Sender<Prioritized<T>>,
        feedback: mpsc::Receiver<Priority>,
        metrics_tx: watch::Sender<DisciplineMetrics>,
    ) -> Self {
        let priorities = normalize(&opts.inputs.keys().copied().collect::<Vec<_>>());

        let unbuffered = opts
            .inputs
            .iter()
            .filter(|(_, input)| input.max_capacity() == 1)
            .map(|(priority, _)| *priority)
            .collect();

        let zeroes: Distribution = priorities.iter().map(|priority| (*priority, 0)).collect();

        let mut interrupter = tokio::time::interval(opts.interrupt_interval.max(Duration::from_micros(1)));
        interrupter.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(?priorities, ?strategic, ?unbuffered, "Dispatcher::new: called");

        Self {
            divider: opts.divider,
            handlers_quantity: opts.handlers_quantity,
            priorities,
            inputs: opts.inputs,
            unbuffered,
            output: Some(output),
            feedback,
            strategic,
            actual: zeroes.clone(),
            tactic: zeroes,
            drained: HashSet::new(),
            interrupter,
            idle_delay: opts.idle_delay,
            metrics: DisciplineMetrics::default(),
            metrics_tx,
        }
    }

    /// Run until every input is drained, or until an error
    ///
    /// On error the outcome is reported first, then in-flight items are
    /// awaited before the task exits.
    pub(crate) async fn run(mut self, outcome_tx: oneshot::Sender<Outcome>) {
        info!(
            handlers_quantity = self.handlers_quantity,
            priorities = ?self.priorities,
            "Discipline started"
        );

        let outcome = self.dispatch().await.err();

        self.output.take();
        self.inputs.clear();

        match &outcome {
            // nothing is in flight, later releases are refused
            None => self.feedback.close(),
            Some(err) => error!(%err, in_flight = self.in_flight(), "Discipline stopped on error"),
        }

        self.publish();

        if outcome_tx.send(outcome.clone()).is_err() {
            debug!("Dispatcher::run: outcome receiver dropped");
        }

        if outcome.is_some() {
            self.drain_in_flight().await;
            self.publish();
        }

        info!(metrics = ?self.metrics, "Discipline terminated");
    }

    async fn dispatch(&mut self) -> Result<(), DisciplineError> {
        loop {
            let processed = self.cycle().await?;

            self.metrics.cycles += 1;

            if processed == 0 {
                if self.is_drained() && self.is_zero_actual() {
                    debug!("Dispatcher::dispatch: inputs drained and nothing in flight");
                    return Ok(());
                }

                self.metrics.idle_cycles += 1;
                self.publish();
                self.idle().await?;
                continue;
            }

            self.publish();
        }
    }

    async fn cycle(&mut self) -> Result<u64, DisciplineError> {
        self.read_feedback()?;
        self.calc_tactic().await?;

        let mut processed = self.prioritize().await?;

        if self.recalc_tactic()? {
            self.metrics.recalculations += 1;
            processed += self.prioritize().await?;
        }

        trace!(processed, "Dispatcher::cycle: done");
        Ok(processed)
    }

    fn read_feedback(&mut self) -> Result<(), DisciplineError> {
        match self.feedback.try_recv() {
            Ok(priority) => self.release(priority),
            Err(TryRecvError::Empty) => Ok(()),
            Err(TryRecvError::Disconnected) => Err(DisciplineError::Abandoned),
        }
    }

    async fn wait_feedback(&mut self) -> Result<(), DisciplineError> {
        match self.feedback.recv().await {
            Some(priority) => self.release(priority),
            None => Err(DisciplineError::Abandoned),
        }
    }

    /// Sleep between cycles that dispatched nothing; a release cuts it short
    async fn idle(&mut self) -> Result<(), DisciplineError> {
        let released = tokio::select! {
            _ = tokio::time::sleep(self.idle_delay) => return Ok(()),
            released = self.feedback.recv() => released,
        };

        match released {
            Some(priority) => self.release(priority),
            None => Err(DisciplineError::Abandoned),
        }
    }

    fn release(&mut self, priority: Priority) -> Result<(), DisciplineError> {
        let in_flight = self
            .actual
            .get_mut(&priority)
            .filter(|quantity| **quantity != 0)
            .ok_or(DisciplineError::UnexpectedRelease(priority))?;

        *in_flight -= 1;
        self.metrics.released += 1;

        trace!(priority, "Dispatcher::release: released");
        Ok(())
    }

    fn calc_vacants(&self) -> Result<u64, DisciplineError> {
        let busy = safe::sum(&self.actual)?;

        self.handlers_quantity
            .checked_sub(busy)
            .ok_or(DisciplineError::QuantityExceeded {
                required: busy,
                available: self.handlers_quantity,
            })
    }

    async fn calc_tactic(&mut self) -> Result<(), DisciplineError> {
        let mut vacants = self.calc_vacants()?;

        while vacants == 0 {
            trace!("Dispatcher::calc_tactic: no vacant handlers, waiting for release");
            self.wait_feedback().await?;
            vacants = self.calc_vacants()?;
        }

        if self.calc_tactic_simple(vacants)? {
            trace!(vacants, tactic = ?self.tactic, "Dispatcher::calc_tactic: simple");
            return Ok(());
        }

        self.reset_tactic();

        let uncrowded: Vec<Priority> = self
            .priorities
            .iter()
            .copied()
            .filter(|priority| quantity(&self.actual, *priority) < quantity(&self.strategic, *priority))
            .collect();

        self.divider.divide(&uncrowded, vacants, &mut self.tactic);

        trace!(vacants, ?uncrowded, tactic = ?self.tactic, "Dispatcher::calc_tactic: divided");
        self.check_tactic()
    }

    /// Top every priority up to its strategic share if that fits in the vacancies
    ///
    /// Drained priorities keep their share here; `prioritize` skips them and
    /// `recalc_tactic` hands it to the live ones.
    fn calc_tactic_simple(&mut self, vacants: u64) -> Result<bool, DisciplineError> {
        self.reset_tactic();

        let mut total = 0;

        for &priority in &self.priorities {
            let actual = quantity(&self.actual, priority);
            let strategic = quantity(&self.strategic, priority);

            if actual <= strategic {
                let delta = strategic - actual;
                self.tactic.insert(priority, delta);
                total = safe::add(total, delta)?;
            }
        }

        Ok(total != 0 && total <= vacants)
    }

    /// Redistribute tactic left unused by empty or drained inputs among
    /// priorities that spent all of theirs
    ///
    /// Returns `true` if there is something to dispatch in a second pass.
    fn recalc_tactic(&mut self) -> Result<bool, DisciplineError> {
        let mut remainder = 0;
        let mut useful = Vec::new();

        for &priority in &self.priorities {
            let left = quantity(&self.tactic, priority);

            if left != 0 {
                remainder = safe::add(remainder, left)?;
                continue;
            }

            if !self.drained.contains(&priority) {
                useful.push(priority);
            }
        }

        if remainder == 0 || useful.is_empty() {
            return Ok(false);
        }

        self.reset_tactic();
        self.divider.divide(&useful, self.handlers_quantity, &mut self.tactic);

        let hungry: Vec<Priority> = useful
            .iter()
            .copied()
            .filter(|priority| quantity(&self.actual, *priority) < quantity(&self.tactic, *priority))
            .collect();

        let receivers = if hungry.is_empty() { useful } else { hungry };

        self.reset_tactic();
        self.divider.divide(&receivers, remainder, &mut self.tactic);

        debug!(remainder, ?receivers, tactic = ?self.tactic, "Dispatcher::recalc_tactic: redistributed");
        self.check_tactic()?;

        Ok(true)
    }

    /// Tactic must fit in the vacancies or the in-flight ceiling breaks
    fn check_tactic(&self) -> Result<(), DisciplineError> {
        let required = safe::sum(&self.tactic)?;
        let available = self.calc_vacants()?;

        if required > available {
            warn!(required, available, tactic = ?self.tactic, "Divider allocated more than is vacant");
            return Err(DisciplineError::QuantityExceeded { required, available });
        }

        Ok(())
    }

    fn reset_tactic(&mut self) {
        self.tactic.values_mut().for_each(|quantity| *quantity = 0);
    }

    /// Dispatch items within the tactic, highest priority first
    async fn prioritize(&mut self) -> Result<u64, DisciplineError> {
        let mut processed = 0;

        for id in 0..self.priorities.len() {
            let priority = self.priorities[id];

            while quantity(&self.tactic, priority) != 0 && !self.drained.contains(&priority) {
                match self.receive(priority).await? {
                    Received::Item(item) => {
                        self.send(Prioritized::new(item, priority)).await?;

                        *self.actual.entry(priority).or_default() += 1;
                        *self.tactic.entry(priority).or_default() -= 1;

                        self.metrics.dispatched += 1;
                        processed += 1;

                        trace!(priority, "Dispatcher::prioritize: dispatched");
                    }
                    Received::Empty => break,
                    Received::Drained => {
                        debug!(priority, "Dispatcher::prioritize: input drained");
                        self.inputs.remove(&priority);
                        self.drained.insert(priority);
                    }
                }
            }
        }

        Ok(processed)
    }

    async fn receive(&mut self, priority: Priority) -> Result<Received<T>, DisciplineError> {
        if self.unbuffered.contains(&priority) {
            self.receive_unbuffered(priority).await
        } else {
            self.receive_buffered(priority)
        }
    }

    /// Never waits: takes an item if one is ready, consuming releases meanwhile
    fn receive_buffered(&mut self, priority: Priority) -> Result<Received<T>, DisciplineError> {
        loop {
            let Some(input) = self.inputs.get_mut(&priority) else {
                return Ok(Received::Drained);
            };

            match input.try_recv() {
                Ok(item) => return Ok(Received::Item(item)),
                Err(TryRecvError::Disconnected) => return Ok(Received::Drained),
                Err(TryRecvError::Empty) => {}
            }

            match self.feedback.try_recv() {
                Ok(released) => self.release(released)?,
                Err(TryRecvError::Empty) => return Ok(Received::Empty),
                Err(TryRecvError::Disconnected) => return Err(DisciplineError::Abandoned),
            }
        }
    }

    /// Gives a slow producer two interrupt ticks before calling the input empty
    async fn receive_unbuffered(&mut self, priority: Priority) -> Result<Received<T>, DisciplineError> {
        self.interrupter.reset();

        let mut ticks = 0;

        loop {
            let Some(input) = self.inputs.get_mut(&priority) else {
                return Ok(Received::Drained);
            };

            let wake = tokio::select! {
                biased;
                item = input.recv() => Wake::Input(item),
                released = self.feedback.recv() => Wake::Released(released),
                _ = self.interrupter.tick() => Wake::Tick,
            };

            match wake {
                Wake::Input(Some(item)) => return Ok(Received::Item(item)),
                Wake::Input(None) => return Ok(Received::Drained),
                Wake::Released(Some(released)) => self.release(released)?,
                Wake::Released(None) => return Err(DisciplineError::Abandoned),
                Wake::Tick => {
                    ticks += 1;

                    if ticks >= UNBUFFERED_TICKS {
                        return Ok(Received::Empty);
                    }
                }
            }
        }
    }

    /// Wait for room in the output, consuming releases meanwhile
    async fn send(&mut self, prioritized: Prioritized<T>) -> Result<(), DisciplineError> {
        loop {
            let Some(output) = self.output.as_ref() else {
                return Err(DisciplineError::OutputClosed);
            };

            let released = tokio::select! {
                biased;
                permit = output.reserve() => {
                    let permit = permit.map_err(|_| DisciplineError::OutputClosed)?;
                    permit.send(prioritized);
                    return Ok(());
                }
                released = self.feedback.recv() => released,
            };

            match released {
                Some(priority) => self.release(priority)?,
                None => return Err(DisciplineError::Abandoned),
            }
        }
    }

    /// Wait until every dispatched item is released
    async fn drain_in_flight(&mut self) {
        while !self.is_zero_actual() {
            match self.feedback.recv().await {
                Some(priority) => {
                    if let Err(err) = self.release(priority) {
                        warn!(%err, "Dispatcher::drain_in_flight: ignoring release");
                    }
                }
                None => {
                    warn!(in_flight = self.in_flight(), "Handles dropped with items in flight");
                    return;
                }
            }
        }

        debug!("Dispatcher::drain_in_flight: nothing in flight");
    }

    fn is_drained(&self) -> bool {
        self.priorities.iter().all(|priority| self.drained.contains(priority))
    }

    fn is_zero_actual(&self) -> bool {
        self.actual.values().all(|quantity| *quantity == 0)
    }

    fn in_flight(&self) -> u64 {
        self.actual.values().fold(0u64, |acc, quantity| acc.saturating_add(*quantity))
    }

    fn publish(&self) {
        self.metrics_tx.send_replace(self.metrics.clone());
    }
}

fn quantity(distribution: &Distribution, priority: Priority) -> u64 {
    distribution.get(&priority).copied().unwrap_or(0)
}
