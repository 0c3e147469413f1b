use std::time::Duration;

use fmtp_core::{ChannelConfig, TimerKind};
use tokio::{
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    task::JoinHandle,
    time::sleep,
};
use tracing::trace;

/// Expiry notice of one arm of a [`Timer`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Expiry {
    pub kind: TimerKind,
    generation: u64,
}

/// One-shot timer reporting its expiry through a queue.
///
/// Every arm gets a new generation. An expiry is only honored by [`Timer::fire`]
/// if its generation is the current one, so nothing armed before a
/// [`Timer::restart`] or [`Timer::stop`] can be observed afterwards, even if it
/// was already queued.
#[derive(Debug)]
pub struct Timer {
    kind: TimerKind,
    interval: Duration,
    generation: u64,
    task: Option<JoinHandle<()>>,
    tx: UnboundedSender<Expiry>,
}

impl Timer {
    #[must_use]
    pub fn new(kind: TimerKind, interval: Duration, tx: UnboundedSender<Expiry>) -> Self {
        Self {
            kind,
            interval,
            generation: 0,
            task: None,
            tx,
        }
    }

    /// Arms the timer, replacing any pending deadline.
    pub fn start(&mut self) {
        self.stop();
        self.generation += 1;
        let expiry = Expiry {
            kind: self.kind,
            generation: self.generation,
        };
        let interval = self.interval;
        let tx = self.tx.clone();
        self.task = Some(tokio::spawn(async move {
            sleep(interval).await;
            if tx.send(expiry).is_err() {
                trace!("{:?} expired after its channel closed", expiry.kind);
            }
        }));
    }

    /// Cancels the pending deadline, a no-op if not armed.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn restart(&mut self) {
        self.start();
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }

    /// Applies to the next arm.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Consumes `expiry`, returns whether it belongs to the current arm.
    pub fn fire(&mut self, expiry: Expiry) -> bool {
        if self.task.is_some() && expiry.generation == self.generation {
            self.task = None;
            true
        } else {
            trace!(
                "dropping stale {:?} expiry {} (current {})",
                expiry.kind, expiry.generation, self.generation
            );
            false
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The timers of one channel sharing a single expiry queue.
#[derive(Debug)]
pub struct Timers {
    ts: Timer,
    tr: Timer,
    ti: Timer,
    reconnect: Timer,
    rx: UnboundedReceiver<Expiry>,
}

impl Timers {
    #[must_use]
    pub fn new(config: &ChannelConfig) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            ts: Timer::new(TimerKind::Ts, config.ts, tx.clone()),
            tr: Timer::new(TimerKind::Tr, config.tr, tx.clone()),
            ti: Timer::new(TimerKind::Ti, config.ti, tx.clone()),
            reconnect: Timer::new(TimerKind::Reconnect, config.reconnect_timeout, tx),
            rx,
        }
    }

    pub fn get_mut(&mut self, kind: TimerKind) -> &mut Timer {
        match kind {
            TimerKind::Ts => &mut self.ts,
            TimerKind::Tr => &mut self.tr,
            TimerKind::Ti => &mut self.ti,
            TimerKind::Reconnect => &mut self.reconnect,
        }
    }

    pub fn reconfigure(&mut self, config: &ChannelConfig) {
        self.ts.set_interval(config.ts);
        self.tr.set_interval(config.tr);
        self.ti.set_interval(config.ti);
        self.reconnect.set_interval(config.reconnect_timeout);
    }

    /// Waits for the next honored expiry, stale ones are skipped.
    ///
    /// Cancel safe.
    pub async fn expired(&mut self) -> TimerKind {
        loop {
            let Some(expiry) = self.rx.recv().await else {
                // every timer holds a sender, so the queue never closes
                return std::future::pending().await;
            };
            if self.get_mut(expiry.kind).fire(expiry) {
                return expiry.kind;
            }
        }
    }
}
