use std::{
    sync::{
        Arc, Mutex,
        mpsc::{RecvTimeoutError, Sender, channel},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, error};

use super::live::EngineInput;
use crate::config::MIN_TICK_INTERVAL_MS;

/// Drives the session clock.
///
/// The live session starts a tick source when the countdown begins and cancels it on
/// every exit from the live phases. Tests swap the wall clock for [`ManualTicks`].
pub trait TickSource {
    /// Starts sending [`EngineInput::Tick`] into `sink`. Restarting replaces the previous
    /// schedule.
    fn start(&mut self, sink: Sender<EngineInput>);

    /// Stops ticking. Safe to call any number of times.
    fn cancel(&mut self);

    fn is_running(&self) -> bool;
}

/// Wall-clock tick timer running on its own thread
pub struct Ticker {
    interval: Duration,
    cancel_sender: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Intervals shorter than `MIN_TICK_INTERVAL_MS` are raised to it.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(MIN_TICK_INTERVAL_MS)),
            cancel_sender: None,
            handle: None,
        }
    }
}

impl TickSource for Ticker {
    fn start(&mut self, sink: Sender<EngineInput>) {
        self.cancel();

        let (cancel_sender, cancel_receiver) = channel::<()>();
        let interval = self.interval;
        let handle = thread::spawn(move || {
            loop {
                match cancel_receiver.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if sink.send(EngineInput::Tick).is_err() {
                            debug!("Session engine gone, ticker exiting");
                            break;
                        }
                    }
                    // explicit cancel or the owner went away
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        self.cancel_sender = Some(cancel_sender);
        self.handle = Some(handle);
    }

    fn cancel(&mut self) {
        // dropping the sender wakes the ticker thread immediately
        self.cancel_sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Ticker thread panicked");
            }
        }
    }

    fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Tick source fired by hand, for deterministic tests.
///
/// Clones share the same schedule, so a test keeps one clone and hands the other to the
/// session.
#[derive(Clone, Default)]
pub struct ManualTicks {
    sink: Arc<Mutex<Option<Sender<EngineInput>>>>,
}

impl ManualTicks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends `count` ticks. Returns false when the source is not running.
    pub fn fire(&self, count: u32) -> bool {
        let Ok(guard) = self.sink.lock() else {
            return false;
        };
        let Some(sink) = guard.as_ref() else {
            return false;
        };
        (0..count).all(|_| sink.send(EngineInput::Tick).is_ok())
    }
}

impl TickSource for ManualTicks {
    fn start(&mut self, sink: Sender<EngineInput>) {
        if let Ok(mut guard) = self.sink.lock() {
            *guard = Some(sink);
        }
    }

    fn cancel(&mut self) {
        if let Ok(mut guard) = self.sink.lock() {
            *guard = None;
        }
    }

    fn is_running(&self) -> bool {
        self.sink.lock().map(|guard| guard.is_some()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_ticker_delivers_and_cancels() {
        let (sender, receiver) = channel();
        let mut ticker = Ticker::new(Duration::from_millis(5));
        ticker.start(sender);
        assert!(ticker.is_running());

        let tick = receiver.recv_timeout(Duration::from_secs(2));
        assert!(matches!(tick, Ok(EngineInput::Tick)));

        ticker.cancel();
        assert!(!ticker.is_running());
        // drain anything sent before the cancel landed, then the channel goes quiet
        while receiver.try_recv().is_ok() {}
        assert!(receiver.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_ticker_cancel_is_idempotent() {
        let (sender, _receiver) = channel();
        let mut ticker = Ticker::new(Duration::from_secs(60));
        ticker.start(sender);
        let start = Instant::now();
        ticker.cancel();
        ticker.cancel();
        // cancellation does not wait for the next period
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_zero_interval_does_not_spin() {
        let (sender, receiver) = channel();
        let mut ticker = Ticker::new(Duration::ZERO);
        ticker.start(sender);
        std::thread::sleep(Duration::from_millis(100));
        ticker.cancel();
        // at most one tick per 10 ms, with plenty of slack for a slow scheduler
        assert!(receiver.try_iter().count() <= 50);
    }

    #[test]
    fn test_manual_ticks_only_fire_while_running() {
        let (sender, receiver) = channel();
        let ticks = ManualTicks::new();
        let mut source = ticks.clone();

        assert!(!ticks.fire(1));
        source.start(sender);
        assert!(ticks.is_running());
        assert!(ticks.fire(3));
        assert_eq!(receiver.try_iter().count(), 3);

        source.cancel();
        assert!(!ticks.fire(1));
    }
}
