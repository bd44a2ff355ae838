//! Timers related functions module
//! This module implements the boards tick timer using tokio.
use super::*;

// tokio
use tokio::prelude::*;
use tokio::timer::Interval;

// futures
use futures::Future;

// channels
use crossbeam::channel::Sender;

// fsm
use crate::fsm::Event;

// std
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// start_timers() function
/// starts the tick timer of a board, blocks until the board is stopped
pub fn start_timers(tx: Sender<Event>, period: Duration, running: Arc<AtomicBool>, debug: &Verbose) {
    // clone debug
    let debug = *debug;
    let running0 = Arc::clone(&running);

    // new tick interval
    // every tick lets the board's worker thread advance the time dependent
    // layers (ARP requests and cache, DHCP timeouts) even when no frame is received.
    let tick_int = Interval::new(Instant::now() + period, period)
        .take_while(move |_| future::ok(running0.load(Ordering::SeqCst)))
        .for_each(move |_| {
            if tx.send(Event::Tick).is_err() {
                print_debug(
                    &debug,
                    DEBUG_LEVEL_HIGH,
                    DEBUG_SRC_TIMER,
                    format!("worker thread is gone, stopping tick timer"),
                );
                running.store(false, Ordering::SeqCst);
            }
            Ok(())
        })
        .map_err(|_| ());

    // start the tokio runtime
    tokio::run(future::lazy(|| {
        tokio::spawn(tick_int);
        Ok(())
    }));
}

// Tests
#[cfg(test)]
mod test {
    use super::*;
    use crossbeam::channel::unbounded;
    use std::thread;

    #[test]
    fn ticks_until_stopped() {
        let (tx, rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let timer = thread::spawn(move || {
            start_timers(tx, Duration::from_millis(1), flag, &Verbose::default());
        });
        match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Event::Tick) => (),
            other => panic!("expected a tick, got {:?}", other),
        }
        running.store(false, Ordering::SeqCst);
        timer.join().unwrap();
    }

    #[test]
    fn stops_once_the_receiver_is_gone() {
        let (tx, rx) = unbounded();
        drop(rx);
        let running = Arc::new(AtomicBool::new(true));
        start_timers(tx, Duration::from_millis(1), Arc::clone(&running), &Verbose::default());
        assert!(!running.load(Ordering::SeqCst));
    }
}
