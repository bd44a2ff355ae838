//! threads pool module
//! This module implement the thread pool, every board is run by a worker thread
//! and a timer thread.
use super::*;

// concurrency
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// channels
use crossbeam::channel::{unbounded, Sender};

// operating system drivers
use crate::os::drivers::FrameWriter;

// finite state machine
use crate::fsm::{fsm_run, Event};

// timers
use crate::timers::start_timers;

/// ThreadPool Structure
pub struct ThreadPool {
    workers: Vec<Worker>,
}

// ThreadPool Implementation
impl ThreadPool {
    // new() method
    // Create a new Thread Pool, taking ownership of the boards
    pub fn new(
        boards: Vec<Board>,
        writer: Arc<dyn FrameWriter + Send + Sync>,
        debug: &Verbose,
    ) -> Result<ThreadPool, StackError> {
        if boards.is_empty() {
            return Err(StackError::Config("no board configured".to_string()));
        }

        // built a fixed-size vector of workers
        let mut workers = Vec::with_capacity(boards.len());

        // creating individual workers for every boards
        for (id, board) in boards.into_iter().enumerate() {
            workers.push(Worker::new(id, board, Arc::clone(&writer), debug));
        }

        Ok(ThreadPool { workers })
    }
    // startup() method
    // Send startup event to every worker threads
    pub fn startup(&self, debug: &Verbose) {
        print_debug(
            debug,
            DEBUG_LEVEL_EXTENSIVE,
            DEBUG_SRC_THREAD,
            format!("sending Startup event to worker threads"),
        );
        for worker in &self.workers {
            if worker.notification.send(Event::Startup).is_err() {
                eprintln!(
                    "error(thread): cannot send Startup event for thread {}, channel is closed",
                    worker.id
                );
            }
        }
    }
    // dispatch() method
    /// hand a received frame over to every board attached to the interface,
    /// return the number of boards notified
    pub fn dispatch(&self, ifindex: i32, frame: &[u8]) -> usize {
        let mut notified = 0;
        for worker in self.workers.iter().filter(|w| w.ifindex == ifindex) {
            if worker.notification.send(Event::Frame(frame.to_vec())).is_ok() {
                notified += 1;
            }
        }
        notified
    }
    // drop() method
    // Custom destructor function for the Thread pool
    pub fn drop(&mut self, debug: &Verbose) {
        print_debug(
            debug,
            DEBUG_LEVEL_LOW,
            DEBUG_SRC_THREAD,
            format!("signaling workers to shut down"),
        );
        // stop the timers then send Shutdown/Terminate events to all workers
        for worker in &self.workers {
            worker.running.store(false, Ordering::SeqCst);
            if worker.notification.send(Event::Shutdown).is_err()
                || worker.notification.send(Event::Terminate).is_err()
            {
                eprintln!(
                    "error(thread): cannot send Terminate event for {}, channel is closed",
                    worker.id
                );
            }
        }

        // waiting for threads
        for worker in &mut self.workers {
            // print debugging information
            print_debug(
                debug,
                DEBUG_LEVEL_HIGH,
                DEBUG_SRC_THREAD,
                format!("waiting for thread {} to exit...", worker.id),
            );
            // take the threads out of the worker stucture and leave a None
            for handle in &mut [worker.thread.take(), worker.timer.take()] {
                if let Some(thread) = handle.take() {
                    // Wait for the thread to finish
                    if thread.join().is_err() {
                        eprintln!("error(thread): thread {} panicked", worker.id);
                    }
                }
            }
        }
    }
}

/// Worker Structure
pub struct Worker {
    id: usize,
    ifindex: i32,
    notification: Sender<Event>,
    running: Arc<AtomicBool>, // cleared to stop the timer thread
    // we wrap thread::JoinHandle in a Option<T> so we can
    // consume the thread later when calling .join().
    thread: Option<thread::JoinHandle<()>>,
    timer: Option<thread::JoinHandle<()>>,
}

// Worker Implementation
impl Worker {
    // new() method
    fn new(id: usize, board: Board, writer: Arc<dyn FrameWriter + Send + Sync>, debug: &Verbose) -> Worker {
        // creating a pair of sender and receiver channels
        let (sender, receiver) = unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let ifindex = board.ifindex();

        // clone debug
        let debug = *debug;

        // create worker thread
        let worker_thread = thread::spawn(move || {
            // print debugging information
            print_debug(
                &debug,
                DEBUG_LEVEL_EXTENSIVE,
                DEBUG_SRC_THREADP,
                format!("spawning worker thread {}", id),
            );
            let mut board = board;
            fsm_run(id, &mut board, &receiver, &*writer, &debug);
        });

        // create timer thread
        let timer_tx = sender.clone();
        let timer_running = Arc::clone(&running);
        let timer_thread = thread::spawn(move || {
            start_timers(
                timer_tx,
                Duration::from_millis(TIMER_TICK_MS),
                timer_running,
                &debug,
            );
        });

        Worker {
            id,
            ifindex,
            notification: sender,
            running,
            thread: Some(worker_thread),
            timer: Some(timer_thread),
        }
    }
}

// Tests
#[cfg(test)]
mod test {
    use super::*;
    use crate::packets::Fields;
    use crate::stack::StackConfig;
    use std::io;
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Default)]
    struct Recorder {
        frames: Mutex<Vec<(i32, Vec<u8>)>>,
    }

    impl FrameWriter for Recorder {
        fn write_frame(&self, ifindex: i32, frame: &[u8]) -> io::Result<usize> {
            self.frames.lock().unwrap().push((ifindex, frame.to_vec()));
            Ok(frame.len())
        }
    }

    fn arp_request(target_ip: [u8; 4]) -> Vec<u8> {
        let mut eth = Fields::new();
        eth.set_mac("target_mac", &ETH_BCAST_MAC)
            .set_mac("sender_mac", &[0x02, 0, 0, 0, 0, 1])
            .set("ethernet_type", ETHERNET_TYPE_ARP as u64);
        let mut arp = Fields::new();
        arp.set("hwtype", ARP_HWTYPE_ETHERNET as u64)
            .set("proto", ARP_PROTO_IP as u64)
            .set("hwsize", 6)
            .set("protosize", 4)
            .set("opcode", ARP_OPCODE_REQUEST as u64)
            .set_mac("sender_mac", &[0x02, 0, 0, 0, 0, 1])
            .set_ip("sender_ip", &[192, 168, 1, 100])
            .set_ip("target_ip", &target_ip);
        let mut frame = crate::mac::MAC_HEADER.encode(&eth);
        frame.extend(crate::arp::ARP_HEADER.encode(&arp));
        frame.resize(ETH_MIN_FRAME_LEN, 0);
        frame
    }

    #[test]
    fn frames_reach_the_board_of_their_interface() {
        let debug = Verbose::default();
        let first = StackConfig::default();
        let mut second = StackConfig::default();
        second.mac_address = [0x10, 0xe2, 0xd5, 0, 0, 1];
        second.ip_address = Some([10, 0, 0, 50]);
        let boards = vec![
            Board::new("eth0", 2, &first, &debug).unwrap(),
            Board::new("eth1", 3, &second, &debug).unwrap(),
        ];
        let recorder = Arc::new(Recorder::default());
        let writer: Arc<dyn FrameWriter + Send + Sync> = recorder.clone();
        let mut pool = ThreadPool::new(boards, writer, &debug).unwrap();
        pool.startup(&debug);

        assert_eq!(pool.dispatch(3, &arp_request([10, 0, 0, 50])), 1);
        assert_eq!(pool.dispatch(9, &arp_request([10, 0, 0, 50])), 0);

        let deadline = Instant::now() + Duration::from_secs(5);
        while recorder.frames.lock().unwrap().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        pool.drop(&debug);

        let frames = recorder.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0, 3);
    }

    #[test]
    fn an_empty_pool_is_refused() {
        let writer: Arc<dyn FrameWriter + Send + Sync> = Arc::new(Recorder::default());
        assert!(ThreadPool::new(Vec::new(), writer, &Verbose::default()).is_err());
    }
}
