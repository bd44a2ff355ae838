//! finite-state machine module
//! This module includes the boards event loop: every board is driven by its
//! own worker thread, woken up by the received frames and the timer ticks.
use super::*;

// layers
use crate::ip::format_ip;
use crate::mac::format_mac;

// operating system drivers
use crate::os::drivers::FrameWriter;

// stream
use crate::stream::try_take;

// crossbeam
use crossbeam::channel::{Receiver, TrySendError};

// std
use std::time::Instant;

/// Board States Enumerator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum States {
    Init,
    Up,
    Down,
}

/// Event Enumerator
#[derive(Debug)]
pub enum Event {
    Startup,
    Frame(Vec<u8>), // frame received on the board's interface
    Tick,           // timer tick, advances the time-dependent layers
    Shutdown,       // internal shutdown event
    Terminate,
}

// fsm_run() function
/// run the board's finite-state machine until a Terminate event is received
pub fn fsm_run(id: usize, board: &mut Board, rx: &Receiver<Event>, writer: &dyn FrameWriter, debug: &Verbose) {
    loop {
        // listen for events
        let event = match rx.recv() {
            Ok(event) => event,
            Err(_) => {
                print_debug(
                    debug,
                    DEBUG_LEVEL_HIGH,
                    DEBUG_SRC_FSM,
                    format!("worker thread {} notification channel closed", id),
                );
                break;
            }
        };

        // handle terminate event first and foremost
        if let Event::Terminate = event {
            print_debug(
                debug,
                DEBUG_LEVEL_HIGH,
                DEBUG_SRC_FSM,
                format!("worker thread {} exited", id),
            );
            break;
        }

        let now = Instant::now();
        let next = match board.states {
            States::Down => continue,
            States::Init => match event {
                Event::Startup => {
                    print_debug(
                        debug,
                        DEBUG_LEVEL_INFO,
                        DEBUG_SRC_INFO,
                        format!(
                            "Starting board {} ({}) on interface {} (thread: {})",
                            format_mac(&board.stack.mac_address()),
                            format_ip(&board.stack.ip_address()),
                            board.interface,
                            id
                        ),
                    );
                    board.stack.poll(now);
                    transmit(board, writer, debug);
                    States::Up
                }
                _ => States::Init,
            },
            States::Up => match event {
                Event::Frame(frame) => {
                    receive(board, frame, now, writer, debug);
                    States::Up
                }
                Event::Tick => {
                    board.stack.poll(now);
                    transmit(board, writer, debug);
                    States::Up
                }
                Event::Shutdown => {
                    print_debug(
                        debug,
                        DEBUG_LEVEL_LOW,
                        DEBUG_SRC_FSM,
                        format!(
                            "board on {} going down, {:?}, {} frame(s) dropped",
                            board.interface,
                            board.stack.stats(),
                            board.dropped
                        ),
                    );
                    States::Down
                }
                _ => States::Up,
            },
        };
        if next != board.states {
            print_debug(
                debug,
                DEBUG_LEVEL_EXTENSIVE,
                DEBUG_SRC_FSM,
                format!("worker thread {} {:?} -> {:?}", id, board.states, next),
            );
        }
        board.states = next;
    }
}

// receive() function
/// hand a frame over to the board's PHY then run the stack
fn receive(board: &mut Board, frame: Vec<u8>, now: Instant, writer: &dyn FrameWriter, debug: &Verbose) {
    if !board.accepts(&frame) {
        return;
    }
    let frame = match board.phy.sink.try_send(frame) {
        Ok(()) => None,
        Err(TrySendError::Full(frame)) => Some(frame),
        Err(TrySendError::Disconnected(_)) => return,
    };
    board.stack.poll(now);
    // the PHY was full, retry once the stack drained it
    if let Some(frame) = frame {
        if board.phy.sink.try_send(frame).is_err() {
            board.dropped += 1;
            print_debug(
                debug,
                DEBUG_LEVEL_MEDIUM,
                DEBUG_SRC_FSM,
                format!("board on {} is busy, frame dropped", board.interface),
            );
        }
        board.stack.poll(now);
    }
    transmit(board, writer, debug);
}

// transmit() function
/// write every frame the board produced on its interface
fn transmit(board: &mut Board, writer: &dyn FrameWriter, debug: &Verbose) {
    while let Some(frame) = try_take(&board.phy.source) {
        if let Err(e) = writer.write_frame(board.ifindex, &frame) {
            print_debug(
                debug,
                DEBUG_LEVEL_MEDIUM,
                DEBUG_SRC_FSM,
                format!("cannot send frame on {}: {}", board.interface, e),
            );
        }
    }
}
