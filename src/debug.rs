//! debugging module
//! This module provides debugging related functions.
use super::*;

// chrono
use chrono::{DateTime, Local, Utc};

// Verbose Structure
#[derive(Debug, Clone, Copy)]
pub struct Verbose {
    level: u8,
    time_zone: u8,
    time_format: u8,
}

// Verbose type implementation
impl Verbose {
    // new() method
    pub fn new(level: u8, time_zone: u8, time_format: u8) -> Verbose {
        Verbose {
            level,
            time_zone,
            time_format,
        }
    }
    // level() getter
    pub fn level(&self) -> u8 {
        self.level
    }
}

// Default verbosity only reports informational messages
impl Default for Verbose {
    fn default() -> Self {
        Verbose::new(DEBUG_LEVEL_INFO, 0, 1)
    }
}

// print_debug() function
/// This function simply print debugging information according to the specified level
/// and source of the message.
pub fn print_debug(debug: &Verbose, msg_level: u8, msg_src: &str, msg: String) {
    if debug.level < msg_level {
        return;
    }
    match debug.time_format {
        // disabled
        0 => println!("{}: {}", msg_src, msg),
        _ => match debug.time_zone {
            1 => {
                // UTC
                let now: DateTime<Utc> = Utc::now();
                match debug.time_format {
                    2 => println!("[{}] {}: {}", now.to_rfc2822(), msg_src, msg),
                    _ => println!(
                        "[{}] {}: {}",
                        now.format(RETHERD_DFLT_DATE_FORMAT),
                        msg_src,
                        msg
                    ),
                }
            }
            // local
            _ => {
                let now: DateTime<Local> = Local::now();
                match debug.time_format {
                    2 => println!("[{}] {}: {}", now.to_rfc2822(), msg_src, msg),
                    _ => println!(
                        "[{}] {}: {}",
                        now.format(RETHERD_DFLT_DATE_FORMAT),
                        msg_src,
                        msg
                    ),
                }
            }
        },
    }
}
