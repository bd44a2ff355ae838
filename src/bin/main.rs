//! # rEtherd
//!
//! `rEtherd` runs software Ethernet boards (UDP/IP stack and Etherbone target)
//! on top of the host network interfaces.
extern crate rEtherd;
use rEtherd::constants::{RETHERD_BANNER, RETHERD_DFLT_CFG_FILE, RETHERD_NAME, RETHERD_VERSION};
use rEtherd::{run_stacks, Config};

// getopts
use getopts::{Matches, Options};

// std
use std::env;
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ctrlc (linux signal handling)
extern crate ctrlc;

/// Command-line Error Type
#[derive(Debug)]
struct CliError(String);

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Error: {}", self.0)
    }
}
impl Error for CliError {}

// cli_error() function
fn cli_error<T>(msg: String) -> Result<T, Box<dyn Error>> {
    Err(Box::new(CliError(msg)))
}

// print_usage() function
fn print_usage(program: &str, opts: &Options) {
    let brief = format!(
        "Usage: {prog} -m 0 -i INTERFACE [-d LEVEL]\n       {prog} -m 1|2 [-c FILE] [-d LEVEL]",
        prog = program
    );
    print!("{}", opts.usage(&brief));
    println!(
        "\nModes:\n\
         \x20 0  sniffer: print a one-line summary of every Ethernet frame seen on INTERFACE\n\
         \x20 1  boards: run the boards of the configuration file in the foreground\n\
         \x20 2  daemon: same as 1, detached, with pid file and log files\n\
         \nEach [[board]] section of the configuration file emulates one Ethernet device\n\
         (MAC, ARP, IPv4, ICMP echo, UDP, DHCP client, Etherbone target and UDP streamer)\n\
         answering on the interface it names. CTRL-C stops the boards and restores the\n\
         interfaces flags."
    );
}

// parse_u8() function
fn parse_u8(matches: &Matches, name: &str, what: &str) -> Result<Option<u8>, Box<dyn Error>> {
    match matches.opt_str(name) {
        Some(x) => match x.parse::<u8>() {
            Ok(v) => Ok(Some(v)),
            Err(_) => cli_error(format!("invalid {} {:?}", what, x)),
        },
        None => Ok(None),
    }
}

// parse_cli_opts() function
/// None when only help or version information was requested
fn parse_cli_opts(args: &[String]) -> Result<Option<Config>, Box<dyn Error>> {
    let program = args[0].clone();
    let mut opts = Options::new();

    opts.optflag("h", "help", "print this help and the operation modes");
    opts.optflag("V", "version", "print the version and exit");
    opts.optopt("m", "mode", "0 (sniffer), 1 (boards) or 2 (boards as a daemon)", "MODE");
    opts.optopt("i", "iface", "interface to sniff on, required by mode 0", "INTERFACE");
    opts.optopt(
        "c",
        "conf",
        &format!("boards configuration file (default {})", RETHERD_DFLT_CFG_FILE),
        "FILE",
    );
    opts.optopt(
        "d",
        "debug",
        "log verbosity, overrides the configuration file:\n0 (none), 1 (low), 2 (medium), 3 (high, with hex dumps), 5 (every layer transition)",
        "LEVEL",
    );

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => return cli_error(f.to_string()),
    };

    if matches.opt_present("version") {
        println!("{} v{}", RETHERD_NAME, RETHERD_VERSION);
        return Ok(None);
    }
    if matches.opt_present("help") || args[1..].is_empty() {
        print_usage(&program, &opts);
        return Ok(None);
    }

    let mode = match parse_u8(&matches, "mode", "operation mode")? {
        Some(m) if m <= 2 => m,
        Some(m) => return cli_error(format!("unknown operation mode {}, expected 0, 1 or 2", m)),
        None => return cli_error("no operation mode specified (-m)".to_string()),
    };

    // the sniffer needs an interface, the boards name theirs in the configuration
    let iface = matches.opt_str("iface");
    if mode == 0 && iface.is_none() {
        return cli_error("the sniffer needs an interface (-i)".to_string());
    }

    let debug = parse_u8(&matches, "debug", "debugging level")?;

    Ok(Some(Config::new(iface, mode, matches.opt_str("conf"), debug)))
}

// run() function
fn run(cfg: Config) -> Result<(), Box<dyn Error>> {
    println!("{}", RETHERD_BANNER);
    println!("Starting {} v{}", RETHERD_NAME, RETHERD_VERSION);

    // raised by SIGINT, polled by the receive loop
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        println!("\nReceived CTRL-C (SIGINT), stopping the boards");
        flag.store(true, Ordering::Relaxed);
    })?;

    run_stacks(&cfg, shutdown)
        .map_err(|e| Box::new(CliError(format!("boards stopped on error: {}", e))) as Box<dyn Error>)
}

// main() function
fn main() {
    let args: Vec<String> = env::args().collect();

    let result = match parse_cli_opts(&args) {
        Ok(Some(cfg)) => run(cfg),
        Ok(None) => Ok(()),
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
