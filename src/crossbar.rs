//! crossbar module
//! This module implements the static key-based dispatcher/arbiter used between
//! the MAC and its protocols (EtherType), IPv4 and its protocols (protocol
//! number) and UDP and its users (destination port).
use super::*;

// stream
use crate::stream::{pipe, try_take, Pending};

// crossbeam
use crossbeam::channel::{Receiver, Sender, TrySendError};

// std
use std::collections::BTreeMap;

/// Keyed Trait
/// Implemented by the records a crossbar dispatches.
pub trait Keyed {
    fn key(&self) -> u16;
}

/// Crossbar Kind Enumerator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CrossbarKind {
    EtherType,
    IpProtocol,
    UdpPort,
}

// CrossbarKind Implementation
impl CrossbarKind {
    // duplicate() method
    fn duplicate(&self, key: u16) -> StackError {
        match self {
            CrossbarKind::EtherType => StackError::EtherTypeAlreadyAssigned(key),
            CrossbarKind::IpProtocol => StackError::ProtocolAlreadyAssigned(key),
            CrossbarKind::UdpPort => StackError::PortAlreadyAssigned(key),
        }
    }
    // name() method
    fn name(&self) -> &'static str {
        match self {
            CrossbarKind::EtherType => "ethernet type",
            CrossbarKind::IpProtocol => "ip protocol",
            CrossbarKind::UdpPort => "udp port",
        }
    }
}

/// Crossbar Port Structure
///
/// The subscriber view: `sink` to transmit, `source` to receive.
#[derive(Debug)]
pub struct CrossbarPort<T> {
    pub key: u16,
    pub sink: Sender<T>,
    pub source: Receiver<T>,
}

/// Crossbar Master Structure
///
/// The lower layer view: `sink` takes received records to dispatch,
/// `source` yields arbitrated records to transmit.
#[derive(Debug)]
pub struct CrossbarMaster<T> {
    pub sink: Sender<T>,
    pub source: Receiver<T>,
}

// both ends are channel handles, the records need not be Clone
impl<T> Clone for CrossbarMaster<T> {
    fn clone(&self) -> Self {
        CrossbarMaster {
            sink: self.sink.clone(),
            source: self.source.clone(),
        }
    }
}

/// Crossbar Statistics Structure
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CrossbarStats {
    pub dispatched: u64,
    pub unknown: u64,
    pub arbitrated: u64,
}

/// Crossbar Structure
#[derive(Debug)]
pub struct Crossbar<T: Keyed> {
    kind: CrossbarKind,
    depth: usize,
    // master side
    master: CrossbarMaster<T>,
    rx: Receiver<T>,
    tx: Sender<T>,
    rx_pending: Pending<T>,
    rx_pending_key: u16,
    tx_pending: Pending<T>,
    // users side
    users: BTreeMap<u16, Sender<T>>,
    sources: Vec<(u16, Receiver<T>)>,
    rr: usize,
    stats: CrossbarStats,
    debug: Verbose,
}

// Crossbar Implementation
impl<T: Keyed> Crossbar<T> {
    // new() method
    pub fn new(kind: CrossbarKind, depth: usize, debug: &Verbose) -> Crossbar<T> {
        let (rx_sink, rx) = pipe(depth);
        let (tx, tx_source) = pipe(depth);
        Crossbar {
            kind,
            depth,
            master: CrossbarMaster {
                sink: rx_sink,
                source: tx_source,
            },
            rx,
            tx,
            rx_pending: Pending::new(),
            rx_pending_key: 0,
            tx_pending: Pending::new(),
            users: BTreeMap::new(),
            sources: Vec::new(),
            rr: 0,
            stats: CrossbarStats::default(),
            debug: *debug,
        }
    }
    // master() method
    pub fn master(&self) -> CrossbarMaster<T> {
        self.master.clone()
    }
    // get_port() method
    /// register a subscriber, keys are unique per crossbar
    pub fn get_port(&mut self, key: u16) -> Result<CrossbarPort<T>, StackError> {
        if self.users.contains_key(&key) {
            return Err(self.kind.duplicate(key));
        }
        let (to_user, source) = pipe(self.depth);
        let (sink, from_user) = pipe(self.depth);
        self.users.insert(key, to_user);
        self.sources.push((key, from_user));
        print_debug(
            &self.debug,
            DEBUG_LEVEL_EXTENSIVE,
            DEBUG_SRC_CROSSBAR,
            format!("{} {:#x} registered", self.kind.name(), key),
        );
        Ok(CrossbarPort { key, sink, source })
    }
    // stats() getter
    pub fn stats(&self) -> CrossbarStats {
        self.stats
    }
    // step() method
    /// dispatch one received record and arbitrate one transmitted record
    pub fn step(&mut self) -> bool {
        self.dispatch() | self.arbitrate()
    }
    // dispatch() method
    fn dispatch(&mut self) -> bool {
        let mut progress = false;
        if self.rx_pending.is_busy() {
            let key = self.rx_pending_key;
            match self.users.get(&key) {
                Some(user) => {
                    if !self.rx_pending.flush(user) {
                        return false;
                    }
                    progress = true;
                }
                None => self.rx_pending = Pending::new(),
            }
        }
        let item = match try_take(&self.rx) {
            Some(item) => item,
            None => return progress,
        };
        let key = item.key();
        match self.users.get(&key) {
            Some(user) => {
                self.stats.dispatched += 1;
                match user.try_send(item) {
                    Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                    Err(TrySendError::Full(item)) => {
                        self.rx_pending_key = key;
                        self.rx_pending.put(item);
                    }
                }
            }
            None => {
                self.stats.unknown += 1;
                print_debug(
                    &self.debug,
                    DEBUG_LEVEL_MEDIUM,
                    DEBUG_SRC_CROSSBAR,
                    format!("no subscriber for {} {:#x}, dropped", self.kind.name(), key),
                );
            }
        }
        true
    }
    // arbitrate() method
    /// round-robin over the users, the first ready after the last winner wins
    fn arbitrate(&mut self) -> bool {
        if self.tx_pending.is_busy() && !self.tx_pending.flush(&self.tx) {
            return false;
        }
        let n = self.sources.len();
        for i in 0..n {
            let idx = (self.rr + i) % n;
            if let Some(item) = try_take(&self.sources[idx].1) {
                self.rr = (idx + 1) % n;
                self.stats.arbitrated += 1;
                self.tx_pending.send(&self.tx, item);
                return true;
            }
        }
        false
    }
}

// Tests
#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Rec(u16, u32);

    impl Keyed for Rec {
        fn key(&self) -> u16 {
            self.0
        }
    }

    #[test]
    fn duplicate_keys_are_refused() {
        let mut xbar: Crossbar<Rec> = Crossbar::new(CrossbarKind::UdpPort, 4, &Verbose::default());
        assert!(xbar.get_port(1234).is_ok());
        match xbar.get_port(1234) {
            Err(StackError::PortAlreadyAssigned(1234)) => {}
            other => panic!("unexpected {:?}", other.map(|p| p.key)),
        }
    }

    #[test]
    fn dispatch_by_key_and_count_unknown() {
        let mut xbar: Crossbar<Rec> =
            Crossbar::new(CrossbarKind::EtherType, 4, &Verbose::default());
        let arp = xbar.get_port(0x0806).unwrap();
        let ip = xbar.get_port(0x0800).unwrap();
        let master = xbar.master();
        master.sink.send(Rec(0x0800, 1)).unwrap();
        master.sink.send(Rec(0x86dd, 2)).unwrap();
        master.sink.send(Rec(0x0806, 3)).unwrap();
        while xbar.step() {}
        assert_eq!(ip.source.try_recv().unwrap(), Rec(0x0800, 1));
        assert_eq!(arp.source.try_recv().unwrap(), Rec(0x0806, 3));
        assert_eq!(xbar.stats().unknown, 1);
        assert_eq!(xbar.stats().dispatched, 2);
    }

    #[test]
    fn arbitration_services_every_ready_user() {
        let mut xbar: Crossbar<Rec> =
            Crossbar::new(CrossbarKind::IpProtocol, 8, &Verbose::default());
        let a = xbar.get_port(1).unwrap();
        let b = xbar.get_port(17).unwrap();
        for i in 0..3 {
            a.sink.send(Rec(1, i)).unwrap();
            b.sink.send(Rec(17, i)).unwrap();
        }
        while xbar.step() {}
        let master = xbar.master();
        let order: Vec<u16> = master.source.try_iter().map(|r| r.0).collect();
        assert_eq!(order, vec![1, 17, 1, 17, 1, 17]);
    }

    #[test]
    fn full_subscriber_backpressures() {
        let mut xbar: Crossbar<Rec> = Crossbar::new(CrossbarKind::UdpPort, 1, &Verbose::default());
        let port = xbar.get_port(7).unwrap();
        let master = xbar.master();
        master.sink.send(Rec(7, 1)).unwrap();
        xbar.step();
        master.sink.send(Rec(7, 2)).unwrap();
        xbar.step();
        // second record is held by the crossbar
        assert!(!xbar.step());
        assert_eq!(port.source.try_recv().unwrap(), Rec(7, 1));
        assert!(xbar.step());
        assert_eq!(port.source.try_recv().unwrap(), Rec(7, 2));
    }
}
