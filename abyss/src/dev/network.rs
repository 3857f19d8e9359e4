//! Simulated network interface.
//!
//! Machines attached to the same [`NetworkHub`] exchange fixed-size-bounded
//! packets. A send completes [`NETWORK_TIME`] ticks later, raising
//! [`Irq::NetworkSend`]; at that moment the packet is put in the
//! destination's mailbox, unless the unreliable link drops it. Each interface
//! polls its mailbox every [`NETWORK_TIME`] ticks and raises
//! [`Irq::NetworkRecv`] when it has taken a packet in. The next packet is
//! not taken in until the previous one has been received.

use super::DeviceError;
use crate::interrupt::{Irq, Wakeup};
use crate::machine::Machine;
use crate::stats::NETWORK_TIME;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use crossbeam_queue::ArrayQueue;
use rand::Rng;
use spin_lock::SpinLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Largest packet on the wire, header included.
pub const MAX_WIRE_SIZE: usize = 64;
/// Destination, source and length bytes.
pub const HEADER_SIZE: usize = 3;
/// Largest payload of a packet.
pub const MAX_PAYLOAD: usize = MAX_WIRE_SIZE - HEADER_SIZE;
/// Packets a mailbox holds before the link drops further deliveries.
pub const MAILBOX_CAPACITY: usize = 32;

/// A network packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub to: u8,
    pub from: u8,
    pub contents: Vec<u8>,
}

impl Packet {
    pub fn new(to: u8, from: u8, contents: impl Into<Vec<u8>>) -> Result<Self, DeviceError> {
        let contents = contents.into();
        if contents.len() > MAX_PAYLOAD {
            return Err(DeviceError::PacketTooLarge(contents.len()));
        }
        Ok(Self { to, from, contents })
    }
}

/// The wire between machines.
///
/// Every attached machine owns a mailbox keyed by its network address.
pub struct NetworkHub {
    mailboxes: SpinLock<BTreeMap<u8, Arc<ArrayQueue<Packet>>>>,
}

impl NetworkHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            mailboxes: SpinLock::new(BTreeMap::new()),
        })
    }

    fn attach(&self, id: u8) -> Result<Arc<ArrayQueue<Packet>>, DeviceError> {
        let mut mailboxes = self.mailboxes.lock();
        if mailboxes.contains_key(&id) {
            return Err(DeviceError::AddressInUse(id));
        }
        let mailbox = Arc::new(ArrayQueue::new(MAILBOX_CAPACITY));
        mailboxes.insert(id, mailbox.clone());
        Ok(mailbox)
    }

    fn detach(&self, id: u8) {
        self.mailboxes.lock().remove(&id);
    }

    fn deliver(&self, packet: Packet) -> bool {
        let mailbox = self.mailboxes.lock().get(&packet.to).cloned();
        match mailbox {
            Some(mailbox) => mailbox.push(packet).is_ok(),
            None => false,
        }
    }

    /// Addresses of the attached machines.
    pub fn members(&self) -> Vec<u8> {
        self.mailboxes.lock().keys().copied().collect()
    }

    fn has_peers(&self, id: u8) -> bool {
        self.mailboxes.lock().keys().any(|&other| other != id)
    }
}

impl fmt::Debug for NetworkHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkHub")
            .field("members", &self.members())
            .finish()
    }
}

struct Nic {
    sending: bool,
    incoming: Option<Packet>,
}

pub(crate) struct NetworkState {
    id: u8,
    hub: Option<Arc<NetworkHub>>,
    mailbox: Option<Arc<ArrayQueue<Packet>>>,
    attached: AtomicBool,
    reliability: f64,
    listeners: AtomicUsize,
    nic: SpinLock<Nic>,
}

impl NetworkState {
    pub(crate) fn new(
        id: u8,
        hub: Option<Arc<NetworkHub>>,
        reliability: f64,
    ) -> Result<Self, DeviceError> {
        let mailbox = hub.as_ref().map(|hub| hub.attach(id)).transpose()?;
        Ok(Self {
            id,
            attached: AtomicBool::new(mailbox.is_some()),
            hub,
            mailbox,
            reliability,
            listeners: AtomicUsize::new(0),
            nic: SpinLock::new(Nic {
                sending: false,
                incoming: None,
            }),
        })
    }

    pub(crate) fn detach(&self) {
        if self.attached.swap(false, Ordering::SeqCst) {
            if let Some(hub) = &self.hub {
                hub.detach(self.id);
            }
        }
    }
}

/// Marks a receive in progress; see [`Network::listen`].
pub struct Listening<'a> {
    state: &'a NetworkState,
}

impl Drop for Listening<'_> {
    fn drop(&mut self) {
        self.state.listeners.fetch_sub(1, Ordering::SeqCst);
    }
}

/// View of the machine's network interface.
pub struct Network<'a> {
    machine: &'a Machine,
    state: &'a NetworkState,
}

impl<'a> Network<'a> {
    pub(crate) fn new(machine: &'a Machine) -> Self {
        Self {
            machine,
            state: &machine.network,
        }
    }

    /// This machine's network address.
    pub fn id(&self) -> u8 {
        self.state.id
    }

    pub fn is_attached(&self) -> bool {
        self.state.attached.load(Ordering::SeqCst)
    }

    pub(crate) fn detach(&self) {
        self.state.detach();
    }

    pub(crate) fn start_polling(&self) {
        if self.is_attached() {
            self.schedule_poll();
        }
    }

    fn schedule_poll(&self) {
        self.machine
            .schedule(Irq::NetworkRecv, NETWORK_TIME, Wakeup::Poll, |machine| {
                machine.network().poll()
            });
    }

    fn poll(&self) -> bool {
        if !self.is_attached() {
            return false;
        }
        self.schedule_poll();
        let arrived = {
            let mut nic = self.state.nic.lock();
            match (&nic.incoming, &self.state.mailbox) {
                (None, Some(mailbox)) => {
                    nic.incoming = mailbox.pop();
                    nic.incoming.is_some()
                }
                _ => false,
            }
        };
        if arrived {
            self.machine.with_stats(|stats| stats.num_packets_recvd += 1);
        }
        arrived
    }

    /// Sends `packet`, stamped with this machine's address as its source.
    /// Completion is signalled by [`Irq::NetworkSend`].
    pub fn send(&self, mut packet: Packet) -> Result<(), DeviceError> {
        if packet.contents.len() > MAX_PAYLOAD {
            return Err(DeviceError::PacketTooLarge(packet.contents.len()));
        }
        let hub = match &self.state.hub {
            Some(hub) if self.is_attached() => hub.clone(),
            _ => return Err(DeviceError::NoNetwork),
        };
        {
            let mut nic = self.state.nic.lock();
            assert!(!nic.sending, "Network: only one send at a time");
            nic.sending = true;
        }
        packet.from = self.state.id;
        debug!(
            NETWORK,
            "Sending to {} from {}: {} bytes", packet.to, packet.from, packet.contents.len()
        );
        let reliability = self.state.reliability;
        self.machine
            .schedule(Irq::NetworkSend, NETWORK_TIME, Wakeup::Event, move |machine| {
                machine.network().state.nic.lock().sending = false;
                machine.with_stats(|stats| stats.num_packets_sent += 1);
                if machine.with_rng(|rng| rng.gen::<f64>()) < reliability {
                    if !hub.deliver(packet) {
                        debug!(NETWORK, "Packet dropped: destination unreachable");
                    }
                } else {
                    debug!(NETWORK, "Packet dropped by the link");
                }
                true
            });
        Ok(())
    }

    /// Takes the packet that raised the last receive interrupt, if any.
    pub fn receive(&self) -> Option<Packet> {
        self.state.nic.lock().incoming.take()
    }

    /// Announces a receive in progress. While any listener lives and a
    /// packet may still arrive, the machine keeps polling instead of halting.
    pub fn listen(&self) -> Listening<'a> {
        self.state.listeners.fetch_add(1, Ordering::SeqCst);
        Listening { state: self.state }
    }

    /// Returns true if a packet can still be taken in at the next poll.
    pub(crate) fn wants_poll(&self) -> bool {
        let Some(mailbox) = &self.state.mailbox else {
            return false;
        };
        self.is_attached()
            && self.state.nic.lock().incoming.is_none()
            && (!mailbox.is_empty()
                || (self.state.listeners.load(Ordering::SeqCst) > 0
                    && self.state.hub.as_ref().is_some_and(|hub| hub.has_peers(self.state.id))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MachineConfig;

    #[test]
    fn addresses_are_unique() {
        let hub = NetworkHub::new();
        let a = Machine::new(MachineConfig::default().with_network(hub.clone(), 1)).unwrap();
        assert!(matches!(
            Machine::new(MachineConfig::default().with_network(hub.clone(), 1)),
            Err(DeviceError::AddressInUse(1))
        ));
        assert_eq!(hub.members(), [1]);
        drop(a);
        assert!(hub.members().is_empty());
    }

    #[test]
    fn rejects_oversized_and_offline_sends() {
        assert_eq!(
            Packet::new(0, 0, vec![0; MAX_PAYLOAD + 1]),
            Err(DeviceError::PacketTooLarge(MAX_PAYLOAD + 1))
        );
        let machine = Machine::new(MachineConfig::default()).unwrap();
        let packet = Packet::new(1, 0, "hi").unwrap();
        assert_eq!(machine.network().send(packet), Err(DeviceError::NoNetwork));
    }

    #[test]
    fn lossy_link_drops_everything_at_zero() {
        let hub = NetworkHub::new();
        let a = Machine::new(
            MachineConfig::default()
                .with_network(hub.clone(), 0)
                .with_reliability(0.0),
        )
        .unwrap();
        let b = Machine::new(MachineConfig::default().with_network(hub.clone(), 1)).unwrap();
        let mailbox = b.network().state.mailbox.clone().unwrap();

        a.network().send(Packet::new(1, 0, "lost").unwrap()).unwrap();
        a.with_stats(|stats| stats.total_ticks = NETWORK_TIME);
        // Fires the send completion (raised, but no kernel is attached).
        let fired = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            a.set_level(crate::interrupt::InterruptState::On)
        }));
        assert!(fired.is_err());
        assert!(mailbox.is_empty());
        assert_eq!(a.stats().num_packets_sent, 1);
    }
}
