//! Synchronous network access.

use crate::sync::{Lock, Semaphore};
use crate::{Kernel, KernelError};
use abyss::dev::network::Packet;
use abyss::interrupt::Irq;
use abyss::Machine;
use std::sync::Arc;

/// Blocking packet send and receive.
pub struct NetworkDriver {
    machine: Arc<Machine>,
    send_lock: Lock,
    send_done: Semaphore,
    received: Semaphore,
}

impl NetworkDriver {
    /// Creates the driver and registers its interrupt handlers on `kernel`.
    pub fn new(kernel: &Kernel) -> Arc<Self> {
        let driver = Arc::new(Self {
            machine: kernel.machine().clone(),
            send_lock: Lock::new("synch network send lock"),
            send_done: Semaphore::new("synch network send sem", 0),
            received: Semaphore::new("synch network receive sem", 0),
        });
        let sender = driver.clone();
        kernel.register_handler(
            Irq::NetworkSend,
            Arc::new(move |_: &Kernel| sender.send_done.v()),
        );
        let receiver = driver.clone();
        kernel.register_handler(
            Irq::NetworkRecv,
            Arc::new(move |_: &Kernel| receiver.received.v()),
        );
        driver
    }

    /// This machine's network address.
    pub fn id(&self) -> u8 {
        self.machine.network().id()
    }

    /// Sends `packet`, waiting until it has left the machine. Only one send
    /// is in flight at a time.
    pub fn send(&self, packet: Packet) -> Result<(), KernelError> {
        self.send_lock.acquire();
        let result = self.machine.network().send(packet);
        if result.is_ok() {
            self.send_done.p();
        }
        self.send_lock.release();
        Ok(result?)
    }

    /// Waits for the next packet addressed to this machine.
    pub fn receive(&self) -> Packet {
        let network = self.machine.network();
        let _listening = network.listen();
        self.received.p();
        network
            .receive()
            .unwrap_or_else(|| unreachable!("receive interrupt without a packet"))
    }
}
