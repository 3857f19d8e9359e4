//! Device demos.

use abyss::dev::network::{NetworkHub, Packet};
use abyss::{Machine, MachineConfig};
use anyhow::{anyhow, Context, Result};
use unios::dev::{ConsoleDriver, NetworkDriver, SerialDriver};
use unios::thread::ThreadBuilder;
use unios::{debug, println, warning, Kernel, KernelError, Report};

/// Echoes console input back to the display until a 'q' is typed.
pub fn console_echo(config: MachineConfig) -> Result<Report, KernelError> {
    Kernel::boot(config, || {
        debug!(CONSOLE, "ConsoleTest: starting");
        let console = ConsoleDriver::new(&Kernel::current());
        loop {
            let ch = console.get_char();
            console.put_char(ch);
            if ch == b'q' {
                debug!(CONSOLE, "ConsoleTest: quitting");
                console.stop();
                break;
            }
        }
    })
}

const MESSAGE: &[u8] = b"HELLO\0";

/// A sender and a receiver thread talk through loopback serial unit 0.
pub fn serial_loopback(config: MachineConfig) -> Result<Report, KernelError> {
    Kernel::boot(config, || {
        debug!(SERIAL, "Entering SerialTest");
        let kernel = Kernel::current();
        let serial = SerialDriver::new(&kernel);
        if let Err(e) = serial.open_port(&kernel, 0) {
            warning!("SerialTest: {}", e);
            return;
        }

        let sender = {
            let serial = serial.clone();
            ThreadBuilder::new("Sender thread").spawn(move || -> Result<(), KernelError> {
                for &byte in MESSAGE {
                    serial.put_byte(0, byte)?;
                    debug!(SERIAL, "Sender: sent {:#x} ({:?})", byte, byte as char);
                }
                Ok(())
            })
        };
        let receiver = {
            let serial = serial.clone();
            ThreadBuilder::new("Receiver thread").spawn(move || -> Result<Vec<u8>, KernelError> {
                let mut received = Vec::new();
                loop {
                    let byte = serial.get_byte(0)?;
                    debug!(SERIAL, "Receiver: got {:#x} ({:?})", byte, byte as char);
                    if byte == 0 {
                        break;
                    }
                    received.push(byte);
                }
                serial.close_port(&Kernel::current(), 0)?;
                Ok(received)
            })
        };

        if let Err(e) = sender.join() {
            warning!("Sender: {}", e);
        }
        match receiver.join() {
            Ok(received) => println!("Received {:?}", String::from_utf8_lossy(&received)),
            Err(e) => warning!("Receiver: {}", e),
        }
    })
}

/// Boots `count` machines on one network. Each greets every other machine,
/// then waits for a greeting from each of them.
pub fn network_greetings(config: MachineConfig, count: u8) -> Result<Vec<Report>> {
    let hub = NetworkHub::new();
    let machines = (0..count)
        .map(|id| {
            Machine::new(config.clone().with_network(hub.clone(), id))
                .with_context(|| format!("cannot build machine {}", id))
        })
        .collect::<Result<Vec<_>>>()?;

    std::thread::scope(|s| {
        let kernels: Vec<_> = machines
            .into_iter()
            .map(|machine| s.spawn(move || Kernel::boot_on(machine, move || greet(count))))
            .collect();
        kernels
            .into_iter()
            .map(|kernel| {
                kernel
                    .join()
                    .map_err(|_| anyhow!("a machine's kernel panicked"))?
                    .context("machine failed to boot")
            })
            .collect()
    })
}

fn greet(count: u8) {
    let net = NetworkDriver::new(&Kernel::current());
    let me = net.id();
    for dest in (0..count).filter(|&dest| dest != me) {
        let msg = format!("Greetings from {} to {}.", me, dest);
        let sent = Packet::new(dest, me, msg.as_bytes())
            .map_err(KernelError::from)
            .and_then(|packet| net.send(packet));
        match sent {
            Ok(()) => println!("NetworkTest: machine {} sent message: {}", me, msg),
            Err(e) => warning!("NetworkTest: machine {}: {}", me, e),
        }
    }
    for _ in 1..count {
        println!("NetworkTest: machine {} waiting to receive a message", me);
        let packet = net.receive();
        println!(
            "NetworkTest: machine {} received message: {}",
            me,
            String::from_utf8_lossy(&packet.contents)
        );
    }
}
