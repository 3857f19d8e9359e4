//! Simulated disk.
//!
//! A single-platter disk with one head. A request copies the data right away
//! but completes, raising [`Irq::Disk`], only after the head has sought to
//! the track and the sector has rotated under it. The disk accepts one
//! request at a time.

use super::DeviceError;
use crate::interrupt::{Irq, Wakeup};
use crate::machine::Machine;
use crate::stats::{ROTATION_TIME, SEEK_TIME};
use spin_lock::SpinLock;

pub const SECTOR_SIZE: usize = 128;
pub const SECTORS_PER_TRACK: usize = 32;
pub const NUM_TRACKS: usize = 32;
pub const NUM_SECTORS: usize = SECTORS_PER_TRACK * NUM_TRACKS;
/// Size of the disk in bytes.
pub const DISK_SIZE: usize = NUM_SECTORS * SECTOR_SIZE;

struct DiskInner {
    data: Vec<u8>,
    active: bool,
    last_sector: usize,
}

pub(crate) struct DiskState {
    inner: SpinLock<DiskInner>,
}

impl DiskState {
    pub(crate) fn new(mut image: Vec<u8>) -> Self {
        image.resize(DISK_SIZE, 0);
        Self {
            inner: SpinLock::new(DiskInner {
                data: image,
                active: false,
                last_sector: 0,
            }),
        }
    }
}

/// View of the machine's disk.
pub struct Disk<'a> {
    machine: &'a Machine,
    state: &'a DiskState,
}

fn check(sector: usize, len: usize) -> Result<core::ops::Range<usize>, DeviceError> {
    if sector >= NUM_SECTORS {
        return Err(DeviceError::SectorOutOfRange(sector));
    }
    if len != SECTOR_SIZE {
        return Err(DeviceError::BadBufferSize(len));
    }
    Ok(sector * SECTOR_SIZE..(sector + 1) * SECTOR_SIZE)
}

// Rotational distance from sector `from` to sector `to`, in ticks.
fn modulo_diff(to: usize, from: usize) -> u64 {
    let to = to % SECTORS_PER_TRACK;
    let from = from % SECTORS_PER_TRACK;
    ((to + SECTORS_PER_TRACK - from) % SECTORS_PER_TRACK) as u64 * ROTATION_TIME
}

impl<'a> Disk<'a> {
    pub(crate) fn new(machine: &'a Machine) -> Self {
        Self {
            machine,
            state: &machine.disk,
        }
    }

    /// Reads `sector` into `data`. Completion is signalled by [`Irq::Disk`].
    pub fn read_request(&self, sector: usize, data: &mut [u8]) -> Result<(), DeviceError> {
        let range = check(sector, data.len())?;
        let latency = {
            let mut inner = self.state.inner.lock();
            assert!(!inner.active, "Disk: only one request at a time");
            data.copy_from_slice(&inner.data[range]);
            self.start(&mut inner, sector)
        };
        debug!(DISK, "Reading from sector {}", sector);
        self.machine.with_stats(|stats| stats.num_disk_reads += 1);
        self.complete_after(latency);
        Ok(())
    }

    /// Writes `data` to `sector`. Completion is signalled by [`Irq::Disk`].
    pub fn write_request(&self, sector: usize, data: &[u8]) -> Result<(), DeviceError> {
        let range = check(sector, data.len())?;
        let latency = {
            let mut inner = self.state.inner.lock();
            assert!(!inner.active, "Disk: only one request at a time");
            inner.data[range].copy_from_slice(data);
            self.start(&mut inner, sector)
        };
        debug!(DISK, "Writing to sector {}", sector);
        self.machine.with_stats(|stats| stats.num_disk_writes += 1);
        self.complete_after(latency);
        Ok(())
    }

    fn start(&self, inner: &mut DiskInner, sector: usize) -> u64 {
        let latency = Self::latency(self.machine.ticks(), inner.last_sector, sector);
        inner.active = true;
        inner.last_sector = sector;
        latency
    }

    fn complete_after(&self, latency: u64) {
        self.machine.schedule(Irq::Disk, latency, Wakeup::Event, |machine| {
            machine.disk().state.inner.lock().active = false;
            true
        });
    }

    /// Ticks until a request for `new_sector`, issued at time `now` with the
    /// head over `last_sector`, completes: seek, wait for the start of the
    /// next sector, rotate to `new_sector`, then transfer one sector.
    pub fn latency(now: u64, last_sector: usize, new_sector: usize) -> u64 {
        let new_track = new_sector / SECTORS_PER_TRACK;
        let old_track = last_sector / SECTORS_PER_TRACK;
        let seek = new_track.abs_diff(old_track) as u64 * SEEK_TIME;
        let mut rotation = match (now + seek) % ROTATION_TIME {
            0 => 0,
            over => ROTATION_TIME - over,
        };
        let after = now + seek + rotation;
        rotation += modulo_diff(new_sector, (after / ROTATION_TIME) as usize);
        seek + rotation + ROTATION_TIME
    }

    /// Returns true while a request is in flight.
    pub fn is_busy(&self) -> bool {
        self.state.inner.lock().active
    }

    /// A copy of the whole disk.
    pub fn image(&self) -> Vec<u8> {
        self.state.inner.lock().data.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MachineConfig;

    #[test]
    fn latency_counts_seek_and_rotation() {
        // No seek, on a sector boundary, already at the sector: transfer only.
        assert_eq!(Disk::latency(0, 0, 0), ROTATION_TIME);
        // Same track, three sectors ahead.
        assert_eq!(Disk::latency(0, 0, 3), 4 * ROTATION_TIME);
        // One track over; the platter turns one sector during the seek.
        assert_eq!(Disk::latency(0, 0, SECTORS_PER_TRACK + 1), SEEK_TIME + ROTATION_TIME);
        // Mid-sector: wait for the boundary first.
        assert_eq!(Disk::latency(100, 0, 1), 400 + ROTATION_TIME);
    }

    #[test]
    fn rejects_bad_requests() {
        let machine = Machine::new(MachineConfig::default()).unwrap();
        let disk = machine.disk();
        let mut buf = [0; SECTOR_SIZE];
        assert_eq!(
            disk.read_request(NUM_SECTORS, &mut buf),
            Err(DeviceError::SectorOutOfRange(NUM_SECTORS))
        );
        assert_eq!(
            disk.write_request(0, &buf[..10]),
            Err(DeviceError::BadBufferSize(10))
        );
        assert_eq!(
            DeviceError::BadBufferSize(10).to_string(),
            "sector buffer holds 10 bytes, expected 128"
        );
        assert!(!disk.is_busy());
    }

    #[test]
    fn image_round_trip() {
        let mut image = vec![0; SECTOR_SIZE * 2];
        image[SECTOR_SIZE..].fill(7);
        let machine = Machine::new(MachineConfig::default().with_disk_image(image)).unwrap();
        let disk = machine.disk();
        let mut buf = [0; SECTOR_SIZE];
        disk.read_request(1, &mut buf).unwrap();
        assert_eq!(buf, [7; SECTOR_SIZE]);
        assert!(disk.is_busy());
        assert_eq!(machine.stats().num_disk_reads, 1);
        assert_eq!(machine.pending_interrupts(), 1);
    }
}
