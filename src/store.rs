//! # Persistence
//! The byte store the bell keeps its schedule and password in, and the layout of the image inside it.
//!
//! The store behaves like an emulated EEPROM: single writes land in a shadow copy and only an explicit commit makes
//! them durable. Nothing spans two commits, so a power loss before a commit leaves the previous image in place.
//!
//! Layout (see [`crate::config`]):
//!
//! | offset            | size                    | content                                  |
//! |-------------------|-------------------------|------------------------------------------|
//! | 0                 | 4                       | event count, u32 little endian           |
//! | 4                 | 3 * `MAX_EVENTS`        | records of hour, minute, rings           |
//! | `PASSWORD_ADDR`   | `PASSWORD_MAX_LEN` + 1  | password, NUL terminated                 |
use crate::config::{
    COUNT_WIDTH, EVENT_RECORD_WIDTH, EVENTS_ADDR, EVENTS_END, IMAGE_SIZE, MAX_EVENTS, PASSWORD_ADDR,
    PASSWORD_REGION_LEN,
};
use crate::credential::Credential;
use crate::schedule::{BellEvent, ScheduleTable};
use core::fmt::Debug;

/// Byte addressable durable storage with an explicit commit.
///
/// Writes are only guaranteed to survive a power loss once [`Self::commit`] returned successfully. There is no
/// atomicity across several writes beyond what one commit gives.
#[allow(async_fn_in_trait)]
pub trait PersistentStore {
    /// Error reported by the storage
    type Error: Debug;

    /// Read `buf.len()` bytes starting at `addr`
    fn read(&mut self, addr: usize, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Write `data` starting at `addr`, not yet durable
    fn write(&mut self, addr: usize, data: &[u8]) -> Result<(), Self::Error>;

    /// Make all writes so far durable
    async fn commit(&mut self) -> Result<(), Self::Error>;
}

/// Errors of the RAM backed store
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RamStoreError {
    /// Access beyond the end of the store
    OutOfBounds {
        /// First byte accessed
        addr: usize,
        /// Number of bytes accessed
        len: usize,
    },
    /// The write was refused
    WriteFailed,
    /// The commit was refused
    CommitFailed,
}

/// A store held in RAM with EEPROM semantics: a working copy and a committed copy.
///
/// Used on the host and in tests. [`Self::power_cycle`] drops everything that was not committed, the way a power
/// loss would on the device.
#[derive(Clone, Debug)]
pub struct RamStore<const N: usize = IMAGE_SIZE> {
    /// What survives a power loss
    committed: [u8; N],
    /// Working copy, reads and writes go here
    working: [u8; N],
    /// Number of writes since creation
    writes: usize,
    /// Number of successful commits since creation
    commits: usize,
    /// Refuse commits, to simulate failing hardware
    fail_commits: bool,
    /// Refuse writes
    fail_writes: bool,
}

impl<const N: usize> RamStore<N> {
    /// A store filled with zeros, like a freshly erased EEPROM
    pub const fn new() -> Self {
        Self::filled(0)
    }

    /// A store filled with the given byte
    pub const fn filled(byte: u8) -> Self {
        Self {
            committed: [byte; N],
            working: [byte; N],
            writes: 0,
            commits: 0,
            fail_commits: false,
            fail_writes: false,
        }
    }

    /// Drop all uncommitted writes
    pub const fn power_cycle(&mut self) {
        self.working = self.committed;
    }

    /// Number of writes so far
    pub const fn writes(&self) -> usize {
        self.writes
    }

    /// Number of successful commits so far
    pub const fn commits(&self) -> usize {
        self.commits
    }

    /// Make every following commit fail, or succeed again
    pub const fn set_fail_commits(&mut self, fail: bool) {
        self.fail_commits = fail;
    }

    /// Make every following write fail, or succeed again
    pub const fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Check that an access stays inside the store
    const fn check_bounds(addr: usize, len: usize) -> Result<(), RamStoreError> {
        match addr.checked_add(len) {
            Some(end) if end <= N => Ok(()),
            _ => Err(RamStoreError::OutOfBounds { addr, len }),
        }
    }
}

impl<const N: usize> Default for RamStore<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> PersistentStore for RamStore<N> {
    type Error = RamStoreError;

    fn read(&mut self, addr: usize, buf: &mut [u8]) -> Result<(), Self::Error> {
        Self::check_bounds(addr, buf.len())?;
        buf.copy_from_slice(&self.working[addr..addr + buf.len()]);
        Ok(())
    }

    fn write(&mut self, addr: usize, data: &[u8]) -> Result<(), Self::Error> {
        Self::check_bounds(addr, data.len())?;
        if self.fail_writes {
            return Err(RamStoreError::WriteFailed);
        }
        self.working[addr..addr + data.len()].copy_from_slice(data);
        self.writes += 1;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), Self::Error> {
        if self.fail_commits {
            return Err(RamStoreError::CommitFailed);
        }
        self.committed = self.working;
        self.commits += 1;
        Ok(())
    }
}

/// What was wrong with the stored image. Every issue is recovered from by falling back to a safe value.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoadIssue {
    /// The store could not be read at all
    Unreadable,
    /// The stored event count is larger than [`MAX_EVENTS`]
    CountOutOfRange(u32),
    /// A stored record has a field outside its range, the index is attached
    InvalidRecord(usize),
    /// The password region has no NUL inside its capacity
    CredentialUnterminated,
    /// The stored password is not valid UTF-8
    CredentialNotUtf8,
}

/// Reads and writes the schedule and the password in their regions of the store
#[derive(Debug)]
pub struct ScheduleStore<S> {
    /// The underlying byte store
    store: S,
}

impl<S: PersistentStore> ScheduleStore<S> {
    /// Wrap a byte store
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying byte store
    pub const fn inner(&self) -> &S {
        &self.store
    }

    /// The underlying byte store, mutably
    pub const fn inner_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Load the schedule and the password.
    ///
    /// Never fails: a damaged schedule loads as an empty table, so a garbled image can never ring the bell, and
    /// a missing or damaged password loads as the factory password.
    pub fn load(&mut self) -> (ScheduleTable, Credential) {
        let table = self.load_table().unwrap_or_else(|issue| {
            warn!("Stored schedule is corrupt ({}), starting empty", issue);
            ScheduleTable::new()
        });
        let credential = self.load_credential().unwrap_or_else(|issue| {
            warn!("Stored password is corrupt ({}), using factory password", issue);
            Credential::factory()
        });
        info!(
            "Loaded {} bell events, factory password: {}",
            table.len(),
            credential.is_factory_default()
        );
        (table, credential)
    }

    /// Load the schedule, reporting why the stored one cannot be used
    pub fn load_table(&mut self) -> Result<ScheduleTable, LoadIssue> {
        let mut count_bytes = [0u8; COUNT_WIDTH];
        self.store
            .read(0, &mut count_bytes)
            .map_err(|_| LoadIssue::Unreadable)?;
        let stored_count = u32::from_le_bytes(count_bytes);
        let count = match usize::try_from(stored_count) {
            Ok(count) if count <= MAX_EVENTS => count,
            _ => return Err(LoadIssue::CountOutOfRange(stored_count)),
        };

        let mut records = [0u8; EVENTS_END - EVENTS_ADDR];
        let records = &mut records[..count * EVENT_RECORD_WIDTH];
        self.store
            .read(EVENTS_ADDR, records)
            .map_err(|_| LoadIssue::Unreadable)?;

        let mut table = ScheduleTable::new();
        for (index, record) in records.chunks_exact(EVENT_RECORD_WIDTH).enumerate() {
            let event = BellEvent::new(record[0], record[1], record[2]);
            if !event.is_valid() {
                return Err(LoadIssue::InvalidRecord(index));
            }
            table
                .push(event)
                .map_err(|_| LoadIssue::CountOutOfRange(stored_count))?;
        }
        Ok(table)
    }

    /// Load the password. An unset region, first byte NUL, means the factory password.
    pub fn load_credential(&mut self) -> Result<Credential, LoadIssue> {
        let mut region = [0u8; PASSWORD_REGION_LEN];
        self.store
            .read(PASSWORD_ADDR, &mut region)
            .map_err(|_| LoadIssue::Unreadable)?;
        let len = region
            .iter()
            .position(|&b| b == 0)
            .ok_or(LoadIssue::CredentialUnterminated)?;
        if len == 0 {
            return Ok(Credential::factory());
        }
        let secret = core::str::from_utf8(&region[..len]).map_err(|_| LoadIssue::CredentialNotUtf8)?;
        // the NUL sits inside the region, so the length is within PASSWORD_MAX_LEN
        Credential::new(secret).map_err(|_| LoadIssue::CredentialUnterminated)
    }

    /// Write the whole schedule region without committing
    pub fn stage_schedule(&mut self, table: &ScheduleTable) -> Result<(), S::Error> {
        let mut region = [0u8; EVENTS_END];
        // at most MAX_EVENTS entries, always fits a u32
        #[allow(clippy::cast_possible_truncation)]
        let count = table.len() as u32;
        region[..COUNT_WIDTH].copy_from_slice(&count.to_le_bytes());
        for (record, event) in region[EVENTS_ADDR..]
            .chunks_exact_mut(EVENT_RECORD_WIDTH)
            .zip(table.iter())
        {
            record.copy_from_slice(&[event.hour, event.minute, event.rings]);
        }
        self.store.write(0, &region)
    }

    /// Write the whole password region without committing
    pub fn stage_credential(&mut self, credential: &Credential) -> Result<(), S::Error> {
        let mut region = [0u8; PASSWORD_REGION_LEN];
        let secret = credential.as_bytes();
        region[..secret.len()].copy_from_slice(secret);
        self.store.write(PASSWORD_ADDR, &region)
    }

    /// Write the schedule region and commit
    pub async fn save_schedule(&mut self, table: &ScheduleTable) -> Result<(), S::Error> {
        self.stage_schedule(table)?;
        self.store.commit().await
    }

    /// Write the password region and commit
    pub async fn save_credential(&mut self, credential: &Credential) -> Result<(), S::Error> {
        self.stage_credential(credential)?;
        self.store.commit().await
    }
}
