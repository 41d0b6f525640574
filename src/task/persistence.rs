//! # Persistence
//! Emulated EEPROM on top of the Pico's flash.
//!
//! The whole image lives in RAM. Writes only touch the RAM copy, a commit stores the complete image as one
//! `sequential-storage` map item. A power loss before or during a commit leaves the previously stored item in
//! place, so the bell always restarts from a complete image.
use core::ops::Range;
use defmt::{Debug2Format, Format, info, warn};
use embassy_rp::flash::{Async, Flash};
use embassy_rp::peripherals::FLASH;
use school_bell::PersistentStore;
use school_bell::config::IMAGE_SIZE;
use sequential_storage::cache::NoCache;
use sequential_storage::map::{fetch_item, store_item};

/// The size of the flash memory in bytes.
pub const FLASH_SIZE: usize = 2 * 1024 * 1024;

/// Map key of the image item
const IMAGE_KEY: u8 = 0;

/// Errors of the flash backed store
#[derive(Clone, Copy, PartialEq, Eq, Debug, Format)]
pub enum FlashEepromError {
    /// Access beyond the end of the image
    OutOfBounds,
    /// The flash refused to store the image
    Storage,
}

/// The image store backed by flash
pub struct FlashEeprom<'a> {
    /// The flash peripheral
    flash: Flash<'a, FLASH, Async, { FLASH_SIZE }>,
    /// The range of the flash memory used for the image.
    flash_range: Range<u32>,
    /// Scratch buffer for reading and writing map items, holds the key and the image
    data_buffer: [u8; IMAGE_SIZE + 64],
    /// RAM copy of the image, reads and writes go here
    image: [u8; IMAGE_SIZE],
}

impl<'a> FlashEeprom<'a> {
    /// Open the store and read the stored image. Without a stored image, or if it cannot be read, the image
    /// starts out all zero, which loads as an empty schedule with the factory password.
    pub async fn open(flash: Flash<'a, FLASH, Async, { FLASH_SIZE }>) -> Self {
        let mut eeprom = Self {
            flash,
            flash_range: 0x1F_9000..0x1F_C000,
            data_buffer: [0; IMAGE_SIZE + 64],
            image: [0; IMAGE_SIZE],
        };

        match fetch_item::<u8, &[u8], _>(
            &mut eeprom.flash,
            eeprom.flash_range.clone(),
            &mut NoCache::new(),
            &mut eeprom.data_buffer,
            &IMAGE_KEY,
        )
        .await
        {
            Ok(Some(stored)) if stored.len() == IMAGE_SIZE => {
                eeprom.image.copy_from_slice(stored);
                info!("Read stored image from flash");
            }
            Ok(Some(stored)) => {
                warn!("Stored image has {} bytes, expected {}, ignoring it", stored.len(), IMAGE_SIZE);
            }
            Ok(None) => {
                info!("No image stored in flash yet");
            }
            Err(e) => {
                warn!("Failed to read image from flash: {:?}", Debug2Format(&e));
            }
        }
        eeprom
    }

    /// Byte range of an access, if it stays inside the image
    fn span(addr: usize, len: usize) -> Result<Range<usize>, FlashEepromError> {
        match addr.checked_add(len) {
            Some(end) if end <= IMAGE_SIZE => Ok(addr..end),
            _ => Err(FlashEepromError::OutOfBounds),
        }
    }
}

impl PersistentStore for FlashEeprom<'_> {
    type Error = FlashEepromError;

    fn read(&mut self, addr: usize, buf: &mut [u8]) -> Result<(), Self::Error> {
        let span = Self::span(addr, buf.len())?;
        buf.copy_from_slice(&self.image[span]);
        Ok(())
    }

    fn write(&mut self, addr: usize, data: &[u8]) -> Result<(), Self::Error> {
        let span = Self::span(addr, data.len())?;
        self.image[span].copy_from_slice(data);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), Self::Error> {
        match store_item::<u8, &[u8], _>(
            &mut self.flash,
            self.flash_range.clone(),
            &mut NoCache::new(),
            &mut self.data_buffer,
            &IMAGE_KEY,
            &self.image.as_slice(),
        )
        .await
        {
            Ok(()) => {
                info!("Image stored to flash");
                Ok(())
            }
            Err(e) => {
                warn!("Failed to store image to flash: {:?}", Debug2Format(&e));
                Err(FlashEepromError::Storage)
            }
        }
    }
}
