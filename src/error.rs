//! # Errors
//! Why a mutation request was turned down. None of these are fatal: the request is dropped and the bell keeps
//! running with the state it had before.
use core::fmt;

/// Input outside its allowed range
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ValidationError {
    /// Hour is not in 0-23
    HourOutOfRange(u8),
    /// Minute is not in 0-59
    MinuteOutOfRange(u8),
    /// The bell must ring at least once
    ZeroRings,
    /// A numeric field is missing or not a number in the accepted range
    MalformedNumber,
    /// A text field is not valid UTF-8 after percent decoding
    MalformedText,
    /// New password longer than the password region allows, the length is attached
    PasswordTooLong(usize),
    /// An empty stored password reads back as the factory default, so it cannot be set
    PasswordEmpty,
    /// The stored password is NUL-terminated and cannot contain NUL itself
    PasswordContainsNul,
}

/// Rejection of a mutation request
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MutationError {
    /// Malformed or out of range input
    Validation(ValidationError),
    /// The supplied password does not match the stored one
    Auth,
    /// The schedule already holds the maximum number of events
    Capacity,
    /// The change could not be persisted and was rolled back
    Storage,
}

impl From<ValidationError> for MutationError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HourOutOfRange(hour) => write!(f, "hour {hour} is not in 0-23"),
            Self::MinuteOutOfRange(minute) => write!(f, "minute {minute} is not in 0-59"),
            Self::ZeroRings => f.write_str("rings must be at least 1"),
            Self::MalformedNumber => f.write_str("malformed number"),
            Self::MalformedText => f.write_str("malformed text"),
            Self::PasswordTooLong(len) => write!(f, "password of {len} bytes is too long"),
            Self::PasswordEmpty => f.write_str("password must not be empty"),
            Self::PasswordContainsNul => f.write_str("password must not contain NUL"),
        }
    }
}

impl fmt::Display for MutationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(e) => write!(f, "rejected: {e}"),
            Self::Auth => f.write_str("rejected: wrong password"),
            Self::Capacity => f.write_str("rejected: schedule is full"),
            Self::Storage => f.write_str("failed: could not save"),
        }
    }
}
