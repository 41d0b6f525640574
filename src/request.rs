//! # Request decoding
//! Turns the request line of an HTTP request into a typed [`Request`]. Only the request line is looked at, the
//! web interface is a pair of GET forms.
//!
//! `GET /add?hour=H&minute=M&rings=R&pwd=P` adds a bell event, `GET /changepwd?oldpwd=OLD&newpwd=NEW` changes the
//! password, `GET /stop?pwd=P` silences a ringing bell and anything else shows the status page. Query values are
//! percent decoded (`+` is a space). Numbers that do not parse are rejected here, they are never defaulted.
use crate::config::FIELD_MAX_LEN;
use crate::device::DeviceState;
use crate::error::ValidationError;
use crate::gateway::{self, Field, Mutation};
use crate::schedule::BellEvent;
use crate::status::Outcome;
use crate::store::PersistentStore;
use heapless::Vec;

/// What a client asked for
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Request {
    /// A well formed change request
    Mutate(Mutation),
    /// Stop the bell ringing, with the admin password supplied
    Silence(Field),
    /// A change request whose fields could not be decoded
    Rejected(ValidationError),
    /// Show the status page
    Status,
}

/// Why a query value could not be decoded
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum DecodeError {
    /// Longer than a field can hold, the full decoded length is attached
    TooLong(usize),
    /// Broken percent escape or not UTF-8
    Malformed,
}

impl Request {
    /// Decode the request line, the first line of `raw`.
    pub fn parse(raw: &[u8]) -> Self {
        let line = raw.split(|&b| b == b'\r' || b == b'\n').next().unwrap_or_default();
        let mut parts = line.split(|&b| b == b' ').filter(|part| !part.is_empty());
        let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
            return Self::Status;
        };
        if method != b"GET" {
            return Self::Status;
        }

        let (path, query) = match target.iter().position(|&b| b == b'?') {
            Some(at) => (&target[..at], &target[at + 1..]),
            None => (target, &[][..]),
        };

        let decoded = match path {
            b"/add" => parse_add(query),
            b"/changepwd" => parse_change_password(query),
            b"/stop" => {
                return match password(query, b"pwd") {
                    Ok(password) => Self::Silence(password),
                    Err(e) => Self::Rejected(e),
                };
            }
            _ => return Self::Status,
        };
        match decoded {
            Ok(mutation) => Self::Mutate(mutation),
            Err(e) => {
                warn!("Rejected malformed request: {}", e);
                Self::Rejected(e)
            }
        }
    }

    /// Carry out the request against the device state
    pub async fn apply<S: PersistentStore>(&self, state: &mut DeviceState<S>) -> Outcome {
        match self {
            Self::Status => Outcome::Viewed,
            Self::Silence(password) => match gateway::authorize(state, password) {
                Ok(()) => Outcome::Silenced,
                Err(e) => Outcome::Refused(e),
            },
            Self::Rejected(e) => Outcome::Refused((*e).into()),
            Self::Mutate(mutation) => match gateway::apply(state, mutation).await {
                Ok(()) => match mutation {
                    Mutation::AddEvent { .. } => Outcome::Added,
                    Mutation::ChangePassword { .. } => Outcome::PasswordChanged,
                },
                Err(e) => Outcome::Refused(e),
            },
        }
    }
}

/// Decode the fields of an add request
fn parse_add(query: &[u8]) -> Result<Mutation, ValidationError> {
    let hour = number(query, b"hour")?;
    let minute = number(query, b"minute")?;
    let rings = number(query, b"rings")?;
    let password = password(query, b"pwd")?;
    Ok(Mutation::AddEvent {
        event: BellEvent::new(hour, minute, rings),
        password,
    })
}

/// Decode the fields of a password change request
fn parse_change_password(query: &[u8]) -> Result<Mutation, ValidationError> {
    Ok(Mutation::ChangePassword {
        old: password(query, b"oldpwd")?,
        new: password(query, b"newpwd")?,
    })
}

/// Find the raw value of `key` in a query string
fn param<'a>(query: &'a [u8], key: &[u8]) -> Option<&'a [u8]> {
    query.split(|&b| b == b'&').find_map(|pair| {
        let at = pair.iter().position(|&b| b == b'=')?;
        (&pair[..at] == key).then(|| &pair[at + 1..])
    })
}

/// A required numeric field
fn number(query: &[u8], key: &[u8]) -> Result<u8, ValidationError> {
    let raw = param(query, key).ok_or(ValidationError::MalformedNumber)?;
    let text = decode(raw).map_err(|_| ValidationError::MalformedNumber)?;
    text.trim().parse().map_err(|_| ValidationError::MalformedNumber)
}

/// A password field, absent means empty
fn password(query: &[u8], key: &[u8]) -> Result<Field, ValidationError> {
    let Some(raw) = param(query, key) else {
        return Ok(Field::new());
    };
    decode(raw).map_err(|e| match e {
        DecodeError::TooLong(len) => ValidationError::PasswordTooLong(len),
        DecodeError::Malformed => ValidationError::MalformedText,
    })
}

/// Value of one hex digit
const fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Percent decode a query value
fn decode(raw: &[u8]) -> Result<Field, DecodeError> {
    let mut bytes: Vec<u8, FIELD_MAX_LEN> = Vec::new();
    let mut len = 0;
    let mut rest = raw;
    while let Some((&b, tail)) = rest.split_first() {
        let (byte, tail) = match b {
            b'+' => (b' ', tail),
            b'%' => match tail {
                [hi, lo, tail @ ..] => {
                    let (Some(hi), Some(lo)) = (hex_digit(*hi), hex_digit(*lo)) else {
                        return Err(DecodeError::Malformed);
                    };
                    ((hi << 4) | lo, tail)
                }
                _ => return Err(DecodeError::Malformed),
            },
            _ => (b, tail),
        };
        // keep counting past the capacity so the caller can report the length
        let _ = bytes.push(byte);
        len += 1;
        rest = tail;
    }
    if len > FIELD_MAX_LEN {
        return Err(DecodeError::TooLong(len));
    }
    let text = core::str::from_utf8(&bytes).map_err(|_| DecodeError::Malformed)?;
    let mut field = Field::new();
    field.push_str(text).map_err(|_| DecodeError::TooLong(len))?;
    Ok(field)
}
