//! # Mutation gateway
//! The only way to change the bell from outside. Every request is authenticated against the stored password and
//! validated before anything is touched, and every accepted change is persisted before it takes effect.
//!
//! The checks run in a fixed order: password first, so an unauthenticated caller learns nothing about the
//! schedule, then field ranges, then capacity. A rejected request writes nothing to the store.
//!
//! Requests that cannot even be decoded (a number that is not a number, broken text, an oversized password) are
//! turned away by [`crate::request`] before they get here, without a password check. Those rejections only echo
//! the shape of the request back and reveal nothing stored.
//!
//! The password comparison is plain text equality, see [`crate::credential`] for what that means.
use crate::config::FIELD_MAX_LEN;
use crate::credential::Credential;
use crate::device::DeviceState;
use crate::error::{MutationError, ValidationError};
use crate::schedule::BellEvent;
use crate::store::PersistentStore;
use heapless::String;

/// A bounded text field taken from a request
pub type Field = String<FIELD_MAX_LEN>;

/// A decoded change request
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Mutation {
    /// Append a bell event
    AddEvent {
        /// The event to append
        event: BellEvent,
        /// The admin password supplied with the request
        password: Field,
    },
    /// Replace the admin password
    ChangePassword {
        /// The current password
        old: Field,
        /// The password to set
        new: Field,
    },
}

/// Apply a decoded change request
pub async fn apply<S: PersistentStore>(
    state: &mut DeviceState<S>,
    mutation: &Mutation,
) -> Result<(), MutationError> {
    match mutation {
        Mutation::AddEvent { event, password } => add_event(state, *event, password).await,
        Mutation::ChangePassword { old, new } => change_password(state, old, new).await,
    }
}

/// Check a supplied password without changing anything
pub fn authorize<S>(state: &DeviceState<S>, supplied_password: &str) -> Result<(), MutationError> {
    if state.credential.matches(supplied_password) {
        Ok(())
    } else {
        warn!("Request rejected: wrong password");
        Err(MutationError::Auth)
    }
}

/// Check the ranges of a bell event
const fn validate_event(event: &BellEvent) -> Result<(), ValidationError> {
    if event.hour > 23 {
        return Err(ValidationError::HourOutOfRange(event.hour));
    }
    if event.minute > 59 {
        return Err(ValidationError::MinuteOutOfRange(event.minute));
    }
    if event.rings == 0 {
        return Err(ValidationError::ZeroRings);
    }
    Ok(())
}

/// Append a bell event and persist the schedule.
pub async fn add_event<S: PersistentStore>(
    state: &mut DeviceState<S>,
    event: BellEvent,
    supplied_password: &str,
) -> Result<(), MutationError> {
    if !state.credential.matches(supplied_password) {
        warn!("Add event rejected: wrong password");
        return Err(MutationError::Auth);
    }
    validate_event(&event).inspect_err(|e| warn!("Add event rejected: {}", e))?;

    let mut table = state.engine.table().clone();
    if table.push(event).is_err() {
        warn!("Add event rejected: schedule is full");
        return Err(MutationError::Capacity);
    }

    if let Err(e) = state.store.save_schedule(&table).await {
        error!("Failed to persist schedule: {}", defmt_debug(&e));
        // put the shadow back in line with what is still in effect
        let current = state.engine.table().clone();
        if let Err(e) = state.store.stage_schedule(&current) {
            error!("Failed to restore staged schedule: {}", defmt_debug(&e));
        }
        return Err(MutationError::Storage);
    }

    if state.engine.append(event).is_err() {
        // cannot happen, the same append just succeeded on the copy
        return Err(MutationError::Capacity);
    }
    info!(
        "Added bell at {:02}:{:02} with {} rings, {} in schedule",
        event.hour,
        event.minute,
        event.rings,
        state.engine.table().len()
    );
    Ok(())
}

/// Replace the admin password and persist it.
pub async fn change_password<S: PersistentStore>(
    state: &mut DeviceState<S>,
    old: &str,
    new: &str,
) -> Result<(), MutationError> {
    if !state.credential.matches(old) {
        warn!("Password change rejected: wrong password");
        return Err(MutationError::Auth);
    }
    let credential = Credential::new(new).inspect_err(|e| warn!("Password change rejected: {}", e))?;

    if let Err(e) = state.store.save_credential(&credential).await {
        error!("Failed to persist password: {}", defmt_debug(&e));
        let current = state.credential.clone();
        if let Err(e) = state.store.stage_credential(&current) {
            error!("Failed to restore staged password: {}", defmt_debug(&e));
        }
        return Err(MutationError::Storage);
    }

    state.credential = credential;
    info!("Admin password changed");
    Ok(())
}

/// Wrap a store error for logging
#[cfg(feature = "defmt")]
fn defmt_debug<T: core::fmt::Debug>(e: &T) -> defmt::Debug2Format<'_, T> {
    defmt::Debug2Format(e)
}

/// Wrap a store error for logging
#[cfg(not(feature = "defmt"))]
fn defmt_debug<T: core::fmt::Debug>(e: &T) -> &T {
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IMAGE_SIZE, MAX_EVENTS};
    use crate::store::RamStore;
    use embassy_futures::block_on;

    fn fresh() -> DeviceState<RamStore> {
        DeviceState::load(RamStore::<IMAGE_SIZE>::new())
    }

    fn field(s: &str) -> Field {
        let mut f = Field::new();
        f.push_str(s).unwrap();
        f
    }

    #[test]
    fn add_then_reload_round_trips() {
        let mut state = fresh();
        assert!(state.table().is_empty());
        block_on(add_event(&mut state, BellEvent::new(8, 0, 3), "admin123")).unwrap();
        assert_eq!(state.table().as_slice(), &[BellEvent::new(8, 0, 3)]);

        state.store_mut().power_cycle();
        let reloaded = DeviceState::load(state.store().clone());
        assert_eq!(reloaded.table().as_slice(), &[BellEvent::new(8, 0, 3)]);
    }

    #[test]
    fn every_valid_event_is_added_exactly_once() {
        for (hour, minute, rings) in [(0, 0, 1), (23, 59, 255), (12, 30, 7)] {
            let mut state = fresh();
            let event = BellEvent::new(hour, minute, rings);
            block_on(add_event(&mut state, event, "admin123")).unwrap();
            let snapshot = state.snapshot();
            assert_eq!(snapshot.table.iter().filter(|e| **e == event).count(), 1);
            let reloaded = DeviceState::load(state.store().clone());
            assert_eq!(reloaded.table(), state.table());
        }
    }

    #[test]
    fn rejected_adds_change_nothing_and_write_nothing() {
        let mut state = fresh();
        let cases = [
            (BellEvent::new(24, 0, 1), "admin123", MutationError::Validation(ValidationError::HourOutOfRange(24))),
            (BellEvent::new(8, 60, 1), "admin123", MutationError::Validation(ValidationError::MinuteOutOfRange(60))),
            (BellEvent::new(8, 0, 0), "admin123", MutationError::Validation(ValidationError::ZeroRings)),
            (BellEvent::new(8, 0, 1), "admin", MutationError::Auth),
            (BellEvent::new(8, 0, 1), "", MutationError::Auth),
        ];
        for (event, password, expected) in cases {
            assert_eq!(block_on(add_event(&mut state, event, password)), Err(expected));
        }
        assert!(state.table().is_empty());
        assert_eq!(state.store().writes(), 0);
        assert_eq!(state.store().commits(), 0);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut state = fresh();
        for i in 0..MAX_EVENTS {
            let minute = u8::try_from(i).unwrap();
            block_on(add_event(&mut state, BellEvent::new(7, minute, 1), "admin123")).unwrap();
        }
        let writes = state.store().writes();
        assert_eq!(
            block_on(add_event(&mut state, BellEvent::new(9, 0, 1), "admin123")),
            Err(MutationError::Capacity)
        );
        assert_eq!(state.table().len(), MAX_EVENTS);
        assert_eq!(state.store().writes(), writes);
    }

    #[test]
    fn password_change_hands_over_authority() {
        let mut state = fresh();
        block_on(change_password(&mut state, "admin123", "s3cret")).unwrap();

        assert_eq!(
            block_on(add_event(&mut state, BellEvent::new(8, 0, 1), "admin123")),
            Err(MutationError::Auth)
        );
        block_on(add_event(&mut state, BellEvent::new(8, 0, 1), "s3cret")).unwrap();
        assert_eq!(
            block_on(change_password(&mut state, "admin123", "other")),
            Err(MutationError::Auth)
        );
        block_on(change_password(&mut state, "s3cret", "other")).unwrap();

        state.store_mut().power_cycle();
        let mut reloaded = DeviceState::load(state.store().clone());
        block_on(add_event(&mut reloaded, BellEvent::new(9, 0, 1), "other")).unwrap();
    }

    #[test]
    fn wrong_old_password_keeps_credential() {
        let mut state = fresh();
        assert_eq!(
            block_on(change_password(&mut state, "nope", "s3cret")),
            Err(MutationError::Auth)
        );
        assert!(state.snapshot().factory_password);
        assert_eq!(state.store().writes(), 0);
    }

    #[test]
    fn invalid_new_password_is_rejected() {
        let mut state = fresh();
        assert_eq!(
            block_on(change_password(&mut state, "admin123", "0123456789abcdefg")),
            Err(MutationError::Validation(ValidationError::PasswordTooLong(17)))
        );
        assert_eq!(
            block_on(change_password(&mut state, "admin123", "")),
            Err(MutationError::Validation(ValidationError::PasswordEmpty))
        );
        block_on(change_password(&mut state, "admin123", "0123456789abcdef")).unwrap();
    }

    #[test]
    fn failed_commit_rolls_back() {
        let mut state = fresh();
        block_on(add_event(&mut state, BellEvent::new(8, 0, 1), "admin123")).unwrap();
        state.store_mut().set_fail_commits(true);
        assert_eq!(
            block_on(add_event(&mut state, BellEvent::new(9, 0, 1), "admin123")),
            Err(MutationError::Storage)
        );
        assert_eq!(
            block_on(change_password(&mut state, "admin123", "s3cret")),
            Err(MutationError::Storage)
        );
        assert_eq!(state.table().len(), 1);
        assert!(state.snapshot().factory_password);

        // a later successful commit must not carry the rolled back bytes along
        state.store_mut().set_fail_commits(false);
        block_on(change_password(&mut state, "admin123", "s3cret")).unwrap();
        let reloaded = DeviceState::load(state.store().clone());
        assert_eq!(reloaded.table().as_slice(), &[BellEvent::new(8, 0, 1)]);
    }

    #[test]
    fn failed_write_keeps_memory_and_store_in_line() {
        let mut state = fresh();
        block_on(add_event(&mut state, BellEvent::new(8, 0, 1), "admin123")).unwrap();
        state.store_mut().set_fail_writes(true);
        assert_eq!(
            block_on(add_event(&mut state, BellEvent::new(9, 0, 1), "admin123")),
            Err(MutationError::Storage)
        );
        assert_eq!(
            block_on(change_password(&mut state, "admin123", "s3cret")),
            Err(MutationError::Storage)
        );
        assert_eq!(state.table().as_slice(), &[BellEvent::new(8, 0, 1)]);
        assert!(state.snapshot().factory_password);

        state.store_mut().set_fail_writes(false);
        block_on(add_event(&mut state, BellEvent::new(10, 0, 2), "admin123")).unwrap();
        let reloaded = DeviceState::load(state.store().clone());
        assert_eq!(
            reloaded.table().as_slice(),
            &[BellEvent::new(8, 0, 1), BellEvent::new(10, 0, 2)]
        );
        assert!(reloaded.snapshot().factory_password);
    }

    #[test]
    fn apply_dispatches_decoded_mutations() {
        let mut state = fresh();
        let add = Mutation::AddEvent {
            event: BellEvent::new(10, 15, 2),
            password: field("admin123"),
        };
        block_on(apply(&mut state, &add)).unwrap();
        let change = Mutation::ChangePassword {
            old: field("admin123"),
            new: field("bell"),
        };
        block_on(apply(&mut state, &change)).unwrap();
        assert_eq!(state.table().as_slice(), &[BellEvent::new(10, 15, 2)]);
        assert!(!state.snapshot().factory_password);
    }
}
