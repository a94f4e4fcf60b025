//! Non-blocking mutual exclusion for state shared with the audio path.
//!
//! The audio path may only ever *try* to take the lock.  A failed attempt is
//! routine, not an error: it means the control path is busy mutating shared
//! state, and the caller must render silence for that block.  The miss is
//! remembered, and the next successful audio acquisition reports that a
//! recovery action is owed - the shared voice state may reference data the
//! control path replaced while audio was denied access, so the caller must
//! force all voices silent before touching anything else.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

/// A mutex paired with a "missed grab" flag.
pub struct RtLock<T> {
    inner: Mutex<T>,
    missed: AtomicBool,
}

/// Guard returned by [`RtLock::try_lock_audio`].
pub struct AudioGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    recover: bool,
}

impl<T> RtLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
            missed: AtomicBool::new(false),
        }
    }

    /// Non-blocking acquisition for the audio path.
    ///
    /// On contention, records the miss and returns `None`; the caller must
    /// not touch the shared state this block.  On success, the miss flag is
    /// consumed and surfaced through [`AudioGuard::needs_recovery`].
    pub fn try_lock_audio(&self) -> Option<AudioGuard<'_, T>> {
        let guard = match self.inner.try_lock() {
            Ok(guard) => guard,
            // A panicking control thread must not wedge audio forever.
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                self.missed.store(true, Ordering::Release);
                return None;
            }
        };
        let recover = self.missed.swap(false, Ordering::AcqRel);
        Some(AudioGuard { guard, recover })
    }

    /// Blocking acquisition for the control path only.  Never touches the
    /// miss flag.
    pub fn lock_control(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> AudioGuard<'_, T> {
    /// True if an earlier audio acquisition failed and the shared state must
    /// be reset before use.
    pub fn needs_recovery(&self) -> bool {
        self.recover
    }
}

impl<T> Deref for AudioGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for AudioGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
