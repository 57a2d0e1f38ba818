//! State that is shared between interrupt and thread context.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

/// A value that is installed once at runtime, and then accessed within critical sections.
///
/// Every access is a single transaction: no other context observes a partial update.
pub struct Shared<T> {
    /// The value, if installed.
    inner: Mutex<CriticalSectionRawMutex, RefCell<Option<T>>>,
}

impl<T> Shared<T> {
    /// Create an empty slot, usable as a `static`.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// Install the value, returning the previous one.
    pub fn install(&self, value: T) -> Option<T> {
        self.inner.lock(|cell| cell.replace(Some(value)))
    }

    /// Run `f` on the value within a critical section.
    ///
    /// Returns `None`, if no value was installed yet.
    pub fn lock<U>(&self, f: impl FnOnce(&mut T) -> U) -> Option<U> {
        self.inner.lock(|cell| cell.borrow_mut().as_mut().map(f))
    }
}

impl<T> Default for Shared<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_until_installed() {
        let shared: Shared<u32> = Shared::new();
        assert_eq!(shared.lock(|value| *value), None);

        assert_eq!(shared.install(7), None);
        assert_eq!(shared.lock(|value| *value), Some(7));
        assert_eq!(shared.install(8), Some(7));
    }

    #[test]
    fn updates_persist() {
        static COUNTER: Shared<u32> = Shared::new();
        COUNTER.install(0);

        for _ in 0..3 {
            COUNTER.lock(|counter| *counter += 1);
        }
        assert_eq!(COUNTER.lock(|counter| *counter), Some(3));
    }
}
