//! Listeners for mode changes and for reaching the set temperature.

use heapless::Vec;

use super::Mode;

/// The number of observers per registry.
pub const OBSERVER_CAPACITY: usize = 4;

/// Called with the new mode after a mode change.
pub type ModeChangedObserver = fn(Mode);

/// Called with the set temperature, once it was reached.
pub type TemperatureReachedObserver = fn(u16);

/// A registry has no free slots left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegistryFull;

/// Fixed-capacity observer registries.
pub struct Observers {
    /// Mode change observers, in registration order.
    mode_changed: Vec<ModeChangedObserver, OBSERVER_CAPACITY>,
    /// Temperature reached observers, in registration order.
    temperature_reached: Vec<TemperatureReachedObserver, OBSERVER_CAPACITY>,
}

impl Observers {
    /// Create empty registries.
    pub const fn new() -> Self {
        Self {
            mode_changed: Vec::new(),
            temperature_reached: Vec::new(),
        }
    }

    /// Register a mode change observer.
    pub fn add_mode_changed(&mut self, observer: ModeChangedObserver) -> Result<(), RegistryFull> {
        self.mode_changed.push(observer).map_err(|_| RegistryFull)
    }

    /// Register a temperature reached observer.
    pub fn add_temperature_reached(
        &mut self,
        observer: TemperatureReachedObserver,
    ) -> Result<(), RegistryFull> {
        self.temperature_reached.push(observer).map_err(|_| RegistryFull)
    }

    /// Notify all mode change observers.
    pub(super) fn notify_mode_changed(&self, mode: Mode) {
        self.mode_changed.iter().for_each(|observer| observer(mode));
    }

    /// Notify all temperature reached observers.
    pub(super) fn notify_temperature_reached(&self, temperature: u16) {
        self.temperature_reached
            .iter()
            .for_each(|observer| observer(temperature));
    }
}

impl Default for Observers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU16, AtomicUsize, Ordering};

    static MODE_CALLS: AtomicUsize = AtomicUsize::new(0);
    static REACHED_TEMPERATURE: AtomicU16 = AtomicU16::new(0);

    fn count_mode(_mode: Mode) {
        MODE_CALLS.fetch_add(1, Ordering::SeqCst);
    }

    fn store_temperature(temperature: u16) {
        REACHED_TEMPERATURE.store(temperature, Ordering::SeqCst);
    }

    #[test]
    fn registration_is_bounded() {
        let mut observers = Observers::new();
        for _ in 0..OBSERVER_CAPACITY {
            assert_eq!(observers.add_mode_changed(count_mode), Ok(()));
        }
        assert_eq!(observers.add_mode_changed(count_mode), Err(RegistryFull));

        // The other registry is independent.
        assert_eq!(observers.add_temperature_reached(store_temperature), Ok(()));
    }

    #[test]
    fn notifies_every_observer() {
        let mut observers = Observers::new();
        observers.add_mode_changed(count_mode).unwrap();
        observers.add_mode_changed(count_mode).unwrap();
        observers.add_temperature_reached(store_temperature).unwrap();

        let before = MODE_CALLS.load(Ordering::SeqCst);
        observers.notify_mode_changed(Mode::Standby);
        assert!(MODE_CALLS.load(Ordering::SeqCst) >= before + 2);

        observers.notify_temperature_reached(320);
        assert_eq!(REACHED_TEMPERATURE.load(Ordering::SeqCst), 320);
    }
}
