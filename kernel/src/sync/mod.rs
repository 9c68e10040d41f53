//! A minimal lock-protected singleton slot for driver state.
//!
//! The GPU device, the input device, and the console each have exactly one
//! instance, created once during boot and then accessed from the polling
//! loop. [`GlobalState`] is the shape that takes: a [`spin::Mutex`] around an
//! [`Option`], with `init` refusing to clobber an already-initialized slot.

use spin::Mutex;

pub struct GlobalState<T> {
    inner: Mutex<Option<T>>,
}

impl<T> GlobalState<T> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Install `value`, or hand it back if the slot is already occupied.
    pub fn init(&self, value: T) -> Result<(), T> {
        let mut guard = self.inner.lock();
        if guard.is_some() {
            return Err(value);
        }
        *guard = Some(value);
        Ok(())
    }

    /// Run `f` against the contained value, if any.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.inner.lock().as_ref().map(f)
    }

    /// Run `f` against the contained value mutably, if any.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.inner.lock().as_mut().map(f)
    }

    pub fn is_init(&self) -> bool {
        self.inner.lock().is_some()
    }
}

impl<T> Default for GlobalState<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_refuses_to_clobber() {
        let slot: GlobalState<u32> = GlobalState::new();
        assert!(slot.init(1).is_ok());
        assert_eq!(slot.init(2), Err(2));
        assert_eq!(slot.with(|v| *v), Some(1));
    }

    #[test]
    fn with_mut_sees_updates() {
        let slot: GlobalState<u32> = GlobalState::new();
        slot.init(10).unwrap();
        slot.with_mut(|v| *v += 5);
        assert_eq!(slot.with(|v| *v), Some(15));
    }

    #[test]
    fn empty_slot_yields_none() {
        let slot: GlobalState<u32> = GlobalState::new();
        assert_eq!(slot.with(|v| *v), None);
        assert!(!slot.is_init());
    }
}
