//! Two-level locking between client operations and the polling callback.
//!
//! The outer lock serializes whole top-level client operations. The inner
//! lock guards the cache state machine and is shared with the polling
//! callback, which never touches the outer lock. A client operation reaches
//! the inner lock through [`ClientGuard::state`], so the outer lock is always
//! taken first. Short bookkeeping that skips the outer lock goes through
//! [`ClientLocks::with_state`], whose guard cannot outlive the closure.
//! Taking the outer lock while the same thread holds the inner one panics in
//! debug builds.

use std::{
    cell::Cell,
    ops::{Deref, DerefMut},
    time::Instant,
};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::client::{ClientError, ClientResult};

thread_local! {
    /// Inner-lock guards alive on this thread.
    static INNER_HELD: Cell<usize> = const { Cell::new(0) };
}

pub(crate) struct ClientLocks<S> {
    client: Mutex<()>,
    state: Mutex<S>,
    changed: Condvar,
}

impl<S> ClientLocks<S> {
    pub(crate) fn new(state: S) -> Self {
        Self {
            client: Mutex::new(()),
            state: Mutex::new(state),
            changed: Condvar::new(),
        }
    }

    /// Acquires the outer lock for the duration of one client operation.
    pub(crate) fn client(&self) -> ClientGuard<'_, S> {
        debug_assert_eq!(
            INNER_HELD.with(Cell::get),
            0,
            "outer lock requested while holding the inner lock"
        );
        ClientGuard {
            _client: self.client.lock(),
            locks: self,
        }
    }

    /// Runs `f` under the inner lock alone.
    ///
    /// For bookkeeping that must not queue behind a blocked client operation.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut StateGuard<'_, S>) -> R) -> R {
        f(&mut self.lock_state())
    }

    /// Acquires only the inner lock for the polling callback.
    pub(crate) fn callback_state(&self) -> StateGuard<'_, S> {
        self.lock_state()
    }

    fn lock_state(&self) -> StateGuard<'_, S> {
        let guard = self.state.lock();
        INNER_HELD.with(|held| held.set(held.get() + 1));
        StateGuard {
            guard,
            changed: &self.changed,
        }
    }
}

/// Holds the outer lock; the sole path to the inner lock for client operations.
pub(crate) struct ClientGuard<'a, S> {
    _client: MutexGuard<'a, ()>,
    locks: &'a ClientLocks<S>,
}

impl<'a, S> ClientGuard<'a, S> {
    /// Acquires the inner lock while the outer one is held.
    pub(crate) fn state(&mut self) -> StateGuard<'_, S> {
        self.locks.lock_state()
    }
}

/// Holds the inner lock over the state `S`.
pub(crate) struct StateGuard<'a, S> {
    guard: MutexGuard<'a, S>,
    changed: &'a Condvar,
}

impl<'a, S> StateGuard<'a, S> {
    /// Wakes every caller blocked in [`StateGuard::wait_for`].
    pub(crate) fn notify_all(&self) {
        self.changed.notify_all();
    }

    /// Blocks until `check` reports the state ready.
    ///
    /// `check` runs on every wake-up, whatever its cause: `Ok(true)` ends the
    /// wait, `Ok(false)` keeps waiting and `Err` aborts it. Past `deadline` the
    /// wait fails with [`ClientError::TimedOut`]. The inner lock is released
    /// while blocked.
    pub(crate) fn wait_for(
        &mut self,
        deadline: Option<Instant>,
        mut check: impl FnMut(&S) -> ClientResult<bool>,
    ) -> ClientResult<()> {
        loop {
            if check(&*self.guard)? {
                return Ok(());
            }
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut self.guard, deadline).timed_out() {
                        return if check(&*self.guard)? {
                            Ok(())
                        } else {
                            Err(ClientError::TimedOut)
                        };
                    }
                }
                None => self.changed.wait(&mut self.guard),
            }
        }
    }
}

impl<'a, S> Drop for StateGuard<'a, S> {
    fn drop(&mut self) {
        INNER_HELD.with(|held| held.set(held.get().saturating_sub(1)));
    }
}

impl<'a, S> Deref for StateGuard<'a, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.guard
    }
}

impl<'a, S> DerefMut for StateGuard<'a, S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread, time::Duration};

    #[test]
    fn waiter_rechecks_after_every_notify() {
        let locks = Arc::new(ClientLocks::new(0u32));

        let waiter = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || {
                let mut client = locks.client();
                let mut state = client.state();
                state.wait_for(None, |n| Ok(*n >= 3)).unwrap();
                *state
            })
        };

        for _ in 0..3 {
            thread::sleep(Duration::from_millis(5));
            locks.with_state(|state| {
                **state += 1;
                state.notify_all();
            });
        }

        assert_eq!(waiter.join().unwrap(), 3);
    }

    #[test]
    fn wait_times_out_at_deadline() {
        let locks = ClientLocks::new(false);
        let mut client = locks.client();
        let mut state = client.state();

        let deadline = Instant::now() + Duration::from_millis(10);
        assert_eq!(
            state.wait_for(Some(deadline), |ready| Ok(*ready)),
            Err(ClientError::TimedOut)
        );
        assert!(Instant::now() >= deadline);
    }

    #[test]
    fn check_error_aborts_wait() {
        let locks = ClientLocks::new(());
        let mut client = locks.client();
        let mut state = client.state();
        assert_eq!(
            state.wait_for(None, |_| Err(ClientError::Cancelled)),
            Err(ClientError::Cancelled)
        );
    }

    #[test]
    fn inner_lock_is_free_while_client_waits() {
        let locks = Arc::new(ClientLocks::new(false));

        let waiter = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || {
                let mut client = locks.client();
                let mut state = client.state();
                state.wait_for(None, |ready| Ok(*ready))
            })
        };

        thread::sleep(Duration::from_millis(10));
        // The callback path must get the inner lock even though the waiter
        // still owns the outer one.
        let mut state = locks.callback_state();
        *state = true;
        state.notify_all();
        drop(state);

        assert_eq!(waiter.join().unwrap(), Ok(()));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "outer lock requested while holding the inner lock")]
    fn outer_lock_inside_inner_lock_panics() {
        let locks = ClientLocks::new(());
        locks.with_state(|_| {
            let _client = locks.client();
        });
    }

    #[test]
    fn outer_lock_available_after_inner_guard_drops() {
        let locks = ClientLocks::new(0u8);
        locks.with_state(|state| **state = 1);
        drop(locks.callback_state());

        let mut client = locks.client();
        assert_eq!(*client.state(), 1);
    }
}
