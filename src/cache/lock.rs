use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

/// Lock acquisition that survives poisoning.
///
/// A panic inside a build function or listener must not wedge the registry
/// or the store for every later caller, so poisoned guards are recovered and
/// the event is logged with the owning module and operation.
pub(crate) trait RecoverRwLock<T> {
    fn read_recover(&self, target: &'static str, op: &'static str) -> RwLockReadGuard<'_, T>;
    fn write_recover(&self, target: &'static str, op: &'static str) -> RwLockWriteGuard<'_, T>;
}

pub(crate) trait RecoverMutex<T> {
    fn lock_recover(&self, target: &'static str, op: &'static str) -> MutexGuard<'_, T>;
}

impl<T> RecoverRwLock<T> for RwLock<T> {
    fn read_recover(&self, target: &'static str, op: &'static str) -> RwLockReadGuard<'_, T> {
        self.read()
            .unwrap_or_else(|poisoned| recovered(poisoned, target, op, "rwlock.read"))
    }

    fn write_recover(&self, target: &'static str, op: &'static str) -> RwLockWriteGuard<'_, T> {
        self.write()
            .unwrap_or_else(|poisoned| recovered(poisoned, target, op, "rwlock.write"))
    }
}

impl<T> RecoverMutex<T> for Mutex<T> {
    fn lock_recover(&self, target: &'static str, op: &'static str) -> MutexGuard<'_, T> {
        self.lock()
            .unwrap_or_else(|poisoned| recovered(poisoned, target, op, "mutex.lock"))
    }
}

fn recovered<G>(
    poisoned: PoisonError<G>,
    target: &'static str,
    op: &'static str,
    lock_kind: &'static str,
) -> G {
    warn!(
        op,
        target_module = target,
        lock_kind,
        result = "poisoned_recovered",
        "Recovered from poisoned kettle lock"
    );
    poisoned.into_inner()
}
