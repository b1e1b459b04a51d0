use crate::foundation::{ThresholdError, STORAGE_LOCK_TIMEOUT_SECS};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

const POLL: Duration = Duration::from_millis(10);

/// Blocking lock bounded by `STORAGE_LOCK_TIMEOUT_SECS`.
pub fn lock_bounded<'a, T>(mutex: &'a Mutex<T>, operation: &'static str) -> Result<MutexGuard<'a, T>, ThresholdError> {
    lock_within(mutex, operation, Duration::from_secs(STORAGE_LOCK_TIMEOUT_SECS))
}

pub fn lock_within<'a, T>(mutex: &'a Mutex<T>, operation: &'static str, timeout: Duration) -> Result<MutexGuard<'a, T>, ThresholdError> {
    let deadline = Instant::now() + timeout;
    loop {
        match mutex.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(_)) => {
                return Err(ThresholdError::StorageError { operation: operation.to_string(), details: "lock poisoned".to_string() })
            }
            Err(TryLockError::WouldBlock) if Instant::now() >= deadline => {
                return Err(ThresholdError::StorageLockTimeout { operation: operation.to_string(), timeout_secs: timeout.as_secs() })
            }
            Err(TryLockError::WouldBlock) => std::thread::sleep(POLL),
        }
    }
}
