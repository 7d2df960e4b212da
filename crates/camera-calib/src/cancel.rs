use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Cooperative cancellation flag shared between the controller and a worker.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        match lock.lock() {
            Ok(mut flag) => *flag = true,
            Err(poisoned) => *poisoned.into_inner() = true,
        }
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (lock, _) = &*self.inner;
        match lock.lock() {
            Ok(flag) => *flag,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Sleep for `dur` unless cancelled first. Returns `true` if the full
    /// duration elapsed.
    pub fn sleep(&self, dur: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now() + dur;
        let Ok(mut flag) = lock.lock() else {
            return false;
        };
        while !*flag {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            match cvar.wait_timeout(flag, deadline - now) {
                Ok((guard, _)) => flag = guard,
                Err(_) => return false,
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn sleep_completes_without_cancel() {
        let token = CancelToken::new();
        assert!(token.sleep(Duration::from_millis(5)));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_interrupts_sleep() {
        let token = CancelToken::new();
        let sleeper = token.clone();
        let started = Instant::now();
        let handle = thread::spawn(move || sleeper.sleep(Duration::from_secs(30)));
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert!(!handle.join().expect("join"));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(token.is_cancelled());
        assert!(!token.sleep(Duration::from_millis(1)));
    }
}
