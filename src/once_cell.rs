use parking_lot::Mutex;

/// A one-shot memoization cell: computed at most once, replayed on every
/// later access.
///
/// Unlike `std::sync::OnceLock`, a failed computation is cached too —
/// every realization error this crate produces (a malformed record) is
/// permanent, so replaying it is correct. The cell holds its internal
/// mutex for the duration of the first computation, which is what gives
/// "exactly one caller performs the work" under contention (a second
/// caller blocks on the mutex, then observes the cached result instead
/// of recomputing).
pub struct LazyCell<T, E> {
    state: Mutex<State<T, E>>,
}

enum State<T, E> {
    Empty,
    Ready(T),
    Failed(E),
}

impl<T: Clone, E: Clone> LazyCell<T, E> {
    pub fn new() -> Self {
        LazyCell {
            state: Mutex::new(State::Empty),
        }
    }

    pub fn get_or_try_init(&self, f: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        let mut guard = self.state.lock();
        match &*guard {
            State::Ready(v) => return Ok(v.clone()),
            State::Failed(e) => return Err(e.clone()),
            State::Empty => {}
        }
        let result = f();
        *guard = match &result {
            Ok(v) => State::Ready(v.clone()),
            Err(e) => State::Failed(e.clone()),
        };
        result
    }
}
