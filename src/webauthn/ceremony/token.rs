use futures::future::{self, AbortHandle, Abortable, Aborted, FutureExt, Pending, Shared};
use std::{
    cell::{Cell, RefCell},
    fmt,
    future::Future,
    rc::Rc,
};

/// Single-threaded cancellation token handed to a conditional credential
/// request. Clones share state; identity is the shared allocation.
#[derive(Clone)]
pub struct AbortToken {
    inner: Rc<TokenState>,
}

struct TokenState {
    id: u64,
    handle: AbortHandle,
    signal: Shared<Abortable<Pending<()>>>,
    on_abort: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl AbortToken {
    pub fn new(id: u64) -> Self {
        let (handle, registration) = AbortHandle::new_pair();

        AbortToken {
            inner: Rc::new(TokenState {
                id,
                handle,
                signal: Abortable::new(future::pending(), registration).shared(),
                on_abort: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.handle.is_aborted()
    }

    pub fn same_as(&self, other: &AbortToken) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Marks the token aborted, runs the abort hooks and wakes every task
    /// waiting on [`AbortToken::aborted`]. Aborting twice is a no-op.
    pub fn abort(&self) {
        if self.is_aborted() {
            return;
        }

        self.inner.handle.abort();

        let hooks = std::mem::take(&mut *self.inner.on_abort.borrow_mut());
        for hook in hooks {
            hook();
        }
    }

    /// Registers a hook run synchronously on abort, or immediately if the
    /// token is already aborted.
    pub fn on_abort(&self, hook: impl FnOnce() + 'static) {
        if self.is_aborted() {
            hook();
        } else {
            self.inner.on_abort.borrow_mut().push(Box::new(hook));
        }
    }

    /// Resolves once the token is aborted.
    pub fn aborted(&self) -> impl Future<Output = ()> {
        self.inner.signal.clone().map(|_: Result<(), Aborted>| ())
    }
}

impl fmt::Debug for AbortToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortToken")
            .field("id", &self.inner.id)
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

/// Holds the token of the one conditional request allowed in flight.
#[derive(Default)]
pub struct AmbientSlot {
    current: RefCell<Option<AbortToken>>,
    issued: Cell<u64>,
}

impl AmbientSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aborts and removes the registered token. Returns whether one was
    /// registered.
    pub fn cancel(&self) -> bool {
        let previous = self.current.borrow_mut().take();
        match previous {
            Some(token) => {
                tracing::debug!(token = token.id(), "aborting conditional request");
                token.abort();
                true
            }
            None => false,
        }
    }

    /// Cancels whatever is registered and registers a fresh token.
    pub fn renew(&self) -> AbortToken {
        self.cancel();

        let id = self.issued.get() + 1;
        self.issued.set(id);

        let token = AbortToken::new(id);
        *self.current.borrow_mut() = Some(token.clone());
        token
    }

    /// Clears the slot only when it still holds `token`, so a finished
    /// request never clobbers the registration of a newer one.
    pub fn release(&self, token: &AbortToken) -> bool {
        let mut current = self.current.borrow_mut();
        if current.as_ref().is_some_and(|registered| registered.same_as(token)) {
            *current = None;
            true
        } else {
            false
        }
    }

    pub fn current(&self) -> Option<AbortToken> {
        self.current.borrow().clone()
    }
}

#[cfg(test)]
use futures::executor::block_on;

#[test]
fn test_renew_aborts_previous() {
    let slot = AmbientSlot::new();
    let first = slot.renew();
    assert!(!first.is_aborted());

    let second = slot.renew();
    assert!(first.is_aborted());
    assert!(!second.is_aborted());
    assert!(slot.current().unwrap().same_as(&second));
    assert_ne!(first.id(), second.id());
}

#[test]
fn test_release_compares_identity() {
    let slot = AmbientSlot::new();
    let first = slot.renew();
    let second = slot.renew();
    let third = slot.renew();

    assert!(!slot.release(&first));
    assert!(!slot.release(&second));
    assert!(slot.current().unwrap().same_as(&third));

    assert!(slot.release(&third));
    assert!(slot.current().is_none());
    assert!(!slot.release(&third));
}

#[test]
fn test_same_id_is_not_same_token() {
    let a = AbortToken::new(1);
    let b = AbortToken::new(1);
    assert!(!a.same_as(&b));
    assert!(a.same_as(&a.clone()));
}

#[test]
fn test_cancel_empty_slot() {
    let slot = AmbientSlot::new();
    assert!(!slot.cancel());

    let token = slot.renew();
    assert!(slot.cancel());
    assert!(token.is_aborted());
    assert!(slot.current().is_none());
}

#[test]
fn test_abort_hooks_run_once() {
    let token = AbortToken::new(7);
    let calls = Rc::new(Cell::new(0));

    let counter = calls.clone();
    token.on_abort(move || counter.set(counter.get() + 1));
    token.abort();
    token.abort();
    assert_eq!(calls.get(), 1);

    // registered after the fact
    let counter = calls.clone();
    token.on_abort(move || counter.set(counter.get() + 1));
    assert_eq!(calls.get(), 2);
}

#[test]
fn test_aborted_future() {
    let token = AbortToken::new(3);
    assert!(token.aborted().now_or_never().is_none());

    let handle = token.clone();
    handle.abort();
    block_on(token.aborted());
}

#[test]
fn test_aborted_wakes_every_waiter() {
    use futures::{executor::LocalPool, task::LocalSpawnExt};

    let mut pool = LocalPool::new();
    let token = AbortToken::new(9);
    let woken = Rc::new(Cell::new(0));

    for _ in 0..3 {
        let waiter = token.clone();
        let woken = woken.clone();
        pool.spawner()
            .spawn_local(async move {
                waiter.aborted().await;
                woken.set(woken.get() + 1);
            })
            .unwrap();
    }

    pool.run_until_stalled();
    assert_eq!(woken.get(), 0);

    token.abort();
    pool.run_until_stalled();
    assert_eq!(woken.get(), 3);
}

#[test]
fn test_hooks_observe_aborted_state() {
    let token = AbortToken::new(11);
    let seen = Rc::new(Cell::new(false));

    let observer = token.clone();
    let flag = seen.clone();
    token.on_abort(move || flag.set(observer.is_aborted()));
    token.abort();
    assert!(seen.get());
}
