//! Awaitable bridge: native futures over guest promises.
//!
//! `await` on a proxy requires the promise capability; anything else fails
//! immediately with a type error naming the value's representation. For a
//! promise, the bridge normalizes the value, creates a native future, and
//! attaches two guest callbacks that settle the future with the translated
//! outcome and wake whoever is polling. The bridge only arranges eventual
//! resolution; suspension and resumption belong to the native runtime's own
//! single-threaded cooperative scheduler.
//!
//! Dropping a pending `GuestFuture` abandons it. Cancellation is not
//! propagated into the guest promise; its eventual settlement simply has no
//! one left to wake.

use crate::convert::guest_to_native;
use crate::error::BridgeError;
use crate::exception::wrap_guest_error;
use crate::proxy::GuestProxy;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use tether_core::{GuestRef, GuestRuntime, Handle, Value};

// =============================================================================
// Shared State
// =============================================================================

struct SharedState {
    /// Settlement outcome; `Ok` resolution, `Err` rejection. Consumed by
    /// the first poll that observes it.
    outcome: Option<Result<Handle, Handle>>,
    /// Waker of the most recent pending poll.
    waker: Option<Waker>,
}

// =============================================================================
// GuestFuture
// =============================================================================

/// A native future settled by a guest promise.
///
/// Single-shot: after the settled outcome has been yielded once, further
/// polls stay pending forever.
pub struct GuestFuture {
    rt: Rc<dyn GuestRuntime>,
    state: Rc<RefCell<SharedState>>,
}

impl std::fmt::Debug for GuestFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestFuture").finish_non_exhaustive()
    }
}

impl Future for GuestFuture {
    type Output = Result<Value, BridgeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.state.borrow_mut();
        if let Some(outcome) = state.outcome.take() {
            drop(state);
            return Poll::Ready(match outcome {
                Ok(value) => guest_to_native(&self.rt, value.raw()),
                Err(error) => Err(wrap_guest_error(&self.rt, error)),
            });
        }
        state.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

// =============================================================================
// Await Entry Point
// =============================================================================

/// Prepare a proxy for native await.
pub(crate) fn await_proxy(p: &GuestProxy) -> Result<GuestFuture, BridgeError> {
    if !p.proxy_type().awaitable {
        return Err(BridgeError::type_error(format!(
            "object {} can't be used in 'await' expression",
            p.repr()
        )));
    }
    let rt = p.runtime();

    let promise = Handle::adopt(Rc::clone(rt), rt.resolve_promise(p.target_ref()));
    let state = Rc::new(RefCell::new(SharedState {
        outcome: None,
        waker: None,
    }));

    let on_resolve = settle_callback(Rc::clone(rt), Rc::clone(&state), true);
    let on_reject = settle_callback(Rc::clone(rt), Rc::clone(&state), false);
    rt.attach_then(promise.raw(), on_resolve, on_reject);

    Ok(GuestFuture {
        rt: Rc::clone(rt),
        state,
    })
}

fn settle_callback(
    rt: Rc<dyn GuestRuntime>,
    state: Rc<RefCell<SharedState>>,
    resolved: bool,
) -> Box<dyn FnOnce(GuestRef)> {
    Box::new(move |value: GuestRef| {
        let value = Handle::adopt(rt, value);
        let waker = {
            let mut state = state.borrow_mut();
            state.outcome = Some(if resolved { Ok(value) } else { Err(value) });
            state.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    })
}
