#![forbid(unsafe_code)]

//! Ambient scopes: reach the nearest cell of a type without threading it
//! through every call.
//!
//! A thread-local provider stack maps value types to the cells currently in
//! scope. [`enter`] creates a cell, provides it for the duration of a closure,
//! and destroys it when the closure returns (or unwinds). [`provide`] and
//! [`provide_split`] expose cells the caller already owns.
//!
//! Lookups walk the stack from the innermost frame outwards, so an inner
//! provider of `T` shadows outer ones. Every lookup outside a provider of `T`
//! fails with [`ScopeError::NoProvider`].
//!
//! Value and dispatcher frames are independent: code below
//! [`provide_split`] that only calls [`use_dispatcher`] never touches the
//! value half.

use std::any::{Any, TypeId, type_name};
use std::cell::RefCell;
use std::rc::Rc;

use tether_core::lifeline::Lifeline;
use tracing::trace;

use super::cell::{BroadcastCell, CellConfig, Delivery, Subscription, ValueCell};
use super::dispatcher::{Dispatcher, Reducer};
use crate::error::ScopeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Value,
    Dispatch,
}

struct Frame {
    type_id: TypeId,
    role: Role,
    handle: Rc<dyn Any>,
    lifeline: Lifeline,
}

thread_local! {
    static PROVIDERS: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Pops every frame pushed after `depth`, even on unwind.
struct FrameGuard {
    depth: usize,
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        PROVIDERS.with(|frames| frames.borrow_mut().truncate(self.depth));
    }
}

/// Destroys the owned cell when the scope that created it exits.
struct DestroyOnExit<T: Clone + PartialEq + 'static>(BroadcastCell<T>);

impl<T: Clone + PartialEq + 'static> Drop for DestroyOnExit<T> {
    fn drop(&mut self) {
        self.0.destroy();
    }
}

fn push_frames(frames: Vec<Frame>) -> FrameGuard {
    PROVIDERS.with(|stack| {
        let mut stack = stack.borrow_mut();
        let depth = stack.len();
        stack.extend(frames);
        FrameGuard { depth }
    })
}

fn lookup<H: Clone + 'static>(type_id: TypeId, role: Role) -> Option<H> {
    PROVIDERS.with(|stack| {
        stack
            .borrow()
            .iter()
            .rev()
            .find(|frame| frame.type_id == type_id && frame.role == role)
            .and_then(|frame| frame.handle.downcast_ref::<H>().cloned())
    })
}

fn no_provider<T>() -> ScopeError {
    ScopeError::NoProvider {
        type_name: type_name::<T>(),
    }
}

/// Lifeline of the innermost provided cell, if any.
#[must_use]
pub fn current_lifeline() -> Option<Lifeline> {
    PROVIDERS.with(|stack| stack.borrow().last().map(|frame| frame.lifeline.clone()))
}

/// Number of provider frames on this thread.
#[must_use]
pub fn depth() -> usize {
    PROVIDERS.with(|stack| stack.borrow().len())
}

/// Whether some enclosing scope provides a `T` value.
#[must_use]
pub fn is_provided<T: 'static>() -> bool {
    PROVIDERS.with(|stack| {
        stack
            .borrow()
            .iter()
            .any(|frame| frame.type_id == TypeId::of::<T>() && frame.role == Role::Value)
    })
}

/// Create a cell, provide it to `body`, and destroy it when `body` exits.
///
/// The new cell's lifeline is a child of the innermost enclosing cell, so
/// tearing down an outer scope also ends cells entered beneath it.
pub fn enter<T, R>(initial: T, body: impl FnOnce(&BroadcastCell<T>) -> R) -> R
where
    T: Clone + PartialEq + 'static,
{
    enter_with(initial, CellConfig::default(), body)
}

/// [`enter`] with explicit cell configuration.
pub fn enter_with<T, R>(
    initial: T,
    config: CellConfig,
    body: impl FnOnce(&BroadcastCell<T>) -> R,
) -> R
where
    T: Clone + PartialEq + 'static,
{
    let cell = match current_lifeline() {
        Some(parent) => BroadcastCell::within(&parent, initial, config),
        None => BroadcastCell::with_config(initial, config),
    };
    trace!(cell_id = cell.id(), depth = depth(), "scope.enter");
    let owned = DestroyOnExit(cell.clone());
    let result = provide(&cell, || body(&cell));
    drop(owned);
    trace!(cell_id = cell.id(), "scope.exit");
    result
}

/// Provide an existing cell (both halves) to `body`. The cell is not destroyed
/// on exit.
pub fn provide<T, R>(cell: &BroadcastCell<T>, body: impl FnOnce() -> R) -> R
where
    T: Clone + PartialEq + 'static,
{
    provide_split(&cell.value_cell(), &cell.dispatcher(), body)
}

/// Provide the value half and the dispatch half as separate frames.
pub fn provide_split<T, R>(
    value: &ValueCell<T>,
    dispatcher: &Dispatcher<T>,
    body: impl FnOnce() -> R,
) -> R
where
    T: Clone + PartialEq + 'static,
{
    let _guard = push_frames(vec![
        Frame {
            type_id: TypeId::of::<T>(),
            role: Role::Value,
            handle: Rc::new(value.clone()),
            lifeline: value.lifeline(),
        },
        Frame {
            type_id: TypeId::of::<T>(),
            role: Role::Dispatch,
            handle: Rc::new(dispatcher.clone()),
            lifeline: dispatcher.lifeline().clone(),
        },
    ]);
    body()
}

/// The nearest provided value half of type `T`.
pub fn use_value<T: Clone + PartialEq + 'static>() -> Result<ValueCell<T>, ScopeError> {
    lookup::<ValueCell<T>>(TypeId::of::<T>(), Role::Value).ok_or_else(no_provider::<T>)
}

/// The nearest provided dispatcher of type `T`.
pub fn use_dispatcher<T: Clone + PartialEq + 'static>() -> Result<Dispatcher<T>, ScopeError> {
    lookup::<Dispatcher<T>>(TypeId::of::<T>(), Role::Dispatch).ok_or_else(no_provider::<T>)
}

/// Clone of the nearest provided `T`.
pub fn read<T: Clone + PartialEq + 'static>() -> Result<T, ScopeError> {
    use_value::<T>()?.read()
}

/// Borrow the nearest provided `T`.
pub fn with<T, R>(f: impl FnOnce(&T) -> R) -> Result<R, ScopeError>
where
    T: Clone + PartialEq + 'static,
{
    use_value::<T>()?.with(f)
}

/// Dispatch a transition to the nearest provided `T`.
pub fn dispatch<T>(f: impl FnOnce(&T) -> T) -> Result<Delivery, ScopeError>
where
    T: Clone + PartialEq + 'static,
{
    use_dispatcher::<T>()?.dispatch(f)
}

/// Send an action to the nearest provided `T`.
pub fn send<T, A>(action: A) -> Result<Delivery, ScopeError>
where
    T: Clone + PartialEq + Reducer<A> + 'static,
{
    use_dispatcher::<T>()?.send(action)
}

/// Subscribe to the nearest provided `T`.
pub fn subscribe<T>(callback: impl Fn(&T) + 'static) -> Result<Subscription, ScopeError>
where
    T: Clone + PartialEq + 'static,
{
    Ok(use_value::<T>()?.subscribe(callback))
}
