use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::future::Future;
use std::rc::{Rc, Weak};
use std::time::Duration;

use futures::FutureExt;
use smallvec::SmallVec;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::addr::addr;
use crate::container::Container;
use crate::delay::Delay;
use crate::dependencies::Dependencies;
use crate::evaluation::Evaluation;
use crate::subscription::{Handler, Subscriber, Subscribers, Unsubscribe};
use crate::{Derived, Error, Source, Update};

type ComputeFn<T> = Rc<dyn Fn() -> Update<T>>;

/// A value that notifies its subscribers whenever it is replaced.
///
/// An observable is either plain, holding whatever was last written to
/// it, or computed, holding the result of a function over other
/// observables. A computed observable records every observable it reads
/// with [`Observable::get`] while its function runs and re-evaluates
/// whenever one of them publishes.
///
/// Asynchronous writes resolve on the current tokio `LocalSet`. Only the
/// most recently issued one is applied: a write that settles after a
/// newer write was issued is discarded.
pub struct Observable<T: Clone + 'static> {
	body: Rc<ObservableBody<T>>,
}

impl<T: Clone> Clone for Observable<T> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

pub(crate) struct ObservableBody<T: Clone + 'static> {
	value: RefCell<T>,
	previous: RefCell<T>,
	computing: Cell<bool>,
	inner: RefCell<ObservableInner<T>>,
	this: Weak<ObservableBody<T>>,
}

struct ObservableInner<T: Clone + 'static> {
	subscribers: Subscribers<T>,
	func: Option<ComputeFn<T>>,
	dependencies: Dependencies,
	/// Bumped by every asynchronous write.
	generation: u64,
	/// Bumped by every compute pass.
	evaluation: u64,
	pending: SmallVec<[u64; 2]>,
	this: Weak<ObservableBody<T>>,
}

impl<T: Clone + 'static> Drop for ObservableInner<T> {
	fn drop(&mut self) {
		let refr = self.this.clone() as Weak<dyn Derived>;
		self.dependencies.drop(&refr);
	}
}

impl<T> Observable<T>
where
	T: Clone + 'static,
{
	pub fn new(value: T) -> Self {
		Self::build(value, None)
	}

	/// Computes the value from `func`, which runs once right away and again
	/// every time an observable it read publishes.
	pub fn computed<F>(func: F) -> Self
	where
		F: Fn() -> T + 'static,
	{
		let (value, dependencies) = Evaluation::run(std::ptr::null(), &func);
		let this = Self::build(value, Some(Rc::new(move || Update::Ready(func()))));
		this.body.inner.borrow_mut().evaluation = 1;
		this.body.bind(dependencies);
		this
	}

	/// Like [`Observable::computed`], with a fixed bundle of arguments
	/// handed to `func` on every evaluation.
	pub fn computed_with<A, F>(func: F, args: A) -> Self
	where
		A: 'static,
		F: Fn(&A) -> T + 'static,
	{
		Self::computed(move || func(&args))
	}

	/// Computes the value asynchronously. `initial` is visible until the
	/// first evaluation settles.
	///
	/// Only reads made before `func` returns its future are tracked, so
	/// read the inputs up front and move them into the future.
	pub fn computed_async<F, Fut>(initial: T, func: F) -> Self
	where
		F: Fn() -> Fut + 'static,
		Fut: Future<Output = Result<T, Error>> + 'static,
	{
		Self::derived(initial, move || Update::pending(func()))
	}

	/// Computes the value from a function that may answer right away or
	/// with a future.
	pub fn derived<F>(initial: T, func: F) -> Self
	where
		F: Fn() -> Update<T> + 'static,
	{
		let this = Self::build(initial, Some(Rc::new(func)));
		this.body.compute();
		this
	}

	fn build(value: T, func: Option<ComputeFn<T>>) -> Self {
		Observable {
			body: Rc::new_cyclic(|this| ObservableBody {
				previous: RefCell::new(value.clone()),
				value: RefCell::new(value),
				computing: Cell::new(false),
				inner: RefCell::new(ObservableInner {
					subscribers: Subscribers::default(),
					func,
					dependencies: Dependencies::new(),
					generation: 0,
					evaluation: 0,
					pending: SmallVec::new(),
					this: this.clone(),
				}),
				this: this.clone(),
			}),
		}
	}

	/// Returns the current value. Inside a computation this also records
	/// the observable as a dependency of that computation.
	#[inline]
	pub fn get(&self) -> T {
		self.body.get()
	}

	#[inline]
	pub fn get_untracked(&self) -> T {
		self.body.value.borrow().clone()
	}

	/// The value that was current right before the latest write.
	pub fn previous(&self) -> T {
		self.body.previous.borrow().clone()
	}

	#[inline]
	pub fn set(&self, value: T) {
		self.body.set(value)
	}

	/// Writes the output of `future` once it resolves, unless another
	/// asynchronous write was issued in the meantime.
	pub fn set_async<F>(&self, future: F)
	where
		F: Future<Output = T> + 'static,
	{
		self.body.set_future(future.map(Ok))
	}

	/// Like [`Observable::set_async`]. A failed future is logged and
	/// leaves the value untouched.
	pub fn set_future<F>(&self, future: F)
	where
		F: Future<Output = Result<T, Error>> + 'static,
	{
		self.body.set_future(future)
	}

	pub fn assign(&self, update: impl Into<Update<T>>) {
		match update.into() {
			Update::Ready(value) => self.body.set(value),
			Update::Pending(future) => self.body.set_future(future),
		}
	}

	pub fn subscribe<F>(&self, handler: F) -> Unsubscribe<T>
	where
		F: Fn(&T, &T) + 'static,
	{
		self.subscribe_handler(Rc::new(handler))
	}

	/// Subscribes a shared handler. Subscribing the same handler twice
	/// keeps a single registration.
	pub fn subscribe_handler(&self, handler: Handler<T>) -> Unsubscribe<T> {
		self.body.subscribe(handler, None)
	}

	/// Subscribes `handler` until `cancel` fires. A cancelled handler is
	/// never notified again. It stays in the subscriber list, together
	/// with whatever it captured, until the next `publish` or
	/// `subscriber_count` takes it out.
	pub fn subscribe_until<F>(&self, handler: F, cancel: CancellationToken) -> Unsubscribe<T>
	where
		F: Fn(&T, &T) + 'static,
	{
		self.body.subscribe(Rc::new(handler), Some(cancel))
	}

	pub fn subscriber_count(&self) -> usize {
		let (count, removed) = {
			let mut inner = self.body.inner.borrow_mut();
			let removed = inner.subscribers.prune();
			(inner.subscribers.len(), removed)
		};

		drop(removed);
		count
	}

	/// Notifies every subscriber with the current and previous value.
	#[inline]
	pub fn publish(&self) {
		self.body.publish()
	}

	/// Re-evaluates a computed observable. Does nothing for a plain one,
	/// or when called from inside its own evaluation.
	#[inline]
	pub fn compute(&self) {
		self.body.compute()
	}

	/// Appends to the current value in place. Subscribers are not
	/// notified.
	pub fn push(&self, item: T::Item) -> Result<(), Error>
	where
		T: Container,
	{
		self.body.value.borrow_mut().append(item)
	}

	pub fn delay(duration: Duration) -> Delay {
		Delay::new(duration)
	}

	pub fn is_computed(&self) -> bool {
		self.body.inner.borrow().func.is_some()
	}

	pub fn generation(&self) -> u64 {
		self.body.inner.borrow().generation
	}

	/// Number of asynchronous writes that have not settled yet.
	pub fn pending(&self) -> usize {
		self.body.inner.borrow().pending.len()
	}

	pub fn dependency_count(&self) -> usize {
		self.body.inner.borrow().dependencies.len()
	}
}

impl<T> ObservableBody<T>
where
	T: Clone + 'static,
{
	fn addr(&self) -> *const () {
		addr(self as *const Self)
	}

	fn get(&self) -> T {
		if Evaluation::is_active() {
			if let Some(this) = self.this.upgrade() {
				Evaluation::track(this);
			}
		}

		self.value.borrow().clone()
	}

	fn set(&self, value: T) {
		let previous = self.value.replace(value);
		*self.previous.borrow_mut() = previous;
		self.publish();
	}

	fn set_future<F>(&self, future: F)
	where
		F: Future<Output = Result<T, Error>> + 'static,
	{
		let generation = {
			let mut inner = self.inner.borrow_mut();
			inner.generation += 1;
			let generation = inner.generation;
			inner.pending.push(generation);
			generation
		};

		*self.previous.borrow_mut() = self.value.borrow().clone();

		let this = self.this.clone();
		tokio::task::spawn_local(async move {
			let result = future.await;
			if let Some(this) = this.upgrade() {
				this.settle(generation, result);
			}
		});
	}

	fn settle(&self, generation: u64, result: Result<T, Error>) {
		let latest = {
			let mut inner = self.inner.borrow_mut();
			inner.pending.retain(|item| *item != generation);
			inner.generation == generation
		};

		match result {
			Ok(value) if latest => {
				*self.value.borrow_mut() = value;
				self.publish();
			}
			Ok(_) => trace!(generation, "discarding stale value"),
			Err(error) => error!(generation, %error, "asynchronous write failed"),
		}
	}

	fn subscribe(&self, handler: Handler<T>, cancel: Option<CancellationToken>) -> Unsubscribe<T> {
		self.inner
			.borrow_mut()
			.subscribers
			.add_handler(handler.clone(), cancel);

		Unsubscribe::new(self.this.clone(), handler)
	}

	pub(crate) fn unsubscribe(&self, handler: &Handler<T>) {
		let removed = self.inner.borrow_mut().subscribers.remove_handler(handler);
		drop(removed);
	}

	fn is_subscribed(&self, handler: &Handler<T>) -> bool {
		self.inner.borrow().subscribers.contains_handler(handler)
	}

	fn publish(&self) {
		let (subscribers, removed) = {
			let mut inner = self.inner.borrow_mut();
			let removed = inner.subscribers.prune();
			(inner.subscribers.snapshot(), removed)
		};

		// Dropping a removed handler can drop a dependent, which then
		// unregisters itself from this observable.
		drop(removed);

		if subscribers.is_empty() {
			return;
		}

		// Handlers may write back into this observable.
		let current = self.value.borrow().clone();
		let previous = self.previous.borrow().clone();

		trace!(subscribers = subscribers.len(), "publishing");
		for subscriber in subscribers {
			match subscriber {
				Subscriber::Handler { handler, cancel } => {
					if cancel.is_some_and(|cancel| cancel.is_cancelled()) {
						self.unsubscribe(&handler);
						continue;
					}

					// Removed by an earlier handler of this publish.
					if !self.is_subscribed(&handler) {
						continue;
					}

					handler(&current, &previous);
				}
				Subscriber::Dependent(derived) => {
					if let Some(derived) = derived.upgrade() {
						derived.recompute();
					}
				}
			}
		}
	}

	fn compute(&self) {
		let Some(func) = self.inner.borrow().func.clone() else {
			return;
		};

		let Some(_computing) = Computing::enter(&self.computing) else {
			trace!("skipping re-entrant computation");
			return;
		};

		let (update, dependencies) = Evaluation::run(self.addr(), || func());

		let evaluation = {
			let mut inner = self.inner.borrow_mut();
			inner.evaluation += 1;
			inner.evaluation
		};

		// Reads are only tracked while `func` runs, so the set is complete
		// even when the result is still pending.
		self.bind(dependencies);

		match update {
			Update::Ready(value) => self.finish(evaluation, Ok(value)),
			Update::Pending(future) => {
				let this = self.this.clone();
				tokio::task::spawn_local(async move {
					let result = future.await;
					let Some(this) = this.upgrade() else {
						return;
					};

					let Some(_computing) = Computing::enter(&this.computing) else {
						trace!(evaluation, "observable busy, dropping computed value");
						return;
					};

					this.finish(evaluation, result);
				});
			}
		}
	}

	/// Writes the result of an evaluation, unless a newer evaluation has
	/// started since.
	fn finish(&self, evaluation: u64, result: Result<T, Error>) {
		if self.inner.borrow().evaluation != evaluation {
			trace!(evaluation, "discarding stale evaluation");
			return;
		}

		match result {
			Ok(value) => self.set(value),
			Err(error) => error!(evaluation, %error, "computation failed"),
		}
	}

	fn bind(&self, dependencies: Dependencies) {
		let parent = self.this.clone() as Weak<dyn Derived>;
		let mut current = std::mem::take(&mut self.inner.borrow_mut().dependencies);

		debug!(count = dependencies.len(), "binding dependencies");
		current.swap(dependencies, &parent);

		self.inner.borrow_mut().dependencies = current;
	}
}

impl<T> Source for ObservableBody<T>
where
	T: Clone + 'static,
{
	fn used_by(&self, derived: Weak<dyn Derived>) {
		self.inner.borrow_mut().subscribers.add_dependent(derived);
	}

	fn not_used_by(&self, derived: &Weak<dyn Derived>) {
		self.inner.borrow_mut().subscribers.remove_dependent(derived);
	}
}

impl<T> Derived for ObservableBody<T>
where
	T: Clone + 'static,
{
	fn recompute(self: Rc<Self>) {
		self.compute();
	}
}

/// Marks an observable as mid-computation for as long as it lives.
struct Computing<'a>(&'a Cell<bool>);

impl<'a> Computing<'a> {
	fn enter(flag: &'a Cell<bool>) -> Option<Self> {
		if flag.replace(true) {
			return None;
		}

		Some(Computing(flag))
	}
}

impl Drop for Computing<'_> {
	fn drop(&mut self) {
		self.0.set(false);
	}
}

impl<T> Debug for Observable<T>
where
	T: Clone + Debug + 'static,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Observable")
			.field("value", &*self.body.value.borrow())
			.field("computed", &self.is_computed())
			.finish()
	}
}

impl<T> Default for Observable<T>
where
	T: Clone + Default + 'static,
{
	fn default() -> Self {
		Observable::new(Default::default())
	}
}
