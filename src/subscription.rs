use std::rc::{Rc, Weak};

use tokio_util::sync::CancellationToken;

use crate::addr::{addr, WeakAddr};
use crate::observable::ObservableBody;
use crate::Derived;

/// Notification callback, called with `(current, previous)`.
pub type Handler<T> = Rc<dyn Fn(&T, &T)>;

pub(crate) enum Subscriber<T> {
	Handler {
		handler: Handler<T>,
		cancel: Option<CancellationToken>,
	},
	/// A computed observable that re-evaluates when this one publishes.
	Dependent(WeakAddr<dyn Derived>),
}

impl<T> Clone for Subscriber<T> {
	fn clone(&self) -> Self {
		match self {
			Subscriber::Handler { handler, cancel } => Subscriber::Handler {
				handler: handler.clone(),
				cancel: cancel.clone(),
			},
			Subscriber::Dependent(derived) => Subscriber::Dependent(derived.clone()),
		}
	}
}

impl<T> Subscriber<T> {
	fn is_live(&self) -> bool {
		match self {
			Subscriber::Handler { cancel, .. } => {
				!cancel.as_ref().is_some_and(|cancel| cancel.is_cancelled())
			}
			Subscriber::Dependent(derived) => derived.is_alive(),
		}
	}
}

/// Subscribers in subscription order. A handler or a dependent is
/// present at most once.
pub(crate) struct Subscribers<T> {
	list: Vec<Subscriber<T>>,
}

impl<T> Default for Subscribers<T> {
	fn default() -> Self {
		Subscribers { list: Vec::new() }
	}
}

impl<T> Subscribers<T> {
	pub fn add_handler(&mut self, handler: Handler<T>, cancel: Option<CancellationToken>) -> bool {
		if self.position(&handler).is_some() {
			return false;
		}

		self.list.push(Subscriber::Handler { handler, cancel });
		true
	}

	/// Takes the handler out of the list. The entry is handed back so the
	/// caller can drop it once no borrow of the owning observable is held.
	pub fn remove_handler(&mut self, handler: &Handler<T>) -> Option<Subscriber<T>> {
		let index = self.position(handler)?;
		Some(self.list.remove(index))
	}

	pub fn contains_handler(&self, handler: &Handler<T>) -> bool {
		self.position(handler).is_some()
	}

	pub fn add_dependent(&mut self, derived: Weak<dyn Derived>) -> bool {
		let derived = WeakAddr::new(derived);
		let exists = self.list.iter().any(|item| match item {
			Subscriber::Dependent(item) => *item == derived,
			_ => false,
		});

		if !exists {
			self.list.push(Subscriber::Dependent(derived));
		}

		!exists
	}

	pub fn remove_dependent(&mut self, derived: &Weak<dyn Derived>) {
		let target = addr(Weak::as_ptr(derived));
		self.list.retain(|item| match item {
			Subscriber::Dependent(item) => item.addr() != target,
			_ => true,
		});
	}

	/// Takes out handlers whose cancellation token fired and dependents
	/// that were dropped. A removed handler may own the last handle of an
	/// observable, so the caller drops the result after releasing its
	/// borrow.
	pub fn prune(&mut self) -> Vec<Subscriber<T>> {
		let (live, removed): (Vec<_>, Vec<_>) = std::mem::take(&mut self.list)
			.into_iter()
			.partition(Subscriber::is_live);

		self.list = live;
		removed
	}

	pub fn snapshot(&self) -> Vec<Subscriber<T>> {
		self.list.clone()
	}

	pub fn len(&self) -> usize {
		self.list.len()
	}

	fn position(&self, handler: &Handler<T>) -> Option<usize> {
		let target = addr(Rc::as_ptr(handler));
		self.list.iter().position(|item| match item {
			Subscriber::Handler { handler, .. } => addr(Rc::as_ptr(handler)) == target,
			_ => false,
		})
	}
}

/// Removes one handler from an observable.
///
/// Calling it more than once, or after the observable was dropped, does
/// nothing. Dropping it keeps the subscription alive.
pub struct Unsubscribe<T: Clone + 'static> {
	body: Weak<ObservableBody<T>>,
	handler: Handler<T>,
}

impl<T: Clone + 'static> Clone for Unsubscribe<T> {
	fn clone(&self) -> Self {
		Unsubscribe {
			body: self.body.clone(),
			handler: self.handler.clone(),
		}
	}
}

impl<T: Clone + 'static> Unsubscribe<T> {
	pub(crate) fn new(body: Weak<ObservableBody<T>>, handler: Handler<T>) -> Self {
		Unsubscribe { body, handler }
	}

	pub fn unsubscribe(&self) {
		if let Some(body) = self.body.upgrade() {
			body.unsubscribe(&self.handler);
		}
	}
}

impl<T: Clone + 'static> std::fmt::Debug for Unsubscribe<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Unsubscribe")
			.field("alive", &(self.body.strong_count() > 0))
			.finish()
	}
}
