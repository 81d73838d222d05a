use std::fmt::Debug;
use std::future::Future;

use futures::future::LocalBoxFuture;
use futures::FutureExt;

use crate::Error;

/// A value written into an observable: either available right away or
/// still being produced by a future.
pub enum Update<T> {
	Ready(T),
	Pending(LocalBoxFuture<'static, Result<T, Error>>),
}

impl<T: 'static> Update<T> {
	pub fn pending<F>(future: F) -> Self
	where
		F: Future<Output = Result<T, Error>> + 'static,
	{
		Update::Pending(future.boxed_local())
	}

	/// Wraps an infallible future.
	pub fn later<F>(future: F) -> Self
	where
		F: Future<Output = T> + 'static,
	{
		Update::Pending(future.map(Ok).boxed_local())
	}

	pub fn is_pending(&self) -> bool {
		matches!(self, Update::Pending(_))
	}
}

impl<T> From<T> for Update<T> {
	fn from(value: T) -> Self {
		Update::Ready(value)
	}
}

impl<T: Debug> Debug for Update<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Update::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
			Update::Pending(_) => f.write_str("Pending"),
		}
	}
}
