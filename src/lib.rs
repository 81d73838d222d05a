//! Observable values with automatic dependency tracking.
//!
//! ```
//! use observe_lite::Observable;
//!
//! let child = Observable::new(5);
//! let parent = Observable::computed({
//! 	let child = child.clone();
//! 	move || child.get() * 2
//! });
//!
//! assert_eq!(parent.get(), 10);
//! child.set(10);
//! assert_eq!(parent.get(), 20);
//! ```

pub mod macros;

mod addr;
mod container;
mod delay;
mod dependencies;
mod error;
mod evaluation;
mod observable;
mod subscription;
mod update;

use std::rc::{Rc, Weak};

pub use container::Container;
pub use delay::{delay, Delay};
pub use error::Error;
pub use observable::Observable;
pub use subscription::{Handler, Unsubscribe};
pub use tokio_util::sync::CancellationToken;
pub use update::Update;

/// Something that re-evaluates when one of its sources publishes.
pub trait Derived: 'static {
	fn recompute(self: Rc<Self>);
}

/// Something a computation can read and depend on.
pub trait Source: 'static {
	/// Notify this source that `derived` started
	/// to listen.
	fn used_by(&self, derived: Weak<dyn Derived>);

	/// Notify this source that `derived` stopped
	/// to listen.
	fn not_used_by(&self, derived: &Weak<dyn Derived>);
}

pub fn observable<T: Clone + 'static>(value: T) -> Observable<T> {
	Observable::new(value)
}

pub fn computed<T, F>(func: F) -> Observable<T>
where
	T: Clone + 'static,
	F: Fn() -> T + 'static,
{
	Observable::computed(func)
}
