use std::fmt::Display;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// The current value does not support the requested operation,
	/// e.g. `push` on a value that is not a sequential container.
	#[error("`{operation}` can only be called on an observable container")]
	InvalidOperation { operation: &'static str },

	#[error("delay was cancelled before it elapsed")]
	Cancelled,

	/// An asynchronous value failed to resolve.
	#[error("failed to resolve value: {0}")]
	Rejected(String),
}

impl Error {
	pub fn rejected(reason: impl Display) -> Self {
		Error::Rejected(reason.to_string())
	}

	pub(crate) fn push() -> Self {
		Error::InvalidOperation { operation: "push" }
	}
}
