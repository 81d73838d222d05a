use std::collections::VecDeque;

use crate::Error;

/// A value that `Observable::push` can append to in place.
pub trait Container {
	type Item;

	fn append(&mut self, item: Self::Item) -> Result<(), Error>;
}

impl<U> Container for Vec<U> {
	type Item = U;

	fn append(&mut self, item: U) -> Result<(), Error> {
		self.push(item);
		Ok(())
	}
}

impl<U> Container for VecDeque<U> {
	type Item = U;

	fn append(&mut self, item: U) -> Result<(), Error> {
		self.push_back(item);
		Ok(())
	}
}

impl<U> Container for Option<Vec<U>> {
	type Item = U;

	fn append(&mut self, item: U) -> Result<(), Error> {
		match self {
			Some(vec) => {
				vec.push(item);
				Ok(())
			}
			None => Err(Error::push()),
		}
	}
}

#[cfg(feature = "json")]
impl Container for serde_json::Value {
	type Item = serde_json::Value;

	fn append(&mut self, item: serde_json::Value) -> Result<(), Error> {
		match self {
			serde_json::Value::Array(array) => {
				array.push(item);
				Ok(())
			}
			_ => Err(Error::push()),
		}
	}
}
