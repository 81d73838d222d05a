use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::Error;

/// Resolves with `Ok(())` once `duration` has elapsed, or with
/// [`Error::Cancelled`] if it was cancelled first.
pub fn delay(duration: Duration) -> Delay {
	Delay::new(duration)
}

#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Delay {
	future: BoxFuture<'static, Result<(), Error>>,
	token: CancellationToken,
}

impl Delay {
	pub fn new(duration: Duration) -> Self {
		let token = CancellationToken::new();
		let cancelled = token.clone();

		let future = async move {
			tokio::select! {
				biased;
				_ = cancelled.cancelled() => Err(Error::Cancelled),
				_ = tokio::time::sleep(duration) => Ok(()),
			}
		}
		.boxed();

		Delay { future, token }
	}

	/// Stops the timer. Safe to call repeatedly or after it fired.
	pub fn cancel(&self) {
		self.token.cancel()
	}

	/// A token that cancels this delay from elsewhere.
	pub fn canceller(&self) -> CancellationToken {
		self.token.clone()
	}

	pub fn is_cancelled(&self) -> bool {
		self.token.is_cancelled()
	}
}

impl Future for Delay {
	type Output = Result<(), Error>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		self.future.as_mut().poll(cx)
	}
}

impl std::fmt::Debug for Delay {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Delay")
			.field("cancelled", &self.token.is_cancelled())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn elapses() {
		let started = tokio::time::Instant::now();
		delay(Duration::from_millis(100)).await.unwrap();
		assert!(started.elapsed() >= Duration::from_millis(100));
	}

	#[tokio::test(start_paused = true)]
	async fn cancel_prevents_the_timer() {
		let delay = delay(Duration::from_secs(60));
		let canceller = delay.canceller();

		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(5)).await;
			canceller.cancel();
		});

		assert!(matches!(delay.await, Err(Error::Cancelled)));
	}

	#[tokio::test(start_paused = true)]
	async fn cancelled_before_polling() {
		let delay = delay(Duration::from_millis(10));
		delay.cancel();
		delay.cancel();
		assert!(delay.is_cancelled());
		assert!(matches!(delay.await, Err(Error::Cancelled)));
	}
}
