//! Latest-wins stream throttling for status subscriptions.

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, interval};

/// Extension trait adding throttling to any stream.
pub trait ThrottleExt: Stream {
    /// Emit at most once per `duration`, latest-wins: when several items
    /// arrive within one interval only the newest survives. Status consumers
    /// care about the current picture, not the history.
    fn throttle(self, duration: Duration) -> Throttle<Self>
    where
        Self: Sized,
    {
        Throttle::new(self, duration)
    }
}

impl<T: Stream> ThrottleExt for T {}

pin_project! {
    /// Stream combinator limiting emission rate with latest-wins semantics.
    pub struct Throttle<S: Stream> {
        #[pin]
        stream: S,
        interval: Interval,
        pending: Option<S::Item>,
        done: bool,
    }
}

impl<S: Stream> Throttle<S> {
    pub fn new(stream: S, duration: Duration) -> Self {
        let mut interval = interval(duration);
        // Delay rather than burst when a consumer falls behind.
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        Self { stream, interval, pending: None, done: false }
    }
}

impl<S: Stream> Stream for Throttle<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if *this.done {
            return Poll::Ready(this.pending.take());
        }

        ready!(this.interval.poll_tick(cx));

        // Drain everything currently available, keeping only the newest.
        loop {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => {
                    *this.pending = Some(item);
                }
                Poll::Ready(None) => {
                    *this.done = true;
                    return Poll::Ready(this.pending.take());
                }
                Poll::Pending => {
                    return match this.pending.take() {
                        Some(item) => Poll::Ready(Some(item)),
                        // The source registered the waker; a tick with
                        // nothing buffered is not end-of-stream.
                        None => Poll::Pending,
                    };
                }
            }
        }
    }
}
