#![forbid(unsafe_code)]

//! Fan-in over a fixed batch of local futures.

use futures_util::future::{LocalBoxFuture, join_all};

/// Wait for every future in `batch`.
///
/// The batch is fixed when this is called; work registered afterwards is
/// not part of the wait set. Completes immediately for an empty batch.
pub async fn join_all_local(batch: Vec<LocalBoxFuture<'static, ()>>) {
    if batch.is_empty() {
        return;
    }
    tracing::debug!(target: "panelkit.runtime", waiting_on = batch.len(), "joining futures");
    join_all(batch).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ready::ReadySignal;
    use futures_util::FutureExt;
    use std::future::Future;
    use std::pin::pin;
    use std::task::{Context, Poll, Waker};

    #[test]
    fn empty_batch_completes() {
        pollster::block_on(join_all_local(Vec::new()));
    }

    #[test]
    fn waits_for_slowest_member() {
        let fast = ReadySignal::resolved(());
        let slow = ReadySignal::<()>::new();
        let batch = vec![
            fast.until_ready().boxed_local(),
            slow.until_ready().boxed_local(),
        ];
        let mut joined = pin!(join_all_local(batch));
        let mut cx = Context::from_waker(Waker::noop());

        assert!(joined.as_mut().poll(&mut cx).is_pending());
        slow.fire(());
        assert_eq!(joined.as_mut().poll(&mut cx), Poll::Ready(()));
    }
}
