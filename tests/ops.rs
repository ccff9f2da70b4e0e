use futures::executor::block_on;
use futures::StreamExt;
use seq_engine::{ops, BoxSequence, PullSequence, Sequence, SequenceError};

fn words() -> Sequence<&'static str> {
    Sequence::new(|co| async move {
        for word in ["pull", "based", "sequence"] {
            co.emit(word).await;
        }
    })
}

#[test]
fn test_to_vec_and_boxed_slice() {
    assert_eq!(block_on(ops::to_vec(&words())).unwrap(), ["pull", "based", "sequence"]);

    let boxed = block_on(ops::to_boxed_slice(&words())).unwrap();
    assert_eq!(boxed.len(), 3);
}

#[test]
fn test_for_each_with_threads_state_through() {
    let lengths = block_on(ops::for_each_with(&words(), Vec::new(), |lengths, word| {
        lengths.push(word.len());
    }))
    .unwrap();
    assert_eq!(lengths, [4, 5, 8]);
}

#[test]
fn test_for_each_propagates_failure() {
    let seq = Sequence::new(|co| async move {
        co.emit(1).await;
        Err::<(), _>(std::io::Error::other("disk gone"))
    });

    let mut seen = Vec::new();
    let err = block_on(ops::for_each(&seq, |item| seen.push(item))).unwrap_err();
    assert_eq!(seen, [1]);
    assert!(err.downcast_ref::<std::io::Error>().is_some());
}

#[test]
fn test_empty_and_from_iter_as_boxed() {
    let mut sources: Vec<BoxSequence<u8>> = Vec::new();
    sources.push(Box::new(ops::empty()));
    sources.push(Box::new(ops::from_iter([1, 2])));

    let mut all = Vec::new();
    for source in &sources {
        all.extend(block_on(ops::to_vec(source)).unwrap());
    }
    assert_eq!(all, [1, 2]);
    assert_eq!(sources[0].pull().wait().unwrap(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stream_adapter() {
    let seq = Sequence::new(|co| async move {
        for i in 0..4u64 {
            tokio::task::yield_now().await;
            co.emit(i * 10).await;
        }
    });

    let items: Vec<u64> = seq
        .into_stream()
        .map(|item| item.unwrap())
        .collect()
        .await;
    assert_eq!(items, [0, 10, 20, 30]);
}

#[test]
fn test_stream_reports_usage_error_once() {
    let (tx, rx) = futures::channel::oneshot::channel::<()>();
    let seq = Sequence::new(move |co| async move {
        let _ = rx.await;
        co.emit(1).await;
    });

    let pending = seq.pull();
    let mut stream = ops::into_stream(&seq);
    let first = block_on(stream.next()).unwrap();
    assert!(matches!(first, Err(SequenceError::ConcurrentPull)));
    assert!(block_on(stream.next()).is_none());

    tx.send(()).unwrap();
    assert_eq!(pending.wait().unwrap(), Some(1));
}
