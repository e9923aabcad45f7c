use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    time::Duration,
};

use futures_util::FutureExt;
use ripple_core::{cursor, queue, Emitter, EmitterOptions, Event, Strategy};
use ripple_util::{
    once, subscribe_into, to_promise, to_promise_with_signal, AbortController, DisposableStore,
};

#[test]
fn once_delivers_a_single_value() {
    for strategy in [Strategy::Cursor, Strategy::Queue] {
        let emitter = strategy.build::<u32>(EmitterOptions::new());
        let seen = Rc::new(RefCell::new(Vec::new()));
        {
            let seen = seen.clone();
            once(&emitter, move |value: &u32| seen.borrow_mut().push(*value));
        }
        assert_eq!(emitter.size(), 1);
        emitter.fire(1);
        emitter.fire(2);
        assert_eq!(*seen.borrow(), [1]);
        assert_eq!(emitter.size(), 0);
    }
}

#[test]
fn once_survives_nested_fire() {
    for strategy in [Strategy::Cursor, Strategy::Queue] {
        let emitter = strategy.build::<u32>(EmitterOptions::new());
        let once_seen = Rc::new(RefCell::new(Vec::new()));
        let all_seen = Rc::new(RefCell::new(Vec::new()));
        {
            let inner = emitter.clone();
            let once_seen = once_seen.clone();
            once(&emitter, move |value: &u32| {
                once_seen.borrow_mut().push(*value);
                inner.fire(value + 1);
            });
        }
        {
            let all_seen = all_seen.clone();
            emitter.subscribe(move |value: &u32| all_seen.borrow_mut().push(*value));
        }
        emitter.fire(1);
        assert_eq!(*once_seen.borrow(), [1]);
        assert_eq!(*all_seen.borrow(), [1, 2]);
        assert_eq!(emitter.size(), 1);
    }
}

#[test]
fn once_can_be_detached_before_firing() {
    let emitter = queue::Emitter::<u32>::new();
    let hits = Rc::new(Cell::new(0));
    let subscription = {
        let hits = hits.clone();
        once(&emitter, move |_: &u32| hits.set(hits.get() + 1))
    };
    subscription.dispose();
    emitter.fire(1);
    assert_eq!(hits.get(), 0);
    assert_eq!(emitter.size(), 0);
}

#[test]
fn once_failure_reaches_the_error_hook() {
    let errors = Rc::new(RefCell::new(Vec::new()));
    let options = {
        let errors = errors.clone();
        EmitterOptions::new().on_listener_error(move |error| errors.borrow_mut().push(error.to_string()))
    };
    let emitter = cursor::Emitter::<u32>::with_options(options);
    once(&emitter, |_: &u32| -> anyhow::Result<()> { anyhow::bail!("no thanks") });
    emitter.fire(1);
    emitter.fire(2);
    assert_eq!(*errors.borrow(), ["no thanks"]);
}

#[test]
fn promise_resolves_with_the_next_value() {
    let emitter = cursor::Emitter::<u32>::new();
    let future = to_promise(&emitter);
    assert_eq!(emitter.size(), 1);
    emitter.fire(7);
    emitter.fire(8);
    assert_eq!(emitter.size(), 0);
    assert_eq!(futures_executor::block_on(future), 7);
}

#[test]
fn promise_resolves_from_another_task() {
    let executor = smol::LocalExecutor::new();
    let emitter = queue::Emitter::<String>::new();
    let future = to_promise(&emitter);
    executor
        .spawn({
            let emitter = emitter.clone();
            async move {
                smol::Timer::after(Duration::from_millis(1)).await;
                emitter.fire("hello".into());
            }
        })
        .detach();
    let value = futures_executor::block_on(executor.run(future));
    assert_eq!(value, "hello");
    assert_eq!(emitter.size(), 0);
}

#[test]
fn promise_stays_pending_after_dispose() {
    let emitter = cursor::Emitter::<u32>::new();
    let future = to_promise(&emitter);
    emitter.dispose();
    assert!(future.now_or_never().is_none());
}

#[test]
fn dropping_the_promise_detaches_it() {
    let emitter = queue::Emitter::<u32>::new();
    let future = to_promise(&emitter);
    assert_eq!(emitter.size(), 1);
    drop(future);
    assert_eq!(emitter.size(), 0);
}

#[test]
fn abort_wins_the_race() {
    let executor = smol::LocalExecutor::new();
    let controller = Rc::new(AbortController::new());
    let emitter = cursor::Emitter::<u32>::new();
    let future = to_promise_with_signal(&emitter, controller.signal());
    assert_eq!(emitter.size(), 1);
    executor
        .spawn({
            let controller = controller.clone();
            async move {
                smol::Timer::after(Duration::from_millis(1)).await;
                controller.abort();
            }
        })
        .detach();
    let value = futures_executor::block_on(executor.run(future));
    assert_eq!(value, None);
    assert_eq!(emitter.size(), 0);
}

#[test]
fn abort_before_subscribing() {
    let controller = AbortController::new();
    controller.abort();
    let emitter = cursor::Emitter::<u32>::new();
    let future = to_promise_with_signal(&emitter, controller.signal());
    assert_eq!(emitter.size(), 0);
    assert_eq!(future.now_or_never(), Some(None));
}

#[test]
fn abort_after_subscribing() {
    let controller = AbortController::new();
    let emitter = queue::Emitter::<u32>::new();
    let future = to_promise_with_signal(&emitter, controller.signal());
    controller.abort();
    emitter.fire(1);
    assert_eq!(emitter.size(), 0);
    assert_eq!(future.now_or_never(), Some(None));
}

#[test]
fn event_wins_the_race() {
    let controller = AbortController::new();
    let emitter = cursor::Emitter::<u32>::new();
    let future = to_promise_with_signal(&emitter, controller.signal());
    emitter.fire(5);
    assert_eq!(emitter.size(), 0);
    controller.abort();
    assert_eq!(future.now_or_never(), Some(Some(5)));
}

#[test]
fn store_releases_across_emitters() {
    let store = DisposableStore::new();
    let numbers = cursor::Emitter::<u32>::new();
    let words = queue::Emitter::<String>::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    {
        let log = log.clone();
        subscribe_into(&numbers, &store, move |value: &u32| {
            log.borrow_mut().push(value.to_string())
        });
    }
    {
        let log = log.clone();
        subscribe_into(&words, &store, move |value: &String| log.borrow_mut().push(value.clone()));
    }
    store.add(once(&numbers, |_: &u32| ()));
    assert_eq!(store.len(), 3);

    numbers.fire(1);
    words.fire("one".into());
    store.dispose();
    numbers.fire(2);
    words.fire("two".into());

    assert_eq!(*log.borrow(), ["1", "one"]);
    assert_eq!(numbers.size(), 0);
    assert_eq!(words.size(), 0);
}
