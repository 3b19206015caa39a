//! Concurrent resolution tests.
//!
//! Many threads race on first requests; singletons, closed generics and
//! context caches must still build exactly once per key.

use crossbeam_utils::thread;
use structuremap::{ClosedGeneric, ContextKey, Describe, Pluggable, PluginType, Registry, Resolver};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

const THREADS: usize = 16;

#[test]
fn test_singleton_is_built_once_under_contention() {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();

    struct Expensive {
        id: usize,
    }

    let mut registry = Registry::new();
    registry.for_type::<Expensive>().singleton().use_factory(move |_| {
        std::thread::sleep(Duration::from_millis(20));
        Ok(Arc::new(Expensive {
            id: counter.fetch_add(1, Ordering::SeqCst),
        }))
    });
    let container = registry.build();
    let barrier = Barrier::new(THREADS);

    let ids: Vec<usize> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|_| {
                    barrier.wait();
                    container.get_instance::<Expensive>().unwrap().id
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
    .unwrap();

    assert_eq!(built.load(Ordering::SeqCst), 1);
    assert!(ids.iter().all(|id| *id == 0));
}

trait Queue<T>: Send + Sync {}

impl<T: 'static> ClosedGeneric for dyn Queue<T> {
    fn template() -> &'static str {
        "Queue"
    }

    fn type_arguments() -> Vec<PluginType> {
        vec![PluginType::of::<T>()]
    }
}

struct InMemoryQueue<T>(PhantomData<fn() -> T>);

impl<T: 'static> Queue<T> for InMemoryQueue<T> {}

impl<T: 'static> Pluggable for InMemoryQueue<T> {
    fn describe(d: &mut Describe<Self>) {
        d.constructor(|_| Ok(InMemoryQueue(PhantomData)));
    }
}

structuremap::plugs!(InMemoryQueue<String> => dyn Queue<String>);

#[test]
fn test_racing_generic_closings_share_one_family() {
    let mut registry = Registry::new();
    registry
        .for_generic("Queue")
        .singleton()
        .close_for::<dyn Queue<String>, InMemoryQueue<String>>();
    let container = registry.build();
    let barrier = Barrier::new(THREADS);

    let queues: Vec<Arc<dyn Queue<String>>> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|_| {
                    barrier.wait();
                    container.get_closed::<dyn Queue<String>>().unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
    .unwrap();

    assert!(queues.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert_eq!(container.model().families.len(), 1);
}

struct RequestState {
    _n: u8,
}

impl Pluggable for RequestState {
    fn describe(d: &mut Describe<Self>) {
        d.constructor(|_| Ok(RequestState { _n: 0 }));
    }
}

#[test]
fn test_each_thread_sees_its_own_context() {
    let mut registry = Registry::new();
    registry.for_type::<RequestState>().context_scoped().use_type::<RequestState>();
    let container = registry.build();
    let barrier = Barrier::new(THREADS);

    let states: Vec<Arc<RequestState>> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|_| {
                    let request = container.with_context(ContextKey::new());
                    barrier.wait();
                    let a = request.get_instance::<RequestState>().unwrap();
                    let b = request.get_instance::<RequestState>().unwrap();
                    assert!(Arc::ptr_eq(&a, &b));
                    a
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
    .unwrap();

    for (i, state) in states.iter().enumerate() {
        for other in &states[i + 1..] {
            assert!(!Arc::ptr_eq(state, other));
        }
    }
}

#[test]
fn test_nested_containers_across_threads() {
    let mut registry = Registry::new();
    registry.for_type::<RequestState>().use_type::<RequestState>();
    let container = registry.build();

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|_| {
                let nested = container.get_nested_container();
                let a = nested.get_instance::<RequestState>().unwrap();
                let b = nested.get_instance::<RequestState>().unwrap();
                assert!(Arc::ptr_eq(&a, &b));
            });
        }
    })
    .unwrap();
}
