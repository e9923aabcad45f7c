//! Linked list backed emitter with a delivery queue
//!
//! Listeners live in a [`VecList`], so detaching one never renumbers the
//! others. `fire` pushes one (listener, value) pair per listener onto a FIFO
//! queue owned by the emitter, then drains that queue. A nested `fire` pushes
//! its pairs behind whatever the outer dispatch still has queued, and drains
//! until the queue is empty. When the outer drain loop resumes, there is
//! nothing left for it to do.
//!
//! Pairs whose listener was detached after they were queued are skipped. A
//! lone listener is stored without a list, and is invoked directly when
//! nothing is queued.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};

use derive_where::derive_where;
use dlv_list::{Index, VecList};

use crate::{
    listener::{Listener, Registration},
    options::EmitterOptions,
    Emitter as _,
    Event,
    Subscription,
};

struct Node<T> {
    registration: Registration<T>,
    /// Position in the listener list, `None` while in the single slot.
    index:        Cell<Option<Index<Rc<Node<T>>>>>,
}

enum Listeners<T> {
    Empty,
    Single(Rc<Node<T>>),
    Many(VecList<Rc<Node<T>>>),
}

impl<T> Listeners<T> {
    fn push(&mut self, node: Rc<Node<T>>) {
        *self = match std::mem::replace(self, Self::Empty) {
            Self::Empty => Self::Single(node),
            Self::Single(existing) => {
                tracing::trace!("promoting to a listener list");
                let mut nodes = VecList::new();
                existing.index.set(Some(nodes.push_back(existing.clone())));
                node.index.set(Some(nodes.push_back(node.clone())));
                Self::Many(nodes)
            },
            Self::Many(mut nodes) => {
                node.index.set(Some(nodes.push_back(node.clone())));
                Self::Many(nodes)
            },
        };
    }

    fn remove(&mut self, node: &Rc<Node<T>>) {
        if let Self::Many(nodes) = self {
            if let Some(index) = node.index.take() {
                nodes.remove(index);
            }
        } else if matches!(&*self, Self::Single(existing) if Rc::ptr_eq(existing, node)) {
            *self = Self::Empty;
        }
    }

    /// Go back to the list-less forms once at most one listener is left.
    fn settle(&mut self) {
        let Self::Many(nodes) = self else { return };
        if nodes.len() > 1 {
            return
        }
        tracing::trace!("demoting from a listener list");
        *self = match nodes.pop_front() {
            Some(node) => {
                node.index.set(None);
                Self::Single(node)
            },
            None => Self::Empty,
        };
    }

    fn retire_all(&self) {
        match self {
            Self::Empty => (),
            Self::Single(node) => {
                node.registration.retire();
            },
            Self::Many(nodes) =>
                for node in nodes.iter() {
                    node.registration.retire();
                },
        }
    }
}

/// A value waiting to be handed to a listener.
struct Delivery<T> {
    node:  Rc<Node<T>>,
    value: Rc<T>,
}

struct Inner<T> {
    options:   EmitterOptions<T>,
    listeners: RefCell<Listeners<T>>,
    queue:     RefCell<VecList<Delivery<T>>>,
    size:      Cell<usize>,
    disposed:  Cell<bool>,
}

impl<T> Inner<T> {
    /// Whether no dispatch is in progress, or the one in progress has
    /// nothing left to deliver.
    fn is_idle(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}

/// Throws away queued deliveries when a listener panics.
struct ResetOnUnwind<'a, T>(&'a Inner<T>);

impl<T> Drop for ResetOnUnwind<'_, T> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return
        }
        if let Ok(mut queue) = self.0.queue.try_borrow_mut() {
            queue.clear();
        }
        if let Ok(mut listeners) = self.0.listeners.try_borrow_mut() {
            listeners.settle();
        }
    }
}

/// An emitter using a linked list of listeners and a delivery queue.
///
/// This is a handle, clones refer to the same emitter.
#[derive_where(Clone)]
pub struct Emitter<T> {
    inner: Rc<Inner<T>>,
}

impl<T: 'static> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Emitter<T> {
    pub fn new() -> Self {
        Self::with_options(EmitterOptions::default())
    }

    pub fn with_options(options: EmitterOptions<T>) -> Self {
        Self {
            inner: Rc::new(Inner {
                options,
                listeners: RefCell::new(Listeners::Empty),
                queue: RefCell::new(VecList::new()),
                size: Cell::new(0),
                disposed: Cell::new(false),
            }),
        }
    }

    fn remove(&self, node: &Rc<Node<T>>) {
        let inner = &self.inner;
        if inner.disposed.get() || !node.registration.is_live() {
            return
        }
        inner.options.will_remove_listener(self);
        if inner.disposed.get() || !node.registration.retire() {
            return
        }
        let live = inner.size.get() - 1;
        inner.size.set(live);
        {
            let mut listeners = inner.listeners.borrow_mut();
            listeners.remove(node);
            if inner.is_idle() {
                listeners.settle();
            }
        }
        if live == 0 {
            inner.options.did_remove_last_listener(self);
        }
    }

    fn drain(&self) {
        loop {
            let Some(delivery) = self.inner.queue.borrow_mut().pop_front() else {
                break
            };
            let Delivery { node, value } = delivery;
            if node.registration.is_live() {
                self.inner
                    .options
                    .deliver(&node.registration.listener, &value);
            }
        }
    }
}

impl<T: 'static> Event<T> for Emitter<T> {
    fn subscribe_listener(&self, listener: Listener<T>) -> Subscription {
        let inner = &self.inner;
        if inner.disposed.get() {
            tracing::debug!("ignoring a new listener on a disposed emitter");
            return Subscription::disposed()
        }
        let first = inner.size.get() == 0;
        if first {
            inner.options.will_add_first_listener(self);
            if inner.disposed.get() {
                return Subscription::disposed()
            }
        }
        let node = Rc::new(Node {
            registration: Registration::new(listener),
            index:        Cell::new(None),
        });
        inner.listeners.borrow_mut().push(node.clone());
        inner.size.set(inner.size.get() + 1);
        if first {
            inner.options.did_add_first_listener(self);
        }
        inner
            .options
            .did_add_listener(self, &node.registration.listener);

        let emitter = Rc::downgrade(inner);
        let node = Rc::downgrade(&node);
        Subscription::new(move || {
            if let (Some(inner), Some(node)) = (emitter.upgrade(), node.upgrade()) {
                Emitter { inner }.remove(&node)
            }
        })
    }
}

impl<T: 'static> crate::Emitter<T> for Emitter<T> {
    fn fire(&self, value: T) {
        let inner = &self.inner;
        if inner.disposed.get() {
            return
        }
        let direct = match &*inner.listeners.borrow() {
            Listeners::Empty => return,
            Listeners::Single(node) if inner.is_idle() => Some(node.clone()),
            Listeners::Single(_) | Listeners::Many(_) => None,
        };
        let _reset = ResetOnUnwind(inner);
        if let Some(node) = direct {
            inner.options.deliver(&node.registration.listener, &value);
            return
        }

        let value = Rc::new(value);
        {
            let listeners = inner.listeners.borrow();
            let mut queue = inner.queue.borrow_mut();
            let mut enqueue = |node: &Rc<Node<T>>| {
                queue.push_back(Delivery {
                    node:  node.clone(),
                    value: value.clone(),
                });
            };
            match &*listeners {
                Listeners::Empty => (),
                Listeners::Single(node) => enqueue(node),
                Listeners::Many(nodes) => nodes.iter().for_each(enqueue),
            }
        }
        self.drain();
        if inner.is_idle() {
            inner.listeners.borrow_mut().settle();
        }
    }

    fn size(&self) -> usize {
        self.inner.size.get()
    }

    fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    fn dispose(&self) {
        let inner = &self.inner;
        if inner.disposed.replace(true) {
            return
        }
        let count = inner.size.replace(0);
        let listeners = std::mem::replace(&mut *inner.listeners.borrow_mut(), Listeners::Empty);
        let queue = std::mem::replace(&mut *inner.queue.borrow_mut(), VecList::new());
        listeners.retire_all();
        drop((listeners, queue));
        tracing::debug!(count, "emitter disposed");
        if count != 0 {
            inner.options.did_remove_last_listener(self);
        }
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("queue::Emitter")
            .field("size", &self.inner.size.get())
            .field("queued", &self.inner.queue.borrow().len())
            .field("disposed", &self.inner.disposed.get())
            .field("options", &self.inner.options)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::{
        cell::{Cell, RefCell},
        panic::{catch_unwind, AssertUnwindSafe},
        rc::Rc,
    };

    use super::{Emitter, Listeners};
    use crate::{Emitter as _, Event};

    #[derive(Debug, PartialEq, Eq)]
    enum Shape {
        Empty,
        Single,
        Many(usize),
    }

    fn shape<T>(emitter: &Emitter<T>) -> Shape {
        match &*emitter.inner.listeners.borrow() {
            Listeners::Empty => Shape::Empty,
            Listeners::Single(_) => Shape::Single,
            Listeners::Many(nodes) => Shape::Many(nodes.len()),
        }
    }

    fn queued<T>(emitter: &Emitter<T>) -> usize {
        emitter.inner.queue.borrow().len()
    }

    #[test]
    fn promotes_and_demotes() {
        let emitter = Emitter::<u32>::new();
        let a = emitter.subscribe(|_| ());
        assert_eq!(shape(&emitter), Shape::Single);
        let b = emitter.subscribe(|_| ());
        let c = emitter.subscribe(|_| ());
        assert_eq!(shape(&emitter), Shape::Many(3));
        b.dispose();
        assert_eq!(shape(&emitter), Shape::Many(2));
        c.dispose();
        assert_eq!(shape(&emitter), Shape::Single);
        a.dispose();
        assert_eq!(shape(&emitter), Shape::Empty);
    }

    #[test]
    fn single_listener_skips_the_queue() {
        let emitter = Emitter::<u32>::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        {
            let emitter = emitter.clone();
            let seen = seen.clone();
            emitter
                .clone()
                .subscribe(move |value| seen.borrow_mut().push((*value, queued(&emitter))));
        }
        emitter.fire(1);
        emitter.fire(2);
        assert_eq!(*seen.borrow(), vec![(1, 0), (2, 0)]);
    }

    #[test]
    fn nested_fire_empties_the_queue() {
        let emitter = Emitter::<u32>::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        {
            let emitter = emitter.clone();
            let seen = seen.clone();
            emitter.clone().subscribe(move |value| {
                if *value == 1 {
                    seen.borrow_mut().push(queued(&emitter));
                    emitter.fire(2);
                    seen.borrow_mut().push(queued(&emitter));
                }
            });
        }
        emitter.subscribe(|_| ());
        emitter.subscribe(|_| ());
        emitter.fire(1);
        // Two pairs pending before the nested fire, none after it.
        assert_eq!(*seen.borrow(), vec![2, 0]);
    }

    #[test]
    fn detached_pairs_are_skipped() {
        let emitter = Emitter::<u32>::new();
        let hits = Rc::new(Cell::new(0));
        let victim = Rc::new(RefCell::new(None::<crate::Subscription>));
        {
            let victim = victim.clone();
            emitter.subscribe(move |_| {
                if let Some(victim) = victim.borrow_mut().take() {
                    victim.dispose();
                }
            });
        }
        {
            let hits = hits.clone();
            *victim.borrow_mut() = Some(emitter.subscribe(move |_| hits.set(hits.get() + 1)));
        }
        emitter.fire(1);
        emitter.fire(2);
        assert_eq!(hits.get(), 0);
        assert_eq!(queued(&emitter), 0);
        assert_eq!(shape(&emitter), Shape::Single);
    }

    #[test]
    fn panics_discard_the_queue() {
        let emitter = Emitter::<u32>::new();
        let hits = Rc::new(Cell::new(0));
        emitter.subscribe(|value| {
            if *value == 1 {
                panic!("boom")
            }
        });
        {
            let hits = hits.clone();
            emitter.subscribe(move |_| hits.set(hits.get() + 1));
        }
        assert!(catch_unwind(AssertUnwindSafe(|| emitter.fire(1))).is_err());
        assert_eq!(queued(&emitter), 0);
        emitter.fire(2);
        assert_eq!(hits.get(), 1);
    }
}
