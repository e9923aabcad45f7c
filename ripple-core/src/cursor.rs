//! Vector backed emitter with a shared dispatch cursor
//!
//! Listeners live in a dense vector. Detaching a listener leaves a tombstone
//! behind, and the vector is compacted once tombstones make up half of it.
//!
//! A dispatch is described by a single cursor per emitter: the value being
//! delivered, the next slot to visit, and the end of the snapshot. A nested
//! `fire` drains whatever is left of the outer dispatch through the same
//! cursor before installing its own, so when control returns to the outer
//! frame the cursor is already exhausted and its loop simply ends.
//!
//! Every registration carries a sequence number. A `fire` notes the next
//! number before it drains an outer dispatch, and only delivers to slots
//! older than that, so listeners registered while the outer dispatch is
//! being finished don't see the nested value.
//!
//! Zero and one listeners are stored without a vector at all.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};

use derive_where::derive_where;

use crate::{
    listener::{Listener, Registration},
    options::EmitterOptions,
    Emitter as _,
    Event,
    Subscription,
};

/// Compact the vector once no more than 1 in this many slots is live.
const COMPACTION_THRESHOLD: usize = 2;

/// A registration, and when it was added.
struct Entry<T> {
    seq:          u64,
    registration: Rc<Registration<T>>,
}

/// `None` is a tombstone.
type Slot<T> = Option<Entry<T>>;

enum Listeners<T> {
    Empty,
    Single(Entry<T>),
    Many(Vec<Slot<T>>),
}

impl<T> Listeners<T> {
    fn retire_all(&self) {
        match self {
            Self::Empty => (),
            Self::Single(entry) => {
                entry.registration.retire();
            },
            Self::Many(slots) => {
                for entry in slots.iter().flatten() {
                    entry.registration.retire();
                }
            },
        }
    }
}

enum Cursor<T> {
    Idle,
    Dispatching {
        value: Rc<T>,
        /// The next slot to visit.
        next:  usize,
        /// Slots from here on were added after this dispatch started.
        end:   usize,
    },
}

/// Who a value should be delivered to.
enum Target<T> {
    Nobody,
    Single(Rc<Registration<T>>),
    /// The first `end` slots of the vector.
    Many(usize),
}

struct State<T> {
    listeners: Listeners<T>,
    cursor:    Cursor<T>,
    /// Sequence number of the next registration.
    next_seq:  u64,
}

impl<T> State<T> {
    fn push(&mut self, registration: Rc<Registration<T>>) {
        let entry = Entry {
            seq: self.next_seq,
            registration,
        };
        self.next_seq += 1;
        self.listeners = match std::mem::replace(&mut self.listeners, Listeners::Empty) {
            Listeners::Empty => Listeners::Single(entry),
            Listeners::Single(existing) => {
                tracing::trace!("promoting to a listener vector");
                Listeners::Many(vec![Some(existing), Some(entry)])
            },
            Listeners::Many(mut slots) => {
                slots.push(Some(entry));
                Listeners::Many(slots)
            },
        };
    }

    /// Remove `registration`, `live` is the number of listeners left after
    /// the removal.
    fn remove(&mut self, registration: &Rc<Registration<T>>, live: usize) {
        if let Listeners::Many(slots) = &mut self.listeners {
            let position = slots.iter().position(|slot| {
                slot.as_ref()
                    .is_some_and(|entry| Rc::ptr_eq(&entry.registration, registration))
            });
            let Some(position) = position else { return };
            slots[position] = None;
            if live * COMPACTION_THRESHOLD <= slots.len() {
                compact(slots, &mut self.cursor);
            }
            self.settle();
        } else if matches!(&self.listeners, Listeners::Single(entry) if Rc::ptr_eq(&entry.registration, registration))
        {
            self.listeners = Listeners::Empty;
        }
    }

    /// Go back to the vector-less forms if there is at most one listener
    /// left and nothing is being dispatched.
    fn settle(&mut self) {
        if !matches!(self.cursor, Cursor::Idle) {
            return
        }
        let Listeners::Many(slots) = &mut self.listeners else {
            return
        };
        if slots.iter().flatten().nth(1).is_some() {
            return
        }
        tracing::trace!("demoting from a listener vector");
        self.listeners = match slots.iter_mut().find_map(Option::take) {
            Some(entry) => Listeners::Single(entry),
            None => Listeners::Empty,
        };
    }

    /// Listeners a value should reach, if it was fired when `boundary` was
    /// the next sequence number.
    fn target(&self, boundary: u64) -> Target<T> {
        match &self.listeners {
            Listeners::Empty => Target::Nobody,
            Listeners::Single(entry) if entry.seq < boundary =>
                Target::Single(entry.registration.clone()),
            Listeners::Single(_) => Target::Nobody,
            // Sequence numbers increase along the vector.
            Listeners::Many(slots) => Target::Many(
                slots
                    .iter()
                    .position(|slot| slot.as_ref().is_some_and(|entry| entry.seq >= boundary))
                    .unwrap_or(slots.len()),
            ),
        }
    }

    /// Take the next listener the current dispatch should visit.
    fn advance(&mut self) -> Option<(Rc<Registration<T>>, Rc<T>)> {
        let Cursor::Dispatching { value, next, end } = &mut self.cursor else {
            return None
        };
        let Listeners::Many(slots) = &self.listeners else {
            return None
        };
        while *next < *end {
            let slot = slots.get(*next).and_then(Option::as_ref);
            *next += 1;
            if let Some(entry) = slot {
                return Some((entry.registration.clone(), value.clone()))
            }
        }
        None
    }
}

/// Squeeze the tombstones out of `slots`, moving `cursor` so that it still
/// points at the same listeners.
fn compact<T>(slots: &mut Vec<Slot<T>>, cursor: &mut Cursor<T>) {
    let before = slots.len();
    let bounds = match cursor {
        Cursor::Idle => None,
        Cursor::Dispatching { next, end, .. } => Some((*next, *end)),
    };
    let (mut removed_before_next, mut removed_before_end) = (0, 0);
    let mut index = 0;
    slots.retain(|slot| {
        if let (None, Some((next, end))) = (slot, bounds) {
            if index < next {
                removed_before_next += 1;
            }
            if index < end {
                removed_before_end += 1;
            }
        }
        index += 1;
        slot.is_some()
    });
    if let Cursor::Dispatching { next, end, .. } = cursor {
        *next -= removed_before_next;
        *end -= removed_before_end;
    }
    tracing::debug!(before, after = slots.len(), "compacted listener vector");
}

struct Inner<T> {
    options:  EmitterOptions<T>,
    state:    RefCell<State<T>>,
    /// Number of live listeners, tombstones excluded.
    size:     Cell<usize>,
    disposed: Cell<bool>,
}

/// Puts the dispatch state back to idle when a listener panics.
struct ResetOnUnwind<'a, T>(&'a Inner<T>);

impl<T> Drop for ResetOnUnwind<'_, T> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return
        }
        if let Ok(mut state) = self.0.state.try_borrow_mut() {
            state.cursor = Cursor::Idle;
            state.settle();
        }
    }
}

/// An emitter using a vector of listeners and a dispatch cursor.
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
                state: RefCell::new(State {
                    listeners: Listeners::Empty,
                    cursor:    Cursor::Idle,
                    next_seq:  0,
                }),
                size: Cell::new(0),
                disposed: Cell::new(false),
            }),
        }
    }

    fn remove(&self, registration: &Rc<Registration<T>>) {
        let inner = &self.inner;
        if inner.disposed.get() || !registration.is_live() {
            return
        }
        inner.options.will_remove_listener(self);
        // The hook could have beaten us to it.
        if inner.disposed.get() || !registration.retire() {
            return
        }
        let live = inner.size.get() - 1;
        inner.size.set(live);
        inner.state.borrow_mut().remove(registration, live);
        if live == 0 {
            inner.options.did_remove_last_listener(self);
        }
    }

    fn drain(&self) {
        loop {
            let Some((registration, value)) = self.inner.state.borrow_mut().advance() else {
                break
            };
            self.inner.options.deliver(&registration.listener, &value);
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
        let registration = Rc::new(Registration::new(listener));
        inner.state.borrow_mut().push(registration.clone());
        inner.size.set(inner.size.get() + 1);
        if first {
            inner.options.did_add_first_listener(self);
        }
        inner.options.did_add_listener(self, &registration.listener);

        let emitter = Rc::downgrade(inner);
        let registration = Rc::downgrade(&registration);
        Subscription::new(move || {
            if let (Some(inner), Some(registration)) = (emitter.upgrade(), registration.upgrade()) {
                Emitter { inner }.remove(&registration)
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
        let (single, boundary) = {
            let state = inner.state.borrow();
            let single = match &state.listeners {
                Listeners::Empty => return,
                Listeners::Single(entry) => Some(entry.registration.clone()),
                Listeners::Many(_) => None,
            };
            (single, state.next_seq)
        };
        let _reset = ResetOnUnwind(inner);
        if let Some(registration) = single {
            inner.options.deliver(&registration.listener, &value);
            return
        }

        // If we are called from a listener, there is an outer dispatch that
        // hasn't finished. Finish it first so values arrive in order.
        self.drain();
        let target = inner.state.borrow().target(boundary);
        match target {
            Target::Nobody => (),
            Target::Single(registration) => inner.options.deliver(&registration.listener, &value),
            Target::Many(end) => {
                inner.state.borrow_mut().cursor = Cursor::Dispatching {
                    value: Rc::new(value),
                    next: 0,
                    end,
                };
                self.drain();
                let mut state = inner.state.borrow_mut();
                state.cursor = Cursor::Idle;
                state.settle();
            },
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
        let listeners = {
            let mut state = inner.state.borrow_mut();
            state.cursor = Cursor::Idle;
            std::mem::replace(&mut state.listeners, Listeners::Empty)
        };
        listeners.retire_all();
        drop(listeners);
        tracing::debug!(count, "emitter disposed");
        if count != 0 {
            inner.options.did_remove_last_listener(self);
        }
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("cursor::Emitter")
            .field("size", &self.inner.size.get())
            .field("disposed", &self.inner.disposed.get())
            .field("options", &self.inner.options)
            .finish()
    }
}
