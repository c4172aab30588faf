//! Containers whose every operation is its own spinlock critical section.
//!
//! Each call acquires the wrapper's [`Spinlock`], performs one operation on
//! the plain container and releases the lock before returning. A single
//! operation is therefore atomic with respect to every other operation on the
//! same wrapper, but a sequence of them is not: "check `is_empty`, then
//! `pop_front`" may race with another thread. Callers that need a compound
//! step run it inside [`Spinlocked::with_mut`].
//!
//! Element access hands out clones instead of references, since a reference
//! cannot outlive the critical section that produced it.

use std::{
    borrow::Borrow,
    collections::{HashMap, HashSet, LinkedList, VecDeque},
    fmt::{self, Debug, Formatter},
    hash::{BuildHasher, Hash},
    mem::replace,
};

use crate::spinlock::Spinlock;

pub type SpinlockedDeque<T> = Spinlocked<VecDeque<T>>;
pub type SpinlockedList<T> = Spinlocked<LinkedList<T>>;
pub type SpinlockedSet<T> = Spinlocked<HashSet<T>>;
pub type SpinlockedMap<K, V> = Spinlocked<HashMap<K, V>>;
pub type SpinlockedVec<T> = Spinlocked<Vec<T>>;

/// Size queries shared by every wrapped container shape.
pub trait Container {
    fn len(&self) -> usize;
    fn clear(&mut self);
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Container for VecDeque<T> {
    fn len(&self) -> usize {
        VecDeque::len(self)
    }
    fn clear(&mut self) {
        VecDeque::clear(self)
    }
}

impl<T> Container for LinkedList<T> {
    fn len(&self) -> usize {
        LinkedList::len(self)
    }
    fn clear(&mut self) {
        LinkedList::clear(self)
    }
}

impl<T, S> Container for HashSet<T, S> {
    fn len(&self) -> usize {
        HashSet::len(self)
    }
    fn clear(&mut self) {
        HashSet::clear(self)
    }
}

impl<K, V, S> Container for HashMap<K, V, S> {
    fn len(&self) -> usize {
        HashMap::len(self)
    }
    fn clear(&mut self) {
        HashMap::clear(self)
    }
}

impl<T> Container for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }
    fn clear(&mut self) {
        Vec::clear(self)
    }
}

pub struct Spinlocked<C> {
    inner: Spinlock<C>,
}

impl<C> Spinlocked<C> {
    pub fn new(container: C) -> Self {
        Self {
            inner: Spinlock::new(container),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&C) -> R) -> R {
        f(&*self.inner.lock())
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        f(&mut *self.inner.lock())
    }

    /// Replace the whole container, returning the previous content.
    pub fn assign(&self, container: C) -> C {
        replace(&mut *self.inner.lock(), container)
    }

    pub fn into_inner(self) -> C {
        self.inner.into_inner()
    }
}

impl<C: Clone> Spinlocked<C> {
    /// Plain copy of the container as of one instant.
    pub fn snapshot(&self) -> C {
        self.inner.lock().clone()
    }
}

impl<C: Container> Spinlocked<C> {
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn clear(&self) {
        self.inner.lock().clear()
    }
}

impl<C: Default> Default for Spinlocked<C> {
    fn default() -> Self {
        Self::new(C::default())
    }
}

impl<C: Clone> Clone for Spinlocked<C> {
    fn clone(&self) -> Self {
        Self::new(self.snapshot())
    }
}

impl<C> From<C> for Spinlocked<C> {
    fn from(container: C) -> Self {
        Self::new(container)
    }
}

impl<C: Debug> Debug for Spinlocked<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.with(|container| f.debug_tuple("Spinlocked").field(container).finish())
    }
}

impl<T> Spinlocked<VecDeque<T>> {
    pub fn push_front(&self, value: T) {
        self.inner.lock().push_front(value)
    }

    pub fn push_back(&self, value: T) {
        self.inner.lock().push_back(value)
    }

    pub fn pop_front(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }

    pub fn pop_back(&self) -> Option<T> {
        self.inner.lock().pop_back()
    }

    pub fn for_each(&self, f: impl FnMut(&T)) {
        self.inner.lock().iter().for_each(f)
    }
}

impl<T: Clone> Spinlocked<VecDeque<T>> {
    pub fn front(&self) -> Option<T> {
        self.inner.lock().front().cloned()
    }

    pub fn back(&self) -> Option<T> {
        self.inner.lock().back().cloned()
    }
}

impl<T> Spinlocked<LinkedList<T>> {
    pub fn push_front(&self, value: T) {
        self.inner.lock().push_front(value)
    }

    pub fn push_back(&self, value: T) {
        self.inner.lock().push_back(value)
    }

    pub fn pop_front(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }

    pub fn pop_back(&self) -> Option<T> {
        self.inner.lock().pop_back()
    }

    pub fn contains(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        self.inner.lock().contains(value)
    }

    pub fn for_each(&self, f: impl FnMut(&T)) {
        self.inner.lock().iter().for_each(f)
    }
}

impl<T: Clone> Spinlocked<LinkedList<T>> {
    pub fn front(&self) -> Option<T> {
        self.inner.lock().front().cloned()
    }

    pub fn back(&self) -> Option<T> {
        self.inner.lock().back().cloned()
    }
}

impl<T> Spinlocked<Vec<T>> {
    pub fn push(&self, value: T) {
        self.inner.lock().push(value)
    }

    pub fn pop(&self) -> Option<T> {
        self.inner.lock().pop()
    }

    /// Store `value` at `index`, returning false when out of bounds.
    pub fn set(&self, index: usize, value: T) -> bool {
        match self.inner.lock().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Insert before `index`, returning false when `index > len`.
    pub fn insert(&self, index: usize, value: T) -> bool {
        let mut vec = self.inner.lock();
        if index > vec.len() {
            return false;
        }
        vec.insert(index, value);
        true
    }

    pub fn remove(&self, index: usize) -> Option<T> {
        let mut vec = self.inner.lock();
        if index < vec.len() {
            Some(vec.remove(index))
        } else {
            None
        }
    }

    pub fn contains(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        self.inner.lock().contains(value)
    }

    pub fn for_each(&self, f: impl FnMut(&T)) {
        self.inner.lock().iter().for_each(f)
    }
}

impl<T: Clone> Spinlocked<Vec<T>> {
    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.lock().get(index).cloned()
    }

    pub fn front(&self) -> Option<T> {
        self.inner.lock().first().cloned()
    }

    pub fn back(&self) -> Option<T> {
        self.inner.lock().last().cloned()
    }
}

impl<T: Eq + Hash, S: BuildHasher> Spinlocked<HashSet<T, S>> {
    pub fn insert(&self, value: T) -> bool {
        self.inner.lock().insert(value)
    }

    pub fn remove<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().remove(value)
    }

    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().contains(value)
    }

    pub fn for_each(&self, f: impl FnMut(&T)) {
        self.inner.lock().iter().for_each(f)
    }
}

impl<K: Eq + Hash, V, S: BuildHasher> Spinlocked<HashMap<K, V, S>> {
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.inner.lock().insert(key, value)
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().remove(key)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().contains_key(key)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.inner.lock().get(key).cloned()
    }

    /// Indexed access: the element for `key`, default-inserted when absent.
    pub fn get_or_default(&self, key: K) -> V
    where
        V: Default + Clone,
    {
        self.inner.lock().entry(key).or_default().clone()
    }

    /// Indexed access with in-place mutation of the (possibly new) element.
    pub fn with_entry_or_default<R>(&self, key: K, f: impl FnOnce(&mut V) -> R) -> R
    where
        V: Default,
    {
        f(self.inner.lock().entry(key).or_default())
    }

    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.inner.lock().keys().cloned().collect()
    }

    pub fn retain(&self, f: impl FnMut(&K, &mut V) -> bool) {
        self.inner.lock().retain(f)
    }

    pub fn for_each(&self, mut f: impl FnMut(&K, &V)) {
        self.inner
            .lock()
            .iter()
            .for_each(|(key, value)| f(key, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn deque_operations() {
        let deque = SpinlockedDeque::default();
        assert!(deque.is_empty());
        deque.push_back(2);
        deque.push_front(1);
        deque.push_back(3);
        assert_eq!(deque.len(), 3);
        assert_eq!(deque.front(), Some(1));
        assert_eq!(deque.back(), Some(3));
        assert_eq!(deque.pop_front(), Some(1));
        assert_eq!(deque.pop_back(), Some(3));
        assert_eq!(deque.snapshot(), VecDeque::from(vec![2]));
        deque.clear();
        assert_eq!(deque.pop_front(), None);
    }

    #[test]
    fn list_operations() {
        let list = SpinlockedList::default();
        list.push_back("b");
        list.push_front("a");
        assert!(list.contains(&"a"));
        assert_eq!(list.front(), Some("a"));
        assert_eq!(list.back(), Some("b"));
        let mut visited = Vec::new();
        list.for_each(|value| visited.push(*value));
        assert_eq!(visited, ["a", "b"]);
        assert_eq!(list.pop_back(), Some("b"));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn vec_index_access() {
        let vec = SpinlockedVec::from(vec![10, 20, 30]);
        assert_eq!(vec.get(1), Some(20));
        assert_eq!(vec.get(3), None);
        assert!(vec.set(1, 21));
        assert!(!vec.set(3, 40));
        assert!(vec.insert(3, 40));
        assert!(!vec.insert(5, 50));
        assert_eq!(vec.remove(0), Some(10));
        assert_eq!(vec.remove(10), None);
        assert_eq!(vec.snapshot(), vec![21, 30, 40]);
        assert_eq!(vec.front(), Some(21));
        assert_eq!(vec.back(), Some(40));
        assert_eq!(vec.pop(), Some(40));
    }

    #[test]
    fn map_index_inserts_default() {
        let map: SpinlockedMap<String, u32> = SpinlockedMap::default();
        assert_eq!(map.get("missing"), None);
        assert_eq!(map.get_or_default("missing".to_string()), 0);
        assert!(map.contains_key("missing"));
        map.with_entry_or_default("counter".to_string(), |value| *value += 5);
        map.with_entry_or_default("counter".to_string(), |value| *value += 5);
        assert_eq!(map.get("counter"), Some(10));
        assert_eq!(map.remove("counter"), Some(10));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn assign_replaces_whole_container() {
        let set = SpinlockedSet::from(HashSet::from([1, 2]));
        let old = set.assign(HashSet::from([3]));
        assert_eq!(old, HashSet::from([1, 2]));
        assert!(set.contains(&3));
        assert!(!set.contains(&1));
        let copy = set.clone();
        assert!(copy.remove(&3));
        assert!(set.contains(&3));
    }

    #[test]
    fn concurrent_push_loses_nothing() {
        let deque = Arc::new(SpinlockedDeque::default());
        crossbeam::thread::scope(|scope| {
            for thread in 0..8 {
                let deque = deque.clone();
                scope.spawn(move |_| {
                    for i in 0..1000 {
                        deque.push_back(thread * 1000 + i);
                    }
                });
            }
        })
        .unwrap();
        let mut values: Vec<_> = deque.snapshot().into_iter().collect();
        values.sort_unstable();
        assert_eq!(values, (0..8000).collect::<Vec<_>>());
    }

    #[test]
    fn concurrent_set_insert_has_single_winner() {
        let set = SpinlockedSet::default();
        let winners = SpinlockedVec::default();
        crossbeam::thread::scope(|scope| {
            for thread in 0..8 {
                let set = &set;
                let winners = &winners;
                scope.spawn(move |_| {
                    for value in 0..500 {
                        if set.insert(value) {
                            winners.push((value, thread));
                        }
                    }
                });
            }
        })
        .unwrap();
        assert_eq!(set.len(), 500);
        assert_eq!(winners.len(), 500);
    }
}
