//! Intrusive doubly linked list backed by a container implementing
//! `core::ops::Index`.
//!
//! Elements embed their own [`Link`] (see [`Linked`]) and are named by an
//! index into a caller-owned pool, so "get the owning record from a node" is
//! a pool lookup rather than pointer arithmetic. The list is circular: the
//! head only remembers the first element, and `first.prev` is the last one.
use core::{fmt, ops};


/// Circular linked list header.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct ListHead<Index> {
    pub first: Option<Index>,
}

impl<Index> Default for ListHead<Index> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Index: fmt::Debug> fmt::Debug for ListHead<Index> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ListHead({:?})", &self.first)
    }
}

impl<Index> ListHead<Index> {
    pub const fn new() -> Self {
        Self { first: None }
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_none()
    }
}

/// Links to neighbor items.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Link<Index> {
    pub prev: Index,
    pub next: Index,
}

/// An element that embeds its own list node.
///
/// `None` means the element is not linked into any list.
pub trait Linked<Index> {
    fn link(&self) -> &Option<Link<Index>>;
    fn link_mut(&mut self) -> &mut Option<Link<Index>>;
}

impl<Index, T> Linked<Index> for (T, Option<Link<Index>>) {
    fn link(&self) -> &Option<Link<Index>> {
        &self.1
    }
    fn link_mut(&mut self) -> &mut Option<Link<Index>> {
        &mut self.1
    }
}

/// An error type indicating inconsistency in a linked list structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InconsistentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertError {
    AlreadyLinked,
    Inconsistent(InconsistentError),
}

impl From<InconsistentError> for InsertError {
    #[inline(always)]
    fn from(x: InconsistentError) -> Self {
        Self::Inconsistent(x)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemError {
    NotLinked,
    Inconsistent(InconsistentError),
}

impl From<InconsistentError> for ItemError {
    #[inline(always)]
    fn from(x: InconsistentError) -> Self {
        Self::Inconsistent(x)
    }
}

/// Accessor to a linked list whose head and elements are borrowed mutably.
///
/// Accessors are cheap to create; the usual pattern is to create one per
/// operation so that the pool can be borrowed for other purposes in between.
#[derive(Debug)]
pub struct ListAccessor<'a, Pool: ?Sized, Index> {
    head: &'a mut ListHead<Index>,
    pool: &'a mut Pool,
}

impl<'a, Pool, Index, Element> ListAccessor<'a, Pool, Index>
where
    Pool: ops::IndexMut<Index, Output = Element> + ?Sized,
    Element: Linked<Index>,
    Index: PartialEq + Clone,
{
    pub fn new(head: &'a mut ListHead<Index>, pool: &'a mut Pool) -> Self {
        Self { head, pool }
    }

    pub fn head(&self) -> &ListHead<Index> {
        &*self.head
    }

    pub fn pool(&self) -> &Pool {
        &*self.pool
    }

    pub fn pool_mut(&mut self) -> &mut Pool {
        &mut *self.pool
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_empty()
    }

    /// Get the link of `item`, failing if it's not linked.
    #[inline]
    fn link_of(&self, item: Index) -> Result<Link<Index>, ItemError> {
        self.pool[item].link().clone().ok_or(ItemError::NotLinked)
    }

    /// Get the link of `item`, which must be linked because a neighbor or the
    /// head refers to it.
    #[inline]
    fn expect_link_of(&self, item: Index) -> Result<Link<Index>, InconsistentError> {
        self.pool[item].link().clone().ok_or(InconsistentError)
    }

    #[inline]
    fn set_prev(&mut self, item: Index, prev: Index) -> Result<(), InconsistentError> {
        match self.pool[item].link_mut() {
            Some(l) => {
                l.prev = prev;
                Ok(())
            }
            None => Err(InconsistentError),
        }
    }

    #[inline]
    fn set_next(&mut self, item: Index, next: Index) -> Result<(), InconsistentError> {
        match self.pool[item].link_mut() {
            Some(l) => {
                l.next = next;
                Ok(())
            }
            None => Err(InconsistentError),
        }
    }

    #[inline]
    pub fn front(&self) -> Option<Index> {
        self.head.first.clone()
    }

    #[inline]
    pub fn back(&self) -> Result<Option<Index>, InconsistentError> {
        match self.head.first.clone() {
            Some(p) => Ok(Some(self.expect_link_of(p)?.prev)),
            None => Ok(None),
        }
    }

    #[inline]
    pub fn front_data(&self) -> Option<&Element> {
        self.front().map(|p| &self.pool[p])
    }

    #[inline]
    pub fn back_data(&self) -> Result<Option<&Element>, InconsistentError> {
        Ok(self.back()?.map(|p| &self.pool[p]))
    }

    /// Insert `item` before the position `p` (if `at` is `Some(p)`) or to the
    /// the list's back (if `at` is `None`).
    pub fn insert(&mut self, item: Index, at: Option<Index>) -> Result<(), InsertError> {
        if self.pool[item.clone()].link().is_some() {
            return Err(InsertError::AlreadyLinked);
        }

        if let Some(first) = self.head.first.clone() {
            let (next, update_first) = if let Some(at) = at {
                let update_first = at == first;
                (at, update_first)
            } else {
                (first, false)
            };

            let prev = self.expect_link_of(next.clone())?.prev;

            // prev.next = item
            self.set_next(prev.clone(), item.clone())?;

            // next.prev = item
            self.set_prev(next.clone(), item.clone())?;

            // item.prev = prev
            // item.next = next
            *self.pool[item.clone()].link_mut() = Some(Link { prev, next });

            if update_first {
                self.head.first = Some(item);
            }
        } else {
            if at.is_some() {
                // `at` can't be an element of an empty list
                return Err(InconsistentError.into());
            }

            *self.pool[item.clone()].link_mut() = Some(Link {
                prev: item.clone(),
                next: item.clone(),
            });

            self.head.first = Some(item);
        }

        Ok(())
    }

    #[inline]
    pub fn push_back(&mut self, item: Index) -> Result<(), InsertError> {
        self.insert(item, None)
    }

    #[inline]
    pub fn push_front(&mut self, item: Index) -> Result<(), InsertError> {
        let at = self.front();
        self.insert(item, at)
    }

    /// Insert `item` before the first element `e` for which `lt(item, e)`
    /// holds, or to the list's back if there is no such element.
    ///
    /// If the list is sorted with respect to `lt`, it stays sorted, and
    /// `item` is placed after any elements that compare equal to it.
    pub fn push_sorted_or_back(
        &mut self,
        item: Index,
        mut lt: impl FnMut(&Element, &Element) -> bool,
    ) -> Result<(), InsertError> {
        if self.pool[item.clone()].link().is_some() {
            return Err(InsertError::AlreadyLinked);
        }

        let mut at = None;
        let mut cursor = self.front();
        while let Some(p) = cursor {
            if lt(&self.pool[item.clone()], &self.pool[p.clone()]) {
                at = Some(p);
                break;
            }
            cursor = self.next(p).map_err(|_| InconsistentError)?;
        }

        self.insert(item, at)
    }

    /// Remove `item` from the list. Returns `item`.
    pub fn remove(&mut self, item: Index) -> Result<Index, ItemError> {
        let link = self.link_of(item.clone())?;

        if self.head.first.as_ref() == Some(&item) {
            if link.next == item {
                // The list just became empty
                self.head.first = None;
                *self.pool[item.clone()].link_mut() = None;
                return Ok(item);
            }

            // Move the head pointer
            self.head.first = Some(link.next.clone());
        }

        // link.prev.next = link.next
        self.set_next(link.prev.clone(), link.next.clone())?;

        // link.next.prev = link.prev
        self.set_prev(link.next.clone(), link.prev.clone())?;

        // item.prev = null
        // item.next = null
        *self.pool[item.clone()].link_mut() = None;

        Ok(item)
    }

    #[inline]
    pub fn pop_back(&mut self) -> Result<Option<Index>, InconsistentError> {
        self.back()?
            .map(|item| {
                // `ItemError::NotLinked` would be unexpected here, so convert
                // it to `InconsistentError`
                self.remove(item).map_err(|_| InconsistentError)
            })
            .transpose()
    }

    #[inline]
    pub fn pop_front(&mut self) -> Result<Option<Index>, InconsistentError> {
        self.front()
            .map(|item| self.remove(item).map_err(|_| InconsistentError))
            .transpose()
    }

    /// Get the next element of the specified element.
    #[inline]
    pub fn next(&self, i: Index) -> Result<Option<Index>, ItemError> {
        let next = self.link_of(i)?.next;
        Ok(if Some(&next) == self.head.first.as_ref() {
            None
        } else {
            Some(next)
        })
    }

    /// Get the previous element of the specified element.
    #[inline]
    pub fn prev(&self, i: Index) -> Result<Option<Index>, ItemError> {
        Ok(if Some(&i) == self.head.first.as_ref() {
            None
        } else {
            Some(self.link_of(i)?.prev)
        })
    }

    pub fn iter(&self) -> Iter<'_, Pool, Index> {
        Iter {
            next: self.head.first.clone(),
            first: self.head.first.clone(),
            pool: &*self.pool,
        }
    }
}

/// An iterator over the elements of a list.
///
/// Yields `Err(InconsistentError)` once and then stops if it encounters an
/// unlinked element.
#[derive(Debug)]
pub struct Iter<'a, Pool: ?Sized, Index> {
    pool: &'a Pool,
    first: Option<Index>,
    next: Option<Index>,
}

impl<'a, Pool, Index, Element> Iter<'a, Pool, Index>
where
    Pool: ops::Index<Index, Output = Element> + ?Sized,
    Element: Linked<Index> + 'a,
    Index: PartialEq + Clone,
{
    /// Iterate over the list headed by `head` without borrowing it mutably.
    pub fn new(head: &ListHead<Index>, pool: &'a Pool) -> Self {
        Self {
            pool,
            first: head.first.clone(),
            next: head.first.clone(),
        }
    }
}

impl<'a, Pool, Index, Element> Iterator for Iter<'a, Pool, Index>
where
    Pool: ops::Index<Index, Output = Element> + ?Sized,
    Element: Linked<Index> + 'a,
    Index: PartialEq + Clone,
{
    type Item = Result<(Index, &'a Element), InconsistentError>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        let pool = self.pool;
        let element = &pool[current.clone()];
        match element.link() {
            Some(link) => {
                if Some(&link.next) != self.first.as_ref() {
                    self.next = Some(link.next.clone());
                }
                Some(Ok((current, element)))
            }
            None => Some(Err(InconsistentError)),
        }
    }
}
