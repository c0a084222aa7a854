use std::{
    alloc::handle_alloc_error,
    fmt,
    marker::PhantomData,
    mem,
    ops::Deref,
    ptr::{self, NonNull},
};

use crate::{
    block::{self, BlockPtr},
    error::AllocError,
};

/// Shared-ownership handle.
///
/// A `Shared` is a pair of pointers: the _view_, which is what dereferencing
/// yields, and the control block of its ownership group, which decides when
/// the owned object is destroyed. Usually the view points at the owned object
/// itself, but an aliased handle may present a field of it, or the object as
/// a trait object, while keeping the whole allocation alive.
///
/// Counting is not atomic, so `Shared` is neither `Send` nor `Sync`.
///
/// A handle is either empty (no view, no block) or holds both. Cloning adds
/// one to the group's count, dropping or resetting removes one, and the last
/// handle to go destroys the object and frees the block.
///
/// As with `Rc`, operations on the handle itself are associated functions,
/// called as `Shared::is_empty(&h)` or `Shared::take(&mut h)`, so that method
/// calls on a `Shared<T>` always reach `T`.
pub struct Shared<T: ?Sized>
{
    view: Option<NonNull<T>>,
    block: Option<BlockPtr>,
    _owns: PhantomData<T>,
}

impl<T: ?Sized> Shared<T>
{
    /// A handle that owns nothing. Does not allocate.
    pub const fn empty() -> Self
    {
        Shared {
            view: None,
            block: None,
            _owns: PhantomData,
        }
    }

    /// Assembles a handle from a view and a block it has already been counted
    /// against.
    pub(crate) unsafe fn from_parts(view: NonNull<T>, block: BlockPtr) -> Self
    {
        Shared {
            view: Some(view),
            block: Some(block),
            _owns: PhantomData,
        }
    }

    /// Reference to the view target, `None` if empty.
    pub fn get(this: &Self) -> Option<&T> { this.view.map(|view| unsafe { &*view.as_ptr() }) }

    /// The raw view pointer, `None` if empty.
    pub fn as_ptr(this: &Self) -> Option<NonNull<T>> { this.view }

    /// Whether this handle presents an object.
    pub fn is_some(this: &Self) -> bool { this.view.is_some() }

    /// Whether this handle owns nothing.
    pub fn is_empty(this: &Self) -> bool { this.view.is_none() }

    /// Number of handles sharing this handle's block, 0 if empty.
    pub fn use_count(this: &Self) -> usize
    {
        this.block
            .map_or(0, |block| unsafe { block::count_of(block) })
    }

    /// Whether two handles belong to the same ownership group, regardless of
    /// what they present. Two empty handles count as sharing the same (absent)
    /// owner.
    pub fn same_owner<U: ?Sized>(this: &Self, other: &Shared<U>) -> bool
    {
        this.block_addr() == other.block_addr()
    }

    /// New handle in the same group presenting whatever `f` picks out of the
    /// view target: a field, or the same object under another type.
    ///
    /// ```
    /// use sharedptr::Shared;
    ///
    /// let pair = Shared::new((String::from("left"), 7));
    /// let left: Shared<str> = Shared::project(&pair, |p| p.0.as_str());
    /// drop(pair);
    ///
    /// assert_eq!(&*left, "left");
    /// assert_eq!(Shared::use_count(&left), 1);
    /// ```
    pub fn project<U: ?Sized, F>(this: &Self, f: F) -> Shared<U>
    where
        F: for<'a> FnOnce(&'a T) -> &'a U,
    {
        match (this.view, this.block) {
            (Some(view), Some(block)) => unsafe {
                let view = NonNull::from(f(&*view.as_ptr()));
                block::retain(block);
                Shared::from_parts(view, block)
            },
            _ => Shared::empty(),
        }
    }

    /// Like `project`, but transfers this handle's share instead of adding
    /// one.
    pub fn into_projected<U: ?Sized, F>(mut this: Self, f: F) -> Shared<U>
    where
        F: for<'a> FnOnce(&'a T) -> &'a U,
    {
        match (this.view, this.block) {
            (Some(view), Some(block)) => {
                let view = NonNull::from(f(unsafe { &*view.as_ptr() }));
                this.view = None;
                this.block = None;
                unsafe { Shared::from_parts(view, block) }
            }
            _ => Shared::empty(),
        }
    }

    /// New handle in the same group presenting an arbitrary pointer.
    ///
    /// Aliasing an empty handle yields an empty handle.
    ///
    /// # Safety
    ///
    /// `view` must stay valid for shared access for as long as any handle of
    /// this group is alive, which holds for anything owned by the object.
    pub unsafe fn alias<U: ?Sized>(this: &Self, view: NonNull<U>) -> Shared<U>
    {
        match this.block {
            Some(block) => {
                block::retain(block);
                Shared::from_parts(view, block)
            }
            None => Shared::empty(),
        }
    }

    /// Gives up this handle's share, leaving it empty. The object is destroyed
    /// if this was the last handle.
    pub fn reset(this: &mut Self)
    {
        this.view = None;
        if let Some(block) = this.block.take() {
            unsafe { block::release(block) }
        }
    }

    /// Moves the share out, leaving this handle empty.
    pub fn take(this: &mut Self) -> Self { mem::replace(this, Self::empty()) }

    /// Exchanges the contents of two handles. No count changes.
    pub fn swap(this: &mut Self, other: &mut Self) { mem::swap(this, other) }

    fn view_addr(&self) -> *const u8
    {
        self.view
            .map_or(ptr::null(), |view| view.as_ptr() as *const u8)
    }

    fn block_addr(&self) -> *const u8
    {
        self.block
            .map_or(ptr::null(), |block| block.as_ptr() as *const u8)
    }

    fn is_identical(&self, other: &Self) -> bool
    {
        self.view_addr() == other.view_addr() && self.block_addr() == other.block_addr()
    }
}

impl<T: 'static> Shared<T>
{
    /// Moves `value` into a freshly allocated block holding both the count and
    /// the object.
    pub fn new(value: T) -> Self { Self::new_with(move || value) }

    /// Allocates a combined block and builds the object directly into it.
    ///
    /// `init` is called exactly once. If it panics nothing is leaked and no
    /// destructor runs.
    pub fn new_with(init: impl FnOnce() -> T) -> Self
    {
        Self::try_new_with(init).unwrap_or_else(|err| handle_alloc_error(err.layout()))
    }

    /// Fallible `new`; `value` is dropped if the block cannot be allocated.
    pub fn try_new(value: T) -> Result<Self, AllocError> { Self::try_new_with(move || value) }

    /// Fallible `new_with`; `init` is not called if the block cannot be
    /// allocated.
    pub fn try_new_with(init: impl FnOnce() -> T) -> Result<Self, AllocError>
    {
        let (view, block) = block::emplace(init)?;
        Ok(unsafe { Self::from_parts(view, block) })
    }
}

impl<T: ?Sized + 'static> Shared<T>
{
    /// Takes ownership of an already boxed object, allocating a separate
    /// block for it.
    pub fn from_box(value: Box<T>) -> Self
    {
        Self::try_from_box(value).unwrap_or_else(|err| handle_alloc_error(err.layout()))
    }

    /// Fallible `from_box`; `value` is dropped if the block cannot be
    /// allocated.
    pub fn try_from_box(value: Box<T>) -> Result<Self, AllocError>
    {
        let (view, block) = block::wrap(value)?;
        Ok(unsafe { Self::from_parts(view, block) })
    }

    /// Replaces the current share with ownership of `value`.
    ///
    /// The new block is allocated before the old share is given up.
    pub fn reset_to(this: &mut Self, value: Box<T>) { *this = Self::from_box(value) }

    /// Fallible `reset_to`; on failure this handle is left untouched.
    pub fn try_reset_to(this: &mut Self, value: Box<T>) -> Result<(), AllocError>
    {
        *this = Self::try_from_box(value)?;
        Ok(())
    }
}

impl<T: ?Sized> Clone for Shared<T>
{
    fn clone(&self) -> Self
    {
        if let Some(block) = self.block {
            unsafe { block::retain(block) }
        }
        Shared {
            view: self.view,
            block: self.block,
            _owns: PhantomData,
        }
    }

    fn clone_from(&mut self, source: &Self)
    {
        if !self.is_identical(source) {
            *self = source.clone();
        }
    }
}

impl<T: ?Sized> Drop for Shared<T>
{
    fn drop(&mut self) { Self::reset(self) }
}

impl<T: ?Sized> Default for Shared<T>
{
    fn default() -> Self { Self::empty() }
}

impl<T: ?Sized> Deref for Shared<T>
{
    type Target = T;

    #[track_caller]
    fn deref(&self) -> &Self::Target
    {
        match self.view {
            Some(view) => unsafe { &*view.as_ptr() },
            None => panic!("dereferenced an empty Shared"),
        }
    }
}

impl<T: ?Sized + 'static> From<Box<T>> for Shared<T>
{
    fn from(value: Box<T>) -> Self { Self::from_box(value) }
}

impl<T: ?Sized, U: ?Sized> PartialEq<Shared<U>> for Shared<T>
{
    fn eq(&self, other: &Shared<U>) -> bool { self.view_addr() == other.view_addr() }
}

impl<T: ?Sized> Eq for Shared<T> {}

impl<T: ?Sized> fmt::Debug for Shared<T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Shared")
            .field("view", &self.view_addr())
            .field("use_count", &Self::use_count(self))
            .finish()
    }
}

impl<T: ?Sized> fmt::Pointer for Shared<T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { fmt::Pointer::fmt(&self.view_addr(), f) }
}
