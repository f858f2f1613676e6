use allocator_api2::alloc::{ Allocator, Global };
use std::{
    fmt::{ Debug, Display, Pointer },
    hash::{ Hash, Hasher },
    marker::PhantomData,
    ops::Deref,
    ptr::{ self, NonNull }
};
use crate::{
    error::{ Error, Result },
    memory::{
        deleter::{ DefaultDelete, Deleter },
        ref_count::{ RefCountBase, RefCountObject, RefCountResource },
        unique_ptr::UniquePtr,
        weak_ptr::WeakPtr
    }
};

// std::shared_ptr
/// Reference counted pointer with a separate control block.
///
/// `_ptr` is the address handed out by `get` and `Deref`, `_rep` is the control block deciding
/// when the object dies. They usually refer to the same object, except for handles made through
/// [`SharedPtr::map`] or [`SharedPtr::aliasing`], which point at a part of (or something kept
/// alive by) the managed object.
pub struct SharedPtr<T: ?Sized> {
    pub(crate) _ptr: Option<NonNull<T>>,
    pub(crate) _rep: Option<NonNull<RefCountBase>>,
    _data: PhantomData<T>
}

impl<T> SharedPtr<T> {
    /// Construct an object of type T inside a single allocation together with its reference
    /// counts. Doesn't bind [`crate::WeakThis`]; see [`crate::make_shared!`] and
    /// [`SharedPtr::make_shared_enabled`] for that.
    pub fn make_shared(data: T) -> Self { Self::make_shared_in(data, Global) }

    pub fn make_shared_in<A>(data: T, alloc: A) -> Self
    where A: Allocator + 'static
    {
        Self::make_shared_with_in(|| data, alloc)
    }

    /// Like [`SharedPtr::make_shared`], but the block is allocated before `f` builds the object.
    /// If `f` panics the block is freed again.
    pub fn make_shared_with<F>(f: F) -> Self
    where F: FnOnce() -> T
    {
        Self::make_shared_with_in(f, Global)
    }

    pub fn make_shared_with_in<F, A>(f: F, alloc: A) -> Self
    where F: FnOnce() -> T,
          A: Allocator + 'static
    {
        let (rep, ptr) = RefCountObject::new_with_in(f, alloc);
        unsafe { Self::from_parts(Some(ptr), Some(rep)) }
    }
}

impl<T: ?Sized> SharedPtr<T> {
    /// An empty pointer, which owns nothing and has no control block.
    pub const fn new() -> Self {
        Self { _ptr: None, _rep: None, _data: PhantomData }
    }

    // Wrap a strong reference that has already been counted
    pub(crate) unsafe fn from_parts(_ptr: Option<NonNull<T>>, _rep: Option<NonNull<RefCountBase>>) -> Self {
        Self { _ptr, _rep, _data: PhantomData }
    }

    /// Take ownership of a boxed object. The control block is allocated separately. Self-aware
    /// objects are bound by [`crate::adopt_shared!`] and [`SharedPtr::from_box_enabled`].
    pub fn from_box(data: Box<T>) -> Self { Self::from_box_in(data, Global) }

    pub fn from_box_in<A>(data: Box<T>, alloc: A) -> Self
    where A: Allocator + 'static
    {
        let ptr = unsafe { NonNull::new_unchecked(Box::into_raw(data)) };
        unsafe { Self::from_raw_with_deleter_in(ptr, DefaultDelete, alloc) }
    }

    /// Take ownership of `ptr`, destroying it with `deleter` once the last strong reference is
    /// gone.
    ///
    /// # Safety
    /// `ptr` must be valid for reads until it is passed to `deleter`, and nothing else may free
    /// it.
    pub unsafe fn from_raw_with_deleter<D>(ptr: NonNull<T>, deleter: D) -> Self
    where D: Deleter<T> + 'static
    {
        unsafe { Self::from_raw_with_deleter_in(ptr, deleter, Global) }
    }

    /// # Safety
    /// See [`SharedPtr::from_raw_with_deleter`]. `alloc` is only used for the control block.
    pub unsafe fn from_raw_with_deleter_in<D, A>(ptr: NonNull<T>, deleter: D, alloc: A) -> Self
    where D: Deleter<T> + 'static,
          A: Allocator + 'static
    {
        let rep = unsafe { RefCountResource::new_in(ptr, deleter, alloc) };
        unsafe { Self::from_parts(Some(ptr), Some(rep)) }
    }

    /// Aliasing constructor: share ownership with `other` while pointing at `ptr`.
    ///
    /// # Safety
    /// `ptr` must stay valid for as long as the object managed by `other` is alive. If `other`
    /// is empty the result owns nothing, and `ptr` must stay valid for as long as it is used.
    pub unsafe fn aliasing<U>(other: &SharedPtr<U>, ptr: NonNull<T>) -> Self
    where U: ?Sized + 'static
    {
        if let Some(rep) = other._rep {
            unsafe { rep.as_ref() }.incref();
        }
        unsafe { Self::from_parts(Some(ptr), other._rep) }
    }

    /// Promote a weak pointer, failing with [`Error::ExpiredReference`] when the object it
    /// refers to has already been destroyed.
    pub fn from_weak(weak: &WeakPtr<T>) -> Result<Self> {
        match weak._rep {
            Some(rep) if unsafe { rep.as_ref() }.incref_nz() => Ok(unsafe { Self::from_parts(weak._ptr, Some(rep)) }),
            _ => {
                log::debug!("tried to promote an expired WeakPtr<{}>", std::any::type_name::<T>());
                Err(Error::ExpiredReference)
            }
        }
    }

    pub fn get(&self) -> Option<&T> {
        self._ptr.map(|p| unsafe { &*p.as_ptr() })
    }

    /// # Safety
    /// No other reference to the object may be alive while the returned one is, and the pointer
    /// must not have been derived from a shared reference (as [`SharedPtr::map`] does).
    pub unsafe fn get_mut_unchecked(&mut self) -> Option<&mut T> {
        self._ptr.map(|p| unsafe { &mut *p.as_ptr() })
    }

    pub fn as_ptr(&self) -> Option<NonNull<T>> { self._ptr }

    // Address used for comparisons, null for an empty pointer
    fn addr(&self) -> *const () {
        self._ptr.map_or(ptr::null(), |p| p.as_ptr().cast::<()>() as *const ())
    }

    pub fn is_null(&self) -> bool { self._ptr.is_none() }

    pub fn use_count(&self) -> usize {
        self._rep.map_or(0, |r| unsafe { r.as_ref() }.use_count())
    }

    pub fn weak_count(&self) -> usize {
        self._rep.map_or(0, |r| unsafe { r.as_ref() }.weak_count())
    }

    pub fn unique(&self) -> bool { self.use_count() == 1 }

    pub fn downgrade(&self) -> WeakPtr<T> { WeakPtr::from_shared(self) }

    /// Release ownership, leaving this pointer empty.
    pub fn reset(&mut self) {
        Self::new().swap(self);
    }

    /// Release ownership and take ownership of a boxed object instead.
    pub fn reset_box(&mut self, data: Box<T>) {
        Self::from_box(data).swap(self);
    }

    /// Release ownership and adopt `ptr`, see [`SharedPtr::from_raw_with_deleter`].
    ///
    /// # Safety
    /// Same as [`SharedPtr::from_raw_with_deleter`].
    pub unsafe fn reset_raw_with_deleter<D>(&mut self, ptr: NonNull<T>, deleter: D)
    where D: Deleter<T> + 'static
    {
        unsafe { Self::from_raw_with_deleter(ptr, deleter) }.swap(self);
    }

    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(&mut self._ptr, &mut other._ptr);
        std::mem::swap(&mut self._rep, &mut other._rep);
    }

    /// Same address, regardless of control block.
    pub fn ptr_eq<U: ?Sized>(&self, other: &SharedPtr<U>) -> bool { self.addr() == other.addr() }

    /// Same control block, regardless of address.
    pub fn owner_eq<U: ?Sized>(&self, other: &SharedPtr<U>) -> bool { self._rep == other._rep }

    /// Aliasing constructor over a projection of the managed object, e.g. one of its fields or
    /// the object viewed as a trait object. The result shares ownership of the whole object.
    pub fn map<U, F>(&self, f: F) -> SharedPtr<U>
    where T: 'static,
          U: ?Sized,
          F: FnOnce(&T) -> &U
    {
        match self.get() {
            Some(v) => unsafe { SharedPtr::aliasing(self, NonNull::from(f(v))) },
            None => SharedPtr::new()
        }
    }
}

impl<T: ?Sized> SharedPtr<T> {
    pub fn _debug_get_ptr(&self) -> *const u8 { self.addr() as *const u8 }
    pub fn _debug_get_rep(&self) -> *const u8 {
        self._rep.map_or(ptr::null(), |r| r.as_ptr() as *const u8)
    }
}

impl<T: ?Sized> Clone for SharedPtr<T> {
    fn clone(&self) -> Self {
        if let Some(rep) = self._rep {
            unsafe { rep.as_ref() }.incref();
        }
        unsafe { Self::from_parts(self._ptr, self._rep) }
    }

    // Copy-and-swap: the new reference is taken before the old one is released, and the old
    // state is dropped exactly once when the temporary goes out of scope.
    fn clone_from(&mut self, source: &Self) {
        Self::clone(source).swap(self);
    }
}

impl<T: ?Sized> Drop for SharedPtr<T> {
    fn drop(&mut self) {
        if let Some(rep) = self._rep.take() {
            unsafe { RefCountBase::decref(rep) }
        }
    }
}

impl<T: ?Sized> Default for SharedPtr<T> {
    fn default() -> Self { Self::new() }
}

impl<T: ?Sized> Deref for SharedPtr<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        match self.get() {
            Some(v) => v,
            None => panic!("Tried to dereference an empty SharedPtr")
        }
    }
}

impl<T, U> PartialEq<SharedPtr<U>> for SharedPtr<T>
where T: ?Sized,
      U: ?Sized
{
    fn eq(&self, other: &SharedPtr<U>) -> bool { self.ptr_eq(other) }
}

impl<T: ?Sized> Eq for SharedPtr<T> {}

impl<T: ?Sized> Hash for SharedPtr<T> {
    fn hash<H>(&self, state: &mut H)
    where H: Hasher
    {
        self.addr().hash(state)
    }
}

impl<T: ?Sized> From<Box<T>> for SharedPtr<T> {
    fn from(value: Box<T>) -> Self { Self::from_box(value) }
}

// shared_ptr(unique_ptr&&): the deleter moves into the control block
impl<T, D> From<UniquePtr<T, D>> for SharedPtr<T>
where T: ?Sized,
      D: Deleter<T> + 'static
{
    fn from(value: UniquePtr<T, D>) -> Self {
        match value.into_raw_parts() {
            (Some(ptr), deleter) => unsafe { Self::from_raw_with_deleter(ptr, deleter) },
            (None, _) => Self::new()
        }
    }
}

/// Owning pointers a [`SharedPtr`] can take the object from, used by [`crate::adopt_shared!`].
pub trait IntoSharedPtr {
    type Target: ?Sized;
    fn into_shared_ptr(self) -> SharedPtr<Self::Target>;
}

impl<T: ?Sized> IntoSharedPtr for Box<T> {
    type Target = T;
    fn into_shared_ptr(self) -> SharedPtr<T> { SharedPtr::from_box(self) }
}

impl<T, D> IntoSharedPtr for UniquePtr<T, D>
where T: ?Sized,
      D: Deleter<T> + 'static
{
    type Target = T;
    fn into_shared_ptr(self) -> SharedPtr<T> { SharedPtr::from(self) }
}

impl<T: ?Sized> TryFrom<&WeakPtr<T>> for SharedPtr<T> {
    type Error = Error;
    fn try_from(value: &WeakPtr<T>) -> Result<Self> { Self::from_weak(value) }
}

impl<T> Debug for SharedPtr<T>
where T: ?Sized + Debug
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SharedPtr {{ data: {:?}, strong: {}, weak: {} }}",
            self.get(), self.use_count(), self.weak_count())
    }
}

impl<T> Display for SharedPtr<T>
where T: ?Sized + Display
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.get() {
            Some(v) => write!(f, "{}", v),
            None => write!(f, "nullptr")
        }
    }
}

impl<T: ?Sized> Pointer for SharedPtr<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Pointer::fmt(&self.addr(), f)
    }
}
