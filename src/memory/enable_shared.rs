use allocator_api2::alloc::{ Allocator, Global };
use std::{
    cell::RefCell,
    fmt::Debug,
    ptr::NonNull
};
use crate::{
    error::Result,
    memory::{
        deleter::Deleter,
        shared_ptr::SharedPtr,
        unique_ptr::UniquePtr,
        weak_ptr::WeakPtr
    }
};

// std::enable_shared_from_this::_Wptr
// Weak reference an object keeps to itself. It's filled in by the first SharedPtr that takes
// ownership of the object and never rebound after that.
pub struct WeakThis<T> {
    weak: RefCell<WeakPtr<T>>
}

impl<T> WeakThis<T> {
    pub const fn new() -> Self {
        Self { weak: RefCell::new(WeakPtr::new()) }
    }

    pub fn is_bound(&self) -> bool { self.weak.borrow()._rep.is_some() }

    pub fn lock(&self) -> SharedPtr<T> { self.weak.borrow().lock() }

    pub fn get(&self) -> WeakPtr<T> { self.weak.borrow().clone() }

    fn bind(&self, owner: &SharedPtr<T>) {
        let mut weak = self.weak.borrow_mut();
        if weak._rep.is_none() {
            *weak = owner.downgrade();
            log::trace!("bound {} to control block {:p}", std::any::type_name::<T>(), owner._debug_get_rep());
        }
    }
}

impl<T> Default for WeakThis<T> {
    fn default() -> Self { Self::new() }
}

// A copy of an object belongs to whoever ends up owning the copy, so the binding isn't cloned.
impl<T> Clone for WeakThis<T> {
    fn clone(&self) -> Self { Self::new() }
}

impl<T> Debug for WeakThis<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WeakThis {{ bound: {}, expired: {} }}", self.is_bound(), self.weak.borrow().expired())
    }
}

// std::enable_shared_from_this
/// Lets an object managed by a [`SharedPtr`] get new owners from `&self`.
///
/// Implementors embed a [`WeakThis<Self>`] and return it from `weak_this`. The slot is bound by
/// the `*_enabled` constructors of [`SharedPtr`] or by the [`make_shared!`](crate::make_shared)
/// and [`adopt_shared!`](crate::adopt_shared) macros. Until then `shared_from_this` returns an
/// empty pointer.
pub trait EnableSharedFromThis: Sized {
    fn weak_this(&self) -> &WeakThis<Self>;

    fn shared_from_this(&self) -> SharedPtr<Self> { self.weak_this().lock() }

    /// Like `shared_from_this`, but reports [`crate::Error::ExpiredReference`] instead of
    /// returning an empty pointer when the object has no owner.
    fn try_shared_from_this(&self) -> Result<SharedPtr<Self>> {
        SharedPtr::from_weak(&self.weak_this().get())
    }

    fn weak_from_this(&self) -> WeakPtr<Self> { self.weak_this().get() }
}

// Constructors that also bind the object's WeakThis to the new control block
impl<T> SharedPtr<T>
where T: EnableSharedFromThis
{
    pub fn make_shared_enabled(data: T) -> Self { Self::make_shared_enabled_in(data, Global) }

    pub fn make_shared_enabled_in<A>(data: T, alloc: A) -> Self
    where A: Allocator + 'static
    {
        Self::make_shared_in(data, alloc).enabled()
    }

    pub fn from_box_enabled(data: Box<T>) -> Self { Self::from_box_enabled_in(data, Global) }

    pub fn from_box_enabled_in<A>(data: Box<T>, alloc: A) -> Self
    where A: Allocator + 'static
    {
        Self::from_box_in(data, alloc).enabled()
    }

    /// # Safety
    /// See [`SharedPtr::from_raw_with_deleter`].
    pub unsafe fn from_raw_with_deleter_enabled<D>(ptr: NonNull<T>, deleter: D) -> Self
    where D: Deleter<T> + 'static
    {
        unsafe { Self::from_raw_with_deleter_enabled_in(ptr, deleter, Global) }
    }

    /// # Safety
    /// See [`SharedPtr::from_raw_with_deleter`].
    pub unsafe fn from_raw_with_deleter_enabled_in<D, A>(ptr: NonNull<T>, deleter: D, alloc: A) -> Self
    where D: Deleter<T> + 'static,
          A: Allocator + 'static
    {
        unsafe { Self::from_raw_with_deleter_in(ptr, deleter, alloc) }.enabled()
    }

    pub fn from_unique_enabled<D>(data: UniquePtr<T, D>) -> Self
    where D: Deleter<T> + 'static
    {
        Self::from(data).enabled()
    }

    pub fn reset_box_enabled(&mut self, data: Box<T>) {
        Self::from_box_enabled(data).swap(self);
    }

    /// # Safety
    /// See [`SharedPtr::from_raw_with_deleter`].
    pub unsafe fn reset_raw_with_deleter_enabled<D>(&mut self, ptr: NonNull<T>, deleter: D)
    where D: Deleter<T> + 'static
    {
        unsafe { Self::from_raw_with_deleter_enabled(ptr, deleter) }.swap(self);
    }

    fn enabled(self) -> Self {
        self.enable_shared_from_this();
        self
    }

    // Points the object's WeakThis at this pointer's control block, unless some owner already
    // did
    pub(crate) fn enable_shared_from_this(&self) {
        if let Some(v) = self.get() {
            v.weak_this().bind(self);
        }
    }
}

// Support for make_shared! and adopt_shared!: picks BindSelfAware when the payload implements
// EnableSharedFromThis and falls back to BindPlain otherwise.
#[doc(hidden)]
pub struct BindProbe<'a, T: ?Sized>(pub &'a SharedPtr<T>);

#[doc(hidden)]
pub trait BindSelfAware {
    fn bind_weak_this(&self);
}

impl<'a, T> BindSelfAware for BindProbe<'a, T>
where T: EnableSharedFromThis
{
    fn bind_weak_this(&self) { self.0.enable_shared_from_this() }
}

#[doc(hidden)]
pub trait BindPlain {
    fn bind_weak_this(&self);
}

impl<'a, 'b, T: ?Sized> BindPlain for &'b BindProbe<'a, T> {
    fn bind_weak_this(&self) {}
}
