use std::{
    fmt::Debug,
    marker::PhantomData,
    ptr::NonNull
};
use crate::memory::{
    ref_count::RefCountBase,
    shared_ptr::SharedPtr
};

// std::weak_ptr
// Keeps the control block alive, but not the object. Promote with lock or SharedPtr::from_weak.
pub struct WeakPtr<T: ?Sized> {
    pub(crate) _ptr: Option<NonNull<T>>,
    pub(crate) _rep: Option<NonNull<RefCountBase>>,
    _data: PhantomData<T>
}

impl<T: ?Sized> WeakPtr<T> {
    pub const fn new() -> Self {
        Self { _ptr: None, _rep: None, _data: PhantomData }
    }

    pub(crate) fn from_shared(shared: &SharedPtr<T>) -> Self {
        if let Some(rep) = shared._rep {
            unsafe { rep.as_ref() }.incwref();
        }
        Self { _ptr: shared._ptr, _rep: shared._rep, _data: PhantomData }
    }

    pub fn use_count(&self) -> usize {
        self._rep.map_or(0, |r| unsafe { r.as_ref() }.use_count())
    }

    pub fn weak_count(&self) -> usize {
        self._rep.map_or(0, |r| unsafe { r.as_ref() }.weak_count())
    }

    pub fn expired(&self) -> bool { self.use_count() == 0 }

    /// A new owner of the object, or an empty pointer if it has already been destroyed.
    pub fn lock(&self) -> SharedPtr<T> {
        SharedPtr::from_weak(self).unwrap_or_default()
    }

    pub fn reset(&mut self) {
        Self::new().swap(self);
    }

    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(&mut self._ptr, &mut other._ptr);
        std::mem::swap(&mut self._rep, &mut other._rep);
    }

    pub fn owner_eq<U: ?Sized>(&self, other: &WeakPtr<U>) -> bool { self._rep == other._rep }

    pub fn owner_eq_shared<U: ?Sized>(&self, other: &SharedPtr<U>) -> bool { self._rep == other._rep }

    pub fn _debug_get_rep(&self) -> *const u8 {
        self._rep.map_or(std::ptr::null(), |r| r.as_ptr() as *const u8)
    }
}

impl<T: ?Sized> Clone for WeakPtr<T> {
    fn clone(&self) -> Self {
        if let Some(rep) = self._rep {
            unsafe { rep.as_ref() }.incwref();
        }
        Self { _ptr: self._ptr, _rep: self._rep, _data: PhantomData }
    }

    fn clone_from(&mut self, source: &Self) {
        Self::clone(source).swap(self);
    }
}

impl<T: ?Sized> Drop for WeakPtr<T> {
    fn drop(&mut self) {
        // no other SharedPtr/WeakPtr referencing the block means it gets freed here
        if let Some(rep) = self._rep.take() {
            unsafe { RefCountBase::decwref(rep) }
        }
    }
}

impl<T: ?Sized> Default for WeakPtr<T> {
    fn default() -> Self { Self::new() }
}

impl<T: ?Sized> From<&SharedPtr<T>> for WeakPtr<T> {
    fn from(value: &SharedPtr<T>) -> Self { Self::from_shared(value) }
}

impl<T> Debug for WeakPtr<T>
where T: ?Sized
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WeakPtr {{ strong: {}, weak: {}, expired: {} }}",
            self.use_count(), self.weak_count(), self.expired())
    }
}
