use std::{
    fmt::{ Debug, Display, Pointer },
    hash::{ Hash, Hasher },
    marker::PhantomData,
    mem::ManuallyDrop,
    ops::{ Deref, DerefMut, Index, IndexMut },
    ptr::{ self, NonNull }
};
use crate::memory::{
    compressed_pair::CompressedPair,
    deleter::{ DefaultDelete, Deleter }
};

// std::unique_ptr
pub struct UniquePtr<T, D = DefaultDelete>
where T: ?Sized,
      D: Deleter<T>
{
    pair: CompressedPair<Option<NonNull<T>>, D>,
    _data: PhantomData<T>
}

impl<T> UniquePtr<T, DefaultDelete> {
    pub fn make_unique(data: T) -> Self { Self::from_box(Box::new(data)) }
}

impl<T> UniquePtr<[T], DefaultDelete> {
    pub fn from_vec(vec: Vec<T>) -> Self { Self::from_box(vec.into_boxed_slice()) }
}

impl<T> UniquePtr<T, DefaultDelete>
where T: ?Sized
{
    pub fn from_box(data: Box<T>) -> Self {
        let ptr = unsafe { NonNull::new_unchecked(Box::into_raw(data)) };
        unsafe { Self::from_raw_with_deleter(Some(ptr), DefaultDelete) }
    }

    pub fn into_box(self) -> Option<Box<T>> {
        let (ptr, _) = self.into_raw_parts();
        ptr.map(|p| unsafe { Box::from_raw(p.as_ptr()) })
    }

    /// Replace the owned object, dropping the old one.
    pub fn reset_box(&mut self, data: Box<T>) {
        let ptr = unsafe { NonNull::new_unchecked(Box::into_raw(data)) };
        unsafe { self.reset_raw(Some(ptr)) }
    }
}

impl<T, D> UniquePtr<T, D>
where T: ?Sized,
      D: Deleter<T>
{
    pub fn null() -> Self
    where D: Default
    {
        Self::null_with_deleter(D::default())
    }

    pub fn null_with_deleter(deleter: D) -> Self {
        Self { pair: CompressedPair::new(None, deleter), _data: PhantomData }
    }

    /// # Safety
    /// `ptr` must be valid and owned by the caller, and must be something `D` can delete.
    pub unsafe fn from_raw(ptr: NonNull<T>) -> Self
    where D: Default
    {
        unsafe { Self::from_raw_with_deleter(Some(ptr), D::default()) }
    }

    /// # Safety
    /// See [`UniquePtr::from_raw`].
    pub unsafe fn from_raw_with_deleter(ptr: Option<NonNull<T>>, deleter: D) -> Self {
        Self { pair: CompressedPair::new(ptr, deleter), _data: PhantomData }
    }

    pub fn get(&self) -> Option<&T> {
        self.pair.first().map(|p| unsafe { &*p.as_ptr() })
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.pair.first().map(|p| unsafe { &mut *p.as_ptr() })
    }

    pub fn as_ptr(&self) -> Option<NonNull<T>> { *self.pair.first() }

    fn addr(&self) -> *const () {
        self.pair.first().map_or(ptr::null(), |p| p.as_ptr().cast::<()>() as *const ())
    }

    pub fn is_null(&self) -> bool { self.pair.first().is_none() }

    pub fn get_deleter(&self) -> &D { self.pair.second() }
    pub fn get_deleter_mut(&mut self) -> &mut D { self.pair.second_mut() }

    /// Give up ownership without destroying the object.
    pub fn release(&mut self) -> Option<NonNull<T>> { self.pair.first_mut().take() }

    /// Destroy the owned object, leaving this pointer empty.
    pub fn reset(&mut self) {
        unsafe { self.reset_raw(None) }
    }

    /// Destroy the owned object and take ownership of `ptr`.
    ///
    /// # Safety
    /// See [`UniquePtr::from_raw`].
    pub unsafe fn reset_raw(&mut self, ptr: Option<NonNull<T>>) {
        let old = std::mem::replace(self.pair.first_mut(), ptr);
        if let Some(old) = old {
            unsafe { self.pair.second_mut().delete(old) }
        }
    }

    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(&mut self.pair, &mut other.pair);
    }

    // The moved-from state of a C++ unique_ptr
    pub fn take(&mut self) -> Self
    where D: Default
    {
        std::mem::replace(self, Self::null())
    }

    pub fn into_raw_parts(self) -> (Option<NonNull<T>>, D) {
        // don't call drop on this, the pair is moved out below
        let this = ManuallyDrop::new(self);
        unsafe { ptr::read(&this.pair) }.into_parts()
    }

    /// Convert into a pointer to a related type, e.g. a trait object, carrying the deleter over
    /// through `From`.
    ///
    /// # Safety
    /// The pointer returned by `f` must be deletable by `E` in place of the original one.
    pub unsafe fn cast<U, E, F>(self, f: F) -> UniquePtr<U, E>
    where U: ?Sized,
          E: Deleter<U> + From<D>,
          F: FnOnce(NonNull<T>) -> NonNull<U>
    {
        let (ptr, deleter) = self.into_raw_parts();
        unsafe { UniquePtr::from_raw_with_deleter(ptr.map(f), E::from(deleter)) }
    }
}

impl<T, D> UniquePtr<[T], D>
where D: Deleter<[T]>
{
    pub fn len(&self) -> usize { self.pair.first().map_or(0, |p| p.len()) }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl<T, D> Drop for UniquePtr<T, D>
where T: ?Sized,
      D: Deleter<T>
{
    fn drop(&mut self) { self.reset() }
}

impl<T, D> Default for UniquePtr<T, D>
where T: ?Sized,
      D: Deleter<T> + Default
{
    fn default() -> Self { Self::null() }
}

impl<T, D> Deref for UniquePtr<T, D>
where T: ?Sized,
      D: Deleter<T>
{
    type Target = T;
    fn deref(&self) -> &Self::Target {
        match self.get() {
            Some(v) => v,
            None => panic!("Tried to dereference an empty UniquePtr")
        }
    }
}

impl<T, D> DerefMut for UniquePtr<T, D>
where T: ?Sized,
      D: Deleter<T>
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.get_mut() {
            Some(v) => v,
            None => panic!("Tried to dereference an empty UniquePtr")
        }
    }
}

impl<T, D> Index<usize> for UniquePtr<[T], D>
where D: Deleter<[T]>
{
    type Output = T;
    fn index(&self, index: usize) -> &Self::Output {
        assert!(index < self.len(), "Tried to access an out of bounds value");
        &(**self)[index]
    }
}

impl<T, D> IndexMut<usize> for UniquePtr<[T], D>
where D: Deleter<[T]>
{
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        assert!(index < self.len(), "Tried to access an out of bounds value");
        &mut (**self)[index]
    }
}

impl<T, D, U, E> PartialEq<UniquePtr<U, E>> for UniquePtr<T, D>
where T: ?Sized,
      D: Deleter<T>,
      U: ?Sized,
      E: Deleter<U>
{
    fn eq(&self, other: &UniquePtr<U, E>) -> bool { self.addr() == other.addr() }
}

impl<T, D> Eq for UniquePtr<T, D>
where T: ?Sized,
      D: Deleter<T>
{}

impl<T, D> Hash for UniquePtr<T, D>
where T: ?Sized,
      D: Deleter<T>
{
    fn hash<H>(&self, state: &mut H)
    where H: Hasher
    {
        self.addr().hash(state)
    }
}

impl<T> From<Box<T>> for UniquePtr<T, DefaultDelete>
where T: ?Sized
{
    fn from(value: Box<T>) -> Self { Self::from_box(value) }
}

impl<T, D> Debug for UniquePtr<T, D>
where T: ?Sized + Debug,
      D: Deleter<T>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UniquePtr {{ data: {:?} }}", self.get())
    }
}

impl<T, D> Display for UniquePtr<T, D>
where T: ?Sized + Display,
      D: Deleter<T>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.get() {
            Some(v) => write!(f, "{}", v),
            None => write!(f, "nullptr")
        }
    }
}

impl<T, D> Pointer for UniquePtr<T, D>
where T: ?Sized,
      D: Deleter<T>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Pointer::fmt(&self.addr(), f)
    }
}
