use allocator_api2::alloc::Allocator;
use std::{
    alloc::{ handle_alloc_error, Layout },
    any::type_name,
    cell::Cell,
    mem::{ ManuallyDrop, MaybeUninit },
    ptr::{ self, NonNull }
};
use crate::memory::deleter::Deleter;

// Stands in for the virtual functions of std::_Ref_count_base
pub(crate) struct RefCountVtable {
    // _Destroy: runs once the last strong reference is gone. Storage stays allocated.
    destroy: unsafe fn(NonNull<RefCountBase>),
    // _Delete_this: frees the block itself
    delete_this: unsafe fn(NonNull<RefCountBase>)
}

// std::_Ref_count_base
// Every control block starts with this header, so a NonNull<RefCountBase> can point at any of
// them. All strong owners share a single weak reference between them: weaks only reaches zero
// once the managed object has been destroyed and every WeakPtr is gone.
#[repr(C)]
pub(crate) struct RefCountBase {
    vtable: &'static RefCountVtable,
    uses: Cell<u32>,
    weaks: Cell<u32>,
    // Whether the owners' shared weak reference is still counted in `weaks`. It stays set while
    // `destroy` runs.
    owners_weak: Cell<bool>
}

// Bumps a count, leaving it untouched when it would wrap
fn try_increment(count: &Cell<u32>) -> bool {
    match count.get().checked_add(1) {
        Some(n) => { count.set(n); true }
        None => false
    }
}

// Aborts on overflow like Rc: a wrapped count would free the block while it is still in use
fn increment(count: &Cell<u32>) {
    if !try_increment(count) {
        log::error!("reference count overflow");
        std::process::abort();
    }
}

impl RefCountBase {
    fn new(vtable: &'static RefCountVtable) -> Self {
        Self { vtable, uses: Cell::new(1), weaks: Cell::new(1), owners_weak: Cell::new(true) }
    }

    pub(crate) fn use_count(&self) -> usize { self.uses.get() as usize }

    // Live WeakPtrs, not counting the reference held on behalf of the owners
    pub(crate) fn weak_count(&self) -> usize {
        self.weaks.get() as usize - self.owners_weak.get() as usize
    }

    pub(crate) fn incref(&self) { increment(&self.uses) }
    pub(crate) fn incwref(&self) { increment(&self.weaks) }

    // _Incref_nz: take a strong reference only if the object hasn't been destroyed yet
    pub(crate) fn incref_nz(&self) -> bool {
        match self.uses.get() {
            0 => false,
            _ => { increment(&self.uses); true }
        }
    }

    // Release one strong reference. The last one destroys the managed object and then gives up
    // the owners' weak reference, which frees the block if no WeakPtr is left. The block must not
    // be touched by the caller after this returns.
    pub(crate) unsafe fn decref(this: NonNull<Self>) {
        let uses = unsafe { this.as_ref() }.uses.get() - 1;
        unsafe { this.as_ref() }.uses.set(uses);
        if uses == 0 {
            let destroy = unsafe { this.as_ref() }.vtable.destroy;
            unsafe {
                destroy(this);
                this.as_ref().owners_weak.set(false);
                Self::decwref(this);
            }
        }
    }

    // Release one weak reference, freeing the block when it was the last reference of any kind.
    pub(crate) unsafe fn decwref(this: NonNull<Self>) {
        let weaks = unsafe { this.as_ref() }.weaks.get() - 1;
        unsafe { this.as_ref() }.weaks.set(weaks);
        if weaks == 0 {
            let delete_this = unsafe { this.as_ref() }.vtable.delete_this;
            unsafe { delete_this(this) }
        }
    }
}

// std::_Ref_count_resource_alloc
// Owns an object allocated somewhere else and hands it to a deleter when the strong count drops
// to zero.
#[repr(C)]
pub(crate) struct RefCountResource<T, D, A>
where T: ?Sized,
      D: Deleter<T>,
      A: Allocator
{
    base: RefCountBase,
    ptr: NonNull<T>,
    deleter: ManuallyDrop<D>,
    alloc: ManuallyDrop<A>
}

impl<T, D, A> RefCountResource<T, D, A>
where T: ?Sized,
      D: Deleter<T>,
      A: Allocator
{
    const VTABLE: RefCountVtable = RefCountVtable {
        destroy: Self::destroy,
        delete_this: Self::delete_this
    };

    fn get_layout() -> Layout { Layout::new::<Self>() }

    // Takes ownership of `ptr`. If the block can't be allocated, `ptr` goes to the deleter
    // before the allocation error is raised.
    pub(crate) unsafe fn new_in(ptr: NonNull<T>, mut deleter: D, alloc: A) -> NonNull<RefCountBase> {
        let block = match alloc.allocate(Self::get_layout()) {
            Ok(p) => p.cast::<Self>(),
            Err(_) => {
                unsafe { deleter.delete(ptr) };
                handle_alloc_error(Self::get_layout())
            }
        };
        unsafe {
            ptr::write(block.as_ptr(), Self {
                base: RefCountBase::new(&Self::VTABLE),
                ptr,
                deleter: ManuallyDrop::new(deleter),
                alloc: ManuallyDrop::new(alloc)
            });
        }
        log::trace!("allocated control block {:p} for {}", block, type_name::<T>());
        block.cast()
    }

    unsafe fn destroy(this: NonNull<RefCountBase>) {
        let raw = this.cast::<Self>().as_ptr();
        unsafe {
            let ptr = (*raw).ptr;
            D::delete(&mut (*raw).deleter, ptr);
        }
    }

    unsafe fn delete_this(this: NonNull<RefCountBase>) {
        let block = this.cast::<Self>();
        let raw = block.as_ptr();
        unsafe {
            ManuallyDrop::drop(&mut (*raw).deleter);
            let alloc = ManuallyDrop::take(&mut (*raw).alloc);
            alloc.deallocate(block.cast(), Self::get_layout());
        }
        log::trace!("freed control block {:p} for {}", block, type_name::<T>());
    }
}

// std::_Ref_count_obj_alloc3
// The managed object is stored inline, so the counts and the object share one allocation.
#[repr(C)]
pub(crate) struct RefCountObject<T, A>
where A: Allocator
{
    base: RefCountBase,
    alloc: ManuallyDrop<A>,
    storage: MaybeUninit<T>
}

// Gives the block's memory back if building the object panics
struct DeallocOnUnwind<'a, A: Allocator> {
    alloc: &'a A,
    ptr: NonNull<u8>,
    layout: Layout
}

impl<'a, A: Allocator> Drop for DeallocOnUnwind<'a, A> {
    fn drop(&mut self) {
        unsafe { self.alloc.deallocate(self.ptr, self.layout) }
    }
}

impl<T, A> RefCountObject<T, A>
where A: Allocator
{
    const VTABLE: RefCountVtable = RefCountVtable {
        destroy: Self::destroy,
        delete_this: Self::delete_this
    };

    fn get_layout() -> Layout { Layout::new::<Self>() }

    fn get_data_ptr(block: NonNull<Self>) -> NonNull<T> {
        unsafe { NonNull::new_unchecked((&raw mut (*block.as_ptr()).storage).cast::<T>()) }
    }

    // Allocates the block first and then builds the object with `f`. Returns the block and a
    // pointer to the object living inside it.
    pub(crate) fn new_with_in<F>(f: F, alloc: A) -> (NonNull<RefCountBase>, NonNull<T>)
    where F: FnOnce() -> T
    {
        let layout = Self::get_layout();
        let block = match alloc.allocate(layout) {
            Ok(p) => p.cast::<Self>(),
            Err(_) => handle_alloc_error(layout)
        };
        let guard = DeallocOnUnwind { alloc: &alloc, ptr: block.cast(), layout };
        let value = f();
        std::mem::forget(guard);
        unsafe {
            ptr::write(block.as_ptr(), Self {
                base: RefCountBase::new(&Self::VTABLE),
                alloc: ManuallyDrop::new(alloc),
                storage: MaybeUninit::new(value)
            });
        }
        log::trace!("allocated control block {:p} holding {}", block, type_name::<T>());
        (block.cast(), Self::get_data_ptr(block))
    }

    unsafe fn destroy(this: NonNull<RefCountBase>) {
        unsafe { ptr::drop_in_place(Self::get_data_ptr(this.cast()).as_ptr()) }
    }

    unsafe fn delete_this(this: NonNull<RefCountBase>) {
        let block = this.cast::<Self>();
        unsafe {
            let alloc = ManuallyDrop::take(&mut (*block.as_ptr()).alloc);
            alloc.deallocate(block.cast(), Self::get_layout());
        }
        log::trace!("freed control block {:p} holding {}", block, type_name::<T>());
    }
}

#[cfg(test)]
pub mod tests {
    use super::{ try_increment, RefCountBase, RefCountObject, RefCountResource };
    use crate::memory::{
        deleter::DefaultDelete,
        test_support::{ CountingAllocator, Tracked }
    };
    use std::{
        cell::Cell,
        error::Error,
        ptr::NonNull,
        rc::Rc
    };
    type TestReturn = Result<(), Box<dyn Error>>;

    // Records how many blocks had been freed at the moment it was dropped
    struct FreeRecorder {
        alloc: CountingAllocator,
        frees_at_drop: Rc<Cell<Option<usize>>>
    }

    impl Drop for FreeRecorder {
        fn drop(&mut self) {
            self.frees_at_drop.set(Some(self.alloc.stats.frees()));
        }
    }

    #[test]
    fn new_block_counts() -> TestReturn {
        let alloc = CountingAllocator::default();
        let drops = Rc::new(Cell::new(0));
        let (rep, data) = RefCountObject::new_with_in(|| Tracked::new(7, &drops), alloc.clone());
        let base = unsafe { rep.as_ref() };
        assert!(base.use_count() == 1, "New block should start with one strong reference");
        assert!(base.weak_count() == 0, "New block should start without weak references");
        assert!(unsafe { data.as_ref() }.value == 7, "Inline object should hold 7");
        assert!(alloc.stats.allocs() == 1, "Object and counts should share a single allocation");
        unsafe { RefCountBase::decref(rep) };
        assert!(drops.get() == 1, "Object should be dropped with the last strong reference");
        assert!(alloc.stats.frees() == 1, "Block should be freed with the last strong reference");
        Ok(())
    }

    #[test]
    fn weak_reference_keeps_block() -> TestReturn {
        let alloc = CountingAllocator::default();
        let drops = Rc::new(Cell::new(0));
        let (rep, _) = RefCountObject::new_with_in(|| Tracked::new(1, &drops), alloc.clone());
        let base = unsafe { rep.as_ref() };
        base.incwref();
        assert!(base.weak_count() == 1, "Weak count should be 1 instead of {}", base.weak_count());
        unsafe { RefCountBase::decref(rep) };
        assert!(drops.get() == 1, "Object should be dropped even though a weak reference remains");
        assert!(alloc.stats.frees() == 0, "Block should outlive the object while weakly referenced");
        assert!(unsafe { rep.as_ref() }.use_count() == 0, "Strong count should be 0");
        assert!(!unsafe { rep.as_ref() }.incref_nz(), "Dead object shouldn't be revived");
        unsafe { RefCountBase::decwref(rep) };
        assert!(alloc.stats.frees() == 1, "Block should be freed with the last weak reference");
        assert!(drops.get() == 1, "Object should only be dropped once");
        Ok(())
    }

    #[test]
    fn destroy_runs_before_free() -> TestReturn {
        let alloc = CountingAllocator::default();
        let frees_at_drop = Rc::new(Cell::new(None));
        let recorder = FreeRecorder { alloc: alloc.clone(), frees_at_drop: frees_at_drop.clone() };
        let (rep, _) = RefCountObject::new_with_in(|| recorder, alloc.clone());
        unsafe { RefCountBase::decref(rep) };
        assert!(frees_at_drop.get() == Some(0), "Object must be destroyed before its block is freed");
        assert!(alloc.stats.frees() == 1, "Block should be freed after the object is destroyed");
        Ok(())
    }

    #[test]
    fn resource_block_uses_deleter() -> TestReturn {
        let alloc = CountingAllocator::default();
        let drops = Rc::new(Cell::new(0));
        let ptr = NonNull::from(Box::leak(Box::new(Tracked::new(3, &drops))));
        let rep = unsafe { RefCountResource::new_in(ptr, DefaultDelete, alloc.clone()) };
        unsafe { rep.as_ref() }.incref();
        assert!(unsafe { rep.as_ref() }.use_count() == 2, "Strong count should be 2");
        unsafe { RefCountBase::decref(rep) };
        assert!(drops.get() == 0, "Object shouldn't be dropped while still owned");
        unsafe { RefCountBase::decref(rep) };
        assert!(drops.get() == 1, "Deleter should drop the adopted object");
        assert!(alloc.stats.allocs() == 1 && alloc.stats.frees() == 1, "Block should be allocated and freed once");
        Ok(())
    }

    #[test]
    fn panicking_constructor_frees_block() -> TestReturn {
        let alloc = CountingAllocator::default();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            RefCountObject::<u32, _>::new_with_in(|| panic!("constructor failed"), alloc.clone())
        }));
        assert!(result.is_err(), "Constructor panic should propagate");
        assert!(alloc.stats.allocs() == 1, "Block should have been allocated before construction");
        assert!(alloc.stats.frees() == 1, "Block should be freed when construction panics");
        Ok(())
    }

    // Records the weak count the block reports while the object is being destroyed
    struct WeakCountAtDrop {
        rep: Cell<Option<NonNull<RefCountBase>>>,
        seen: Rc<Cell<Option<usize>>>
    }

    impl Drop for WeakCountAtDrop {
        fn drop(&mut self) {
            if let Some(rep) = self.rep.get() {
                self.seen.set(Some(unsafe { rep.as_ref() }.weak_count()));
            }
        }
    }

    #[test]
    fn weak_count_during_destroy() -> TestReturn {
        let alloc = CountingAllocator::default();
        let seen = Rc::new(Cell::new(None));
        let (rep, data) = RefCountObject::new_with_in(
            || WeakCountAtDrop { rep: Cell::new(None), seen: seen.clone() }, alloc.clone());
        unsafe { data.as_ref() }.rep.set(Some(rep));
        unsafe { rep.as_ref() }.incwref();
        unsafe { RefCountBase::decref(rep) };
        assert!(seen.get() == Some(1), "Destructor should see 1 weak reference instead of {:?}", seen.get());
        assert!(unsafe { rep.as_ref() }.weak_count() == 1, "Weak count should stay 1 after destroy");
        unsafe { RefCountBase::decwref(rep) };
        assert!(alloc.stats.frees() == 1, "Block should be freed with the last weak reference");
        Ok(())
    }

    #[test]
    fn count_doesnt_wrap() -> TestReturn {
        let count = Cell::new(u32::MAX - 1);
        assert!(try_increment(&count), "Count below the limit should increase");
        assert!(count.get() == u32::MAX, "Count should reach u32::MAX");
        assert!(!try_increment(&count), "Count at the limit shouldn't increase");
        assert!(count.get() == u32::MAX, "Count shouldn't wrap around to 0");
        Ok(())
    }
}
