// Helpers shared by the unit tests: a payload that counts its drops and an allocator that counts
// its allocations.
use allocator_api2::alloc::{ AllocError, Allocator, Global };
use std::{
    alloc::Layout,
    cell::Cell,
    ptr::NonNull,
    rc::Rc
};

#[derive(Debug, Default)]
pub struct AllocStats {
    allocs: Cell<usize>,
    frees: Cell<usize>
}

impl AllocStats {
    pub fn allocs(&self) -> usize { self.allocs.get() }
    pub fn frees(&self) -> usize { self.frees.get() }
    pub fn live(&self) -> usize { self.allocs() - self.frees() }
}

#[derive(Debug, Clone, Default)]
pub struct CountingAllocator {
    pub stats: Rc<AllocStats>
}

unsafe impl Allocator for CountingAllocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        let block = Global.allocate(layout)?;
        self.stats.allocs.set(self.stats.allocs.get() + 1);
        Ok(block)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.stats.frees.set(self.stats.frees.get() + 1);
        unsafe { Global.deallocate(ptr, layout) }
    }
}

#[derive(Debug)]
pub struct Tracked {
    pub value: i32,
    drops: Rc<Cell<usize>>
}

impl Tracked {
    pub fn new(value: i32, drops: &Rc<Cell<usize>>) -> Self {
        Self { value, drops: drops.clone() }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
