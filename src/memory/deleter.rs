use std::ptr::NonNull;

// Destruction policy for UniquePtr and for adopted SharedPtr objects (the Deleter template
// parameter of std::unique_ptr)
pub trait Deleter<T: ?Sized> {
    /// Destroy the object behind `ptr` and release its memory.
    ///
    /// # Safety
    /// `ptr` must be owned by the caller, must have been allocated in the way this deleter
    /// expects and must not be used again afterwards.
    unsafe fn delete(&mut self, ptr: NonNull<T>);
}

// std::default_delete
// Frees objects that came from a Box. Slices are freed as a whole, which covers
// std::default_delete<T[]>.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DefaultDelete;

impl<T: ?Sized> Deleter<T> for DefaultDelete {
    unsafe fn delete(&mut self, ptr: NonNull<T>) {
        drop(unsafe { Box::from_raw(ptr.as_ptr()) })
    }
}

impl<T, F> Deleter<T> for F
where T: ?Sized,
      F: FnMut(NonNull<T>)
{
    unsafe fn delete(&mut self, ptr: NonNull<T>) { self(ptr) }
}

#[cfg(test)]
pub mod tests {
    use super::{ DefaultDelete, Deleter };
    use crate::memory::test_support::Tracked;
    use std::{
        cell::Cell,
        error::Error,
        ptr::NonNull,
        rc::Rc
    };
    type TestReturn = Result<(), Box<dyn Error>>;

    #[test]
    fn default_delete_drops_box() -> TestReturn {
        let drops = Rc::new(Cell::new(0));
        let ptr = NonNull::from(Box::leak(Box::new(Tracked::new(1, &drops))));
        unsafe { DefaultDelete.delete(ptr) };
        assert!(drops.get() == 1, "Object should be dropped once instead of {} times", drops.get());
        Ok(())
    }

    #[test]
    fn default_delete_drops_slice() -> TestReturn {
        let drops = Rc::new(Cell::new(0));
        let items: Box<[Tracked]> = (0..4).map(|i| Tracked::new(i, &drops)).collect();
        let ptr = NonNull::from(Box::leak(items));
        unsafe { DefaultDelete.delete(ptr) };
        assert!(drops.get() == 4, "Every element should be dropped, got {}", drops.get());
        Ok(())
    }

    #[test]
    fn closure_deleter() -> TestReturn {
        let calls = Cell::new(0);
        let mut deleter = |ptr: NonNull<u32>| {
            calls.set(calls.get() + 1);
            drop(unsafe { Box::from_raw(ptr.as_ptr()) });
        };
        let ptr = NonNull::from(Box::leak(Box::new(5u32)));
        unsafe { deleter.delete(ptr) };
        assert!(calls.get() == 1, "Closure should be called once");
        Ok(())
    }
}
