use std::cell::RefCell;
use std::rc::Rc;

/// Shared, interior-mutable handle used for every heap entity of the engine
/// (promises, generators, async generators, objects).
pub type SharedPtr<T> = Rc<RefCell<T>>;

#[inline]
pub fn new_shared_ptr<T>(value: T) -> SharedPtr<T> {
    Rc::new(RefCell::new(value))
}

mod value;
pub use value::*;

mod completion;
pub use completion::*;

mod frame;
pub use frame::*;

pub mod js_error;
pub use js_error::*;
