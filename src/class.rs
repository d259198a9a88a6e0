//! Registered classes and native references.
//!
//! # Storage Model
//!
//! Native instances live in the long-lived arena of the
//! [`ExecutionContext`](crate::ExecutionContext) that allocated them. A
//! [`Ref<T>`] is a plain pointer into that arena: it is `Copy`, compares by
//! address, and stays valid until the context is dropped. Receivers are
//! always shared (`&T`); native types use `Cell`/`RefCell` for state that
//! script code can change, because a re-entrant call can reach the same
//! instance twice.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

use jsbind_registry::TypeDecl;

use crate::context::ExecutionContext;
use crate::error::NativeError;

/// A native type exposed to scripts as a class.
///
/// Implemented by `#[derive(Class)]`.
pub trait Class: Sized + 'static {
    /// Script class name.
    const NAME: &'static str;

    /// Registry declaration: name, size, prototype link, category.
    fn declaration() -> TypeDecl;
}

/// A field-less enum marshaled as strings.
///
/// Implemented by `#[derive(Enumeration)]`.
pub trait Enumeration: Sized + 'static {
    const NAME: &'static str;
    const VALUES: &'static [&'static str];

    fn as_str(&self) -> &'static str;

    fn from_str_value(value: &str) -> Option<Self>;
}

/// Pointer to a native instance owned by an execution context.
#[repr(transparent)]
pub struct Ref<T> {
    ptr: NonNull<T>,
    _marker: PhantomData<*const T>,
}

impl<T> Ref<T> {
    /// Wrap a raw pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must point at a live `T` that outlives every use of the
    /// returned reference (in practice: memory owned by the execution
    /// context the reference is used with).
    pub unsafe fn from_raw(ptr: NonNull<T>) -> Self {
        Self {
            ptr,
            _marker: PhantomData,
        }
    }

    pub fn as_ptr(self) -> NonNull<T> {
        self.ptr
    }

    pub fn addr(self) -> usize {
        self.ptr.as_ptr() as usize
    }

    pub fn ptr_eq(a: Self, b: Self) -> bool {
        a.ptr == b.ptr
    }

    pub(crate) fn erase(self) -> NonNull<u8> {
        self.ptr.cast()
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Ref<T> {}

impl<T> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<T> Eq for Ref<T> {}

impl<T> Hash for Ref<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ptr.hash(state);
    }
}

impl<T> Deref for Ref<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: every `Ref` comes from `from_raw`, whose contract keeps the
        // pointee alive for as long as the reference is used.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref<{}>({:p})", std::any::type_name::<T>(), self.ptr)
    }
}

/// A type-erased [`Ref`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnyRef {
    ptr: NonNull<u8>,
    type_id: TypeId,
    type_name: &'static str,
}

impl AnyRef {
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    pub(crate) fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Recover the typed reference if this is exactly a `T`.
    pub fn downcast<T: Class>(&self) -> Option<Ref<T>> {
        if self.type_id == TypeId::of::<T>() {
            // SAFETY: the pointer was created from a `Ref<T>` of this type.
            Some(unsafe { Ref::from_raw(self.ptr.cast()) })
        } else {
            None
        }
    }
}

impl<T: Class> From<Ref<T>> for AnyRef {
    fn from(r: Ref<T>) -> Self {
        Self {
            ptr: r.erase(),
            type_id: TypeId::of::<T>(),
            type_name: T::NAME,
        }
    }
}

impl fmt::Debug for AnyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnyRef<{}>({:p})", self.type_name, self.ptr)
    }
}

/// What a bound constructor may return.
///
/// `#[derive(Class)]` implements this for the type itself (a fresh value
/// moved into the context arena); an existing [`Ref`] reuses its script
/// object when one is already mapped.
pub trait IntoInstance<T: Class> {
    fn into_instance(self, ctx: &ExecutionContext) -> Result<Ref<T>, NativeError>;
}

impl<T: Class> IntoInstance<T> for Ref<T> {
    fn into_instance(self, _ctx: &ExecutionContext) -> Result<Ref<T>, NativeError> {
        Ok(self)
    }
}

impl<T, X, E> IntoInstance<T> for Result<X, E>
where
    T: Class,
    X: IntoInstance<T>,
    E: Into<NativeError>,
{
    fn into_instance(self, ctx: &ExecutionContext) -> Result<Ref<T>, NativeError> {
        self.map_err(Into::into)?.into_instance(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsbind_registry::TypeDecl;

    struct Point {
        x: i32,
    }

    impl Class for Point {
        const NAME: &'static str = "Point";

        fn declaration() -> TypeDecl {
            TypeDecl::of::<Self>(Self::NAME)
        }
    }

    #[test]
    fn ref_compares_by_address() {
        let mut a = Point { x: 1 };
        let mut b = Point { x: 1 };
        let ra = unsafe { Ref::from_raw(NonNull::from(&mut a)) };
        let rb = unsafe { Ref::from_raw(NonNull::from(&mut b)) };
        assert_eq!(ra, ra.clone());
        assert_ne!(ra, rb);
        assert_eq!(ra.x, 1);
    }

    #[test]
    fn any_ref_downcast() {
        let mut p = Point { x: 7 };
        let r = unsafe { Ref::from_raw(NonNull::from(&mut p)) };
        let any = AnyRef::from(r);
        assert_eq!(any.type_name(), "Point");
        assert_eq!(any.downcast::<Point>().map(|p| p.x), Some(7));
        assert_eq!(any.addr(), r.addr());
    }
}
