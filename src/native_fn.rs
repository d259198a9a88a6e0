//! Native function storage and argument binding.
//!
//! Bound functions are ordinary Rust closures or fn items. Their parameters
//! are converted with [`FromScript`], their results with [`ToScript`]. The
//! last parameter is bound from every remaining argument, which is how a
//! trailing `Vec<T>` collects variadic arguments. A function whose last
//! parameter is `&ExecutionContext` receives the current context instead of
//! a script argument.
//!
//! # Example
//!
//! ```ignore
//! module.function("add", |a: i32, b: i32| a + b);
//! module.function("log", |parts: Vec<String>, ctx: &ExecutionContext| {
//!     ctx.host::<Page>().map(|page| page.log(&parts.join(" ")));
//! });
//!
//! module.class::<Node>()
//!     .method("appendChild", Node::append_child)
//!     .getter("childCount", |node: &Node| node.children.borrow().len() as u32);
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use jsbind_core::Value;

use crate::class::{AnyRef, Class, IntoInstance, Ref};
use crate::context::ExecutionContext;
use crate::error::NativeError;
use crate::marshal::{FromScript, ToScript, convert_argument};

/// Type-erased bound function.
pub type NativeFn = Rc<dyn Fn(&Invocation<'_>) -> Result<Value, NativeError>>;

/// Type-erased bound constructor. Yields the native instance to attach.
pub type ConstructFn = Rc<dyn Fn(&Invocation<'_>) -> Result<AnyRef, NativeError>>;

/// One call into native code, as seen by a bound function.
pub struct Invocation<'a> {
    ctx: &'a ExecutionContext,
    this: &'a Value,
    args: &'a [Value],
    construct: bool,
}

impl<'a> Invocation<'a> {
    pub(crate) fn new(
        ctx: &'a ExecutionContext,
        this: &'a Value,
        args: &'a [Value],
        construct: bool,
    ) -> Self {
        Self {
            ctx,
            this,
            args,
            construct,
        }
    }

    pub fn ctx(&self) -> &'a ExecutionContext {
        self.ctx
    }

    pub fn this(&self) -> &'a Value {
        self.this
    }

    pub fn args(&self) -> &'a [Value] {
        self.args
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn is_construct_call(&self) -> bool {
        self.construct
    }

    /// Convert the argument at `index`.
    pub fn arg<T: FromScript>(&self, index: usize) -> Result<T, NativeError> {
        convert_argument(self.args.get(index), index, self.ctx)
    }

    /// Convert every argument from `index` on into the last parameter.
    pub fn rest<T: FromScript>(&self, index: usize) -> Result<T, NativeError> {
        T::from_rest(self.args.get(index..).unwrap_or(&[]), index, self.ctx)
    }

    /// Resolve the receiver as a `T`.
    pub fn this_ref<T: Class>(&self) -> Result<Ref<T>, NativeError> {
        self.ctx.resolve::<T>(self.this)
    }
}

impl fmt::Debug for Invocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("this", self.this)
            .field("args", &self.args)
            .field("construct", &self.construct)
            .finish()
    }
}

/// Marker for signatures that end with `&ExecutionContext`.
pub struct WithContext<M>(PhantomData<M>);

/// A free function that can be bound. `M` is inferred from the signature.
pub trait IntoNativeFn<M> {
    /// Number of script-visible parameters (the function's `length`).
    const ARITY: u32;

    fn into_native_fn(self) -> NativeFn;
}

/// A method, getter or setter of class `T`. The first parameter is the
/// receiver.
pub trait IntoMethod<T, M> {
    const ARITY: u32;

    fn into_method(self) -> NativeFn;
}

/// A constructor of class `T`.
pub trait IntoConstructor<T, M> {
    const ARITY: u32;

    fn into_constructor(self) -> ConstructFn;
}

fn erase<T: Class>(r: Ref<T>) -> AnyRef {
    AnyRef::from(r)
}

// =============================================================================
// Zero script parameters
// =============================================================================

impl<F, R> IntoNativeFn<fn() -> R> for F
where
    F: Fn() -> R + 'static,
    R: ToScript,
{
    const ARITY: u32 = 0;

    fn into_native_fn(self) -> NativeFn {
        Rc::new(move |inv: &Invocation<'_>| (self)().to_script(inv.ctx()))
    }
}

impl<F, R> IntoNativeFn<WithContext<fn() -> R>> for F
where
    F: for<'c> Fn(&'c ExecutionContext) -> R + 'static,
    R: ToScript,
{
    const ARITY: u32 = 0;

    fn into_native_fn(self) -> NativeFn {
        Rc::new(move |inv: &Invocation<'_>| (self)(inv.ctx()).to_script(inv.ctx()))
    }
}

impl<T, F, R> IntoMethod<T, fn(&T) -> R> for F
where
    T: Class,
    F: for<'t> Fn(&'t T) -> R + 'static,
    R: ToScript,
{
    const ARITY: u32 = 0;

    fn into_method(self) -> NativeFn {
        Rc::new(move |inv: &Invocation<'_>| {
            let this = inv.this_ref::<T>()?;
            (self)(&*this).to_script(inv.ctx())
        })
    }
}

impl<T, F, R> IntoMethod<T, WithContext<fn(&T) -> R>> for F
where
    T: Class,
    F: for<'t, 'c> Fn(&'t T, &'c ExecutionContext) -> R + 'static,
    R: ToScript,
{
    const ARITY: u32 = 0;

    fn into_method(self) -> NativeFn {
        Rc::new(move |inv: &Invocation<'_>| {
            let this = inv.this_ref::<T>()?;
            (self)(&*this, inv.ctx()).to_script(inv.ctx())
        })
    }
}

impl<T, F, R> IntoConstructor<T, fn() -> R> for F
where
    T: Class,
    F: Fn() -> R + 'static,
    R: IntoInstance<T>,
{
    const ARITY: u32 = 0;

    fn into_constructor(self) -> ConstructFn {
        Rc::new(move |inv: &Invocation<'_>| (self)().into_instance(inv.ctx()).map(erase))
    }
}

impl<T, F, R> IntoConstructor<T, WithContext<fn() -> R>> for F
where
    T: Class,
    F: for<'c> Fn(&'c ExecutionContext) -> R + 'static,
    R: IntoInstance<T>,
{
    const ARITY: u32 = 0;

    fn into_constructor(self) -> ConstructFn {
        Rc::new(move |inv: &Invocation<'_>| {
            (self)(inv.ctx()).into_instance(inv.ctx()).map(erase)
        })
    }
}

// =============================================================================
// One or more script parameters
// =============================================================================

macro_rules! impl_arity {
    ($arity:literal; $($A:ident $i:literal,)* ; $L:ident $li:literal) => {
        impl<F, R, $($A,)* $L> IntoNativeFn<fn($($A,)* $L) -> R> for F
        where
            F: Fn($($A,)* $L) -> R + 'static,
            $($A: FromScript,)*
            $L: FromScript,
            R: ToScript,
        {
            const ARITY: u32 = $arity;

            fn into_native_fn(self) -> NativeFn {
                Rc::new(move |inv: &Invocation<'_>| {
                    let result = (self)($(inv.arg::<$A>($i)?,)* inv.rest::<$L>($li)?);
                    result.to_script(inv.ctx())
                })
            }
        }

        impl<F, R, $($A,)* $L> IntoNativeFn<WithContext<fn($($A,)* $L) -> R>> for F
        where
            F: for<'c> Fn($($A,)* $L, &'c ExecutionContext) -> R + 'static,
            $($A: FromScript,)*
            $L: FromScript,
            R: ToScript,
        {
            const ARITY: u32 = $arity;

            fn into_native_fn(self) -> NativeFn {
                Rc::new(move |inv: &Invocation<'_>| {
                    let result =
                        (self)($(inv.arg::<$A>($i)?,)* inv.rest::<$L>($li)?, inv.ctx());
                    result.to_script(inv.ctx())
                })
            }
        }

        impl<T, F, R, $($A,)* $L> IntoMethod<T, fn(&T, $($A,)* $L) -> R> for F
        where
            T: Class,
            F: for<'t> Fn(&'t T, $($A,)* $L) -> R + 'static,
            $($A: FromScript,)*
            $L: FromScript,
            R: ToScript,
        {
            const ARITY: u32 = $arity;

            fn into_method(self) -> NativeFn {
                Rc::new(move |inv: &Invocation<'_>| {
                    let this = inv.this_ref::<T>()?;
                    let result = (self)(&*this, $(inv.arg::<$A>($i)?,)* inv.rest::<$L>($li)?);
                    result.to_script(inv.ctx())
                })
            }
        }

        impl<T, F, R, $($A,)* $L> IntoMethod<T, WithContext<fn(&T, $($A,)* $L) -> R>> for F
        where
            T: Class,
            F: for<'t, 'c> Fn(&'t T, $($A,)* $L, &'c ExecutionContext) -> R + 'static,
            $($A: FromScript,)*
            $L: FromScript,
            R: ToScript,
        {
            const ARITY: u32 = $arity;

            fn into_method(self) -> NativeFn {
                Rc::new(move |inv: &Invocation<'_>| {
                    let this = inv.this_ref::<T>()?;
                    let result = (self)(
                        &*this,
                        $(inv.arg::<$A>($i)?,)*
                        inv.rest::<$L>($li)?,
                        inv.ctx(),
                    );
                    result.to_script(inv.ctx())
                })
            }
        }

        impl<T, F, R, $($A,)* $L> IntoConstructor<T, fn($($A,)* $L) -> R> for F
        where
            T: Class,
            F: Fn($($A,)* $L) -> R + 'static,
            $($A: FromScript,)*
            $L: FromScript,
            R: IntoInstance<T>,
        {
            const ARITY: u32 = $arity;

            fn into_constructor(self) -> ConstructFn {
                Rc::new(move |inv: &Invocation<'_>| {
                    let result = (self)($(inv.arg::<$A>($i)?,)* inv.rest::<$L>($li)?);
                    result.into_instance(inv.ctx()).map(erase)
                })
            }
        }

        impl<T, F, R, $($A,)* $L> IntoConstructor<T, WithContext<fn($($A,)* $L) -> R>> for F
        where
            T: Class,
            F: for<'c> Fn($($A,)* $L, &'c ExecutionContext) -> R + 'static,
            $($A: FromScript,)*
            $L: FromScript,
            R: IntoInstance<T>,
        {
            const ARITY: u32 = $arity;

            fn into_constructor(self) -> ConstructFn {
                Rc::new(move |inv: &Invocation<'_>| {
                    let result =
                        (self)($(inv.arg::<$A>($i)?,)* inv.rest::<$L>($li)?, inv.ctx());
                    result.into_instance(inv.ctx()).map(erase)
                })
            }
        }
    };
}

impl_arity!(1; ; A0 0);
impl_arity!(2; A0 0, ; A1 1);
impl_arity!(3; A0 0, A1 1, ; A2 2);
impl_arity!(4; A0 0, A1 1, A2 2, ; A3 3);
impl_arity!(5; A0 0, A1 1, A2 2, A3 3, ; A4 4);
impl_arity!(6; A0 0, A1 1, A2 2, A3 3, A4 4, ; A5 5);
