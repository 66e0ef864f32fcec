//! # Handlers and Parameters
//!
//! Any async function of up to eight deserializable arguments whose future
//! resolves to `Result<R, E>` is a handler. The error type is open: anything
//! convertible into `anyhow::Error` works, and an `ErrorObject` travels back
//! to the caller unchanged.
//!
//! The same arity macro produces the outbound side: tuples of serializable
//! values are `Params`, and tuples of wire types are `Arguments` with a
//! signature the client can record.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;

use duowire::CodecError;
use duowire::Deferred;
use duowire::ErrorCode;
use duowire::ErrorObject;
use duowire::Format;
use duowire::WireType;

use crate::error::Error;
use crate::methods::Signature;
use crate::methods::TypeInfo;

/// Why incoming parameters could not be bound.
#[derive(Debug)]
pub enum ParamError {
    Count { expected: usize, found: usize },
    Decode { position: usize, source: CodecError },
}

impl std::fmt::Display for ParamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Count { expected, found } => {
                write!(f, "expected {} params, found {}", expected, found)
            }
            Self::Decode { position, source } => write!(f, "param {}: {}", position, source),
        }
    }
}

impl std::error::Error for ParamError {}

/// A callable that can be bound to a method name.
pub trait Handler<Args>: Clone + Send + Sync + 'static {
    type Output: WireType;

    fn signature() -> Signature;

    /// Make every parameter and result type known to the format.
    fn register_types<F: Format>(format: &F) -> Result<(), CodecError>;

    /// Bind the parameters and produce the call. The handler body runs only
    /// when the returned future is polled.
    fn invoke<F: Format>(
        &self,
        params: &[Deferred<F>],
    ) -> Result<BoxFuture<'static, anyhow::Result<Self::Output>>, ParamError>;
}

/// Values that can be sent as call parameters.
pub trait Params {
    fn encode<F: Format>(self, format: &Arc<F>) -> Result<Vec<Deferred<F>>, CodecError>;
}

/// Parameter tuples whose types can be recorded and registered.
pub trait Arguments: Params + Send + 'static {
    fn types() -> Vec<TypeInfo>;

    fn register_types<F: Format>(format: &F) -> Result<(), CodecError>;
}

impl<T: Serialize> Params for Vec<T> {
    fn encode<F: Format>(self, format: &Arc<F>) -> Result<Vec<Deferred<F>>, CodecError> {
        self.iter().map(|value| Deferred::encode(format, value)).collect()
    }
}

fn decode_param<F: Format, T: WireType>(
    params: &[Deferred<F>],
    position: &mut usize,
) -> Result<T, ParamError> {
    let index = *position;
    *position += 1;

    let found = params.len();
    let param = params.get(index).ok_or(ParamError::Count { expected: index + 1, found })?;
    param.decode::<T>().map_err(|source| ParamError::Decode { position: index, source })
}

macro_rules! replace_one {
    ($t:ident) => {
        1
    };
}

macro_rules! impl_arity {
    ($($ty:ident),*) => {
        #[allow(non_snake_case, unused_variables, unused_mut)]
        impl<Func, Fut, Res, E, $($ty,)*> Handler<($($ty,)*)> for Func
        where
            Func: Fn($($ty),*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Result<Res, E>> + Send + 'static,
            Res: WireType,
            E: Into<anyhow::Error> + 'static,
            $($ty: WireType,)*
        {
            type Output = Res;

            fn signature() -> Signature {
                Signature::new(vec![$(TypeInfo::of::<$ty>()),*], TypeInfo::result::<Res>())
            }

            fn register_types<F: Format>(format: &F) -> Result<(), CodecError> {
                $(format.register_type::<$ty>()?;)*
                format.register_type::<Res>()
            }

            fn invoke<F: Format>(
                &self,
                params: &[Deferred<F>],
            ) -> Result<BoxFuture<'static, anyhow::Result<Res>>, ParamError> {
                const ARITY: usize = 0 $(+ replace_one!($ty))*;
                if params.len() != ARITY {
                    return Err(ParamError::Count { expected: ARITY, found: params.len() });
                }

                let mut position = 0;
                $(let $ty = decode_param::<F, $ty>(params, &mut position)?;)*

                let func = self.clone();
                Ok(Box::pin(async move { func($($ty),*).await.map_err(Into::into) }))
            }
        }

        #[allow(non_snake_case, unused_variables)]
        impl<$($ty,)*> Params for ($($ty,)*)
        where
            $($ty: Serialize,)*
        {
            fn encode<F: Format>(self, format: &Arc<F>) -> Result<Vec<Deferred<F>>, CodecError> {
                let ($($ty,)*) = self;
                Ok(vec![$(Deferred::encode(format, &$ty)?),*])
            }
        }

        #[allow(unused_variables)]
        impl<$($ty,)*> Arguments for ($($ty,)*)
        where
            $($ty: WireType,)*
        {
            fn types() -> Vec<TypeInfo> {
                vec![$(TypeInfo::of::<$ty>()),*]
            }

            fn register_types<F: Format>(format: &F) -> Result<(), CodecError> {
                $(format.register_type::<$ty>()?;)*
                Ok(())
            }
        }
    };
}

impl_arity!();
impl_arity!(A1);
impl_arity!(A1, A2);
impl_arity!(A1, A2, A3);
impl_arity!(A1, A2, A3, A4);
impl_arity!(A1, A2, A3, A4, A5);
impl_arity!(A1, A2, A3, A4, A5, A6);
impl_arity!(A1, A2, A3, A4, A5, A6, A7);
impl_arity!(A1, A2, A3, A4, A5, A6, A7, A8);

/// Turn a handler failure into the error sent back to the caller.
pub(crate) fn classify(err: anyhow::Error) -> ErrorObject {
    if let Some(obj) = err.downcast_ref::<ErrorObject>() {
        return obj.clone();
    }
    if let Some(Error::Rpc(obj)) = err.downcast_ref::<Error>() {
        return obj.clone();
    }
    ErrorObject::with_message(ErrorCode::FunctionError, format!("{:#}", err))
}

type Invocation<F> = BoxFuture<'static, Result<Deferred<F>, ErrorObject>>;

type Invoke<F> = dyn Fn(&[Deferred<F>]) -> Result<Invocation<F>, ParamError> + Send + Sync;

/// A handler with its types erased, ready to be stored in a method table.
pub struct Binding<F> {
    signature: Signature,
    invoke: Box<Invoke<F>>,
}

impl<F: Format> Binding<F> {
    pub fn new<H, Args>(handler: H, format: Arc<F>) -> Self
    where
        H: Handler<Args>,
    {
        let invoke = move |params: &[Deferred<F>]| -> Result<Invocation<F>, ParamError> {
            let call = handler.invoke(params)?;
            let format = format.clone();
            Ok(Box::pin(async move {
                match call.await {
                    Ok(output) => Deferred::encode(&format, &output).map_err(|e| {
                        ErrorObject::with_message(
                            ErrorCode::InternalError,
                            format!("cannot encode result: {}", e),
                        )
                    }),
                    Err(err) => Err(classify(err)),
                }
            }))
        };

        Self { signature: H::signature(), invoke: Box::new(invoke) }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub(crate) fn invoke(&self, params: &[Deferred<F>]) -> Result<Invocation<F>, ParamError> {
        (self.invoke)(params)
    }
}

impl<F> std::fmt::Debug for Binding<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Binding({})", self.signature)
    }
}
