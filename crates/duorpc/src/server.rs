//! # Server
//!
//! The serving half of a session. Binds method names to handlers and turns
//! each incoming request into exactly one response.
//!
//! ## Invariants
//!
//! - Every request gets a response with the same id.
//! - A handler failure, including a panic, becomes a `FunctionError`
//!   response. It never reaches the read loop.
//! - A request whose parameters do not fit the handler, or could not be
//!   read at all, is answered with `InvalidParams` and the handler is not
//!   run.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use duowire::Codec;
use duowire::CodecError;
use duowire::Deferred;
use duowire::ErrorCode;
use duowire::ErrorObject;
use duowire::Format;
use duowire::RequestFrame;
use duowire::ResponseFrame;

use crate::handler::Binding;
use crate::handler::Handler;
use crate::methods;
use crate::methods::MethodTable;
use crate::methods::Signature;

struct ServerInner<F> {
    codec: Arc<Codec<F>>,
    methods: MethodTable<Arc<Binding<F>>>,
}

/// Answers calls from the peer. Cheap to clone.
pub struct Server<F> {
    inner: Arc<ServerInner<F>>,
}

impl<F> Clone for Server<F> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

/// A group of methods registered together.
///
/// The implementor lists its callable members through the `Registrar`:
///
/// ```ignore
/// impl Service for Greeter {
///     fn methods<F: Format>(self: Arc<Self>, registrar: &mut Registrar<F>) {
///         let this = self.clone();
///         registrar.func("hello", move |name: String| {
///             let this = this.clone();
///             async move { this.hello(name).await }
///         });
///     }
/// }
/// ```
pub trait Service: Send + Sync + 'static {
    fn methods<F: Format>(self: Arc<Self>, registrar: &mut Registrar<F>);
}

/// Collects the bindings a `Service` offers.
pub struct Registrar<F> {
    format: Arc<F>,
    bindings: Vec<(String, Binding<F>)>,
    error: Option<methods::Error>,
}

impl<F: Format> Registrar<F> {
    fn new(format: Arc<F>) -> Self {
        Self { format, bindings: Vec::new(), error: None }
    }

    /// Offer `handler` under `name`. Failures surface from
    /// `Server::register_service`.
    pub fn func<H, Args>(&mut self, name: &str, handler: H) -> &mut Self
    where
        H: Handler<Args>,
    {
        if self.error.is_some() {
            return self;
        }

        if name.is_empty() {
            self.error = Some(methods::Error::EmptyName);
        } else if let Err(e) = H::register_types(self.format.as_ref()) {
            self.error = Some(e.into());
        } else {
            let binding = Binding::new(handler, self.format.clone());
            self.bindings.push((name.to_owned(), binding));
        }
        self
    }
}

impl<F: Format> Server<F> {
    pub fn new(codec: Arc<Codec<F>>) -> Self {
        Self { inner: Arc::new(ServerInner { codec, methods: MethodTable::new() }) }
    }

    pub fn codec(&self) -> &Arc<Codec<F>> {
        &self.inner.codec
    }

    /// Bind `handler` to `name`.
    ///
    /// The handler's parameter and result types are registered with the
    /// codec first. Fails on an empty or already bound name.
    pub fn register_fn<H, Args>(&self, name: &str, handler: H) -> methods::Result<()>
    where
        H: Handler<Args>,
    {
        if name.is_empty() {
            return Err(methods::Error::EmptyName);
        }

        let format = self.inner.codec.format();
        H::register_types(format.as_ref())?;

        let binding = Binding::new(handler, format.clone());
        self.inner.methods.insert(name, Arc::new(binding))?;

        tracing::debug!(method = name, signature = %H::signature(), "registered method");
        Ok(())
    }

    /// Bind every method `service` offers.
    ///
    /// Either all of them are bound or none are.
    pub fn register_service<S: Service>(&self, service: Arc<S>) -> methods::Result<usize> {
        let mut registrar = Registrar::new(self.inner.codec.format().clone());
        service.methods(&mut registrar);

        if let Some(e) = registrar.error {
            return Err(e);
        }
        if registrar.bindings.is_empty() {
            return Err(methods::Error::NoMethods);
        }

        let mut bound: Vec<String> = Vec::with_capacity(registrar.bindings.len());
        for (name, binding) in registrar.bindings {
            if let Err(e) = self.inner.methods.insert(&name, Arc::new(binding)) {
                // roll back what this call bound
                for name in &bound {
                    let _ = self.inner.methods.remove(name);
                }
                return Err(e);
            }
            bound.push(name);
        }

        tracing::debug!(methods = ?bound, "registered service");
        Ok(bound.len())
    }

    pub fn unregister(&self, name: &str) -> methods::Result<()> {
        self.inner.methods.remove(name).map(|_| ())
    }

    /// Names of every bound method, sorted.
    pub fn methods(&self) -> Vec<String> {
        self.inner.methods.names()
    }

    pub fn signature(&self, name: &str) -> Option<Signature> {
        self.inner.methods.get(name).map(|binding| binding.signature().clone())
    }

    /// Serve one request and write its response.
    ///
    /// A write failure is returned; the session treats it as fatal.
    pub async fn on_request(&self, request: RequestFrame<F>) -> Result<(), CodecError> {
        let response = self.handle(request).await;
        self.inner.codec.write_response(&response).await
    }

    /// Serve one request without writing anything.
    pub async fn handle(&self, request: RequestFrame<F>) -> ResponseFrame<F> {
        let RequestFrame { id, method, params, params_error } = request;
        match self.dispatch(id, &method, &params, params_error.as_deref()).await {
            Ok(result) => ResponseFrame::success(id, result),
            Err(error) => {
                tracing::debug!(id, method = %method, code = error.code, "call failed");
                ResponseFrame::failure(id, error)
            }
        }
    }

    async fn dispatch(
        &self,
        id: i64,
        method: &str,
        params: &[Deferred<F>],
        params_error: Option<&str>,
    ) -> Result<Deferred<F>, ErrorObject> {
        let Some(binding) = self.inner.methods.get(method) else {
            return Err(ErrorCode::MethodNotFound.into());
        };

        if let Some(detail) = params_error {
            tracing::debug!(id, method, error = detail, "unreadable params");
            return Err(ErrorCode::InvalidParams.into());
        }

        // codec detail stays in the log
        let call = binding.invoke(params).map_err(|e| {
            tracing::debug!(id, method, error = %e, "rejecting params");
            ErrorObject::from(ErrorCode::InvalidParams)
        })?;

        tracing::debug!(id, method, "dispatching");
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(&*panic);
                tracing::warn!(id, method, panic = %message, "handler panicked");
                Err(ErrorObject::with_message(ErrorCode::FunctionError, message))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic".to_string()
    }
}
