use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::descriptor::{Describe, TypeDescriptor};
use crate::dispatcher::{ApiResponse, DispatchFailure, HandlerOutput, Invocation, RequestContext};
use crate::materialize::materialize;
use crate::meta::ApiRequest;
use crate::validator::Validatable;

/// Type-erased entry point of one registered operation.
pub type Invoker = Arc<dyn Fn(&Invocation<'_>) -> Result<HandlerOutput, DispatchFailure> + Send + Sync>;

type BoundCall<C> =
    Arc<dyn Fn(&C, &Invocation<'_>) -> Result<HandlerOutput, DispatchFailure> + Send + Sync>;

/// A group of operations sharing a registration prefix.
///
/// ```rust,ignore
/// struct Users;
///
/// impl Controller for Users {
///     fn operations(ops: &mut Operations<Self>) {
///         ops.add("List", Self::list).add("Create", Self::create);
///     }
/// }
///
/// impl Users {
///     fn list(&self, ctx: &RequestContext, req: ListReq) -> anyhow::Result<ListRes> { ... }
/// }
/// ```
pub trait Controller: Send + Sync + Sized + 'static {
    /// Name used in handler names (`Name.Operation`). Defaults to the type name.
    fn name(&self) -> &'static str {
        short_type_name::<Self>()
    }

    fn operations(ops: &mut Operations<Self>);
}

/// Operation list collected from [`Controller::operations`].
pub struct Operations<C> {
    pub(crate) entries: Vec<OperationEntry<C>>,
}

pub(crate) struct OperationEntry<C> {
    pub name: &'static str,
    pub request: &'static TypeDescriptor,
    pub response: &'static TypeDescriptor,
    pub call: BoundCall<C>,
}

impl<C: 'static> Operations<C> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Expose `handler` as operation `name`.
    ///
    /// Operations whose request type has no `#[meta(...)]` marker are
    /// ignored at registration.
    pub fn add<Req, Res, F>(&mut self, name: &'static str, handler: F) -> &mut Self
    where
        Req: ApiRequest + DeserializeOwned + Send + 'static,
        Res: ApiResponse + Describe + 'static,
        F: Fn(&C, &RequestContext, Req) -> anyhow::Result<Res> + Send + Sync + 'static,
    {
        let call: BoundCall<C> = Arc::new(move |controller: &C, inv: &Invocation<'_>| {
            let materialized =
                materialize::<Req>(&inv.ctx.method, inv.input).map_err(DispatchFailure::Materialize)?;
            debug!(
                request_id = %inv.ctx.request_id,
                handler_name = %inv.ctx.handler_name,
                "Request materialized"
            );

            inv.validator
                .validate(&Validatable {
                    descriptor: Req::descriptor(),
                    value: &materialized.value,
                    object: &materialized.request,
                })
                .map_err(DispatchFailure::Validation)?;

            let request = materialized.request;
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(controller, inv.ctx, request)));
            let response = match outcome {
                Ok(Ok(response)) => response,
                Ok(Err(err)) => return Err(DispatchFailure::Handler(err)),
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "handler panicked".to_string());
                    error!(
                        request_id = %inv.ctx.request_id,
                        handler_name = %inv.ctx.handler_name,
                        panic = %message,
                        "Handler panicked"
                    );
                    return Err(DispatchFailure::Handler(anyhow::anyhow!(
                        "handler panicked: {message}"
                    )));
                }
            };

            let headers = response.headers();
            let data = serde_json::to_value(&response).map_err(DispatchFailure::Encode)?;
            Ok(HandlerOutput { data, headers })
        });

        self.entries.push(OperationEntry {
            name,
            request: Req::descriptor(),
            response: Res::descriptor(),
            call,
        });
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Bind a controller instance to each of its operations.
pub(crate) fn bind<C: Controller>(controller: &Arc<C>, entry: &OperationEntry<C>) -> Invoker {
    let instance = Arc::clone(controller);
    let call = Arc::clone(&entry.call);
    Arc::new(move |inv: &Invocation<'_>| call(&instance, inv))
}

/// `my_app::users::UsersController<T>` becomes `UsersController`.
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;
    struct Generic<T>(std::marker::PhantomData<T>);

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<Plain>(), "Plain");
        assert_eq!(short_type_name::<Generic<String>>(), "Generic");
    }
}
