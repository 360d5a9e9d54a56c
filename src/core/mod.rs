pub mod dispatcher;
pub mod lifecycle;
pub mod path_expression;
pub mod registry;
pub mod request;
pub mod templater;

pub use dispatcher::{
    DispatchError, DispatchResult, Dispatcher, DispatcherOptions, RequestHandle,
};
pub use lifecycle::{AbortHandle, LifecycleError, RequestLifecycle, RequestState};
pub use path_expression::{MultiMap, PathError, PathExpression, PathResult, Segment, join_root};
pub use registry::{CodecRegistry, RootResolver};
pub use request::{Request, RequestBuilder, RequestFailure, RequestMetadata, TypeInfo};
pub use templater::{Bindings, Context, TemplateError, Templater, format_url};
