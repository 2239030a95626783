//! Stagehand core: a typed object registry with task dispatch.
//!
//! - [`package`] / [`kind`]: schema documents and the Kinds built from them
//! - [`attribute`] / [`relation`]: declared fields and their resolution
//! - [`task`]: statically registered implementations and task binding
//! - [`object`] / [`objects`] / [`query`]: the object store and selection
//! - [`repository`]: [`Repository`], the owner of all of the above
//! - [`loader`]: YAML document streams from files and directories

pub mod attribute;
pub mod error;
pub mod kind;
pub mod loader;
pub mod object;
pub mod objects;
pub mod package;
pub mod query;
pub mod reference;
pub mod relation;
pub mod repository;
pub mod task;

pub use attribute::{AttrValue, AttributeDetail, Coercion};
pub use error::{RepositoryError, TaskFailure};
pub use kind::{Kind, KindDecl, Resolved};
pub use object::{template_view, BoundObject, KindObject};
pub use objects::KindObjects;
pub use package::{Package, PackageDecl};
pub use query::{Query, QueryResult, QueryShape, Selector};
pub use reference::{Reference, TaskReference};
pub use relation::{Relation, RelationDetail, RelationList, Resolution};
pub use repository::{Lookup, Repository, TaskOutput};
pub use task::{
    Implementation, Implementations, KindTask, KindTasks, TaskArgs, TaskCall, TaskFn,
    TaskInvocation,
};
