//! Task dispatch: statically registered implementations bound to Kinds.
//!
//! A host program registers one [`Implementation`] per implementation path
//! named in its package documents (`configs:` / `commands:`). When a Kind is
//! constructed every task it declares is bound to a handler up front; a
//! declared task with no handler is a load-time error, never a call-time
//! probe.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{RepositoryError, TaskFailure};
use crate::object::BoundObject;

/// Keyword arguments passed to a task.
pub type TaskArgs = Map<String, Value>;

/// Everything a handler receives for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct TaskCall<'a> {
    /// Unqualified task name (`"login"`).
    pub task: &'a str,
    pub object: BoundObject<'a>,
    pub args: &'a TaskArgs,
}

/// A task handler.
pub type TaskFn = Arc<dyn Fn(TaskCall<'_>) -> Result<Value, TaskFailure> + Send + Sync>;

// ---------------------------------------------------------------------------
// Implementation / Implementations
// ---------------------------------------------------------------------------

/// The handlers behind one implementation path.
#[derive(Clone)]
pub struct Implementation {
    path: String,
    tasks: BTreeMap<String, TaskFn>,
    fallback: Option<TaskFn>,
}

impl Implementation {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            tasks: BTreeMap::new(),
            fallback: None,
        }
    }

    /// Register a named task handler.
    pub fn task<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(TaskCall<'_>) -> Result<Value, TaskFailure> + Send + Sync + 'static,
    {
        self.tasks.insert(name.into(), Arc::new(handler));
        self
    }

    /// Register a handler for every task name without its own handler.
    pub fn fallback<F>(mut self, handler: F) -> Self
    where
        F: Fn(TaskCall<'_>) -> Result<Value, TaskFailure> + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(handler));
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Names with an explicit handler.
    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    fn bind(&self, name: &str) -> Option<TaskFn> {
        self.tasks.get(name).or(self.fallback.as_ref()).cloned()
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Implementation")
            .field("path", &self.path)
            .field("tasks", &self.tasks.keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

/// Registry of implementations, built by the host at process start.
#[derive(Debug, Clone, Default)]
pub struct Implementations {
    by_path: BTreeMap<String, Arc<Implementation>>,
}

impl Implementations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation, replacing any with the same path.
    pub fn register(&mut self, implementation: Implementation) -> &mut Self {
        self.by_path
            .insert(implementation.path.clone(), Arc::new(implementation));
        self
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, implementation: Implementation) -> Self {
        self.register(implementation);
        self
    }

    pub fn get(&self, path: &str) -> Option<Arc<Implementation>> {
        self.by_path.get(path).cloned()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.by_path.keys().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// TaskInvocation
// ---------------------------------------------------------------------------

/// A parsed invocation: a bare task name, or `{task_name: {kwarg: value}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskInvocation {
    pub name: String,
    pub args: TaskArgs,
}

impl TaskInvocation {
    pub fn new(name: impl Into<String>, args: TaskArgs) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    pub fn parse(value: &Value) -> Result<Self, RepositoryError> {
        let invalid = || RepositoryError::InvalidTaskInvocation(value.to_string());
        match value {
            Value::String(name) => Ok(Self::new(name.clone(), TaskArgs::new())),
            Value::Object(map) if map.len() == 1 => {
                let (name, kwargs) = map.iter().next().ok_or_else(invalid)?;
                let args = match kwargs {
                    Value::Object(args) => args.clone(),
                    Value::Null => TaskArgs::new(),
                    _ => return Err(invalid()),
                };
                Ok(Self::new(name.clone(), args))
            }
            _ => Err(invalid()),
        }
    }
}

// ---------------------------------------------------------------------------
// KindTask / KindTasks
// ---------------------------------------------------------------------------

/// One declared task of a Kind, bound to its handler.
#[derive(Clone)]
pub struct KindTask {
    kind: String,
    name: String,
    implementation: String,
    handler: TaskFn,
}

impl KindTask {
    /// Qualified name, `package.Kind.task`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.kind, self.name)
    }

    pub fn task_name(&self) -> &str {
        &self.name
    }

    /// `implementation.path.task`.
    pub fn module_name(&self) -> String {
        format!("{}.{}", self.implementation, self.name)
    }

    pub fn invoke(&self, object: BoundObject<'_>, args: &TaskArgs) -> Result<Value, RepositoryError> {
        tracing::debug!(task = %self.name(), obj = %object.ref_string(), "invoking task");
        let call = TaskCall {
            task: &self.name,
            object,
            args,
        };
        (self.handler)(call).map_err(|source| RepositoryError::TaskFailed {
            task: self.name(),
            obj: object.ref_string(),
            source,
        })
    }
}

impl fmt::Debug for KindTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<KindTask {}.{}>", self.kind, self.name)
    }
}

/// The ordered set of tasks a Kind declares.
#[derive(Debug, Clone)]
pub struct KindTasks {
    kind: String,
    tasks: Vec<KindTask>,
}

impl KindTasks {
    /// Bind every declared task name to a handler of `implementation`.
    pub fn new(
        kind: &str,
        declared: &[Value],
        implementation: &Implementation,
    ) -> Result<Self, RepositoryError> {
        let mut tasks: Vec<KindTask> = Vec::with_capacity(declared.len());
        for entry in declared {
            let Value::String(name) = entry else {
                return Err(RepositoryError::InvalidKind(format!(
                    "invalid task spec for {kind}: {entry}"
                )));
            };
            if tasks.iter().any(|t| t.name == *name) {
                continue;
            }
            let handler = implementation
                .bind(name)
                .ok_or_else(|| RepositoryError::UnknownTask {
                    kind: kind.to_owned(),
                    task: format!("{name} (not provided by {})", implementation.path()),
                })?;
            tasks.push(KindTask {
                kind: kind.to_owned(),
                name: name.clone(),
                implementation: implementation.path().to_owned(),
                handler,
            });
        }
        Ok(Self {
            kind: kind.to_owned(),
            tasks,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.iter().any(|t| t.name == name)
    }

    pub fn get(&self, name: &str) -> Result<&KindTask, RepositoryError> {
        self.tasks
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| RepositoryError::UnknownTask {
                kind: self.kind.clone(),
                task: name.to_owned(),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &KindTask> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Parse `invocation` and validate the task name.
    pub fn parse_args(&self, invocation: &Value) -> Result<(&KindTask, TaskArgs), RepositoryError> {
        let TaskInvocation { name, args } = TaskInvocation::parse(invocation)?;
        Ok((self.get(&name)?, args))
    }

    /// Invoke a bare task name or `{task: {kwargs}}` mapping.
    pub fn invoke(&self, object: BoundObject<'_>, invocation: &Value) -> Result<Value, RepositoryError> {
        let (task, args) = self.parse_args(invocation)?;
        task.invoke(object, &args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn region_impl() -> Implementation {
        Implementation::new("deploy.Region").task("login", |_call| Ok(json!("login!")))
    }

    #[test]
    fn invocation_shapes() {
        let bare = TaskInvocation::parse(&json!("login")).unwrap();
        assert_eq!(bare.name, "login");
        assert!(bare.args.is_empty());

        let mapped = TaskInvocation::parse(&json!({"login": {"user": "admin"}})).unwrap();
        assert_eq!(mapped.name, "login");
        assert_eq!(mapped.args["user"], json!("admin"));

        for bad in [json!({"a": {}, "b": {}}), json!(["login"]), json!(3), json!({"login": 1})] {
            assert!(
                matches!(TaskInvocation::parse(&bad), Err(RepositoryError::InvalidTaskInvocation(_))),
                "accepted {bad}"
            );
        }
    }

    #[test]
    fn declared_tasks_bind_to_handlers() {
        let tasks = KindTasks::new("deploy.Region", &[json!("login")], &region_impl()).unwrap();
        assert!(tasks.contains("login"));
        let task = tasks.get("login").unwrap();
        assert_eq!(task.name(), "deploy.Region.login");
        assert_eq!(task.module_name(), "deploy.Region.login");
    }

    #[test]
    fn unbound_task_fails_at_construction() {
        let err = KindTasks::new("deploy.Region", &[json!("logout")], &region_impl()).unwrap_err();
        assert!(matches!(err, RepositoryError::UnknownTask { .. }));
    }

    #[test]
    fn fallback_binds_any_name() {
        let imp = Implementation::new("any").fallback(|call| Ok(json!(call.task)));
        let tasks = KindTasks::new("a.B", &[json!("x"), json!("y")], &imp).unwrap();
        assert_eq!(tasks.names().collect::<Vec<_>>(), vec!["x", "y"]);
    }

    #[test]
    fn non_string_task_spec_is_invalid() {
        let err = KindTasks::new("a.B", &[json!({"x": 1})], &region_impl()).unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidKind(_)));
    }

    #[test]
    fn registry_replaces_by_path() {
        let mut impls = Implementations::new();
        impls.register(region_impl());
        impls.register(Implementation::new("deploy.Region"));
        assert_eq!(impls.paths().count(), 1);
        assert_eq!(impls.get("deploy.Region").unwrap().task_names().count(), 0);
    }
}
