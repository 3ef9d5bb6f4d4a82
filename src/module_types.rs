//! Core module types and abstractions.
//!
//! # Rust Learning Note
//!
//! A module is a *descriptor*: a name, an init step, an optional destroy step,
//! and the services it exports and imports. The steps are trait objects so
//! that any closure (or any type implementing the trait) can be registered:
//!
//! ```rust
//! use stagehand::{ModuleDescriptor, Value};
//!
//! let one = ModuleDescriptor::new("one")
//!     .export("symbolFromOne")
//!     .init(|_ctx| async { Ok(Some(Value::new("Message from one"))) });
//!
//! let two = ModuleDescriptor::new("two")
//!     .imports(["symbolFromOne"])
//!     .init_sync(|ctx| {
//!         let message = ctx.import_as::<&str>("symbolFromOne");
//!         ctx.logger().info(&format!("got {:?}", message));
//!         Ok(None)
//!     });
//! # let _ = (one, two);
//! ```
//!
//! ## Why `Value` instead of generics?
//!
//! Modules registered on the same manager produce unrelated types. A
//! type-erased `Arc<dyn Any + Send + Sync>` lets the service catalog hold all
//! of them in one map; the consumer downcasts to the type it expects.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::env::EnvDeclaration;

/// Type-erased value produced by a module's init step.
///
/// Cloning is cheap (reference count bump); clones share identity, which
/// [`Value::ptr_eq`] can check.
#[derive(Clone)]
pub struct Value(Arc<dyn Any + Send + Sync>);

impl Value {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Wraps a value that is already shared.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self(value)
    }

    /// Returns a shared handle to the inner value if it is a `T`.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.0).downcast::<T>().ok()
    }

    /// Borrows the inner value if it is a `T`.
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// `true` when both values point at the same allocation.
    pub fn ptr_eq(a: &Value, b: &Value) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Value(..)")
    }
}

/// Init step of a module.
///
/// `Ok(None)` means "initialized, but produced nothing". A module that
/// declares an export must return `Ok(Some(_))`.
#[async_trait]
pub trait ModuleInit: Send + Sync {
    async fn init(&self, ctx: Context) -> anyhow::Result<Option<Value>>;
}

/// Destroy step of a module.
///
/// Receives the value the init step returned, or `None` if init never ran
/// (or produced nothing).
#[async_trait]
pub trait ModuleDestroy: Send + Sync {
    async fn destroy(&self, ctx: Context, init_value: Option<Value>) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> ModuleInit for F
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
{
    async fn init(&self, ctx: Context) -> anyhow::Result<Option<Value>> {
        (self)(ctx).await
    }
}

#[async_trait]
impl<F, Fut> ModuleDestroy for F
where
    F: Fn(Context, Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn destroy(&self, ctx: Context, init_value: Option<Value>) -> anyhow::Result<()> {
        (self)(ctx, init_value).await
    }
}

/// Adapts a synchronous init closure.
struct SyncInit<F>(F);

#[async_trait]
impl<F> ModuleInit for SyncInit<F>
where
    F: Fn(Context) -> anyhow::Result<Option<Value>> + Send + Sync,
{
    async fn init(&self, ctx: Context) -> anyhow::Result<Option<Value>> {
        (self.0)(ctx)
    }
}

/// Adapts a synchronous destroy closure.
struct SyncDestroy<F>(F);

#[async_trait]
impl<F> ModuleDestroy for SyncDestroy<F>
where
    F: Fn(Context, Option<Value>) -> anyhow::Result<()> + Send + Sync,
{
    async fn destroy(&self, ctx: Context, init_value: Option<Value>) -> anyhow::Result<()> {
        (self.0)(ctx, init_value)
    }
}

/// Destroy step used when a module doesn't provide one.
pub(crate) struct NoopDestroy;

#[async_trait]
impl ModuleDestroy for NoopDestroy {
    async fn destroy(&self, _ctx: Context, _init_value: Option<Value>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Description of a module handed to `ModuleManager::register`.
///
/// Every field is optional at the type level; `register` decides what is
/// required (a non-empty name and an init step) and rejects the rest.
#[derive(Clone, Default)]
pub struct ModuleDescriptor {
    pub name: String,
    pub init: Option<Arc<dyn ModuleInit>>,
    pub destroy: Option<Arc<dyn ModuleDestroy>>,
    pub export: Option<String>,
    pub imports: Option<Vec<String>>,
    pub env: Option<Vec<EnvDeclaration>>,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets an asynchronous init step.
    pub fn init<F, Fut>(mut self, init: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
    {
        self.init = Some(Arc::new(init));
        self
    }

    /// Sets a synchronous init step.
    pub fn init_sync<F>(mut self, init: F) -> Self
    where
        F: Fn(Context) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(SyncInit(init)));
        self
    }

    /// Sets an init step from any [`ModuleInit`] implementation.
    pub fn init_with(mut self, init: Arc<dyn ModuleInit>) -> Self {
        self.init = Some(init);
        self
    }

    /// Sets an asynchronous destroy step.
    pub fn destroy<F, Fut>(mut self, destroy: F) -> Self
    where
        F: Fn(Context, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.destroy = Some(Arc::new(destroy));
        self
    }

    /// Sets a synchronous destroy step.
    pub fn destroy_sync<F>(mut self, destroy: F) -> Self
    where
        F: Fn(Context, Option<Value>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.destroy = Some(Arc::new(SyncDestroy(destroy)));
        self
    }

    /// Sets a destroy step from any [`ModuleDestroy`] implementation.
    pub fn destroy_with(mut self, destroy: Arc<dyn ModuleDestroy>) -> Self {
        self.destroy = Some(destroy);
        self
    }

    /// Name of the service this module publishes.
    pub fn export(mut self, service: impl Into<String>) -> Self {
        self.export = Some(service.into());
        self
    }

    /// Services this module consumes, in order.
    pub fn imports<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.imports = Some(services.into_iter().map(Into::into).collect());
        self
    }

    /// Adds one environment requirement.
    pub fn env(mut self, declaration: EnvDeclaration) -> Self {
        self.env.get_or_insert_with(Vec::new).push(declaration);
        self
    }

    /// Adds several environment requirements.
    pub fn envs(mut self, declarations: impl IntoIterator<Item = EnvDeclaration>) -> Self {
        self.env.get_or_insert_with(Vec::new).extend(declarations);
        self
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("name", &self.name)
            .field("init", &self.init.is_some())
            .field("destroy", &self.destroy.is_some())
            .field("export", &self.export)
            .field("imports", &self.imports)
            .field("env", &self.env)
            .finish()
    }
}
