//! Core evaluator types.
//!
//! Every compiled artifact in the engine is an [`Evaluator`]: either a
//! synchronous or an asynchronous callable over an untyped JSON value. The
//! execution strategy is fixed when the evaluator is built and never changes
//! afterwards, which is what lets the combinators pick the cheapest shape at
//! construction time.
//!
//! # Families
//!
//! - [`Predicate`]: `value -> bool`
//! - [`Transform`]: `value -> value`, never null
//! - [`Processor`]: `value -> value or rejection` (`None` means rejected)
//!
//! # Example
//!
//! ```rust
//! # async fn example() -> anyhow::Result<()> {
//! use rulemix::engine::evaluator::Predicate;
//! use serde_json::json;
//!
//! let positive = Predicate::sync_fn(|value| Ok(value.as_f64().unwrap_or(0.0) > 0.0));
//! assert!(positive.is_sync());
//! assert!(positive.evaluate(&json!(3.5)).await?);
//! assert!(!positive.evaluate_sync(&json!(-1))?);
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::hybrid::Strategy;
use crate::errors::EngineError;

/// An evaluator that completes without suspending.
pub trait SyncEvaluator<O>: Send + Sync {
    fn evaluate(&self, input: &Value) -> Result<O>;
}

/// An evaluator that may suspend.
///
/// Implementors must be `Send + Sync`: compiled evaluators are shared across
/// pipeline runs and may be called concurrently from different sessions.
#[async_trait]
pub trait AsyncEvaluator<O>: Send + Sync {
    async fn evaluate(&self, input: &Value) -> Result<O>;
}

/// A compiled evaluator together with its execution strategy.
pub enum Evaluator<O> {
    Sync(Arc<dyn SyncEvaluator<O>>),
    Async(Arc<dyn AsyncEvaluator<O>>),
}

pub type Predicate = Evaluator<bool>;
pub type Transform = Evaluator<Value>;
pub type Processor = Evaluator<Option<Value>>;

impl<O> Clone for Evaluator<O> {
    fn clone(&self) -> Self {
        match self {
            Evaluator::Sync(inner) => Evaluator::Sync(Arc::clone(inner)),
            Evaluator::Async(inner) => Evaluator::Async(Arc::clone(inner)),
        }
    }
}

impl<O> fmt::Debug for Evaluator<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evaluator::Sync(_) => write!(f, "Evaluator::Sync"),
            Evaluator::Async(_) => write!(f, "Evaluator::Async"),
        }
    }
}

impl<O: Send + 'static> Evaluator<O> {
    pub fn from_sync<E: SyncEvaluator<O> + 'static>(evaluator: E) -> Self {
        Evaluator::Sync(Arc::new(evaluator))
    }

    pub fn from_async<E: AsyncEvaluator<O> + 'static>(evaluator: E) -> Self {
        Evaluator::Async(Arc::new(evaluator))
    }

    /// Wraps a plain closure as a synchronous evaluator.
    pub fn sync_fn<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<O> + Send + Sync + 'static,
    {
        Evaluator::Sync(Arc::new(FnEvaluator(f)))
    }

    /// Wraps a closure returning a future as an asynchronous evaluator.
    ///
    /// The closure receives an owned copy of the input so the future does not
    /// borrow from the caller.
    pub fn async_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
    {
        Evaluator::Async(Arc::new(AsyncFnEvaluator(f)))
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            Evaluator::Sync(_) => Strategy::Sync,
            Evaluator::Async(_) => Strategy::Async,
        }
    }

    pub fn is_sync(&self) -> bool {
        matches!(self, Evaluator::Sync(_))
    }

    /// Evaluates without an async runtime.
    ///
    /// Fails with [`EngineError::AsyncInSyncContext`] for asynchronous
    /// evaluators instead of blocking on them.
    pub fn evaluate_sync(&self, input: &Value) -> Result<O> {
        match self {
            Evaluator::Sync(inner) => inner.evaluate(input),
            Evaluator::Async(_) => Err(EngineError::AsyncInSyncContext {
                path: "<anonymous>".to_string(),
            }
            .into()),
        }
    }

    /// Evaluates with either strategy. Synchronous evaluators are called
    /// directly, without wrapping them in a future.
    pub async fn evaluate(&self, input: &Value) -> Result<O> {
        match self {
            Evaluator::Sync(inner) => inner.evaluate(input),
            Evaluator::Async(inner) => inner.evaluate(input).await,
        }
    }

    pub fn as_sync(&self) -> Option<&Arc<dyn SyncEvaluator<O>>> {
        match self {
            Evaluator::Sync(inner) => Some(inner),
            Evaluator::Async(_) => None,
        }
    }

    pub fn as_async(&self) -> Option<&Arc<dyn AsyncEvaluator<O>>> {
        match self {
            Evaluator::Sync(_) => None,
            Evaluator::Async(inner) => Some(inner),
        }
    }
}

pub struct FnEvaluator<F>(F);

impl<O, F> SyncEvaluator<O> for FnEvaluator<F>
where
    F: Fn(&Value) -> Result<O> + Send + Sync,
{
    fn evaluate(&self, input: &Value) -> Result<O> {
        (self.0)(input)
    }
}

pub struct AsyncFnEvaluator<F>(F);

#[async_trait]
impl<O, F, Fut> AsyncEvaluator<O> for AsyncFnEvaluator<F>
where
    O: Send + 'static,
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send + 'static,
{
    async fn evaluate(&self, input: &Value) -> Result<O> {
        (self.0)(input.clone()).await
    }
}

/// Processor that passes every input through unchanged.
///
/// Used where a void processor has to occupy a slot in a list, such as the
/// subordinate list of a decision node.
pub struct Passthrough;

impl SyncEvaluator<Option<Value>> for Passthrough {
    fn evaluate(&self, input: &Value) -> Result<Option<Value>> {
        Ok(Some(input.clone()))
    }
}

/// Guards a transform against producing `null`.
///
/// A null result is a programming error in the supplied function, not a
/// valid "no result", so it surfaces as [`EngineError::NullTransformResult`].
pub struct NonNullTransform<E: ?Sized> {
    path: String,
    inner: Arc<E>,
}

impl<E: ?Sized> NonNullTransform<E> {
    fn check(&self, value: Value) -> Result<Value> {
        if value.is_null() {
            return Err(EngineError::NullTransformResult {
                path: self.path.clone(),
            }
            .into());
        }
        Ok(value)
    }
}

impl SyncEvaluator<Value> for NonNullTransform<dyn SyncEvaluator<Value>> {
    fn evaluate(&self, input: &Value) -> Result<Value> {
        let value = self.inner.evaluate(input)?;
        self.check(value)
    }
}

#[async_trait]
impl AsyncEvaluator<Value> for NonNullTransform<dyn AsyncEvaluator<Value>> {
    async fn evaluate(&self, input: &Value) -> Result<Value> {
        let value = self.inner.evaluate(input).await?;
        self.check(value)
    }
}

/// Wraps a transform so a null result becomes an error attributed to `path`.
pub fn non_null(path: &str, transform: Transform) -> Transform {
    match transform {
        Evaluator::Sync(inner) => Evaluator::Sync(Arc::new(NonNullTransform {
            path: path.to_string(),
            inner,
        })),
        Evaluator::Async(inner) => Evaluator::Async(Arc::new(NonNullTransform {
            path: path.to_string(),
            inner,
        })),
    }
}
