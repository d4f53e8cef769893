//! Typed API client over the request pipeline and query cache.
//!
//! # Design
//! `CourseApi` is a cheap-to-clone handle around a [`Service`] pipeline and a
//! shared [`QueryCache`]. Queries read through the cache; mutations run their
//! optimistic patch (if any), send the request, settle the patch, then
//! invalidate their tags and refetch every subscribed entry that was hit.
//! Refetches go through the same pipeline, so they notify like any request,
//! but their failures never change the mutation's own result.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::cache::{CacheKey, QueryCache};
use crate::config::ClientConfig;
use crate::endpoints::{
    CourseFilter, CourseProgressKey, CreateCourse, CreateStripePaymentIntent, CreateTransaction,
    DeleteCourse, Endpoint, EndpointKind, GetCourse, GetCourses, GetTransactions,
    GetUploadVideoUrl, GetUserCourseProgress, GetUserEnrolledCourses, PaymentIntentArgs,
    UpdateCourse, UpdateCourseArgs, UpdateProgressArgs, UpdateUser, UpdateUserArgs,
    UpdateUserCourseProgress, UploadVideoArgs,
};
use crate::error::ApiError;
use crate::middleware::{Notifier, Notifying};
use crate::optimistic::OptimisticUpdate;
use crate::tags::Tag;
use crate::transport::{ReqwestClient, Service, TokenProvider, TransportAdapter};
use crate::types::{
    Course, NewCourse, PaymentIntent, Transaction, UploadUrl, User, UserCourseProgress,
};

/// The production pipeline: reqwest transport wrapped by the response middleware.
pub type DefaultPipeline<P, N> = Notifying<TransportAdapter<ReqwestClient, P>, N>;

struct Inner<S> {
    service: S,
    cache: Arc<QueryCache>,
}

/// Client handle for the course marketplace API.
pub struct CourseApi<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for CourseApi<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: TokenProvider, N: Notifier> CourseApi<DefaultPipeline<P, N>> {
    /// Build the production pipeline from configuration.
    pub fn connect(config: &ClientConfig, session: P, notifier: N) -> Self {
        let transport = TransportAdapter::new(config).with_session(session);
        Self::new(Notifying::new(transport, notifier))
    }
}

impl<S: Service> CourseApi<S> {
    pub fn new(service: S) -> Self {
        Self {
            inner: Arc::new(Inner {
                service,
                cache: Arc::new(QueryCache::new()),
            }),
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    /// Run `E` as a query or a mutation according to its declaration.
    pub async fn execute<E: Endpoint>(&self, args: &E::Args) -> Result<E::Output, ApiError> {
        match E::KIND {
            EndpointKind::Query => self.query::<E>(args).await,
            EndpointKind::Mutation => self.mutate::<E>(args).await,
        }
    }

    /// Read through the cache: fresh entries are served without a request.
    pub async fn query<E: Endpoint>(&self, args: &E::Args) -> Result<E::Output, ApiError> {
        let key = E::cache_key(args)?;
        if let Some(value) = self.inner.cache.fresh_value(&key) {
            tracing::debug!(endpoint = E::NAME, "cache hit");
            return decode(value);
        }

        let request = E::request(args)?;
        let value = self.inner.service.call(request.clone()).await?;
        let visible = self.inner.cache.store(key, request, E::provides(args), value);
        decode(visible)
    }

    /// Send a mutation, applying and settling its optimistic patch, then
    /// invalidate its tags whatever the outcome.
    pub async fn mutate<E: Endpoint>(&self, args: &E::Args) -> Result<E::Output, ApiError> {
        let request = E::request(args)?;
        let update = E::optimistic(args)?.map(|patch| OptimisticUpdate::begin(&self.inner.cache, patch));

        // An undecodable 2xx payload counts as a failure for the patch
        let result = self
            .inner
            .service
            .call(request)
            .await
            .and_then(decode::<E::Output>);
        if let Some(update) = update {
            update.settle(result.is_ok());
        }

        self.invalidate_and_refetch(&E::invalidates(args)).await;
        result
    }

    /// Register interest in a query so invalidations refetch it.
    pub fn subscribe<E: Endpoint>(&self, args: &E::Args) -> Result<Subscription, ApiError> {
        let key = E::cache_key(args)?;
        self.inner
            .cache
            .subscribe(key.clone(), E::request(args)?, E::provides(args));
        Ok(Subscription {
            cache: Arc::clone(&self.inner.cache),
            key,
        })
    }

    /// Visible cached value of a query, without fetching.
    pub fn cached<E: Endpoint>(&self, args: &E::Args) -> Result<Option<E::Output>, ApiError> {
        let key = E::cache_key(args)?;
        self.inner.cache.value(&key).map(decode).transpose()
    }

    /// Mark entries stale and return the subscribed ones needing a refetch.
    pub fn invalidate(&self, tags: &[Tag]) -> Vec<CacheKey> {
        self.inner.cache.invalidate(tags)
    }

    /// Re-run the request stored for `key` and confirm its value.
    pub async fn refetch(&self, key: &CacheKey) -> Result<(), ApiError> {
        let Some(request) = self.inner.cache.request_for(key) else {
            return Ok(());
        };
        let value = self.inner.service.call(request).await?;
        if !self.inner.cache.confirm(key, value) {
            tracing::debug!(endpoint = key.endpoint, "entry evicted during refetch");
        }
        Ok(())
    }

    async fn invalidate_and_refetch(&self, tags: &[Tag]) {
        if tags.is_empty() {
            return;
        }
        for key in self.invalidate(tags) {
            if let Err(err) = self.refetch(&key).await {
                tracing::warn!(endpoint = key.endpoint, error = %err, "refetch after invalidation failed");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    pub async fn update_user(&self, args: &UpdateUserArgs) -> Result<User, ApiError> {
        self.execute::<UpdateUser>(args).await
    }

    pub async fn get_courses(&self, category: Option<&str>) -> Result<Vec<Course>, ApiError> {
        let filter = CourseFilter {
            category: category.map(str::to_string),
        };
        self.execute::<GetCourses>(&filter).await
    }

    pub async fn get_course(&self, id: &str) -> Result<Course, ApiError> {
        self.execute::<GetCourse>(&id.to_string()).await
    }

    pub async fn create_course(&self, args: &NewCourse) -> Result<Course, ApiError> {
        self.execute::<CreateCourse>(args).await
    }

    pub async fn update_course(&self, args: &UpdateCourseArgs) -> Result<Course, ApiError> {
        self.execute::<UpdateCourse>(args).await
    }

    pub async fn delete_course(&self, id: &str) -> Result<Value, ApiError> {
        self.execute::<DeleteCourse>(&id.to_string()).await
    }

    pub async fn get_upload_video_url(&self, args: &UploadVideoArgs) -> Result<UploadUrl, ApiError> {
        self.execute::<GetUploadVideoUrl>(args).await
    }

    pub async fn get_transactions(&self, user_id: &str) -> Result<Vec<Transaction>, ApiError> {
        self.execute::<GetTransactions>(&user_id.to_string()).await
    }

    pub async fn create_stripe_payment_intent(&self, amount: u64) -> Result<PaymentIntent, ApiError> {
        self.execute::<CreateStripePaymentIntent>(&PaymentIntentArgs { amount })
            .await
    }

    pub async fn create_transaction(&self, transaction: &Transaction) -> Result<Transaction, ApiError> {
        self.execute::<CreateTransaction>(transaction).await
    }

    pub async fn get_user_enrolled_courses(&self, user_id: &str) -> Result<Vec<Course>, ApiError> {
        self.execute::<GetUserEnrolledCourses>(&user_id.to_string())
            .await
    }

    pub async fn get_user_course_progress(
        &self,
        key: &CourseProgressKey,
    ) -> Result<UserCourseProgress, ApiError> {
        self.execute::<GetUserCourseProgress>(key).await
    }

    pub async fn update_user_course_progress(
        &self,
        args: &UpdateProgressArgs,
    ) -> Result<UserCourseProgress, ApiError> {
        self.execute::<UpdateUserCourseProgress>(args).await
    }
}

/// Keeps a cache entry subscribed until dropped.
#[derive(Debug)]
pub struct Subscription {
    cache: Arc<QueryCache>,
    key: CacheKey,
}

impl Subscription {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cache.unsubscribe(&self.key);
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::Deserialization(e.to_string()))
}
