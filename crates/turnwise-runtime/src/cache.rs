//! Judge answer cache.
//!
//! Identical judge questions (same call kind, text and context) get the
//! same answer without another provider call. Only successful answers are
//! cached.

use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use crate::config::duration_str;
use crate::judge::{Judge, JudgeCall, JudgeError, JudgeVerdict};

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    pub max_entries: u64,

    #[serde(with = "duration_str")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Cache key for one judge question.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    call: JudgeCall,
    question_hash: u64,
    subject_hash: u64,
    context_hash: u64,
}

impl CacheKey {
    pub fn rule(response: &str, description: &str, context: Option<&str>) -> Self {
        Self {
            call: JudgeCall::Rule,
            question_hash: hash_text(description),
            subject_hash: hash_text(response),
            context_hash: hash_context(context),
        }
    }

    pub fn precondition(precondition: &str, context: &str) -> Self {
        Self {
            call: JudgeCall::Precondition,
            question_hash: hash_text(precondition),
            subject_hash: 0,
            context_hash: hash_context(Some(context)),
        }
    }
}

#[derive(Clone, Debug)]
enum CachedAnswer {
    Rule(JudgeVerdict),
    Precondition(bool),
}

/// Judge answers cached with moka.
pub struct JudgeCache {
    cache: Cache<CacheKey, CachedAnswer>,
}

impl JudgeCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.ttl)
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for JudgeCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

/// A [`Judge`] that consults a [`JudgeCache`] before the inner judge.
pub struct CachedJudge {
    inner: Arc<dyn Judge>,
    cache: Arc<JudgeCache>,
}

impl CachedJudge {
    pub fn new(inner: Arc<dyn Judge>, cache: Arc<JudgeCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &JudgeCache {
        &self.cache
    }
}

#[async_trait]
impl Judge for CachedJudge {
    async fn judge(
        &self,
        response: &str,
        description: &str,
        context: Option<&str>,
    ) -> Result<JudgeVerdict, JudgeError> {
        let key = CacheKey::rule(response, description, context);
        if let Some(CachedAnswer::Rule(verdict)) = self.cache.cache.get(&key).await {
            tracing::trace!("Judge cache hit");
            return Ok(verdict);
        }

        let verdict = self.inner.judge(response, description, context).await?;
        self.cache
            .cache
            .insert(key, CachedAnswer::Rule(verdict.clone()))
            .await;
        Ok(verdict)
    }

    async fn check_precondition(&self, precondition: &str, context: &str) -> Result<bool, JudgeError> {
        let key = CacheKey::precondition(precondition, context);
        if let Some(CachedAnswer::Precondition(satisfied)) = self.cache.cache.get(&key).await {
            return Ok(satisfied);
        }

        let satisfied = self.inner.check_precondition(precondition, context).await?;
        self.cache
            .cache
            .insert(key, CachedAnswer::Precondition(satisfied))
            .await;
        Ok(satisfied)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

fn hash_text(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

fn hash_context(context: Option<&str>) -> u64 {
    let mut hasher = DefaultHasher::new();
    context.hash(&mut hasher);
    hasher.finish()
}
