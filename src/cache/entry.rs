use std::{fmt, time::Duration};

use tokio::time::Instant;

use crate::state::game::{Difficulty, Question};

/// Lookup key of a cache bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    /// Category the questions belong to.
    pub category_id: String,
    /// Difficulty they were generated for.
    pub difficulty: Difficulty,
    /// Board value they were generated for.
    pub points: u32,
}

impl CacheKey {
    /// Build a cache key.
    pub fn new(category_id: impl Into<String>, difficulty: Difficulty, points: u32) -> Self {
        Self {
            category_id: category_id.into(),
            difficulty,
            points,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.category_id, self.difficulty, self.points)
    }
}

/// A cached question and its freshness/consumption state.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    question: Question,
    cached_at: Instant,
    used: bool,
}

impl CacheEntry {
    /// Entry waiting to be served.
    pub fn unused(question: Question, cached_at: Instant) -> Self {
        Self {
            question,
            cached_at,
            used: false,
        }
    }

    /// Entry for a question that was handed out as soon as it was generated.
    pub fn used(question: Question, cached_at: Instant) -> Self {
        Self {
            question,
            cached_at,
            used: true,
        }
    }

    /// Cached question.
    pub fn question(&self) -> &Question {
        &self.question
    }

    /// Whether the question was already handed out.
    pub fn is_used(&self) -> bool {
        self.used
    }

    /// When the entry was stored.
    pub fn cached_at(&self) -> Instant {
        self.cached_at
    }

    /// Expired once its age reaches the TTL.
    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.cached_at) >= ttl
    }

    /// Can be served: never handed out and still fresh.
    pub fn is_available(&self, now: Instant, ttl: Duration) -> bool {
        !self.used && !self.is_expired(now, ttl)
    }

    /// Consume the entry, handing out a copy of its question. Returns `None` if it was
    /// already consumed.
    pub fn take(&mut self) -> Option<Question> {
        if self.used {
            return None;
        }
        self.used = true;
        Some(self.question.clone())
    }

    /// Flag the entry as consumed. Returns whether the flag changed.
    pub fn mark_used(&mut self) -> bool {
        !std::mem::replace(&mut self.used, true)
    }
}
