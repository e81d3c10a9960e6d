//! Lead persistence: a small trait plus an in-memory implementation.

use crate::contacts::Contact;
use crate::isrc::Isrc;
use crate::profile::MergedProfile;
use crate::scoring::LeadScore;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub profile: MergedProfile,
    pub score: LeadScore,
    pub contacts: Vec<Contact>,
    pub saved_at: DateTime<Utc>,
}

#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Upsert keyed by the profile's ISRC.
    async fn save(
        &self,
        profile: &MergedProfile,
        score: &LeadScore,
        contacts: &[Contact],
    ) -> Result<()>;

    async fn find(&self, isrc: &Isrc) -> Result<Option<LeadRecord>>;
}

#[derive(Debug, Default)]
pub struct InMemoryLeadStore {
    records: RwLock<HashMap<Isrc, LeadRecord>>,
}

impl InMemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn save(
        &self,
        profile: &MergedProfile,
        score: &LeadScore,
        contacts: &[Contact],
    ) -> Result<()> {
        let record = LeadRecord {
            profile: profile.clone(),
            score: score.clone(),
            contacts: contacts.to_vec(),
            saved_at: Utc::now(),
        };
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.isrc.clone(), record);
        Ok(())
    }

    async fn find(&self, isrc: &Isrc) -> Result<Option<LeadRecord>> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(isrc)
            .cloned())
    }
}
