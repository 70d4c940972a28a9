//! Dataset handle: one store, one calendar, one cache.
//!
//! Writers and readers obtained from the same handle share the cache, so a
//! write is seen by the next read without any global state.

use crate::calendar::{self, TradingCalendar};
use crate::config::StoreConfig;
use crate::error::StoreResult;
use crate::store::{DailyBarReader, DailyBarWriter, DatasetCache, InvalidDataBehavior, RowStore};
use chrono::NaiveDate;
use std::path::Path;
use std::sync::Arc;

pub struct Dataset {
    config: StoreConfig,
    calendar: Arc<dyn TradingCalendar>,
    cache: Arc<DatasetCache>,
}

impl Dataset {
    /// Resolve the configured calendar and bind it to the store.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        let calendar = calendar::from_config(&config.calendar)?;
        Ok(Self::with_calendar(config, calendar))
    }

    pub fn with_calendar(config: StoreConfig, calendar: Arc<dyn TradingCalendar>) -> Self {
        Self {
            config,
            calendar,
            cache: Arc::new(DatasetCache::new()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn database(&self) -> &Path {
        &self.config.database
    }

    pub fn calendar(&self) -> Arc<dyn TradingCalendar> {
        Arc::clone(&self.calendar)
    }

    pub fn cache(&self) -> Arc<DatasetCache> {
        Arc::clone(&self.cache)
    }

    pub fn default_behavior(&self) -> InvalidDataBehavior {
        self.config.invalid_data_behavior
    }

    /// Create the store and schema if missing.
    pub fn init(&self) -> StoreResult<()> {
        RowStore::open_or_create(&self.config.database).map(|_| ())
    }

    pub fn writer(&self, start_session: NaiveDate, end_session: NaiveDate) -> StoreResult<DailyBarWriter> {
        let store = RowStore::open_or_create(&self.config.database)?;
        DailyBarWriter::new(
            store,
            self.calendar(),
            self.cache(),
            start_session,
            end_session,
        )
    }

    /// Reader over an existing store; `StoreNotFound` when there is none.
    pub fn reader(&self) -> StoreResult<DailyBarReader> {
        let store = RowStore::open_read_only(&self.config.database)?;
        Ok(DailyBarReader::new(
            store,
            self.calendar(),
            self.cache(),
            self.config.read_all_threshold,
        ))
    }
}
